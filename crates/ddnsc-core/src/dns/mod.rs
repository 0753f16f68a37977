//! Raw DNS lookups
//!
//! The resolver speaks the wire protocol directly so that the published
//! record is read from the authoritative answer path rather than from a
//! local cache. Queries go out over UDP with a receive buffer that starts at
//! 512 bytes and grows whenever a response fills it:
//!
//! ```text
//! buffer = 512
//! loop:
//!     n = query(buffer)
//!     if n < buffer: done
//!     buffer += n          (at most 8 rounds, never past 65535)
//! ```
//!
//! A response that still carries the TC bit after a complete read is
//! re-queried over TCP.

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{self, Name, RData};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::config::{RecordType, ResolverConfig};
use crate::error::{ConfigError, DnsErrorKind, DnsLookupError};

/// Whether a custom nameserver may be an IPv6 address
pub const IPV6_SERVER_SUPPORTED: bool = true;

/// Classic DNS-over-UDP payload limit
const INITIAL_BUFFER_SIZE: usize = 512;

const MAX_BUFFER_SIZE: usize = 65_535;

const MAX_GROWTH_ROUNDS: usize = 8;

/// UDP payload size advertised through EDNS0
const EDNS_PAYLOAD: u16 = 4096;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const FALLBACK_SERVER: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 53);

/// Anything that can tell which addresses a name currently resolves to
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Resolve `host` and return the textual addresses found in the answer section
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<String>, DnsLookupError>;
}

/// Stateless wire-level resolver
#[derive(Debug, Clone)]
pub struct DnsResolver {
    servers: Vec<SocketAddr>,
    timeout: Duration,
}

impl DnsResolver {
    /// Create a resolver that queries `server` when given, the system nameservers otherwise
    pub fn new(server: Option<SocketAddr>) -> Self {
        match server {
            Some(server) => Self::with_servers(vec![server]),
            None => Self::with_servers(system_servers()),
        }
    }

    /// Create a resolver from the `resolver` config section
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.server()?))
    }

    /// Create a resolver that queries `servers` in order
    pub fn with_servers(servers: Vec<SocketAddr>) -> Self {
        Self {
            servers,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    /// Resolve `host` for `record_type`
    ///
    /// A records yield dotted-decimal text and AAAA records canonical IPv6
    /// text. Other record types in the answer section are skipped. Servers
    /// are tried in order; a server that cannot be reached or answers
    /// SERVFAIL hands over to the next one.
    pub async fn resolve(&self, host: &str, record_type: RecordType) -> Result<Vec<String>, DnsLookupError> {
        debug!("Resolve domain \"{}\" ({})", host, record_type);

        let name = Name::from_ascii(host)
            .map_err(|e| DnsLookupError::new(DnsErrorKind::Unknown, host, format!("invalid name: {}", e)))?;

        let mut last_error =
            DnsLookupError::new(DnsErrorKind::Retry, host, "no nameserver configured");

        for server in &self.servers {
            match self.query_server(*server, host, &name, record_type).await {
                Ok(addresses) => return Ok(addresses),
                Err(e) if e.is_retryable() => {
                    debug!("Nameserver {} failed: {}", server, e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    async fn query_server(
        &self,
        server: SocketAddr,
        host: &str,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Vec<String>, DnsLookupError> {
        let mut buffer_size = INITIAL_BUFFER_SIZE;
        let mut received = 0;

        for _ in 0..MAX_GROWTH_ROUNDS {
            buffer_size = (buffer_size + received).min(MAX_BUFFER_SIZE);

            let (id, query) = build_query(host, name, record_type)?;
            let mut buffer = vec![0u8; buffer_size];
            received = self.exchange_udp(server, host, &query, &mut buffer).await?;
            debug!("Response payload size: {}, buffer size: {}", received, buffer_size);

            if received < buffer_size {
                let response = decode_response(host, id, &buffer[..received])?;
                if response.truncated() {
                    debug!("Response for {} truncated, retrying over TCP", host);
                    let (id, query) = build_query(host, name, record_type)?;
                    let payload = self.exchange_tcp(server, host, &query).await?;
                    return addresses(host, &decode_response(host, id, &payload)?);
                }
                return addresses(host, &response);
            }

            if buffer_size >= MAX_BUFFER_SIZE {
                break;
            }
        }

        Err(DnsLookupError::new(
            DnsErrorKind::Parse,
            host,
            format!("response did not fit in {} bytes", buffer_size),
        ))
    }

    async fn exchange_udp(
        &self,
        server: SocketAddr,
        host: &str,
        query: &[u8],
        buffer: &mut [u8],
    ) -> Result<usize, DnsLookupError> {
        let transport = |e: std::io::Error| DnsLookupError::new(DnsErrorKind::Retry, host, e.to_string());

        let socket = UdpSocket::bind(unspecified_for(server)).await.map_err(transport)?;
        socket.connect(server).await.map_err(transport)?;
        socket.send(query).await.map_err(transport)?;

        match tokio::time::timeout(self.timeout, socket.recv(buffer)).await {
            Ok(result) => result.map_err(transport),
            Err(_) => Err(DnsLookupError::new(
                DnsErrorKind::Retry,
                host,
                format!("no answer from {} within {:?}", server, self.timeout),
            )),
        }
    }

    async fn exchange_tcp(&self, server: SocketAddr, host: &str, query: &[u8]) -> Result<Vec<u8>, DnsLookupError> {
        let exchange = async {
            let mut stream = TcpStream::connect(server).await?;
            let length = u16::try_from(query.len())
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "query too large"))?;
            stream.write_all(&length.to_be_bytes()).await?;
            stream.write_all(query).await?;

            let length = stream.read_u16().await?;
            let mut payload = vec![0u8; usize::from(length)];
            stream.read_exact(&mut payload).await?;
            Ok::<_, std::io::Error>(payload)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result.map_err(|e| DnsLookupError::new(DnsErrorKind::Retry, host, e.to_string())),
            Err(_) => Err(DnsLookupError::new(
                DnsErrorKind::Retry,
                host,
                format!("no TCP answer from {} within {:?}", server, self.timeout),
            )),
        }
    }
}

#[async_trait]
impl RecordLookup for DnsResolver {
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<String>, DnsLookupError> {
        self.resolve(host, record_type).await
    }
}

/// Nameservers from the system resolver configuration
///
/// Falls back to `127.0.0.1:53` when the configuration cannot be read or
/// lists no servers.
pub fn system_servers() -> Vec<SocketAddr> {
    match hickory_resolver::system_conf::read_system_conf() {
        Ok((config, _)) => {
            let mut servers = Vec::new();
            for name_server in config.name_servers() {
                if !servers.contains(&name_server.socket_addr) {
                    servers.push(name_server.socket_addr);
                }
            }
            if !servers.is_empty() {
                return servers;
            }
            warn!("System resolver configuration lists no nameserver, using {}", FALLBACK_SERVER);
        }
        Err(e) => {
            warn!("Unable to read system resolver configuration ({}), using {}", e, FALLBACK_SERVER);
        }
    }

    vec![FALLBACK_SERVER]
}

fn unspecified_for(server: SocketAddr) -> SocketAddr {
    if server.is_ipv4() {
        SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
    } else {
        SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)
    }
}

fn wire_type(record_type: RecordType) -> rr::RecordType {
    match record_type {
        RecordType::A => rr::RecordType::A,
        RecordType::Aaaa => rr::RecordType::AAAA,
        RecordType::Txt => rr::RecordType::TXT,
        RecordType::Soa => rr::RecordType::SOA,
    }
}

fn build_query(host: &str, name: &Name, record_type: RecordType) -> Result<(u16, Vec<u8>), DnsLookupError> {
    let id: u16 = rand::random();

    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_PAYLOAD);

    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name.clone(), wire_type(record_type)));
    message.set_edns(edns);

    let bytes = message
        .to_vec()
        .map_err(|e| DnsLookupError::new(DnsErrorKind::Unknown, host, format!("unable to encode query: {}", e)))?;

    Ok((id, bytes))
}

fn decode_response(host: &str, id: u16, payload: &[u8]) -> Result<Message, DnsLookupError> {
    let response = Message::from_vec(payload)
        .map_err(|e| DnsLookupError::new(DnsErrorKind::Parse, host, format!("malformed response: {}", e)))?;

    if response.id() != id {
        return Err(DnsLookupError::new(
            DnsErrorKind::Parse,
            host,
            format!("response id {} does not match query id {}", response.id(), id),
        ));
    }

    Ok(response)
}

/// Map the response code and collect A/AAAA answers
fn addresses(host: &str, response: &Message) -> Result<Vec<String>, DnsLookupError> {
    let code = response.response_code();
    let kind = match code {
        ResponseCode::NoError if response.answers().is_empty() => DnsErrorKind::NoData,
        ResponseCode::NoError => {
            return Ok(response
                .answers()
                .iter()
                .filter_map(|record| match record.data() {
                    Some(RData::A(a)) => Some(a.0.to_string()),
                    Some(RData::AAAA(aaaa)) => Some(aaaa.0.to_string()),
                    _ => None,
                })
                .collect());
        }
        ResponseCode::NXDomain => DnsErrorKind::NxDomain,
        ResponseCode::ServFail => DnsErrorKind::Retry,
        ResponseCode::FormErr => DnsErrorKind::Parse,
        _ => DnsErrorKind::Unknown,
    };

    Err(DnsLookupError::new(kind, host, format!("server answered {}", code)))
}
