// # HTTP Transport
//
// This crate executes the requests drivers describe, using reqwest.
//
// ## Binding
//
// Every request is bound to the address family of the record it updates,
// so an AAAA update leaves through IPv6 and an A update through IPv4. When
// the subdomain names an interface, the request is additionally bound to
// that device (Linux, Android and Fuchsia only).
//
// ## Responses
//
// The body is returned whatever the status code: providers report errors in
// the body and only the driver knows how to read it.

use ddnsc_core::config::IpFamily;
use ddnsc_core::driver::{DriverRequest, HttpMethod, RequestBody};
use ddnsc_core::error::TransportError;
use ddnsc_core::traits::HttpTransport;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

/// Connect and overall request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("ddnsc/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed transport
///
/// Clients are built lazily, one per (family, interface) binding, and
/// reused afterwards.
pub struct ReqwestTransport {
    clients: Mutex<HashMap<(IpFamily, Option<String>), Client>>,
    timeout: Duration,
    system_proxy: bool,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            timeout,
            system_proxy: true,
        }
    }

    /// Ignore proxies configured through the environment
    pub fn without_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    fn client(&self, family: IpFamily, interface: Option<&str>) -> Result<Client, TransportError> {
        let key = (family, interface.map(str::to_string));
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(family, interface, self.timeout, self.system_proxy)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(
    family: IpFamily,
    interface: Option<&str>,
    timeout: Duration,
    system_proxy: bool,
) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout);

    if !system_proxy {
        builder = builder.no_proxy();
    }

    builder = match family {
        IpFamily::V4 => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        IpFamily::V6 => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
        IpFamily::Unspecified => builder,
    };

    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    if let Some(interface) = interface {
        builder = builder.interface(interface);
    }

    #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
    if let Some(interface) = interface {
        tracing::debug!("Binding to interface {} is not supported on this platform", interface);
    }

    builder.build().map_err(|e| TransportError::Client(e.to_string()))
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &DriverRequest,
        family: IpFamily,
        interface: Option<&str>,
    ) -> Result<String, TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid URL {:?}: {}", request.url, e)))?;
        let client = self.client(family, interface)?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(url),
            HttpMethod::Post => client.post(url),
            HttpMethod::Put => client.put(url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if request.method != HttpMethod::Get {
            builder = match &request.body {
                RequestBody::Empty => builder,
                RequestBody::Form { fields } => builder.form(fields),
                RequestBody::Raw { content, content_type } => builder
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(content.clone()),
            };
        }

        tracing::debug!("Sending {}", request);

        let response = builder.send().await.map_err(|e| TransportError::Request {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Response {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!("{} {} answered {}", request.method, request.url, status);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new().without_proxy()
    }

    /// Answer one request with `status` and `body`, returning the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/update", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];

            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_get_carries_no_body() {
        let (url, server) = serve_once("200 OK", "good 192.0.2.1").await;
        let request = DriverRequest::get(url).with_form([("ignored", "x")]);

        let body = transport()
            .execute(&request, IpFamily::V4, None)
            .await
            .unwrap();

        assert_eq!(body, "good 192.0.2.1");
        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /update"));
        assert!(!raw.contains("ignored=x"));
        assert!(raw.contains(USER_AGENT));
    }

    #[tokio::test]
    async fn test_post_form_and_headers() {
        let (url, server) = serve_once("200 OK", "{}").await;
        let request = DriverRequest::new(HttpMethod::Post, url)
            .with_header("Authorization", "Bearer t")
            .with_form([("record_id", "42"), ("value", "192.0.2.1")]);

        transport()
            .execute(&request, IpFamily::Unspecified, None)
            .await
            .unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /update"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer t"));
        assert!(raw.contains("application/x-www-form-urlencoded"));
        assert!(raw.ends_with("record_id=42&value=192.0.2.1"));
    }

    #[tokio::test]
    async fn test_put_raw_body() {
        let (url, server) = serve_once("200 OK", "{}").await;
        let request =
            DriverRequest::new(HttpMethod::Put, url).with_raw(r#"{"data":"192.0.2.1"}"#, "application/json");

        transport()
            .execute(&request, IpFamily::V4, None)
            .await
            .unwrap();

        let raw = server.await.unwrap();
        assert!(raw.starts_with("PUT /update"));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(raw.ends_with(r#"{"data":"192.0.2.1"}"#));
    }

    #[tokio::test]
    async fn test_error_status_still_returns_body() {
        let (url, server) = serve_once("401 Unauthorized", "badauth").await;

        let body = transport()
            .execute(&DriverRequest::get(url), IpFamily::V4, None)
            .await
            .unwrap();

        assert_eq!(body, "badauth");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let result = transport()
            .execute(&DriverRequest::get("not a url"), IpFamily::V4, None)
            .await;

        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let result = transport()
            .execute(&DriverRequest::get(url), IpFamily::V4, None)
            .await;

        assert!(matches!(result, Err(TransportError::Request { .. })));
    }

    #[test]
    fn test_clients_are_cached_per_binding() {
        let transport = transport();
        transport.client(IpFamily::V4, None).unwrap();
        transport.client(IpFamily::V4, None).unwrap();
        transport.client(IpFamily::V6, None).unwrap();

        assert_eq!(transport.clients.lock().unwrap().len(), 2);
    }
}
