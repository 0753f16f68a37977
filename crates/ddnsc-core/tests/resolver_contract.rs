//! Contract Test: Resolver
//!
//! Runs the resolver against an in-process nameserver on 127.0.0.1.
//!
//! Constraints verified:
//! - Responses larger than the initial 512-byte buffer are still read
//!   completely
//! - NXDOMAIN maps to `NxDomain`
//! - Silence maps to the retryable `Retry`
//! - A truncated UDP answer is completed over TCP
//! - Buffer growth stops at the 65535-byte ceiling and an undecodable
//!   payload maps to `Parse`

use ddnsc_core::config::RecordType;
use ddnsc_core::dns::DnsResolver;
use ddnsc_core::error::DnsErrorKind;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// Answer to a parsed query
fn answer(query: &Message, code: ResponseCode, records: usize, truncated: bool) -> Vec<u8> {
    let question = query.queries()[0].clone();
    let name = question.name().clone();

    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_truncated(truncated)
        .set_response_code(code)
        .add_query(question);

    for i in 0..records {
        let octet = u8::try_from(i % 250).unwrap();
        response.add_answer(Record::from_rdata(
            name.clone(),
            300,
            RData::A(A(Ipv4Addr::new(10, 0, (i / 250) as u8, octet))),
        ));
    }

    response.to_vec().unwrap()
}

/// Serve UDP queries with `records` A records, counting queries
async fn udp_server(code: ResponseCode, records: usize, truncated: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = queries.clone();

    tokio::spawn(async move {
        let mut buffer = vec![0u8; 4096];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buffer).await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let query = Message::from_vec(&buffer[..n]).unwrap();
            let reply = answer(&query, code, records, truncated);
            let _ = socket.send_to(&reply, peer).await;
        }
    });

    (addr, queries)
}

#[tokio::test]
async fn large_response_grows_the_buffer() {
    let (server, queries) = udp_server(ResponseCode::NoError, 60, false).await;
    let resolver = DnsResolver::with_servers(vec![server]);

    let records = resolver.resolve("big.example.test", RecordType::A).await.unwrap();

    assert_eq!(records.len(), 60);
    assert_eq!(records[0], "10.0.0.0");
    assert_eq!(records[59], "10.0.0.59");
    // the first 512-byte read cannot hold 60 answers
    assert!(queries.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn small_response_needs_one_query() {
    let (server, queries) = udp_server(ResponseCode::NoError, 1, false).await;
    let resolver = DnsResolver::with_servers(vec![server]);

    let records = resolver.resolve("home.example.test", RecordType::A).await.unwrap();

    assert_eq!(records, vec!["10.0.0.0".to_string()]);
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

/// Answer every query with `size` bytes that are not a DNS message
async fn garbage_server(size: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = queries.clone();

    tokio::spawn(async move {
        let mut buffer = vec![0u8; 4096];
        let payload = vec![0xffu8; size];
        loop {
            let Ok((_, peer)) = socket.recv_from(&mut buffer).await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = socket.send_to(&payload, peer).await;
        }
    });

    (addr, queries)
}

#[tokio::test]
async fn oversized_garbage_stops_at_the_buffer_ceiling() {
    // 512, 1024, ... 32768 are all filled; the 65535-byte buffer is not
    let (server, queries) = garbage_server(60_000).await;
    let resolver = DnsResolver::with_servers(vec![server]).with_timeout(Duration::from_secs(2));

    let err = resolver.resolve("big.example.test", RecordType::A).await.unwrap_err();

    assert_eq!(err.kind, DnsErrorKind::Parse);
    assert!(!err.is_retryable());
    assert_eq!(queries.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn small_garbage_is_a_parse_error() {
    let (server, queries) = garbage_server(40).await;
    let resolver = DnsResolver::with_servers(vec![server]);

    let err = resolver.resolve("home.example.test", RecordType::A).await.unwrap_err();

    assert_eq!(err.kind, DnsErrorKind::Parse);
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nxdomain_is_not_retryable() {
    let (server, _) = udp_server(ResponseCode::NXDomain, 0, false).await;
    let resolver = DnsResolver::with_servers(vec![server]);

    let err = resolver.resolve("missing.example.test", RecordType::A).await.unwrap_err();

    assert_eq!(err.kind, DnsErrorKind::NxDomain);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn empty_answer_is_nodata() {
    let (server, _) = udp_server(ResponseCode::NoError, 0, false).await;
    let resolver = DnsResolver::with_servers(vec![server]);

    let err = resolver.resolve("empty.example.test", RecordType::A).await.unwrap_err();
    assert_eq!(err.kind, DnsErrorKind::NoData);
}

#[tokio::test]
async fn silent_server_is_retryable() {
    // bound but never read
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let resolver = DnsResolver::with_servers(vec![silent.local_addr().unwrap()])
        .with_timeout(Duration::from_millis(200));

    let err = resolver.resolve("home.example.test", RecordType::A).await.unwrap_err();

    assert_eq!(err.kind, DnsErrorKind::Retry);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn next_server_is_tried_after_a_silent_one() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (server, queries) = udp_server(ResponseCode::NoError, 1, false).await;
    let resolver = DnsResolver::with_servers(vec![silent.local_addr().unwrap(), server])
        .with_timeout(Duration::from_millis(200));

    let records = resolver.resolve("home.example.test", RecordType::A).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn truncated_answer_falls_back_to_tcp() {
    let (server, _) = udp_server(ResponseCode::NoError, 0, true).await;
    let listener = TcpListener::bind(server).await.unwrap();

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let length = stream.read_u16().await.unwrap();
        let mut query = vec![0u8; usize::from(length)];
        stream.read_exact(&mut query).await.unwrap();

        let reply = answer(&Message::from_vec(&query).unwrap(), ResponseCode::NoError, 3, false);
        stream.write_all(&(reply.len() as u16).to_be_bytes()).await.unwrap();
        stream.write_all(&reply).await.unwrap();
    });

    let resolver = DnsResolver::with_servers(vec![server]);
    let records = resolver.resolve("tc.example.test", RecordType::A).await.unwrap();

    assert_eq!(records, vec!["10.0.0.0", "10.0.0.1", "10.0.0.2"]);
}
