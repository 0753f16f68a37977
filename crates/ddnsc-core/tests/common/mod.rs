//! Test doubles and common utilities for contract tests
//!
//! Every double counts its calls so tests can assert on what the worker
//! did, not only on what it reported.

#![allow(dead_code)]

use async_trait::async_trait;
use ddnsc_core::config::{DomainConfig, IpFamily, IpSourceKind, RecordType, SubdomainConfig};
use ddnsc_core::driver::{required, Driver, DriverDetail, DriverParams, DriverRequest};
use ddnsc_core::error::{DnsErrorKind, DnsLookupError, DriverError, Result, TransportError};
use ddnsc_core::worker::{Backends, Worker, WorkerOptions};
use ddnsc_core::{HttpTransport, IpSource, RecordLookup};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

/// Interface table with fixed addresses
#[derive(Default)]
pub struct MockIpSource {
    interfaces: HashMap<String, Vec<IpAddr>>,
    calls: AtomicUsize,
}

impl MockIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, name: &str, addresses: &[&str]) -> Self {
        self.interfaces
            .insert(name.to_string(), addresses.iter().map(|a| ip(a)).collect());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for MockIpSource {
    fn interfaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.interfaces.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn interface_addresses(&self, interface: &str) -> Result<Vec<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.interfaces
            .get(interface)
            .cloned()
            .ok_or_else(|| ddnsc_core::Error::ip_source(format!("no interface {}", interface)))
    }
}

/// Answers lookups from a script, then from a fixed answer
pub struct ScriptedLookup {
    script: Mutex<VecDeque<std::result::Result<Vec<String>, DnsLookupError>>>,
    answer: std::result::Result<Vec<String>, DnsLookupError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedLookup {
    /// Always resolve to `records`
    pub fn records(records: &[&str]) -> Self {
        Self::answer(Ok(records.iter().map(|r| r.to_string()).collect()))
    }

    /// Always fail with `kind`
    pub fn failing(kind: DnsErrorKind) -> Self {
        Self::answer(Err(DnsLookupError::new(kind, "test", "scripted failure")))
    }

    fn answer(answer: std::result::Result<Vec<String>, DnsLookupError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            answer,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail with `kind` `times` times before falling back to the fixed answer
    pub fn after_failures(self, kind: DnsErrorKind, times: usize) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for _ in 0..times {
                script.push_back(Err(DnsLookupError::new(kind, "test", "scripted failure")));
            }
        }
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordLookup for ScriptedLookup {
    async fn lookup(&self, _host: &str, _record_type: RecordType) -> std::result::Result<Vec<String>, DnsLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.answer.clone())
    }
}

/// Records every executed request and answers with canned bodies
pub struct RecordingTransport {
    requests: Mutex<Vec<(DriverRequest, IpFamily, Option<String>)>>,
    bodies: HashMap<String, String>,
    default_body: String,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            bodies: HashMap::new(),
            default_body: "good".to_string(),
            fail: AtomicBool::new(false),
        }
    }

    /// Answer requests to `url` with `body`
    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    /// Make every request fail at the transport level
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<DriverRequest> {
        self.requests.lock().unwrap().iter().map(|(r, _, _)| r.clone()).collect()
    }

    pub fn bindings(&self) -> Vec<(IpFamily, Option<String>)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, family, interface)| (*family, interface.clone()))
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(
        &self,
        request: &DriverRequest,
        family: IpFamily,
        interface: Option<&str>,
    ) -> std::result::Result<String, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), family, interface.map(str::to_string)));

        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Request {
                url: request.url.clone(),
                message: "connection refused".to_string(),
            });
        }

        Ok(self
            .bodies
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| self.default_body.clone()))
    }
}

pub const UPDATE_URL: &str = "https://dyn.example.net/update";

/// Builds `GET UPDATE_URL?host=<fqdn>&ip=<ip_addr>` and accepts bodies starting with "good"
pub struct RecordingDriver {
    required: Vec<&'static str>,
    params: Mutex<Vec<DriverParams>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            required: vec!["ip_addr", "fqdn"],
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn requiring(mut self, key: &'static str) -> Self {
        self.required.push(key);
        self
    }

    /// Parameter maps handed to `generate_request`, in call order
    pub fn seen_params(&self) -> Vec<DriverParams> {
        self.params.lock().unwrap().clone()
    }

    pub fn generate_count(&self) -> usize {
        self.params.lock().unwrap().len()
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn detail(&self) -> DriverDetail {
        DriverDetail::new("recording", "Records generated requests", "tests", "0.1.0")
    }

    fn required_params(&self) -> Vec<&str> {
        self.required.clone()
    }

    async fn generate_request(&self, params: &DriverParams) -> std::result::Result<DriverRequest, DriverError> {
        self.params.lock().unwrap().push(params.clone());
        Ok(DriverRequest::get(format!(
            "{}?host={}&ip={}",
            UPDATE_URL,
            required(params, "fqdn")?,
            required(params, "ip_addr")?
        )))
    }

    async fn check_response(&self, body: &str) -> bool {
        body.starts_with("good")
    }
}

pub fn subdomain(name: &str, record_type: RecordType, interface: &str) -> SubdomainConfig {
    SubdomainConfig {
        name: name.to_string(),
        record_type,
        interface: interface.to_string(),
        ip_type: IpFamily::Unspecified,
        ip_source: IpSourceKind::Interface,
        ip_source_param: String::new(),
        allow_ula: false,
        allow_local_link: false,
        driver_param: Default::default(),
    }
}

pub fn domain(name: &str, subdomains: Vec<SubdomainConfig>) -> DomainConfig {
    DomainConfig {
        name: name.to_string(),
        update_interval: 300,
        force_update: 0,
        driver: "recording".to_string(),
        subdomains,
    }
}

/// Lookup retries without waiting
pub fn fast_options() -> WorkerOptions {
    WorkerOptions {
        max_retries: 5,
        retry_backoff: Duration::ZERO,
    }
}

/// Bundle of doubles a worker runs against
pub struct Harness {
    pub ip_source: Arc<MockIpSource>,
    pub lookup: Arc<ScriptedLookup>,
    pub transport: Arc<RecordingTransport>,
    pub driver: Arc<RecordingDriver>,
}

impl Harness {
    pub fn new(ip_source: MockIpSource, lookup: ScriptedLookup, transport: RecordingTransport) -> Self {
        Self {
            ip_source: Arc::new(ip_source),
            lookup: Arc::new(lookup),
            transport: Arc::new(transport),
            driver: Arc::new(RecordingDriver::new()),
        }
    }

    pub fn with_driver(mut self, driver: RecordingDriver) -> Self {
        self.driver = Arc::new(driver);
        self
    }

    pub fn backends(&self) -> Backends {
        Backends {
            lookup: self.lookup.clone(),
            ip_source: self.ip_source.clone(),
            transport: self.transport.clone(),
        }
    }

    pub fn worker(&self, domain: DomainConfig) -> Worker {
        Worker::new(domain, self.driver.clone(), self.backends(), fast_options())
    }
}
