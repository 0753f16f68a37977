//! Error types for the ddnsc agent
//!
//! Each failure domain gets its own enum so callers can decide, by
//! matching, whether a failure is fatal at startup, contained to a single
//! subdomain, or worth retrying.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ddnsc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A driver could not be loaded or registered
    #[error(transparent)]
    DriverLoad(#[from] DriverLoadError),

    /// A driver failed while serving a request
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// DNS lookup failed
    #[error(transparent)]
    Dns(#[from] DnsLookupError),

    /// HTTP transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Host address discovery failed
    #[error("IP source error: {0}")]
    IpSource(String),
}

impl Error {
    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }
}

/// Configuration errors; all of them are fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {path} not found")]
    NotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("driver {driver} not found (domain {domain})")]
    UnknownDriver { domain: String, driver: String },

    #[error("update interval too low for domain {domain} ({interval}), minimal interval: {minimum}")]
    IntervalTooLow {
        domain: String,
        interval: u64,
        minimum: u64,
    },

    #[error(
        "force update interval for domain {domain} ({force_update}) must not be smaller than the update interval ({interval})"
    )]
    ForceUpdateTooLow {
        domain: String,
        force_update: u64,
        interval: u64,
    },

    #[error("interface {0} not found")]
    UnknownInterface(String),

    #[error("invalid resolver address \"{0}\"")]
    InvalidResolver(String),

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a free-form validation error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Driver load errors; fatal for the load call that produced them
#[derive(Error, Debug)]
pub enum DriverLoadError {
    #[error("driver file {0} not found")]
    NotFound(PathBuf),

    /// The module could not be started
    #[error("unable to open driver {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The module started but did not answer the describe handshake
    #[error("driver {path} did not answer the handshake: {message}")]
    Handshake { path: PathBuf, message: String },

    /// The module was built against a different driver contract
    #[error("driver {driver} reports ABI version {found} instead of {expected}")]
    AbiMismatch {
        driver: String,
        found: String,
        expected: String,
    },

    #[error("a driver named {0} is already registered")]
    DuplicateName(String),

    #[error("driver {0} is not registered")]
    NotRegistered(String),
}

/// Errors raised by a driver while generating a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("missing required parameter \"{0}\"")]
    MissingRequiredParameter(String),

    #[error("invalid parameter \"{name}\": {message}")]
    InvalidParameter { name: String, message: String },

    /// An external driver failed or broke protocol
    #[error("driver {driver}: {message}")]
    Plugin { driver: String, message: String },
}

/// Classification of a DNS lookup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsErrorKind {
    /// The name does not exist
    NxDomain,
    /// Transient failure (timeout, SERVFAIL); retrying may help
    Retry,
    /// The name exists but has no records of the requested type
    NoData,
    /// The response could not be decoded
    Parse,
    /// Anything else
    Unknown,
}

impl DnsErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsErrorKind::NxDomain => "no such domain",
            DnsErrorKind::Retry => "retry",
            DnsErrorKind::NoData => "no data",
            DnsErrorKind::Parse => "dns record parse error",
            DnsErrorKind::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for DnsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed DNS lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("DNS lookup for {host} failed ({kind}): {detail}")]
pub struct DnsLookupError {
    pub kind: DnsErrorKind,
    pub host: String,
    pub detail: String,
}

impl DnsLookupError {
    pub fn new(kind: DnsErrorKind, host: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            host: host.into(),
            detail: detail.into(),
        }
    }

    /// Only `Retry` failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.kind == DnsErrorKind::Retry
    }
}

/// HTTP transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("HTTP request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("unexpected response from {url}: {message}")]
    Response { url: String, message: String },
}
