// # ddnsc-core
//
// Core library of the ddnsc dynamic DNS update agent.
//
// ## Architecture Overview
//
// - **RecordLookup / DnsResolver**: read the currently published record
// - **Driver / DriverManager**: provider adapters and their registry
// - **IpSource**: interface address enumeration
// - **HttpTransport**: executes the requests drivers describe
// - **Worker**: per-domain scheduler and update engine
// - **Engine**: validates the configuration and runs one worker per domain
//
// ## Design Principles
//
// 1. **Separation of Concerns**: drivers describe requests, the host executes them
// 2. **Plugin-Based**: drivers are looked up by name, built-in or external
// 3. **Library-First**: the daemon is a thin shell around `Engine`
// 4. **Failure Containment**: a failing subdomain never takes down its siblings

pub mod config;
pub mod dns;
pub mod driver;
pub mod engine;
pub mod error;
pub mod retry;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{Config, DomainConfig, IpFamily, IpSourceKind, RecordType, ResolverConfig, SubdomainConfig};
pub use dns::{DnsResolver, RecordLookup};
pub use driver::{
    Driver, DriverDetail, DriverManager, DriverParams, DriverRequest, HttpMethod, LoadStatus, RequestBody,
    DRIVER_ABI_VERSION,
};
pub use engine::{estimated_threads, Engine};
pub use error::{ConfigError, DnsErrorKind, DnsLookupError, DriverError, DriverLoadError, Error, Result, TransportError};
pub use retry::retry;
pub use traits::{HttpTransport, IpSource};
pub use worker::{Backends, PassReport, SubdomainOutcome, Worker, WorkerOptions};
