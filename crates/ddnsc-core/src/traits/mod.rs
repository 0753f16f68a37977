//! Seams to the host
//!
//! - [`IpSource`]: enumerate interfaces and their addresses
//! - [`HttpTransport`]: execute a [`DriverRequest`](crate::driver::DriverRequest)

pub mod ip_source;
pub mod transport;

pub use ip_source::IpSource;
pub use transport::HttpTransport;
