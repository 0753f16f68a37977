//! HTTP transport seam
//!
//! The worker never talks HTTP itself: it hands the [`DriverRequest`] a
//! driver produced to an [`HttpTransport`], bound to the subdomain's address
//! family and, when configured, its interface.

use async_trait::async_trait;

use crate::config::IpFamily;
use crate::driver::DriverRequest;
use crate::error::TransportError;

/// Executes driver requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform `request` and return the response body
    ///
    /// The body is returned whatever the HTTP status; judging it is the
    /// driver's job.
    async fn execute(
        &self,
        request: &DriverRequest,
        family: IpFamily,
        interface: Option<&str>,
    ) -> Result<String, TransportError>;
}
