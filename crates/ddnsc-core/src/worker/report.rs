//! What a pass did

use std::fmt;
use std::net::IpAddr;

use crate::error::DriverError;

/// Result of one subdomain within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubdomainOutcome {
    /// The provider accepted the new address
    Updated { ip: IpAddr },
    /// The published record already matches
    Unchanged { ip: IpAddr },
    /// The request went through but the provider refused it
    UpdateRejected { ip: IpAddr },
    /// The update request could not be performed
    TransportFailed { ip: IpAddr, message: String },
    /// No usable address was found
    NoAddress,
    /// The driver could not build a request
    DriverFailed(DriverError),
}

impl SubdomainOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, SubdomainOutcome::Updated { .. } | SubdomainOutcome::Unchanged { .. })
    }
}

impl fmt::Display for SubdomainOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubdomainOutcome::Updated { ip } => write!(f, "updated to {}", ip),
            SubdomainOutcome::Unchanged { ip } => write!(f, "unchanged ({})", ip),
            SubdomainOutcome::UpdateRejected { ip } => write!(f, "update to {} rejected", ip),
            SubdomainOutcome::TransportFailed { ip, message } => write!(f, "update to {} failed: {}", ip, message),
            SubdomainOutcome::NoAddress => write!(f, "no usable address"),
            SubdomainOutcome::DriverFailed(e) => write!(f, "driver error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdomainReport {
    pub fqdn: String,
    pub outcome: SubdomainOutcome,
}

/// Summary of one pass over a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub domain: String,
    /// Whether this pass was a forced refresh
    pub forced: bool,
    pub subdomains: Vec<SubdomainReport>,
}

impl PassReport {
    /// Outcome recorded for `fqdn`
    pub fn outcome(&self, fqdn: &str) -> Option<&SubdomainOutcome> {
        self.subdomains
            .iter()
            .find(|report| report.fqdn == fqdn)
            .map(|report| &report.outcome)
    }

    pub fn updated(&self) -> usize {
        self.count(|outcome| matches!(outcome, SubdomainOutcome::Updated { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|outcome| matches!(outcome, SubdomainOutcome::Unchanged { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(SubdomainOutcome::is_failure)
    }

    fn count(&self, predicate: impl Fn(&SubdomainOutcome) -> bool) -> usize {
        self.subdomains.iter().filter(|report| predicate(&report.outcome)).count()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}: {} updated, {} unchanged, {} failed",
            self.domain,
            if self.forced { " (forced)" } else { "" },
            self.updated(),
            self.unchanged(),
            self.failed()
        )
    }
}
