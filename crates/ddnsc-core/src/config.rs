//! Configuration types for the ddnsc agent
//!
//! The configuration is a single JSON document:
//!
//! ```json
//! {
//!   "driver": { "driver_dir": "/usr/lib/ddnsc", "load": ["my-provider"] },
//!   "resolver": { "use_custom_server": true, "ipaddress": "1.1.1.1", "port": 53 },
//!   "domains": [{
//!     "name": "example.com",
//!     "update_interval": 300,
//!     "force_update": 86400,
//!     "driver": "cloudflare",
//!     "subdomains": [{
//!       "name": "home",
//!       "type": "a",
//!       "interface": "eth0",
//!       "ip_source": "interface",
//!       "ip_source_param": "",
//!       "driver_param": { "zone_id": "…", "record_id": "…", "token": "…" }
//!     }]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::dns;
use crate::error::ConfigError;

/// Smallest accepted `update_interval`, in seconds
pub const MIN_UPDATE_INTERVAL: u64 = 60;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Driver loading settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// DNS resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Domains to keep up to date
    pub domains: Vec<DomainConfig>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validate the configuration against the loaded drivers and the host's interfaces
    ///
    /// # Parameters
    ///
    /// - `drivers`: names of every registered driver
    /// - `interfaces`: names of every network interface on the host
    pub fn validate<D: AsRef<str>, I: AsRef<str>>(
        &self,
        drivers: &[D],
        interfaces: &[I],
    ) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::invalid("No domains configured"));
        }

        for domain in &self.domains {
            domain.validate(drivers, interfaces)?;
        }

        self.resolver.server()?;

        Ok(())
    }

    /// Paths of the external drivers to load, de-duplicated in order
    pub fn driver_paths(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.driver
            .load
            .iter()
            .filter(|entry| seen.insert(entry.as_str()))
            .map(|entry| match &self.driver.driver_dir {
                Some(dir) if !dir.as_os_str().is_empty() => dir.join(entry),
                _ => PathBuf::from(entry),
            })
            .collect()
    }

    /// Total number of subdomains across all domains
    pub fn total_subdomains(&self) -> usize {
        self.domains.iter().map(|d| d.subdomains.len()).sum()
    }
}

/// Driver loading settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Directory prepended to every entry of `load`
    #[serde(default)]
    pub driver_dir: Option<PathBuf>,

    /// External driver executables to load
    #[serde(default)]
    pub load: Vec<String>,
}

/// DNS resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Query `ip_address:port` instead of the system nameservers
    #[serde(default)]
    pub use_custom_server: bool,

    #[serde(default, rename = "ipaddress")]
    pub ip_address: String,

    #[serde(default = "default_dns_port")]
    pub port: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            use_custom_server: false,
            ip_address: String::new(),
            port: default_dns_port(),
        }
    }
}

impl ResolverConfig {
    /// The custom nameserver, if one is configured
    ///
    /// IPv6 literals are only accepted when the resolver supports IPv6
    /// nameservers on this platform.
    pub fn server(&self) -> Result<Option<SocketAddr>, ConfigError> {
        if !self.use_custom_server {
            return Ok(None);
        }

        let literal = self
            .ip_address
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']');

        match literal.parse::<IpAddr>() {
            Ok(ip @ IpAddr::V4(_)) => Ok(Some(SocketAddr::new(ip, self.port))),
            Ok(ip @ IpAddr::V6(_)) if dns::IPV6_SERVER_SUPPORTED => Ok(Some(SocketAddr::new(ip, self.port))),
            _ => Err(ConfigError::InvalidResolver(self.ip_address.clone())),
        }
    }
}

fn default_dns_port() -> u16 {
    53
}

/// A domain and the subdomains kept up to date under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name (e.g., "example.com")
    pub name: String,

    /// Seconds between two passes
    pub update_interval: u64,

    /// Maximum staleness in seconds before an update is forced (0 disables)
    #[serde(default)]
    pub force_update: u64,

    /// Name of the driver that performs updates
    pub driver: String,

    #[serde(default)]
    pub subdomains: Vec<SubdomainConfig>,
}

impl DomainConfig {
    /// Validate a single domain
    pub fn validate<D: AsRef<str>, I: AsRef<str>>(
        &self,
        drivers: &[D],
        interfaces: &[I],
    ) -> Result<(), ConfigError> {
        if !drivers.iter().any(|d| d.as_ref() == self.driver) {
            return Err(ConfigError::UnknownDriver {
                domain: self.name.clone(),
                driver: self.driver.clone(),
            });
        }

        if self.update_interval < MIN_UPDATE_INTERVAL {
            return Err(ConfigError::IntervalTooLow {
                domain: self.name.clone(),
                interval: self.update_interval,
                minimum: MIN_UPDATE_INTERVAL,
            });
        }

        if self.force_update != 0 && self.force_update < self.update_interval {
            return Err(ConfigError::ForceUpdateTooLow {
                domain: self.name.clone(),
                force_update: self.force_update,
                interval: self.update_interval,
            });
        }

        for subdomain in &self.subdomains {
            subdomain.validate(&self.name, interfaces)?;
        }

        Ok(())
    }
}

/// A single record kept up to date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdomainConfig {
    /// Label under the domain; empty or "@" means the domain apex
    pub name: String,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Interface to read the address from and to send requests through
    #[serde(default)]
    pub interface: String,

    #[serde(default)]
    pub ip_type: IpFamily,

    #[serde(default)]
    pub ip_source: IpSourceKind,

    /// URL for the `url` ip source
    #[serde(default)]
    pub ip_source_param: String,

    /// Accept unique local IPv6 addresses (fc00::/7)
    #[serde(default)]
    pub allow_ula: bool,

    /// Accept link-local and site-local IPv6 addresses (fe80::/10, fec0::/10)
    #[serde(default)]
    pub allow_local_link: bool,

    /// Parameters handed to the driver
    #[serde(default)]
    pub driver_param: BTreeMap<String, String>,
}

impl SubdomainConfig {
    /// Fully qualified name of this record under `domain`
    pub fn fqdn(&self, domain: &str) -> String {
        match self.name.as_str() {
            "" | "@" => domain.to_string(),
            name => format!("{}.{}", name, domain),
        }
    }

    /// Address family used to pick candidates and to bind outgoing requests
    pub fn address_family(&self) -> IpFamily {
        match self.record_type {
            RecordType::A => IpFamily::V4,
            RecordType::Aaaa => IpFamily::V6,
            RecordType::Txt | RecordType::Soa => self.ip_type,
        }
    }

    /// The outbound interface, if one is configured
    pub fn interface(&self) -> Option<&str> {
        (!self.interface.is_empty()).then_some(self.interface.as_str())
    }

    fn validate<I: AsRef<str>>(&self, domain: &str, interfaces: &[I]) -> Result<(), ConfigError> {
        if let Some(interface) = self.interface() {
            if !interfaces.iter().any(|i| i.as_ref() == interface) {
                return Err(ConfigError::UnknownInterface(interface.to_string()));
            }
        }

        match self.ip_source {
            IpSourceKind::Interface if self.interface.is_empty() => Err(ConfigError::invalid(format!(
                "subdomain {} uses the interface ip source but names no interface",
                self.fqdn(domain)
            ))),
            IpSourceKind::Url if self.ip_source_param.trim().is_empty() => Err(ConfigError::invalid(format!(
                "subdomain {} uses the url ip source but ip_source_param is empty",
                self.fqdn(domain)
            ))),
            _ => Ok(()),
        }
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    A,
    Aaaa,
    Txt,
    Soa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Txt => "TXT",
            RecordType::Soa => "SOA",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IP address family filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
}

impl IpFamily {
    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpFamily::Unspecified => true,
            IpFamily::V4 => ip.is_ipv4(),
            IpFamily::V6 => ip.is_ipv6(),
        }
    }
}

/// Where a subdomain's address comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpSourceKind {
    #[default]
    Interface,
    Url,
}
