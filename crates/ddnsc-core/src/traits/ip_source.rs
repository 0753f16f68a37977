// # IP Source Trait
//
// Reads addresses straight from the host's network interfaces.
//
// ## Implementations
//
// - getifaddrs-based (Unix): `ddnsc-netif` crate
//
// ## Usage
//
// ```rust,ignore
// let source = /* IpSource implementation */;
//
// for name in source.interfaces()? {
//     println!("{}: {:?}", name, source.interface_addresses(&name).await?);
// }
// ```

use async_trait::async_trait;
use std::net::{IpAddr, Ipv6Addr};

use crate::config::IpFamily;

/// Trait for interface address enumeration
///
/// Implementations must be thread-safe; one instance is shared by every
/// worker.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Names of every interface on the host
    fn interfaces(&self) -> Result<Vec<String>, crate::Error>;

    /// Addresses currently assigned to `interface`, in the order the host reports them
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<IpAddr>)`: possibly empty
    /// - `Err(Error)`: if the interface cannot be queried
    async fn interface_addresses(&self, interface: &str) -> Result<Vec<IpAddr>, crate::Error>;
}

/// fe80::/10
pub fn is_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// fec0::/10 (deprecated site-local)
pub fn is_site_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfec0
}

/// fc00::/7
pub fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// Which interface addresses may be published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub family: IpFamily,
    /// Admit link-local and site-local IPv6 addresses
    pub allow_local_link: bool,
    /// Admit unique local IPv6 addresses
    pub allow_ula: bool,
}

impl AddressFilter {
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        if !self.family.matches(ip) {
            return false;
        }

        match ip {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => {
                if !self.allow_local_link && (is_link_local(v6) || is_site_local(v6)) {
                    return false;
                }
                self.allow_ula || !is_unique_local(v6)
            }
        }
    }

    /// First address accepted by this filter
    pub fn first(&self, candidates: &[IpAddr]) -> Option<IpAddr> {
        candidates.iter().copied().find(|ip| self.accepts(ip))
    }
}
