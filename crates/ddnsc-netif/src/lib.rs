// # Interface IP Source
//
// This crate reads interface addresses straight from the host with
// getifaddrs(3).
//
// ## Platform Support
//
// Unix only. On other platforms every call fails with an IP source error,
// so configurations that rely on the `url` ip source keep working.

use ddnsc_core::traits::IpSource;
use ddnsc_core::{Error, Result};
use std::net::IpAddr;

/// getifaddrs-based IP source
#[derive(Debug, Default, Clone, Copy)]
pub struct NetifIpSource;

impl NetifIpSource {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
mod sys {
    use super::*;
    use nix::ifaddrs::getifaddrs;
    use std::net::{SocketAddrV4, SocketAddrV6};

    /// Every (interface, address) pair the host reports, in host order
    pub(super) fn interface_addresses() -> Result<Vec<(String, Option<IpAddr>)>> {
        let addrs = getifaddrs().map_err(|e| Error::ip_source(format!("getifaddrs failed: {}", e)))?;

        Ok(addrs
            .map(|ifaddr| {
                let ip = ifaddr.address.as_ref().and_then(|storage| {
                    if let Some(v4) = storage.as_sockaddr_in() {
                        Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()))
                    } else {
                        storage
                            .as_sockaddr_in6()
                            .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
                    }
                });
                (ifaddr.interface_name, ip)
            })
            .collect())
    }
}

#[cfg(not(unix))]
mod sys {
    use super::*;

    pub(super) fn interface_addresses() -> Result<Vec<(String, Option<IpAddr>)>> {
        Err(Error::ip_source("interface enumeration is not supported on this platform"))
    }
}

#[async_trait::async_trait]
impl IpSource for NetifIpSource {
    fn interfaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = sys::interface_addresses()?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn interface_addresses(&self, interface: &str) -> Result<Vec<IpAddr>> {
        let entries = sys::interface_addresses()?;

        if !entries.iter().any(|(name, _)| name == interface) {
            return Err(Error::ip_source(format!("interface {} not found", interface)));
        }

        let addresses: Vec<IpAddr> = entries
            .into_iter()
            .filter(|(name, _)| name == interface)
            .filter_map(|(_, ip)| ip)
            .collect();

        tracing::debug!("Interface {} addresses: {:?}", interface, addresses);
        Ok(addresses)
    }
}
