// # Built-in Drivers
//
// Provider adapters compiled into the daemon. Each one only describes the
// HTTP call and judges the answer; the worker owns the network.
//
// | name            | provider                         |
// |-----------------|----------------------------------|
// | `simple`        | any URL that takes a GET         |
// | `cloudflare`    | Cloudflare API v4                |
// | `digital_ocean` | DigitalOcean API v2              |
// | `dnspod`        | DNSPod (China and global)        |
//
// Plugins loaded from `driver.driver_dir` register next to these and may not
// reuse their names.

pub mod cloudflare;
pub mod digital_ocean;
pub mod dnspod;
pub mod simple;

use ddnsc_core::driver::DriverManager;
use ddnsc_core::error::DriverLoadError;
use std::sync::Arc;

pub use cloudflare::CloudflareDriver;
pub use digital_ocean::DigitalOceanDriver;
pub use dnspod::DnspodDriver;
pub use simple::SimpleDriver;

const AUTHOR: &str = "ddnsc";

/// Register every built-in driver
pub fn register(manager: &mut DriverManager) -> Result<(), DriverLoadError> {
    manager.register(Arc::new(SimpleDriver))?;
    manager.register(Arc::new(CloudflareDriver))?;
    manager.register(Arc::new(DigitalOceanDriver))?;
    manager.register(Arc::new(DnspodDriver))?;
    Ok(())
}

/// `1`, `true`, `yes` and `on` in any case
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
