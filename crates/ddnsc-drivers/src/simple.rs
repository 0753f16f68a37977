//! Plain GET driver
//!
//! Calls `url` as is. When a `format` parameter is present, every `{key}`
//! placeholder in the URL is replaced by the value of the parameter literally
//! named `{key}`:
//!
//! ```json
//! "driver_param": {
//!     "url": "https://dyn.example.net/update?host={host}&ip={ip}",
//!     "format": "1",
//!     "{host}": "home.example.com",
//!     "{ip}": "192.0.2.1"
//! }
//! ```
//!
//! Placeholders without a matching parameter are left untouched. Any answer
//! counts as success.

use async_trait::async_trait;
use ddnsc_core::driver::{required, Driver, DriverDetail, DriverParams, DriverRequest};
use ddnsc_core::error::DriverError;

#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleDriver;

impl SimpleDriver {
    fn expand(url: &str, params: &DriverParams) -> String {
        params
            .iter()
            .filter(|(key, _)| key.len() > 2 && key.starts_with('{') && key.ends_with('}'))
            .fold(url.to_string(), |url, (key, value)| url.replace(key.as_str(), value))
    }
}

#[async_trait]
impl Driver for SimpleDriver {
    fn detail(&self) -> DriverDetail {
        DriverDetail::new("simple", "Simple HTTP driver", crate::AUTHOR, env!("CARGO_PKG_VERSION"))
    }

    fn required_params(&self) -> Vec<&str> {
        vec!["url"]
    }

    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
        self.check_required_params(params)?;
        let url = required(params, "url")?;

        let url = if params.contains_key("format") {
            Self::expand(url, params)
        } else {
            url.to_string()
        };

        Ok(DriverRequest::get(url))
    }

    async fn check_response(&self, body: &str) -> bool {
        tracing::trace!("Got {:?} from server", body);
        true
    }
}
