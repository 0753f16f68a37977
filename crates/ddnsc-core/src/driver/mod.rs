//! Driver contract
//!
//! A driver turns generic update parameters into one concrete HTTP call
//! against a DNS hosting provider and judges the provider's answer. Drivers
//! never perform I/O themselves; the worker executes the request they
//! describe.
//!
//! ## Parameters
//!
//! The worker hands every driver the subdomain's `driver_param` entries plus
//! the following keys, unless the user already supplied them:
//!
//! | key         | value                                   |
//! |-------------|-----------------------------------------|
//! | `domain`    | domain name (`example.com`)             |
//! | `subdomain` | subdomain label (`home`)                |
//! | `fqdn`      | fully qualified name (`home.example.com`) |
//! | `rd_type`   | `A`, `AAAA`, `TXT` or `SOA`             |
//! | `ip_addr`   | the address to publish                  |
//!
//! ## Example
//!
//! ```rust,ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl Driver for Echo {
//!     fn detail(&self) -> DriverDetail {
//!         DriverDetail::new("echo", "Echo driver", "ddnsc", "1.0.0")
//!     }
//!
//!     fn required_params(&self) -> Vec<&str> {
//!         vec!["url"]
//!     }
//!
//!     async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
//!         Ok(DriverRequest::get(required(params, "url")?))
//!     }
//!
//!     async fn check_response(&self, _body: &str) -> bool {
//!         true
//!     }
//! }
//! ```

pub mod external;
pub mod manager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::DriverError;

pub use external::ExternalDriver;
pub use manager::{DriverManager, LoadStatus};

/// Contract version every driver must report from [`Driver::driver_version`]
pub const DRIVER_ABI_VERSION: &str = "ddnsc-driver/1";

/// Parameters handed to a driver
pub type DriverParams = BTreeMap<String, String>;

/// Static identity of a driver; `name` is its registry key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDetail {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
}

impl DriverDetail {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            author: author.into(),
            version: version.into(),
        }
    }
}

/// HTTP method of a driver request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a driver request; GET requests always go out without one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` key/value pairs
    Form { fields: Vec<(String, String)> },
    /// Raw payload with an explicit content type
    Raw { content: String, content_type: String },
}

/// A concrete HTTP call described by a driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRequest {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: RequestBody,
    /// Multi-valued: the same name may appear more than once
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl DriverRequest {
    /// A body-less GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_form<K: Into<String>, V: Into<String>>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self {
        self.body = RequestBody::Form {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        };
        self
    }

    pub fn with_raw(mut self, content: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Raw {
            content: content.into(),
            content_type: content_type.into(),
        };
        self
    }
}

/// Logs the method, URL, body and headers; credentials are masked
impl fmt::Display for DriverRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;

        match &self.body {
            RequestBody::Empty => {}
            RequestBody::Form { fields } => {
                f.write_str(" form {")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    let sep = if i == 0 { "" } else { "&" };
                    if is_credential(name) {
                        write!(f, "{}{}=<redacted>", sep, name)?;
                    } else {
                        write!(f, "{}{}={}", sep, name, value)?;
                    }
                }
                f.write_str("}")?;
            }
            RequestBody::Raw { content, content_type } => write!(f, " {} {}", content_type, content)?,
        }

        for (name, value) in &self.headers {
            if is_credential(name) {
                write!(f, " [{}: <redacted>]", name)?;
            } else {
                write!(f, " [{}: {}]", name, value)?;
            }
        }
        Ok(())
    }
}

fn is_credential(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "authorization" || name.contains("token")
}

/// Provider adapter
///
/// Implementations must be thread-safe: after startup a single instance is
/// shared by every worker using it.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Static identity; `name` is the key the driver is registered under
    fn detail(&self) -> DriverDetail;

    /// Contract version this driver was built against
    fn driver_version(&self) -> &str {
        DRIVER_ABI_VERSION
    }

    /// Keys that must be present in the parameter map
    fn required_params(&self) -> Vec<&str>;

    /// Fail with [`DriverError::MissingRequiredParameter`] on the first absent required key
    fn check_required_params(&self, params: &DriverParams) -> Result<(), DriverError> {
        match self.required_params().into_iter().find(|key| !params.contains_key(*key)) {
            Some(key) => Err(DriverError::MissingRequiredParameter(key.to_string())),
            None => Ok(()),
        }
    }

    /// Describe the HTTP call that publishes `params["ip_addr"]`
    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError>;

    /// Whether the provider accepted the update; malformed bodies are `false`
    async fn check_response(&self, body: &str) -> bool;
}

/// Look up a parameter that must be present
pub fn required<'a>(params: &'a DriverParams, key: &str) -> Result<&'a str, DriverError> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| DriverError::MissingRequiredParameter(key.to_string()))
}

/// Look up an optional parameter
pub fn optional<'a>(params: &'a DriverParams, key: &str, default: &'a str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or(default)
}
