//! DigitalOcean API v2 driver
//!
//! `PUT /v2/domains/{domain}/records/{record_id}` with `{"data": ip}`.

use async_trait::async_trait;
use ddnsc_core::driver::{required, Driver, DriverDetail, DriverParams, DriverRequest, HttpMethod};
use ddnsc_core::error::DriverError;
use serde_json::{json, Value};

const API_BASE: &str = "https://api.digitalocean.com/v2";

#[derive(Debug, Default, Clone, Copy)]
pub struct DigitalOceanDriver;

#[async_trait]
impl Driver for DigitalOceanDriver {
    fn detail(&self) -> DriverDetail {
        DriverDetail::new(
            "digital_ocean",
            "Digital Ocean DDNS driver",
            crate::AUTHOR,
            env!("CARGO_PKG_VERSION"),
        )
    }

    fn required_params(&self) -> Vec<&str> {
        vec!["domain", "record_id", "token", "ip_addr"]
    }

    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
        self.check_required_params(params)?;

        let url = format!(
            "{}/domains/{}/records/{}",
            API_BASE,
            required(params, "domain")?,
            required(params, "record_id")?
        );
        let body = json!({ "data": required(params, "ip_addr")? });

        Ok(DriverRequest::new(HttpMethod::Put, url)
            .with_header("Authorization", crate::bearer(required(params, "token")?))
            .with_raw(body.to_string(), "application/json"))
    }

    async fn check_response(&self, body: &str) -> bool {
        tracing::trace!("Got {:?} from server", body);

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("DigitalOcean returned a malformed response ({}): {}", e, body);
                return false;
            }
        };

        if json.get("domain_record").is_some() {
            return true;
        }

        match json.get("message").and_then(Value::as_str) {
            Some(message) => tracing::error!("Error from DigitalOcean: {}", message),
            None => tracing::error!("DigitalOcean returned an unknown error, raw response: {}", body),
        }
        false
    }
}
