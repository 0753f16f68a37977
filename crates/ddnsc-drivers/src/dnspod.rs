//! DNSPod driver
//!
//! Posts a `Record.Ddns` form. Mainland accounts use `dnsapi.cn`; set
//! `global` to a truthy value for `api.dnspod.com`. `record_line` defaults
//! to `default`.

use async_trait::async_trait;
use ddnsc_core::driver::{optional, required, Driver, DriverDetail, DriverParams, DriverRequest, HttpMethod};
use ddnsc_core::error::DriverError;
use serde_json::Value;

const API_URL_CN: &str = "https://dnsapi.cn/Record.Ddns";

const API_URL_GLOBAL: &str = "https://api.dnspod.com/Record.Ddns";

#[derive(Debug, Default, Clone, Copy)]
pub struct DnspodDriver;

#[async_trait]
impl Driver for DnspodDriver {
    fn detail(&self) -> DriverDetail {
        DriverDetail::new("dnspod", "DNSPod DDNS driver", crate::AUTHOR, env!("CARGO_PKG_VERSION"))
    }

    fn required_params(&self) -> Vec<&str> {
        vec!["domain_id", "record_id", "subdomain", "login_token", "ip_addr"]
    }

    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
        self.check_required_params(params)?;

        let url = if crate::is_truthy(optional(params, "global", "false")) {
            API_URL_GLOBAL
        } else {
            API_URL_CN
        };

        Ok(DriverRequest::new(HttpMethod::Post, url).with_form([
            ("login_token", required(params, "login_token")?),
            ("domain_id", required(params, "domain_id")?),
            ("record_id", required(params, "record_id")?),
            ("sub_domain", required(params, "subdomain")?),
            ("record_line", optional(params, "record_line", "default")),
            ("value", required(params, "ip_addr")?),
            ("format", "json"),
        ]))
    }

    async fn check_response(&self, body: &str) -> bool {
        tracing::trace!("Got {:?} from server", body);

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("DNSPod returned a malformed response ({}): {}", e, body);
                return false;
            }
        };

        let Some(status) = json.get("status") else {
            tracing::error!("DNSPod returned an unknown error, raw response: {}", body);
            return false;
        };

        let code = status.get("code").and_then(Value::as_str).unwrap_or_default();
        if code == "1" {
            return true;
        }

        tracing::error!(
            "Error from DNSPod: {}, code: {}",
            status.get("message").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            code
        );
        false
    }
}
