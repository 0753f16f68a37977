//! Cloudflare API v4 driver
//!
//! Overwrites an existing record:
//! `PUT /zones/{zone_id}/dns_records/{record_id}` with a bearer token.
//!
//! The record name defaults to the subdomain's FQDN; a `sub_domain` parameter
//! overrides it. Optional `ttl` (seconds, default 30, `1` means automatic)
//! and `proxied` (default off) are passed through.

use async_trait::async_trait;
use ddnsc_core::driver::{optional, required, Driver, DriverDetail, DriverParams, DriverRequest, HttpMethod};
use ddnsc_core::error::DriverError;
use serde_json::{json, Value};

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

const DEFAULT_TTL: &str = "30";

#[derive(Debug, Default, Clone, Copy)]
pub struct CloudflareDriver;

#[async_trait]
impl Driver for CloudflareDriver {
    fn detail(&self) -> DriverDetail {
        DriverDetail::new(
            "cloudflare",
            "Cloudflare DDNS driver",
            crate::AUTHOR,
            env!("CARGO_PKG_VERSION"),
        )
    }

    fn required_params(&self) -> Vec<&str> {
        vec!["zone_id", "record_id", "token", "ip_addr", "rd_type", "fqdn"]
    }

    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
        self.check_required_params(params)?;

        let ttl_param = optional(params, "ttl", DEFAULT_TTL);
        let ttl: u32 = ttl_param.trim().parse().map_err(|_| DriverError::InvalidParameter {
            name: "ttl".to_string(),
            message: format!("{:?} is not a number of seconds", ttl_param),
        })?;

        let name = match params.get("sub_domain") {
            Some(name) => name.as_str(),
            None => required(params, "fqdn")?,
        };

        let body = json!({
            "type": required(params, "rd_type")?,
            "name": name,
            "content": required(params, "ip_addr")?,
            "ttl": ttl,
            "proxied": crate::is_truthy(optional(params, "proxied", "0")),
        });

        let url = format!(
            "{}/zones/{}/dns_records/{}",
            API_BASE,
            required(params, "zone_id")?,
            required(params, "record_id")?
        );

        Ok(DriverRequest::new(HttpMethod::Put, url)
            .with_header("Authorization", crate::bearer(required(params, "token")?))
            .with_raw(body.to_string(), "application/json"))
    }

    async fn check_response(&self, body: &str) -> bool {
        tracing::trace!("Got {:?} from server", body);

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Cloudflare returned a malformed response ({}): {}", e, body);
                return false;
            }
        };

        if json.get("success").and_then(Value::as_bool) == Some(true) {
            return true;
        }

        match json.get("errors").and_then(Value::as_array) {
            Some(errors) if !errors.is_empty() => {
                for error in errors {
                    tracing::error!(
                        "Error from Cloudflare: {} (code {})",
                        error.get("message").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                        error.get("code").map(serde_json::Value::to_string).unwrap_or_default()
                    );
                }
            }
            _ => tracing::error!("Cloudflare returned an unknown error, raw response: {}", body),
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::params;
    use ddnsc_core::driver::RequestBody;

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("zone_id", "z1"),
            ("record_id", "r1"),
            ("token", "secret"),
            ("ip_addr", "192.0.2.1"),
            ("rd_type", "A"),
            ("fqdn", "home.example.com"),
        ]
    }

    fn body_json(request: &DriverRequest) -> Value {
        match &request.body {
            RequestBody::Raw { content, content_type } => {
                assert_eq!(content_type, "application/json");
                serde_json::from_str(content).unwrap()
            }
            other => panic!("expected a raw body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_shape() {
        let request = CloudflareDriver.generate_request(&params(&base())).await.unwrap();

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(
            request.url,
            "https://api.cloudflare.com/client/v4/zones/z1/dns_records/r1"
        );
        assert_eq!(
            request.headers,
            vec![("Authorization".to_string(), "Bearer secret".to_string())]
        );
        assert_eq!(
            body_json(&request),
            json!({
                "type": "A",
                "name": "home.example.com",
                "content": "192.0.2.1",
                "ttl": 30,
                "proxied": false,
            })
        );
    }

    #[tokio::test]
    async fn test_optional_params() {
        let mut pairs = base();
        pairs.extend([("sub_domain", "home"), ("ttl", "120"), ("proxied", "true")]);

        let request = CloudflareDriver.generate_request(&params(&pairs)).await.unwrap();
        let body = body_json(&request);

        assert_eq!(body["name"], "home");
        assert_eq!(body["ttl"], 120);
        assert_eq!(body["proxied"], true);
    }

    #[tokio::test]
    async fn test_bad_ttl() {
        let mut pairs = base();
        pairs.push(("ttl", "soon"));

        let err = CloudflareDriver.generate_request(&params(&pairs)).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameter { ref name, .. } if name == "ttl"));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let pairs: Vec<_> = base().into_iter().filter(|(k, _)| *k != "token").collect();

        let err = CloudflareDriver.generate_request(&params(&pairs)).await.unwrap_err();
        assert_eq!(err, DriverError::MissingRequiredParameter("token".to_string()));
    }

    #[tokio::test]
    async fn test_check_response() {
        assert!(CloudflareDriver.check_response(r#"{"success":true,"errors":[],"result":{}}"#).await);
        assert!(
            !CloudflareDriver
                .check_response(r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}]}"#)
                .await
        );
        assert!(!CloudflareDriver.check_response(r#"{"result":null}"#).await);
        assert!(!CloudflareDriver.check_response("<html>502</html>").await);
    }
}
