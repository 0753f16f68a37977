//! Drivers living in a separate executable
//!
//! The host spawns the executable once and talks to it over stdin/stdout,
//! one JSON document per line:
//!
//! ```text
//! > {"op":"describe"}
//! < {"detail":{"name":"my-provider","description":"","author":"","version":"1.0"},
//!    "driver_version":"ddnsc-driver/1","required_params":["token"]}
//! > {"op":"generate_request","params":{"ip_addr":"192.0.2.1","token":"…"}}
//! < {"request":{"url":"https://…","method":"GET"}}
//! > {"op":"check_response","body":"good 192.0.2.1"}
//! < {"success":true}
//! ```
//!
//! `generate_request` may instead answer
//! `{"error":{"kind":"missing_required_parameter","message":"token"}}`.
//! The child is killed when the driver is dropped.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{Driver, DriverDetail, DriverParams, DriverRequest};
use crate::error::{DriverError, DriverLoadError};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Call<'a> {
    Describe,
    GenerateRequest { params: &'a DriverParams },
    CheckResponse { body: &'a str },
}

#[derive(Deserialize)]
struct DescribeReply {
    detail: DriverDetail,
    driver_version: String,
    #[serde(default)]
    required_params: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateReply {
    request: Option<DriverRequest>,
    error: Option<PluginFailure>,
}

#[derive(Deserialize)]
struct PluginFailure {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CheckReply {
    success: bool,
}

struct Channel {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set once an exchange was cut short; the stream can no longer be trusted
    broken: bool,
}

impl Channel {
    async fn call<R: DeserializeOwned>(&mut self, call: &Call<'_>) -> Result<R, String> {
        if self.broken {
            return Err("driver channel closed after an earlier failure".to_string());
        }

        let mut line = serde_json::to_string(call).map_err(|e| e.to_string())?;
        line.push('\n');

        let exchange = async {
            self.stdin.write_all(line.as_bytes()).await.map_err(|e| e.to_string())?;
            self.stdin.flush().await.map_err(|e| e.to_string())?;
            match self.stdout.next_line().await {
                Ok(Some(reply)) => Ok::<_, String>(reply),
                Ok(None) => Err("driver process closed its output".to_string()),
                Err(e) => Err(e.to_string()),
            }
        };

        let reply = match tokio::time::timeout(CALL_TIMEOUT, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(message)) => return Err(self.poison(message)),
            Err(_) => return Err(self.poison(format!("no reply within {:?}", CALL_TIMEOUT))),
        };

        serde_json::from_str(&reply).map_err(|e| format!("malformed reply: {}", e))
    }

    fn poison(&mut self, message: String) -> String {
        self.broken = true;
        if let Err(e) = self.child.start_kill() {
            debug!("Unable to kill driver process: {}", e);
        }
        message
    }
}

/// A driver served by a child process
pub struct ExternalDriver {
    path: PathBuf,
    detail: DriverDetail,
    driver_version: String,
    required: Vec<String>,
    channel: Mutex<Channel>,
}

impl std::fmt::Debug for ExternalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalDriver")
            .field("path", &self.path)
            .field("detail", &self.detail)
            .field("driver_version", &self.driver_version)
            .finish()
    }
}

impl ExternalDriver {
    /// Start the executable at `path` and ask it to describe itself
    pub async fn spawn(path: &Path) -> Result<Self, DriverLoadError> {
        let handshake = |message: String| DriverLoadError::Handshake {
            path: path.to_path_buf(),
            message,
        };

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DriverLoadError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| handshake("stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| handshake("stdout is not piped".to_string()))?;

        let mut channel = Channel {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            broken: false,
        };

        let reply: DescribeReply = channel.call(&Call::Describe).await.map_err(handshake)?;
        debug!("Driver {} at {} described itself", reply.detail.name, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            detail: reply.detail,
            driver_version: reply.driver_version,
            required: reply.required_params,
            channel: Mutex::new(channel),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn plugin_error(&self, message: impl Into<String>) -> DriverError {
        DriverError::Plugin {
            driver: self.detail.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Driver for ExternalDriver {
    fn detail(&self) -> DriverDetail {
        self.detail.clone()
    }

    fn driver_version(&self) -> &str {
        &self.driver_version
    }

    fn required_params(&self) -> Vec<&str> {
        self.required.iter().map(String::as_str).collect()
    }

    async fn generate_request(&self, params: &DriverParams) -> Result<DriverRequest, DriverError> {
        let reply: GenerateReply = self
            .channel
            .lock()
            .await
            .call(&Call::GenerateRequest { params })
            .await
            .map_err(|message| self.plugin_error(message))?;

        match (reply.request, reply.error) {
            (_, Some(failure)) if failure.kind == "missing_required_parameter" => {
                Err(DriverError::MissingRequiredParameter(failure.message))
            }
            (_, Some(failure)) => Err(self.plugin_error(failure.message)),
            (Some(request), None) => Ok(request),
            (None, None) => Err(self.plugin_error("reply carries neither a request nor an error")),
        }
    }

    async fn check_response(&self, body: &str) -> bool {
        let reply: Result<CheckReply, String> = self.channel.lock().await.call(&Call::CheckResponse { body }).await;

        match reply {
            Ok(reply) => reply.success,
            Err(message) => {
                error!("Driver {} could not check the response: {}", self.detail.name, message);
                false
            }
        }
    }
}
