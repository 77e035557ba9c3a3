//! Local storage daemon RPC client
//!
//! Talks to the daemon's `/api/v0` HTTP API. Every call carries its own
//! deadline; nothing here retries. Restarts go through the process
//! supervisor instead, as a configured shell command.

use crate::config::DaemonConfig;
use dotmesh_core::{ConfigDocument, Error, Result};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Operations the synthesizer needs from the daemon
#[allow(async_fn_in_trait)]
pub trait Daemon: Send + Sync {
    /// Peer ID of the local node
    async fn local_peer_id(&self) -> Result<String>;

    /// The daemon's live configuration
    async fn current_config(&self) -> Result<ConfigDocument>;

    /// Replace the daemon's configuration in one step
    async fn replace_config(&self, config: &ConfigDocument) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

/// Serialize a configuration the way the replace endpoint expects it
pub fn render_config(config: &ConfigDocument) -> Result<Vec<u8>> {
    let mut body = serde_json::to_vec_pretty(config)?;
    body.push(b'\n');
    Ok(body)
}

/// HTTP client for the daemon API
#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: reqwest::Client,
    api_base: String,
    read_timeout: Duration,
    apply_timeout: Duration,
    shutdown_timeout: Duration,
}

impl DaemonClient {
    pub fn new(config: &DaemonConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            read_timeout: config.read_timeout(),
            apply_timeout: config.apply_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.api_base, command)
    }

    /// POST a read-only command and decode its JSON answer
    async fn read<T: DeserializeOwned>(&self, command: &str) -> Result<T> {
        let unavailable = |e: reqwest::Error| Error::UpstreamUnavailable(format!("daemon {command}: {e}"));
        let resp = self
            .client
            .post(self.endpoint(command))
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        let body = resp.text().await.map_err(unavailable)?;
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "daemon {command}: HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        serde_json::from_str(&body).map_err(|e| Error::Parse(format!("daemon {command} response: {e}")))
    }

    /// Ask the daemon to shut down
    pub async fn shutdown(&self) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint("shutdown"))
            .timeout(self.shutdown_timeout)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("daemon shutdown: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "daemon shutdown: HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Restarts the daemon through its process supervisor
#[derive(Debug, Clone)]
pub struct RestartCommand {
    command: String,
    timeout: Duration,
}

impl RestartCommand {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.restart_command.clone(), config.restart_timeout())
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command in a login shell; killed if it outlives the deadline
    pub async fn run(&self) -> Result<()> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("bash");
            c.arg("-lc").arg(&self.command);
            c
        };
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Restart(format!("spawning `{}`: {}", self.command, e))),
            Err(_) => {
                return Err(Error::Restart(format!(
                    "`{}` timed out after {:?}",
                    self.command, self.timeout
                )))
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Restart(format!(
                "`{}` exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        tracing::info!("Daemon restarted with `{}`", self.command);
        Ok(())
    }
}

impl Daemon for DaemonClient {
    async fn local_peer_id(&self) -> Result<String> {
        let id: IdResponse = self.read("id").await?;
        Ok(id.id)
    }

    async fn current_config(&self) -> Result<ConfigDocument> {
        self.read("config/show").await
    }

    async fn replace_config(&self, config: &ConfigDocument) -> Result<()> {
        let body = render_config(config)?;
        let part = Part::bytes(body)
            .file_name("config")
            .mime_str("application/octet-stream")
            .map_err(|e| Error::Apply(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(self.endpoint("config/replace"))
            .timeout(self.apply_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Apply(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::ApplyRejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        tracing::info!("Daemon configuration replaced");
        Ok(())
    }
}

pub mod mock {
    //! In-memory daemon for tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves a fixed identity and config, records replacements
    pub struct MockDaemon {
        peer_id: String,
        config: Mutex<ConfigDocument>,
        replaced: Mutex<Vec<ConfigDocument>>,
        reject_with: Option<(u16, String)>,
        offline: bool,
        apply_delay: Option<Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl MockDaemon {
        pub fn new(peer_id: &str, config: ConfigDocument) -> Self {
            Self {
                peer_id: peer_id.to_string(),
                config: Mutex::new(config),
                replaced: Mutex::new(Vec::new()),
                reject_with: None,
                offline: false,
                apply_delay: None,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        /// Hold every replace open for `delay` before it completes
        pub fn with_apply_delay(mut self, delay: Duration) -> Self {
            self.apply_delay = Some(delay);
            self
        }

        /// Most replace calls that were ever running at the same time
        pub fn peak_concurrent_applies(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        /// Answer every replace with the given HTTP error
        pub fn rejecting(mut self, status: u16, body: &str) -> Self {
            self.reject_with = Some((status, body.to_string()));
            self
        }

        /// Fail every read as unreachable
        pub fn offline(mut self) -> Self {
            self.offline = true;
            self
        }

        /// All configs that were applied, oldest first
        pub fn replaced(&self) -> Vec<ConfigDocument> {
            self.replaced.lock().unwrap().clone()
        }
    }

    impl Daemon for MockDaemon {
        async fn local_peer_id(&self) -> Result<String> {
            if self.offline {
                return Err(Error::UpstreamUnavailable("daemon id: connection refused".into()));
            }
            Ok(self.peer_id.clone())
        }

        async fn current_config(&self) -> Result<ConfigDocument> {
            if self.offline {
                return Err(Error::UpstreamUnavailable("daemon config/show: connection refused".into()));
            }
            Ok(self.config.lock().unwrap().clone())
        }

        async fn replace_config(&self, config: &ConfigDocument) -> Result<()> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.apply_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some((status, body)) = &self.reject_with {
                return Err(Error::ApplyRejected {
                    status: *status,
                    body: body.clone(),
                });
            }
            *self.config.lock().unwrap() = config.clone();
            self.replaced.lock().unwrap().push(config.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_config_is_indented_with_newline() {
        let config = match json!({"Bootstrap": ["/ip4/1.2.3.4/tcp/4001/p2p/abc"]}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let body = String::from_utf8(render_config(&config).unwrap()).unwrap();
        assert!(body.starts_with("{\n  \"Bootstrap\": [\n"));
        assert!(body.ends_with("}\n"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = DaemonConfig {
            api_base: "http://127.0.0.1:5001/".to_string(),
            ..DaemonConfig::default()
        };
        let client = DaemonClient::new(&config).unwrap();
        assert_eq!(client.endpoint("config/show"), "http://127.0.0.1:5001/api/v0/config/show");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_upstream_failure() {
        // bind and release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DaemonConfig {
            api_base: format!("http://127.0.0.1:{port}"),
            read_timeout_ms: 500,
            ..DaemonConfig::default()
        };
        let client = DaemonClient::new(&config).unwrap();
        assert!(client.local_peer_id().await.unwrap_err().is_upstream());
        assert!(client.current_config().await.unwrap_err().is_upstream());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_command_outcomes() {
        let ok = RestartCommand::new("exit 0", Duration::from_secs(5));
        ok.run().await.unwrap();

        let failing = RestartCommand::new("echo 'no process named ipfs' >&2; exit 3", Duration::from_secs(5));
        match failing.run().await {
            Err(Error::Restart(msg)) => assert!(msg.contains("no process named ipfs"), "{msg}"),
            other => panic!("expected Restart error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_command_deadline() {
        let slow = RestartCommand::new("sleep 5", Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = slow.run().await.unwrap_err();
        assert!(matches!(err, Error::Restart(ref msg) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_restart_command_from_config() {
        let restart = RestartCommand::from_config(&DaemonConfig::default());
        assert_eq!(restart.command(), "pm2 restart ipfs");
    }
}
