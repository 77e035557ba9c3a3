//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local storage daemon
    pub daemon: DaemonConfig,

    /// Node registry snapshot source
    pub registry: RegistryConfig,

    /// Address and peer selection
    pub synthesis: SynthesisConfig,

    /// Role template overrides
    pub templates: TemplatesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Base URL of the daemon's HTTP RPC API
    pub api_base: String,
    /// Timeout for identity and config reads, in milliseconds
    pub read_timeout_ms: u64,
    /// Timeout for the config replace call, in milliseconds
    pub apply_timeout_ms: u64,
    /// Timeout for the shutdown call, in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Shell command that restarts the daemon process
    pub restart_command: String,
    /// Deadline for the restart command, in milliseconds
    pub restart_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to a JSON snapshot, or an http(s) URL serving one
    pub source: String,
    /// Fetch timeout for URL sources, in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Swarm port probed and assumed for every peer
    pub default_port: u16,
    /// Public nodes sampled into the bootstrap list
    pub bootstrap_k: usize,
    /// Ring neighbours on each side
    pub peering_ring: usize,
    /// Random peering neighbours
    pub peering_random: usize,
    /// Per-connection probe deadline, in milliseconds
    pub dial_timeout_ms: u64,
    /// Peers probed at the same time
    pub probe_concurrency: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory with default.json, dhtclient.json and dhtserver.json
    pub dir: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:5001".to_string(),
            read_timeout_ms: 700,
            apply_timeout_ms: 12_000,
            shutdown_timeout_ms: 8_000,
            restart_command: "pm2 restart ipfs".to_string(),
            restart_timeout_ms: 10_000,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            source: "~/.dotmesh/registry.json".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_port: dotmesh_core::DEFAULT_PORT,
            bootstrap_k: dotmesh_core::BOOTSTRAP_K,
            peering_ring: dotmesh_core::PEERING_RING,
            peering_random: dotmesh_core::PEERING_RANDOM,
            dial_timeout_ms: 1_200,
            probe_concurrency: dotmesh_net::classify::DEFAULT_CONCURRENCY,
        }
    }
}

impl DaemonConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }
}

impl SynthesisConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn peering_params(&self) -> dotmesh_core::PeeringParams {
        dotmesh_core::PeeringParams {
            ring: self.peering_ring,
            random: self.peering_random,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Template directory with ~ expanded
    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.templates.dir.as_deref().map(expand_path)
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
