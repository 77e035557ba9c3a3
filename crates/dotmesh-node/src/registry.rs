//! Node registry readers
//!
//! The on-chain directory is consumed as a snapshot: a JSON array of
//! entries `{ address, name, APIs, CIDs, lastUpdate }` kept fresh by an
//! external poller. Every synthesis run re-reads it.

use dotmesh_core::{Error, PeerRecord, RegistryEntry, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Source of the shared peer list
#[allow(async_fn_in_trait)]
pub trait Registry: Send + Sync {
    /// All peer records, in registry order
    async fn peer_records(&self) -> Result<Vec<PeerRecord>>;
}

/// Parse a registry snapshot, skipping entries that do not deserialize
pub fn parse_snapshot(text: &str) -> Result<Vec<PeerRecord>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| Error::Parse(format!("registry snapshot: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::Parse("registry snapshot is not a JSON array".to_string()));
    };

    let total = items.len();
    let records: Vec<PeerRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<RegistryEntry>(item) {
            Ok(entry) => Some(PeerRecord::from(entry)),
            Err(e) => {
                tracing::warn!("Skipping malformed registry entry #{}: {}", i, e);
                None
            }
        })
        .collect();

    tracing::debug!("Registry snapshot: {} of {} entries usable", records.len(), total);
    Ok(records)
}

/// Snapshot stored in a local file
#[derive(Debug, Clone)]
pub struct SnapshotRegistry {
    path: PathBuf,
}

impl SnapshotRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Registry for SnapshotRegistry {
    async fn peer_records(&self) -> Result<Vec<PeerRecord>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::UpstreamUnavailable(format!("reading registry {}: {}", self.path.display(), e))
        })?;
        parse_snapshot(&text)
    }
}

/// Snapshot served over HTTP
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    url: String,
}

impl HttpRegistry {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::UpstreamUnavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Registry for HttpRegistry {
    async fn peer_records(&self) -> Result<Vec<PeerRecord>> {
        let unavailable = |e: reqwest::Error| Error::UpstreamUnavailable(format!("fetching registry {}: {}", self.url, e));
        let text = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;
        parse_snapshot(&text)
    }
}

/// A registry snapshot already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    records: Vec<PeerRecord>,
}

impl MemoryRegistry {
    pub fn new(records: Vec<PeerRecord>) -> Self {
        Self { records }
    }
}

impl Registry for MemoryRegistry {
    async fn peer_records(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.records.clone())
    }
}

/// Registry chosen from a configured source string
#[derive(Debug, Clone)]
pub enum RegistrySource {
    File(SnapshotRegistry),
    Http(HttpRegistry),
}

impl RegistrySource {
    /// `http://` and `https://` sources are fetched, anything else is a path
    pub fn from_source(source: &str, timeout: Duration) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Ok(RegistrySource::Http(HttpRegistry::new(source, timeout)?))
        } else {
            Ok(RegistrySource::File(SnapshotRegistry::new(
                crate::config::expand_path(source),
            )))
        }
    }
}

impl Registry for RegistrySource {
    async fn peer_records(&self) -> Result<Vec<PeerRecord>> {
        match self {
            RegistrySource::File(registry) => registry.peer_records().await,
            RegistrySource::Http(registry) => registry.peer_records().await,
        }
    }
}
