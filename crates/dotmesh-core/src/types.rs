//! Core data types for dotmesh

use crate::multiaddr::AddressPrefix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw entry of the shared on-chain node directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Owner account of the entry
    #[serde(default)]
    pub address: String,
    /// Composite `name-peerID` string
    pub name: String,
    /// Advertised HTTP API endpoints
    #[serde(rename = "APIs", default)]
    pub apis: Vec<String>,
    /// Advertised content-address pointers
    #[serde(rename = "CIDs", default)]
    pub cids: Vec<String>,
    /// Unix timestamp of the last directory update
    #[serde(rename = "lastUpdate", default)]
    pub last_update: u64,
}

/// A peer as published in the directory, with its composite name split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub peer_id: String,
    pub advertised_apis: Vec<String>,
}

impl PeerRecord {
    pub fn new(name: impl Into<String>, peer_id: impl Into<String>, apis: Vec<String>) -> Self {
        Self {
            name: name.into(),
            peer_id: peer_id.into(),
            advertised_apis: apis,
        }
    }
}

impl From<RegistryEntry> for PeerRecord {
    fn from(entry: RegistryEntry) -> Self {
        let (name, peer_id) = split_composite_name(&entry.name);
        Self {
            name: name.to_string(),
            peer_id: peer_id.to_string(),
            advertised_apis: entry.apis,
        }
    }
}

/// Split a `name-peerID` composite on its last hyphen.
///
/// Without a hyphen (or with only a leading one) the whole string is the
/// name and the peer ID is empty.
pub fn split_composite_name(full: &str) -> (&str, &str) {
    match full.rfind('-') {
        Some(i) if i > 0 => (&full[..i], &full[i + 1..]),
        _ => (full, ""),
    }
}

/// Routing role of a node, named after the daemon's routing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Swarm port not reachable from outside
    #[serde(rename = "dhtclient")]
    Client,
    /// Swarm port reachable, serves the DHT
    #[serde(rename = "dhtserver")]
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "dhtclient",
            Role::Server => "dhtserver",
        }
    }

    pub fn from_reachable(open: bool) -> Self {
        if open {
            Role::Server
        } else {
            Role::Client
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified peer, built fresh for every synthesis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDefinition {
    pub name: String,
    pub peer_id: String,
    pub role: Role,
    /// Deduplicated base prefixes the node is reachable under
    pub address_prefixes: Vec<AddressPrefix>,
    /// Swarm port
    pub port: u16,
}

impl NodeDefinition {
    pub fn new(
        record: &PeerRecord,
        role: Role,
        address_prefixes: Vec<AddressPrefix>,
        port: u16,
    ) -> Self {
        Self {
            name: record.name.clone(),
            peer_id: record.peer_id.clone(),
            role,
            address_prefixes: crate::multiaddr::dedupe(address_prefixes),
            port,
        }
    }

    pub fn has_addresses(&self) -> bool {
        !self.address_prefixes.is_empty()
    }

    pub fn is_public(&self) -> bool {
        self.role == Role::Server && self.has_addresses()
    }
}

/// A `Peering.Peers` entry in the daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringPeer {
    #[serde(rename = "ID")]
    pub peer_id: String,
    #[serde(rename = "Addrs")]
    pub addrs: Vec<String>,
}

/// Outcome of one synthesis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisReport {
    pub peer_id: String,
    pub role: Role,
    pub announce_count: usize,
    pub bootstrap_count: usize,
    pub peering_count: usize,
}
