//! Dotmesh Core - Shared types and the pure half of config synthesis
//!
//! This crate turns a classified list of mesh peers into the address lists
//! a node announces, bootstraps from and peers with, and merges them into
//! the storage daemon's configuration document.

pub mod error;
pub mod merge;
pub mod multiaddr;
pub mod select;
pub mod template;
pub mod types;

pub use error::{Error, Result};
pub use merge::{merge_config, merge_objects, ComputedConfig, ConfigDocument};
pub use multiaddr::{build_announce, dedupe, AddressPrefix};
pub use select::{sample, select_bootstrap, select_peering, PeeringParams};
pub use template::RoleTemplates;
pub use types::*;

/// Default swarm port of the storage daemon
pub const DEFAULT_PORT: u16 = 4001;

/// Number of server nodes sampled into the bootstrap list
pub const BOOTSTRAP_K: usize = 8;

/// Ring neighbours taken on each side of the local node
pub const PEERING_RING: usize = 3;

/// Extra randomly chosen peering neighbours
pub const PEERING_RANDOM: usize = 3;
