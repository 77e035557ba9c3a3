//! Dotmesh Net - Reachability probing and peer classification
//!
//! Resolves the API endpoints peers advertise in the registry into address
//! prefixes, probes their swarm ports and labels them by routing role.

pub mod classify;
pub mod normalize;
pub mod probe;
pub mod resolver;

pub use classify::RoleClassifier;
pub use normalize::{base_prefixes_from_urls, hosts_from_urls};
pub use probe::{Reachability, TcpProbe};
pub use resolver::{Resolver, SystemResolver};
