//! Multiaddress prefixes and transport address synthesis
//!
//! A prefix names where a node lives (`/ip4/..`, `/dns6/..`, ...). Combined
//! with a port it yields the TCP and QUIC-v1 transport addresses the daemon
//! dials or announces. `/dnsaddr/` prefixes are already complete and are
//! always emitted unchanged.

use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Base of a multiaddress, before transport and identity layers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressPrefix {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    Dns4(String),
    Dns6(String),
    /// Full `/dnsaddr/...` address, passed through verbatim
    DnsAddr(String),
}

impl AddressPrefix {
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => AddressPrefix::Ip4(v4),
            IpAddr::V6(v6) => AddressPrefix::Ip6(v6),
        }
    }

    pub fn is_dnsaddr(&self) -> bool {
        matches!(self, AddressPrefix::DnsAddr(_))
    }

    /// Expand into transport addresses.
    ///
    /// Yields a TCP and a QUIC-v1 form, each with `/p2p/<peer_id>` appended
    /// when `peer_id` is given. A `/dnsaddr/` prefix yields only itself.
    pub fn to_transport_addresses(&self, port: u16, peer_id: Option<&str>) -> Vec<String> {
        if let AddressPrefix::DnsAddr(full) = self {
            return vec![full.clone()];
        }
        let tcp = format!("{self}/tcp/{port}");
        let quic = format!("{self}/udp/{port}/quic-v1");
        match peer_id {
            Some(id) => vec![format!("{tcp}/p2p/{id}"), format!("{quic}/p2p/{id}")],
            None => vec![tcp, quic],
        }
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPrefix::Ip4(ip) => write!(f, "/ip4/{ip}"),
            AddressPrefix::Ip6(ip) => write!(f, "/ip6/{ip}"),
            AddressPrefix::Dns4(host) => write!(f, "/dns4/{host}"),
            AddressPrefix::Dns6(host) => write!(f, "/dns6/{host}"),
            AddressPrefix::DnsAddr(full) => f.write_str(full),
        }
    }
}

impl FromStr for AddressPrefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("/dnsaddr/") {
            return Ok(AddressPrefix::DnsAddr(s.to_string()));
        }
        let mut parts = s.strip_prefix('/').unwrap_or(s).splitn(2, '/');
        let proto = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        if value.is_empty() || value.contains('/') {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        let invalid = |_| Error::InvalidAddress(s.to_string());
        match proto {
            "ip4" => value.parse().map(AddressPrefix::Ip4).map_err(invalid),
            "ip6" => value.parse().map(AddressPrefix::Ip6).map_err(invalid),
            "dns4" => Ok(AddressPrefix::Dns4(value.to_string())),
            "dns6" => Ok(AddressPrefix::Dns6(value.to_string())),
            _ => Err(Error::InvalidAddress(s.to_string())),
        }
    }
}

/// Addresses the local node announces for itself (no `/p2p/` suffix)
pub fn build_announce(prefixes: &[AddressPrefix], port: u16) -> Vec<String> {
    dedupe(
        prefixes
            .iter()
            .flat_map(|p| p.to_transport_addresses(port, None))
            .collect(),
    )
}

/// Remove duplicates, keeping the first occurrence of each item
pub fn dedupe<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
