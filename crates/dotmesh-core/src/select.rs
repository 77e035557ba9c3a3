//! Bootstrap and peering selection
//!
//! Both selectors take the random source as a parameter. Only set
//! membership and size bounds are stable across runs, except for the ring
//! part of peering which depends solely on registry order.

use crate::multiaddr::dedupe;
use crate::types::{NodeDefinition, PeeringPeer, Role};
use crate::{PEERING_RANDOM, PEERING_RING};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Pick up to `k` items uniformly at random, without replacement
pub fn sample<'a, T, R: Rng + ?Sized>(items: &[&'a T], k: usize, rng: &mut R) -> Vec<&'a T> {
    items.choose_multiple(rng, k).copied().collect()
}

/// Bootstrap list: up to `k` random public nodes, addressed with `/p2p/`
pub fn select_bootstrap<R: Rng + ?Sized>(nodes: &[NodeDefinition], k: usize, rng: &mut R) -> Vec<String> {
    let servers: Vec<&NodeDefinition> = nodes
        .iter()
        .filter(|n| n.is_public() && !n.peer_id.is_empty())
        .collect();

    let selected = sample(&servers, k, rng);
    tracing::debug!("Bootstrap: {} of {} public nodes selected", selected.len(), servers.len());

    let addrs = selected
        .iter()
        .flat_map(|n| {
            n.address_prefixes
                .iter()
                .flat_map(move |p| p.to_transport_addresses(n.port, Some(n.peer_id.as_str())))
        })
        .collect();
    dedupe(addrs)
}

/// Peering selection parameters
#[derive(Debug, Clone, Copy)]
pub struct PeeringParams {
    /// Neighbours taken on each side of the local node
    pub ring: usize,
    /// Random neighbours, and the size of the fallback top-up
    pub random: usize,
}

impl Default for PeeringParams {
    fn default() -> Self {
        Self {
            ring: PEERING_RING,
            random: PEERING_RANDOM,
        }
    }
}

/// Peering list for the node identified by `local_peer_id`.
///
/// The registry order is treated as a ring: the `ring` nodes on either side
/// of the local node are always chosen. On top of that up to `random`
/// public nodes are sampled, and if the set is still short of
/// `2 * ring + random`, up to `random` more come from all addressable
/// nodes of either role. The local node is never included.
pub fn select_peering<R: Rng + ?Sized>(
    nodes: &[NodeDefinition],
    local_peer_id: &str,
    params: PeeringParams,
    rng: &mut R,
) -> Vec<PeeringPeer> {
    let eligible = |n: &NodeDefinition| !n.peer_id.is_empty() && n.peer_id != local_peer_id;
    let mut chosen: BTreeMap<&str, &NodeDefinition> = BTreeMap::new();

    let n = nodes.len();
    if n > 1 {
        if let Some(idx) = nodes.iter().position(|node| node.peer_id == local_peer_id) {
            for d in 1..=params.ring {
                let left = &nodes[(idx + n - d % n) % n];
                let right = &nodes[(idx + d) % n];
                for neighbour in [left, right] {
                    if eligible(neighbour) {
                        chosen.insert(&neighbour.peer_id, neighbour);
                    }
                }
            }
        }
    }
    let ring_count = chosen.len();

    let fallback: Vec<&NodeDefinition> = nodes
        .iter()
        .filter(|node| eligible(*node) && node.has_addresses())
        .collect();
    let preferred: Vec<&NodeDefinition> = fallback
        .iter()
        .copied()
        .filter(|node| node.role == Role::Server)
        .collect();

    for node in sample(&preferred, params.random, rng) {
        chosen.insert(&node.peer_id, node);
    }
    if chosen.len() < params.ring * 2 + params.random {
        for node in sample(&fallback, params.random, rng) {
            chosen.insert(&node.peer_id, node);
        }
    }

    tracing::debug!(
        "Peering: {} ring neighbours, {} chosen in total",
        ring_count,
        chosen.len()
    );

    chosen
        .into_values()
        .filter_map(|node| {
            let addrs = dedupe(
                node.address_prefixes
                    .iter()
                    .flat_map(|p| p.to_transport_addresses(node.port, None))
                    .collect(),
            );
            (!addrs.is_empty()).then(|| PeeringPeer {
                peer_id: node.peer_id.clone(),
                addrs,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiaddr::AddressPrefix;
    use crate::DEFAULT_PORT;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn node(id: &str, role: Role, octet: u8) -> NodeDefinition {
        NodeDefinition {
            name: format!("dot{octet}"),
            peer_id: id.to_string(),
            role,
            address_prefixes: vec![AddressPrefix::Ip4([10, 0, 0, octet].into())],
            port: DEFAULT_PORT,
        }
    }

    fn ring_of(count: u8, role: Role) -> Vec<NodeDefinition> {
        (0..count).map(|i| node(&format!("peer{i}"), role, i)).collect()
    }

    #[test]
    fn test_sample_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let items = [1, 2, 3, 4, 5];
        let refs: Vec<&i32> = items.iter().collect();
        let picked = sample(&refs, 3, &mut rng);
        assert_eq!(picked.len(), 3);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
        assert_eq!(sample(&refs, 10, &mut rng).len(), 5);
        assert!(sample(&refs, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_bootstrap_only_public_nodes_capped() {
        let mut nodes = ring_of(12, Role::Server);
        nodes.push(node("client", Role::Client, 100));
        let mut empty = node("bare", Role::Server, 101);
        empty.address_prefixes.clear();
        nodes.push(empty);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let addrs = select_bootstrap(&nodes, 8, &mut rng);
            // two transport forms per selected node
            assert_eq!(addrs.len(), 16);
            let ids: HashSet<&str> = addrs
                .iter()
                .filter_map(|a| a.rsplit("/p2p/").next())
                .collect();
            assert_eq!(ids.len(), 8);
            assert!(!ids.contains("client"));
            assert!(!ids.contains("bare"));
        }
    }

    #[test]
    fn test_bootstrap_single_server() {
        let nodes = vec![NodeDefinition {
            name: "p1".into(),
            peer_id: "abc".into(),
            role: Role::Server,
            address_prefixes: vec!["/ip4/1.2.3.4".parse().unwrap()],
            port: DEFAULT_PORT,
        }];
        let mut rng = StdRng::seed_from_u64(1);
        let addrs = select_bootstrap(&nodes, 8, &mut rng);
        assert_eq!(
            addrs,
            vec![
                "/ip4/1.2.3.4/tcp/4001/p2p/abc",
                "/ip4/1.2.3.4/udp/4001/quic-v1/p2p/abc"
            ]
        );
    }

    #[test]
    fn test_peering_ring_neighbours_always_present() {
        let nodes = ring_of(20, Role::Client);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let peers = select_peering(&nodes, "peer0", PeeringParams::default(), &mut rng);
            let ids: HashSet<&str> = peers.iter().map(|p| p.peer_id.as_str()).collect();
            for expected in ["peer1", "peer2", "peer3", "peer17", "peer18", "peer19"] {
                assert!(ids.contains(expected), "missing ring neighbour {expected}");
            }
            assert!(!ids.contains("peer0"));
            assert!(peers.len() <= 9);
        }
    }

    #[test]
    fn test_peering_prefers_servers() {
        let mut nodes = ring_of(10, Role::Client);
        nodes.extend((0..5).map(|i| node(&format!("srv{i}"), Role::Server, 50 + i)));
        let mut rng = StdRng::seed_from_u64(3);
        let peers = select_peering(&nodes, "peer5", PeeringParams::default(), &mut rng);
        let servers = peers.iter().filter(|p| p.peer_id.starts_with("srv")).count();
        assert_eq!(servers, 3);
        // ring (6) + preferred (3) fills the target, no fallback top-up
        assert_eq!(peers.len(), 9);
    }

    #[test]
    fn test_peering_addresses_have_no_identity() {
        let nodes = ring_of(8, Role::Server);
        let mut rng = StdRng::seed_from_u64(11);
        let peers = select_peering(&nodes, "peer4", PeeringParams::default(), &mut rng);
        assert!(!peers.is_empty());
        for peer in &peers {
            assert_eq!(peer.addrs.len(), 2);
            assert!(peer.addrs.iter().all(|a| !a.contains("/p2p/")));
        }
    }

    #[test]
    fn test_peering_local_absent_skips_ring() {
        let nodes = vec![node("abc", Role::Server, 1)];
        let mut rng = StdRng::seed_from_u64(5);
        let peers = select_peering(&nodes, "xyz", PeeringParams::default(), &mut rng);
        // only reachable through the random pick
        assert!(peers.len() <= 1);
        assert!(peers.iter().all(|p| p.peer_id == "abc"));
    }

    #[test]
    fn test_peering_small_and_empty_registries() {
        let mut rng = StdRng::seed_from_u64(9);
        assert!(select_peering(&[], "me", PeeringParams::default(), &mut rng).is_empty());

        let alone = vec![node("me", Role::Server, 1)];
        assert!(select_peering(&alone, "me", PeeringParams::default(), &mut rng).is_empty());

        // ring wraps around a 3-node registry without duplicating peers
        let trio = ring_of(3, Role::Client);
        let peers = select_peering(&trio, "peer1", PeeringParams::default(), &mut rng);
        let ids: Vec<&str> = peers.iter().map(|p| p.peer_id.as_str()).collect();
        assert_eq!(ids, vec!["peer0", "peer2"]);
    }
}
