//! Role classification of registry peers

use crate::normalize::{base_prefixes_from_urls, hosts_from_urls};
use crate::probe::Reachability;
use crate::resolver::Resolver;
use dotmesh_core::{NodeDefinition, PeerRecord, Role, DEFAULT_PORT};
use futures::stream::{self, StreamExt};

/// Default number of peers classified at the same time
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Labels each peer `dhtserver` or `dhtclient` by probing its swarm port
pub struct RoleClassifier<R, P> {
    resolver: R,
    probe: P,
    port: u16,
    concurrency: usize,
}

impl<R: Resolver, P: Reachability> RoleClassifier<R, P> {
    pub fn new(resolver: R, probe: P) -> Self {
        Self {
            resolver,
            probe,
            port: DEFAULT_PORT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Swarm port probed and assigned to every node
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classify all records, keeping registry order
    pub async fn classify(&self, records: &[PeerRecord]) -> Vec<NodeDefinition> {
        let nodes: Vec<NodeDefinition> = stream::iter(records)
            .map(|record| self.classify_one(record))
            .buffered(self.concurrency)
            .collect()
            .await;

        let servers = nodes.iter().filter(|n| n.role == Role::Server).count();
        tracing::info!(
            "Classified {} peers: {} dhtserver, {} dhtclient",
            nodes.len(),
            servers,
            nodes.len() - servers
        );
        nodes
    }

    pub async fn classify_one(&self, record: &PeerRecord) -> NodeDefinition {
        let prefixes = base_prefixes_from_urls(&record.advertised_apis, &self.resolver).await;
        let hosts = hosts_from_urls(&record.advertised_apis);
        let role = Role::from_reachable(self.probe.any_host_open(&hosts, self.port).await);

        tracing::debug!(
            "Peer {} ({}): {} prefixes, {}",
            record.name,
            record.peer_id,
            prefixes.len(),
            role
        );
        NodeDefinition::new(record, role, prefixes, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::StaticReachability;
    use crate::resolver::mock::StaticResolver;

    fn record(composite: &str, apis: &[&str]) -> PeerRecord {
        let (name, id) = dotmesh_core::split_composite_name(composite);
        PeerRecord::new(name, id, apis.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_classify_roles_and_order() {
        let resolver = StaticResolver::new().with_host("pub.example", &["8.8.4.4"]);
        let reach = StaticReachability::new().with_open("pub.example");
        let classifier = RoleClassifier::new(resolver, reach).with_concurrency(2);

        let records = vec![
            record("alpha-QmA", &["http://10.0.0.1:1976"]),
            record("beta-QmB", &["https://pub.example", "http://10.0.0.2:1976"]),
            record("gamma", &[]),
        ];
        let nodes = classifier.classify(&records).await;

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].peer_id, "QmA");
        assert_eq!(nodes[0].role, Role::Client);
        assert_eq!(nodes[1].role, Role::Server);
        assert_eq!(
            nodes[1].address_prefixes.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            vec!["/dns4/pub.example", "/ip4/10.0.0.2"]
        );
        assert_eq!(nodes[2].name, "gamma");
        assert_eq!(nodes[2].peer_id, "");
        assert!(!nodes[2].has_addresses());
        assert!(nodes.iter().all(|n| n.port == DEFAULT_PORT));
    }

    #[tokio::test]
    async fn test_probe_receives_url_hosts() {
        let reach = StaticReachability::new();
        let classifier = RoleClassifier::new(StaticResolver::new(), reach).with_port(4101);
        let node = classifier
            .classify_one(&record("n-QmN", &["http://[::1]:1976", "http://[::1]:2000"]))
            .await;
        assert_eq!(node.port, 4101);
        assert_eq!(classifier.probe.probed_hosts(), vec!["::1"]);
    }
}
