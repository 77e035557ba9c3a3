//! Node configuration synthesis
//!
//! One run reads the registry and the daemon's identity and live config,
//! classifies every peer, selects bootstrap and peering sets, merges the
//! result with the role templates and replaces the daemon config. Nothing
//! is kept between runs.

use crate::daemon::Daemon;
use crate::registry::Registry;
use dotmesh_core::{
    build_announce, merge_config, select_bootstrap, select_peering, ComputedConfig,
    ConfigDocument, NodeDefinition, PeeringParams, Result, Role, RoleTemplates, SynthesisReport,
    BOOTSTRAP_K,
};
use dotmesh_net::{Reachability, Resolver, RoleClassifier};
use rand::Rng;
use tokio::sync::Mutex;

/// Selection sizes for one run
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub bootstrap_k: usize,
    pub peering: PeeringParams,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            bootstrap_k: BOOTSTRAP_K,
            peering: PeeringParams::default(),
        }
    }
}

/// Everything read from upstream for one run
#[derive(Debug, Clone)]
pub struct SynthesisInputs {
    /// Classified peers, in registry order
    pub nodes: Vec<NodeDefinition>,
    pub local_peer_id: String,
    /// The daemon's live config
    pub current: ConfigDocument,
}

/// A computed, not yet applied, configuration
#[derive(Debug, Clone)]
pub struct Plan {
    pub config: ConfigDocument,
    pub report: SynthesisReport,
}

/// Compute the final configuration from already gathered inputs.
///
/// The local node's role is `dhtserver` only if it is in the registry and
/// was found reachable; it announces only the addresses it registered.
pub fn build_plan<R: Rng + ?Sized>(
    inputs: &SynthesisInputs,
    templates: &RoleTemplates,
    params: &SelectionParams,
    rng: &mut R,
) -> Plan {
    let local = inputs
        .nodes
        .iter()
        .find(|n| n.peer_id == inputs.local_peer_id);
    if local.is_none() {
        tracing::warn!(
            "Local peer {} is not in the registry, configuring as dhtclient",
            inputs.local_peer_id
        );
    }

    let role = local.map_or(Role::Client, |n| n.role);
    let announce = local
        .map(|n| build_announce(&n.address_prefixes, n.port))
        .unwrap_or_default();
    let bootstrap = select_bootstrap(&inputs.nodes, params.bootstrap_k, rng);
    let peering = select_peering(&inputs.nodes, &inputs.local_peer_id, params.peering, rng);

    let report = SynthesisReport {
        peer_id: inputs.local_peer_id.clone(),
        role,
        announce_count: announce.len(),
        bootstrap_count: bootstrap.len(),
        peering_count: peering.len(),
    };
    let computed = ComputedConfig {
        announce,
        bootstrap,
        peering,
    };
    let config = merge_config(
        &inputs.current,
        &computed,
        templates.for_role(role),
        Some(&templates.default),
    );

    Plan { config, report }
}

/// Drives synthesis runs against one registry and one daemon
pub struct Synthesizer<G, D, R, P> {
    registry: G,
    daemon: D,
    classifier: RoleClassifier<R, P>,
    templates: RoleTemplates,
    params: SelectionParams,
    /// Serializes apply runs issued through this synthesizer
    apply_lock: Mutex<()>,
}

impl<G, D, R, P> Synthesizer<G, D, R, P>
where
    G: Registry,
    D: Daemon,
    R: Resolver,
    P: Reachability,
{
    pub fn new(registry: G, daemon: D, classifier: RoleClassifier<R, P>, templates: RoleTemplates) -> Self {
        Self {
            registry,
            daemon,
            classifier,
            templates,
            params: SelectionParams::default(),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn with_params(mut self, params: SelectionParams) -> Self {
        self.params = params;
        self
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    /// Read and classify all upstream inputs; any failure aborts the run
    pub async fn gather(&self) -> Result<SynthesisInputs> {
        let records = self.registry.peer_records().await?;
        tracing::info!("Registry lists {} peers", records.len());
        let nodes = self.classifier.classify(&records).await;
        let local_peer_id = self.daemon.local_peer_id().await?;
        let current = self.daemon.current_config().await?;
        Ok(SynthesisInputs {
            nodes,
            local_peer_id,
            current,
        })
    }

    /// Compute the final configuration without applying it
    pub async fn plan(&self) -> Result<Plan> {
        let inputs = self.gather().await?;
        Ok(build_plan(
            &inputs,
            &self.templates,
            &self.params,
            &mut rand::thread_rng(),
        ))
    }

    /// Compute the final configuration and replace the daemon's with it
    pub async fn synthesize_and_apply(&self) -> Result<SynthesisReport> {
        let _guard = self.apply_lock.lock().await;
        let plan = self.plan().await?;
        self.daemon.replace_config(&plan.config).await?;
        tracing::info!(
            "Applied {} config for {}: {} announce, {} bootstrap, {} peering",
            plan.report.role,
            plan.report.peer_id,
            plan.report.announce_count,
            plan.report.bootstrap_count,
            plan.report.peering_count
        );
        Ok(plan.report)
    }

    /// The daemon's live configuration, unmodified
    pub async fn show_current_config(&self) -> Result<ConfigDocument> {
        self.daemon.current_config().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotmesh_core::AddressPrefix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn node(id: &str, role: Role, prefix: &str) -> NodeDefinition {
        NodeDefinition {
            name: id.to_lowercase(),
            peer_id: id.to_string(),
            role,
            address_prefixes: vec![prefix.parse::<AddressPrefix>().unwrap()],
            port: 4001,
        }
    }

    fn inputs(nodes: Vec<NodeDefinition>, local: &str) -> SynthesisInputs {
        let current = match json!({
            "Identity": {"PeerID": local},
            "Routing": {"Type": "auto"},
            "Reprovider": {"Interval": "22h"}
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        SynthesisInputs {
            nodes,
            local_peer_id: local.to_string(),
            current,
        }
    }

    #[test]
    fn test_plan_for_registered_server() {
        let nodes = vec![
            node("QmA", Role::Server, "/ip4/1.1.1.1"),
            node("QmSelf", Role::Server, "/dns4/self.example"),
            node("QmC", Role::Client, "/ip6/2001:db8::3"),
        ];
        let templates = RoleTemplates::embedded().unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let plan = build_plan(&inputs(nodes, "QmSelf"), &templates, &SelectionParams::default(), &mut rng);

        assert_eq!(plan.report.role, Role::Server);
        assert_eq!(
            plan.config["Addresses"]["Announce"],
            json!(["/dns4/self.example/tcp/4001", "/dns4/self.example/udp/4001/quic-v1"])
        );
        assert_eq!(plan.config["Routing"]["Type"], json!("dhtserver"));
        assert!(!plan.config.contains_key("Reprovider"));

        // both servers bootstrap, including the local one
        assert_eq!(plan.report.bootstrap_count, 4);
        let peers: Vec<&str> = plan.config["Peering"]["Peers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["ID"].as_str().unwrap())
            .collect();
        assert_eq!(peers, vec!["QmA", "QmC"]);
        assert_eq!(plan.report.peering_count, 2);
    }

    #[test]
    fn test_plan_for_unregistered_node() {
        let nodes = vec![node("abc", Role::Server, "/ip4/1.2.3.4")];
        let templates = RoleTemplates::embedded().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let plan = build_plan(&inputs(nodes, "xyz"), &templates, &SelectionParams::default(), &mut rng);

        assert_eq!(plan.report.role, Role::Client);
        assert_eq!(plan.report.announce_count, 0);
        assert_eq!(plan.config["Routing"]["Type"], json!("dhtclient"));
        assert_eq!(
            plan.config["Bootstrap"],
            json!([
                "/ip4/1.2.3.4/tcp/4001/p2p/abc",
                "/ip4/1.2.3.4/udp/4001/quic-v1/p2p/abc"
            ])
        );
    }
}
