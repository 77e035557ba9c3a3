//! Dotmesh Node Library
//!
//! Synthesizes the local storage daemon's network configuration from the
//! shared node registry and applies it.

pub mod config;
pub mod daemon;
pub mod registry;
pub mod synth;

use config::Config;
use daemon::DaemonClient;
use dotmesh_core::RoleTemplates;
use dotmesh_net::{RoleClassifier, SystemResolver, TcpProbe};
use registry::RegistrySource;
use std::time::Duration;
use synth::{SelectionParams, Synthesizer};

/// Synthesizer wired to the real registry, daemon and network
pub type NodeSynthesizer =
    Synthesizer<RegistrySource, DaemonClient, SystemResolver, TcpProbe<SystemResolver>>;

/// Load role templates, from the configured directory if one is set
pub fn load_templates(config: &Config) -> dotmesh_core::Result<RoleTemplates> {
    match config.templates_dir() {
        Some(dir) => {
            tracing::debug!("Loading role templates from {}", dir.display());
            RoleTemplates::load_dir(&dir)
        }
        None => RoleTemplates::embedded(),
    }
}

/// Build a synthesizer from configuration
pub fn build_synthesizer(config: &Config) -> dotmesh_core::Result<NodeSynthesizer> {
    let templates = load_templates(config)?;
    let registry = RegistrySource::from_source(
        &config.registry.source,
        Duration::from_millis(config.registry.timeout_ms),
    )?;
    let daemon = DaemonClient::new(&config.daemon)?;

    let synthesis = &config.synthesis;
    let resolver = SystemResolver::default();
    let probe = TcpProbe::new(resolver.clone(), synthesis.dial_timeout());
    let classifier = RoleClassifier::new(resolver, probe)
        .with_port(synthesis.default_port)
        .with_concurrency(synthesis.probe_concurrency);

    Ok(Synthesizer::new(registry, daemon, classifier, templates).with_params(SelectionParams {
        bootstrap_k: synthesis.bootstrap_k,
        peering: synthesis.peering_params(),
    }))
}
