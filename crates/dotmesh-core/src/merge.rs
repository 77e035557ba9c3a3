//! Daemon configuration merging
//!
//! The final document is the daemon's live config, overlaid with the
//! default template, the computed address lists and the role template.
//! Template merging is asymmetric: scalars and nested objects from the
//! template win, arrays are only copied where the target has none.

use crate::types::PeeringPeer;
use serde_json::{Map, Value};

/// A daemon configuration document
pub type ConfigDocument = Map<String, Value>;

/// Sub-trees taken from the default template
const DEFAULT_SECTIONS: &[&str] = &["API", "Addresses", "Swarm", "Pubsub", "Ipns", "Provide"];

/// Sub-trees taken from the role template
const ROLE_SECTIONS: &[&str] = &["Swarm", "Pubsub", "Ipns", "Provide"];

/// Legacy section never carried into the final document
const LEGACY_REPROVIDER: &str = "Reprovider";

/// Address lists computed for the local node
#[derive(Debug, Clone, Default)]
pub struct ComputedConfig {
    /// Self-announce addresses, without `/p2p/`
    pub announce: Vec<String>,
    /// Bootstrap addresses, with `/p2p/`
    pub bootstrap: Vec<String>,
    pub peering: Vec<PeeringPeer>,
}

/// Merge `source` into `target` field by field.
///
/// Arrays are copied only when `target` lacks the key, objects are merged
/// recursively and every other value overwrites the target's.
pub fn merge_objects(target: &mut ConfigDocument, source: &ConfigDocument) {
    for (key, value) in source {
        match value {
            Value::Array(_) => {
                if !target.contains_key(key) {
                    target.insert(key.clone(), value.clone());
                }
            }
            Value::Object(nested) => {
                let slot = object_entry(target, key);
                merge_objects(slot, nested);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Build the final daemon configuration.
///
/// `current` is never modified; the result is a fresh document.
pub fn merge_config(
    current: &ConfigDocument,
    computed: &ComputedConfig,
    role_template: &ConfigDocument,
    default_template: Option<&ConfigDocument>,
) -> ConfigDocument {
    let mut cfg = current.clone();

    if let Some(defaults) = default_template {
        merge_sections(&mut cfg, defaults, DEFAULT_SECTIONS);
    }

    object_entry(&mut cfg, "Addresses").insert(
        "Announce".to_string(),
        string_array(&computed.announce),
    );
    cfg.insert("Bootstrap".to_string(), string_array(&computed.bootstrap));
    let peers = computed.peering.iter().map(peering_entry).collect();
    object_entry(&mut cfg, "Peering").insert("Peers".to_string(), Value::Array(peers));

    let routing_type = role_template
        .get("Routing")
        .and_then(|routing| routing.get("Type"))
        .and_then(Value::as_str);
    if let Some(routing_type) = routing_type {
        object_entry(&mut cfg, "Routing")
            .insert("Type".to_string(), Value::String(routing_type.to_string()));
    }

    merge_sections(&mut cfg, role_template, ROLE_SECTIONS);
    cfg.shift_remove(LEGACY_REPROVIDER);
    cfg
}

fn merge_sections(cfg: &mut ConfigDocument, template: &ConfigDocument, sections: &[&str]) {
    for section in sections {
        if let Some(Value::Object(source)) = template.get(*section) {
            merge_objects(object_entry(cfg, section), source);
        }
    }
}

/// Mutable access to `target[key]` as an object, replacing any non-object
fn object_entry<'a>(target: &'a mut ConfigDocument, key: &str) -> &'a mut ConfigDocument {
    let slot = target
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just set to an object"),
    }
}

/// One `Peering.Peers` element: `{"ID": .., "Addrs": [..]}`
fn peering_entry(peer: &PeeringPeer) -> Value {
    let mut entry = Map::new();
    entry.insert("ID".to_string(), Value::String(peer.peer_id.clone()));
    entry.insert("Addrs".to_string(), string_array(&peer.addrs));
    Value::Object(entry)
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}
