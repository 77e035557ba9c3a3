//! Role templates
//!
//! Three static fragments of daemon configuration: a default layer applied
//! to every node, and one profile per role. They are parsed once at
//! startup and are read-only afterwards.

use crate::merge::ConfigDocument;
use crate::types::Role;
use crate::{Error, Result};
use std::path::Path;

const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.json");
const CLIENT_TEMPLATE: &str = include_str!("../templates/dhtclient.json");
const SERVER_TEMPLATE: &str = include_str!("../templates/dhtserver.json");

#[derive(Debug, Clone)]
pub struct RoleTemplates {
    pub default: ConfigDocument,
    pub client: ConfigDocument,
    pub server: ConfigDocument,
}

impl RoleTemplates {
    /// Templates compiled into the binary
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            default: parse("default.json", DEFAULT_TEMPLATE)?,
            client: parse("dhtclient.json", CLIENT_TEMPLATE)?,
            server: parse("dhtserver.json", SERVER_TEMPLATE)?,
        })
    }

    /// Load templates from a directory holding `default.json`,
    /// `dhtclient.json` and `dhtserver.json`
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| -> Result<ConfigDocument> {
            let text = std::fs::read_to_string(dir.join(name))?;
            parse(name, &text)
        };
        Ok(Self {
            default: read("default.json")?,
            client: read("dhtclient.json")?,
            server: read("dhtserver.json")?,
        })
    }

    pub fn for_role(&self, role: Role) -> &ConfigDocument {
        match role {
            Role::Client => &self.client,
            Role::Server => &self.server,
        }
    }
}

fn parse(name: &str, text: &str) -> Result<ConfigDocument> {
    serde_json::from_str(text).map_err(|e| Error::InvalidTemplate {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_parse() {
        let templates = RoleTemplates::embedded().unwrap();
        assert_eq!(templates.client["Routing"]["Type"], "dhtclient");
        assert_eq!(templates.server["Routing"]["Type"], "dhtserver");
        assert!(templates.default.contains_key("Addresses"));
        assert_eq!(
            templates.for_role(Role::Server)["Routing"]["Type"],
            Role::Server.as_str()
        );
    }

    #[test]
    fn test_malformed_template_is_fatal() {
        let err = parse("broken.json", "{ not json").unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate { ref name, .. } if name == "broken.json"));
        // a top-level array is not a config document
        assert!(parse("array.json", "[1, 2]").is_err());
    }
}
