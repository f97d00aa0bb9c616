//! Agent suite configuration schema
//!
//! Loaded from TOML; every field has a default so an empty file yields the
//! stock suite. Values here are rendered into file bodies by the catalog
//! assembly - the engine itself never interprets them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Desired shape of the endpoint-management agent on this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core server FQDN the agent reports to
    #[serde(default = "default_core_server")]
    pub core_server: String,

    /// Local account the agent suite runs as
    #[serde(default = "default_agent_user")]
    pub agent_user: String,

    #[serde(default = "default_agent_group")]
    pub agent_group: String,

    /// Agent installation tree
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Agent suite packages, all kept installed
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Rendered into the policy file; gates the agent's use of sudo
    #[serde(default)]
    pub privilege_escalation_allowed: bool,

    /// Hash-named core certificate, e.g. "187227ec.0"
    #[serde(default = "default_core_cert_name")]
    pub core_cert_name: String,

    /// PEM body of the core certificate
    #[serde(default)]
    pub core_cert_pem: String,

    /// Stable device identifier; unset lets registration generate one
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core_server: default_core_server(),
            agent_user: default_agent_user(),
            agent_group: default_agent_group(),
            install_root: default_install_root(),
            packages: default_packages(),
            privilege_escalation_allowed: false,
            core_cert_name: default_core_cert_name(),
            core_cert_pem: String::new(),
            device_id: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// The package the rest of the suite hangs off: the base agent if the
    /// list has one, otherwise the first declared package.
    pub fn base_package(&self) -> Option<&str> {
        self.packages
            .iter()
            .find(|p| p.contains("base"))
            .or_else(|| self.packages.first())
            .map(String::as_str)
    }
}

fn default_core_server() -> String {
    "epmcore.example.com".to_string()
}

fn default_agent_user() -> String {
    "landesk".to_string()
}

fn default_agent_group() -> String {
    "landesk".to_string()
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/opt/landesk")
}

fn default_packages() -> Vec<String> {
    [
        "ivanti-software-distribution",
        "ivanti-base-agent",
        "ivanti-pds2",
        "ivanti-schedule",
        "ivanti-inventory",
        "ivanti-vulnerability",
        "ivanti-cba8",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_core_cert_name() -> String {
    "187227ec.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_stock_suite() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.packages.len(), 7);
        assert_eq!(config.agent_user, "landesk");
        assert_eq!(config.install_root, PathBuf::from("/opt/landesk"));
        assert!(!config.privilege_escalation_allowed);
        assert_eq!(config.base_package(), Some("ivanti-base-agent"));
    }

    #[test]
    fn overrides_parse() {
        let config: Config = toml::from_str(
            r#"
            core_server = "epmcore-02p.nfii.com"
            privilege_escalation_allowed = true
            packages = ["custom-agent"]
            device_id = "4c4c4544-0042-3010"
            "#,
        )
        .unwrap();
        assert_eq!(config.core_server, "epmcore-02p.nfii.com");
        assert!(config.privilege_escalation_allowed);
        assert_eq!(config.base_package(), Some("custom-agent"));
        assert_eq!(config.device_id.as_deref(), Some("4c4c4544-0042-3010"));
    }
}
