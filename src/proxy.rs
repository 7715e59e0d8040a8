//! Network-mocking proxy contract.
//!
//! The proxy itself is an external collaborator; the core only needs to
//! start it with a rule set, swap rules on a running instance, and point
//! the device at its port. Rules are loaded from YAML files referenced by
//! the `MockNetwork` command.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default local port the proxy listens on.
pub const DEFAULT_PROXY_PORT: u16 = 8085;

/// One request-matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRule {
    pub path: String,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_status() -> u16 {
    200
}

/// Load a rule list from a YAML file.
pub fn load_rules(path: &Path) -> Result<Vec<MockRule>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mock rules from {}", path.display()))?;
    let rules: Vec<MockRule> = serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse mock rules from {}", path.display()))?;
    Ok(rules)
}

/// Contract the orchestra consumes from the proxy implementation.
pub trait NetworkProxy: Send {
    fn port(&self) -> u16;

    fn is_started(&self) -> bool;

    fn start(&mut self, rules: Vec<MockRule>) -> Result<()>;

    fn replace_rules(&mut self, rules: Vec<MockRule>) -> Result<()>;
}
