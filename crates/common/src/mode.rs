//! Node deployment mode definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the target bitcoind process is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Managed docker container, one per profile.
    Container,
    /// Externally managed process. All external-mode profiles share the same
    /// node, which is why at most one such profile may exist.
    External,
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Container => write!(f, "container"),
            NodeMode::External => write!(f, "external"),
        }
    }
}

impl FromStr for NodeMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "container" | "docker" => Ok(NodeMode::Container),
            "external" | "manual" => Ok(NodeMode::External),
            _ => Err(crate::Error::Config(format!("invalid node mode: {}", s))),
        }
    }
}

impl NodeMode {
    /// Check if the node runs in a managed container.
    pub fn is_container(&self) -> bool {
        matches!(self, NodeMode::Container)
    }
}
