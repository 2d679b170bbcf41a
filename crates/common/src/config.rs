//! Shared configuration values.
//!
//! There is no process-wide configuration singleton: a [`SharedConfig`] is
//! loaded (from the active profile) or built once, then passed explicitly
//! into every pipeline and manager that needs it.

use crate::mode::NodeMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// RPC endpoint credentials and ports for the target node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub user: String,
    pub password: String,
    pub rpc_port: u16,
    pub p2p_port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            user: "regpack".to_string(),
            password: "regpack".to_string(),
            rpc_port: 18443,
            p2p_port: 18444,
        }
    }
}

impl RpcConfig {
    /// Base URL of the JSON-RPC endpoint.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.rpc_port)
    }
}

/// Per-profile data directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDirs {
    /// Multisig wallet configuration files (one JSON per coordinator config).
    pub wallets: PathBuf,
    /// Extended key material exported alongside multisig configs.
    pub keys: PathBuf,
    /// Produced archives.
    pub snapshots: PathBuf,
    /// Scripted test scenarios.
    pub scenarios: PathBuf,
    pub logs: PathBuf,
}

impl DataDirs {
    pub fn under(base: &Path) -> Self {
        Self {
            wallets: base.join("wallets"),
            keys: base.join("keys"),
            snapshots: base.join("snapshots"),
            scenarios: base.join("scenarios"),
            logs: base.join("logs"),
        }
    }
}

/// Container-mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub image: String,
    pub container_name: String,
    pub proxy_container_name: String,
    pub network_name: String,
    /// Host directory mounted as the node's datadir.
    pub bitcoin_data_dir: PathBuf,
    /// Host directory holding the generated reverse-proxy config.
    pub nginx_dir: PathBuf,
    pub proxy_port: u16,
}

impl ContainerConfig {
    pub fn under(base: &Path) -> Self {
        Self {
            image: "bitcoin/bitcoin:27.0".to_string(),
            container_name: "regpack-bitcoind".to_string(),
            proxy_container_name: "regpack-nginx".to_string(),
            network_name: "regpack-net".to_string(),
            bitcoin_data_dir: base.join("docker-data").join("bitcoin-data"),
            nginx_dir: base.join("docker-data").join("nginx"),
            proxy_port: 8080,
        }
    }
}

/// The full configuration threaded through export, import, profile and
/// container operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfig {
    pub network: String,
    pub mode: NodeMode,
    pub rpc: RpcConfig,
    /// The node's datadir; the chain tree lives at `<node_data_dir>/regtest`.
    pub node_data_dir: PathBuf,
    pub dirs: DataDirs,
    pub container: ContainerConfig,
}

impl SharedConfig {
    /// Default container-mode configuration rooted under `base`.
    pub fn default_under(base: &Path) -> Self {
        Self {
            network: "regtest".to_string(),
            mode: NodeMode::Container,
            rpc: RpcConfig::default(),
            node_data_dir: base.join("docker-data").join("bitcoin-data"),
            dirs: DataDirs::under(base),
            container: ContainerConfig::under(base),
        }
    }

    /// The on-disk chain directory for the configured network.
    pub fn chain_dir(&self) -> PathBuf {
        self.node_data_dir.join(&self.network)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let rpc = RpcConfig::default();
        assert_eq!(rpc.rpc_port, 18443);
        assert_eq!(rpc.p2p_port, 18444);
        assert_eq!(rpc.url(), "http://127.0.0.1:18443");
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::default_under(dir.path());
        let path = dir.path().join("config.json");
        config.save(&path).unwrap();
        let loaded = SharedConfig::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_chain_dir_uses_network() {
        let config = SharedConfig::default_under(Path::new("/tmp/base"));
        assert!(config.chain_dir().ends_with("regtest"));
    }
}
