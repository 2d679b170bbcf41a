//! Manifest types for the environment archive.

use chrono::{DateTime, Utc};
use regpack_common::{NodeMode, RpcConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the manifest at the archive root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// The manifest.json file - describes an archive's contents and provenance.
///
/// Written once at the end of export, read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version for forward compatibility.
    pub schema_version: String,
    /// Unique identifier for this snapshot.
    pub snapshot_id: String,
    /// Human-readable snapshot name.
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    /// When the export ran.
    pub created_at: DateTime<Utc>,
    /// Version of the exporting tool.
    pub tool_version: String,
    /// Node subversion string, when the node reported one.
    pub node_version: Option<String>,
    /// Target network. Always "regtest" today.
    pub network: String,
    /// How the source node was run.
    pub mode: NodeMode,
    /// Chain state observed at export time.
    pub blockchain: BlockchainState,
    /// Inventory of what the archive carries.
    pub contents: ArchiveContents,
    /// Content hashes for integrity verification.
    pub checksums: ChecksumSet,
    /// Sanitized RPC settings of the source node. No absolute paths.
    pub rpc: RpcConfig,
    /// Container metadata, present in container mode only.
    pub container: Option<ContainerMeta>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            description: None,
            author: None,
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            node_version: None,
            network: "regtest".to_string(),
            mode: NodeMode::Container,
            blockchain: BlockchainState::default(),
            contents: ArchiveContents::default(),
            checksums: ChecksumSet::default(),
            rpc: RpcConfig::default(),
            container: None,
        }
    }
}

/// Chain state at export time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockchainState {
    pub block_height: u64,
    pub tip_hash: String,
    pub chain_work: Option<String>,
}

/// Inventory of archive contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveContents {
    pub has_blockchain_data: bool,
    pub has_replay_script: bool,
    /// Node wallet names, in export order.
    pub bitcoin_wallets: Vec<String>,
    /// Multisig coordinator config names (file stems).
    pub multisig_configs: Vec<String>,
    /// Key material file names.
    pub key_files: Vec<String>,
    /// Scenario file names.
    pub scenarios: Vec<String>,
}

/// Content hashes recorded at export time.
///
/// `files` is a BTreeMap so two exports of the same unchanged source
/// serialize identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksumSet {
    /// Hash of the compressed blockchain payload, when present.
    pub blockchain_payload: Option<String>,
    /// Relative path -> sha256 hex, for every staged JSON/script file.
    pub files: BTreeMap<String, String>,
}

/// Container metadata for container-mode archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub image: String,
    pub container_name: String,
    pub proxy_port: u16,
}

impl Manifest {
    /// Major component of the schema version, if parseable.
    pub fn schema_major(&self) -> Option<u64> {
        self.schema_version.split('.').next()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = Manifest::default();
        assert_eq!(manifest.schema_version, "1.0.0");
        assert_eq!(manifest.network, "regtest");
        assert_eq!(manifest.schema_major(), Some(1));
        assert!(!manifest.contents.has_blockchain_data);
    }

    #[test]
    fn test_checksum_order_is_deterministic() {
        let mut a = ChecksumSet::default();
        a.files.insert("b.json".into(), "22".into());
        a.files.insert("a.json".into(), "11".into());

        let mut b = ChecksumSet::default();
        b.files.insert("a.json".into(), "11".into());
        b.files.insert("b.json".into(), "22".into());

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_manifest_round_trip() {
        let mut manifest = Manifest {
            name: "alice-env".to_string(),
            ..Default::default()
        };
        manifest.blockchain.block_height = 150;
        manifest.contents.bitcoin_wallets = vec!["watcher".into(), "signer_1".into()];

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.blockchain.block_height, 150);
        assert_eq!(parsed.contents.bitcoin_wallets.len(), 2);
    }
}
