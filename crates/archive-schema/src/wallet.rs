//! Per-wallet export records.

use serde::{Deserialize, Serialize};

/// Role of a wallet in a multisig setup, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletRole {
    /// Holds key material and signs.
    Signer,
    /// Tracks a multisig without private keys.
    WatchOnly,
    Regular,
}

impl WalletRole {
    /// Classify a wallet by naming convention.
    pub fn classify(wallet_name: &str) -> Self {
        let lower = wallet_name.to_lowercase();
        if lower.contains("watch") {
            WalletRole::WatchOnly
        } else if lower.contains("signer") || lower.contains("sign") {
            WalletRole::Signer
        } else {
            WalletRole::Regular
        }
    }
}

/// Import timestamp for a descriptor: either "now" or a unix time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorTimestamp {
    Literal(String),
    Time(u64),
}

impl Default for DescriptorTimestamp {
    fn default() -> Self {
        DescriptorTimestamp::Literal("now".to_string())
    }
}

/// One descriptor string with its activity/range metadata, as reported by
/// the node's `listdescriptors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub desc: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[i64; 2]>,
    #[serde(default)]
    pub timestamp: DescriptorTimestamp,
}

/// Snapshot of one node wallet, written as `descriptors/<wallet>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletExport {
    pub wallet_name: String,
    pub role: WalletRole,
    /// Whether the wallet is descriptor-based (vs legacy keypool).
    pub descriptor_based: bool,
    /// Whether descriptor strings include private key material.
    pub includes_private_keys: bool,
    pub descriptors: Vec<DescriptorRecord>,
    /// Associated multisig config name, matched by naming convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multisig_config: Option<String>,
    /// Associated key file name, matched by naming convention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_role_classification() {
        assert_eq!(WalletRole::classify("signer_1"), WalletRole::Signer);
        assert_eq!(WalletRole::classify("team_signer_2"), WalletRole::Signer);
        assert_eq!(WalletRole::classify("watcher"), WalletRole::WatchOnly);
        assert_eq!(WalletRole::classify("WATCH_ONLY"), WalletRole::WatchOnly);
        assert_eq!(WalletRole::classify("alice"), WalletRole::Regular);
    }

    #[test]
    fn test_descriptor_timestamp_forms() {
        let now: DescriptorTimestamp = serde_json::from_str("\"now\"").unwrap();
        assert_eq!(now, DescriptorTimestamp::Literal("now".into()));
        let at: DescriptorTimestamp = serde_json::from_str("1700000000").unwrap();
        assert_eq!(at, DescriptorTimestamp::Time(1700000000));
    }

    #[test]
    fn test_descriptor_record_parses_node_output() {
        let raw = serde_json::json!({
            "desc": "wpkh([d34db33f/84h/1h/0h]tpub.../0/*)#checksum",
            "active": true,
            "internal": false,
            "range": [0, 999],
            "timestamp": 1700000000u64,
        });
        let record: DescriptorRecord = serde_json::from_value(raw).unwrap();
        assert!(record.active);
        assert_eq!(record.range, Some([0, 999]));
    }
}
