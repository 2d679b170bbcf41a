//! Declarative replay script types.
//!
//! A replay script is an ordered list of reconstruction steps used when
//! binary blockchain data is unavailable or undesired. Steps are purely
//! declarative; a step has no identity beyond its position in the sequence.

use crate::wallet::DescriptorRecord;
use serde::{Deserialize, Serialize};

/// File name of the replay script at the archive root.
pub const REPLAY_FILE: &str = "replay.json";

/// Ordered reconstruction script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, description: impl Into<String>, action: ReplayAction) {
        self.steps.push(ReplayStep {
            description: description.into(),
            action,
        });
    }
}

/// One step: a human-readable description plus a typed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStep {
    pub description: String,
    #[serde(flatten)]
    pub action: ReplayAction,
}

/// Step payloads, decoded at the interpreter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReplayAction {
    CreateWallet {
        wallet: String,
        #[serde(default)]
        disable_private_keys: bool,
    },
    ImportDescriptors {
        wallet: String,
        descriptors: Vec<DescriptorRecord>,
    },
    GenerateBlocks {
        count: u64,
    },
    SendTransaction {
        from_wallet: String,
        to_address: String,
        amount_btc: f64,
    },
    ImportMultisigConfig {
        name: String,
        config: serde_json::Value,
    },
    MineToAddress {
        count: u64,
        address: String,
    },
    Wait {
        millis: u64,
    },
}
