//! Replay interpreter: execute reconstruction steps against a node.

use regpack_archive_schema::{ReplayAction, ReplayScript};
use regpack_common::{Error, Result};
use regpack_node::NodeClient;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Mining target of last resort, when not a single wallet is loaded.
/// Synthesized scripts always create a wallet before generating blocks, so
/// this address is not expected to be reached in practice.
pub const FALLBACK_MINING_ADDRESS: &str = "bcrt1qs758ursh4q9z627kt3pp5yysm78ddny6txaqgw";

/// Upper bound for a single `wait` step.
const MAX_WAIT_MILLIS: u64 = 30_000;

/// Counters for a completed replay run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayOutcome {
    pub executed: usize,
    pub failed: usize,
}

/// Executes one step at a time, strictly in order. A failing step becomes a
/// warning and execution proceeds: replay is best-effort, non-transactional.
pub struct ReplayRunner<'a> {
    node: &'a dyn NodeClient,
    /// Destination for imported multisig configs; `None` skips those steps.
    config_dir: Option<&'a Path>,
}

impl<'a> ReplayRunner<'a> {
    pub fn new(node: &'a dyn NodeClient, config_dir: Option<&'a Path>) -> Self {
        Self { node, config_dir }
    }

    pub async fn run(&self, script: &ReplayScript, warnings: &mut Vec<String>) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::default();
        let total = script.len();

        for (index, step) in script.steps.iter().enumerate() {
            debug!("Replay step {}/{}: {}", index + 1, total, step.description);
            match self.execute(&step.action).await {
                Ok(()) => outcome.executed += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warnings.push(format!(
                        "replay step {} ({}) failed: {}",
                        index + 1,
                        step.description,
                        e
                    ));
                }
            }
        }

        info!(
            "Replay finished: {} step(s) executed, {} failed",
            outcome.executed, outcome.failed
        );
        outcome
    }

    async fn execute(&self, action: &ReplayAction) -> Result<()> {
        match action {
            ReplayAction::CreateWallet {
                wallet,
                disable_private_keys,
            } => match self.node.create_wallet(wallet, *disable_private_keys).await {
                Ok(_) => Ok(()),
                Err(e) if is_already_exists(&e) => {
                    debug!("Wallet {:?} already exists", wallet);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ReplayAction::ImportDescriptors {
                wallet,
                descriptors,
            } => {
                let requests = serde_json::to_value(descriptors)?;
                // Re-imports of already-known descriptors error; swallow.
                if let Err(e) = self.node.import_descriptors(wallet, requests).await {
                    debug!("Descriptor import into {:?} swallowed: {}", wallet, e);
                }
                Ok(())
            }
            ReplayAction::GenerateBlocks { count } => {
                let address = self.mining_address().await;
                self.node.generate_to_address(*count, &address).await?;
                Ok(())
            }
            ReplayAction::SendTransaction {
                from_wallet,
                to_address,
                amount_btc,
            } => {
                self.node
                    .send_to_address(from_wallet, to_address, *amount_btc)
                    .await?;
                Ok(())
            }
            ReplayAction::ImportMultisigConfig { name, config } => match self.config_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    std::fs::write(
                        dir.join(format!("{}.json", name)),
                        serde_json::to_string_pretty(config)?,
                    )?;
                    Ok(())
                }
                None => {
                    debug!("No config directory; skipping multisig config {:?}", name);
                    Ok(())
                }
            },
            ReplayAction::MineToAddress { count, address } => {
                self.node.generate_to_address(*count, address).await?;
                Ok(())
            }
            ReplayAction::Wait { millis } => {
                sleep(Duration::from_millis((*millis).min(MAX_WAIT_MILLIS))).await;
                Ok(())
            }
        }
    }

    /// Mining target: a fresh address from any loaded wallet, falling back
    /// to the fixed placeholder when none exists.
    async fn mining_address(&self) -> String {
        if let Ok(wallets) = self.node.list_wallets().await {
            for wallet in wallets {
                if let Ok(address) = self.node.get_new_address(&wallet).await {
                    return address;
                }
            }
        }
        FALLBACK_MINING_ADDRESS.to_string()
    }
}

fn is_already_exists(e: &Error) -> bool {
    e.to_string().to_lowercase().contains("already exist")
}
