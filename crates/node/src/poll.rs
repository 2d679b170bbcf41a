//! Bounded RPC-readiness polling.

use crate::client::NodeClient;
use regpack_common::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Poll `getblockchaininfo` until it succeeds, up to `max_attempts` with a
/// fixed delay between attempts. Never blocks indefinitely.
pub async fn wait_for_rpc(
    node: &dyn NodeClient,
    max_attempts: u32,
    delay: Duration,
) -> Result<()> {
    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match node.get_blockchain_info().await {
            Ok(info) => {
                debug!(
                    "RPC ready after {} attempt(s), height {}",
                    attempt, info.blocks
                );
                return Ok(());
            }
            Err(e) => {
                last_error = e.to_string();
                debug!("RPC not ready (attempt {}/{}): {}", attempt, max_attempts, e);
            }
        }
        if attempt < max_attempts {
            sleep(delay).await;
        }
    }
    Err(Error::NodeConnection(format!(
        "RPC not reachable after {} attempts: {}",
        max_attempts, last_error
    )))
}
