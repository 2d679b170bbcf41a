//! The node client capability consumed by the pipelines.

use async_trait::async_trait;
use regpack_common::Result;
use serde::Deserialize;
use serde_json::{json, Value};

/// Chain state as reported by `getblockchaininfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
    #[serde(default)]
    pub chainwork: Option<String>,
}

/// Node identity as reported by `getnetworkinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    pub subversion: String,
}

/// Trait for node RPC access.
///
/// Implementations only need [`call`](NodeClient::call); the typed
/// convenience methods are defined on top of it, which keeps test doubles
/// to a single method.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Execute an RPC method, optionally scoped to a wallet.
    async fn call(&self, method: &str, params: Value, wallet: Option<&str>) -> Result<Value>;

    async fn list_wallets(&self) -> Result<Vec<String>> {
        let value = self.call("listwallets", json!([]), None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_blockchain_info(&self) -> Result<ChainInfo> {
        let value = self.call("getblockchaininfo", json!([]), None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let value = self.call("getnetworkinfo", json!([]), None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_wallet_info(&self, wallet: &str) -> Result<Value> {
        self.call("getwalletinfo", json!([]), Some(wallet)).await
    }

    async fn create_wallet(&self, name: &str, disable_private_keys: bool) -> Result<Value> {
        // createwallet(name, disable_private_keys, blank, passphrase,
        // avoid_reuse, descriptors)
        self.call(
            "createwallet",
            json!([name, disable_private_keys, false, "", false, true]),
            None,
        )
        .await
    }

    async fn load_wallet(&self, name: &str) -> Result<Value> {
        self.call("loadwallet", json!([name]), None).await
    }

    /// Raw `listdescriptors` output; parsing into typed records happens at
    /// the pipeline layer.
    async fn list_descriptors(&self, wallet: &str, include_private: bool) -> Result<Value> {
        self.call("listdescriptors", json!([include_private]), Some(wallet))
            .await
    }

    async fn import_descriptors(&self, wallet: &str, requests: Value) -> Result<Value> {
        self.call("importdescriptors", json!([requests]), Some(wallet))
            .await
    }

    async fn get_new_address(&self, wallet: &str) -> Result<String> {
        let value = self.call("getnewaddress", json!([]), Some(wallet)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn generate_to_address(&self, count: u64, address: &str) -> Result<Vec<String>> {
        let value = self
            .call("generatetoaddress", json!([count, address]), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn send_to_address(&self, wallet: &str, address: &str, amount_btc: f64) -> Result<String> {
        let value = self
            .call("sendtoaddress", json!([address, amount_btc]), Some(wallet))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Request node shutdown. Best-effort; the node drops the connection
    /// while replying, so transport errors are expected.
    async fn stop(&self) -> Result<Value> {
        self.call("stop", json!([]), None).await
    }
}
