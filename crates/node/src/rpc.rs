//! JSON-RPC 1.0 client for bitcoind.

use crate::client::NodeClient;
use async_trait::async_trait;
use regpack_common::{Error, Result, RpcConfig};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

/// HTTP JSON-RPC client against a local bitcoind.
pub struct BitcoindRpcClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl BitcoindRpcClient {
    pub fn new(rpc: &RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::NodeConnection(e.to_string()))?;
        Ok(Self {
            http,
            base_url: rpc.url(),
            user: rpc.user.clone(),
            password: rpc.password.clone(),
        })
    }

    fn endpoint(&self, wallet: Option<&str>) -> String {
        match wallet {
            Some(w) => format!("{}/wallet/{}", self.base_url, w),
            None => self.base_url.clone(),
        }
    }

    /// Map a bitcoind RPC error object into the taxonomy. The original
    /// message and code are preserved for boundary classification.
    fn map_rpc_error(err: RpcErrorObject) -> Error {
        let text = format!("{} (RPC code {})", err.message, err.code);
        match err.code {
            // Wallet-level codes: not found, already exists, not loaded...
            -4 | -6 | -13 | -14 | -18 | -35 | -36 => Error::Wallet(text),
            // Transaction rejection and fee codes.
            -25 | -26 | -27 => Error::Transaction(text),
            // Node still warming up.
            -28 => Error::NodeConnection(text),
            _ => Error::Unknown(text),
        }
    }
}

#[async_trait]
impl NodeClient for BitcoindRpcClient {
    async fn call(&self, method: &str, params: Value, wallet: Option<&str>) -> Result<Value> {
        debug!("RPC {} (wallet={:?})", method, wallet);

        let body = json!({
            "jsonrpc": "1.0",
            "id": "regpack",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.endpoint(wallet))
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::NodeConnection(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::NodeConnection(
                "RPC authentication failed (401 Unauthorized)".to_string(),
            ));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::NodeConnection(format!("invalid RPC response: {}", e)))?;

        if let Some(err) = parsed.error {
            return Err(Self::map_rpc_error(err));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}
