//! Shared test doubles.

use async_trait::async_trait;
use regpack_common::{Error, Result, SharedConfig};
use regpack_node::NodeClient;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A temp-dir-rooted configuration for pipeline tests.
pub fn test_config() -> (tempfile::TempDir, SharedConfig) {
    let temp = tempfile::tempdir().unwrap();
    let config = SharedConfig::default_under(temp.path());
    (temp, config)
}

#[derive(Debug)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub wallet: Option<String>,
}

#[derive(Default)]
struct MockState {
    height: u64,
    wallets: Vec<String>,
    descriptors: HashMap<String, Value>,
    fail_methods: HashSet<String>,
    calls: Vec<RecordedCall>,
}

/// In-memory node double implementing only [`NodeClient::call`].
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn with_height(height: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                height,
                ..Default::default()
            }),
        }
    }

    pub fn add_wallet(&self, name: &str) {
        self.state.lock().unwrap().wallets.push(name.to_string());
    }

    pub fn set_descriptors(&self, wallet: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .descriptors
            .insert(wallet.to_string(), value);
    }

    pub fn fail_method(&self, method: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_methods
            .insert(method.to_string());
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    pub fn wallets(&self) -> Vec<String> {
        self.state.lock().unwrap().wallets.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn last_generate_address(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .rev()
            .find(|c| c.method == "generatetoaddress")
            .and_then(|c| c.params[1].as_str().map(|s| s.to_string()))
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn call(&self, method: &str, params: Value, wallet: Option<&str>) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
            wallet: wallet.map(|w| w.to_string()),
        });

        if state.fail_methods.contains(method) {
            return Err(Error::Unknown(format!("mock failure for {}", method)));
        }

        match method {
            "getblockchaininfo" => Ok(json!({
                "chain": "regtest",
                "blocks": state.height,
                "bestblockhash":
                    "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
                "chainwork":
                    "0000000000000000000000000000000000000000000000000000000000000004",
            })),
            "getnetworkinfo" => Ok(json!({ "subversion": "/Satoshi:27.0.0/" })),
            "listwallets" => Ok(json!(state.wallets.clone())),
            "createwallet" => {
                let name = params[0].as_str().unwrap_or_default().to_string();
                if state.wallets.contains(&name) {
                    return Err(Error::Wallet(format!(
                        "Wallet \"{}\" already exists. (RPC code -4)",
                        name
                    )));
                }
                state.wallets.push(name.clone());
                Ok(json!({ "name": name }))
            }
            "loadwallet" => {
                let name = params[0].as_str().unwrap_or_default().to_string();
                if !state.wallets.contains(&name) {
                    state.wallets.push(name.clone());
                }
                Ok(json!({ "name": name }))
            }
            "listdescriptors" => {
                let w = wallet.unwrap_or_default();
                Ok(state
                    .descriptors
                    .get(w)
                    .cloned()
                    .unwrap_or_else(|| json!({ "descriptors": [] })))
            }
            "importdescriptors" => Ok(json!([{ "success": true }])),
            "getwalletinfo" => Ok(json!({
                "walletname": wallet.unwrap_or_default(),
                "descriptors": true,
            })),
            "getnewaddress" => Ok(json!(format!(
                "bcrt1qmock{}",
                wallet.unwrap_or("default")
            ))),
            "generatetoaddress" => {
                let count = params[0].as_u64().unwrap_or(0);
                state.height += count;
                let base = state.height;
                let hashes: Vec<String> = (0..count).map(|i| format!("{:064x}", base + i)).collect();
                Ok(json!(hashes))
            }
            "sendtoaddress" => Ok(json!("f".repeat(64))),
            "stop" => Ok(json!("Bitcoin Core stopping")),
            _ => Ok(Value::Null),
        }
    }
}
