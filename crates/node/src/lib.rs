//! Node client capability: JSON-RPC access to a running bitcoind.

pub mod client;
pub mod poll;
pub mod rpc;

pub use client::{ChainInfo, NetworkInfo, NodeClient};
pub use poll::wait_for_rpc;
pub use rpc::BitcoindRpcClient;
