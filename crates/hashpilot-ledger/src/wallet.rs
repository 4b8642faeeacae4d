//! Signing wallet bridge
//!
//! Every state-changing operation and the account queries go through the
//! user's wallet, which owns the keys. The HTTP bridge speaks JSON-RPC 2.0 and
//! wraps each call in a `wallet_invokeSnap` request addressed to the Hedera
//! wallet snap:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"wallet_invokeSnap",
//!  "params":{"snapId":"npm:@hashgraph/hedera-wallet-snap",
//!            "request":{"method":"getAccountInfo","params":{...}}}}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::WalletError;

pub const DEFAULT_SNAP_ID: &str = "npm:@hashgraph/hedera-wallet-snap";

/// A wallet that answers method calls with JSON
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

/// Placeholder used until the user pairs a wallet
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedWallet;

#[async_trait]
impl Wallet for DisconnectedWallet {
    async fn request(&self, _method: &str, _params: Value) -> Result<Value, WalletError> {
        Err(WalletError::NotConnected)
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Wallet reached over HTTP JSON-RPC
pub struct JsonRpcWallet {
    client: reqwest::Client,
    url: String,
    snap_id: String,
    next_id: AtomicU64,
}

impl JsonRpcWallet {
    pub fn new(url: impl Into<String>) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            snap_id: DEFAULT_SNAP_ID.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_snap_id(mut self, snap_id: impl Into<String>) -> Self {
        self.snap_id = snap_id.into();
        self
    }

    /// The JSON-RPC envelope for one wallet call
    pub fn envelope(&self, id: u64, method: &str, params: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "wallet_invokeSnap",
            "params": {
                "snapId": self.snap_id,
                "request": { "method": method, "params": params },
            },
        })
    }
}

/// Pull the result out of a JSON-RPC response body
pub fn parse_rpc_response(body: &str) -> Result<Value, WalletError> {
    let response: RpcResponse =
        serde_json::from_str(body).map_err(|e| WalletError::Malformed(e.to_string()))?;
    if let Some(error) = response.error {
        return Err(WalletError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    response
        .result
        .ok_or_else(|| WalletError::Malformed("response has neither result nor error".into()))
}

#[async_trait]
impl Wallet for JsonRpcWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(url = %self.url, method, id, "Invoking wallet");

        let response = self
            .client
            .post(&self.url)
            .json(&self.envelope(id, method, params))
            .send()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(WalletError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_rpc_response(&body)
    }
}
