//! Conversation context threaded to every ledger tool
//!
//! The host replaces the context wholesale when the user switches network or
//! account; tools only ever see an immutable snapshot.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{LedgerError, Result};
use crate::store::TokenStore;

/// Hedera network a conversation is bound to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
    Previewnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
            Self::Previewnet => "previewnet",
        }
    }

    /// Public mirror node for this network
    pub fn mirror_node_url(&self) -> String {
        format!("https://{}.mirrornode.hedera.com", self.as_str())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "mainnet" => Ok(Self::Mainnet),
            "previewnet" => Ok(Self::Previewnet),
            other => Err(LedgerError::Invalid(format!("Unknown network: {other}"))),
        }
    }
}

/// Notification raised by a tool for the user, outside the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub body: String,
}

/// Where tool alerts are shown
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Per-conversation state for ledger tools
#[derive(Clone, Default)]
pub struct LedgerContext {
    pub network: Network,
    /// Connected account used to sign when a call names none
    pub account_id: Option<String>,
    /// Owner of persisted token records
    pub user_id: Option<String>,
    /// Overrides the network's public mirror node
    pub mirror_node_url: Option<String>,
    pub alerts: Option<Arc<dyn AlertSink>>,
    pub token_store: Option<Arc<dyn TokenStore>>,
}

impl LedgerContext {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_mirror_node_url(mut self, url: impl Into<String>) -> Self {
        self.mirror_node_url = Some(url.into());
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn mirror_node_url(&self) -> String {
        self.mirror_node_url
            .clone()
            .unwrap_or_else(|| self.network.mirror_node_url())
    }

    /// Account that signs a transaction: the explicit one, else the
    /// connected one
    pub fn signer(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.account_id.clone())
            .ok_or(LedgerError::NoSigner)
    }

    /// Base params for a wallet request: network, mirror node and, when an
    /// account is named, the external account that acts for the user
    pub fn wallet_params(&self, external_account: Option<&str>) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("network".into(), json!(self.network));
        params.insert("mirrorNodeUrl".into(), json!(self.mirror_node_url()));
        if let Some(account) = external_account {
            params.insert(
                "externalAccount".into(),
                json!({ "accountIdOrEvmAddress": account, "curve": "ED25519" }),
            );
        }
        params
    }

    pub fn raise(&self, alert: Alert) {
        if let Some(sink) = &self.alerts {
            sink.alert(alert);
        }
    }
}

impl fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerContext")
            .field("network", &self.network)
            .field("account_id", &self.account_id)
            .field("user_id", &self.user_id)
            .field("mirror_node_url", &self.mirror_node_url)
            .field("alerts", &self.alerts.is_some())
            .field("token_store", &self.token_store.is_some())
            .finish()
    }
}
