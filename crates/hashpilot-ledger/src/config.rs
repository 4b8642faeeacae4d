//! `[ledger]` section of the Hashpilot config file

use std::sync::Arc;

use hashpilot_core::ConfigManager;
use serde::{Deserialize, Serialize};

use crate::catalog::ToolScope;
use crate::context::{LedgerContext, Network};
use crate::error::LedgerError;
use crate::mirror::{HttpMirrorNode, MirrorNode};
use crate::tools::LedgerServices;
use crate::wallet::{DisconnectedWallet, JsonRpcWallet, Wallet};

pub const SECTION: &str = "ledger";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub network: Network,
    /// Overrides the network's public mirror node
    pub mirror_node_url: Option<String>,
    /// JSON-RPC endpoint of the wallet bridge
    pub wallet_url: Option<String>,
    pub account_id: Option<String>,
    pub user_id: Option<String>,
    pub scope: ToolScope,
}

impl LedgerConfig {
    pub fn load(manager: &ConfigManager) -> hashpilot_core::Result<Self> {
        manager.section(SECTION)
    }

    /// Context for a fresh conversation, without alerts or a token store
    pub fn context(&self) -> LedgerContext {
        LedgerContext {
            network: self.network,
            account_id: self.account_id.clone(),
            user_id: self.user_id.clone(),
            mirror_node_url: self.mirror_node_url.clone(),
            ..LedgerContext::default()
        }
    }

    /// Wallet and mirror node clients; without a wallet URL every signed or
    /// wallet-backed call fails with "No wallet connected"
    pub fn services(&self) -> Result<LedgerServices, LedgerError> {
        let wallet: Arc<dyn Wallet> = match &self.wallet_url {
            Some(url) => Arc::new(JsonRpcWallet::new(url.clone())?),
            None => Arc::new(DisconnectedWallet),
        };
        let mirror: Arc<dyn MirrorNode> = Arc::new(HttpMirrorNode::new()?);
        Ok(LedgerServices::new(wallet, mirror))
    }
}
