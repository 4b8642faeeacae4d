//! Records of tokens created through the assistant

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::Network;
use crate::error::StoreError;

/// A token the user created, kept for their dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token_id: String,
    pub owner_account_id: String,
    pub network: Network,
    pub asset_type: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub initial_supply: u64,
    pub supply_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_supply: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, user_id: &str, record: TokenRecord) -> Result<(), StoreError>;

    async fn list(&self, user_id: &str) -> Result<Vec<TokenRecord>, StoreError>;
}

/// In-process store keyed by user
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, Vec<TokenRecord>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, user_id: &str, record: TokenRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<TokenRecord>, StoreError> {
        Ok(self.records.read().get(user_id).cloned().unwrap_or_default())
    }
}
