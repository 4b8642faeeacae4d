//! Hashpilot Ledger - Hedera tools for the Hashpilot orchestrator
//!
//! - `LedgerContext`: network, connected account and host hooks per conversation
//! - `Wallet` / `MirrorNode`: the signing wallet and the read-only REST API
//! - Account, token, token info and topic tools
//! - `ledger_catalog`: the tools a `ToolScope` allows, ready for the orchestrator

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod mirror;
pub mod store;
pub mod tools;
pub mod transform;
pub mod wallet;

pub use catalog::{ToolScope, ledger_catalog};
pub use config::LedgerConfig;
pub use context::{Alert, AlertSink, LedgerContext, Network};
pub use error::{LedgerError, MirrorError, StoreError, WalletError};
pub use mirror::{HttpMirrorNode, MirrorNode};
pub use store::{MemoryTokenStore, TokenRecord, TokenStore};
pub use tools::LedgerServices;
pub use wallet::{DisconnectedWallet, JsonRpcWallet, Wallet};
