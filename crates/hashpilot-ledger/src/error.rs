//! Error types for the ledger tools

use thiserror::Error;

/// Failures talking to the signing wallet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("No wallet connected")]
    NotConnected,

    #[error("Wallet transport error: {0}")]
    Transport(String),

    #[error("Wallet returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Wallet error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed wallet response: {0}")]
    Malformed(String),
}

/// Failures querying the mirror node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Mirror node transport error: {0}")]
    Transport(String),

    #[error("Mirror node returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed mirror node response: {0}")]
    Malformed(String),
}

/// Failures persisting created tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Token store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by ledger tool bodies
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No signing account: connect a wallet account or pass an account id")]
    NoSigner,

    #[error("An error occurred after executing transaction {0}")]
    Rejected(String),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
