//! Ledger tools exposed to the model
//!
//! Queries go to the mirror node or the wallet; every state-changing tool is
//! signed by the wallet and runs a `before` hook that refuses to start when no
//! signing account can be resolved.

pub mod account;
pub mod token;
pub mod token_info;
pub mod topic;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::context::LedgerContext;
use crate::error::{LedgerError, Result};
use crate::mirror::MirrorNode;
use crate::transform::lookup;
use crate::wallet::Wallet;

/// External collaborators shared by every tool in a catalog
#[derive(Clone)]
pub struct LedgerServices {
    pub wallet: Arc<dyn Wallet>,
    pub mirror: Arc<dyn MirrorNode>,
}

impl LedgerServices {
    pub fn new(wallet: Arc<dyn Wallet>, mirror: Arc<dyn MirrorNode>) -> Self {
        Self { wallet, mirror }
    }
}

/// Params of a tool that signs a transaction
pub trait SignedParams {
    /// Account named in the call, overriding the connected one
    fn signer_override(&self) -> Option<&str>;
}

/// `before` hook for transaction tools
pub async fn require_signer<P: SignedParams>(params: P, ctx: Arc<LedgerContext>) -> anyhow::Result<()> {
    ctx.signer(params.signer_override())?;
    Ok(())
}

/// Ask the wallet to sign and submit a transaction; succeeds only on a
/// `SUCCESS` receipt
pub(crate) async fn execute_transaction(
    wallet: &dyn Wallet,
    ctx: &LedgerContext,
    method: &str,
    signer: &str,
    fields: Value,
) -> Result<Value> {
    let mut params = ctx.wallet_params(Some(signer));
    if let Value::Object(fields) = fields {
        params.extend(fields.into_iter().filter(|(_, v)| !v.is_null()));
    }

    let response = wallet.request(method, Value::Object(params)).await?;
    let status = lookup(&response, "receipt.status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");
    if status != "SUCCESS" {
        return Err(LedgerError::Rejected(status.to_string()));
    }
    info!(method, signer, network = %ctx.network, "Transaction executed");
    Ok(response)
}
