//! Account queries and crypto transfers through the wallet

use std::sync::Arc;

use hashpilot_core::{StructuredTool, ToolBuilder, ToolError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{LedgerServices, SignedParams, execute_transaction, require_signer};
use crate::context::LedgerContext;
use crate::error::LedgerError;
use crate::transform::{Field, Projection, render};
use crate::wallet::Wallet;

const ACCOUNT_INFO: &Projection = &[
    ("accountId", Field::Path("currentAccount.hederaAccountId")),
    ("evmAddress", Field::Path("currentAccount.hederaEvmAddress")),
    ("metamaskEvmAddress", Field::Path("currentAccount.metamaskEvmAddress")),
    ("balance", Field::Path("currentAccount.balance.hbars")),
    ("network", Field::Path("currentAccount.network")),
    ("accountAlias", Field::Path("accountInfo.alias")),
    ("createdTime", Field::Path("accountInfo.createdTime")),
    ("memo", Field::Path("accountInfo.memo")),
    ("keyType", Field::Path("accountInfo.key.type")),
    ("publicKey", Field::Path("accountInfo.key.key")),
    ("isDeleted", Field::Path("accountInfo.isDeleted")),
    (
        "stakingInfo",
        Field::Nested(&[
            ("declineStakingReward", Field::Path("accountInfo.stakingInfo.declineStakingReward")),
            ("pendingReward", Field::Path("accountInfo.stakingInfo.pendingReward")),
            ("stakedToMe", Field::Path("accountInfo.stakingInfo.stakedToMe")),
        ]),
    ),
];

const TRANSACTIONS: &Projection = &[
    ("accountId", Field::Path("currentAccount.hederaAccountId")),
    ("network", Field::Path("currentAccount.network")),
    ("balance", Field::Path("currentAccount.balance.hbars")),
    ("transactions", Field::Compute(summarize_transactions)),
];

const SEND_CRYPTO: &Projection = &[
    ("accountId", Field::Path("currentAccount.hederaAccountId")),
    ("network", Field::Path("currentAccount.network")),
    ("balance", Field::Path("currentAccount.balance.hbars")),
    ("receipt", Field::Nested(&[("status", Field::Path("receipt.status"))])),
    (
        "exchangeRate",
        Field::Nested(&[
            ("hbars", Field::Path("receipt.exchangeRate.hbars")),
            ("cents", Field::Path("receipt.exchangeRate.cents")),
        ]),
    ),
];

fn summarize_transactions(response: &Value) -> Value {
    let Some(transactions) = response["transactions"].as_array() else {
        return json!([]);
    };
    transactions
        .iter()
        .map(|tx| {
            let transfers: Vec<Value> = tx["transfers"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|t| json!({ "account": t["account"], "amount": t["amount"] }))
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "timestamp": tx["consensus_timestamp"],
                "transactionHash": tx["transaction_hash"],
                "transactionId": tx["transaction_id"],
                "result": tx["result"],
                "transfers": transfers,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfoParams {
    /// User provided account id. If not provided, the connected account will be used.
    pub account_id: Option<String>,
}

pub fn get_account_info_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<AccountInfoParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<AccountInfoParams, LedgerContext>::new(
        "get_account_info_tool",
        "Get info for user's connected hedera account or for an external account. If the user provides an account id it is looked up, otherwise the connected account is used. Returns the account's public key as well.",
    )
    .func(move |params, ctx| account_info(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn account_info(
    wallet: Arc<dyn Wallet>,
    params: AccountInfoParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let mut request = ctx.wallet_params(ctx.account_id.as_deref());
    if let Some(account_id) = params.account_id {
        request.insert("accountId".into(), json!(account_id));
    }
    let response = wallet.request("getAccountInfo", Value::Object(request)).await?;
    Ok(render(&response, ACCOUNT_INFO))
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsParams {
    /// User provided transaction id
    pub transaction_id: Option<String>,
    /// User provided account id
    pub account_id: Option<String>,
}

pub fn get_transactions_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<TransactionsParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<TransactionsParams, LedgerContext>::new(
        "get_transactions_tool",
        "Retrieves transaction info for user's connected hedera account. A transaction id can be provided to get information about a particular transaction.",
    )
    .func(move |params, ctx| transactions(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn transactions(
    wallet: Arc<dyn Wallet>,
    params: TransactionsParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let account = params.account_id.as_deref().or(ctx.account_id.as_deref());
    let mut request = ctx.wallet_params(account);
    if let Some(transaction_id) = params.transaction_id {
        request.insert("transactionId".into(), json!(transaction_id));
    }
    let response = wallet.request("getTransactions", Value::Object(request)).await?;
    Ok(render(&response, TRANSACTIONS))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferAsset {
    #[default]
    Hbar,
    Token,
    Nft,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    #[serde(default)]
    pub asset_type: TransferAsset,
    /// Receiver's account id
    pub to: String,
    /// Sender's account id, use this in case the user specifies a particular account they want to use
    pub from: Option<String>,
    pub amount: f64,
    /// Asset id in case asset type is not HBAR
    pub asset_id: Option<String>,
    /// Optional transaction memo, very important when sending assets to exchanges
    pub memo: Option<String>,
}

impl SignedParams for TransferParams {
    fn signer_override(&self) -> Option<&str> {
        self.from.as_deref()
    }
}

pub fn transfer_crypto_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<TransferParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<TransferParams, LedgerContext>::new(
        "transfer_crypto_tool",
        "Sends assets to the receiver's address from the user's account. Asset type can be HBAR, TOKEN or NFT; HBAR is the default. Any other asset type needs the asset id as well.",
    )
    .before(require_signer::<TransferParams>)
    .func(move |params, ctx| transfer(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn transfer(
    wallet: Arc<dyn Wallet>,
    params: TransferParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    if params.asset_type != TransferAsset::Hbar && params.asset_id.is_none() {
        return Err(LedgerError::Invalid("assetId is required when transferring tokens or NFTs".into()).into());
    }
    let signer = ctx.signer(params.from.as_deref())?;
    let fields = json!({
        "transfers": [{
            "assetType": params.asset_type,
            "to": params.to,
            "amount": params.amount,
            "assetId": params.asset_id,
        }],
        "memo": params.memo,
    });
    let response = execute_transaction(wallet.as_ref(), &ctx, "transferCrypto", &signer, fields).await?;
    Ok(render(&response, SEND_CRYPTO))
}
