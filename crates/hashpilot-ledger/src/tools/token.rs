//! Token service transactions: create, mint, burn, associate

use std::sync::Arc;

use chrono::Utc;
use hashpilot_core::{StructuredTool, ToolBuilder, ToolError, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{LedgerServices, SignedParams, execute_transaction, require_signer};
use crate::context::{Alert, LedgerContext};
use crate::error::{LedgerError, Result};
use crate::store::TokenRecord;
use crate::transform::{Field, Projection, fenced_json, project};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetKind {
    Fungible,
    NonFungible,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fungible => "FUNGIBLE",
            Self::NonFungible => "NON_FUNGIBLE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupplyType {
    Finite,
    #[default]
    Infinite,
}

fn default_decimals() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenParams {
    pub asset_type: AssetKind,
    /// Name of token
    #[schemars(length(max = 100))]
    pub name: String,
    /// Token symbol
    #[schemars(length(max = 100))]
    pub symbol: String,
    /// Number of decimal places the token will have
    #[serde(default = "default_decimals")]
    #[schemars(range(max = 18))]
    pub decimals: u32,
    /// Number of tokens minted initially, only for FUNGIBLE
    pub initial_supply: Option<u64>,
    /// Specifies the token supply type
    #[serde(default)]
    pub supply_type: SupplyType,
    /// Key that sets KYC flags
    pub kyc_public_key: Option<String>,
    /// The key which can sign to freeze or unfreeze an account for token transactions
    pub freeze_public_key: Option<String>,
    /// The key which can pause or unpause the token. Pausing prevents the token from participating in all transactions.
    pub pause_public_key: Option<String>,
    /// The key which can wipe the token balance of an account. If empty, wipe is not possible.
    pub wipe_public_key: Option<String>,
    /// Must be provided. If the user does not provide one, first fetch their public key and use it.
    pub supply_public_key: String,
    pub freeze_default: Option<bool>,
    pub token_memo: Option<String>,
    /// One of the user's connected accounts, becomes the treasury
    pub account_id: Option<String>,
    /// Max tokens that can ever be minted for NON_FUNGIBLE and max tokens in circulation for FUNGIBLE. Must be set when supplyType is FINITE.
    pub max_supply: Option<u64>,
}

impl SignedParams for CreateTokenParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

impl CreateTokenParams {
    /// Apply the token type and supply rules before submitting
    pub fn normalized(mut self) -> Result<Self> {
        if self.asset_type == AssetKind::NonFungible {
            self.decimals = 0;
            self.initial_supply = Some(0);
        }
        match self.supply_type {
            SupplyType::Finite if self.max_supply.unwrap_or(0) == 0 => {
                return Err(LedgerError::Invalid(
                    "maxSupply must be provided when supplyType is set to finite".into(),
                ));
            }
            SupplyType::Infinite => self.max_supply = None,
            SupplyType::Finite => {}
        }
        Ok(self)
    }

    fn record(&self, token_id: &str, owner: &str, ctx: &LedgerContext) -> TokenRecord {
        TokenRecord {
            token_id: token_id.to_string(),
            owner_account_id: owner.to_string(),
            network: ctx.network,
            asset_type: self.asset_type.as_str().to_string(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            initial_supply: self.initial_supply.unwrap_or(0),
            supply_type: match self.supply_type {
                SupplyType::Finite => "FINITE".to_string(),
                SupplyType::Infinite => "INFINITE".to_string(),
            },
            max_supply: self.max_supply,
            memo: self.token_memo.clone(),
            created_at: Utc::now(),
        }
    }
}

const CREATED_TOKEN: &Projection = &[
    ("status", Field::Path("receipt.status")),
    ("tokenId", Field::Path("receipt.tokenId")),
];

const STATUS_ONLY: &Projection = &[("status", Field::Path("receipt.status"))];

/// `{accountId, receipt}` as shown to the model
fn receipt_summary(signer: &str, response: &Value, receipt: &Projection) -> Value {
    json!({ "accountId": signer, "receipt": project(response, receipt) })
}

pub fn create_token_tool(
    services: &LedgerServices,
) -> std::result::Result<StructuredTool<CreateTokenParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<CreateTokenParams, LedgerContext>::new(
        "create_hedera_token",
        "Creates a new FUNGIBLE or NON_FUNGIBLE token on the Hedera network. \
         Requires specific key information; if the user doesn't provide keys, fetch them first with the account info tool. \
         Always provide supplyPublicKey. \
         Ask the user about supplyType and maxSupply if they can't be inferred from the request. \
         If the token might be used in the real world, tell the user about the other optional keys and when they should set them.",
    )
    .before(require_signer::<CreateTokenParams>)
    .func(move |params, ctx| create_token(Arc::clone(&wallet), params, ctx))
    .after(remember_token)
    .build()
}

async fn create_token(
    wallet: Arc<dyn Wallet>,
    params: CreateTokenParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<ToolResult> {
    let params = params.normalized()?;
    let signer = ctx.signer(params.account_id.as_deref())?;

    let fields = json!({
        "assetType": params.asset_type,
        "name": params.name,
        "symbol": params.symbol,
        "decimals": params.decimals,
        "initialSupply": params.initial_supply.unwrap_or(0),
        "supplyType": params.supply_type,
        "maxSupply": params.max_supply,
        "treasuryAccountId": signer,
        "supplyPublicKey": params.supply_public_key,
        "adminPublicKey": params.supply_public_key,
        "kycPublicKey": params.kyc_public_key,
        "freezePublicKey": params.freeze_public_key,
        "pausePublicKey": params.pause_public_key,
        "wipePublicKey": params.wipe_public_key,
        "freezeDefault": params.freeze_default,
        "tokenMemo": params.token_memo,
    });
    let response = execute_transaction(wallet.as_ref(), &ctx, "hts/createToken", &signer, fields).await?;
    let summary = receipt_summary(&signer, &response, CREATED_TOKEN);
    Ok(ToolResult::text(fenced_json(&summary)).with_artifact(summary))
}

/// Persist the new token for the user and tell them where to find it
async fn remember_token(
    result: ToolResult,
    params: CreateTokenParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<()> {
    let Some(artifact) = result.artifact.as_ref() else {
        return Ok(());
    };
    let Some(token_id) = artifact["receipt"]["tokenId"].as_str() else {
        return Ok(());
    };
    let owner = artifact["accountId"].as_str().unwrap_or_default();
    let params = params.normalized()?;
    let record = params.record(token_id, owner, &ctx);

    if let (Some(user_id), Some(store)) = (ctx.user_id.as_deref(), ctx.token_store.as_ref()) {
        store.save(user_id, record.clone()).await?;
        info!(user_id, token_id, "Saved created token");
    }
    ctx.raise(Alert {
        title: format!("{} Created", record.asset_type),
        description: "You can view the token in the dashboard".to_string(),
        body: format!(
            "{} ({})\n\nTokenId {} on {}",
            record.name, record.symbol, record.token_id, record.network
        ),
    });
    Ok(())
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintTokenParams {
    pub asset_type: AssetKind,
    pub token_id: String,
    /// One of the user's connected accounts
    pub account_id: Option<String>,
    /// Amount of tokens to mint, should be 0 for NFTs
    pub amount: Option<u64>,
    /// Not needed for fungible tokens, MUST be passed for NFTs
    pub metadata: Option<Vec<String>>,
}

impl SignedParams for MintTokenParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

pub fn mint_token_tool(
    services: &LedgerServices,
) -> std::result::Result<StructuredTool<MintTokenParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<MintTokenParams, LedgerContext>::new(
        "mint_token_tool",
        "Mints additional units of an existing FUNGIBLE or NON_FUNGIBLE token. Requires token id and amount. Metadata is required only for minting NFTs.",
    )
    .before(require_signer::<MintTokenParams>)
    .func(move |params, ctx| mint_token(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn mint_token(
    wallet: Arc<dyn Wallet>,
    params: MintTokenParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.account_id.as_deref())?;
    let mut fields = json!({ "assetType": params.asset_type, "tokenId": params.token_id });
    match params.asset_type {
        AssetKind::Fungible => fields["amount"] = json!(params.amount.unwrap_or(0)),
        AssetKind::NonFungible => {
            let metadata = params
                .metadata
                .filter(|m| !m.is_empty())
                .ok_or_else(|| LedgerError::Invalid("Metadata is required for minting NFTs".into()))?;
            fields["metadata"] = json!(metadata);
        }
    }
    let response = execute_transaction(wallet.as_ref(), &ctx, "hts/mintToken", &signer, fields).await?;
    Ok(fenced_json(&receipt_summary(&signer, &response, STATUS_ONLY)))
}

fn default_burn_kind() -> AssetKind {
    AssetKind::Fungible
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BurnTokenParams {
    #[serde(default = "default_burn_kind")]
    pub asset_type: AssetKind,
    pub token_id: String,
    /// One of the user's connected accounts
    pub account_id: Option<String>,
    /// Not needed for NFTs
    pub amount: Option<u64>,
    /// Only needed for NFTs
    pub serial_numbers: Option<Vec<u64>>,
}

impl SignedParams for BurnTokenParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

pub fn burn_token_tool(
    services: &LedgerServices,
) -> std::result::Result<StructuredTool<BurnTokenParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<BurnTokenParams, LedgerContext>::new(
        "burn_token_tool",
        "Burns FUNGIBLE or NON_FUNGIBLE assets of an already existing Hedera token. Requires token id and amount. Serial numbers are required only for NFTs.",
    )
    .before(require_signer::<BurnTokenParams>)
    .func(move |params, ctx| burn_token(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn burn_token(
    wallet: Arc<dyn Wallet>,
    params: BurnTokenParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.account_id.as_deref())?;
    let mut fields = json!({ "assetType": params.asset_type, "tokenId": params.token_id });
    match params.asset_type {
        AssetKind::Fungible => {
            let amount = params
                .amount
                .ok_or_else(|| LedgerError::Invalid("Amount is required for burning fungible tokens".into()))?;
            fields["amount"] = json!(amount);
        }
        AssetKind::NonFungible => {
            let serials = params
                .serial_numbers
                .filter(|s| !s.is_empty())
                .ok_or_else(|| LedgerError::Invalid("Serial numbers are required for burning NFTs".into()))?;
            fields["serialNumbers"] = json!(serials);
        }
    }
    let response = execute_transaction(wallet.as_ref(), &ctx, "hts/burnToken", &signer, fields).await?;
    Ok(fenced_json(&receipt_summary(&signer, &response, STATUS_ONLY)))
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssociateTokensParams {
    /// Token ids to associate with the account
    #[schemars(length(min = 1))]
    pub token_ids: Vec<String>,
    /// One of the user's connected accounts
    pub account_id: Option<String>,
}

impl SignedParams for AssociateTokensParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

pub fn associate_tokens_tool(
    services: &LedgerServices,
) -> std::result::Result<StructuredTool<AssociateTokensParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<AssociateTokensParams, LedgerContext>::new(
        "associate_tokens_tool",
        "Associates one or more tokens with the user's account. Requires an array of token ids.",
    )
    .before(require_signer::<AssociateTokensParams>)
    .func(move |params, ctx| associate_tokens(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn associate_tokens(
    wallet: Arc<dyn Wallet>,
    params: AssociateTokensParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.account_id.as_deref())?;
    let fields = json!({ "tokenIds": params.token_ids, "accountId": signer });
    let response =
        execute_transaction(wallet.as_ref(), &ctx, "hts/associateTokens", &signer, fields).await?;
    Ok(fenced_json(&receipt_summary(&signer, &response, STATUS_ONLY)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> CreateTokenParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nft_forces_zero_decimals_and_supply() {
        let p = params(json!({
            "assetType": "NON_FUNGIBLE", "name": "Art", "symbol": "ART",
            "decimals": 6, "initialSupply": 500, "supplyPublicKey": "302a"
        }))
        .normalized()
        .unwrap();
        assert_eq!(p.decimals, 0);
        assert_eq!(p.initial_supply, Some(0));
    }

    #[test]
    fn test_finite_requires_max_supply() {
        let err = params(json!({
            "assetType": "FUNGIBLE", "name": "Gold", "symbol": "GLD",
            "supplyType": "FINITE", "supplyPublicKey": "302a"
        }))
        .normalized()
        .unwrap_err();
        assert_eq!(err.to_string(), "maxSupply must be provided when supplyType is set to finite");
    }

    #[test]
    fn test_infinite_drops_max_supply() {
        let p = params(json!({
            "assetType": "FUNGIBLE", "name": "Gold", "symbol": "GLD",
            "maxSupply": 1000, "supplyPublicKey": "302a"
        }))
        .normalized()
        .unwrap();
        assert_eq!(p.supply_type, SupplyType::Infinite);
        assert_eq!(p.max_supply, None);
        assert_eq!(p.decimals, 2);
    }
}
