//! Token lookups against the mirror node

use std::fmt;
use std::sync::Arc;

use hashpilot_core::{StructuredTool, ToolBuilder, ToolError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::LedgerServices;
use crate::context::LedgerContext;
use crate::error::LedgerError;
use crate::mirror::{MirrorNode, Query};
use crate::transform::lookup;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfoParams {
    pub token_id: Option<String>,
    pub account_id: Option<String>,
}

pub fn get_token_info_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<TokenInfoParams, LedgerContext>, ToolError> {
    let mirror = Arc::clone(&services.mirror);
    ToolBuilder::<TokenInfoParams, LedgerContext>::new(
        "get_token_info_tool",
        "Retrieves general info about a token id. If no token id is given but an account id is, returns info about all tokens held by or associated with the account.",
    )
    .func(move |params, ctx| token_info(Arc::clone(&mirror), params, ctx))
    .build()
}

async fn token_info(
    mirror: Arc<dyn MirrorNode>,
    params: TokenInfoParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let mut query: Query = vec![("order", "desc".to_string())];
    if let Some(token_id) = params.token_id {
        query.push(("token.id", token_id));
    }
    if let Some(account_id) = params.account_id {
        query.push(("account.id", account_id));
    }
    let response = mirror.get(&ctx.mirror_node_url(), "/api/v1/tokens", &query).await?;
    Ok(response["tokens"].to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
    Eq,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Ne => "ne",
            Self::Eq => "eq",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Balance threshold in mirror node filter syntax, e.g. `gt:100`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceFilter {
    pub operator: Operator,
    pub value: FilterValue,
}

impl BalanceFilter {
    pub fn to_query_value(&self) -> String {
        format!("{}:{}", self.operator.as_str(), self.value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BalanceAsset {
    Nft,
    #[default]
    Token,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalancesParams {
    pub token_id: Option<String>,
    pub account_id: Option<String>,
    /// Must be set for NFTs
    #[serde(default)]
    pub asset_type: BalanceAsset,
    /// Filters and returns balances for accounts that pass the threshold, used for TOKEN
    pub account_balance: Option<BalanceFilter>,
}

pub fn get_token_balances_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<TokenBalancesParams, LedgerContext>, ToolError> {
    let mirror = Arc::clone(&services.mirror);
    ToolBuilder::<TokenBalancesParams, LedgerContext>::new(
        "get_token_balances_tool",
        "1. Retrieves the list of balances and owners for a token id. \
         2. If both account id and token id are set, returns the token's balance for that account. \
         3. If only an account id is provided, fetches all tokens owned by the account, for NFTs or fungible tokens.",
    )
    .func(move |params, ctx| token_balances(Arc::clone(&mirror), params, ctx))
    .build()
}

async fn token_balances(
    mirror: Arc<dyn MirrorNode>,
    params: TokenBalancesParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let base = ctx.mirror_node_url();
    match (params.asset_type, params.token_id, params.account_id) {
        (BalanceAsset::Token, Some(token_id), account_id) => {
            let mut query: Query = vec![("order", "desc".to_string())];
            if let Some(account_id) = account_id {
                query.push(("account.id", account_id));
            }
            if let Some(filter) = &params.account_balance {
                query.push(("account.balance", filter.to_query_value()));
            }
            let path = format!("/api/v1/tokens/{token_id}/balances");
            let response = mirror.get(&base, &path, &query).await?;
            Ok(response["balances"].to_string())
        }
        (BalanceAsset::Nft, Some(token_id), account_id) => {
            let mut query = Query::new();
            if let Some(account_id) = account_id {
                query.push(("account.id", account_id));
            }
            let path = format!("/api/v1/tokens/{token_id}/nfts");
            let response = mirror.get(&base, &path, &query).await?;
            Ok(response["nfts"].to_string())
        }
        (_, None, Some(account_id)) => {
            let mut query: Query = vec![("account.id", account_id.clone())];
            if let Some(filter) = &params.account_balance {
                query.push(("balance", filter.to_query_value()));
            }
            let response = mirror.get(&base, "/api/v1/accounts", &query).await?;
            match lookup(&response, "accounts.0.balance") {
                Some(balance) => Ok(balance.to_string()),
                None => Err(LedgerError::Invalid(format!("No accounts found for accountId {account_id}")).into()),
            }
        }
        _ => Err(LedgerError::Invalid("Invalid params provided".into()).into()),
    }
}
