//! Assembling ledger tools into a catalog

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hashpilot_core::{Tool, ToolCatalog, ToolError};
use serde::{Deserialize, Serialize};

use crate::context::LedgerContext;
use crate::error::LedgerError;
use crate::tools::LedgerServices;
use crate::tools::account::{get_account_info_tool, get_transactions_tool, transfer_crypto_tool};
use crate::tools::token::{associate_tokens_tool, burn_token_tool, create_token_tool, mint_token_tool};
use crate::tools::token_info::{get_token_balances_tool, get_token_info_tool};
use crate::tools::topic::{
    create_topic_tool, get_topic_messages_tool, submit_topic_message_tool, update_topic_tool,
};

/// How much of the ledger the model may touch
///
/// Scopes are ordered: each one includes every tool of the scopes below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolScope {
    /// Queries only, nothing is signed
    ReadOnly,
    /// Queries plus transfers, associations and topic messages
    Standard,
    /// Everything, including token and topic administration
    #[default]
    Full,
}

impl ToolScope {
    pub fn allows(&self, required: ToolScope) -> bool {
        *self >= required
    }
}

impl fmt::Display for ToolScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read_only",
            Self::Standard => "standard",
            Self::Full => "full",
        })
    }
}

impl FromStr for ToolScope {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, LedgerError> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            other => Err(LedgerError::Invalid(format!("Unknown tool scope: {other}"))),
        }
    }
}

type LedgerTool = Arc<dyn Tool<LedgerContext>>;

fn entry(scope: ToolScope, tool: impl Tool<LedgerContext> + 'static) -> (ToolScope, LedgerTool) {
    (scope, Arc::new(tool))
}

/// Every ledger tool with the scope it needs, in declaration order
fn all_tools(services: &LedgerServices) -> Result<Vec<(ToolScope, LedgerTool)>, ToolError> {
    use ToolScope::*;
    Ok(vec![
        entry(ReadOnly, get_account_info_tool(services)?),
        entry(ReadOnly, get_transactions_tool(services)?),
        entry(Standard, transfer_crypto_tool(services)?),
        entry(Full, create_token_tool(services)?),
        entry(Full, mint_token_tool(services)?),
        entry(Standard, associate_tokens_tool(services)?),
        entry(Full, burn_token_tool(services)?),
        entry(ReadOnly, get_token_info_tool(services)?),
        entry(ReadOnly, get_token_balances_tool(services)?),
        entry(Full, create_topic_tool(services)?),
        entry(Full, update_topic_tool(services)?),
        entry(Standard, submit_topic_message_tool(services)?),
        entry(ReadOnly, get_topic_messages_tool(services)?),
    ])
}

/// Build the catalog the model sees under `scope`
///
/// The host swaps catalogs wholesale when permissions change.
pub fn ledger_catalog(
    services: &LedgerServices,
    scope: ToolScope,
) -> Result<ToolCatalog<LedgerContext>, ToolError> {
    let mut catalog = ToolCatalog::new();
    for (required, tool) in all_tools(services)? {
        if scope.allows(required) {
            catalog.register(tool)?;
        }
    }
    Ok(catalog)
}
