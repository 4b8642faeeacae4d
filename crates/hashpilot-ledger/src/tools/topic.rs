//! Consensus service topics

use std::sync::Arc;

use hashpilot_core::{StructuredTool, ToolBuilder, ToolError};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{LedgerServices, SignedParams, execute_transaction, require_signer};
use crate::context::LedgerContext;
use crate::mirror::{MirrorNode, Query};
use crate::transform::{Field, Projection, fenced_json, project, render};
use crate::wallet::Wallet;

const CREATED_TOPIC: &Projection = &[
    ("status", Field::Path("receipt.status")),
    ("topicId", Field::Path("receipt.topicId")),
];

const UPDATED_TOPIC: &Projection = &[("status", Field::Path("receipt.status"))];

const SUBMITTED_MESSAGE: &Projection = &[
    ("status", Field::Path("receipt.status")),
    ("topicSequenceNumber", Field::Path("receipt.topicSequenceNumber")),
];

const TOPIC_MESSAGES: &Projection = &[("topicMessages", Field::Compute(summarize_messages))];

fn summarize_messages(response: &Value) -> Value {
    response["topicMessages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .map(|m| {
                    json!({
                        "topic_id": m["topic_id"],
                        "message": m["message"],
                        "consensus_timestamp": m["consensus_timestamp"],
                        "sequence_number": m["sequence_number"],
                        "payer_account_id": m["payer_account_id"],
                    })
                })
                .collect()
        })
        .unwrap_or_else(|| json!([]))
}

async fn submit(
    wallet: &dyn Wallet,
    ctx: &LedgerContext,
    method: &str,
    signer: &str,
    fields: Value,
    receipt: &Projection,
) -> anyhow::Result<String> {
    let response = execute_transaction(wallet, ctx, method, signer, fields).await?;
    let summary = json!({ "accountId": signer, "receipt": project(&response, receipt) });
    Ok(fenced_json(&summary))
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicParams {
    /// Optional topic memo
    pub memo: Option<String>,
    /// Optional admin key, required to be able to update the topic in the future
    pub admin_key: Option<String>,
    /// Optional submit key. If not set the topic is public.
    pub submit_key: Option<String>,
    /// One of the connected account ids
    pub account_id: Option<String>,
}

impl SignedParams for CreateTopicParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

pub fn create_topic_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<CreateTopicParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<CreateTopicParams, LedgerContext>::new(
        "create_topic_tool",
        "Creates a new topic on the Hedera Consensus Service.",
    )
    .before(require_signer::<CreateTopicParams>)
    .func(move |params, ctx| create_topic(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn create_topic(
    wallet: Arc<dyn Wallet>,
    params: CreateTopicParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.account_id.as_deref())?;
    let fields = json!({
        "memo": params.memo,
        "adminKey": params.admin_key,
        "submitKey": params.submit_key,
    });
    submit(wallet.as_ref(), &ctx, "hcs/createTopic", &signer, fields, CREATED_TOPIC).await
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicParams {
    /// Topic id to update
    pub topic_id: String,
    /// Optional topic memo
    pub memo: Option<String>,
    /// Optional admin key, changes the admin key
    pub admin_key: Option<String>,
    /// Optional submit key
    pub submit_key: Option<String>,
    /// One of the connected account ids, must hold the topic's admin key
    pub admin_account_id: Option<String>,
}

impl SignedParams for UpdateTopicParams {
    fn signer_override(&self) -> Option<&str> {
        self.admin_account_id.as_deref()
    }
}

pub fn update_topic_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<UpdateTopicParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<UpdateTopicParams, LedgerContext>::new(
        "update_topic_tool",
        "Updates an existing topic on the Hedera Consensus Service.",
    )
    .before(require_signer::<UpdateTopicParams>)
    .func(move |params, ctx| update_topic(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn update_topic(
    wallet: Arc<dyn Wallet>,
    params: UpdateTopicParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.admin_account_id.as_deref())?;
    let fields = json!({
        "topicId": params.topic_id,
        "memo": params.memo,
        "adminKey": params.admin_key,
        "submitKey": params.submit_key,
    });
    submit(wallet.as_ref(), &ctx, "hcs/updateTopic", &signer, fields, UPDATED_TOPIC).await
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMessageParams {
    /// Topic id to submit the message to
    pub topic_id: String,
    /// Message to be submitted
    pub message: String,
    /// One of the connected account ids
    pub account_id: Option<String>,
}

impl SignedParams for SubmitMessageParams {
    fn signer_override(&self) -> Option<&str> {
        self.account_id.as_deref()
    }
}

pub fn submit_topic_message_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<SubmitMessageParams, LedgerContext>, ToolError> {
    let wallet = Arc::clone(&services.wallet);
    ToolBuilder::<SubmitMessageParams, LedgerContext>::new(
        "submit_topic_message_tool",
        "Submits a message to an existing topic on the Hedera Consensus Service.",
    )
    .before(require_signer::<SubmitMessageParams>)
    .func(move |params, ctx| submit_message(Arc::clone(&wallet), params, ctx))
    .build()
}

async fn submit_message(
    wallet: Arc<dyn Wallet>,
    params: SubmitMessageParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let signer = ctx.signer(params.account_id.as_deref())?;
    let fields = json!({ "topicId": params.topic_id, "message": params.message });
    submit(wallet.as_ref(), &ctx, "hcs/submitMessage", &signer, fields, SUBMITTED_MESSAGE).await
}

fn default_limit() -> Option<u32> {
    Some(5)
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessagesParams {
    /// Topic id to retrieve messages from
    pub topic_id: String,
    /// Sequence number of a single message to retrieve
    pub sequence_number: Option<u64>,
    /// Number of messages to return, ignored when a sequence number is set
    #[serde(default = "default_limit")]
    #[schemars(range(min = 1, max = 30))]
    pub limit: Option<u32>,
}

pub fn get_topic_messages_tool(
    services: &LedgerServices,
) -> Result<StructuredTool<TopicMessagesParams, LedgerContext>, ToolError> {
    let mirror = Arc::clone(&services.mirror);
    ToolBuilder::<TopicMessagesParams, LedgerContext>::new(
        "get_topic_messages_tool",
        "Retrieves messages from a specified topic on the Hedera Consensus Service.",
    )
    .func(move |params, ctx| topic_messages(Arc::clone(&mirror), params, ctx))
    .build()
}

async fn topic_messages(
    mirror: Arc<dyn MirrorNode>,
    params: TopicMessagesParams,
    ctx: Arc<LedgerContext>,
) -> anyhow::Result<String> {
    let base = ctx.mirror_node_url();
    let messages = match params.sequence_number {
        Some(sequence) => {
            let path = format!("/api/v1/topics/{}/messages/{sequence}", params.topic_id);
            vec![mirror.get(&base, &path, &Query::new()).await?]
        }
        None => {
            let path = format!("/api/v1/topics/{}/messages", params.topic_id);
            let mut query = Query::new();
            if let Some(limit) = params.limit {
                query.push(("limit", limit.to_string()));
            }
            let response = mirror.get(&base, &path, &query).await?;
            response["messages"].as_array().cloned().unwrap_or_default()
        }
    };
    Ok(render(&json!({ "topicMessages": messages }), TOPIC_MESSAGES))
}
