//! Orchestrator integration tests
//!
//! Drives full rounds against a scripted gateway and checks the transcript.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hashpilot_core::gateway::ModelGateway;
use hashpilot_core::orchestrator::TOOL_NOT_FOUND;
use hashpilot_core::{
    ChatBody, ChatCompletion, ConversationStore, Error, GatewayError, Message, ModelParams,
    Orchestrator, OrchestratorEvent, Role, ToolBuilder, ToolCall, ToolCatalog, ToolDeclaration,
};
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Notify;

/// Gateway replaying canned replies and recording every request
#[derive(Default)]
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<ChatCompletion, GatewayError>>>,
    requests: Mutex<Vec<Vec<ChatBody>>>,
    tool_counts: Mutex<Vec<usize>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<ChatCompletion, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn process(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        _params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        self.requests.lock().push(messages.to_vec());
        self.tool_counts.lock().push(tools.len());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Malformed("script exhausted".into())))
    }
}

fn answer(text: &str) -> Result<ChatCompletion, GatewayError> {
    Ok(ChatCompletion::single("stop", ChatBody::assistant(text)))
}

fn call_tools(calls: Vec<ToolCall>) -> Result<ChatCompletion, GatewayError> {
    Ok(ChatCompletion::single(
        "tool_calls",
        ChatBody::assistant_with_tool_calls(None, calls),
    ))
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct BalanceParams {
    account_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct AmountParams {
    amount: f64,
}

/// Conversation context used by the test tools
#[derive(Default)]
struct Ctx {
    invocations: AtomicUsize,
}

fn balance_tool() -> impl hashpilot_core::Tool<Ctx> + 'static {
    ToolBuilder::<BalanceParams, Ctx>::new("get_balance", "Get an account balance")
        .func(|p: BalanceParams, ctx: Arc<Ctx>| async move {
            ctx.invocations.fetch_add(1, Ordering::SeqCst);
            assert_eq!(p.account_id, "0.0.100");
            Ok("42 HBAR")
        })
        .build()
        .unwrap()
}

fn amount_tool() -> impl hashpilot_core::Tool<Ctx> + 'static {
    ToolBuilder::<AmountParams, Ctx>::new("spend", "Spend an amount")
        .func(|p: AmountParams, ctx: Arc<Ctx>| async move {
            ctx.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(format!("spent {}", p.amount))
        })
        .build()
        .unwrap()
}

fn failing_tool(propagate: bool) -> impl hashpilot_core::Tool<Ctx> + 'static {
    ToolBuilder::<AmountParams, Ctx>::new("explode", "Always fails")
        .func(|_p: AmountParams, _ctx: Arc<Ctx>| async move {
            Err::<String, _>(anyhow::anyhow!("kaboom"))
        })
        .add_errors_in_output(!propagate)
        .build()
        .unwrap()
}

fn catalog() -> ToolCatalog<Ctx> {
    ToolCatalog::new()
        .with(balance_tool())
        .unwrap()
        .with(amount_tool())
        .unwrap()
}

fn orchestrator(
    store: &ConversationStore,
    gateway: Arc<ScriptedGateway>,
    catalog: ToolCatalog<Ctx>,
) -> Orchestrator<Ctx> {
    Orchestrator::new(
        store.clone(),
        gateway,
        catalog,
        Ctx::default(),
        ModelParams::new("test-model"),
    )
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_question_and_answer() {
        let store = ConversationStore::with_messages(vec![Message::system("Be helpful")]);
        let gateway = ScriptedGateway::new(vec![answer("Hi there")]);
        let orch = orchestrator(&store, gateway.clone(), catalog());

        store.append(Message::user("Hello"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        let summary: Vec<(Role, Option<&str>)> = messages
            .iter()
            .map(|m| (m.role, m.content.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Role::System, Some("Be helpful")),
                (Role::User, Some("Hello")),
                (Role::Assistant, Some("Hi there")),
            ]
        );
        assert!(messages[2].is_visible);
        assert!(!orch.status().in_progress);
        assert!(orch.status().error.is_none());
        assert_eq!(gateway.calls(), 1);
        assert_eq!(gateway.tool_counts.lock()[0], 2);
    }

    #[tokio::test]
    async fn test_single_tool_call_then_answer() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new(
                "call_1",
                "get_balance",
                r#"{"accountId":"0.0.100"}"#,
            )]),
            answer("Your balance is 42 HBAR."),
        ]);
        let orch = orchestrator(&store, gateway.clone(), catalog());

        store.append(Message::user("What's my balance for 0.0.100?"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        assert_eq!(messages.len(), 4);

        let request = &messages[1];
        assert_eq!(request.role, Role::Assistant);
        assert!(!request.is_visible);
        assert_eq!(
            request.raw_chat_body.as_ref().unwrap().tool_calls()[0].id,
            "call_1"
        );

        let result = &messages[2];
        assert_eq!(result.role, Role::Tool);
        assert_eq!(
            result.content.as_deref(),
            Some(r#"Called get_balance with {"accountId":"0.0.100"} result -> 42 HBAR"#)
        );
        assert_eq!(
            result.raw_chat_body.as_ref().unwrap().tool_call_id.as_deref(),
            Some("call_1")
        );

        assert_eq!(messages[3].content.as_deref(), Some("Your balance is 42 HBAR."));
        assert_eq!(orch.context().invocations.load(Ordering::SeqCst), 1);

        // The second model call sees the request and the tool result
        let requests = gateway.requests.lock();
        let second = &requests[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_not_raised() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("call_x", "foo_bar", r#"{"z":1,"a":2}"#)]),
            answer("Sorry, I can't do that."),
        ]);
        let orch = orchestrator(&store, gateway, catalog());

        store.append(Message::user("do foo"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        let content = messages[2].content.as_deref().unwrap();
        assert_eq!(
            content,
            format!(r#"Called foo_bar with {{"z":1,"a":2}} result -> {}"#, TOOL_NOT_FOUND)
        );
        assert_eq!(messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_function() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("call_1", "spend", r#"{"amount":"abc"}"#)]),
            answer("That amount is invalid."),
        ]);
        let orch = orchestrator(&store, gateway, catalog());

        store.append(Message::user("spend abc"));
        orch.run_until_idle().await.unwrap();

        let content = store.snapshot()[2].content.clone().unwrap();
        assert!(content.contains("Error in tool \"spend\""), "{content}");
        assert_eq!(orch.context().invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_arguments_isolated() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![
                ToolCall::new("call_1", "spend", "{amount: 5"),
                ToolCall::new("call_2", "get_balance", r#"{"accountId":"0.0.100"}"#),
            ]),
            answer("done"),
        ]);
        let orch = orchestrator(&store, gateway, catalog());

        store.append(Message::user("go"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        assert!(messages[2].content.as_deref().unwrap().contains("not valid JSON"));
        assert!(messages[3].content.as_deref().unwrap().ends_with("42 HBAR"));
    }
}

mod invariant_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_call_does_not_abort_siblings() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![
                ToolCall::new("c1", "get_balance", r#"{"accountId":"0.0.100"}"#),
                ToolCall::new("c2", "explode", r#"{"amount":1}"#),
                ToolCall::new("c3", "spend", r#"{"amount":2}"#),
            ]),
            answer("partial success"),
        ]);
        let catalog = catalog().with(failing_tool(false)).unwrap();
        let orch = orchestrator(&store, gateway, catalog);

        store.append(Message::user("go"));
        orch.run_until_idle().await.unwrap();

        let tool_messages: Vec<Message> = store
            .snapshot()
            .into_iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 3);

        let ids: Vec<String> = tool_messages
            .iter()
            .filter_map(|m| m.raw_chat_body.as_ref()?.tool_call_id.clone())
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);

        assert!(tool_messages[0].content.as_deref().unwrap().ends_with("42 HBAR"));
        assert!(
            tool_messages[1]
                .content
                .as_deref()
                .unwrap()
                .ends_with("Error in tool \"explode\": kaboom")
        );
        assert_eq!(tool_messages[1].metadata["artifact"]["error"], "kaboom");
        assert!(tool_messages[2].content.as_deref().unwrap().ends_with("spent 2"));
    }

    #[tokio::test]
    async fn test_results_are_one_atomic_batch() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![
                ToolCall::new("c1", "get_balance", r#"{"accountId":"0.0.100"}"#),
                ToolCall::new("c2", "spend", r#"{"amount":3}"#),
            ]),
            answer("ok"),
        ]);
        let orch = orchestrator(&store, gateway, catalog());

        let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
        let mut rx = store.subscribe();
        let recorder = {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let tools = rx.borrow_and_update().iter().filter(|m| m.role == Role::Tool).count();
                    seen.lock().push(tools);
                }
            })
        };

        store.append(Message::user("go"));
        orch.run_until_idle().await.unwrap();
        tokio::task::yield_now().await;
        drop(orch);
        drop(store);
        recorder.await.unwrap();

        let seen = seen.lock();
        assert!(!seen.contains(&1), "observer saw a partial batch: {seen:?}");
        assert_eq!(seen.last(), Some(&2));
    }

    #[tokio::test]
    async fn test_loop_terminates_with_one_visible_answer() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("c1", "spend", r#"{"amount":1}"#)]),
            call_tools(vec![ToolCall::new("c2", "spend", r#"{"amount":2}"#)]),
            call_tools(vec![ToolCall::new("c3", "spend", r#"{"amount":3}"#)]),
            answer("spent 6 in total"),
        ]);
        let orch = orchestrator(&store, gateway.clone(), catalog());

        store.append(Message::user("spend 1, 2, 3"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        let visible_answers = messages
            .iter()
            .filter(|m| m.role == Role::Assistant && m.is_visible)
            .count();
        assert_eq!(visible_answers, 1);
        assert!(messages.iter().all(|m| m.content.as_deref() != Some("Processing...")));
        assert_eq!(gateway.calls(), 4);
    }

    #[tokio::test]
    async fn test_propagating_tool_aborts_round() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![call_tools(vec![
            ToolCall::new("c1", "spend", r#"{"amount":1}"#),
            ToolCall::new("c2", "explode", r#"{"amount":1}"#),
        ])]);
        let catalog = catalog().with(failing_tool(true)).unwrap();
        let orch = orchestrator(&store, gateway.clone(), catalog);

        store.append(Message::user("go"));
        let err = orch.run_until_idle().await.unwrap_err();
        assert!(matches!(err, Error::Tool(_)));

        let messages = store.snapshot();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role != Role::Tool));
        let notice = &messages[1];
        assert_eq!(notice.role, Role::Assistant);
        assert!(notice.raw_chat_body.is_none());
        assert!(notice.content.as_deref().unwrap().contains("kaboom"));
        assert_eq!(orch.status().error.as_deref(), Some(err.to_string().as_str()));
        assert_eq!(gateway.calls(), 1);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_gateway_error_overwrites_placeholder() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![Err(GatewayError::RateLimited {
            body: "slow down".into(),
        })]);
        let orch = orchestrator(&store, gateway.clone(), catalog());
        let mut events = orch.subscribe_events();

        store.append(Message::user("Hello"));
        let err = orch.run_until_idle().await.unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::RateLimited { .. })));

        let messages = store.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[1].raw_chat_body.is_none());
        assert!(!orch.status().in_progress);
        assert!(orch.status().error.is_some());

        // Idle tail: nothing more to do
        assert!(!orch.step().await.unwrap());
        assert_eq!(gateway.calls(), 1);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, OrchestratorEvent::RoundFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);

        orch.dismiss_error();
        assert!(orch.status().error.is_none());
    }

    #[tokio::test]
    async fn test_max_rounds_parks_tail() {
        let store = ConversationStore::new();
        let replies = (0..5)
            .map(|i| call_tools(vec![ToolCall::new(format!("c{i}"), "spend", r#"{"amount":1}"#)]))
            .collect();
        let gateway = ScriptedGateway::new(replies);
        let orch = orchestrator(&store, gateway.clone(), catalog()).with_max_rounds(3);

        store.append(Message::user("loop forever"));
        let err = orch.run_until_idle().await.unwrap_err();
        assert!(matches!(err, Error::MaxRounds(3)));
        assert_eq!(gateway.calls(), 3);

        // The parked tool tail no longer triggers rounds
        assert_eq!(store.last().unwrap().role, Role::Tool);
        assert!(!orch.step().await.unwrap());

        // A new user turn starts counting again
        store.append(Message::user("ok, stop"));
        assert!(orch.needs_round(&store.snapshot()));
    }

    #[tokio::test]
    async fn test_after_hook_failure_is_observable() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("c1", "noted", r#"{"amount":1}"#)]),
            answer("done"),
        ]);
        let noted = ToolBuilder::<AmountParams, Ctx>::new("noted", "Records a note")
            .func(|_p: AmountParams, _ctx: Arc<Ctx>| async move { Ok("noted") })
            .after(|_r, _p: AmountParams, _ctx: Arc<Ctx>| async move {
                Err::<(), _>(anyhow::anyhow!("store offline"))
            })
            .build()
            .unwrap();
        let orch = orchestrator(&store, gateway, ToolCatalog::new().with(noted).unwrap());
        let mut events = orch.subscribe_events();

        store.append(Message::user("note it"));
        orch.run_until_idle().await.unwrap();

        assert!(store.snapshot()[2].content.as_deref().unwrap().ends_with("noted"));
        let mut hook_failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let OrchestratorEvent::HookFailed { tool, message } = event {
                hook_failures.push((tool, message));
            }
        }
        assert_eq!(hook_failures, vec![("noted".to_string(), "store offline".to_string())]);
    }
}

/// Gateway that blocks until released
struct GatedGateway {
    release: Notify,
    entered: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl ModelGateway for GatedGateway {
    fn name(&self) -> &str {
        "gated"
    }

    async fn process(
        &self,
        _messages: &[ChatBody],
        _tools: &[ToolDeclaration],
        _params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        answer("released")
    }
}

mod driver_tests {
    use super::*;

    #[tokio::test]
    async fn test_no_reentrant_round() {
        let store = ConversationStore::new();
        let gateway = Arc::new(GatedGateway {
            release: Notify::new(),
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let orch = Arc::new(Orchestrator::new(
            store.clone(),
            gateway.clone(),
            catalog(),
            Ctx::default(),
            ModelParams::new("test-model"),
        ));

        store.append(Message::user("Hello"));
        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.step().await })
        };
        gateway.entered.notified().await;
        assert!(orch.status().in_progress);

        // A user message arriving mid-round must not start a second round
        store.append(Message::user("Are you there?"));
        assert!(matches!(orch.step().await, Err(Error::Busy)));

        gateway.release.notify_one();
        assert!(first.await.unwrap().unwrap());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawned_driver_reacts_to_appends() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("c1", "get_balance", r#"{"accountId":"0.0.100"}"#)]),
            answer("42 HBAR it is"),
        ]);
        let orch = Arc::new(orchestrator(&store, gateway, catalog()));
        let mut events = orch.subscribe_events();
        let driver = orch.spawn();

        store.append(Message::user("balance?"));
        let mut idles = 0;
        while idles < 2 {
            if let OrchestratorEvent::Idle = events.recv().await.unwrap() {
                idles += 1;
            }
        }
        driver.abort();

        let last = store.last().unwrap();
        assert_eq!(last.content.as_deref(), Some("42 HBAR it is"));
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct DelayParams {
    ms: u64,
}

/// Sleeps for `ms` and records when it finished
fn delay_tool(finished: Arc<Mutex<Vec<u64>>>) -> impl hashpilot_core::Tool<Ctx> + 'static {
    ToolBuilder::<DelayParams, Ctx>::new("wait", "Wait a while")
        .func(move |p: DelayParams, _ctx: Arc<Ctx>| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(p.ms)).await;
                finished.lock().push(p.ms);
                Ok(format!("waited {}", p.ms))
            }
        })
        .build()
        .unwrap()
}

mod round_edge_tests {
    use super::*;

    fn tool_results(store: &ConversationStore) -> Vec<(String, String)> {
        store
            .snapshot()
            .into_iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| {
                let id = m.raw_chat_body.and_then(|b| b.tool_call_id).unwrap_or_default();
                (id, m.content.unwrap_or_default())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_tool_calls_finish_without_calls_is_an_answer() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            Ok(ChatCompletion::single(
                "tool_calls",
                ChatBody::assistant_with_tool_calls(Some("Nothing to look up".into()), vec![]),
            )),
            answer("never requested"),
        ]);
        let orch = orchestrator(&store, gateway.clone(), catalog());

        store.append(Message::user("hi"));
        orch.run_until_idle().await.unwrap();

        let messages = store.snapshot();
        assert_eq!(messages.len(), 2);
        let reply = &messages[1];
        assert_eq!(reply.role, Role::Assistant);
        assert!(reply.is_visible);
        assert_eq!(reply.content.as_deref(), Some("Nothing to look up"));
        assert!(reply.raw_chat_body.as_ref().unwrap().tool_calls.is_none());
        assert_eq!(gateway.calls(), 1);
        assert!(orch.status().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_call_order_when_finishing_out_of_order() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![
                ToolCall::new("c1", "wait", r#"{"ms":50}"#),
                ToolCall::new("c2", "wait", r#"{"ms":5}"#),
            ]),
            answer("both done"),
        ]);
        let finished: Arc<Mutex<Vec<u64>>> = Arc::default();
        let catalog = ToolCatalog::new().with(delay_tool(Arc::clone(&finished))).unwrap();
        let orch = orchestrator(&store, gateway, catalog);

        store.append(Message::user("wait twice"));
        orch.run_until_idle().await.unwrap();

        assert_eq!(*finished.lock(), vec![5, 50]);
        let results = tool_results(&store);
        assert_eq!(results[0].0, "c1");
        assert!(results[0].1.ends_with("waited 50"));
        assert_eq!(results[1].0, "c2");
        assert!(results[1].1.ends_with("waited 5"));
    }

    #[tokio::test]
    async fn test_user_message_during_dispatch_keeps_results_paired() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![ToolCall::new("c1", "interrupted", r#"{"amount":1}"#)]),
            answer("done, and yes I'm here"),
        ]);
        let interrupting = {
            let store = store.clone();
            ToolBuilder::<AmountParams, Ctx>::new("interrupted", "Runs while the user types")
                .func(move |_p: AmountParams, _ctx: Arc<Ctx>| {
                    let store = store.clone();
                    async move {
                        store.append(Message::user("are you there?"));
                        Ok("spent")
                    }
                })
                .build()
                .unwrap()
        };
        let catalog = ToolCatalog::new().with(interrupting).unwrap();
        let orch = orchestrator(&store, gateway.clone(), catalog);

        store.append(Message::user("spend 1"));
        orch.run_until_idle().await.unwrap();

        let requests = gateway.requests.lock();
        let roles: Vec<Role> = requests[1].iter().map(|b| b.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::User]);
        assert_eq!(requests[1][2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(store.last().unwrap().content.as_deref(), Some("done, and yes I'm here"));
    }

    #[tokio::test]
    async fn test_catalog_and_context_swaps_apply_next_round() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            answer("hello"),
            call_tools(vec![ToolCall::new("c1", "spend", r#"{"amount":4}"#)]),
            answer("spent"),
        ]);
        let orch = orchestrator(&store, gateway.clone(), catalog());
        let first_ctx = orch.context();

        store.append(Message::user("hi"));
        orch.run_until_idle().await.unwrap();

        orch.set_catalog(catalog().with(failing_tool(false)).unwrap());
        orch.set_context(Ctx::default());
        store.append(Message::user("spend 4"));
        orch.run_until_idle().await.unwrap();

        assert_eq!(*gateway.tool_counts.lock(), vec![2, 3, 3]);
        assert_eq!(first_ctx.invocations.load(Ordering::SeqCst), 0);
        assert_eq!(orch.context().invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_swaps_during_a_round_wait_for_the_next() {
        let store = ConversationStore::new();
        let gateway = ScriptedGateway::new(vec![
            call_tools(vec![
                ToolCall::new("c1", "narrow", r#"{"amount":1}"#),
                ToolCall::new("c2", "spend", r#"{"amount":2}"#),
            ]),
            answer("narrowed"),
        ]);
        let handle: Arc<OnceLock<Weak<Orchestrator<Ctx>>>> = Arc::default();
        let narrow = {
            let handle = Arc::clone(&handle);
            ToolBuilder::<AmountParams, Ctx>::new("narrow", "Drop to read-only tools")
                .func(move |_p: AmountParams, _ctx: Arc<Ctx>| {
                    let handle = Arc::clone(&handle);
                    async move {
                        if let Some(orch) = handle.get().and_then(|weak| weak.upgrade()) {
                            orch.set_catalog(ToolCatalog::new().with(balance_tool()).unwrap());
                            orch.set_context(Ctx::default());
                        }
                        Ok("narrowed")
                    }
                })
                .build()
                .unwrap()
        };
        let catalog = catalog().with(narrow).unwrap();
        let orch = Arc::new(orchestrator(&store, gateway.clone(), catalog));
        assert!(handle.set(Arc::downgrade(&orch)).is_ok());
        let round_ctx = orch.context();

        store.append(Message::user("go"));
        orch.run_until_idle().await.unwrap();

        // The running round kept its catalog and context
        let results = tool_results(&store);
        assert!(results[1].1.ends_with("spent 2"), "{results:?}");
        assert_eq!(round_ctx.invocations.load(Ordering::SeqCst), 1);

        // The next round sees the swapped ones
        assert_eq!(*gateway.tool_counts.lock(), vec![3, 1]);
        assert_eq!(orch.context().invocations.load(Ordering::SeqCst), 0);
    }
}
