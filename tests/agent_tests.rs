mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{calls, finish, tool_messages, Script, ScriptedProvider};
use convoy::agent::{Agent, Chat, SubAgentTool};
use convoy::agent_loop::{DispatchMode, FinishReason, RunRequest};
use convoy::config::RunConfig;
use convoy::error::{ConvoyError, ToolError};
use convoy::tools::{AgentTool, AgentToolParameters};
use convoy::types::{AssistantTurn, Message, TokenUsage};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn echo_tool() -> AgentTool {
    AgentTool::new(
        "echo",
        "Echo the text argument",
        AgentToolParameters::object().string("text", "Text to echo", true).build(),
        |args, _ctx| async move { Ok(json!(args.get_str("text")?)) },
    )
}

fn tracked_tool(
    name: &'static str,
    delay_ms: u64,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
) -> AgentTool {
    AgentTool::new(name, "Sleeps, then returns its name", AgentToolParameters::empty(), move |_args, _ctx| {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(name))
        }
    })
}

#[tokio::test]
async fn finish_on_first_turn_returns_its_content() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        finish("c1", "Hello!").with_usage(TokenUsage::new(12, 3, 0))
    ]));
    let agent: Agent = Agent::new(provider.clone());

    let result = agent.run(RunRequest::new("Say hello", ())).await.unwrap();

    assert_eq!(result.content, "Hello!");
    assert_eq!(result.iteration_count, 1);
    assert_eq!(result.finish_reason, FinishReason::FinishTool);
    assert_eq!(result.total_usage, TokenUsage::new(12, 3, 0));

    let tools = tool_messages(&result.history);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].tool_call_id, "c1");
    assert_eq!(tools[0].content, "Hello!");

    let requests = provider.requests();
    let offered: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(offered, vec!["finish"]);
}

#[tokio::test]
async fn failing_tool_is_fed_back_and_the_run_recovers() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "flaky", "{}")]).with_usage(TokenUsage::new(10, 5, 0)),
        finish("c2", "recovered").with_usage(TokenUsage::new(20, 5, 0)),
    ]));
    let flaky = AgentTool::new("flaky", "Always fails", AgentToolParameters::empty(), |_args, _ctx| async {
        Err(ToolError::execution("boom"))
    });
    let agent: Agent = Agent::new(provider.clone()).with_tool(flaky);

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(result.content, "recovered");
    assert_eq!(result.iteration_count, 2);
    assert_eq!(result.total_usage, TokenUsage::new(30, 10, 0));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let fed_back = tool_messages(&requests[1].messages);
    assert_eq!(fed_back.len(), 1);
    assert!(fed_back[0].is_error);
    assert_eq!(fed_back[0].content, "Tool 'flaky' failed: boom");
}

#[tokio::test]
async fn panicking_tool_is_fed_back_as_an_error_result() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "boom", "{}"), ("c2", "echo", r#"{"text":"still here"}"#)]),
        finish("c3", "recovered"),
    ]));
    let boom = AgentTool::new("boom", "Panics", AgentToolParameters::empty(), |_args, _ctx| async {
        if true {
            panic!("kaboom");
        }
        Ok(json!("unreachable"))
    });
    let agent: Agent = Agent::new(provider).with_tool(boom).with_tool(echo_tool());

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(result.content, "recovered");
    let tools = tool_messages(&result.history);
    assert!(tools[0].is_error);
    assert_eq!(tools[0].content, "Tool 'boom' failed: tool panicked: kaboom");
    assert!(!tools[1].is_error);
    assert_eq!(tools[1].content, "still here");
}

#[tokio::test]
async fn plain_text_turns_do_not_end_an_agent_run() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        AssistantTurn::text("thinking"),
        AssistantTurn::text("still thinking"),
        AssistantTurn::text("almost"),
    ]));
    let config = RunConfig::builder().max_iterations(3).build();
    let agent: Agent = Agent::new(provider.clone()).with_config(config);

    let err = agent.run(RunRequest::new("go", ())).await.unwrap_err();

    assert!(matches!(err, ConvoyError::IterationLimit { max_iterations: 3 }));
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn undecodable_finish_payload_is_fatal() {
    let provider = Arc::new(ScriptedProvider::with_turns([calls(&[(
        "c1",
        "finish",
        r#"{"reason":"no content"}"#,
    )])]));
    let agent: Agent = Agent::new(provider);

    let err = agent.run(RunRequest::new("go", ())).await.unwrap_err();
    assert!(matches!(err, ConvoyError::InvalidFinishPayload(_)));
}

#[tokio::test]
async fn unknown_tool_gets_an_error_result_listing_available_tools() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "missing", "{}")]),
        finish("c2", "done"),
    ]));
    let agent: Agent = Agent::new(provider).with_tool(echo_tool());

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    let tools = tool_messages(&result.history);
    assert!(tools[0].is_error);
    assert_eq!(tools[0].content, "Tool 'missing' not found. Available tools: echo");
}

#[tokio::test]
async fn calls_alongside_finish_are_recorded_as_skipped() {
    let provider = Arc::new(ScriptedProvider::with_turns([calls(&[
        ("c1", "echo", r#"{"text":"hi"}"#),
        ("c2", "finish", r#"{"content":"bye","reason":"done early"}"#),
    ])]));
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let counting = AgentTool::new("echo", "Counts calls", AgentToolParameters::empty(), move |_args, _ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(json!("hi")) }
    });
    let agent: Agent = Agent::new(provider).with_tool(counting);

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(result.content, "bye");
    assert_eq!(result.finish_note.as_deref(), Some("done early"));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    let tools = tool_messages(&result.history);
    let ids: Vec<_> = tools.iter().map(|t| t.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert!(tools[0].is_error);
    assert!(!tools[1].is_error);
}

#[tokio::test]
async fn tool_named_like_the_terminal_tool_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new());
    let shadow = AgentTool::new("finish", "Shadows finish", AgentToolParameters::empty(), |_args, _ctx| async {
        Ok(json!("nope"))
    });
    let agent: Agent = Agent::new(provider.clone()).with_tool(shadow);

    let err = agent.run(RunRequest::new("go", ())).await.unwrap_err();
    assert!(matches!(err, ConvoyError::Configuration(_)));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn zero_iterations_is_a_configuration_error() {
    let provider = Arc::new(ScriptedProvider::new());
    let config = RunConfig::builder().max_iterations(0).build();
    let agent: Agent = Agent::new(provider).with_config(config);

    let err = agent.run(RunRequest::new("go", ())).await.unwrap_err();
    assert!(matches!(err, ConvoyError::Configuration(_)));
}

#[tokio::test]
async fn system_prompt_is_inserted_only_when_history_has_none() {
    let provider = Arc::new(ScriptedProvider::with_turns([finish("c1", "a"), finish("c2", "b")]));
    let agent: Agent = Agent::new(provider.clone()).with_system_prompt("Be brief.");

    agent.run(RunRequest::new("one", ())).await.unwrap();
    agent
        .run(RunRequest::new("two", ()).with_history(vec![Message::system("Custom.")]))
        .await
        .unwrap();

    let requests = provider.requests();
    assert_eq!(requests[0].messages[0], Message::system("Be brief."));
    assert_eq!(requests[1].messages[0], Message::system("Custom."));
    assert_eq!(
        requests[1].messages.iter().filter(|m| m.is_system()).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_and_its_token_is_cancelled() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "slow", "{}")]),
        finish("c2", "gave up"),
    ]));
    let slow = AgentTool::new(
        "slow",
        "Never finishes in time",
        AgentToolParameters::empty(),
        |_args, ctx: convoy::tools::ToolExecutionContext<Mutex<Option<CancellationToken>>>| async move {
            *ctx.state().lock().unwrap() = Some(ctx.cancel.clone());
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!("late"))
        },
    );
    let config = RunConfig::builder()
        .per_tool_timeout(Duration::from_millis(50))
        .build();
    let agent = Agent::new(provider).with_tool(slow).with_config(config);

    let slot = Arc::new(Mutex::new(None));
    let result = agent
        .run(RunRequest::with_shared_context("go", Arc::clone(&slot)))
        .await
        .unwrap();

    let tools = tool_messages(&result.history);
    assert!(tools[0].is_error);
    assert_eq!(tools[0].content, "Tool 'slow' timed out after 50ms");
    let token = slot.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn concurrent_dispatch_overlaps_and_keeps_call_order() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "slow", "{}"), ("c2", "fast", "{}")]),
        finish("c3", "done"),
    ]));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let agent: Agent = Agent::new(provider)
        .with_tool(tracked_tool("slow", 200, active.clone(), peak.clone()))
        .with_tool(tracked_tool("fast", 50, active.clone(), peak.clone()));

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    let contents: Vec<_> = tool_messages(&result.history)
        .into_iter()
        .map(|t| t.content)
        .collect();
    assert_eq!(contents, vec!["slow", "fast", "done"]);
}

#[tokio::test(start_paused = true)]
async fn sequential_dispatch_never_overlaps() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "slow", "{}"), ("c2", "fast", "{}")]),
        finish("c3", "done"),
    ]));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let agent: Agent = Agent::new(provider)
        .with_dispatch_mode(DispatchMode::Sequential)
        .with_tool(tracked_tool("slow", 200, active.clone(), peak.clone()))
        .with_tool(tracked_tool("fast", 50, active.clone(), peak.clone()));

    let result = agent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(tool_messages(&result.history).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_a_model_request_aborts_the_run() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push(Script::Hang);
    let agent: Agent = Agent::new(provider);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let err = agent
        .run(RunRequest::new("go", ()).with_cancel_token(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvoyError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_tool_dispatch_aborts_the_run() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "slow", "{}")]),
        finish("c2", "unreachable"),
    ]));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let agent: Agent = Agent::new(provider.clone()).with_tool(tracked_tool("slow", 10_000, active, peak));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = agent
        .run(RunRequest::new("go", ()).with_cancel_token(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvoyError::Cancelled));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn truncation_applies_to_every_request_without_splitting_pairs() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "echo", r#"{"text":"hi"}"#)]),
        AssistantTurn::text("done"),
    ]));
    let config = RunConfig::builder().max_messages(2).build();
    let chat: Chat = Chat::new(provider.clone())
        .with_tool(echo_tool())
        .with_config(config)
        .with_system_prompt("sys");

    let history = vec![
        Message::user("old one"),
        Message::assistant("reply one"),
        Message::user("old two"),
        Message::assistant("reply two"),
    ];
    let result = chat
        .send(RunRequest::new("new", ()).with_history(history))
        .await
        .unwrap();

    let requests = provider.requests();
    assert_eq!(
        requests[0].messages,
        vec![
            Message::system("sys"),
            Message::assistant("reply two"),
            Message::user("new"),
        ]
    );

    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    assert!(second[0].is_system());
    assert_eq!(second[1].tool_calls().len(), 1);
    assert_eq!(second[2].tool_call_id(), Some("c1"));

    // The returned history is never truncated.
    assert_eq!(result.history.len(), 9);
}

#[tokio::test]
async fn chat_ends_on_a_reply_without_tool_calls() {
    let provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("c1", "echo", r#"{"text":"ping"}"#)]),
        AssistantTurn::text("Hello!"),
    ]));
    let chat: Chat = Chat::new(provider).with_tool(echo_tool());
    assert_eq!(chat.runner().dispatch_mode(), DispatchMode::Sequential);

    let result = chat.send(RunRequest::new("hi", ())).await.unwrap();

    assert_eq!(result.content, "Hello!");
    assert_eq!(result.finish_reason, FinishReason::NoToolCalls);
    assert_eq!(result.iteration_count, 2);
    assert_eq!(tool_messages(&result.history)[0].content, "ping");
}

#[tokio::test]
async fn sub_agent_returns_nested_content_with_shared_context() {
    let child_provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("k1", "whoami", "{}")]),
        finish("k2", "child done"),
    ]));
    let whoami = AgentTool::new(
        "whoami",
        "Reports the tenant",
        AgentToolParameters::empty(),
        |_args, ctx: convoy::tools::ToolExecutionContext<String>| async move {
            Ok(json!(ctx.state().clone()))
        },
    );
    let child = Agent::new(child_provider.clone()).with_tool(whoami);

    let parent_provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("p1", "delegate", r#"{"task":"look it up"}"#)]),
        finish("p2", "parent done"),
    ]));
    let parent = Agent::new(parent_provider)
        .with_tool(SubAgentTool::new("delegate", "Delegate a task", child));

    let result = parent
        .run(RunRequest::new("go", "tenant-42".to_string()))
        .await
        .unwrap();

    assert_eq!(result.content, "parent done");
    assert_eq!(tool_messages(&result.history)[0].content, "child done");

    let child_requests = child_provider.requests();
    assert_eq!(child_requests[0].messages, vec![Message::user("look it up")]);
    assert_eq!(tool_messages(&child_requests[1].messages)[0].content, "tenant-42");
}

#[tokio::test]
async fn nesting_beyond_max_depth_is_a_tool_error() {
    let child_provider = Arc::new(ScriptedProvider::new());
    let child: Agent = Agent::new(child_provider.clone());

    let parent_provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("p1", "delegate", r#"{"task":"x"}"#)]),
        finish("p2", "handled"),
    ]));
    let parent: Agent = Agent::new(parent_provider)
        .with_config(RunConfig::builder().max_depth(0).build())
        .with_tool(SubAgentTool::new("delegate", "Delegate a task", child));

    let result = parent.run(RunRequest::new("go", ())).await.unwrap();

    let tools = tool_messages(&result.history);
    assert!(tools[0].is_error);
    assert!(tools[0].content.contains("depth limit"), "{}", tools[0].content);
    assert!(child_provider.requests().is_empty());
}

#[tokio::test]
async fn nested_budget_overrun_is_a_tool_error() {
    let child_provider = Arc::new(ScriptedProvider::with_turns([
        AssistantTurn::text("expensive").with_usage(TokenUsage::new(20, 5, 0))
    ]));
    let child: Agent = Agent::new(child_provider);

    let parent_provider = Arc::new(ScriptedProvider::with_turns([
        calls(&[("p1", "delegate", r#"{"task":"x"}"#)]),
        finish("p2", "handled"),
    ]));
    let parent: Agent = Agent::new(parent_provider).with_tool(
        SubAgentTool::new("delegate", "Delegate a task", child).with_token_budget(10),
    );

    let result = parent.run(RunRequest::new("go", ())).await.unwrap();

    assert_eq!(result.content, "handled");
    let tools = tool_messages(&result.history);
    assert!(tools[0].is_error);
    assert!(tools[0].content.contains("Token budget exceeded"), "{}", tools[0].content);
}
