//! End-to-end integration tests for taskloop.
//!
//! These tests drive the agent loop with a scripted provider against the
//! real tool handlers and memory backends, from seed transcript to outcome.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use taskloop_agent::{AgentLoop, ChatSession, RunOutcome, Sentinel};
use taskloop_config::AppConfig;
use taskloop_core::error::{Error, ProviderError, TranscriptError};
use taskloop_core::message::{ToolRequest, Transcript, Turn};
use taskloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
use taskloop_core::tool::{Tool, ToolRegistry};
use taskloop_memory::{HashingEmbedder, InMemoryBackend, SqliteBackend, VectorMemory};
use taskloop_tools::{
    COMPLETE_FLAG, GET_WEATHER, IS_TASK_COMPLETE, NOTEPAD, Notepad, NotepadTool, TaskCompleteTool,
    WeatherTable, WeatherTool, memory_registry,
};
use tokio_util::sync::CancellationToken;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that returns scripted responses in sequence and records
/// every request it receives.
struct ScriptedProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    fn scripted(mut responses: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every call with the same response.
    fn forever(response: ProviderResponse) -> Arc<Self> {
        Self::new(vec![response])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => panic!("ScriptedProvider exhausted"),
            1 => responses[0].clone(),
            _ => responses.pop().unwrap(),
        }
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolRequest {
    ToolRequest::new(id, name, args.to_string())
}

fn weather_registry() -> ToolRegistry {
    ToolRegistry::new().with_typed(WeatherTool::new(WeatherTable::sample()))
}

fn offline_memory(dimensions: usize) -> Arc<VectorMemory> {
    Arc::new(
        VectorMemory::new(
            Arc::new(HashingEmbedder::new(dimensions)),
            Arc::new(InMemoryBackend::new(dimensions)),
        )
        .unwrap(),
    )
}

// ── Agent loop ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_weather_lookup_then_answer() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("call_1", GET_WEATHER, json!({"location": "Dallas, TX"}))]),
        ProviderResponse::text("It's 80°F and clear in Dallas."),
    ]);
    let agent = AgentLoop::new(provider.clone(), Arc::new(weather_registry()), "gpt-4o-mini");

    let run = agent.run(Transcript::seeded("You are a weather assistant.")).await;

    assert!(matches!(run.outcome, RunOutcome::Answer(ref t) if t == "It's 80°F and clear in Dallas."));
    assert_eq!(run.transcript.len(), 4);
    let roles: Vec<_> = run.transcript.turns().iter().map(Turn::role).collect();
    assert_eq!(roles, vec!["system", "assistant", "tool", "assistant"]);

    let Turn::ToolResult { content, is_error, .. } = &run.transcript.turns()[2] else {
        panic!("expected a tool result");
    };
    assert!(!is_error);
    let report: Value = serde_json::from_str(content).unwrap();
    assert_eq!(report["temperature"], "80°F");
    assert_eq!(report["conditions"], "Clear");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_budget_exhausted_after_exactly_max_iterations() {
    let provider = ScriptedProvider::forever(ProviderResponse::tools(vec![call(
        "call_1",
        GET_WEATHER,
        json!({"location": "Chicago, IL"}),
    )]));
    let agent = AgentLoop::new(provider.clone(), Arc::new(weather_registry()), "m").with_max_iterations(3);

    let run = agent.run(Transcript::seeded("sys")).await;

    assert!(matches!(run.outcome, RunOutcome::Exhausted { iterations: 3 }));
    assert_eq!(provider.calls(), 3);
    assert_eq!(run.transcript.len(), 7);
}

#[tokio::test]
async fn e2e_unknown_tool_does_not_end_run() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("call_1", "nonexistent", json!({}))]),
        ProviderResponse::text("I can't do that."),
    ]);
    let agent = AgentLoop::new(provider.clone(), Arc::new(weather_registry()), "m");

    let run = agent.run(Transcript::seeded("sys")).await;

    assert!(matches!(run.outcome, RunOutcome::Answer(_)));
    let next = &run.transcript.turns()[2];
    assert_eq!(next.role(), "tool");
    assert!(next.is_error());
    assert!(next.text().unwrap().contains("nonexistent"));

    // The model saw the error before answering.
    let second = &provider.requests()[1];
    assert!(second.turns.last().unwrap().is_error());
}

#[tokio::test]
async fn e2e_missing_argument_is_reported_to_model() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("call_1", GET_WEATHER, json!({}))]),
        ProviderResponse::text("Which city?"),
    ]);
    let agent = AgentLoop::new(provider, Arc::new(weather_registry()), "m");

    let run = agent.run(Transcript::seeded("sys")).await;

    assert!(matches!(run.outcome, RunOutcome::Answer(ref t) if t == "Which city?"));
    let tool_turn = &run.transcript.turns()[2];
    assert!(tool_turn.is_error());
    assert!(tool_turn.text().unwrap().contains("location"));
}

#[tokio::test]
async fn e2e_parallel_requests_keep_issue_order() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![
            call("a", GET_WEATHER, json!({"location": "Miami, FL"})),
            call("b", "nonexistent", json!({})),
            call("c", GET_WEATHER, json!({"location": "Phoenix, AZ"})),
        ]),
        ProviderResponse::text("done"),
    ]);
    let agent = AgentLoop::new(provider, Arc::new(weather_registry()), "m");

    let run = agent.run(Transcript::seeded("sys")).await;

    let answered: Vec<(&str, bool)> = run.transcript.turns()[2..5]
        .iter()
        .map(|t| match t {
            Turn::ToolResult { request_id, is_error, .. } => (request_id.as_str(), *is_error),
            other => panic!("expected tool result, got {other:?}"),
        })
        .collect();
    assert_eq!(answered, vec![("a", false), ("b", true), ("c", false)]);
}

#[tokio::test]
async fn e2e_provider_failure_returns_partial_transcript() {
    let provider = ScriptedProvider::scripted(vec![
        Ok(ProviderResponse::tools(vec![call("call_1", GET_WEATHER, json!({"location": "Dallas, TX"}))])),
        Err(ProviderError::RateLimited { retry_after_secs: 30 }),
    ]);
    let agent = AgentLoop::new(provider.clone(), Arc::new(weather_registry()), "m");

    let run = agent.run(Transcript::seeded("sys")).await;

    assert!(matches!(
        run.outcome,
        RunOutcome::Failed(Error::Provider(ProviderError::RateLimited { .. }))
    ));
    assert_eq!(run.transcript.len(), 3);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_orphan_tool_result_rejected() {
    let mut transcript = Transcript::seeded("sys");
    transcript.push(Turn::user("hi")).unwrap();
    let err = transcript
        .push(Turn::tool_result("ghost", GET_WEATHER, "{}", false))
        .unwrap_err();
    assert_eq!(err, TranscriptError::OrphanToolResult { request_id: "ghost".into() });
    assert_eq!(transcript.len(), 2);
}

/// Cancels the run from inside a tool handler.
struct CancelTool(CancellationToken);

#[async_trait::async_trait]
impl Tool for CancelTool {
    fn name(&self) -> &str {
        "stop"
    }

    fn description(&self) -> &str {
        "Cancel the current run"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, taskloop_core::error::ToolError> {
        self.0.cancel();
        Ok(json!("stopping"))
    }
}

#[tokio::test]
async fn e2e_cancellation_checked_before_next_provider_call() {
    let cancel = CancellationToken::new();
    let provider = ScriptedProvider::forever(ProviderResponse::tools(vec![call("call_1", "stop", json!({}))]));
    let registry = ToolRegistry::new().with(Box::new(CancelTool(cancel.clone())));
    let agent = AgentLoop::new(provider.clone(), Arc::new(registry), "m");

    let run = agent.run_with_cancel(Transcript::seeded("sys"), &cancel).await;

    assert!(matches!(run.outcome, RunOutcome::Cancelled));
    assert_eq!(provider.calls(), 1);
    // The in-flight dispatch completed and its result was kept.
    assert_eq!(run.transcript.len(), 3);
    assert_eq!(run.transcript.turns()[2].text(), Some("stopping"));
}

// ── Memory tools and sentinel ────────────────────────────────────────────

#[tokio::test]
async fn e2e_save_recall_then_complete() {
    let memory = offline_memory(128);
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("c1", "saveMemory", json!({"content": "The user's favorite color is teal"}))]),
        ProviderResponse::tools(vec![call("c2", "getMemory", json!({"query": "favorite color"}))]),
        ProviderResponse::tools(vec![call(
            "c3",
            IS_TASK_COMPLETE,
            json!({"isComplete": true, "finalAnswer": "Your favorite color is teal."}),
        )]),
    ]);
    let agent = AgentLoop::new(provider.clone(), Arc::new(memory_registry(memory.clone(), 5)), "m")
        .with_sentinel(Sentinel::new(IS_TASK_COMPLETE).with_flag(COMPLETE_FLAG));

    let mut transcript = Transcript::seeded("sys");
    transcript.push(Turn::user("My favorite color is teal. What is it?")).unwrap();
    let run = agent.run(transcript).await;

    match &run.outcome {
        RunOutcome::Completed { tool, payload } => {
            assert_eq!(tool, IS_TASK_COMPLETE);
            assert_eq!(payload["finalAnswer"], "Your favorite color is teal.");
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(provider.calls(), 3);
    assert_eq!(memory.count().await.unwrap(), 1);
    assert_eq!(
        run.transcript.turns()[5].text(),
        Some("The user's favorite color is teal")
    );
}

#[tokio::test]
async fn e2e_sentinel_with_false_flag_keeps_looping() {
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call(
            "c1",
            IS_TASK_COMPLETE,
            json!({"isComplete": false, "finalAnswer": ""}),
        )]),
        ProviderResponse::text("Still working on it."),
    ]);
    let registry = ToolRegistry::new().with_typed(TaskCompleteTool);
    let agent = AgentLoop::new(provider.clone(), Arc::new(registry), "m")
        .with_sentinel(Sentinel::new(IS_TASK_COMPLETE).with_flag(COMPLETE_FLAG));

    let run = agent.run(Transcript::seeded("sys")).await;

    assert!(matches!(run.outcome, RunOutcome::Answer(_)));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_notepad_notes_lead_the_next_system_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let notepad = Notepad::new(dir.path().join("notepad.txt"));
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("c1", NOTEPAD, json!({"content": "User's name is Ana"}))]),
        ProviderResponse::text("Nice to meet you, Ana."),
        ProviderResponse::text("Your name is Ana."),
    ]);
    let registry = ToolRegistry::new().with_typed(NotepadTool::new(notepad.clone()));
    let agent = Arc::new(AgentLoop::new(provider.clone(), Arc::new(registry), "m"));
    let mut session = ChatSession::new(agent, notepad.system_prompt("sys").await.unwrap());

    assert!(matches!(session.send("I'm Ana").await, RunOutcome::Answer(_)));
    assert_eq!(notepad.read().await.unwrap(), "User's name is Ana\n");

    session
        .refresh_system(notepad.system_prompt("sys").await.unwrap())
        .unwrap();
    assert!(matches!(session.send("What's my name?").await, RunOutcome::Answer(_)));

    let first_prompt = provider.requests()[0].turns[0].text().unwrap().to_string();
    assert!(!first_prompt.contains("Ana"));
    let last_prompt = provider.requests()[2].turns[0].text().unwrap().to_string();
    assert!(last_prompt.ends_with("Here is your notepad:\nUser's name is Ana\n"));
    // Earlier turns survive the refresh.
    assert_eq!(provider.requests()[2].turns.len(), 6);
}

#[tokio::test]
async fn e2e_chat_session_remembers_across_inputs() {
    let memory = offline_memory(64);
    let provider = ScriptedProvider::new(vec![
        ProviderResponse::tools(vec![call("c1", "saveMemory", json!({"content": "User lives in Oslo"}))]),
        ProviderResponse::text("Noted."),
        ProviderResponse::text("You live in Oslo."),
    ]);
    let agent = Arc::new(AgentLoop::new(provider.clone(), Arc::new(memory_registry(memory, 5)), "m"));
    let mut session = ChatSession::new(agent, "sys");

    assert!(matches!(session.send("I live in Oslo").await, RunOutcome::Answer(_)));
    assert!(matches!(session.send("Where do I live?").await, RunOutcome::Answer(ref t) if t == "You live in Oslo."));

    // system, user, assistant(tool), tool, assistant, user, assistant
    assert_eq!(session.transcript().len(), 7);
    assert_eq!(provider.requests()[2].turns.len(), 6);
}

#[tokio::test]
async fn e2e_agent_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        model = "gpt-4o-mini"

        [agent]
        max_iterations = 2
        tool_choice = "getWeather"
        sentinel = ""
        "#,
    )
    .unwrap();
    let config = AppConfig::load_from(&path).unwrap();

    let provider = ScriptedProvider::forever(ProviderResponse::tools(vec![call(
        "c1",
        GET_WEATHER,
        json!({"location": "Dallas, TX"}),
    )]));
    let agent = AgentLoop::from_config(provider.clone(), Arc::new(weather_registry()), &config);
    let run = agent.run(Transcript::seeded(&config.agent.system_prompt)).await;

    assert!(matches!(run.outcome, RunOutcome::Exhausted { iterations: 2 }));
    let request = &provider.requests()[0];
    assert_eq!(request.model, "gpt-4o-mini");
    assert_eq!(request.max_tokens, Some(4096));
    assert_eq!(
        request.tool_choice,
        taskloop_core::provider::ToolChoice::Forced(GET_WEATHER.into())
    );
}

// ── Vector memory ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_duplicate_saves_tie_break_by_insertion() {
    let backend = SqliteBackend::new("sqlite::memory:", 256).await.unwrap();
    let memory = VectorMemory::new(Arc::new(HashingEmbedder::new(256)), Arc::new(backend)).unwrap();

    let first = memory.save("Mars has two moons").await.unwrap();
    let second = memory.save("Mars has two moons").await.unwrap();
    assert_ne!(first.id, second.id);

    let results = memory.retrieve("moons of Mars", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, first.id);

    let both = memory.retrieve("moons of Mars", 5).await.unwrap();
    assert_eq!(both.len(), 2);
    assert_eq!(both[0].record.id, first.id);
    assert_eq!(both[1].record.id, second.id);
}

#[tokio::test]
async fn e2e_sqlite_memory_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("memory.sqlite").display());

    let saved = {
        let backend = SqliteBackend::new(&url, 32).await.unwrap();
        let memory = VectorMemory::new(Arc::new(HashingEmbedder::new(32)), Arc::new(backend)).unwrap();
        memory.save("Rust was first released in 2015").await.unwrap()
    };

    let backend = SqliteBackend::new(&url, 32).await.unwrap();
    let memory = VectorMemory::new(Arc::new(HashingEmbedder::new(32)), Arc::new(backend)).unwrap();
    assert_eq!(memory.count().await.unwrap(), 1);

    let results = memory.retrieve("Rust was first released in 2015", 3).await.unwrap();
    assert_eq!(results[0].record.id, saved.id);
    assert!((results[0].similarity - 1.0).abs() < 1e-5);

    // A different deployment dimension is a configuration error at open time.
    assert!(SqliteBackend::new(&url, 64).await.is_err());
}
