//! The agent reasoning loop implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use taskloop_config::AppConfig;
use taskloop_core::error::{Error, ToolError};
use taskloop_core::event::{DomainEvent, EventBus};
use taskloop_core::message::{ToolRequest, Transcript, Turn};
use taskloop_core::provider::{Provider, ProviderRequest, ToolChoice};
use taskloop_core::tool::{ToolDeclaration, ToolDispatcher, ToolResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sentinel::{Sentinel, Verdict};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The model answered in plain text.
    Answer(String),

    /// The sentinel tool fired; `payload` is its result.
    Completed { tool: String, payload: Value },

    /// The iteration ceiling was reached before an answer.
    Exhausted { iterations: u32 },

    /// A provider or embedding call failed, or the transcript was invalid.
    Failed(Error),

    /// The cancellation token fired between iterations.
    Cancelled,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::Completed { .. } => "completed",
            Self::Exhausted { .. } => "exhausted",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Answer(_) | Self::Completed { .. })
    }
}

/// The result of one run. The transcript is returned in every outcome.
#[derive(Debug)]
pub struct AgentRun {
    pub outcome: RunOutcome,
    pub transcript: Transcript,

    /// Completed model → tools → model round trips
    pub iterations: u32,

    pub provider_calls: u32,
}

/// States of a single run.
#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolRequest>),
    Finished(RunOutcome),
}

/// Orchestrates provider calls and tool dispatch until the model answers,
/// the sentinel fires, or the iteration budget runs out.
///
/// One `AgentLoop` can serve many runs; each run owns its transcript.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    dispatcher: Arc<dyn ToolDispatcher>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: u32,
    tool_choice: ToolChoice,
    sentinel: Option<Sentinel>,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 10,
            tool_choice: ToolChoice::Auto,
            sentinel: None,
            event_bus: None,
        }
    }

    /// Build a loop with the model, sampling, budget and sentinel from `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: &AppConfig,
    ) -> Self {
        let agent = &config.agent;
        let mut this = Self::new(provider, dispatcher, &config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_max_iterations(agent.max_iterations)
            .with_tool_choice(agent.tool_choice());

        if let Some(tool) = agent.sentinel.as_deref().filter(|t| !t.is_empty()) {
            let mut sentinel =
                Sentinel::new(tool).with_prerequisites(agent.sentinel_prerequisites.iter().cloned());
            if let Some(flag) = &agent.sentinel_flag {
                sentinel = sentinel.with_flag(flag);
            }
            this = this.with_sentinel(sentinel);
        }
        this
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of provider calls per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_sentinel(mut self, sentinel: Sentinel) -> Self {
        self.sentinel = Some(sentinel);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run to completion.
    pub async fn run(&self, transcript: Transcript) -> AgentRun {
        self.run_with_cancel(transcript, &CancellationToken::new()).await
    }

    /// Run until done, checking `cancel` before every provider call.
    ///
    /// Tool dispatches that have started are allowed to finish.
    pub async fn run_with_cancel(
        &self,
        mut transcript: Transcript,
        cancel: &CancellationToken,
    ) -> AgentRun {
        let mut iterations = 0u32;
        let mut provider_calls = 0u32;
        let mut succeeded: HashSet<String> = HashSet::new();
        let declarations = self.dispatcher.declarations();

        info!(
            transcript_id = %transcript.id,
            turns = transcript.len(),
            tools = declarations.len(),
            max_iterations = self.max_iterations,
            "Starting agent run"
        );

        let mut state = match transcript.validate_seed() {
            Ok(()) => LoopState::AwaitingModel,
            Err(e) => LoopState::Finished(RunOutcome::Failed(e.into())),
        };

        let outcome = loop {
            state = match state {
                LoopState::Finished(outcome) => break outcome,

                LoopState::AwaitingModel => {
                    if iterations >= self.max_iterations {
                        warn!(
                            transcript_id = %transcript.id,
                            iterations,
                            "Max iterations reached without an answer"
                        );
                        LoopState::Finished(RunOutcome::Exhausted { iterations })
                    } else if cancel.is_cancelled() {
                        info!(transcript_id = %transcript.id, iterations, "Run cancelled");
                        LoopState::Finished(RunOutcome::Cancelled)
                    } else {
                        provider_calls += 1;
                        self.call_model(&mut transcript, &declarations, iterations).await
                    }
                }

                LoopState::DispatchingTools(requests) => {
                    let next = self
                        .dispatch_tools(&mut transcript, &requests, &mut succeeded)
                        .await;
                    iterations += 1;
                    next
                }
            };
        };

        info!(
            transcript_id = %transcript.id,
            outcome = outcome.label(),
            iterations,
            provider_calls,
            "Agent run finished"
        );
        self.publish(DomainEvent::RunFinished {
            transcript_id: transcript.id.to_string(),
            outcome: outcome.label().into(),
            provider_calls,
            timestamp: Utc::now(),
        });

        AgentRun {
            outcome,
            transcript,
            iterations,
            provider_calls,
        }
    }

    async fn call_model(
        &self,
        transcript: &mut Transcript,
        declarations: &[ToolDeclaration],
        iteration: u32,
    ) -> LoopState {
        debug!(transcript_id = %transcript.id, iteration, "Agent loop iteration");

        let request = ProviderRequest {
            model: self.model.clone(),
            turns: transcript.turns().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: declarations.to_vec(),
            tool_choice: self.tool_choice.clone(),
        };

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(transcript_id = %transcript.id, error = %e, "Provider call failed");
                return LoopState::Finished(RunOutcome::Failed(e.into()));
            }
        };

        self.publish(DomainEvent::ProviderCalled {
            transcript_id: transcript.id.to_string(),
            iteration,
            model: response.model.clone(),
            tool_requests: response.tool_requests.len(),
            timestamp: Utc::now(),
        });

        if let Err(e) = transcript.push(response.to_turn()) {
            return LoopState::Finished(RunOutcome::Failed(e.into()));
        }

        if response.has_tool_requests() {
            debug!(count = response.tool_requests.len(), "Model requested tools");
            LoopState::DispatchingTools(response.tool_requests)
        } else {
            LoopState::Finished(RunOutcome::Answer(response.content.unwrap_or_default()))
        }
    }

    /// Dispatch one turn's requests concurrently, then append the results in
    /// request order. Only the first request for each id runs.
    async fn dispatch_tools(
        &self,
        transcript: &mut Transcript,
        requests: &[ToolRequest],
        succeeded: &mut HashSet<String>,
    ) -> LoopState {
        let mut seen = HashSet::new();
        let runnable: Vec<ToolRequest> = requests
            .iter()
            .filter(|request| seen.insert(request.id.as_str()))
            .cloned()
            .collect();
        if runnable.len() < requests.len() {
            warn!(
                transcript_id = %transcript.id,
                duplicates = requests.len() - runnable.len(),
                "Model repeated a request id, skipping duplicates"
            );
        }

        let start = Instant::now();
        let mut results = self.dispatcher.dispatch_all(&runnable).await.into_iter();
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut answered = HashSet::new();
        let mut completion = None;
        let mut fatal = None;
        let mut declined = Vec::new();

        for request in requests {
            let dispatched = if answered.insert(request.id.as_str()) {
                results.next()
            } else {
                None
            };
            let result = match dispatched {
                Some(result) => result,
                None => ToolResult {
                    request_id: request.id.clone(),
                    tool_name: request.name.clone(),
                    outcome: Err(ToolError::execution(&request.name, "duplicate request id in one turn")),
                },
            };

            self.publish(DomainEvent::ToolDispatched {
                tool_name: result.tool_name.clone(),
                request_id: result.request_id.clone(),
                success: result.is_success(),
                duration_ms,
                timestamp: Utc::now(),
            });

            if let Err(e) = transcript.push(result.to_turn()) {
                return LoopState::Finished(RunOutcome::Failed(e.into()));
            }

            if let Err(e) = &result.outcome {
                if e.is_fatal() && fatal.is_none() {
                    fatal = Some(e.clone());
                }
            }

            let verdict = match &self.sentinel {
                Some(sentinel) => sentinel.evaluate(&result, succeeded),
                None => Verdict::Ignore,
            };
            match verdict {
                Verdict::Complete(payload) if completion.is_none() => {
                    completion = Some(RunOutcome::Completed {
                        tool: result.tool_name.clone(),
                        payload,
                    });
                }
                Verdict::Declined(reason) => {
                    warn!(tool = %result.tool_name, %reason, "Sentinel not honoured, continuing");
                    declined.push(format!("{}: {reason}", result.tool_name));
                }
                _ => {}
            }

            if result.is_success() {
                succeeded.insert(result.tool_name);
            }
        }

        if let Some(e) = fatal {
            return LoopState::Finished(RunOutcome::Failed(e.into()));
        }
        if completion.is_none() && !declined.is_empty() {
            let note = format!("Completion not accepted ({}). Keep working on the task.", declined.join("; "));
            if let Err(e) = transcript.push(Turn::system(note)) {
                return LoopState::Finished(RunOutcome::Failed(e.into()));
            }
        }
        match completion {
            Some(outcome) => LoopState::Finished(outcome),
            None => LoopState::AwaitingModel,
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
