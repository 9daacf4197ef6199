//! Multi-turn chat on top of the agent loop.

use std::sync::Arc;

use taskloop_core::error::TranscriptError;
use taskloop_core::message::{Transcript, Turn};
use tokio_util::sync::CancellationToken;

use crate::loop_runner::{AgentLoop, RunOutcome};

/// A conversation that keeps its transcript across user inputs.
///
/// Each [`send`](ChatSession::send) appends the user turn and runs the loop;
/// the returned transcript is kept whatever the outcome, so a failed run
/// never loses history.
pub struct ChatSession {
    agent: Arc<AgentLoop>,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new(agent: Arc<AgentLoop>, system_prompt: impl Into<String>) -> Self {
        Self {
            agent,
            transcript: Transcript::seeded(system_prompt),
        }
    }

    pub async fn send(&mut self, input: &str) -> RunOutcome {
        self.send_with_cancel(input, &CancellationToken::new()).await
    }

    pub async fn send_with_cancel(&mut self, input: &str, cancel: &CancellationToken) -> RunOutcome {
        if let Err(e) = self.transcript.push(Turn::user(input)) {
            return RunOutcome::Failed(e.into());
        }
        let transcript = std::mem::take(&mut self.transcript);
        let run = self.agent.run_with_cancel(transcript, cancel).await;
        self.transcript = run.transcript;
        run.outcome
    }

    /// Start a new transcript under `system_prompt` and replay the history
    /// after the old system turn into it. Existing turns are never edited.
    pub fn refresh_system(&mut self, system_prompt: impl Into<String>) -> Result<(), TranscriptError> {
        let mut fresh = Transcript::seeded(system_prompt);
        for turn in self.transcript.turns().iter().skip(1) {
            fresh.push(turn.clone())?;
        }
        self.transcript = fresh;
        Ok(())
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}
