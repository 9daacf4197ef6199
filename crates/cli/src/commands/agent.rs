//! `taskloop chat` and `taskloop ask`.

use std::io::Write;
use std::sync::Arc;

use taskloop_agent::{ChatSession, RunOutcome};
use taskloop_core::event::EventBus;
use taskloop_tools::Notepad;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::setup::{self, CmdResult};

/// Text shown to the user for a finished run.
fn render(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Answer(text) => text.clone(),
        RunOutcome::Completed { payload, .. } => payload
            .get("finalAnswer")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        RunOutcome::Exhausted { iterations } => {
            format!("[Stopped] No answer after {iterations} iterations.")
        }
        RunOutcome::Failed(e) => format!("[Error] {e}"),
        RunOutcome::Cancelled => "[Cancelled]".into(),
    }
}

/// A chat session plus the notepad whose contents lead its system prompt.
struct Conversation {
    session: ChatSession,
    system_prompt: String,
    notepad: Option<Notepad>,
}

impl Conversation {
    async fn send(&mut self, input: &str, cancel: &CancellationToken) -> CmdResult<RunOutcome> {
        if let Some(notepad) = &self.notepad {
            let prompt = notepad.system_prompt(&self.system_prompt).await?;
            self.session.refresh_system(prompt)?;
        }
        Ok(self.session.send_with_cancel(input, cancel).await)
    }
}

async fn conversation(offline: bool) -> CmdResult<(Conversation, String)> {
    let config = setup::load_config()?;
    setup::require_api_key(&config)?;

    let event_bus = Arc::new(EventBus::default());
    setup::spawn_event_logger(&event_bus);

    let memory = setup::open_memory(&config, offline, event_bus.clone()).await?;
    let agent = setup::build_agent(&config, memory.clone(), event_bus)?;
    let notepad = setup::notepad(&config);
    let mut banner = format!(
        "  Provider:  {}\n  Model:     {}\n  Memory:    {} ({} records, {} dims)",
        config.provider,
        config.model,
        memory.backend_name(),
        memory.count().await?,
        memory.dimensions(),
    );
    if let Some(notepad) = &notepad {
        banner.push_str(&format!("\n  Notepad:   {}", notepad.path().display()));
    }
    let system_prompt = config.agent.system_prompt.clone();
    let conversation = Conversation {
        session: ChatSession::new(Arc::new(agent), &system_prompt),
        system_prompt,
        notepad,
    };
    Ok((conversation, banner))
}

pub async fn ask(message: &str, offline: bool) -> CmdResult {
    let (mut conversation, _) = conversation(offline).await?;

    eprint!("  Thinking...");
    let outcome = conversation.send(message, &CancellationToken::new()).await?;
    eprint!("\r              \r");

    println!("{}", render(&outcome));
    match outcome {
        RunOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

pub async fn chat(offline: bool) -> CmdResult {
    let (mut conversation, banner) = conversation(offline).await?;

    println!();
    println!("  taskloop - interactive mode");
    println!();
    println!("{banner}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' to quit. Ctrl+C stops the current run.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        eprint!("  ...");
        let outcome = conversation.send(input, &cancel).await;
        watcher.abort();
        let outcome = outcome?;
        eprint!("\r     \r");

        println!();
        for line in render(&outcome).lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
