//! Notepad: a plain text file the agent appends notes to.
//!
//! Unlike vector memory there is no retrieval step. The whole file is shown
//! to the model in the system prompt before each user input.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use taskloop_core::error::ToolError;
use taskloop_core::tool::TypedTool;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const NOTEPAD: &str = "notepad";

/// An append-only notes file, one note per line.
#[derive(Debug, Clone)]
pub struct Notepad {
    path: PathBuf,
}

impl Notepad {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; empty until the first note is written.
    pub async fn read(&self) -> std::io::Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn append(&self, note: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{note}\n").as_bytes()).await?;
        file.flush().await
    }

    /// `base` followed by the notepad contents.
    pub async fn system_prompt(&self, base: &str) -> std::io::Result<String> {
        let notes = self.read().await?;
        Ok(format!(
            "{base}\n\nYou have a notepad you can write to with the `{NOTEPAD}` tool \
             to keep track of information about the user.\n\nHere is your notepad:\n{notes}"
        ))
    }
}

/// `notepad { content }`: append a line to the notepad.
pub struct NotepadTool {
    notepad: Notepad,
}

impl NotepadTool {
    pub fn new(notepad: Notepad) -> Self {
        Self { notepad }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotepadArgs {
    pub content: String,
}

#[async_trait]
impl TypedTool for NotepadTool {
    type Args = NotepadArgs;
    type Output = serde_json::Value;

    fn name(&self) -> &str {
        NOTEPAD
    }

    fn description(&self) -> &str {
        "Use this function to write to your notepad."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The content to write to your notepad."
                }
            },
            "required": ["content"]
        })
    }

    async fn call(&self, args: NotepadArgs) -> Result<serde_json::Value, ToolError> {
        self.notepad
            .append(&args.content)
            .await
            .map_err(|e| ToolError::execution(NOTEPAD, e))?;
        debug!(path = %self.notepad.path().display(), "Notepad updated");
        Ok(serde_json::json!({ "content": args.content }))
    }
}
