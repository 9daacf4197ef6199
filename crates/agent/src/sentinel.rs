//! Completion sentinel: a tool whose successful result ends the run.

use std::collections::HashSet;

use serde_json::Value;
use taskloop_core::tool::ToolResult;

/// Designates the tool that signals "done, here is the answer".
///
/// By default a successful result of the tool is trusted as-is. A flag
/// makes the loop also require `result[flag] == true`, and prerequisites
/// require that the named tools succeeded earlier in the same run.
#[derive(Debug, Clone)]
pub struct Sentinel {
    tool: String,
    flag: Option<String>,
    prerequisites: Vec<String>,
}

/// How the loop should treat one tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Not the sentinel tool.
    Ignore,
    /// End the run with this payload.
    Complete(Value),
    /// The sentinel fired but was not honoured; keep looping.
    Declined(String),
}

impl Sentinel {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            flag: None,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_flag(mut self, field: impl Into<String>) -> Self {
        self.flag = Some(field.into());
        self
    }

    pub fn with_prerequisites<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// `succeeded` holds the tools that produced a successful result earlier in the run.
    pub fn evaluate(&self, result: &ToolResult, succeeded: &HashSet<String>) -> Verdict {
        if result.tool_name != self.tool {
            return Verdict::Ignore;
        }
        let payload = match &result.outcome {
            Ok(payload) => payload,
            Err(e) => return Verdict::Declined(format!("sentinel failed: {e}")),
        };

        if let Some(flag) = &self.flag {
            if payload.get(flag).and_then(Value::as_bool) != Some(true) {
                return Verdict::Declined(format!("{flag} is not true"));
            }
        }

        let missing: Vec<&str> = self
            .prerequisites
            .iter()
            .filter(|p| !succeeded.contains(p.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Verdict::Declined(format!("prerequisites not met: {}", missing.join(", ")));
        }

        Verdict::Complete(payload.clone())
    }
}
