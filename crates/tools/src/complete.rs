//! `isTaskComplete`: the model's way of handing back a final answer.
//!
//! The handler only echoes its arguments; the agent loop's sentinel decides
//! whether the run ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskloop_core::error::ToolError;
use taskloop_core::tool::TypedTool;

pub const IS_TASK_COMPLETE: &str = "isTaskComplete";

/// Field the sentinel checks before ending the run.
pub const COMPLETE_FLAG: &str = "isComplete";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub is_complete: bool,
    pub final_answer: String,
}

pub struct TaskCompleteTool;

#[async_trait]
impl TypedTool for TaskCompleteTool {
    type Args = Completion;
    type Output = Completion;

    fn name(&self) -> &str {
        IS_TASK_COMPLETE
    }

    fn description(&self) -> &str {
        "Call this when the user's task is finished, with your final answer."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "isComplete": {
                    "type": "boolean",
                    "description": "Whether the task is complete"
                },
                "finalAnswer": {
                    "type": "string",
                    "description": "The answer to give the user"
                }
            },
            "required": ["isComplete", "finalAnswer"]
        })
    }

    async fn call(&self, args: Completion) -> Result<Completion, ToolError> {
        Ok(args)
    }
}
