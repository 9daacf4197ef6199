//! Built-in tool handlers for taskloop.
//!
//! - `saveMemory` / `getMemory`: long-term vector memory
//! - `notepad`: append-only notes file shown in the system prompt
//! - `getWeather`: lookup in an injected table
//! - `isTaskComplete`: completion sentinel for the agent loop

pub mod complete;
pub mod memory;
pub mod notepad;
pub mod weather;

use std::sync::Arc;

use taskloop_core::tool::ToolRegistry;
use taskloop_memory::VectorMemory;

pub use complete::{COMPLETE_FLAG, Completion, IS_TASK_COMPLETE, TaskCompleteTool};
pub use memory::{GET_MEMORY, GetMemoryTool, SAVE_MEMORY, SaveMemoryTool};
pub use notepad::{NOTEPAD, Notepad, NotepadTool};
pub use weather::{GET_WEATHER, WeatherReport, WeatherTable, WeatherTool};

/// Registry with the memory tools and the completion sentinel.
pub fn memory_registry(memory: Arc<VectorMemory>, retrieve_limit: usize) -> ToolRegistry {
    ToolRegistry::new()
        .with_typed(SaveMemoryTool::new(memory.clone()))
        .with_typed(GetMemoryTool::new(memory, retrieve_limit))
        .with_typed(TaskCompleteTool)
}
