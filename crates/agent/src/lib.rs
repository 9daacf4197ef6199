//! The tool-calling agent loop.
//!
//! Each run follows a **model → tools → model** cycle:
//!
//! 1. **Send** the transcript and tool declarations to the provider
//! 2. **If tool requests**: dispatch them concurrently, append the results
//!    in request order, and loop back to step 1
//! 3. **If text**: the run is done
//!
//! The loop also ends when a designated sentinel tool succeeds, when the
//! iteration budget runs out, or when the provider fails.

pub mod loop_runner;
pub mod sentinel;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, AgentRun, RunOutcome};
pub use sentinel::{Sentinel, Verdict};
pub use session::ChatSession;
