//! Token count estimation for stored memories.

/// Estimate the token count of `text`.
///
/// Uses the common ~4 characters per token heuristic, rounded up.
pub fn count_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}
