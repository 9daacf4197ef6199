//! HTTP plumbing shared by the completion and embedding clients.

use std::time::Duration;

/// Used when a 429 carries no usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))
}

/// How a response status should be treated.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    RateLimited(u64),
    Unauthorized,
    NotFound,
    Failed,
}

pub(crate) fn classify(status: u16, retry_after: Option<u64>) -> Status {
    match status {
        200..=299 => Status::Ok,
        429 => Status::RateLimited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        401 | 403 => Status::Unauthorized,
        404 => Status::NotFound,
        _ => Status::Failed,
    }
}

/// Seconds from a numeric `Retry-After` header.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
