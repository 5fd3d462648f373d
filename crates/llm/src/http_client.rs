//! HTTP Client Factory
//!
//! Builds the reqwest client shared by the HTTP adapters.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with a whole-request timeout.
///
/// A zero timeout leaves the client without one.
pub fn build_http_client(timeout_secs: u64) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "report-narrator/",
        env!("CARGO_PKG_VERSION")
    ));
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("Failed to build HTTP client: {}", e),
    })
}
