//! Shared request loop for provider clients
//!
//! Sends a JSON POST, retrying transient failures with exponential backoff.
//! A 429 is returned immediately as `RateLimited` so the caller sees the
//! server's retry-after instead of burning attempts.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::LlmError;
use super::error::is_retryable_status;

/// Maximum number of retries for transient errors
pub(crate) const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
pub(crate) const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff before the given attempt (attempt 0 never waits)
pub(crate) fn backoff_for(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1))
}

/// Send the request built by `build` and decode the JSON body as `T`
///
/// `build` is called once per attempt because a sent request cannot be reused.
pub(crate) async fn send_json<T, F>(provider: &str, build: F) -> Result<T, LlmError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let backoff = backoff_for(attempt);
            warn!(
                %provider,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "send_json: retrying after transient error"
            );
            tokio::time::sleep(backoff).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%provider, attempt, error = %e, "send_json: network error");
                last_error = Some(LlmError::Network(e));
                continue;
            }
        };

        let status = response.status().as_u16();

        if status == 429 {
            debug!(%provider, "send_json: rate limited (429)");
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if is_retryable_status(status) && attempt < MAX_RETRIES {
            let text = response.text().await.unwrap_or_default();
            debug!(%provider, attempt, status, "send_json: retryable error");
            last_error = Some(LlmError::ApiError { status, message: text });
            continue;
        }

        if !response.status().is_success() {
            debug!(%provider, %status, "send_json: API error");
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        debug!(%provider, "send_json: success");
        return response
            .json::<T>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("{} response body: {}", provider, e)));
    }

    Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_for(0), Duration::ZERO);
        assert_eq!(backoff_for(1), Duration::from_millis(1000));
        assert_eq!(backoff_for(2), Duration::from_millis(2000));
        assert_eq!(backoff_for(3), Duration::from_millis(4000));
    }
}
