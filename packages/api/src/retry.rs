//! HTTP retry helpers for transient errors.
//!
//! All collaborator clients use [`send_json`] or [`send_text`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so every request gets
//! automatic retry with exponential backoff for timeouts, connection resets,
//! HTTP 429, and HTTP 5xx.
//!
//! ```ignore
//! let body = retry::send_json(&policy, || client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::ApiError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// How many times, and how patiently, to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with `max_retries` retries starting at one second.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`. A body that arrives but cannot be parsed (truncated or
/// garbled response) re-fetches the whole request, each attempt going
/// through the connection-level retry loop again.
///
/// # Errors
///
/// Returns [`ApiError`] if the request fails after all retries, the server
/// returns a non-retryable status code, or the body cannot be parsed.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(policy: &RetryPolicy, build_request: F) -> Result<serde_json::Value, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_inner(policy, &build_request).await?;
        let url = response.url().to_string();
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str(&text) {
            Ok(value) => return Ok(value),
            Err(e) => {
                let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
                if body_attempt < policy.max_retries {
                    body_attempt += 1;
                    let delay = policy.delay(body_attempt);
                    log::warn!(
                        "JSON parse failed (body retry {body_attempt}/{}), re-fetching in {delay:?}...\n  \
                         url: {url}\n  \
                         status: {status}\n  \
                         parse error: {e}\n  \
                         body preview: {preview}",
                        policy.max_retries,
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ApiError::Parse {
                    message: format!(
                        "JSON parse failed: {e} (status={status}, received {} bytes)",
                        text.len()
                    ),
                });
            }
        }
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// # Errors
///
/// Returns [`ApiError`] if the request fails after all retries or the body
/// cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    Ok(response.text().await?)
}

/// Core retry loop shared by [`send_json`] and [`send_text`].
#[allow(clippy::future_not_send)]
async fn send_inner<F>(policy: &RetryPolicy, build_request: &F) -> Result<reqwest::Response, ApiError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::debug!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let error = match build_request().send().await {
            Err(e) => {
                if !is_transient(&e) {
                    return Err(ApiError::Http(e));
                }
                log::debug!("  transient error: {e}");
                ApiError::Http(e)
            }
            Ok(response) => {
                let status = response.status();
                match classify(status) {
                    StatusClass::Success => return Ok(response),
                    StatusClass::Unauthorized => {
                        return Err(ApiError::Unauthorized {
                            status: status.as_u16(),
                        });
                    }
                    StatusClass::Permanent => {
                        return Err(ApiError::Status {
                            status: status.as_u16(),
                        });
                    }
                    StatusClass::Transient => {
                        log::debug!("  HTTP {status} (transient)");
                        ApiError::Status {
                            status: status.as_u16(),
                        }
                    }
                }
            }
        };

        if attempt >= max_retries {
            return Err(error);
        }
        attempt += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Unauthorized,
    Permanent,
    Transient,
}

fn classify(status: reqwest::StatusCode) -> StatusClass {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        StatusClass::Unauthorized
    } else if status.is_client_error() {
        StatusClass::Permanent
    } else {
        StatusClass::Success
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Transient);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusClass::Transient);
        assert_eq!(classify(StatusCode::FORBIDDEN), StatusClass::Unauthorized);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusClass::Unauthorized);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::Permanent);
    }
}
