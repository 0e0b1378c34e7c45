use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use tracing::{error, info, warn};

/// Outcome of a single rate-limited GET.
///
/// `NotFound` is a valid terminal answer for a lookup, not an error;
/// `Failed` covers transport errors, body decode failures and non-2xx/404
/// statuses, and always means "skip this unit of work" to callers.
#[derive(Debug)]
pub enum ApiResponse {
    Json(Value),
    NotFound,
    Failed,
}

impl ApiResponse {
    pub fn into_json(self) -> Option<Value> {
        match self {
            ApiResponse::Json(v) => Some(v),
            ApiResponse::NotFound | ApiResponse::Failed => None,
        }
    }
}

/// GET client that enforces a fixed minimum delay between consecutive calls
/// and honors a server-supplied Retry-After on 429, retrying exactly once.
///
/// Both providers impose a global request budget, so there is never more
/// than one request in flight; all waiting is a plain sleep.
pub struct RateLimitedClient {
    client: Client,
    auth_value: String,
    accept: &'static str,
    min_delay: Duration,
    retry_fallback: Duration,
}

impl RateLimitedClient {
    pub fn new(
        auth_value: String,
        accept: &'static str,
        min_delay: Duration,
        retry_fallback: Duration,
    ) -> Self {
        // Sane default timeout to avoid indefinite hangs on slow endpoints.
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            auth_value,
            accept,
            min_delay,
            retry_fallback,
        }
    }

    /// Issue a GET and classify the outcome. Rate-limit rejections sleep the
    /// server-directed duration (or the fallback) and re-issue once.
    pub async fn request(&self, url: &str) -> ApiResponse {
        info!(%url, "api request");

        let mut resp = match self.send(url).await {
            Ok(r) => r,
            Err(e) => {
                error!(%url, error = %e, "transport error");
                return ApiResponse::Failed;
            }
        };

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(resp.headers(), self.retry_fallback);
            warn!(
                wait_secs = wait.as_secs(),
                %url,
                "rate limited; waiting before single retry"
            );
            tokio::time::sleep(wait).await;
            resp = match self.send(url).await {
                Ok(r) => r,
                Err(e) => {
                    error!(%url, error = %e, "transport error on retry");
                    return ApiResponse::Failed;
                }
            };
        }

        let status = resp.status();
        if status.is_success() {
            match resp.json::<Value>().await {
                Ok(v) => ApiResponse::Json(v),
                Err(e) => {
                    error!(%url, error = %e, "failed to decode JSON body");
                    ApiResponse::Failed
                }
            }
        } else if status == StatusCode::NOT_FOUND {
            warn!(%url, "resource not found (404)");
            ApiResponse::NotFound
        } else {
            error!(status = %status, %url, "api error");
            ApiResponse::Failed
        }
    }

    async fn send(&self, url: &str) -> reqwest::Result<Response> {
        let resp = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, &self.auth_value)
            .header(header::ACCEPT, self.accept)
            .send()
            .await;
        // The inter-request delay applies after every send, retries included.
        tokio::time::sleep(self.min_delay).await;
        resp
    }
}

/// Parse a Retry-After header in seconds; absent or malformed values fall
/// back to the configured default.
fn retry_after(headers: &header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn retry_after_uses_server_value() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(
            retry_after(&headers, Duration::from_secs(5)),
            Duration::from_secs(12)
        );
    }

    #[test]
    fn retry_after_falls_back_when_missing_or_malformed() {
        let headers = HeaderMap::new();
        assert_eq!(
            retry_after(&headers, Duration::from_secs(5)),
            Duration::from_secs(5)
        );

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(
            retry_after(&headers, Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }
}
