//! Fetch-level middleware.
//!
//! No direct analogue for this chain shape in `rmcp`; the `(next) =>
//! (input, init) => Response` composition is reproduced literally as
//! `apply_middlewares`, in `rmcp::service`'s general style of wrapping
//! transport send paths with instrumentation (cf. its
//! `.instrument(current_span)` on every send task). `reqwest`/`url` are
//! pulled in only for the `auth` feature's `withOAuth`; the full OAuth flow
//! stays out of scope here — this only wires a `TokenProvider` into the
//! retry chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type FetchFn = Arc<dyn Fn(FetchRequest) -> BoxFuture<'static, Result<FetchResponse, FetchError>> + Send + Sync>;

/// `(next) => (input, init) => Response`, composed right-to-left by
/// [`apply_middlewares`].
pub type FetchMiddleware = Arc<dyn Fn(FetchFn) -> FetchFn + Send + Sync>;

/// Applies middlewares right-to-left: the last middleware in the list wraps
/// `base` first, so the first middleware in the list runs outermost.
pub fn apply_middlewares(base: FetchFn, middlewares: &[FetchMiddleware]) -> FetchFn {
    middlewares.iter().rev().fold(base, |next, mw| mw(next))
}

/// Structured log record emitted by [`with_logging`].
#[derive(Debug, Clone)]
pub struct FetchLogRecord {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub duration: Duration,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Only log responses whose status is >= this threshold; `None` logs all.
    pub status_level: Option<u16>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self { status_level: None }
    }
}

/// Measures duration and emits a structured `tracing` record per call.
/// Spec note: the reference implementation's default logger uses
/// `console.log`/`console.error`, documented unsafe for stdio transports —
/// `tracing` sidesteps that since it never writes to stdout by default.
pub fn with_logging(options: LoggingOptions) -> FetchMiddleware {
    Arc::new(move |next: FetchFn| -> FetchFn {
        let options = options;
        Arc::new(move |request: FetchRequest| {
            let next = next.clone();
            let method = request.method.clone();
            let url = request.url.clone();
            Box::pin(async move {
                let started = Instant::now();
                let result = next(request).await;
                let duration = started.elapsed();
                match &result {
                    Ok(response) => {
                        let should_log = options
                            .status_level
                            .map(|threshold| response.status >= threshold)
                            .unwrap_or(true);
                        if should_log {
                            if response.status >= 400 {
                                tracing::error!(%method, %url, status = response.status, ?duration, "fetch response");
                            } else {
                                tracing::info!(%method, %url, status = response.status, ?duration, "fetch response");
                            }
                        }
                    }
                    Err(error) => {
                        tracing::error!(%method, %url, %error, ?duration, "fetch error");
                    }
                }
                result
            })
        })
    })
}

#[derive(Clone, Copy, Debug)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Exponential backoff retry.
pub fn create_retry_middleware(
    options: RetryOptions,
    is_retryable: impl Fn(&Result<FetchResponse, FetchError>) -> bool + Send + Sync + 'static,
) -> FetchMiddleware {
    let is_retryable = Arc::new(is_retryable);
    Arc::new(move |next: FetchFn| -> FetchFn {
        let options = options;
        let is_retryable = is_retryable.clone();
        Arc::new(move |request: FetchRequest| {
            let next = next.clone();
            let is_retryable = is_retryable.clone();
            Box::pin(async move {
                let mut attempt = 0;
                loop {
                    let result = next(request.clone()).await;
                    if attempt >= options.max_retries || !is_retryable(&result) {
                        return result;
                    }
                    let delay = options.base_delay * 2u32.pow(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            })
        })
    })
}

#[cfg(feature = "auth")]
pub mod oauth {
    use super::*;

    /// Minimal boundary the fetch middleware needs from an OAuth client
    /// provider: a bearer token and a retry-triggered refresh.
    /// Token acquisition itself (RFC 6749/7636/7523/8707/8693 flows) is out
    /// of scope; implement this trait against whichever OAuth client the
    /// embedding application already has.
    #[async_trait::async_trait]
    pub trait TokenProvider: Send + Sync {
        async fn tokens(&self) -> Option<String>;
        async fn refresh(&self, resource_metadata_url: Option<url::Url>, scope: Option<String>) -> Result<(), FetchError>;
    }

    fn parse_www_authenticate(header: &str) -> (Option<String>, Option<String>) {
        let mut resource_metadata = None;
        let mut scope = None;
        for part in header.split(',') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix("resource_metadata=") {
                resource_metadata = Some(value.trim_matches('"').to_string());
            } else if let Some(value) = part.strip_prefix("scope=") {
                scope = Some(value.trim_matches('"').to_string());
            }
        }
        (resource_metadata, scope)
    }

    /// Attaches a bearer token; on HTTP 401 parses `WWW-Authenticate`,
    /// refreshes once, and retries. A second 401 is fatal.
    pub fn with_oauth(provider: Arc<dyn TokenProvider>) -> FetchMiddleware {
        Arc::new(move |next: FetchFn| -> FetchFn {
            let provider = provider.clone();
            Arc::new(move |mut request: FetchRequest| {
                let next = next.clone();
                let provider = provider.clone();
                Box::pin(async move {
                    if let Some(token) = provider.tokens().await {
                        request
                            .headers
                            .insert("Authorization".to_string(), format!("Bearer {token}"));
                    }
                    let response = next(request.clone()).await?;
                    if response.status != 401 {
                        return Ok(response);
                    }
                    let challenge = response
                        .headers
                        .get("WWW-Authenticate")
                        .or_else(|| response.headers.get("www-authenticate"))
                        .cloned()
                        .unwrap_or_default();
                    let (resource_metadata, scope) = parse_www_authenticate(&challenge);
                    let resource_metadata_url = resource_metadata.and_then(|u| url::Url::parse(&u).ok());
                    provider.refresh(resource_metadata_url, scope).await?;

                    if let Some(token) = provider.tokens().await {
                        request
                            .headers
                            .insert("Authorization".to_string(), format!("Bearer {token}"));
                    }
                    let retried = next(request).await?;
                    if retried.status == 401 {
                        return Err(FetchError::Unauthorized(
                            "authorization failed after token refresh".to_string(),
                        ));
                    }
                    Ok(retried)
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(responses: Arc<tokio::sync::Mutex<Vec<Result<FetchResponse, FetchError>>>>) -> FetchFn {
        Arc::new(move |_request: FetchRequest| {
            let responses = responses.clone();
            Box::pin(async move { responses.lock().await.remove(0) })
        })
    }

    #[tokio::test]
    async fn retry_stops_after_success() {
        let responses = Arc::new(tokio::sync::Mutex::new(vec![
            Ok(FetchResponse {
                status: 503,
                headers: HashMap::new(),
                body: Vec::new(),
            }),
            Ok(FetchResponse {
                status: 200,
                headers: HashMap::new(),
                body: Vec::new(),
            }),
        ]));
        let chain = apply_middlewares(
            base(responses),
            &[create_retry_middleware(
                RetryOptions {
                    max_retries: 2,
                    base_delay: Duration::from_millis(1),
                },
                |result| matches!(result, Ok(r) if r.status >= 500),
            )],
        );
        let result = chain(FetchRequest {
            url: "https://example.test".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        })
        .await
        .unwrap();
        assert_eq!(result.status, 200);
    }
}
