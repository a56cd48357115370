use std::time::Duration;

use clinisync_common::BackoffStrategy;
use clinisync_domain::{constants, CliniSyncError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client as ReqwestClient, Method, Request, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Retry budget for one logical request.
///
/// Reads (`GET`, `HEAD`) and `PUT` may be repeated. Anything else is sent
/// once: a create that timed out may already exist remotely and is resolved
/// by the sync engine, not by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::REMOTE_CALL_ATTEMPTS,
            backoff: BackoffStrategy::doubling(
                Duration::from_millis(constants::REMOTE_RETRY_BASE_DELAY_MS),
                Duration::from_millis(constants::REMOTE_RETRY_MAX_DELAY_MS),
            ),
        }
    }
}

impl RetryPolicy {
    pub fn attempts_for(&self, method: &Method) -> u32 {
        if matches!(*method, Method::GET | Method::HEAD | Method::PUT) {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// Thin reqwest wrapper shared by the remote integrations.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send the request, repeating it on gateway and throttling statuses or
    /// connection failures while the method allows it.
    ///
    /// Every received response is returned as `Ok`, whatever its status.
    /// Transport failures map to `NetworkOrTimeout`.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(into_domain)?;
        let attempts = self.retry.attempts_for(request.method());

        let mut attempt = 0;
        loop {
            let last_attempt = attempt + 1 >= attempts;
            let outcome = self.client.execute(duplicate(&request)?).await;

            match outcome {
                Ok(response) if last_attempt || !is_retryable_status(response.status()) => {
                    debug!(
                        method = %request.method(),
                        path = request.url().path(),
                        status = response.status().as_u16(),
                        attempt,
                        "remote responded"
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    warn!(
                        method = %request.method(),
                        path = request.url().path(),
                        status = response.status().as_u16(),
                        attempt,
                        "remote busy; retrying"
                    );
                }
                Err(err) if last_attempt || !is_retryable_transport(&err) => {
                    debug!(
                        method = %request.method(),
                        path = request.url().path(),
                        error = %err,
                        attempt,
                        "request failed"
                    );
                    return Err(into_domain(err));
                }
                Err(err) => {
                    warn!(
                        method = %request.method(),
                        path = request.url().path(),
                        error = %err,
                        attempt,
                        "request failed; retrying"
                    );
                }
            }

            let delay = self.retry.backoff.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    retry: RetryPolicy,
    user_agent: Option<String>,
    default_headers: HeaderMap,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            user_agent: None,
            default_headers: HeaderMap::new(),
        }
    }
}

impl HttpClientBuilder {
    /// Per-attempt timeout, connect included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts for retryable methods, first try included.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers.extend(headers);
        self
    }

    /// Fails with `SdkUnavailable` when the TLS backend cannot be set up.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder =
            ReqwestClient::builder().timeout(self.timeout).default_headers(self.default_headers);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|err| {
            CliniSyncError::SdkUnavailable(format!("failed to build HTTP client: {err}"))
        })?;
        Ok(HttpClient { client, retry: self.retry })
    }
}

fn duplicate(request: &Request) -> Result<Request> {
    request.try_clone().ok_or_else(|| {
        CliniSyncError::Internal("streaming request bodies cannot be sent through HttpClient".into())
    })
}

/// Gateway and throttling answers carry no verdict on the request itself.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn into_domain(err: reqwest::Error) -> CliniSyncError {
    CliniSyncError::from(InfraError::from(err))
}
