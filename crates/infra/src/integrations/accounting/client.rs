//! reqwest adapter for the remote accounting REST API

use async_trait::async_trait;
use chrono::Utc;
use clinisync_core::sync::ports::{AccountingApi, RemoteRequest, RemoteResponse};
use clinisync_domain::{
    constants, AccessToken, CliniSyncError, Credentials, HttpMethod, RemoteConfig, Result,
};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::http::HttpClient;

const PARTNER_HEADER: &str = "Partner-Id";

/// Access token grant returned by the auth endpoint.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: Option<i64>,
}

/// HTTP implementation of [`AccountingApi`].
///
/// Status classification is left to the call executor: every HTTP response,
/// 4xx and 5xx included, comes back as `Ok(RemoteResponse)`.
pub struct HttpAccountingClient {
    http: HttpClient,
    base_url: Url,
    auth_url: Url,
    default_partner_id: String,
    /// Partner id of the credentials behind the current token.
    partner_id: RwLock<Option<String>>,
}

impl HttpAccountingClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .timeout(config.attempt_timeout())
            .max_attempts(constants::REMOTE_CALL_ATTEMPTS)
            .user_agent(concat!("clinisync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;
        Self::with_http(http, config)
    }

    /// Build around an existing HTTP client (retry policy, timeouts).
    pub fn with_http(http: HttpClient, config: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            http,
            base_url: parse_url("base_url", &config.base_url)?,
            auth_url: parse_url("auth_url", &config.auth_url)?,
            default_partner_id: config.partner_id.clone(),
            partner_id: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            CliniSyncError::InvalidInput(format!("invalid endpoint path {path:?}: {e}"))
        })
    }

    fn current_partner(&self) -> String {
        self.partner_id.read().clone().unwrap_or_else(|| self.default_partner_id.clone())
    }
}

#[async_trait]
impl AccountingApi for HttpAccountingClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AccessToken> {
        let partner = credentials
            .partner_id
            .clone()
            .unwrap_or_else(|| self.default_partner_id.clone());

        let builder = self
            .http
            .request(Method::POST, self.auth_url.clone())
            .header(PARTNER_HEADER, partner.as_str())
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({
                "username": credentials.username,
                "access_key": credentials.access_key,
            }));

        let response = self.http.send(builder).await?;
        let status = response.status().as_u16();
        let body = read_body(response).await?;

        match status {
            200..=299 => {
                let grant: TokenGrant = serde_json::from_value(body).map_err(|e| {
                    CliniSyncError::AuthRejected(format!("sign-in response has no token: {e}"))
                })?;
                *self.partner_id.write() = Some(partner);
                debug!(expires_in = ?grant.expires_in, "signed in to accounting service");
                Ok(AccessToken {
                    value: grant.access_token,
                    expires_at: grant
                        .expires_in
                        .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
                })
            }
            400 | 401 | 403 => {
                Err(CliniSyncError::AuthRejected(format!("HTTP {status}: {}", body_message(&body))))
            }
            _ => {
                warn!(status, "sign-in failed with unexpected status");
                Err(CliniSyncError::NetworkOrTimeout(format!("HTTP {status}")))
            }
        }
    }

    async fn send(&self, token: &AccessToken, request: &RemoteRequest) -> Result<RemoteResponse> {
        let mut url = self.endpoint(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut builder = self
            .http
            .request(to_method(request.method), url)
            .bearer_auth(&token.value)
            .header(PARTNER_HEADER, self.current_partner());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = self.http.send(builder).await?;
        let status = response.status().as_u16();
        let body = read_body(response).await?;
        Ok(RemoteResponse { status, body })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| CliniSyncError::Config(format!("remote.{field} {raw:?}: {e}")))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
    }
}

/// JSON when the body parses, the raw text otherwise, `null` when empty.
async fn read_body(response: Response) -> Result<Value> {
    let text = response
        .text()
        .await
        .map_err(|e| CliniSyncError::NetworkOrTimeout(format!("failed to read response: {e}")))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn body_message(body: &Value) -> String {
    body.get("Errors")
        .and_then(|errors| errors.get(0))
        .and_then(|error| error.get("Message"))
        .or_else(|| body.get("error_description"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "credentials rejected".to_string())
}
