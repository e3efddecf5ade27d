//! HTTP client for a single authenticated ERP session.
//!
//! One session per client instance. A client is created by the login
//! negotiator and replaced wholesale when the session changes; it is never
//! mutated in place, so concurrent requests can't observe a torn credential.

use std::time::Duration;

use thiserror::Error;

use super::model::{EndpointsResponse, Envelope, StockItem};

/// Request timeout applied to every call on the session client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How the session authenticates. Exactly one mode is active at a time.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// OAuth bearer token sent on every request.
    Bearer(String),
    /// Server-issued session cookie held in the client's cookie jar.
    Cookie,
}

impl AuthMode {
    pub fn describe(&self) -> &'static str {
        match self {
            AuthMode::Bearer(_) => "oauth-bearer",
            AuthMode::Cookie => "cookie-session",
        }
    }
}

/// Typed errors for entity API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the session (401/403). The active credential must
    /// be invalidated; callers re-authenticate rather than retry.
    #[error("session rejected by server (401)")]
    Unauthorized,

    /// The endpoint or collection does not exist (404).
    #[error("endpoint not found (404)")]
    NotFound,

    /// Any other non-success status, surfaced verbatim.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// Transport-level failure (connectivity, timeout).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Neither the envelope nor the bare-array shape decoded.
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Result of a cheap authenticated probe against the entity API.
#[derive(Debug, Clone)]
pub enum VerifyResult {
    /// The session is valid.
    Valid,
    /// The session was explicitly rejected (401/403).
    Rejected,
    /// Could not reach the server (network error, timeout, server error).
    Unreachable(String),
}

/// Strip the trailing slash so rooted paths can be appended uniformly.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// An authenticated session against one ERP instance.
#[derive(Debug, Clone)]
pub struct ErpClient {
    http: reqwest::Client,
    base_url: String,
    tenant: String,
    api_version: String,
    mode: AuthMode,
}

impl ErpClient {
    /// Create a session client with its own connection and cookie jar.
    pub fn new(
        base_url: &str,
        tenant: &str,
        api_version: &str,
        mode: AuthMode,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()?;
        Ok(Self::from_parts(http, base_url, tenant, api_version, mode))
    }

    /// Wrap an existing `reqwest` client. Used by the login negotiator to keep
    /// the cookie jar that the login call populated.
    pub fn from_parts(
        http: reqwest::Client,
        base_url: &str,
        tenant: &str,
        api_version: &str,
        mode: AuthMode,
    ) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url),
            tenant: tenant.to_string(),
            api_version: api_version.to_string(),
            mode,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    fn stock_item_url(&self) -> String {
        format!(
            "{}/entity/Default/{}/StockItem",
            self.base_url, self.api_version
        )
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.mode {
            AuthMode::Bearer(token) => req.bearer_auth(token),
            AuthMode::Cookie => req,
        }
    }

    /// Query the stock item collection with optional `$filter` and `$expand`.
    ///
    /// Tolerates both response shapes the server is known to produce: the
    /// OData envelope `{ "value": [...] }` and a bare array.
    pub async fn stock_items(
        &self,
        filter: Option<&str>,
        expand: Option<&str>,
    ) -> Result<Vec<StockItem>, ApiError> {
        let mut req = self.authed(self.http.get(self.stock_item_url()));
        if let Some(filter) = filter {
            req = req.query(&[("$filter", filter)]);
        }
        if let Some(expand) = expand {
            req = req.query(&[("$expand", expand)]);
        }

        tracing::debug!(filter = filter.unwrap_or("<none>"), "querying stock items");

        let resp = req.send().await?;
        let status = resp.status();
        match status.as_u16() {
            401 | 403 => return Err(ApiError::Unauthorized),
            404 => return Err(ApiError::NotFound),
            _ if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::Server { status: status.as_u16(), body });
            }
            _ => {}
        }

        let body = resp.text().await?;
        decode_stock_items(&body)
    }

    /// Cheap authenticated probe used to verify the session is still valid.
    pub async fn verify(&self) -> VerifyResult {
        let req = self
            .authed(self.http.get(self.stock_item_url()))
            .query(&[("$top", "1")]);

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("session probe network error: {}", e);
                return VerifyResult::Unreachable(e.to_string());
            }
        };

        match resp.status().as_u16() {
            s if (200..300).contains(&s) => VerifyResult::Valid,
            401 | 403 => VerifyResult::Rejected,
            status => {
                // Other statuses (wrong api version, 5xx) don't prove the
                // session is dead; treat them as transient.
                tracing::debug!("session probe returned status {}", status);
                VerifyResult::Unreachable(format!("server returned {}", status))
            }
        }
    }

    /// Discover the entity endpoints and versions the instance exposes.
    pub async fn endpoints(&self) -> Result<EndpointsResponse, ApiError> {
        let url = format!("{}/entity", self.base_url);
        let resp = self.authed(self.http.get(&url)).send().await?;
        let status = resp.status();
        match status.as_u16() {
            401 | 403 => return Err(ApiError::Unauthorized),
            404 => return Err(ApiError::NotFound),
            _ if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::Server { status: status.as_u16(), body });
            }
            _ => {}
        }
        resp.json::<EndpointsResponse>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Best-effort server-side logout. Failures are logged, not surfaced:
    /// local credential deletion is what actually ends the session for us.
    pub async fn logout(&self) {
        let url = format!("{}/entity/auth/logout", self.base_url);
        match self.authed(self.http.post(&url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("server session closed");
            }
            Ok(resp) => {
                tracing::debug!("server logout returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("server logout failed: {}", e);
            }
        }
    }
}

/// Envelope first, bare array second; error only when both shapes fail.
fn decode_stock_items(body: &str) -> Result<Vec<StockItem>, ApiError> {
    match serde_json::from_str::<Envelope<StockItem>>(body) {
        Ok(envelope) => Ok(envelope.value),
        Err(envelope_err) => match serde_json::from_str::<Vec<StockItem>>(body) {
            Ok(items) => Ok(items),
            Err(bare_err) => Err(ApiError::Decode(format!(
                "envelope: {envelope_err}; bare array: {bare_err}"
            ))),
        },
    }
}
