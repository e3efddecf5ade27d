//! Login negotiation against the ERP instance.
//!
//! Two mutually exclusive session mechanisms are supported:
//!
//! 1. OAuth 2.0 resource-owner-password-credentials grant, attempted first
//!    whenever a client id and secret are supplied. The resulting bearer
//!    token authenticates every subsequent request.
//! 2. Cookie-based session login, used as the fallback (and the only path
//!    when no OAuth client is registered). The HTTP client that performed
//!    the login keeps the session cookie in its jar and must be reused for
//!    all subsequent calls.
//!
//! If both mechanisms fail no partial state is retained.

use thiserror::Error;

use crate::erp::client::{normalize_base_url, AuthMode, ErpClient, REQUEST_TIMEOUT};
use crate::erp::model::{LoginRequest, TokenResponse};

/// Everything needed to negotiate a session.
#[derive(Debug, Clone)]
pub struct LoginParams {
    pub base_url: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_version: String,
}

impl LoginParams {
    fn oauth_client(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some((id, secret))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Both mechanisms were exhausted.
    #[error("login failed (oauth: {oauth}; cookie: {cookie})")]
    LoginFailed { oauth: String, cookie: String },

    /// Could not construct the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Negotiate a session, OAuth first, cookie login second.
pub async fn login(params: &LoginParams) -> Result<ErpClient, AuthError> {
    let base_url = normalize_base_url(&params.base_url);

    let oauth_failure = match params.oauth_client() {
        Some((client_id, client_secret)) => {
            tracing::info!("attempting OAuth password-grant login");
            match oauth_token(&base_url, params, client_id, client_secret).await {
                Ok(token) => {
                    tracing::info!("OAuth login succeeded");
                    let client = ErpClient::new(
                        &base_url,
                        &params.tenant,
                        &params.api_version,
                        AuthMode::Bearer(token),
                    )
                    .map_err(|e| AuthError::LoginFailed {
                        oauth: e.to_string(),
                        cookie: "not attempted".to_string(),
                    })?;
                    return Ok(client);
                }
                Err(reason) => {
                    tracing::warn!("OAuth login failed, falling back to cookie login: {}", reason);
                    reason
                }
            }
        }
        None => {
            tracing::debug!("no OAuth client configured, using cookie login");
            "client id/secret not provided".to_string()
        }
    };

    match cookie_login(&base_url, params).await {
        Ok(client) => {
            tracing::info!("cookie login succeeded");
            Ok(client)
        }
        Err(cookie_failure) => Err(AuthError::LoginFailed {
            oauth: oauth_failure,
            cookie: cookie_failure,
        }),
    }
}

/// `POST /identity/connect/token` with the password grant. Success requires
/// a non-empty access token in the response.
async fn oauth_token(
    base_url: &str,
    params: &LoginParams,
    client_id: &str,
    client_secret: &str,
) -> Result<String, String> {
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let url = format!("{}/identity/connect/token", base_url);
    let form = [
        ("grant_type", "password"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("username", params.username.as_str()),
        ("password", params.password.as_str()),
        // "api" scope is required for entity REST access
        ("scope", "api"),
    ];

    let resp = http
        .post(&url)
        .form(&form)
        .send()
        .await
        .map_err(|e| format!("token request failed: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("token endpoint returned {status}: {body}"));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| format!("could not decode token response: {e}"))?;

    if token.access_token.is_empty() {
        return Err("no access token in response".to_string());
    }

    if let Some(expires_in) = token.expires_in {
        tracing::debug!("access token expires in {}s", expires_in);
    }

    Ok(token.access_token)
}

/// `POST /entity/auth/login` on a cookie-jar client. Any 2xx completes the
/// login; the jar (and therefore this exact client) carries the session.
async fn cookie_login(base_url: &str, params: &LoginParams) -> Result<ErpClient, String> {
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .cookie_store(true)
        .build()
        .map_err(|e| e.to_string())?;

    let url = format!("{}/entity/auth/login", base_url);
    let body = LoginRequest {
        name: params.username.clone(),
        password: params.password.clone(),
        tenant: params.tenant.clone(),
    };

    let resp = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("login request failed: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("login endpoint returned {status}: {body}"));
    }

    Ok(ErpClient::from_parts(
        http,
        base_url,
        &params.tenant,
        &params.api_version,
        AuthMode::Cookie,
    ))
}
