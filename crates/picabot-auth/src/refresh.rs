//! Token refresh client.
//!
//! Exchanges the refresh credential held in the `refresh-token` cookie for
//! a new access token and persists it through a [`CookieStore`]. There is
//! no retry here; callers decide whether and how often to refresh.

use async_trait::async_trait;
use axum::http::header::COOKIE;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::cookie::{CookieOptions, CookiePolicy, CookieStore};
use crate::error::{AuthError, AuthResult};
use crate::types::{AccessToken, error_message_from_body};

/// One refresh attempt, as seen by the [`RefreshCoordinator`](crate::RefreshCoordinator).
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Performs a single refresh. `Ok` means the caller may proceed.
    async fn refresh(&self) -> AuthResult<()>;
}

/// Tokens returned by the auth service on login or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

/// Extracts the token fields from an auth service response body.
///
/// Only the access token decides success: `expires_in` and `refresh_token`
/// are picked up when they have a usable shape and ignored otherwise. The
/// fields may be snake_case or camelCase, at the top level or under `data`.
///
/// Returns `None` when the body is not JSON or carries no access token.
pub fn parse_token_response(body: &str) -> Option<TokenSet> {
    let json: Value = serde_json::from_str(body).ok()?;
    token_set_from(&json)
}

fn token_set_from(json: &Value) -> Option<TokenSet> {
    match string_field(json, "access_token", "accessToken") {
        Some(access_token) => Some(TokenSet {
            access_token,
            refresh_token: string_field(json, "refresh_token", "refreshToken"),
            expires_in: field(json, "expires_in", "expiresIn").and_then(seconds),
        }),
        None => json.get("data").and_then(token_set_from),
    }
}

fn field<'a>(json: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    json.get(snake).or_else(|| json.get(camel))
}

fn string_field(json: &Value, snake: &str, camel: &str) -> Option<String> {
    field(json, snake, camel)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Lifetime in whole seconds from a number or numeric string.
fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Writes the session cookies for `tokens` and returns the access token.
pub fn store_tokens(store: &dyn CookieStore, policy: &CookiePolicy, tokens: &TokenSet) -> AccessToken {
    let mut options = CookieOptions::default();
    if let Some(secs) = tokens.expires_in.filter(|s| *s > 0) {
        options = options.with_max_age(time::Duration::seconds(secs));
    }
    store.set(policy.access_token_name(), &tokens.access_token, options);

    if let Some(refresh_token) = &tokens.refresh_token {
        store.set(
            policy.refresh_token_name(),
            refresh_token,
            CookieOptions::default(),
        );
    }

    AccessToken::new(tokens.access_token.clone(), policy.access_token_name())
}

/// Removes both session cookies.
pub fn clear_tokens(store: &dyn CookieStore, policy: &CookiePolicy) {
    store.delete(policy.access_token_name());
    store.delete(policy.refresh_token_name());
}

/// Client for the upstream credential refresh endpoint.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    endpoint: Url,
    policy: CookiePolicy,
}

impl RefreshClient {
    /// Creates a client posting to `endpoint`.
    pub fn new(http: reqwest::Client, endpoint: Url, policy: CookiePolicy) -> Self {
        Self {
            http,
            endpoint,
            policy,
        }
    }

    /// Creates a client from the upstream configuration.
    pub fn from_config(upstream: &UpstreamConfig, policy: CookiePolicy) -> AuthResult<Self> {
        Ok(Self::new(
            upstream.http_client()?,
            upstream.endpoint(&upstream.refresh_path)?,
            policy,
        ))
    }

    /// The upstream refresh endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Exchanges the refresh credential in `store` for a new access token.
    ///
    /// The new access token (and a rotated refresh token, if any) is
    /// written to `store` before returning.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RefreshFailed` if the refresh cookie is missing,
    /// the upstream call fails or answers with a non-success status, or the
    /// response carries no access token.
    pub async fn refresh(&self, store: &dyn CookieStore) -> AuthResult<AccessToken> {
        let refresh_name = self.policy.refresh_token_name();
        let refresh_token = store
            .get(refresh_name)
            .ok_or_else(|| AuthError::refresh_failed("no refresh token"))?;

        debug!(endpoint = %self.endpoint, "Refreshing access token");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(COOKIE, format!("{refresh_name}={refresh_token}"))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Refresh request could not be sent");
                AuthError::refresh_failed(AuthError::from(e).message())
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = error_message_from_body(&body);
            warn!(status = status.as_u16(), message = %message, "Upstream rejected refresh");
            return Err(AuthError::refresh_failed(if message.is_empty() {
                format!("upstream returned {status}")
            } else {
                message
            }));
        }

        let tokens = parse_token_response(&body).ok_or_else(|| {
            warn!("Refresh response did not contain an access token");
            AuthError::refresh_failed("no access token in refresh response")
        })?;

        let token = store_tokens(store, &self.policy, &tokens);
        info!(rotated = tokens.refresh_token.is_some(), "Access token refreshed");
        Ok(token)
    }
}
