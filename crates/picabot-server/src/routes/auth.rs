//! Auth proxy handlers.
//!
//! Thin routes between the browser and the upstream auth service. Tokens
//! never leave the server except as HTTP-only cookies.
//!
//! | Route | Upstream |
//! |---|---|
//! | `POST /api/auth/refresh` | `POST /auth/refresh` |
//! | `GET /api/auth/me` | `GET /auth/me` |
//! | `POST /api/auth/login` | `POST /auth/login` |
//! | `POST /api/auth/register` | `POST /auth/register` |
//! | `POST /api/auth/logout` | `POST /auth/logout` |

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use picabot_auth::refresh::{clear_tokens, parse_token_response, store_tokens};
use picabot_auth::types::error_message_from_body;
use picabot_auth::{
    AmbientCookies, AuthError, AuthResult, CookieConfig, CookiePolicy, CookieReader, CookieStore,
    Credentials, DataEnvelope, MessageBody, RefreshClient, Registration, RequestCookies,
    UpstreamConfig, User,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

// =============================================================================
// State
// =============================================================================

/// State shared by the auth handlers.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<AuthStateInner>,
}

struct AuthStateInner {
    policy: CookiePolicy,
    refresh: RefreshClient,
    http: reqwest::Client,
    me_url: Url,
    login_url: Url,
    register_url: Url,
    logout_url: Url,
}

impl AuthState {
    /// Builds the handler state from configuration.
    pub fn from_config(
        upstream: &UpstreamConfig,
        cookies: &CookieConfig,
        production: bool,
    ) -> AuthResult<Self> {
        let policy = cookies.policy(production)?;
        let http = upstream.http_client()?;
        let refresh = RefreshClient::new(
            http.clone(),
            upstream.endpoint(&upstream.refresh_path)?,
            policy.clone(),
        );

        Ok(Self {
            inner: Arc::new(AuthStateInner {
                policy,
                refresh,
                http,
                me_url: upstream.endpoint(&upstream.me_path)?,
                login_url: upstream.endpoint(&upstream.login_path)?,
                register_url: upstream.endpoint(&upstream.register_path)?,
                logout_url: upstream.endpoint(&upstream.logout_path)?,
            }),
        })
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.inner.policy
    }
}

// =============================================================================
// Upstream payloads
// =============================================================================

/// User as returned by the upstream: bare, `{user}` or `{data}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserPayload {
    Wrapped { user: User },
    Data { data: Box<UserPayload> },
    Bare(User),
}

impl UserPayload {
    fn into_user(self) -> User {
        match self {
            Self::Wrapped { user } | Self::Bare(user) => user,
            Self::Data { data } => data.into_user(),
        }
    }
}

fn parse_user(body: &str) -> Option<User> {
    serde_json::from_str::<UserPayload>(body)
        .ok()
        .map(UserPayload::into_user)
}

// =============================================================================
// Handlers
// =============================================================================

/// Handler for POST /api/auth/refresh.
///
/// On success the refreshed access token is returned as `Set-Cookie`. On
/// failure the access-token cookie is cleared and 401 is returned.
pub async fn refresh_handler(State(state): State<AuthState>, jar: CookieJar) -> Response {
    let cookies = RequestCookies::new(jar, state.inner.policy.clone());

    match state.inner.refresh.refresh(&cookies).await {
        Ok(_) => (
            cookies.into_jar(),
            Json(DataEnvelope::new(MessageBody::new("Token refreshed"))),
        )
            .into_response(),
        Err(e) => {
            cookies.delete(state.inner.policy.access_token_name());
            (cookies.into_jar(), e).into_response()
        }
    }
}

/// Handler for GET /api/auth/me.
pub async fn me_handler(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let cookies = AmbientCookies::from_headers(Some(&headers));

    let Some(access_token) = cookies.get(state.inner.policy.access_token_name()) else {
        return AuthError::authorization_expired("not signed in").into_response();
    };

    match fetch_user(&state, &access_token).await {
        Ok(user) => Json(DataEnvelope::new(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for POST /api/auth/login.
pub async fn login_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(credentials): Json<Credentials>,
) -> Response {
    let url = state.inner.login_url.clone();
    sign_in(&state, jar, url, &credentials).await
}

/// Handler for POST /api/auth/register.
pub async fn register_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(registration): Json<Registration>,
) -> Response {
    let url = state.inner.register_url.clone();
    sign_in(&state, jar, url, &registration).await
}

/// Handler for POST /api/auth/logout.
///
/// Lenient: both cookies are cleared even if the upstream call fails.
pub async fn logout_handler(State(state): State<AuthState>, jar: CookieJar) -> Response {
    let cookies = RequestCookies::new(jar, state.inner.policy.clone());

    if let Some(access_token) = cookies.get(state.inner.policy.access_token_name()) {
        let result = state
            .inner
            .http
            .post(state.inner.logout_url.clone())
            .bearer_auth(access_token)
            .send()
            .await;
        match result {
            Ok(resp) if !resp.status().is_success() => {
                debug!(status = resp.status().as_u16(), "Upstream logout rejected");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Upstream logout failed"),
        }
    } else {
        debug!("No access token found during logout - clearing cookies only");
    }

    clear_tokens(&cookies, &state.inner.policy);
    info!("Logged out");

    (
        cookies.into_jar(),
        Json(DataEnvelope::new(MessageBody::new("Logged out"))),
    )
        .into_response()
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn sign_in<B: Serialize>(state: &AuthState, jar: CookieJar, url: Url, body: &B) -> Response {
    let cookies = RequestCookies::new(jar, state.inner.policy.clone());

    match sign_in_upstream(state, &cookies, url, body).await {
        Ok(user) => (cookies.into_jar(), Json(DataEnvelope::new(user))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn sign_in_upstream<B: Serialize>(
    state: &AuthState,
    cookies: &dyn CookieStore,
    url: Url,
    body: &B,
) -> AuthResult<User> {
    let response = state.inner.http.post(url).json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = error_message_from_body(&text);
        warn!(status = status.as_u16(), message = %message, "Upstream sign-in rejected");
        return Err(AuthError::upstream(status.as_u16(), message));
    }

    let tokens = parse_token_response(&text)
        .ok_or_else(|| AuthError::invalid_response("no access token in sign-in response"))?;
    let access_token = store_tokens(cookies, &state.inner.policy, &tokens);

    let user = match parse_user(&text) {
        Some(user) => user,
        None => fetch_user(state, access_token.as_str()).await?,
    };

    info!(user_id = %user.id, "Signed in");
    Ok(user)
}

async fn fetch_user(state: &AuthState, access_token: &str) -> AuthResult<User> {
    let response = state
        .inner
        .http
        .get(state.inner.me_url.clone())
        .bearer_auth(access_token)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(AuthError::upstream(
            status.as_u16(),
            error_message_from_body(&text),
        ));
    }

    parse_user(&text).ok_or_else(|| AuthError::invalid_response("upstream returned no user"))
}
