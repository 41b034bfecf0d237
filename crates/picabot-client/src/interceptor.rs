//! Authenticated request interceptor.
//!
//! Wraps outbound calls so that a 401 triggers one coordinated refresh and
//! one replay of the original request:
//!
//! 1. Send the request. Anything but 401 is returned unchanged.
//! 2. On 401, refresh through the shared [`RefreshCoordinator`].
//! 3. On success, replay the original request once and return its response
//!    as-is, even if it is another 401.
//! 4. On refresh failure, return the error to every caller. The login
//!    redirect hook fires once per failed round, from the caller that led it.

use std::sync::Arc;

use picabot_auth::types::{DataEnvelope, error_message_from_body};
use picabot_auth::{AuthError, AuthResult, ErrorKind, RefreshCoordinator};
use reqwest::cookie::Jar;
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ClientConfig, join};
use crate::refresher::EndpointRefresher;

/// Callback invoked when the user has to sign in again.
pub type LoginRedirect = Arc<dyn Fn() + Send + Sync>;

/// HTTP client that refreshes credentials on 401 and retries once.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    base_url: Url,
    coordinator: Arc<RefreshCoordinator>,
    on_login_required: Option<LoginRedirect>,
}

impl AuthClient {
    /// Creates a client from its parts.
    ///
    /// `http` should be built with `cookies` as its cookie provider so that
    /// refreshed tokens are picked up by replayed requests.
    pub fn new(
        http: reqwest::Client,
        cookies: Arc<Jar>,
        base_url: Url,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http,
            cookies,
            base_url,
            coordinator,
            on_login_required: None,
        }
    }

    /// Builds the cookie jar, HTTP client, refresher and coordinator from
    /// `config`.
    pub fn from_config(config: &ClientConfig) -> AuthResult<Self> {
        if config.max_waiters == 0 {
            return Err(AuthError::configuration("max_waiters must be at least 1"));
        }

        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))?;

        let refresher = EndpointRefresher::new(http.clone(), config.url(&config.refresh_path)?);
        let coordinator = Arc::new(
            RefreshCoordinator::new(Arc::new(refresher)).with_max_waiters(config.max_waiters),
        );

        Ok(Self::new(http, cookies, config.base()?, coordinator))
    }

    /// Sets the hook invoked when a refresh round fails.
    ///
    /// Called once per failed round no matter how many requests were waiting
    /// on it. Not called when the round was abandoned by a cancelled leader.
    #[must_use]
    pub fn with_login_redirect(mut self, callback: LoginRedirect) -> Self {
        self.on_login_required = Some(callback);
        self
    }

    /// The underlying client, without interception.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The cookie jar shared by every request.
    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> AuthResult<Url> {
        join(&self.base_url, path)
    }

    /// Starts a request to `path`.
    pub fn request(&self, method: Method, path: &str) -> AuthResult<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    pub fn get(&self, path: &str) -> AuthResult<RequestBuilder> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> AuthResult<RequestBuilder> {
        self.request(Method::POST, path)
    }

    /// Builds and executes `builder` with interception.
    pub async fn send(&self, builder: RequestBuilder) -> AuthResult<Response> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Executes `request`, refreshing and replaying it once on 401.
    ///
    /// # Errors
    ///
    /// Returns the refresh error if the refresh fails, or a transport error
    /// if a request cannot be sent. HTTP error statuses are not errors here.
    pub async fn execute(&self, request: Request) -> AuthResult<Response> {
        // Streaming bodies cannot be cloned and therefore cannot be replayed.
        let replay = request.try_clone();
        let response = self.http.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            debug!(url = %response.url(), "401 on a request that cannot be replayed");
            return Ok(response);
        };

        let round = self.coordinator.refresh_round().await;
        if let Err(e) = round.result {
            // Every caller gets the error; only the round's leader navigates.
            if round.led && e.kind() == ErrorKind::RefreshFailed {
                self.redirect_to_login();
            }
            return Err(e);
        }

        let method = replay.method().clone();
        let url = replay.url().clone();
        let response = self.http.execute(replay).await?;
        debug!(%method, %url, status = response.status().as_u16(), "Replayed request after refresh");
        Ok(response)
    }

    /// Executes `builder` and decodes a `{ "data": T }` body.
    ///
    /// # Errors
    ///
    /// A final 401 maps to `AuthError::AuthorizationExpired`; other
    /// non-success statuses map to `AuthError::Upstream`.
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AuthResult<T> {
        let response = self.send(builder).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::authorization_expired(error_message_from_body(&body)));
        }
        decode_envelope(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AuthResult<T> {
        self.send_json(self.get(path)?).await
    }

    fn redirect_to_login(&self) {
        warn!("Session refresh failed, login required");
        if let Some(callback) = &self.on_login_required {
            callback();
        }
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url.as_str())
            .field("coordinator", &self.coordinator)
            .field("on_login_required", &self.on_login_required.is_some())
            .finish()
    }
}

/// Decodes a `{ "data": T }` success body; any other status becomes
/// `AuthError::Upstream` carrying the server's message.
pub async fn decode_envelope<T: DeserializeOwned>(response: Response) -> AuthResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(AuthError::upstream(
            status.as_u16(),
            error_message_from_body(&body),
        ));
    }

    serde_json::from_str::<DataEnvelope<T>>(&body)
        .map(|envelope| envelope.data)
        .map_err(|e| AuthError::invalid_response(format!("failed to decode response: {e}")))
}
