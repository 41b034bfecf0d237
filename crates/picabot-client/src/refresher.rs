//! Client side of `POST /api/auth/refresh`.

use async_trait::async_trait;
use picabot_auth::types::error_message_from_body;
use picabot_auth::{AuthError, AuthResult, Refresher};
use tracing::{debug, warn};
use url::Url;

/// Refreshes by calling the app server's refresh route.
///
/// The route answers with `Set-Cookie`; the new access token lands in the
/// cookie jar shared with the [`AuthClient`](crate::AuthClient), so there is
/// nothing to return.
#[derive(Debug, Clone)]
pub struct EndpointRefresher {
    http: reqwest::Client,
    url: Url,
}

impl EndpointRefresher {
    pub fn new(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Refresher for EndpointRefresher {
    async fn refresh(&self) -> AuthResult<()> {
        debug!(url = %self.url, "Calling refresh endpoint");

        let response = self
            .http
            .post(self.url.clone())
            .send()
            .await
            .map_err(|e| AuthError::refresh_failed(AuthError::from(e).message()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message_from_body(&body);
        warn!(status = status.as_u16(), message = %message, "Refresh endpoint rejected refresh");

        Err(AuthError::refresh_failed(if message.is_empty() {
            format!("refresh endpoint returned {status}")
        } else {
            message
        }))
    }
}
