//! Error response handling for the `/api/auth/*` routes.
//!
//! Every error is rendered as `{ "error": { "message": ... } }`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::error::AuthError;
use crate::types::ErrorEnvelope;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Auth route failed");
        }

        let mut response = (status, Json(ErrorEnvelope::new(self.message()))).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Maps an error to the HTTP status returned to the browser.
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::RefreshFailed { .. } | AuthError::AuthorizationExpired { .. } => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::RefreshQueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Upstream { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        AuthError::Transport { .. } | AuthError::InvalidResponse { .. } => StatusCode::BAD_GATEWAY,
    }
}
