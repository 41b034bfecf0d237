//! Authentication pipeline error types.
//!
//! Every error is `Clone`: a single refresh round fans its outcome out to all
//! queued waiters, and each of them must observe the same error content.

use std::fmt;

/// Errors that can occur while refreshing credentials or issuing
/// authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The refresh call failed or did not return a new access token.
    #[error("Refresh failed: {message}")]
    RefreshFailed {
        /// Description of why the refresh failed.
        message: String,
    },

    /// A request was rejected with 401 after it had already been retried.
    #[error("Authorization expired: {message}")]
    AuthorizationExpired {
        /// Description of the rejected request.
        message: String,
    },

    /// The pipeline is misconfigured (cookie policy, upstream URL, ...).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Too many callers are already waiting on the in-flight refresh.
    #[error("Refresh queue is full ({capacity} waiters)")]
    RefreshQueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The upstream service answered with a non-success status.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status returned by the upstream.
        status: u16,
        /// Message extracted from the upstream body.
        message: String,
    },

    /// The HTTP request could not be delivered.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the decoding failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `RefreshFailed` error.
    #[must_use]
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            message: message.into(),
        }
    }

    /// Creates a new `AuthorizationExpired` error.
    #[must_use]
    pub fn authorization_expired(message: impl Into<String>) -> Self {
        Self::AuthorizationExpired {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Upstream` error.
    #[must_use]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns the error kind for branching and logging.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RefreshFailed { .. } => ErrorKind::RefreshFailed,
            Self::AuthorizationExpired { .. } => ErrorKind::AuthorizationExpired,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::RefreshQueueFull { .. } => ErrorKind::Overloaded,
            Self::Upstream { .. } | Self::Transport { .. } | Self::InvalidResponse { .. } => {
                ErrorKind::Upstream
            }
        }
    }

    /// Returns `true` if the user has to sign in again.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed { .. } | Self::AuthorizationExpired { .. }
        ) || matches!(self, Self::Upstream { status: 401, .. })
    }

    /// Returns the human-readable message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::RefreshFailed { message }
            | Self::AuthorizationExpired { message }
            | Self::Configuration { message }
            | Self::Upstream { message, .. }
            | Self::Transport { message }
            | Self::InvalidResponse { message } => message.clone(),
            Self::RefreshQueueFull { capacity } => {
                format!("refresh queue is full ({capacity} waiters)")
            }
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else if err.is_timeout() {
            Self::transport("request timed out")
        } else if err.is_connect() {
            Self::transport(format!("connection failed: {err}"))
        } else {
            Self::transport(err.to_string())
        }
    }
}

/// Coarse classification of [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credential refresh failed.
    RefreshFailed,
    /// Request rejected after its single retry.
    AuthorizationExpired,
    /// Fatal misconfiguration.
    Configuration,
    /// Refresh queue at capacity.
    Overloaded,
    /// Upstream or transport failure.
    Upstream,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RefreshFailed => "refresh_failed",
            Self::AuthorizationExpired => "authorization_expired",
            Self::Configuration => "configuration",
            Self::Overloaded => "overloaded",
            Self::Upstream => "upstream",
        };
        f.write_str(s)
    }
}

/// Result type for authentication pipeline operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::refresh_failed("no access token");
        assert_eq!(err.to_string(), "Refresh failed: no access token");
        assert_eq!(err.message(), "no access token");

        let err = AuthError::RefreshQueueFull { capacity: 4 };
        assert_eq!(err.to_string(), "Refresh queue is full (4 waiters)");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            AuthError::refresh_failed("x").kind(),
            ErrorKind::RefreshFailed
        );
        assert_eq!(
            AuthError::authorization_expired("x").kind(),
            ErrorKind::AuthorizationExpired
        );
        assert_eq!(
            AuthError::configuration("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(AuthError::upstream(500, "x").kind(), ErrorKind::Upstream);
        assert_eq!(AuthError::transport("x").kind(), ErrorKind::Upstream);
        assert_eq!(ErrorKind::RefreshFailed.to_string(), "refresh_failed");
    }

    #[test]
    fn test_requires_login() {
        assert!(AuthError::refresh_failed("x").requires_login());
        assert!(AuthError::authorization_expired("x").requires_login());
        assert!(AuthError::upstream(401, "x").requires_login());
        assert!(!AuthError::upstream(500, "x").requires_login());
        assert!(!AuthError::configuration("x").requires_login());
    }

    #[test]
    fn test_clone_preserves_content() {
        let err = AuthError::refresh_failed("upstream returned 401");
        assert_eq!(err.clone(), err);
    }
}
