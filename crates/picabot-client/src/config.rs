use std::time::Duration;

use picabot_auth::coordinator::DEFAULT_MAX_WAITERS;
use picabot_auth::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Client-side configuration: where the app server lives and how its auth
/// routes are named.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the app server.
    pub base_url: String,
    pub refresh_path: String,
    pub me_path: String,
    pub login_path: String,
    pub register_path: String,
    pub logout_path: String,
    /// Capacity of the refresh waiter queue.
    pub max_waiters: usize,
    /// Timeout applied to every request.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            me_path: "/api/auth/me".to_string(),
            login_path: "/api/auth/login".to_string(),
            register_path: "/api/auth/register".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            max_waiters: DEFAULT_MAX_WAITERS,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the app server at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parses the base URL.
    pub fn base(&self) -> AuthResult<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            AuthError::configuration(format!("invalid client base_url {:?}: {e}", self.base_url))
        })
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> AuthResult<Url> {
        join(&self.base()?, path)
    }
}

pub(crate) fn join(base: &Url, path: &str) -> AuthResult<Url> {
    base.join(path)
        .map_err(|e| AuthError::configuration(format!("invalid path {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = ClientConfig::default();
        assert_eq!(config.refresh_path, "/api/auth/refresh");
        assert_eq!(config.max_waiters, DEFAULT_MAX_WAITERS);
    }

    #[test]
    fn test_url_resolution() {
        let config = ClientConfig::with_base_url("http://127.0.0.1:3000");
        assert_eq!(
            config.url(&config.refresh_path).unwrap().as_str(),
            "http://127.0.0.1:3000/api/auth/refresh"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig::with_base_url("::nope::");
        assert!(matches!(
            config.url("/api/auth/me"),
            Err(AuthError::Configuration { .. })
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"http://app","timeout":"5s"}"#).unwrap();
        assert_eq!(config.base_url, "http://app");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.me_path, "/api/auth/me");
    }
}
