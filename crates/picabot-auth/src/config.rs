//! Cookie and upstream configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [cookies]
//! access_token_name = "access-token"
//! same_site = "strict"
//!
//! [upstream]
//! base_url = "https://auth.example.com"
//! timeout = "30s"
//! ```

use std::time::Duration;

use cookie::SameSite;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cookie::{CookieOptions, CookiePolicy};
use crate::error::{AuthError, AuthResult};

/// Default name of the access-token cookie.
pub const ACCESS_TOKEN_COOKIE: &str = "access-token";

/// Default name of the refresh-token cookie.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh-token";

/// Cookie configuration for the session cookies.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CookieConfig {
    /// Name of the access-token cookie.
    pub access_token_name: String,

    /// Name of the refresh-token cookie.
    pub refresh_token_name: String,

    /// Force the `Secure` attribute on or off.
    /// When unset, cookies are secure in production only.
    pub secure: Option<bool>,

    /// Mark cookies `HttpOnly`.
    pub http_only: bool,

    /// `SameSite` attribute: "strict", "lax" or "none".
    pub same_site: String,

    /// Cookie path.
    pub path: String,

    /// Optional cookie domain.
    pub domain: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_token_name: ACCESS_TOKEN_COOKIE.to_string(),
            refresh_token_name: REFRESH_TOKEN_COOKIE.to_string(),
            secure: None,
            http_only: true,
            same_site: "strict".to_string(),
            path: "/".to_string(),
            domain: None,
        }
    }
}

impl CookieConfig {
    /// Resolves the configuration into a [`CookiePolicy`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if a cookie name is empty or
    /// `same_site` is not a known value.
    pub fn policy(&self, production: bool) -> AuthResult<CookiePolicy> {
        if self.access_token_name.trim().is_empty() || self.refresh_token_name.trim().is_empty() {
            return Err(AuthError::configuration("cookie names must not be empty"));
        }

        let defaults = CookieOptions {
            http_only: Some(self.http_only),
            secure: Some(self.secure.unwrap_or(production)),
            same_site: Some(parse_same_site(&self.same_site)?),
            path: Some(self.path.clone()),
            domain: self.domain.clone(),
            max_age: None,
        };

        Ok(CookiePolicy::new(
            self.access_token_name.clone(),
            self.refresh_token_name.clone(),
            defaults,
        ))
    }
}

/// Parses a `SameSite` attribute value.
pub fn parse_same_site(value: &str) -> AuthResult<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => Err(AuthError::configuration(format!(
            "cookies.same_site must be one of strict, lax, none (got {other:?})"
        ))),
    }
}

/// Upstream authentication service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the authentication service.
    pub base_url: String,

    /// Path of the credential refresh endpoint.
    pub refresh_path: String,

    /// Path of the "who am I" endpoint.
    pub me_path: String,

    /// Path of the login endpoint.
    pub login_path: String,

    /// Path of the registration endpoint.
    pub register_path: String,

    /// Path of the logout endpoint.
    pub logout_path: String,

    /// Timeout applied to every upstream call.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            me_path: "/auth/me".to_string(),
            login_path: "/auth/login".to_string(),
            register_path: "/auth/register".to_string(),
            logout_path: "/auth/logout".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl UpstreamConfig {
    /// Parses the base URL.
    pub fn base(&self) -> AuthResult<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            AuthError::configuration(format!("invalid upstream.base_url {:?}: {e}", self.base_url))
        })
    }

    /// Joins `path` onto the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> AuthResult<Url> {
        let base = self.base()?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| AuthError::configuration(format!("invalid upstream path {path:?}: {e}")))
    }

    /// Builds the HTTP client used for upstream calls.
    pub fn http_client(&self) -> AuthResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))
    }
}
