//! Cookie store adapter.
//!
//! Two execution contexts read the session cookies:
//!
//! - request handlers, which may read and write them ([`RequestCookies`]);
//! - rendering code, which only sees the ambient request cookies and must
//!   work even when there is no request at all ([`AmbientCookies`]).
//!
//! Both sit behind the same capability traits. Only [`CookieStore`] can
//! write, so read-only code cannot attempt a write in the first place.

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

use crate::config::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

// =============================================================================
// Capability traits
// =============================================================================

/// Read access to cookies.
pub trait CookieReader: Send + Sync {
    /// Returns the value of the named cookie, if present and non-empty.
    fn get(&self, name: &str) -> Option<String>;
}

/// Read and write access to cookies.
pub trait CookieStore: CookieReader {
    /// Sets a cookie. Unset `options` fall back to the policy defaults.
    fn set(&self, name: &str, value: &str, options: CookieOptions);

    /// Deletes a cookie by emitting an expired replacement.
    fn delete(&self, name: &str);
}

// =============================================================================
// Options and policy
// =============================================================================

/// Cookie attribute overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub http_only: Option<bool>,
    pub secure: Option<bool>,
    pub same_site: Option<SameSite>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<time::Duration>,
}

impl CookieOptions {
    /// Sets the `Max-Age` attribute.
    #[must_use]
    pub fn with_max_age(mut self, max_age: time::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Fills every unset field from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &CookieOptions) -> CookieOptions {
        CookieOptions {
            http_only: self.http_only.or(defaults.http_only),
            secure: self.secure.or(defaults.secure),
            same_site: self.same_site.or(defaults.same_site),
            path: self.path.or_else(|| defaults.path.clone()),
            domain: self.domain.or_else(|| defaults.domain.clone()),
            max_age: self.max_age.or(defaults.max_age),
        }
    }
}

/// Resolved cookie names and default attributes.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    access_token_name: String,
    refresh_token_name: String,
    defaults: CookieOptions,
}

impl CookiePolicy {
    /// Creates a policy from explicit names and defaults.
    pub fn new(
        access_token_name: impl Into<String>,
        refresh_token_name: impl Into<String>,
        defaults: CookieOptions,
    ) -> Self {
        Self {
            access_token_name: access_token_name.into(),
            refresh_token_name: refresh_token_name.into(),
            defaults,
        }
    }

    /// Name of the access-token cookie.
    pub fn access_token_name(&self) -> &str {
        &self.access_token_name
    }

    /// Name of the refresh-token cookie.
    pub fn refresh_token_name(&self) -> &str {
        &self.refresh_token_name
    }

    /// Default attributes applied to every written cookie.
    pub fn defaults(&self) -> &CookieOptions {
        &self.defaults
    }

    /// Builds a cookie with `overrides` merged over the defaults.
    pub fn build_cookie(&self, name: &str, value: &str, overrides: CookieOptions) -> Cookie<'static> {
        let options = overrides.or(&self.defaults);

        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .http_only(options.http_only.unwrap_or(true))
            .secure(options.secure.unwrap_or(false))
            .same_site(options.same_site.unwrap_or(SameSite::Strict))
            .path(options.path.unwrap_or_else(|| "/".to_string()));

        if let Some(domain) = options.domain {
            builder = builder.domain(domain);
        }
        if let Some(max_age) = options.max_age {
            builder = builder.max_age(max_age);
        }

        builder.build()
    }

    /// Builds an expired cookie that clears `name` on the client.
    pub fn removal_cookie(&self, name: &str) -> Cookie<'static> {
        let mut cookie = self.build_cookie(name, "", CookieOptions::default());
        cookie.make_removal();
        cookie
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self::new(
            ACCESS_TOKEN_COOKIE,
            REFRESH_TOKEN_COOKIE,
            CookieOptions {
                http_only: Some(true),
                secure: Some(false),
                same_site: Some(SameSite::Strict),
                path: Some("/".to_string()),
                domain: None,
                max_age: None,
            },
        )
    }
}

// =============================================================================
// Request context
// =============================================================================

/// Cookie store bound to one request.
///
/// Writes are collected in the wrapped [`CookieJar`]; return
/// [`RequestCookies::into_jar`] from the handler to emit them as
/// `Set-Cookie` headers.
#[derive(Debug)]
pub struct RequestCookies {
    jar: Mutex<CookieJar>,
    policy: CookiePolicy,
}

impl RequestCookies {
    /// Wraps the cookie jar extracted from the request.
    pub fn new(jar: CookieJar, policy: CookiePolicy) -> Self {
        Self {
            jar: Mutex::new(jar),
            policy,
        }
    }

    /// The policy used for writes.
    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    /// Returns the jar with all accumulated changes.
    pub fn into_jar(self) -> CookieJar {
        self.jar.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, CookieJar> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(CookieJar) -> CookieJar) {
        let mut guard = self.lock();
        let jar = std::mem::take(&mut *guard);
        *guard = f(jar);
    }
}

impl CookieReader for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        non_empty(self.lock().get(name))
    }
}

impl CookieStore for RequestCookies {
    fn set(&self, name: &str, value: &str, options: CookieOptions) {
        let cookie = self.policy.build_cookie(name, value, options);
        self.update(|jar| jar.add(cookie));
        tracing::debug!(cookie_name = %name, "Cookie set");
    }

    fn delete(&self, name: &str) {
        let cookie = self.policy.removal_cookie(name);
        self.update(|jar| jar.add(cookie));
        tracing::debug!(cookie_name = %name, "Cookie deleted");
    }
}

// =============================================================================
// Ambient (read-only) context
// =============================================================================

/// Read-only view of the cookies of the current request, if any.
#[derive(Debug, Clone, Default)]
pub struct AmbientCookies {
    jar: CookieJar,
}

impl AmbientCookies {
    /// Reads cookies from the request headers. `None` means there is no
    /// request context; every lookup then yields `None`.
    pub fn from_headers(headers: Option<&HeaderMap>) -> Self {
        match headers {
            Some(headers) => Self {
                jar: CookieJar::from_headers(headers),
            },
            None => Self::default(),
        }
    }
}

impl CookieReader for AmbientCookies {
    fn get(&self, name: &str) -> Option<String> {
        non_empty(self.jar.get(name))
    }
}

fn non_empty(cookie: Option<&Cookie<'static>>) -> Option<String> {
    cookie
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_request_cookies_round_trip() {
        let store = RequestCookies::new(CookieJar::new(), CookiePolicy::default());
        store.set("access-token", "tok-123", CookieOptions::default());
        assert_eq!(store.get("access-token").as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_request_cookies_reads_request_values() {
        let jar = CookieJar::from_headers(&headers_with_cookie("access-token=abc; other=1"));
        let store = RequestCookies::new(jar, CookiePolicy::default());
        assert_eq!(store.get("access-token").as_deref(), Some("abc"));
        assert_eq!(store.get("other").as_deref(), Some("1"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_request_cookies_delete() {
        let jar = CookieJar::from_headers(&headers_with_cookie("access-token=abc"));
        let store = RequestCookies::new(jar, CookiePolicy::default());
        store.delete("access-token");
        assert_eq!(store.get("access-token"), None);

        let jar = store.into_jar();
        let removal = jar.get("access-token").unwrap();
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn test_set_applies_secure_defaults() {
        let store = RequestCookies::new(CookieJar::new(), CookiePolicy::default());
        store.set("access-token", "tok", CookieOptions::default());

        let jar = store.into_jar();
        let cookie = jar.get("access-token").unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_set_merges_overrides() {
        let store = RequestCookies::new(CookieJar::new(), CookiePolicy::default());
        let options = CookieOptions {
            same_site: Some(SameSite::Lax),
            ..CookieOptions::default()
        }
        .with_max_age(time::Duration::seconds(60));
        store.set("access-token", "tok", options);

        let jar = store.into_jar();
        let cookie = jar.get("access-token").unwrap();
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn test_ambient_cookies_without_request() {
        let cookies = AmbientCookies::from_headers(None);
        assert_eq!(cookies.get("access-token"), None);
    }

    #[test]
    fn test_ambient_cookies_with_request() {
        let headers = headers_with_cookie("access-token=xyz");
        let cookies = AmbientCookies::from_headers(Some(&headers));
        assert_eq!(cookies.get("access-token").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_ambient_cookies_ignore_empty_value() {
        let headers = headers_with_cookie("access-token=");
        let cookies = AmbientCookies::from_headers(Some(&headers));
        assert_eq!(cookies.get("access-token"), None);
    }

    #[test]
    fn test_removal_cookie() {
        let policy = CookiePolicy::default();
        let cookie = policy.removal_cookie("refresh-token");
        assert_eq!(cookie.name(), "refresh-token");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
