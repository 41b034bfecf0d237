//! Shared credential, user and envelope types.
//!
//! The app server answers every `/api/auth/*` route with either
//! `{ "data": ... }` or `{ "error": { "message": ... } }`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Short-lived bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    cookie_name: String,
}

impl AccessToken {
    /// Creates a token read from (or destined for) `cookie_name`.
    pub fn new(value: impl Into<String>, cookie_name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            cookie_name: cookie_name.into(),
        }
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The cookie the token is stored in.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Success envelope: `{ "data": T }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Error envelope: `{ "error": { "message": ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: MessageBody,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: MessageBody::new(message),
        }
    }
}

/// `{ "message": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Best-effort extraction of an error message from a JSON body.
///
/// Understands `{error:{message}}`, `{error:"..."}`, `{message}` and
/// `{detail}`; falls back to the raw text.
pub fn error_message_from_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("error"),
            json.get("message"),
            json.get("detail"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(s) = candidate.as_str() {
                return s.to_string();
            }
        }
    }
    body.trim().to_string()
}
