//! # picabot-auth
//!
//! Session credential handling for the Pica Bot web app.
//!
//! This crate provides:
//! - A cookie store adapter with request-scoped and read-only implementations
//! - The token refresh client for the upstream auth service
//! - A single-flight refresh coordinator
//! - The shared error taxonomy and `/api/auth/*` wire envelopes
//!
//! ## Modules
//!
//! - [`config`] - Cookie and upstream configuration
//! - [`cookie`] - Cookie store adapter
//! - [`coordinator`] - Single-flight refresh coordination
//! - [`error`] - Error types
//! - [`refresh`] - Token refresh client
//! - [`response`] - Error responses for axum handlers
//! - [`types`] - Tokens, users and envelopes

pub mod config;
pub mod cookie;
pub mod coordinator;
pub mod error;
pub mod refresh;
pub mod response;
pub mod types;

pub use config::{CookieConfig, UpstreamConfig};
pub use cookie::{AmbientCookies, CookieOptions, CookiePolicy, CookieReader, CookieStore, RequestCookies};
pub use coordinator::{RefreshCoordinator, RoundOutcome};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use refresh::{RefreshClient, Refresher, TokenSet};
pub use types::{AccessToken, Credentials, DataEnvelope, ErrorEnvelope, MessageBody, Registration, User};
