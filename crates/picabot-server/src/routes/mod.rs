//! HTTP routes.
//!
//! - `auth` - `/api/auth/*` proxy to the upstream auth service
//! - `health` - liveness probe

pub mod auth;
pub mod health;
