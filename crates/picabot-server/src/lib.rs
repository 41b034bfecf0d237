//! # picabot-server
//!
//! The `/api/auth/*` proxy that sits between the browser and the upstream
//! auth service. Access and refresh tokens are held in HTTP-only cookies and
//! never reach client code.

pub mod config;
pub mod observability;
pub mod routes;
pub mod server;

pub use config::AppConfig;
pub use server::{PicabotServer, ServerBuilder, build_app};
