//! # picabot-client
//!
//! Client side of the Pica Bot session pipeline.
//!
//! - [`AuthClient`] - outbound requests with single-flight refresh and
//!   retry-once on 401
//! - [`EndpointRefresher`] - refresh through `POST /api/auth/refresh`
//! - [`SessionStore`] - observable `{user, is_authenticated, is_loading}`
//! - [`AuthActions`] - login, register, logout and hydration
//!
//! ```ignore
//! use picabot_client::{AuthActions, AuthClient, ClientConfig, SessionStore};
//!
//! let config = ClientConfig::with_base_url("http://localhost:3000");
//! let client = AuthClient::from_config(&config)?;
//! let actions = AuthActions::new(client, SessionStore::new(), &config);
//! actions.hydrate().await;
//! ```

pub mod actions;
pub mod config;
pub mod interceptor;
pub mod refresher;
pub mod session;

pub use actions::AuthActions;
pub use config::ClientConfig;
pub use interceptor::{AuthClient, LoginRedirect, decode_envelope};
pub use refresher::EndpointRefresher;
pub use session::{SessionState, SessionStore};
