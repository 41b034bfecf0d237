//! Login, registration, logout and hydration actions.
//!
//! These are the only writers of the [`SessionStore`].

use picabot_auth::{AuthResult, Credentials, Registration, User};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::interceptor::{AuthClient, decode_envelope};
use crate::session::SessionStore;

#[derive(Debug, Clone)]
struct AuthPaths {
    me: String,
    login: String,
    register: String,
    logout: String,
}

/// Auth actions bound to one client and one session store.
#[derive(Debug, Clone)]
pub struct AuthActions {
    client: AuthClient,
    session: SessionStore,
    paths: AuthPaths,
}

impl AuthActions {
    pub fn new(client: AuthClient, session: SessionStore, config: &ClientConfig) -> Self {
        Self {
            client,
            session,
            paths: AuthPaths {
                me: config.me_path.clone(),
                login: config.login_path.clone(),
                register: config.register_path.clone(),
                logout: config.logout_path.clone(),
            },
        }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Loads the current user from the "who am I" route.
    ///
    /// Any failure resolves the session as signed out.
    pub async fn hydrate(&self) -> Option<User> {
        let user = match self.client.get_json::<User>(&self.paths.me).await {
            Ok(user) => Some(user),
            Err(e) => {
                debug!(error = %e, "Session hydration found no user");
                None
            }
        };
        self.session.set_user(user.clone());
        user
    }

    /// Signs in. On failure the session is left untouched.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult<User> {
        let builder = self.client.http().post(self.client.url(&self.paths.login)?);
        let user: User = decode_envelope(builder.json(credentials).send().await?).await?;

        info!(user_id = %user.id, "Logged in");
        self.session.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Creates an account and signs in.
    pub async fn register(&self, registration: &Registration) -> AuthResult<User> {
        let builder = self.client.http().post(self.client.url(&self.paths.register)?);
        let user: User = decode_envelope(builder.json(registration).send().await?).await?;

        info!(user_id = %user.id, "Registered");
        self.session.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Signs out. The session is cleared even if the server call fails.
    pub async fn logout(&self) {
        match self.client.url(&self.paths.logout) {
            Ok(url) => {
                if let Err(e) = self.client.http().post(url).send().await {
                    warn!(error = %e, "Logout request failed");
                }
            }
            Err(e) => warn!(error = %e, "Logout route misconfigured"),
        }
        self.session.set_user(None);
        info!("Logged out");
    }

    /// Sends an authenticated request and decodes its `{ "data": T }` body.
    ///
    /// When the failure means the user must sign in again, the logout action
    /// runs before the error is returned.
    pub async fn authorized_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AuthResult<T> {
        match self.client.send_json(builder).await {
            Err(e) if e.requires_login() => {
                self.logout().await;
                Err(e)
            }
            other => other,
        }
    }
}
