use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::routes::{
    auth::{self, AuthState},
    health,
};

pub struct PicabotServer {
    addr: SocketAddr,
    app: Router,
}

/// Builds the router with the auth proxy routes mounted under `/api/auth`.
pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = AuthState::from_config(&cfg.upstream, &cfg.cookies, cfg.is_production())?;

    let auth_routes = Router::new()
        .route("/refresh", post(auth::refresh_handler))
        .route("/me", get(auth::me_handler))
        .route("/login", post(auth::login_handler))
        .route("/register", post(auth::register_handler))
        .route("/logout", post(auth::logout_handler))
        .with_state(state);

    Ok(Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api/auth", auth_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        ))
}

pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            addr: None,
            config: AppConfig::default(),
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<PicabotServer> {
        let addr = match self.addr {
            Some(addr) => addr,
            None => self.config.addr().map_err(anyhow::Error::msg)?,
        };
        let app = build_app(&self.config)?;
        Ok(PicabotServer { addr, app })
    }
}

impl PicabotServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
