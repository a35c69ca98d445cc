//! Axum-based HTTP gateway: JSON auth API, static files, and the session gate.
//!
//! - `POST /register`, `POST /login`, `POST /logout` accept JSON or
//!   URL-encoded bodies and answer `{success, message?}`
//! - `GET /health` for liveness checks
//! - everything else falls through to the static file tree, where
//!   protected pages require a valid session cookie
//! - request body size limit (64KB) and timeout (30s)

pub mod assets;
pub mod form;

use crate::auth::{AuthError, Registration, SessionRegistry, UserStore};
use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Static-site settings shared by all handlers.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub public_dir: PathBuf,
    pub index_document: String,
    pub login_page: String,
    pub protected_paths: Vec<String>,
    pub cookie_name: String,
}

impl SiteSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_dir: config.gateway.public_dir.clone(),
            index_document: config.gateway.index_document.clone(),
            login_page: config.gateway.login_page.clone(),
            protected_paths: config.gateway.protected_paths.clone(),
            cookie_name: config.auth.cookie_name.clone(),
        }
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|p| p == path)
    }
}

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionRegistry>,
    pub site: Arc<SiteSettings>,
}

impl AppState {
    pub fn new(users: UserStore, sessions: SessionRegistry, site: SiteSettings) -> Self {
        Self {
            users: Arc::new(users),
            sessions: Arc::new(sessions),
            site: Arc::new(site),
        }
    }

    /// Open the user store (compacting it if configured) and start an empty
    /// session registry.
    pub fn from_config(config: &Config) -> Result<Self> {
        let users = UserStore::open(&config.auth.users_file).with_context(|| {
            format!(
                "Failed to open user store {}",
                config.auth.users_file.display()
            )
        })?;

        if config.auth.compact_on_start {
            match users.compact() {
                Ok(report) => tracing::info!(
                    kept = report.kept,
                    dropped = report.dropped,
                    "Users file compacted"
                ),
                Err(e) => tracing::warn!("Users file compaction failed: {e:#}"),
            }
        }
        tracing::info!(
            users = users.len(),
            path = %users.path().display(),
            "User store initialized"
        );

        let sessions =
            SessionRegistry::new(Duration::from_secs(config.auth.session_ttl_secs));
        Ok(Self::new(users, sessions, SiteSettings::from_config(config)))
    }

    /// True if the request carries a cookie naming a live session.
    pub fn has_session(&self, headers: &HeaderMap) -> bool {
        session_token(headers, &self.site.cookie_name)
            .and_then(|token| self.sessions.validate(&token))
            .is_some()
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/register", post(handle_register).fallback(assets::handle_static))
        .route("/login", post(handle_login).fallback(assets::handle_static))
        .route("/logout", post(handle_logout).fallback(assets::handle_static))
        .fallback(assets::handle_static)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(middleware::from_fn(log_request))
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(config: Config) -> Result<()> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;

    if is_public_bind(&host) {
        tracing::warn!(
            "Binding to {host}: sessions travel in cleartext cookies, \
             put this behind a TLS-terminating proxy"
        );
    }
    if !config.gateway.public_dir.is_dir() {
        tracing::warn!(
            "Public directory {} does not exist; every static request will 404",
            config.gateway.public_dir.display()
        );
    }

    let state = AppState::from_config(&config)?;
    let sessions = Arc::clone(&state.sessions);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Server listening on http://{local_addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(discarded_sessions = sessions.len(), "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn is_public_bind(host: &str) -> bool {
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => host != "localhost",
    }
}

/// Per-request access log. Never logs bodies.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

// ══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ══════════════════════════════════════════════════════════════════════════════

/// Everything a JSON API handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidBody,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Internal server error")]
    Internal,
}

impl From<form::UnparseableBody> for ApiError {
    fn from(_: form::UnparseableBody) -> Self {
        Self::InvalidBody
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody | Self::Auth(AuthError::MissingFields) => StatusCode::BAD_REQUEST,
            Self::Auth(e) if e.is_conflict() => StatusCode::CONFLICT,
            Self::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            Self::Auth(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Auth(AuthError::Storage(ref e)) = self {
            tracing::error!("User store write failed: {e}");
        }
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health: always public
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /register: create a new user record.
async fn handle_register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let fields = form::parse_fields(&body)?;
    let registration = Registration {
        username: fields.text("username"),
        password: fields.text("password"),
        email: fields.text("email"),
        address: fields.optional("address"),
        phone: fields.optional("phone"),
    };

    let users = Arc::clone(&state.users);
    run_blocking(move || users.register(registration)).await?;

    Ok(Json(serde_json::json!({"success": true})))
}

/// POST /login: verify credentials and issue a session cookie.
async fn handle_login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let fields = form::parse_fields(&body)?;
    let username = fields.text("username");
    let password = fields.text("password");

    let users = Arc::clone(&state.users);
    let user = run_blocking(move || users.authenticate(&username, &password))
        .await
        .inspect_err(|e| {
            if matches!(e, ApiError::Auth(AuthError::InvalidCredentials)) {
                tracing::info!("Login rejected: invalid credentials");
            }
        })?;

    let token = state.sessions.create(&user.username);
    tracing::info!(username = %user.username, "Login succeeded");

    Ok((
        [(header::SET_COOKIE, session_cookie(&state.site.cookie_name, &token))],
        Json(serde_json::json!({"success": true})),
    ))
}

/// POST /logout: revoke the session named by the cookie, if any.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers, &state.site.cookie_name) {
        if state.sessions.revoke(&token) {
            tracing::info!("Session revoked");
        }
    }

    (
        [(header::SET_COOKIE, clear_session_cookie(&state.site.cookie_name))],
        Json(serde_json::json!({"success": true})),
    )
}

/// Run password hashing and file I/O off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!("Blocking auth task failed: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// COOKIES
// ══════════════════════════════════════════════════════════════════════════════

/// Find cookie `name` across all `Cookie` headers.
fn session_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
        .filter(|value| !value.is_empty())
}

/// Session cookie without an expiry: lifetime is enforced server-side.
fn session_cookie(name: &str, token: &str) -> String {
    format!("{name}={token}; HttpOnly; Path=/; SameSite=Lax")
}

fn clear_session_cookie(name: &str) -> String {
    format!("{name}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}
