//! HTTP routes: accounts, registry, admin panel, static files.

pub mod accounts;
pub mod admin_panel;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{HOST, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::session::SessionStore;
use crate::config::TrackerConfig;
use crate::db::{DbConn, DbPool};
use crate::error::{AppError, AppResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<TrackerConfig>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(pool: DbPool, config: TrackerConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl_secs));
        Self {
            pool,
            config: Arc::new(config),
            sessions,
        }
    }

    /// Check out a pooled connection.
    pub async fn conn(&self) -> AppResult<DbConn> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Unavailable(format!("diesel pool: {e}")))
    }
}

/// A human-readable outcome plus where a browser front end should go next.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub next: String,
}

/// Build the full application router.
pub fn app_router(state: AppState) -> Router {
    let static_root = state.config.statics.static_root.clone();
    let media_root = state.config.statics.media_root.clone();
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(root_redirect))
        .route("/health", get(health))
        .merge(accounts::router())
        .nest("/registry", registry::router(upload_limit))
        .nest("/adminpanel", admin_panel::router())
        .nest_service("/static", ServeDir::new(static_root))
        .nest_service("/media", ServeDir::new(media_root))
        .layer(middleware::from_fn_with_state(state.clone(), validate_host))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_redirect() -> Redirect {
    Redirect::to("/login/")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Reject requests whose `Host` is not in `ALLOWED_HOSTS`.
async fn validate_host(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default();

    if !state.config.host_allowed(host) {
        tracing::warn!(host = %host, "Rejected request with disallowed Host header");
        return AppError::Validation("Invalid HTTP_HOST header".to_string()).into_response();
    }

    next.run(request).await
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_health() {
        let (status, body, headers) = send(test_state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap()["status"],
            "ok"
        );
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_root_redirects_to_login() {
        let (status, _, headers) = send(test_state(), get("/")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers["location"], "/login/");
    }

    #[tokio::test]
    async fn test_disallowed_host_rejected() {
        let request = Request::builder()
            .uri("/health")
            .header("host", "evil.example.com")
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(test_state(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "Invalid HTTP_HOST header");
    }

    #[tokio::test]
    async fn test_host_with_port_allowed() {
        let request = Request::builder()
            .uri("/health")
            .header("host", "127.0.0.1:8000")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(test_state(), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_static_file_is_404() {
        let (status, _, _) = send(test_state(), get("/static/css/absent.css")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
