//! Staff login and logout.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::session::{self, expired_session_cookie, session_cookie, sign_session_id};
use crate::auth::{session_id_from_headers, ClientIp, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::models::activity::ActivityAction;
use crate::models::user::User;
use crate::routes::{AppState, MessageResponse};
use crate::services::activity_service::{self, Actor};
use crate::services::user_service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/", post(login))
        .route("/logout/", post(logout))
        .route("/me/", get(me))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    pub next: String,
}

/// Which login page is asking; the admin panel only admits superusers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    Staff,
    AdminPanel,
}

impl LoginGate {
    fn landing(&self) -> &'static str {
        match self {
            LoginGate::Staff => "/registry/upload/",
            LoginGate::AdminPanel => "/adminpanel/dashboard/",
        }
    }

    fn login_page(&self) -> &'static str {
        match self {
            LoginGate::Staff => "/login/",
            LoginGate::AdminPanel => "/adminpanel/login/",
        }
    }
}

/// Check credentials, open a session and set the session cookie.
pub async fn start_session(
    state: &AppState,
    request: LoginRequest,
    ip_address: Option<String>,
    gate: LoginGate,
) -> AppResult<Response> {
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        crate::metrics::login_attempt("failure");
        return Err(AppError::InvalidCredentials);
    }

    let mut conn = state.conn().await?;
    let Some(user) = user_service::authenticate(&mut conn, username, &request.password).await?
    else {
        crate::metrics::login_attempt("failure");
        tracing::info!(username = %username, "Failed login attempt");
        return Err(AppError::InvalidCredentials);
    };

    if gate == LoginGate::AdminPanel && !user.is_superuser {
        crate::metrics::login_attempt("denied");
        tracing::warn!(user_id = user.id, "Non-superuser refused at admin login");
        return Err(AppError::Forbidden(
            "Access denied. Only system administrators can log in.".to_string(),
        ));
    }

    user_service::touch_last_login(&mut conn, user.id).await?;
    let session_id = state.sessions.create(user.id).await;
    let cookie = session_cookie(
        &sign_session_id(&state.config.secret_key, &session_id),
        state.config.session_ttl_secs,
        !state.config.debug,
    );

    let actor = Actor {
        user_id: Some(user.id),
        ip_address,
    };
    activity_service::record_quietly(
        &mut conn,
        &actor,
        ActivityAction::Login,
        format!("{} logged in", user.username),
        None,
    )
    .await;

    crate::metrics::login_attempt("success");
    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    let user = user_service::get_user(&mut conn, user.id).await?.unwrap_or(user);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            user,
            next: gate.landing().to_string(),
        }),
    )
        .into_response())
}

/// Drop the caller's session (if any) and clear the cookie.
pub async fn end_session(
    state: &AppState,
    headers: &HeaderMap,
    ip_address: Option<String>,
    gate: LoginGate,
) -> AppResult<Response> {
    let ended = match session_id_from_headers(headers, &state.config.secret_key) {
        Some(id) => state.sessions.remove(&id).await,
        None => None,
    };

    if let Some(ended) = ended {
        let actor = Actor {
            user_id: Some(ended.user_id),
            ip_address,
        };
        match state.conn().await {
            Ok(mut conn) => {
                activity_service::record_quietly(
                    &mut conn,
                    &actor,
                    ActivityAction::Logout,
                    "Logged out",
                    None,
                )
                .await
            }
            Err(e) => tracing::warn!("Logout activity not recorded: {e}"),
        }
        tracing::info!(user_id = ended.user_id, "User logged out");
    }

    Ok((
        [(SET_COOKIE, expired_session_cookie(!state.config.debug))],
        Json(MessageResponse {
            message: "You have been logged out.".to_string(),
            next: gate.login_page().to_string(),
        }),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    start_session(&state, request, ip, LoginGate::Staff).await
}

async fn logout(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> AppResult<Response> {
    end_session(&state, &headers, ip, LoginGate::Staff).await
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub session_started: Option<DateTime<Utc>>,
}

async fn me(State(state): State<AppState>, current: CurrentUser) -> Json<MeResponse> {
    let session_started = state
        .sessions
        .touch(&current.session_id)
        .await
        .map(|s: session::Session| s.created_at);
    Json(MeResponse {
        user: current.user,
        session_started,
    })
}
