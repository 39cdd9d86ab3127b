//! Superuser administration: accounts, password resets, activity log.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{ClientIp, SuperUser};
use crate::error::{AppError, AppResult};
use crate::models::activity::{ActivityAction, ActivityLog};
use crate::models::user::{NewUser, User, UserUpdate};
use crate::routes::accounts::{end_session, start_session, LoginGate, LoginRequest};
use crate::routes::{AppState, MessageResponse};
use crate::services::user_service::{self, UserCounts};
use crate::services::{activity_service, password};

const DEFAULT_ACTIVITY_LIMIT: i64 = 100;
const MAX_ACTIVITY_LIMIT: i64 = 500;
const MANAGE_USERS_PAGE: &str = "/adminpanel/manage-users/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/", post(admin_login))
        .route("/logout/", post(admin_logout))
        .route("/dashboard/", get(dashboard))
        .route("/manage-users/", get(manage_users))
        .route("/add-user/", post(add_user))
        .route("/edit-user/{user_id}/", get(show_user).post(edit_user))
        .route("/delete-user/{user_id}/", get(confirm_delete).post(delete_user))
        .route("/reset-password/{user_id}/", post(reset_password))
        .route("/activity/", get(activity))
}

async fn admin_login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    start_session(&state, request, ip, LoginGate::AdminPanel).await
}

async fn admin_logout(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> AppResult<Response> {
    end_session(&state, &headers, ip, LoginGate::AdminPanel).await
}

async fn dashboard(State(state): State<AppState>, _admin: SuperUser) -> AppResult<Json<UserCounts>> {
    let mut conn = state.conn().await?;
    Ok(Json(user_service::user_counts(&mut conn).await?))
}

// ── Listing ──

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub search_query: String,
}

async fn manage_users(
    State(state): State<AppState>,
    _admin: SuperUser,
    Query(search): Query<UserSearch>,
) -> AppResult<Json<UserList>> {
    let search_query = search.q.unwrap_or_default().trim().to_string();
    let mut conn = state.conn().await?;
    let users = user_service::list_users(&mut conn, &search_query).await?;
    Ok(Json(UserList {
        users,
        search_query,
    }))
}

async fn load_user(state: &AppState, user_id: i64) -> AppResult<User> {
    let mut conn = state.conn().await?;
    user_service::get_user(&mut conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found.")))
}

async fn show_user(
    State(state): State<AppState>,
    _admin: SuperUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<User>> {
    Ok(Json(load_user(&state, user_id).await?))
}

// ── Creation ──

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Shared checks for a username and email coming from the admin forms.
fn check_profile(username: &str, email: &str) -> AppResult<()> {
    if username.len() > 150 {
        return Err(AppError::Validation(
            "Username must be 150 characters or fewer.".to_string(),
        ));
    }
    if !email.is_empty() && !user_service::is_valid_email(email) {
        return Err(AppError::Validation(
            "Enter a valid email address.".to_string(),
        ));
    }
    Ok(())
}

async fn add_user(
    State(state): State<AppState>,
    admin: SuperUser,
    Json(request): Json<AddUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_string();
    let new_password = request.password.trim().to_string();
    if username.is_empty() || new_password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required.".to_string(),
        ));
    }

    let mut conn = state.conn().await?;
    if user_service::username_taken(&mut conn, &username, None).await? {
        return Err(AppError::Validation("Username already exists.".to_string()));
    }
    check_profile(&username, &email)?;
    password::validate_password(&new_password, &username, &email)
        .map_err(AppError::ValidationList)?;

    let encoded = password::hash_in_background(new_password).await?;
    let user = user_service::create_user(
        &mut conn,
        NewUser {
            username,
            email,
            password: encoded,
            is_superuser: false,
            is_staff: request.is_staff,
            is_active: request.is_active,
        },
    )
    .await?;

    activity_service::record_quietly(
        &mut conn,
        &admin.0.actor(),
        ActivityAction::UserCreated,
        format!("Created user {}", user.username),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}

// ── Editing ──

#[derive(Debug, Deserialize)]
pub struct EditUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

async fn edit_user(
    State(state): State<AppState>,
    admin: SuperUser,
    Path(user_id): Path<i64>,
    Json(request): Json<EditUserRequest>,
) -> AppResult<Json<User>> {
    let existing = load_user(&state, user_id).await?;

    let username = request
        .username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty() && *u != existing.username);
    let email = request
        .email
        .map(|e| e.trim().to_string())
        .unwrap_or_else(|| existing.email.clone());
    let is_active = request.is_active.unwrap_or(existing.is_active);

    check_profile(username.as_deref().unwrap_or(&existing.username), &email)?;
    if user_id == admin.0.user.id && !is_active {
        return Err(AppError::Validation(
            "You cannot deactivate your own account.".to_string(),
        ));
    }

    let mut conn = state.conn().await?;
    if let Some(name) = &username {
        if user_service::username_taken(&mut conn, name, Some(user_id)).await? {
            return Err(AppError::Validation("Username already exists.".to_string()));
        }
    }

    let changes = UserUpdate {
        username,
        email,
        is_staff: request.is_staff.unwrap_or(existing.is_staff),
        is_active,
    };
    let user = user_service::update_user(&mut conn, user_id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found.")))?;

    if !user.is_active {
        state.sessions.remove_user(user.id, None).await;
    }

    activity_service::record_quietly(
        &mut conn,
        &admin.0.actor(),
        ActivityAction::UserUpdated,
        format!("Updated user {}", user.username),
        None,
    )
    .await;

    Ok(Json(user))
}

// ── Deletion ──

#[derive(Debug, Serialize)]
pub struct DeleteConfirmation {
    pub user: User,
    pub message: String,
}

async fn confirm_delete(
    State(state): State<AppState>,
    _admin: SuperUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<DeleteConfirmation>> {
    let user = load_user(&state, user_id).await?;
    Ok(Json(DeleteConfirmation {
        message: format!("Are you sure you want to delete user '{}'?", user.username),
        user,
    }))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: SuperUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    if user_id == admin.0.user.id {
        return Err(AppError::Validation(
            "You cannot delete your own account.".to_string(),
        ));
    }
    let user = load_user(&state, user_id).await?;

    let mut conn = state.conn().await?;
    if !user_service::delete_user(&mut conn, user_id).await? {
        return Err(AppError::NotFound(format!("User {user_id} not found.")));
    }
    let ended = state.sessions.remove_user(user_id, None).await;
    tracing::info!(user_id, sessions_ended = ended, "User deleted");

    activity_service::record_quietly(
        &mut conn,
        &admin.0.actor(),
        ActivityAction::UserDeleted,
        format!("Deleted user {}", user.username),
        None,
    )
    .await;

    Ok(Json(MessageResponse {
        message: format!("User '{}' deleted.", user.username),
        next: MANAGE_USERS_PAGE.to_string(),
    }))
}

// ── Password reset ──

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub new_password2: String,
}

/// Trim both entries and check they are present and equal.
fn check_new_password(request: &ResetPasswordRequest) -> AppResult<String> {
    let new_password = request.new_password.trim();
    if new_password.is_empty() {
        return Err(AppError::Validation("Password cannot be empty.".to_string()));
    }
    if new_password != request.new_password2.trim() {
        return Err(AppError::Validation("Passwords do not match.".to_string()));
    }
    Ok(new_password.to_string())
}

async fn reset_password(
    State(state): State<AppState>,
    admin: SuperUser,
    Path(user_id): Path<i64>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let new_password = check_new_password(&request)?;
    let user = load_user(&state, user_id).await?;
    password::validate_password(&new_password, &user.username, &user.email)
        .map_err(AppError::ValidationList)?;

    let mut conn = state.conn().await?;
    if !user_service::set_password(&mut conn, user_id, &new_password).await? {
        return Err(AppError::NotFound(format!("User {user_id} not found.")));
    }

    // An admin resetting their own password stays logged in here.
    let keep = (user_id == admin.0.user.id).then_some(admin.0.session_id.as_str());
    let ended = state.sessions.remove_user(user_id, keep).await;
    tracing::info!(user_id, sessions_ended = ended, "Password reset");

    activity_service::record_quietly(
        &mut conn,
        &admin.0.actor(),
        ActivityAction::PasswordReset,
        format!("Reset password for {}", user.username),
        None,
    )
    .await;

    Ok(Json(MessageResponse {
        message: format!("Password for '{}' has been reset.", user.username),
        next: MANAGE_USERS_PAGE.to_string(),
    }))
}

// ── Activity ──

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

fn activity_limit(raw: Option<i64>) -> i64 {
    raw.unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT)
}

async fn activity(
    State(state): State<AppState>,
    _admin: SuperUser,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<ActivityLog>>> {
    let mut conn = state.conn().await?;
    let entries = activity_service::list_recent(&mut conn, activity_limit(query.limit)).await?;
    Ok(Json(entries))
}
