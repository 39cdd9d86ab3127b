//! Staff account CRUD and credential checks.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::models::user::{NewUser, User, UserUpdate};
use crate::schema::tracker_users;
use crate::services::certificate_service::like_pattern;
use crate::services::password;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Whether `email` looks like a deliverable address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Look up an active user by username and check the password.
///
/// Unknown users, inactive users and wrong passwords are indistinguishable
/// to the caller, including in how long the check takes.
pub async fn authenticate(
    conn: &mut AsyncPgConnection,
    username: &str,
    password_attempt: &str,
) -> anyhow::Result<Option<User>> {
    let user = find_by_username(conn, username)
        .await?
        .filter(|u| u.is_active);

    let matched = password::verify_in_background(
        password_attempt.to_string(),
        user.as_ref().map(|u| u.password.clone()),
    )
    .await?;

    Ok(user.filter(|_| matched))
}

pub async fn find_by_username(
    conn: &mut AsyncPgConnection,
    username: &str,
) -> anyhow::Result<Option<User>> {
    let result = tracker_users::table
        .filter(tracker_users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}

pub async fn get_user(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<Option<User>> {
    let result = tracker_users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}

pub async fn username_taken(
    conn: &mut AsyncPgConnection,
    username: &str,
    except_id: Option<i64>,
) -> anyhow::Result<bool> {
    let mut query = tracker_users::table
        .filter(tracker_users::username.eq(username))
        .into_boxed();
    if let Some(id) = except_id {
        query = query.filter(tracker_users::id.ne(id));
    }
    let count: i64 = query.count().get_result(conn).await?;
    Ok(count > 0)
}

/// Users ordered by username, filtered by username or email when `query` is
/// non-empty.
pub async fn list_users(conn: &mut AsyncPgConnection, query: &str) -> anyhow::Result<Vec<User>> {
    let mut select = tracker_users::table.into_boxed();
    if !query.is_empty() {
        let pattern = like_pattern(query);
        select = select.filter(
            tracker_users::username
                .ilike(pattern.clone())
                .or(tracker_users::email.ilike(pattern)),
        );
    }
    let results = select
        .order(tracker_users::username.asc())
        .select(User::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn create_user(conn: &mut AsyncPgConnection, new_user: NewUser) -> anyhow::Result<User> {
    let result = diesel::insert_into(tracker_users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(user_id = result.id, username = %result.username, "User created");
    Ok(result)
}

pub async fn update_user(
    conn: &mut AsyncPgConnection,
    id: i64,
    changes: UserUpdate,
) -> anyhow::Result<Option<User>> {
    let result = diesel::update(tracker_users::table.find(id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .optional()?;
    Ok(result)
}

pub async fn set_password(
    conn: &mut AsyncPgConnection,
    id: i64,
    new_password: &str,
) -> anyhow::Result<bool> {
    let encoded = password::hash_in_background(new_password.to_string()).await?;
    let updated = diesel::update(tracker_users::table.find(id))
        .set(tracker_users::password.eq(encoded))
        .execute(conn)
        .await?;
    Ok(updated > 0)
}

pub async fn touch_last_login(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<()> {
    diesel::update(tracker_users::table.find(id))
        .set(tracker_users::last_login.eq(Some(Utc::now())))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_user(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<bool> {
    let deleted = diesel::delete(tracker_users::table.find(id))
        .execute(conn)
        .await?;
    Ok(deleted > 0)
}

pub async fn count_superusers(conn: &mut AsyncPgConnection) -> anyhow::Result<i64> {
    let count = tracker_users::table
        .filter(tracker_users::is_superuser.eq(true))
        .count()
        .get_result(conn)
        .await?;
    Ok(count)
}

/// Account totals for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserCounts {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
}

pub async fn user_counts(conn: &mut AsyncPgConnection) -> anyhow::Result<UserCounts> {
    let total_users: i64 = tracker_users::table.count().get_result(conn).await?;
    let active_users: i64 = tracker_users::table
        .filter(tracker_users::is_active.eq(true))
        .count()
        .get_result(conn)
        .await?;

    Ok(UserCounts {
        total_users,
        active_users,
        inactive_users: total_users - active_users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("registrar@uew.edu.gh"));
        assert!(!is_valid_email("registrar"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("space in@example.com"));
    }
}
