//! tracker_users: staff accounts that log in to the registry.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::tracker_users;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = tracker_users)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Encoded password hash; see [`crate::services::password`].
    #[serde(skip_serializing)]
    pub password: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = tracker_users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_active: bool,
}

/// Profile fields an administrator may change.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = tracker_users)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: String,
    pub is_staff: bool,
    pub is_active: bool,
}
