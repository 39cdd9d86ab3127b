//! activity_logs: append-only audit trail of staff actions.

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::activity_logs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Login,
    Logout,
    Upload,
    Collect,
    Report,
    UserCreated,
    UserUpdated,
    UserDeleted,
    PasswordReset,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Login => "login",
            ActivityAction::Logout => "logout",
            ActivityAction::Upload => "upload",
            ActivityAction::Collect => "collect",
            ActivityAction::Report => "report",
            ActivityAction::UserCreated => "user_created",
            ActivityAction::UserUpdated => "user_updated",
            ActivityAction::UserDeleted => "user_deleted",
            ActivityAction::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = activity_logs)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub certificate_id: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_logs)]
pub struct NewActivityLog {
    pub user_id: Option<i64>,
    pub action: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub certificate_id: Option<i64>,
}
