//! Activity log writes and listings.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::activity::{ActivityAction, ActivityLog, NewActivityLog};
use crate::schema::activity_logs;

/// Who did what, from where.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
}

/// Append an activity entry.
pub async fn record(
    conn: &mut AsyncPgConnection,
    actor: &Actor,
    action: ActivityAction,
    description: impl Into<String>,
    certificate_id: Option<i64>,
) -> anyhow::Result<()> {
    let entry = NewActivityLog {
        user_id: actor.user_id,
        action: action.as_str().to_string(),
        description: description.into(),
        ip_address: actor.ip_address.clone(),
        certificate_id,
    };

    diesel::insert_into(activity_logs::table)
        .values(&entry)
        .execute(conn)
        .await?;
    Ok(())
}

/// Append an activity entry; a failed write is logged and swallowed so the
/// action being audited still succeeds.
pub async fn record_quietly(
    conn: &mut AsyncPgConnection,
    actor: &Actor,
    action: ActivityAction,
    description: impl Into<String>,
    certificate_id: Option<i64>,
) {
    if let Err(e) = record(conn, actor, action, description, certificate_id).await {
        tracing::warn!(action = %action, "Failed to record activity: {e}");
    }
}

/// Most recent entries first.
pub async fn list_recent(
    conn: &mut AsyncPgConnection,
    limit: i64,
) -> anyhow::Result<Vec<ActivityLog>> {
    let results = activity_logs::table
        .order((activity_logs::timestamp.desc(), activity_logs::id.desc()))
        .limit(limit)
        .select(ActivityLog::as_select())
        .load(conn)
        .await?;
    Ok(results)
}
