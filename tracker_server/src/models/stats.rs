//! dashboard_stats: daily snapshot of registry totals.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::dashboard_stats;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = dashboard_stats)]
pub struct DashboardStats {
    pub id: i64,
    pub date: NaiveDate,
    pub total_certificates: i64,
    pub collected_certificates: i64,
    pub pending_certificates: i64,
    pub total_uploads_today: i64,
    pub total_collections_today: i64,
    pub active_users: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = dashboard_stats)]
pub struct NewDashboardStats {
    pub date: NaiveDate,
    pub total_certificates: i64,
    pub collected_certificates: i64,
    pub pending_certificates: i64,
    pub total_uploads_today: i64,
    pub total_collections_today: i64,
    pub active_users: i64,
    pub last_updated: DateTime<Utc>,
}
