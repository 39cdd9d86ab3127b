//! Registry totals for the dashboard, snapshotted once per day.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::certificate::CertificateStatus;
use crate::models::stats::{DashboardStats, NewDashboardStats};
use crate::schema::{certificate_records, dashboard_stats, tracker_users};

/// Midnight UTC at the start of `now`'s day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Compute today's totals and upsert them into `dashboard_stats`.
pub async fn refresh_today(conn: &mut AsyncPgConnection) -> anyhow::Result<DashboardStats> {
    let now = Utc::now();
    let today: NaiveDate = now.date_naive();
    let midnight = start_of_day(now);

    let total_certificates: i64 = certificate_records::table
        .count()
        .get_result(conn)
        .await?;
    let collected_certificates: i64 = certificate_records::table
        .filter(certificate_records::status.eq(CertificateStatus::Collected.as_str()))
        .count()
        .get_result(conn)
        .await?;
    let total_uploads_today: i64 = certificate_records::table
        .filter(certificate_records::upload_date.ge(midnight))
        .count()
        .get_result(conn)
        .await?;
    let total_collections_today: i64 = certificate_records::table
        .filter(certificate_records::collected_at.ge(midnight))
        .count()
        .get_result(conn)
        .await?;
    let active_users: i64 = tracker_users::table
        .filter(tracker_users::is_active.eq(true))
        .count()
        .get_result(conn)
        .await?;

    let snapshot = NewDashboardStats {
        date: today,
        total_certificates,
        collected_certificates,
        pending_certificates: total_certificates - collected_certificates,
        total_uploads_today,
        total_collections_today,
        active_users,
        last_updated: now,
    };

    let stats = diesel::insert_into(dashboard_stats::table)
        .values(&snapshot)
        .on_conflict(dashboard_stats::date)
        .do_update()
        .set(&snapshot)
        .returning(DashboardStats::as_returning())
        .get_result(conn)
        .await?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 11, 5, 17, 42, 9).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2024, 11, 5, 0, 0, 0).unwrap()
        );
    }
}
