//! Schema migration for the tracker tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// Idempotent DDL for every tracker table.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Certificate Tracker Tables
-- ================================================================

CREATE TABLE IF NOT EXISTS tracker_users (
    id              BIGSERIAL PRIMARY KEY,
    username        VARCHAR(150) NOT NULL UNIQUE,
    email           VARCHAR(254) NOT NULL DEFAULT '',
    password        VARCHAR(255) NOT NULL,
    is_superuser    BOOLEAN NOT NULL DEFAULT FALSE,
    is_staff        BOOLEAN NOT NULL DEFAULT FALSE,
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    last_login      TIMESTAMPTZ,
    date_joined     TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS certificate_records (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    index_number    VARCHAR(100) NOT NULL UNIQUE,
    programme       VARCHAR(255) NOT NULL,
    slip_number     VARCHAR(100),
    department      VARCHAR(255) NOT NULL,
    upload_date     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    status          VARCHAR(20) NOT NULL DEFAULT 'Not Collected'
                    CHECK (status IN ('Not Collected', 'Collected')),
    collected_at    TIMESTAMPTZ,
    uploaded_by     BIGINT REFERENCES tracker_users(id) ON DELETE SET NULL,
    collected_by    BIGINT REFERENCES tracker_users(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_certificate_records_upload_date ON certificate_records (upload_date DESC);
CREATE INDEX IF NOT EXISTS idx_certificate_records_status ON certificate_records (status);
CREATE INDEX IF NOT EXISTS idx_certificate_records_department ON certificate_records (department);

CREATE TABLE IF NOT EXISTS activity_logs (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT REFERENCES tracker_users(id) ON DELETE SET NULL,
    action          VARCHAR(32) NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    timestamp       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    ip_address      VARCHAR(45),
    certificate_id  BIGINT REFERENCES certificate_records(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_logs_timestamp ON activity_logs (timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_activity_logs_action ON activity_logs (action);

CREATE TABLE IF NOT EXISTS dashboard_stats (
    id                       BIGSERIAL PRIMARY KEY,
    date                     DATE NOT NULL UNIQUE,
    total_certificates       BIGINT NOT NULL DEFAULT 0,
    collected_certificates   BIGINT NOT NULL DEFAULT 0,
    pending_certificates     BIGINT NOT NULL DEFAULT 0,
    total_uploads_today      BIGINT NOT NULL DEFAULT 0,
    total_collections_today  BIGINT NOT NULL DEFAULT 0,
    active_users             BIGINT NOT NULL DEFAULT 0,
    last_updated             TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Advisory lock key held while the DDL runs ("CERTTRAK" in ASCII).
const MIGRATION_LOCK_KEY: i64 = 0x4345_5254_5452_414B;

/// The migration wrapped in one transaction that first takes the advisory
/// lock, so concurrent starts apply it one at a time.
fn locked_migration_sql() -> String {
    format!("BEGIN;\nSELECT pg_advisory_xact_lock({MIGRATION_LOCK_KEY});\n{MIGRATION_SQL}\nCOMMIT;\n")
}

/// Apply the tracker migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(&locked_migration_sql())
        .await
        .map_err(|e| anyhow::anyhow!("tracker migration failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_every_table() {
        for table in [
            "tracker_users",
            "certificate_records",
            "activity_logs",
            "dashboard_stats",
        ] {
            assert!(
                MIGRATION_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_migration_runs_under_advisory_lock() {
        let sql = locked_migration_sql();
        assert!(sql.starts_with("BEGIN;\nSELECT pg_advisory_xact_lock("));
        assert!(sql.trim_end().ends_with("COMMIT;"));
        assert!(sql.contains(MIGRATION_SQL));
    }

    #[test]
    fn test_status_check_matches_labels() {
        use crate::models::certificate::CertificateStatus;
        for status in [CertificateStatus::NotCollected, CertificateStatus::Collected] {
            assert!(MIGRATION_SQL.contains(&format!("'{}'", status.as_str())));
        }
    }
}
