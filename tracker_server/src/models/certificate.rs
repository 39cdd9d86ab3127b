//! certificate_records: one certificate awaiting or past collection.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::certificate_records;

/// Collection state of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    #[serde(rename = "Not Collected")]
    NotCollected,
    #[serde(rename = "Collected")]
    Collected,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::NotCollected => "Not Collected",
            CertificateStatus::Collected => "Collected",
        }
    }

    pub fn all() -> [CertificateStatus; 2] {
        [CertificateStatus::NotCollected, CertificateStatus::Collected]
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown certificate status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for CertificateStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CertificateStatus::all()
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = certificate_records)]
pub struct CertificateRecord {
    pub id: i64,
    pub name: String,
    pub index_number: String,
    pub programme: String,
    pub slip_number: Option<String>,
    pub department: String,
    pub upload_date: DateTime<Utc>,
    pub status: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub uploaded_by: Option<i64>,
    pub collected_by: Option<i64>,
}

impl CertificateRecord {
    /// Parsed status; unknown labels read as not collected.
    pub fn status(&self) -> CertificateStatus {
        self.status
            .parse()
            .unwrap_or(CertificateStatus::NotCollected)
    }

    pub fn is_collected(&self) -> bool {
        self.status() == CertificateStatus::Collected
    }
}

impl fmt::Display for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.index_number)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = certificate_records)]
pub struct NewCertificateRecord {
    pub name: String,
    pub index_number: String,
    pub programme: String,
    pub slip_number: Option<String>,
    pub department: String,
    pub status: String,
    pub uploaded_by: Option<i64>,
}

/// Fields overwritten when an upload re-imports an existing index number.
///
/// `collected_at`/`collected_by` are written as `NULL` alongside the status
/// reset.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = certificate_records, treat_none_as_null = true)]
pub struct CertificateReimport {
    pub name: String,
    pub programme: String,
    pub slip_number: Option<String>,
    pub department: String,
    pub status: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub collected_by: Option<i64>,
}
