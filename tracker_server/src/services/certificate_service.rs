//! Certificate queries, upserts and collection.

use chrono::Utc;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::certificate::{
    CertificateRecord, CertificateReimport, CertificateStatus, NewCertificateRecord,
};
use crate::pagination::PageInfo;
use crate::schema::certificate_records;
use crate::services::import_service::ImportRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// One page of certificates, newest upload first, optionally filtered by a
/// case-insensitive match on name or index number.
pub async fn search_page(
    conn: &mut AsyncPgConnection,
    query: &str,
    raw_page: Option<&str>,
    per_page: i64,
) -> anyhow::Result<(Vec<CertificateRecord>, PageInfo)> {
    let pattern = (!query.is_empty()).then(|| like_pattern(query));

    let mut count_query = certificate_records::table.into_boxed();
    if let Some(pattern) = &pattern {
        count_query = count_query.filter(
            certificate_records::name
                .ilike(pattern.clone())
                .or(certificate_records::index_number.ilike(pattern.clone())),
        );
    }
    let total: i64 = count_query.count().get_result(conn).await?;

    let page = PageInfo::resolve(raw_page, total, per_page);

    let mut records_query = certificate_records::table.into_boxed();
    if let Some(pattern) = &pattern {
        records_query = records_query.filter(
            certificate_records::name
                .ilike(pattern.clone())
                .or(certificate_records::index_number.ilike(pattern.clone())),
        );
    }
    let records = records_query
        .order((
            certificate_records::upload_date.desc(),
            certificate_records::id.desc(),
        ))
        .offset(page.offset())
        .limit(page.limit())
        .select(CertificateRecord::as_select())
        .load(conn)
        .await?;

    Ok((records, page))
}

/// All certificates in a status, newest upload first.
pub async fn list_by_status(
    conn: &mut AsyncPgConnection,
    status: CertificateStatus,
) -> anyhow::Result<Vec<CertificateRecord>> {
    let results = certificate_records::table
        .filter(certificate_records::status.eq(status.as_str()))
        .order((
            certificate_records::upload_date.desc(),
            certificate_records::id.desc(),
        ))
        .select(CertificateRecord::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Insert a new certificate or overwrite the one holding the same index
/// number. Re-imported certificates return to "Not Collected".
///
/// A single `INSERT .. ON CONFLICT` statement, so two uploads racing on the
/// same index number both succeed. `xmax = 0` only holds for a freshly
/// inserted tuple, which tells creation and update apart.
pub async fn upsert_from_import(
    conn: &mut AsyncPgConnection,
    row: &ImportRow,
    uploaded_by: i64,
) -> anyhow::Result<UpsertOutcome> {
    let not_collected = CertificateStatus::NotCollected.as_str().to_string();
    let inserted: bool = diesel::insert_into(certificate_records::table)
        .values(&NewCertificateRecord {
            name: row.name.clone(),
            index_number: row.index_number.clone(),
            programme: row.programme.clone(),
            slip_number: row.slip_number.clone(),
            department: row.department.clone(),
            status: not_collected.clone(),
            uploaded_by: Some(uploaded_by),
        })
        .on_conflict(certificate_records::index_number)
        .do_update()
        .set(&CertificateReimport {
            name: row.name.clone(),
            programme: row.programme.clone(),
            slip_number: row.slip_number.clone(),
            department: row.department.clone(),
            status: not_collected,
            collected_at: None,
            collected_by: None,
        })
        .returning(sql::<Bool>("(xmax = 0)"))
        .get_result(conn)
        .await?;

    Ok(if inserted {
        UpsertOutcome::Created
    } else {
        UpsertOutcome::Updated
    })
}

/// Mark a certificate collected now by `collected_by`.
pub async fn mark_collected(
    conn: &mut AsyncPgConnection,
    id: i64,
    collected_by: i64,
) -> anyhow::Result<Option<CertificateRecord>> {
    let result = diesel::update(certificate_records::table.find(id))
        .set((
            certificate_records::status.eq(CertificateStatus::Collected.as_str()),
            certificate_records::collected_at.eq(Some(Utc::now())),
            certificate_records::collected_by.eq(Some(collected_by)),
        ))
        .returning(CertificateRecord::as_returning())
        .get_result(conn)
        .await
        .optional()?;

    if let Some(record) = &result {
        crate::metrics::certificate_collected();
        tracing::info!(
            certificate_id = record.id,
            index_number = %record.index_number,
            "Certificate collected: {record}"
        );
    }

    Ok(result)
}
