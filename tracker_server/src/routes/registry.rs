//! Certificate registry: upload, listing, collection, reports, dashboard.

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Datelike, Utc};
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::config::URL_COMPONENT;
use crate::error::{AppError, AppResult};
use crate::models::activity::ActivityAction;
use crate::models::certificate::{CertificateRecord, CertificateStatus};
use crate::models::stats::DashboardStats;
use crate::pagination::PageInfo;
use crate::routes::AppState;
use crate::services::import_service::{self, ImportError, ImportPlan, ImportSummary, SheetFormat, Table};
use crate::services::{activity_service, certificate_service, report_service, stats_service};

const UPLOAD_FIELD: &str = "excel_file";
const UPLOAD_PAGE: &str = "/registry/upload/";

pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload/",
            get(list_certificates)
                .post(upload_certificates)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/collect/{pk}/", post(collect_certificate))
        .route("/generate_report/", get(generate_report))
        .route("/dashboard/", get(dashboard))
}

// ── Listing ──

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CertificatePage {
    pub records: Vec<CertificateRecord>,
    pub page: PageInfo,
    pub search_query: String,
    pub current_year: i32,
}

async fn list_certificates(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<CertificatePage>> {
    let search_query = query.q.unwrap_or_default().trim().to_string();

    let mut conn = state.conn().await?;
    let (records, page) = certificate_service::search_page(
        &mut conn,
        &search_query,
        query.page.as_deref(),
        state.config.page_size,
    )
    .await?;

    Ok(Json(CertificatePage {
        records,
        page,
        search_query,
        current_year: Utc::now().year(),
    }))
}

// ── Upload ──

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub message: String,
}

/// A body over the upload limit is 413; other multipart faults are 400.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("The uploaded file is too large.".to_string())
    } else {
        AppError::Validation(e.body_text())
    }
}

/// Pull the spreadsheet field out of a multipart body.
async fn read_upload(multipart: &mut Multipart) -> AppResult<(String, Vec<u8>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(ImportError::UnsupportedFile.into())
}

async fn upload_certificates(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let (filename, bytes) = read_upload(&mut multipart).await?;
    let format = SheetFormat::from_filename(&filename).ok_or(ImportError::UnsupportedFile)?;

    tracing::info!(file = %filename, size = bytes.len(), "Processing uploaded spreadsheet");

    let plan = tokio::task::spawn_blocking(move || {
        let table = Table::read(&bytes, format)?;
        tracing::info!(rows = table.rows.len(), "Spreadsheet parsed");
        ImportPlan::from_table(&table)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("import task failed: {e}")))?;

    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!(file = %filename, "Rejected upload: {e}");
            return Err(e.into());
        }
    };

    let mut conn = state.conn().await?;
    let summary = import_service::apply_plan(&mut conn, plan, current.user.id).await;
    let message = summary.message();

    activity_service::record_quietly(
        &mut conn,
        &current.actor(),
        ActivityAction::Upload,
        format!("{filename}: {message}"),
        None,
    )
    .await;
    tracing::info!(file = %filename, "{message}");

    Ok(Json(UploadResponse { summary, message }))
}

// ── Collection ──

#[derive(Debug, Deserialize)]
pub struct CollectQuery {
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub record: CertificateRecord,
    pub message: String,
    pub next: String,
}

/// Listing URL to return to, keeping the active search.
fn upload_page_with_query(q: Option<&str>) -> String {
    match q.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => format!("{UPLOAD_PAGE}?q={}", utf8_percent_encode(q, URL_COMPONENT)),
        None => UPLOAD_PAGE.to_string(),
    }
}

async fn collect_certificate(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(pk): Path<i64>,
    Query(query): Query<CollectQuery>,
) -> AppResult<Json<CollectResponse>> {
    let mut conn = state.conn().await?;
    let record = certificate_service::mark_collected(&mut conn, pk, current.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Certificate {pk} not found.")))?;

    activity_service::record_quietly(
        &mut conn,
        &current.actor(),
        ActivityAction::Collect,
        format!("Certificate collected: {record}"),
        Some(record.id),
    )
    .await;

    Ok(Json(CollectResponse {
        message: format!("{}'s certificate marked as collected.", record.name),
        next: upload_page_with_query(query.q.as_deref()),
        record,
    }))
}

// ── Reports ──

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub status: Option<String>,
}

async fn generate_report(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let raw_status = query.status.unwrap_or_default();
    let raw_status = raw_status.trim();
    if raw_status.is_empty() {
        return Err(AppError::Validation("Please select a report type.".to_string()));
    }
    let status: CertificateStatus = raw_status
        .parse()
        .map_err(|_| {
            let choices: Vec<&str> = CertificateStatus::all().iter().map(|s| s.as_str()).collect();
            AppError::Validation(format!(
                "Unknown report type '{raw_status}'. Choose one of: {}.",
                choices.join(", ")
            ))
        })?;

    let mut conn = state.conn().await?;
    let records = certificate_service::list_by_status(&mut conn, status).await?;
    if records.is_empty() {
        return Err(AppError::NotFound(format!("No {status} certificates found.")));
    }

    let report = report_service::build_report(status, &records, Utc::now())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("report generation failed: {e}")))?;

    activity_service::record_quietly(
        &mut conn,
        &current.actor(),
        ActivityAction::Report,
        format!("Report generated: {} with {} records", report.filename, report.rows),
        None,
    )
    .await;
    crate::metrics::report_generated(status.as_str());
    tracing::info!(
        filename = %report.filename,
        rows = report.rows,
        "Report generated"
    );

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, report_service::XLSX_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report.filename),
            ),
        ],
        report.bytes,
    )
        .into_response())
}

// ── Dashboard ──

async fn dashboard(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<DashboardStats>> {
    let mut conn = state.conn().await?;
    let stats = stats_service::refresh_today(&mut conn).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::*;
    use crate::routes::testing::get;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_upload_page_with_query() {
        assert_eq!(upload_page_with_query(None), "/registry/upload/");
        assert_eq!(upload_page_with_query(Some("  ")), "/registry/upload/");
        assert_eq!(
            upload_page_with_query(Some("mensah")),
            "/registry/upload/?q=mensah"
        );
        assert_eq!(
            upload_page_with_query(Some(" Ama Mensah ")),
            "/registry/upload/?q=Ama%20Mensah"
        );
        assert_eq!(
            upload_page_with_query(Some("UEW/19&x=1")),
            "/registry/upload/?q=UEW%2F19%26x%3D1"
        );
        assert_eq!(
            upload_page_with_query(Some("Kwabená")),
            "/registry/upload/?q=Kwaben%C3%A1"
        );
    }

    async fn upload_only(mut multipart: Multipart) -> AppResult<Json<String>> {
        let (filename, _) = read_upload(&mut multipart).await?;
        Ok(Json(filename))
    }

    fn multipart_request(uri: &str, field: &str, payload: &str) -> Request<Body> {
        let body = format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"records.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {payload}\r\n\
             --XBOUNDARY--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", "localhost")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    async fn call_upload(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        use tower::ServiceExt;

        let app = Router::new()
            .route("/", post(upload_only))
            .layer(DefaultBodyLimit::max(512));
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let (status, body) = call_upload(multipart_request("/", UPLOAD_FIELD, &"a".repeat(4096))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["category"], "payload_too_large");
        assert_eq!(body["error"]["message"], "The uploaded file is too large.");
    }

    #[tokio::test]
    async fn test_upload_field_is_read_within_limit() {
        let (status, body) = call_upload(multipart_request("/", UPLOAD_FIELD, "Name,Index Number")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "records.csv");

        let (status, body) = call_upload(multipart_request("/", "other_file", "x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["category"], "import");
    }

    #[tokio::test]
    async fn test_registry_requires_login() {
        for uri in [
            "/registry/upload/",
            "/registry/generate_report/?status=Collected",
            "/registry/dashboard/",
        ] {
            let (status, _, _) = send(test_state(), get(uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }

        let request = Request::builder()
            .method("POST")
            .uri("/registry/collect/1/")
            .header("host", "localhost")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(test_state(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // ── Against Postgres (TEST_DATABASE_URL) ──

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    fn collect_request(pk: i64, query: &str, cookie: &str) -> Request<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/registry/collect/{pk}/{query}"))
            .header("host", "localhost")
            .body(Body::empty())
            .unwrap();
        with_cookie(request, cookie)
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL and a reachable Postgres"]
    async fn test_collect_unknown_certificate_is_404() {
        let Some(state) = db_state("test_collect_unknown_certificate_is_404").await else {
            return;
        };
        let (_, cookie) = login_as(&state, false).await;

        let (status, body, _) = send(state, collect_request(i64::MAX, "", &cookie)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            json(&body)["error"]["message"],
            format!("Certificate {} not found.", i64::MAX)
        );
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL and a reachable Postgres"]
    async fn test_upload_collect_and_reupload() {
        let Some(state) = db_state("test_upload_collect_and_reupload").await else {
            return;
        };
        let (staff, cookie) = login_as(&state, false).await;
        let index = unique("UEW");
        let csv = format!(
            "Name,Index Number,Programme,Department\r\n\
             Ama Mensah,{index},BEd Maths,Mathematics"
        );

        let upload = with_cookie(
            multipart_request("/registry/upload/", UPLOAD_FIELD, &csv),
            &cookie,
        );
        let (status, body, _) = send(state.clone(), upload).await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["created"], 1);
        assert_eq!(body["message"], "Upload complete! Created: 1, Updated: 0, Skipped: 0");

        let (_, body, _) = send(state.clone(), with_cookie(get(&format!("/registry/upload/?q={index}")), &cookie)).await;
        let listing = json(&body);
        assert_eq!(listing["page"]["total"], 1);
        let pk = listing["records"][0]["id"].as_i64().unwrap();

        let (status, body, _) = send(state.clone(), collect_request(pk, "?q=Ama%20Mensah", &cookie)).await;
        assert_eq!(status, StatusCode::OK);
        let collected = json(&body);
        assert_eq!(collected["next"], "/registry/upload/?q=Ama%20Mensah");
        assert_eq!(collected["record"]["status"], "Collected");
        assert_eq!(collected["record"]["collected_by"], staff.id);

        let upload = with_cookie(
            multipart_request("/registry/upload/", UPLOAD_FIELD, &csv),
            &cookie,
        );
        let (status, body, _) = send(state.clone(), upload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["updated"], 1);

        let (_, body, _) = send(state, with_cookie(get(&format!("/registry/upload/?q={index}")), &cookie)).await;
        let record = &json(&body)["records"][0];
        assert_eq!(record["status"], "Not Collected");
        assert!(record["collected_at"].is_null());
        assert!(record["collected_by"].is_null());
    }
}
