//! Spreadsheet reports of certificates by collection status.

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::models::certificate::{CertificateRecord, CertificateStatus};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const HEADERS: [&str; 8] = [
    "Index Number",
    "Name",
    "Programme",
    "Department",
    "Slip Number",
    "Status",
    "Upload Date",
    "Collected At",
];

/// A rendered report ready to send as an attachment.
#[derive(Debug)]
pub struct Report {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub rows: usize,
}

/// Download name, e.g. `Not_Collected_Certificates_20241105_174209.xlsx`.
pub fn report_filename(status: CertificateStatus, now: DateTime<Utc>) -> String {
    format!(
        "{}_Certificates_{}.xlsx",
        status.as_str().replace(' ', "_"),
        now.format("%Y%m%d_%H%M%S")
    )
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn report_row(record: &CertificateRecord) -> [String; 8] {
    [
        record.index_number.clone(),
        record.name.clone(),
        record.programme.clone(),
        record.department.clone(),
        record.slip_number.clone().unwrap_or_default(),
        record.status().to_string(),
        format_timestamp(Some(record.upload_date)),
        format_timestamp(record.collected_at.filter(|_| record.is_collected())),
    ]
}

/// Build the workbook: one sheet titled `"{status} Certificates"`, a bold
/// header row and one row per record in the given order.
pub fn build_report(
    status: CertificateStatus,
    records: &[CertificateRecord],
    now: DateTime<Utc>,
) -> Result<Report, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(format!("{status} Certificates"))?;

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in report_row(record).iter().enumerate() {
            sheet.write_string(row, col as u16, value)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;

    Ok(Report {
        filename: report_filename(status, now),
        bytes,
        rows: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::import_service::{SheetFormat, Table};
    use chrono::TimeZone;

    fn record(index: &str, collected: bool) -> CertificateRecord {
        let uploaded = Utc.with_ymd_and_hms(2024, 10, 1, 9, 30, 0).unwrap();
        CertificateRecord {
            id: 1,
            name: "Ama Mensah".to_string(),
            index_number: index.to_string(),
            programme: "BEd Mathematics".to_string(),
            slip_number: None,
            department: "Mathematics".to_string(),
            upload_date: uploaded,
            status: if collected { "Collected" } else { "Not Collected" }.to_string(),
            collected_at: collected.then(|| Utc.with_ymd_and_hms(2024, 11, 5, 14, 5, 59).unwrap()),
            uploaded_by: None,
            collected_by: None,
        }
    }

    #[test]
    fn test_report_filename() {
        let now = Utc.with_ymd_and_hms(2024, 11, 5, 17, 42, 9).unwrap();
        assert_eq!(
            report_filename(CertificateStatus::NotCollected, now),
            "Not_Collected_Certificates_20241105_174209.xlsx"
        );
        assert_eq!(
            report_filename(CertificateStatus::Collected, now),
            "Collected_Certificates_20241105_174209.xlsx"
        );
    }

    #[test]
    fn test_report_row_formats_timestamps() {
        let row = report_row(&record("UEW/1", true));
        assert_eq!(row[4], "");
        assert_eq!(row[5], "Collected");
        assert_eq!(row[6], "2024-10-01 09:30");
        assert_eq!(row[7], "2024-11-05 14:05");

        let row = report_row(&record("UEW/2", false));
        assert_eq!(row[7], "");
    }

    #[test]
    fn test_build_report_is_readable() {
        let now = Utc.with_ymd_and_hms(2024, 11, 5, 17, 42, 9).unwrap();
        let records = vec![record("UEW/1", true), record("UEW/2", true)];
        let report = build_report(CertificateStatus::Collected, &records, now).unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.filename, "Collected_Certificates_20241105_174209.xlsx");

        let table = Table::read(&report.bytes, SheetFormat::Workbook).unwrap();
        assert_eq!(table.headers, HEADERS.map(String::from).to_vec());
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], "UEW/2");
    }
}
