//! Spreadsheet import: read an uploaded workbook or CSV, match its columns
//! and upsert one certificate per usable row.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use diesel_async::AsyncPgConnection;
use serde::Serialize;

use crate::services::certificate_service::{self, UpsertOutcome};

const NAME_VARIANTS: &[&str] = &["name", "student name", "full name", "student_name", "fullname"];
const INDEX_VARIANTS: &[&str] = &[
    "index number",
    "index no",
    "index_no",
    "index",
    "admission number",
    "admission no",
    "admission_no",
];
const PROGRAMME_VARIANTS: &[&str] = &["programme", "program", "course", "course name", "course_name"];
const DEPARTMENT_VARIANTS: &[&str] = &["department", "dept", "faculty"];
const SLIP_VARIANTS: &[&str] = &[
    "slip no",
    "slip number",
    "slip_no",
    "slip_number",
    "slip",
    "certificate no",
    "cert_no",
];

/// Placeholder strings spreadsheet tools emit for missing index numbers.
const NULL_MARKERS: &[&str] = &["nan", "none"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Please upload a valid Excel file.")]
    UnsupportedFile,

    #[error("The uploaded file is empty.")]
    Empty,

    #[error("Missing required columns: {}. Found: {}", missing.join(", "), found.join(", "))]
    MissingColumns {
        missing: Vec<&'static str>,
        found: Vec<String>,
    },

    #[error("An error occurred while processing the file. Please check the file format and try again.")]
    Unreadable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Csv,
}

impl SheetFormat {
    /// Pick a reader from the uploaded file name's extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(SheetFormat::Workbook),
            "csv" => Some(SheetFormat::Csv),
            _ => None,
        }
    }
}

/// Header row plus data rows, every cell rendered as trimmed text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(bytes: &[u8], format: SheetFormat) -> Result<Self, ImportError> {
        let mut grid = match format {
            SheetFormat::Workbook => read_workbook(bytes)?,
            SheetFormat::Csv => read_csv(bytes)?,
        };

        if grid.is_empty() {
            return Err(ImportError::Empty);
        }
        let headers = grid.remove(0);
        let rows: Vec<Vec<String>> = grid
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        if headers.iter().all(String::is_empty) || rows.is_empty() {
            return Err(ImportError::Empty);
        }

        Ok(Self { headers, rows })
    }
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| ImportError::Unreadable(e.to_string()))?,
        None => return Err(ImportError::Empty),
    };

    Ok(range
        .rows()
        .map(|row| row.iter().map(render_cell).collect())
        .collect())
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportError::Unreadable(e.to_string()))?;
        grid.push(
            record
                .iter()
                .map(|cell| cell.trim_start_matches('\u{feff}').trim().to_string())
                .collect(),
        );
    }
    Ok(grid)
}

/// Render a workbook cell as trimmed text. Integral numbers drop their
/// fractional part so numeric index numbers stay `1234`, not `1234.0`.
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => render_float(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn render_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Positions of the recognised columns within a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub name: usize,
    pub index_number: usize,
    pub programme: usize,
    pub department: usize,
    pub slip_number: Option<usize>,
}

impl ColumnMap {
    /// Match headers case-insensitively against the known variants. The first
    /// variant present wins; required columns that are missing are reported
    /// together.
    pub fn match_headers(headers: &[String]) -> Result<Self, ImportError> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |variants: &[&str]| {
            variants
                .iter()
                .find_map(|variant| normalized.iter().position(|h| h == variant))
        };

        let name = find(NAME_VARIANTS);
        let index_number = find(INDEX_VARIANTS);
        let programme = find(PROGRAMME_VARIANTS);
        let department = find(DEPARTMENT_VARIANTS);
        let slip_number = find(SLIP_VARIANTS);

        match (name, index_number, programme, department) {
            (Some(name), Some(index_number), Some(programme), Some(department)) => Ok(Self {
                name,
                index_number,
                programme,
                department,
                slip_number,
            }),
            _ => {
                let missing = [
                    ("Name", name),
                    ("Index Number", index_number),
                    ("Programme", programme),
                    ("Department", department),
                ]
                .into_iter()
                .filter_map(|(label, found)| found.is_none().then_some(label))
                .collect();

                Err(ImportError::MissingColumns {
                    missing,
                    found: headers
                        .iter()
                        .filter(|h| !h.trim().is_empty())
                        .cloned()
                        .collect(),
                })
            }
        }
    }
}

/// A validated certificate row ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// Spreadsheet line number (header is line 1).
    pub line: usize,
    pub name: String,
    pub index_number: String,
    pub programme: String,
    pub department: String,
    pub slip_number: Option<String>,
}

/// Rows to upsert and the number rejected before touching the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub rows: Vec<ImportRow>,
    pub skipped: usize,
}

impl ImportPlan {
    pub fn from_table(table: &Table) -> Result<Self, ImportError> {
        let columns = ColumnMap::match_headers(&table.headers)?;
        let mut plan = ImportPlan::default();

        for (position, row) in table.rows.iter().enumerate() {
            let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or_default().to_string();

            let index_number = cell(columns.index_number);
            let name = cell(columns.name);
            let programme = cell(columns.programme);
            let department = cell(columns.department);
            let slip_number = columns
                .slip_number
                .map(cell)
                .filter(|s| !s.is_empty());

            if index_number.is_empty()
                || NULL_MARKERS.contains(&index_number.to_lowercase().as_str())
            {
                plan.skipped += 1;
                continue;
            }
            if name.is_empty() || programme.is_empty() || department.is_empty() {
                plan.skipped += 1;
                continue;
            }

            plan.rows.push(ImportRow {
                line: position + 2,
                name,
                index_number,
                programme,
                department,
                slip_number,
            });
        }

        Ok(plan)
    }
}

/// Counts reported back to the uploader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        format!(
            "Upload complete! Created: {}, Updated: {}, Skipped: {}",
            self.created, self.updated, self.skipped
        )
    }
}

/// Upsert every planned row. A row whose write fails is logged and counted
/// as skipped; the rest of the file still imports.
pub async fn apply_plan(
    conn: &mut AsyncPgConnection,
    plan: ImportPlan,
    uploaded_by: i64,
) -> ImportSummary {
    let mut summary = ImportSummary {
        skipped: plan.skipped,
        ..Default::default()
    };

    for row in plan.rows {
        match certificate_service::upsert_from_import(conn, &row, uploaded_by).await {
            Ok(UpsertOutcome::Created) => summary.created += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                tracing::error!(line = row.line, index_number = %row.index_number, "Error processing row: {e}");
                summary.skipped += 1;
            }
        }
    }

    crate::metrics::certificates_imported(summary.created, summary.updated, summary.skipped);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn table(header: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers(header),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(SheetFormat::from_filename("grads.XLSX"), Some(SheetFormat::Workbook));
        assert_eq!(SheetFormat::from_filename("old.xls"), Some(SheetFormat::Workbook));
        assert_eq!(SheetFormat::from_filename("list.csv"), Some(SheetFormat::Csv));
        assert_eq!(SheetFormat::from_filename("notes.txt"), None);
        assert_eq!(SheetFormat::from_filename("noextension"), None);
    }

    #[test]
    fn test_match_headers_variants_and_case() {
        let columns = ColumnMap::match_headers(&headers(&[
            " Student Name ",
            "ADMISSION NO",
            "Course",
            "Faculty",
            "Cert_No",
        ]))
        .unwrap();
        assert_eq!(
            columns,
            ColumnMap {
                name: 0,
                index_number: 1,
                programme: 2,
                department: 3,
                slip_number: Some(4),
            }
        );
    }

    #[test]
    fn test_match_headers_prefers_earlier_variant() {
        // "index number" outranks "index" regardless of column order.
        let columns = ColumnMap::match_headers(&headers(&[
            "Index",
            "Name",
            "Index Number",
            "Programme",
            "Department",
        ]))
        .unwrap();
        assert_eq!(columns.index_number, 2);
        assert_eq!(columns.slip_number, None);
    }

    #[test]
    fn test_missing_columns_message() {
        let err = ColumnMap::match_headers(&headers(&["Name", "Level", "Dept"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required columns: Index Number, Programme. Found: Name, Level, Dept"
        );
    }

    #[test]
    fn test_plan_skips_incomplete_rows() {
        let table = table(
            &["Name", "Index Number", "Programme", "Department", "Slip No"],
            &[
                &["Ama Mensah", "UEW/1", "BEd Maths", "Mathematics", "S-01"],
                &["Kofi Boateng", "", "BEd Maths", "Mathematics", ""],
                &["Yaw Asante", "NaN", "BSc IT", "Computing", ""],
                &["", "UEW/4", "BSc IT", "Computing", ""],
                &["Esi Owusu", "UEW/5", "BSc IT"],
                &["Akosua Darko", "UEW/6", "BSc IT", "Computing", ""],
            ],
        );

        let plan = ImportPlan::from_table(&table).unwrap();
        assert_eq!(plan.skipped, 4);
        assert_eq!(plan.rows.len(), 2);
        assert_eq!(
            plan.rows[0],
            ImportRow {
                line: 2,
                name: "Ama Mensah".to_string(),
                index_number: "UEW/1".to_string(),
                programme: "BEd Maths".to_string(),
                department: "Mathematics".to_string(),
                slip_number: Some("S-01".to_string()),
            }
        );
        assert_eq!(plan.rows[1].line, 7);
        assert_eq!(plan.rows[1].slip_number, None);
    }

    #[test]
    fn test_plan_propagates_missing_columns() {
        let table = table(&["Name", "Index Number"], &[&["A", "1"]]);
        assert!(matches!(
            ImportPlan::from_table(&table),
            Err(ImportError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_read_csv_table() {
        let csv = "\u{feff}Name,Index No,Program,Dept\n\
                   Ama Mensah , 1001 ,BEd,Maths\n\
                   ,,,\n\
                   Kofi,1002,BSc,Physics\n";
        let table = Table::read(csv.as_bytes(), SheetFormat::Csv).unwrap();
        assert_eq!(table.headers, headers(&["Name", "Index No", "Program", "Dept"]));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], headers(&["Ama Mensah", "1001", "BEd", "Maths"]));
    }

    #[test]
    fn test_read_header_only_is_empty() {
        let err = Table::read(b"Name,Index No\n", SheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ImportError::Empty));
        let err = Table::read(b"", SheetFormat::Csv).unwrap_err();
        assert!(matches!(err, ImportError::Empty));
    }

    #[test]
    fn test_read_garbage_workbook_is_unreadable() {
        let err = Table::read(b"definitely not a zip", SheetFormat::Workbook).unwrap_err();
        assert!(matches!(err, ImportError::Unreadable(_)));
    }

    #[test]
    fn test_read_workbook_written_by_report_writer() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Name", "Index Number", "Programme", "Department"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "Ama Mensah").unwrap();
        sheet.write_number(1, 1, 20231001.0).unwrap();
        sheet.write_string(1, 2, "BEd Maths").unwrap();
        sheet.write_string(1, 3, "Mathematics").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = Table::read(&bytes, SheetFormat::Workbook).unwrap();
        let plan = ImportPlan::from_table(&table).unwrap();
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].index_number, "20231001");
    }

    #[test]
    fn test_render_float() {
        assert_eq!(render_float(1234.0), "1234");
        assert_eq!(render_float(12.5), "12.5");
        assert_eq!(render_float(f64::NAN), "");
    }

    #[test]
    fn test_summary_message() {
        let summary = ImportSummary {
            created: 3,
            updated: 1,
            skipped: 2,
        };
        assert_eq!(
            summary.message(),
            "Upload complete! Created: 3, Updated: 1, Skipped: 2"
        );
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL and a reachable Postgres"]
    async fn test_apply_plan_counts_created_then_updated() {
        use crate::routes::testing::{db_state, login_as, unique};

        let Some(state) = db_state("test_apply_plan_counts_created_then_updated").await else {
            return;
        };
        let (staff, _) = login_as(&state, false).await;
        let first = unique("UEW");
        let second = unique("UEW");
        let csv = format!(
            "Name,Index Number,Programme,Department\n\
             Ama Mensah,{first},BEd Maths,Mathematics\n\
             Kofi Boateng,{second},BSc IT,Computing\n\
             Esi Owusu,nan,BA English,Languages\n"
        );
        let table = Table::read(csv.as_bytes(), SheetFormat::Csv).unwrap();

        let mut conn = state.conn().await.unwrap();
        let summary = apply_plan(&mut conn, ImportPlan::from_table(&table).unwrap(), staff.id).await;
        assert_eq!(
            summary,
            ImportSummary {
                created: 2,
                updated: 0,
                skipped: 1,
            }
        );

        let summary = apply_plan(&mut conn, ImportPlan::from_table(&table).unwrap(), staff.id).await;
        assert_eq!(
            summary,
            ImportSummary {
                created: 0,
                updated: 2,
                skipped: 1,
            }
        );
    }
}
