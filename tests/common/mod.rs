#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};

/// Loan book table used across the integration tests. Every business column is
/// required and has no default; the system columns are engine-managed.
pub const LOANS_DDL: &str = r#"
    CREATE TABLE loans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        Facility_No VARCHAR(20) NOT NULL,
        Customer_Name NVARCHAR(100) NOT NULL,
        Amount DECIMAL(18,2) NOT NULL,
        period_date DATE NOT NULL,
        upload_date DATETIME DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Title block, spacer, header on row 3, three data rows from row 4.
pub fn loan_book_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["Loan book - May 2024"],
        vec![],
        vec!["Facility No", "Customer Name", "Amount"],
        vec!["F-001", "Acme Trading", "1,250.00"],
        vec!["F-002", "Globex", "980.5"],
        vec!["F-003", "Initech", "15000"],
    ]
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Authors a real `.xlsx` workbook. Cells that parse as plain numbers are
    /// written as numeric cells, blank strings are left empty.
    pub fn write_xlsx(&self, name: &str, sheets: &[(&str, Vec<Vec<&str>>)]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = Workbook::new();
        for (sheet_name, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*sheet_name).expect("sheet name");
            for (row_idx, row) in rows.iter().enumerate() {
                for (col_idx, text) in row.iter().enumerate() {
                    let (row_idx, col_idx) = (row_idx as u32, col_idx as u16);
                    if text.is_empty() {
                        continue;
                    }
                    match text.parse::<f64>() {
                        Ok(number) => worksheet
                            .write_number(row_idx, col_idx, number)
                            .expect("write number"),
                        Err(_) => worksheet
                            .write_string(row_idx, col_idx, *text)
                            .expect("write string"),
                    };
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }

    /// Creates a SQLite database under the workspace from `ddl`.
    pub fn create_database(&self, name: &str, ddl: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let conn = Connection::open(&path).expect("open database");
        conn.execute_batch(ddl).expect("apply ddl");
        path
    }
}

pub fn count_rows(db: &Path, table: &str, period: &str) -> i64 {
    let conn = Connection::open(db).expect("open database");
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE period_date = ?1"),
        [period],
        |row| row.get(0),
    )
    .expect("count rows")
}
