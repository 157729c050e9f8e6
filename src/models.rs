use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// One cell as read from an input spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Empty,
}

impl RawValue {
    /// Renders the cell the way it would appear when read as text.
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(value) => value.clone(),
            RawValue::Number(value) if value.fract() == 0.0 => format!("{}", *value as i64),
            RawValue::Number(value) => value.to_string(),
            RawValue::DateTime(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            RawValue::Empty => String::new(),
        }
    }
}

/// A data row with its 1-based row number in the source sheet.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: usize,
    pub cells: Vec<RawValue>,
}

static EMPTY_CELL: RawValue = RawValue::Empty;

impl RawRow {
    pub fn cell(&self, index: usize) -> &RawValue {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }
}

/// A header row plus data rows from a single input file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

/// A row after column resolution, before its timestamp is parsed.
#[derive(Debug, Clone)]
pub struct StagedRow {
    pub line: usize,
    pub raw_time: RawValue,
    pub email: String,
    pub display_name: String,
    pub student_key: String,
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_key: String,
    pub email: String,
    pub display_name: String,
    pub submitted_at: NaiveDateTime,
    pub class_date: NaiveDate,
    pub source_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub detected_time_column: String,
    pub detected_email_column: String,
    pub detected_name_column: String,
    pub identifier_used: String,
    pub columns_in_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentSummary {
    pub student_key: String,
    pub display_name: String,
    pub email: String,
    pub days_present: usize,
    pub total_class_days: usize,
    pub attendance_percent: f64,
    pub last_seen: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAttendance {
    pub student_key: String,
    pub class_date: NaiveDate,
    pub email: String,
    pub display_name: String,
    pub submitted_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayCount {
    pub class_date: NaiveDate,
    pub present_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentStatus {
    pub class_date: NaiveDate,
    pub email: String,
    pub display_name: String,
    pub submitted_at: NaiveDateTime,
    pub days_present: usize,
    pub total_class_days: usize,
    pub attendance_percent: f64,
}

/// Every derived table for one run.
#[derive(Debug, Clone)]
pub struct AttendanceReport {
    pub total_class_days: usize,
    pub student_summary: Vec<StudentSummary>,
    pub daily_attendance: Vec<DailyAttendance>,
    pub per_day_counts: Vec<DayCount>,
    pub most_recent: Vec<DailyAttendance>,
    pub status_report: Vec<StudentStatus>,
}
