use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{AttendanceReport, DailyAttendance, FileReport};

pub const STUDENT_SUMMARY: &str = "Student_Summary";
pub const DAILY_ATTENDANCE: &str = "Daily_Attendance";
pub const PER_DAY_COUNTS: &str = "Per_Day_Counts";
pub const MOST_RECENT: &str = "Most_Recent_By_Student";
pub const STATUS_REPORT: &str = "Student_Status_Report";
pub const DIAGNOSTICS: &str = "Diagnostics";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// The value as it is displayed in the workbook.
    pub fn rendered(&self) -> String {
        match self {
            Cell::Text(value) => value.clone(),
            Cell::Number(value) => value.to_string(),
            Cell::Date(value) => value.format("%Y-%m-%d").to_string(),
            Cell::DateTime(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

fn visit_rows(name: &str, rows: &[DailyAttendance]) -> Sheet {
    let mut sheet = Sheet::new(
        name,
        &["ClassDate", "Email", "DisplayName", "SubmissionDateTime_ET"],
    );
    for row in rows {
        sheet.rows.push(vec![
            Cell::Date(row.class_date),
            Cell::from(row.email.as_str()),
            Cell::from(row.display_name.as_str()),
            Cell::DateTime(row.submitted_at),
        ]);
    }
    sheet
}

/// Lays out every output sheet in workbook order.
pub fn build_sheets(report: &AttendanceReport, diagnostics: Option<&[FileReport]>) -> Vec<Sheet> {
    let mut summary = Sheet::new(
        STUDENT_SUMMARY,
        &[
            "DisplayName",
            "Email",
            "DaysPresent",
            "TotalClassDays",
            "AttendancePercent",
            "LastSeen",
        ],
    );
    for student in &report.student_summary {
        summary.rows.push(vec![
            Cell::from(student.display_name.as_str()),
            Cell::from(student.email.as_str()),
            Cell::from(student.days_present),
            Cell::from(student.total_class_days),
            Cell::Number(student.attendance_percent),
            Cell::Date(student.last_seen),
        ]);
    }

    let mut per_day = Sheet::new(PER_DAY_COUNTS, &["ClassDate", "PresentCount"]);
    for day in &report.per_day_counts {
        per_day
            .rows
            .push(vec![Cell::Date(day.class_date), Cell::from(day.present_count)]);
    }

    let mut status = Sheet::new(
        STATUS_REPORT,
        &[
            "ClassDate",
            "Email",
            "DisplayName",
            "SubmissionDateTime_ET",
            "DaysPresent",
            "TotalClassDays",
            "AttendancePercent",
        ],
    );
    for row in &report.status_report {
        status.rows.push(vec![
            Cell::Date(row.class_date),
            Cell::from(row.email.as_str()),
            Cell::from(row.display_name.as_str()),
            Cell::DateTime(row.submitted_at),
            Cell::from(row.days_present),
            Cell::from(row.total_class_days),
            Cell::Number(row.attendance_percent),
        ]);
    }

    let mut sheets = vec![
        summary,
        visit_rows(DAILY_ATTENDANCE, &report.daily_attendance),
        per_day,
        visit_rows(MOST_RECENT, &report.most_recent),
        status,
    ];

    if let Some(files) = diagnostics {
        let mut diag = Sheet::new(
            DIAGNOSTICS,
            &[
                "File",
                "Detected Time Column",
                "Detected Email Column",
                "Detected Name Column",
                "Identifier Used",
                "Columns in File",
            ],
        );
        for file in files {
            diag.rows.push(vec![
                Cell::from(file.file.as_str()),
                Cell::from(file.detected_time_column.as_str()),
                Cell::from(file.detected_email_column.as_str()),
                Cell::from(file.detected_name_column.as_str()),
                Cell::from(file.identifier_used.as_str()),
                Cell::from(file.columns_in_file.as_str()),
            ]);
        }
        sheets.push(diag);
    }

    sheets
}

/// Plain-text table of per-file column detection.
pub fn format_detection(files: &[FileReport]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Detected columns per file:");
    for file in files {
        let _ = writeln!(
            output,
            "- {}: time={}, email={}, name={}, identifier={}",
            file.file,
            file.detected_time_column,
            file.detected_email_column,
            file.detected_name_column,
            file.identifier_used
        );
        let _ = writeln!(output, "  columns: {}", file.columns_in_file);
    }
    output
}

/// Students ranked by recency of last attendance.
pub fn format_status(report: &AttendanceReport, limit: usize) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} students across {} class days",
        report.student_summary.len(),
        report.total_class_days
    );

    if report.status_report.is_empty() {
        let _ = writeln!(output, "No students found.");
        return output;
    }

    let _ = writeln!(output, "Students by last attendance:");
    for row in report.status_report.iter().take(limit) {
        let email = if row.email.is_empty() {
            "no email"
        } else {
            row.email.as_str()
        };
        let _ = writeln!(
            output,
            "- {} ({}) last seen {}: {}/{} days ({:.1}%)",
            row.display_name,
            email,
            row.class_date,
            row.days_present,
            row.total_class_days,
            row.attendance_percent
        );
    }
    output
}
