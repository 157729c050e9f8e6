//! Column resolution for Microsoft Forms and Google Forms exports.
//!
//! Each export is mapped onto the same set of fields: a submission time, an
//! optional email, an optional display name and the student key used for
//! grouping.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::config::ColumnAliases;
use crate::error::AttendanceError;
use crate::models::{AttendanceRecord, FileReport, RawTable, RawValue, StagedRow};

const NOT_FOUND: &str = "NOT FOUND";
const REPORTED_COLUMNS: usize = 12;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %I:%M:%S %p",
    "%Y/%m/%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y"];

/// Trims a name and collapses runs of whitespace to a single space.
pub fn clean_name(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes an identifier (email or name) for matching.
pub fn normalize_key(value: &str) -> String {
    clean_name(value).to_lowercase()
}

fn normalize_email(value: &str) -> String {
    let email = value.trim().to_lowercase();
    if email == "nan" || email == "none" {
        String::new()
    } else {
        email
    }
}

fn find_column(table: &RawTable, candidates: &[String]) -> Option<(usize, String)> {
    candidates.iter().find_map(|candidate| {
        table
            .column_index(candidate)
            .map(|index| (index, candidate.clone()))
    })
}

fn summarize_columns(headers: &[String]) -> String {
    let mut listed = headers
        .iter()
        .take(REPORTED_COLUMNS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if headers.len() > REPORTED_COLUMNS {
        listed.push_str("...");
    }
    listed
}

/// Resolves the columns of one export and builds a student key for every row.
///
/// Fails when the file has no timestamp column, has no email column while
/// name fallback is off, or leaves any row without a usable identifier.
pub fn standardize(
    table: &RawTable,
    aliases: &ColumnAliases,
    allow_name_fallback: bool,
) -> Result<(Vec<StagedRow>, FileReport), AttendanceError> {
    let file = table.source.clone();

    let (time_index, time_column) =
        find_column(table, &aliases.time).ok_or_else(|| AttendanceError::MissingTimestampColumn {
            file: file.clone(),
        })?;
    let email_column = find_column(table, &aliases.email);
    let name_column = find_column(table, &aliases.name);

    let identifier_used = match (&email_column, allow_name_fallback) {
        (Some(_), false) => "Email",
        (Some(_), true) => "Email (fallback to Name if blank)",
        (None, true) => "Name (fallback; no Email column)",
        (None, false) => return Err(AttendanceError::MissingEmailColumn { file }),
    };

    let mut staged = Vec::with_capacity(table.rows.len());
    let mut blank_rows = Vec::new();

    for row in &table.rows {
        let display_name = name_column
            .as_ref()
            .map(|(index, _)| clean_name(&row.cell(*index).as_text()))
            .unwrap_or_default();
        let email = email_column
            .as_ref()
            .map(|(index, _)| normalize_email(&row.cell(*index).as_text()))
            .unwrap_or_default();

        let student_key = match (&email_column, allow_name_fallback) {
            (Some(_), true) if normalize_key(&email).is_empty() => normalize_key(&display_name),
            (Some(_), _) => normalize_key(&email),
            (None, _) => normalize_key(&display_name),
        };

        if student_key.is_empty() {
            blank_rows.push(row.line);
        }

        staged.push(StagedRow {
            line: row.line,
            raw_time: row.cell(time_index).clone(),
            email,
            display_name,
            student_key,
        });
    }

    if !blank_rows.is_empty() {
        return Err(AttendanceError::BlankIdentifier {
            file,
            rows: blank_rows,
        });
    }

    let report = FileReport {
        file,
        detected_time_column: time_column,
        detected_email_column: email_column
            .map(|(_, name)| name)
            .unwrap_or_else(|| NOT_FOUND.to_string()),
        detected_name_column: name_column
            .map(|(_, name)| name)
            .unwrap_or_else(|| NOT_FOUND.to_string()),
        identifier_used: identifier_used.to_string(),
        columns_in_file: summarize_columns(&table.headers),
    };

    debug!(
        file = %report.file,
        time = %report.detected_time_column,
        email = %report.detected_email_column,
        name = %report.detected_name_column,
        "Resolved columns"
    );

    Ok((staged, report))
}

/// Converts an Excel serial date (days since 1899-12-30) to a date-time.
fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn parse_text(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// True for trailing zone tokens such as `EST`, `GMT-5` or `+05:00`.
/// `AM` and `PM` are never zones.
fn is_zone_token(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    if upper == "AM" || upper == "PM" {
        return false;
    }
    if let Some(offset) = upper.strip_prefix("GMT").or_else(|| upper.strip_prefix("UTC")) {
        return offset
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ':'));
    }
    if token.starts_with('+') || token.starts_with('-') {
        return token[1..].chars().all(|c| c.is_ascii_digit() || c == ':');
    }
    (2..=5).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic())
}

/// Parses a submission timestamp cell. Returns `None` for anything that is
/// not recognisably a date, mirroring a coercing parse.
pub fn parse_timestamp(value: &RawValue) -> Option<NaiveDateTime> {
    match value {
        RawValue::DateTime(datetime) => Some(*datetime),
        RawValue::Number(serial) => from_excel_serial(*serial),
        RawValue::Empty => None,
        RawValue::Text(text) => {
            let text = text.trim();
            parse_text(text).or_else(|| {
                let (rest, zone) = text.rsplit_once(' ')?;
                if is_zone_token(zone) {
                    parse_text(rest.trim_end())
                } else {
                    None
                }
            })
        }
    }
}

/// Builds attendance records, dropping rows whose timestamp does not parse.
pub fn to_records(source: &str, rows: Vec<StagedRow>) -> Vec<AttendanceRecord> {
    let mut records = Vec::with_capacity(rows.len());
    let mut dropped = Vec::new();

    for row in rows {
        match parse_timestamp(&row.raw_time) {
            Some(submitted_at) => records.push(AttendanceRecord {
                student_key: row.student_key,
                email: row.email,
                display_name: row.display_name,
                submitted_at,
                class_date: submitted_at.date(),
                source_file: source.to_string(),
            }),
            None => dropped.push(row.line),
        }
    }

    if !dropped.is_empty() {
        warn!(
            file = source,
            rows = ?dropped,
            "Dropped rows with unparseable timestamps"
        );
    }

    records
}
