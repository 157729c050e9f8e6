use std::path::Path;

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::error::AttendanceError;
use crate::models::{RawRow, RawTable, RawValue};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Reads the first sheet of a spreadsheet or a CSV export into a [`RawTable`].
pub fn load_table(path: &Path) -> anyhow::Result<RawTable> {
    let source = display_name(path);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = if extension == "csv" {
        read_csv(path, &source)?
    } else if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        read_spreadsheet(path, &source)?
    } else {
        return Err(AttendanceError::UnsupportedFormat { file: source }.into());
    };

    info!(
        file = %table.source,
        columns = table.headers.len(),
        rows = table.rows.len(),
        "Loaded attendance export"
    );
    Ok(table)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_spreadsheet(path: &Path, source: &str) -> anyhow::Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AttendanceError::EmptyFile {
            file: source.to_string(),
        })?
        .with_context(|| format!("failed to read first sheet of {}", path.display()))?;

    // calamine trims leading blank rows, so the first non-empty row is the
    // header. Row numbers stay as a spreadsheet user would see them.
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| AttendanceError::EmptyFile {
        file: source.to_string(),
    })?;
    let headers = header
        .iter()
        .map(|cell| clean_header(&convert_cell(cell).as_text()))
        .collect();

    let rows = rows
        .enumerate()
        .map(|(offset, cells)| RawRow {
            line: first_line + offset + 1,
            cells: cells.iter().map(convert_cell).collect(),
        })
        .filter(|row| !is_blank(row))
        .collect();

    Ok(RawTable {
        source: source.to_string(),
        headers,
        rows,
    })
}

fn convert_cell(cell: &Data) -> RawValue {
    match cell {
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            if value.trim().is_empty() {
                RawValue::Empty
            } else {
                RawValue::Text(value.clone())
            }
        }
        Data::Float(value) => RawValue::Number(*value),
        Data::Int(value) => RawValue::Number(*value as f64),
        Data::Bool(value) => RawValue::Text(value.to_string()),
        Data::DateTime(value) => match value.as_datetime() {
            Some(datetime) => RawValue::DateTime(datetime),
            None => RawValue::Number(value.as_f64()),
        },
        Data::Error(error) => {
            debug!(?error, "Treating error cell as empty");
            RawValue::Empty
        }
        Data::Empty => RawValue::Empty,
    }
}

fn read_csv(path: &Path, source: &str) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CSV {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read CSV header of {}", path.display()))?
        .iter()
        .map(clean_header)
        .collect();
    if headers.iter().all(|header| header.is_empty()) {
        return Err(AttendanceError::EmptyFile {
            file: source.to_string(),
        }
        .into());
    }

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("malformed CSV record in {}", path.display()))?;
        let line = record
            .position()
            .map(|position| position.line() as usize)
            .unwrap_or(offset + 2);
        let row = RawRow {
            line,
            cells: record
                .iter()
                .map(|value| {
                    if value.trim().is_empty() {
                        RawValue::Empty
                    } else {
                        RawValue::Text(value.to_string())
                    }
                })
                .collect(),
        };
        if !is_blank(&row) {
            rows.push(row);
        }
    }

    Ok(RawTable {
        source: source.to_string(),
        headers,
        rows,
    })
}

fn clean_header(value: &str) -> String {
    value.trim_start_matches('\u{feff}').trim().to_string()
}

fn is_blank(row: &RawRow) -> bool {
    row.cells.iter().all(|cell| *cell == RawValue::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_xlsxwriter::{Format, Workbook};

    fn write_forms_export(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let submitted = NaiveDate::from_ymd_opt(2024, 9, 3)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();

        sheet.write_string(0, 0, "ID").unwrap();
        sheet.write_string(0, 1, " Start time ").unwrap();
        sheet.write_string(0, 2, "Email").unwrap();
        sheet.write_string(0, 3, "Name").unwrap();
        sheet.write_number(1, 0, 1.0).unwrap();
        sheet
            .write_datetime_with_format(1, 1, &submitted, &datetime_format)
            .unwrap();
        sheet.write_string(1, 2, "Avery.Lee@School.org").unwrap();
        sheet.write_string(1, 3, "Avery Lee").unwrap();
        sheet.write_number(3, 0, 2.0).unwrap();
        sheet.write_string(3, 1, "9/4/2024 10:00").unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn reads_first_sheet_with_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("microsoft.xlsx");
        write_forms_export(&path);

        let table = load_table(&path).unwrap();
        assert_eq!(table.source, "microsoft.xlsx");
        assert_eq!(table.headers, vec!["ID", "Start time", "Email", "Name"]);
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.cell(0), &RawValue::Number(1.0));
        let expected = NaiveDate::from_ymd_opt(2024, 9, 3)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        assert_eq!(first.cell(1), &RawValue::DateTime(expected));
        assert_eq!(
            first.cell(2),
            &RawValue::Text("Avery.Lee@School.org".to_string())
        );

        // Blank row 3 is skipped but numbering is kept.
        let second = &table.rows[1];
        assert_eq!(second.line, 4);
        assert_eq!(second.cell(2), &RawValue::Empty);
        assert_eq!(second.cell(9), &RawValue::Empty);
    }

    #[test]
    fn reads_csv_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google.csv");
        std::fs::write(
            &path,
            "\u{feff}Timestamp,Email Address,Full Name\n\
             2024/09/03 9:05:12 AM EST,kiara@school.org,Kiara Patel\n\
             ,,\n\
             2024/09/04 9:01:00 AM EST,jules@school.org\n",
        )
        .unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Timestamp", "Email Address", "Full Name"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(
            table.rows[0].cell(2),
            &RawValue::Text("Kiara Patel".to_string())
        );
        assert_eq!(table.rows[1].line, 4);
        assert_eq!(table.rows[1].cell(2), &RawValue::Empty);
    }

    #[test]
    fn csv_lines_follow_multiline_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("google.csv");
        std::fs::write(
            &path,
            "Timestamp,Email Address,Comments\n\
             2024/09/03 9:05:12 AM EST,kiara@school.org,\"late bus\nsorry\"\n\
             2024/09/04 9:01:00 AM EST,,\n",
        )
        .unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(
            table.rows[0].cell(2),
            &RawValue::Text("late bus\nsorry".to_string())
        );
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn leading_blank_rows_are_skipped_before_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(2, 0, "Start time").unwrap();
        sheet.write_string(2, 1, "Email").unwrap();
        sheet.write_string(3, 0, "2024-09-03 09:00").unwrap();
        sheet.write_string(3, 1, "avery@school.org").unwrap();
        workbook.save(&path).unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Start time", "Email"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].line, 4);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.txt");
        std::fs::write(&path, "Timestamp\n").unwrap();

        let err = load_table(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AttendanceError>(),
            Some(AttendanceError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn empty_csv_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        let err = load_table(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AttendanceError>(),
            Some(AttendanceError::EmptyFile { .. })
        ));
    }
}
