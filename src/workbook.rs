use std::path::Path;

use anyhow::Context;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};
use tracing::{debug, info};

use crate::report::{Cell, Sheet};

const MIN_WIDTH: usize = 10;
const MAX_WIDTH: usize = 45;
const WIDTH_PADDING: usize = 2;
/// Rows (header included) inspected when sizing a column.
const WIDTH_SAMPLE_ROWS: usize = 200;

/// Width for each column: longest rendered value plus padding, clamped.
pub fn column_widths(sheet: &Sheet) -> Vec<usize> {
    (0..sheet.headers.len())
        .map(|col| {
            let header = std::iter::once(sheet.headers[col].chars().count());
            let values = sheet
                .rows
                .iter()
                .take(WIDTH_SAMPLE_ROWS.saturating_sub(1))
                .filter_map(|row| row.get(col))
                .map(|cell| cell.rendered().chars().count());
            let longest = header.chain(values).max().unwrap_or(0);
            (longest + WIDTH_PADDING).clamp(MIN_WIDTH, MAX_WIDTH)
        })
        .collect()
}

struct Formats {
    header: Format,
    date: Format,
    datetime: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap(),
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, formats: &Formats) -> anyhow::Result<()> {
    worksheet.set_name(&sheet.name)?;

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &formats.header)?;
    }

    for (index, row) in sheet.rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(value) if value.is_empty() => {}
                Cell::Text(value) => {
                    worksheet.write_string(row_num, col, value)?;
                }
                Cell::Number(value) => {
                    worksheet.write_number(row_num, col, *value)?;
                }
                Cell::Date(value) => {
                    worksheet.write_datetime_with_format(row_num, col, value, &formats.date)?;
                }
                Cell::DateTime(value) => {
                    worksheet.write_datetime_with_format(
                        row_num,
                        col,
                        value,
                        &formats.datetime,
                    )?;
                }
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    for (col, width) in column_widths(sheet).into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width as f64)?;
    }

    debug!(sheet = %sheet.name, rows = sheet.rows.len(), "Wrote sheet");
    Ok(())
}

/// Writes the sheets, in order, to a new `.xlsx` file at `path`.
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet, &formats)
            .with_context(|| format!("failed to write sheet {}", sheet.name))?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to save workbook {}", path.display()))?;
    info!(path = %path.display(), sheets = sheets.len(), "Saved workbook");
    Ok(())
}
