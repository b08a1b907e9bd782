//! In-memory xlsx serialization of views, and reading sheets back.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use tracing::{debug, instrument};

use sellerreport_shared::{ReportError, Result};

use crate::sheet::{Series, Table, View, number};

/// Excel's sheet name length limit.
const MAX_SHEET_NAME: usize = 31;

/// Contents of one sheet read back from a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetContents {
    pub name: String,
    pub rows: Vec<Vec<Value>>,
}

/// Serialize `views` into one workbook, one sheet per view, in order.
#[instrument(skip_all, fields(sheets = views.len()))]
pub fn write_workbook(views: &[View]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let mut used_names: Vec<String> = Vec::with_capacity(views.len());

    for view in views {
        let name = unique_sheet_name(view.name(), &used_names);
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name).map_err(xlsx_err)?;

        match view {
            View::Frame(table) => write_frame(sheet, table, &header).map_err(xlsx_err)?,
            View::Series(series) => write_series(sheet, series).map_err(xlsx_err)?,
        }
        debug!(sheet = %name, "wrote sheet");
        used_names.push(name);
    }

    workbook.save_to_buffer().map_err(xlsx_err)
}

fn write_frame(sheet: &mut Worksheet, table: &Table, header: &Format) -> std::result::Result<(), XlsxError> {
    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, header)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            write_cell(sheet, r as u32 + 1, col as u16, value)?;
        }
    }
    Ok(())
}

fn write_series(sheet: &mut Worksheet, series: &Series) -> std::result::Result<(), XlsxError> {
    for (r, (label, value)) in series.entries.iter().enumerate() {
        sheet.write_string(r as u32, 0, label)?;
        write_cell(sheet, r as u32, 1, value)?;
    }
    Ok(())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> std::result::Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(x) => {
                sheet.write_number(row, col, x)?;
            }
            None => {
                sheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
        }
        Value::Array(_) | Value::Object(_) => {
            sheet.write_string(row, col, value.to_string())?;
        }
    }
    Ok(())
}

/// Make `raw` a legal sheet name: no `[]:*?/\`, not blank, at most 31 chars.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let cleaned = if cleaned.is_empty() { "sheet" } else { cleaned };
    cleaned.chars().take(MAX_SHEET_NAME).collect()
}

/// Sanitized name, suffixed when truncation collides with an earlier sheet.
fn unique_sheet_name(raw: &str, used: &[String]) -> String {
    let base = sanitize_sheet_name(raw);
    let taken = |candidate: &str| used.iter().any(|u| u.eq_ignore_ascii_case(candidate));
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| {
            let suffix = format!("~{n}");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            format!("{}{suffix}", base.chars().take(keep).collect::<String>())
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

/// Read every sheet of an xlsx workbook as rows of JSON values.
///
/// Whole-number floats come back as integers, empty cells as `null`.
pub fn read_sheets(bytes: &[u8]) -> Result<Vec<SheetContents>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| ReportError::Workbook(format!("cannot open workbook: {e}")))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ReportError::Workbook(format!("cannot read sheet '{name}': {e}")))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();
        sheets.push(SheetContents { name, rows });
    }
    Ok(sheets)
}

pub(crate) fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => number(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::DateTime(dt) => number(dt.as_f64()),
        Data::Error(e) => Value::String(format!("#{e:?}")),
    }
}

fn xlsx_err(e: XlsxError) -> ReportError {
    ReportError::Workbook(e.to_string())
}
