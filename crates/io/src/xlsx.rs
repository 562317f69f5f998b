// Excel ingestion: first worksheet, first non-empty row is the header.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDateTime, Timelike};

use crosslink_recon::model::{Dataset, Value};

use crate::dataset::build_dataset;
use crate::error::DatasetError;

pub fn parse_xlsx(file_name: &str, bytes: &[u8]) -> Result<Dataset, DatasetError> {
    let xlsx_err = |message: String| DatasetError::Xlsx {
        file: file_name.to_string(),
        message,
    };

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| xlsx_err(e.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DatasetError::NoHeader(file_name.to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| xlsx_err(format!("sheet '{sheet_name}': {e}")))?;

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for row in range.rows() {
        let values: Vec<Value> = row.iter().map(cell_value).collect();
        if values.iter().all(Value::is_null) {
            continue;
        }
        match header {
            None => header = Some(values.iter().map(|v| v.display().trim().to_string()).collect()),
            Some(_) => rows.push(values),
        }
    }

    let header = header.ok_or_else(|| DatasetError::NoHeader(file_name.to_string()))?;
    log::debug!("{file_name}: read sheet '{sheet_name}'");
    build_dataset(file_name, header, rows)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        // Excel strings keep their spelling; no numeric inference
        Data::String(s) => {
            if s.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(s.clone())
            }
        }
        Data::Float(n) => {
            if n.is_finite() {
                Value::Number(*n)
            } else {
                Value::Null
            }
        }
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => Value::Text(e.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Value::Text(format_datetime(ndt)),
            None => Value::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

/// ISO date, with a time part only when it is not midnight.
fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time().num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
