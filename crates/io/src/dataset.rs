use std::path::Path;

use crosslink_recon::model::{Dataset, Row, Value};

use crate::error::DatasetError;
use crate::format::DatasetFormat;

/// Parse an upload by its file name's extension.
pub fn load_dataset(file_name: &str, bytes: &[u8]) -> Result<Dataset, DatasetError> {
    let format = DatasetFormat::from_file_name(file_name)?;
    let dataset = match format {
        DatasetFormat::Csv => crate::csv::parse_csv(file_name, bytes)?,
        DatasetFormat::Xlsx => crate::xlsx::parse_xlsx(file_name, bytes)?,
    };
    log::info!(
        "loaded {file_name} ({format}): {} rows x {} columns",
        dataset.len(),
        dataset.columns.len()
    );
    Ok(dataset)
}

/// Read and parse a dataset from disk. The dataset is named after the file.
pub fn load_dataset_path(path: &Path) -> Result<Dataset, DatasetError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    DatasetFormat::from_file_name(&file_name)?;
    let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_dataset(&file_name, &bytes)
}

/// Pair a header with raw rows. Blank header cells become `column_N`;
/// repeated names get a numeric suffix so every column stays addressable.
pub(crate) fn build_dataset(
    file_name: &str,
    header: Vec<String>,
    raw_rows: Vec<Vec<Value>>,
) -> Result<Dataset, DatasetError> {
    let columns = dedupe_header(header);

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (line, values) in raw_rows.into_iter().enumerate() {
        if values.len() > columns.len() {
            log::debug!(
                "{file_name}: data row {} has {} values for {} columns; extra values dropped",
                line + 1,
                values.len(),
                columns.len()
            );
        }
        let mut values = values.into_iter();
        let row = Row::from_pairs(
            columns
                .iter()
                .map(|c| (c.clone(), values.next().unwrap_or_default())),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(DatasetError::NoRows(file_name.to_string()));
    }
    Ok(Dataset::new(file_name, columns, rows))
}

fn dedupe_header(header: Vec<String>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(header.len());
    for (i, name) in header.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("column_{}", i + 1)
        } else {
            name.trim().to_string()
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while columns.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        columns.push(candidate);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_dedupe() {
        let cols = dedupe_header(vec!["id".into(), "".into(), "id".into(), "id".into()]);
        assert_eq!(cols, vec!["id", "column_2", "id_2", "id_3"]);
    }

    #[test]
    fn short_rows_pad_with_null() {
        let ds = build_dataset(
            "x.csv",
            vec!["a".into(), "b".into()],
            vec![vec![Value::from("1")]],
        )
        .unwrap();
        assert_eq!(ds.rows[0].value("b"), &Value::Null);
        assert_eq!(ds.rows[0].len(), 2);
    }

    #[test]
    fn unsupported_extension_rejected_before_parse() {
        let err = load_dataset("data.json", b"{}").unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat(_)));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "email\na@x.com\n").unwrap();
        let ds = load_dataset_path(&path).unwrap();
        assert_eq!(ds.name, "people.csv");
        assert_eq!(ds.len(), 1);
    }
}
