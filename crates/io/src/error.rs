use thiserror::Error;

/// Failure turning an uploaded file into a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Extension is neither `.csv` nor `.xlsx`.
    #[error("unsupported file type '{0}': expected .csv or .xlsx")]
    UnsupportedFormat(String),
    #[error("{file}: CSV parse error: {message}")]
    Csv { file: String, message: String },
    #[error("{file}: Excel parse error: {message}")]
    Xlsx { file: String, message: String },
    /// No header row could be found.
    #[error("{0}: file is empty")]
    NoHeader(String),
    /// A header but no data rows.
    #[error("{0}: file has no data rows")]
    NoRows(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure writing an export artifact.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("sheet '{sheet}' row {row}, column '{column}': number is not finite")]
    NonFiniteNumber {
        sheet: String,
        row: usize,
        column: String,
    },
    #[error("sheet '{sheet}' row {row}, column '{column}': text of {len} characters exceeds the Excel cell limit")]
    TextTooLong {
        sheet: String,
        row: usize,
        column: String,
        len: usize,
    },
    #[error("xlsx writer: {0}")]
    Writer(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
