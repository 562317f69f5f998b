use std::fmt;
use std::path::Path;

use crate::error::DatasetError;

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Xlsx,
}

impl DatasetFormat {
    /// Decide by extension, case-insensitively. Anything else is rejected
    /// before any bytes are parsed.
    pub fn from_file_name(file_name: &str) -> Result<Self, DatasetError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xlsx") => Ok(Self::Xlsx),
            _ => Err(DatasetError::UnsupportedFormat(file_name.to_string())),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Xlsx => write!(f, "xlsx"),
        }
    }
}
