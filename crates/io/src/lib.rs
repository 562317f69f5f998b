//! `crosslink-io`: Dataset ingestion and batch export.
//!
//! CSV (sniffed delimiter, UTF-8 or Windows-1252) and XLSX in; multi-sheet
//! XLSX or JSON out. Works on byte buffers so callers decide where files live.

pub mod csv;
pub mod dataset;
pub mod error;
pub mod export;
pub mod format;
pub mod xlsx;

pub use dataset::{load_dataset, load_dataset_path};
pub use error::{DatasetError, ExportError};
pub use export::{batch_sheets, write_json, write_workbook, SheetData};
pub use format::DatasetFormat;
