use std::path::PathBuf;

use thiserror::Error;

use crosslink_io::{DatasetError, ExportError};
use crosslink_protocol::ErrorKind;
use crosslink_recon::ReconError;
use crosslink_store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input from the caller.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Recon(#[from] ReconError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("config {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An uploaded file could not be read from disk.
    #[error("{path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Writing an export or the config file failed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    /// Boundary classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_)
            | ServiceError::Dataset(_)
            | ServiceError::Config { .. }
            | ServiceError::ConfigRead { .. }
            | ServiceError::Upload { .. } => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Recon(e) => match e {
                ReconError::RuleNotFound(_) => ErrorKind::NotFound,
                ReconError::InvalidRule { .. }
                | ReconError::Predicate { .. }
                | ReconError::ConfigParse(_)
                | ReconError::ConfigValidation(_) => ErrorKind::Validation,
                ReconError::EmptyDataset(_) | ReconError::WorkerPool(_) => ErrorKind::Engine,
            },
            ServiceError::Export(_) | ServiceError::Io { .. } => ErrorKind::Export,
            ServiceError::Store(e) if e.is_transient() => ErrorKind::Transient,
            ServiceError::Store(_) => ErrorKind::Engine,
        }
    }
}
