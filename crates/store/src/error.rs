use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// A stored payload no longer deserializes.
    #[error("corrupt {what}: {message}")]
    Corrupt { what: String, message: String },
    #[error("batch {0} already exists")]
    DuplicateBatch(Uuid),
}

impl StoreError {
    pub(crate) fn corrupt(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// Busy/locked databases and IO failures may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
                    | ErrorCode::DiskFull
            ),
            _ => false,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_transient() {
        let err = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn corrupt_is_not_transient() {
        let err = StoreError::corrupt("batch", "bad json");
        assert!(!err.is_transient());
        assert!(err.is_corrupt());
    }
}
