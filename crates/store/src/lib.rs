//! `crosslink-store`: Persistence behind the [`Store`] trait.
//!
//! Batches are written once and never updated. The rule set and the field
//! registry are saved whole on every mutation.

pub mod error;
pub mod memory;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crosslink_protocol::FieldDef;
use crosslink_recon::{Batch, RuleSet};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Listing row for a stored batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHeader {
    pub batch_id: Uuid,
    pub batch_name: String,
    pub created_at: DateTime<Utc>,
    pub rerun_of: Option<Uuid>,
}

impl From<&Batch> for BatchHeader {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.batch_id,
            batch_name: batch.batch_name.clone(),
            created_at: batch.created_at,
            rerun_of: batch.rerun_of,
        }
    }
}

pub trait Store: Send + Sync {
    /// Persist a batch atomically. Fails if the id already exists.
    fn insert_batch(&self, batch: &Batch) -> Result<(), StoreError>;
    fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError>;
    /// Newest first.
    fn list_batches(&self) -> Result<Vec<BatchHeader>, StoreError>;

    /// `None` when no rule set was ever saved.
    fn load_rules(&self) -> Result<Option<RuleSet>, StoreError>;
    fn save_rules(&self, rules: &RuleSet) -> Result<(), StoreError>;

    fn load_fields(&self) -> Result<Vec<FieldDef>, StoreError>;
    fn save_fields(&self, fields: &[FieldDef]) -> Result<(), StoreError>;
}

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite(PathBuf),
}

pub fn open(backend: &StoreBackend) -> Result<Arc<dyn Store>, StoreError> {
    match backend {
        StoreBackend::Memory => {
            log::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite(path) => {
            log::info!("opening store at {}", path.display());
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}
