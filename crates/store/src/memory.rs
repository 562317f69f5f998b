use parking_lot::RwLock;
use uuid::Uuid;

use crosslink_protocol::FieldDef;
use crosslink_recon::{Batch, RuleSet};

use crate::{BatchHeader, Store, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order; listing reverses it.
    batches: Vec<Batch>,
    rules: Option<RuleSet>,
    fields: Vec<FieldDef>,
}

/// Process-local store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.batches.iter().any(|b| b.batch_id == batch.batch_id) {
            return Err(StoreError::DuplicateBatch(batch.batch_id));
        }
        state.batches.push(batch.clone());
        Ok(())
    }

    fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        let state = self.state.read();
        Ok(state.batches.iter().find(|b| b.batch_id == batch_id).cloned())
    }

    fn list_batches(&self) -> Result<Vec<BatchHeader>, StoreError> {
        let state = self.state.read();
        let mut headers: Vec<BatchHeader> = state.batches.iter().rev().map(BatchHeader::from).collect();
        // Stable: equal timestamps keep newest-inserted first
        headers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(headers)
    }

    fn load_rules(&self) -> Result<Option<RuleSet>, StoreError> {
        Ok(self.state.read().rules.clone())
    }

    fn save_rules(&self, rules: &RuleSet) -> Result<(), StoreError> {
        self.state.write().rules = Some(rules.clone());
        Ok(())
    }

    fn load_fields(&self) -> Result<Vec<FieldDef>, StoreError> {
        Ok(self.state.read().fields.clone())
    }

    fn save_fields(&self, fields: &[FieldDef]) -> Result<(), StoreError> {
        self.state.write().fields = fields.to_vec();
        Ok(())
    }
}
