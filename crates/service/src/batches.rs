use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crosslink_io::{load_dataset, DatasetFormat};
use crosslink_protocol::{BatchSummary, FilePayload};
use crosslink_recon::{run, Batch, BatchInput, EngineConfig};
use crosslink_store::{BatchHeader, Store};

use crate::error::ServiceError;
use crate::rules::RuleRegistry;

/// An uploaded file: its name (for the extension) and raw bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_payload(payload: &FilePayload) -> Result<Self, ServiceError> {
        let bytes = payload.decode().map_err(|e| {
            ServiceError::validation(format!("{}: invalid base64 content: {e}", payload.file_name))
        })?;
        Ok(Self::new(payload.file_name.clone(), bytes))
    }

    pub fn from_path(path: &Path) -> Result<Self, ServiceError> {
        let bytes = std::fs::read(path).map_err(|source| ServiceError::Upload {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, bytes))
    }
}

/// Parse a batch id from the wire.
pub fn parse_batch_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::validation(format!("invalid batch_id '{raw}'")))
}

pub fn batch_summary(batch: &Batch) -> BatchSummary {
    let summary = batch.summary();
    BatchSummary {
        batch_id: batch.batch_id.to_string(),
        batch_name: batch.batch_name.clone(),
        matched_count: summary.matched,
        suspected_count: summary.suspected,
        unmatched_source_count: summary.unmatched_source,
        unmatched_target_count: summary.unmatched_target,
    }
}

/// Batch lifecycle: ingest, match, persist, read back.
pub struct BatchManager {
    store: Arc<dyn Store>,
    rules: Arc<RuleRegistry>,
    engine: EngineConfig,
}

impl BatchManager {
    pub fn new(store: Arc<dyn Store>, rules: Arc<RuleRegistry>, engine: EngineConfig) -> Self {
        Self { store, rules, engine }
    }

    pub fn create(&self, batch_name: &str, source: Upload, target: Upload) -> Result<Batch, ServiceError> {
        let batch_name = batch_name.trim();
        if batch_name.is_empty() {
            return Err(ServiceError::validation("batch_name is required"));
        }
        // Both extensions are checked before either file is parsed.
        DatasetFormat::from_file_name(&source.file_name)?;
        DatasetFormat::from_file_name(&target.file_name)?;

        let source_dataset = load_dataset(&source.file_name, &source.bytes)?;
        let target_dataset = load_dataset(&target.file_name, &target.bytes)?;

        self.run_and_store(BatchInput {
            batch_name: batch_name.to_string(),
            source_file_name: source.file_name,
            target_file_name: target.file_name,
            source_dataset,
            target_dataset,
            rerun_of: None,
        })
    }

    /// Match a stored batch's datasets again under the current rules. The
    /// original batch is left untouched.
    pub fn rerun(&self, batch_id: Uuid) -> Result<Batch, ServiceError> {
        let original = self.get(batch_id)?;
        self.run_and_store(BatchInput {
            batch_name: original.batch_name,
            source_file_name: original.source_file_name,
            target_file_name: original.target_file_name,
            source_dataset: original.source_dataset,
            target_dataset: original.target_dataset,
            rerun_of: Some(batch_id),
        })
    }

    pub fn get(&self, batch_id: Uuid) -> Result<Batch, ServiceError> {
        self.store
            .get_batch(batch_id)?
            .ok_or_else(|| ServiceError::not_found(format!("batch {batch_id} not found")))
    }

    pub fn list(&self) -> Result<Vec<BatchHeader>, ServiceError> {
        Ok(self.store.list_batches()?)
    }

    fn run_and_store(&self, input: BatchInput) -> Result<Batch, ServiceError> {
        let started = Instant::now();
        let snapshot = self.rules.snapshot();
        let output = run(&self.engine, &snapshot, &input.source_dataset, &input.target_dataset)?;
        let batch = Batch::new(input, &snapshot, output);
        self.store.insert_batch(&batch)?;

        let summary = batch.summary();
        log::info!(
            "batch {} '{}'{}: {} matched, {} suspected, {} / {} unmatched ({} ms)",
            batch.batch_id,
            batch.batch_name,
            batch
                .rerun_of
                .map(|id| format!(" (rerun of {id})"))
                .unwrap_or_default(),
            summary.matched,
            summary.suspected,
            summary.unmatched_source,
            summary.unmatched_target,
            started.elapsed().as_millis()
        );
        Ok(batch)
    }
}
