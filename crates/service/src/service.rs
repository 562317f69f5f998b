use std::path::PathBuf;
use std::sync::Arc;

use chrono::SecondsFormat;

use crosslink_protocol::{
    BatchListing, BatchResults, BatchSummary, ExportFormat, ExportInfo, FieldDef, FieldDraft,
    FieldOptions,
};
use crosslink_recon::{EngineConfig, Rule, RuleDraft, RuleId, RulePatch};
use crosslink_store::Store;

use crate::batches::{batch_summary, parse_batch_id, BatchManager, Upload};
use crate::error::ServiceError;
use crate::export::Exporter;
use crate::fields::FieldRegistry;
use crate::rules::RuleRegistry;
use crate::settings::Settings;

/// Every boundary operation over one store. Shared across server threads.
pub struct LinkService {
    batches: BatchManager,
    rules: Arc<RuleRegistry>,
    fields: FieldRegistry,
    exporter: Exporter,
}

impl LinkService {
    pub fn open(settings: &Settings) -> Result<Self, ServiceError> {
        let store = crosslink_store::open(&settings.store_backend())?;
        Self::with_store(store, settings.engine.clone(), settings.export_dir())
    }

    pub fn with_store(
        store: Arc<dyn Store>,
        engine: EngineConfig,
        export_dir: impl Into<PathBuf>,
    ) -> Result<Self, ServiceError> {
        engine.validate()?;
        let rules = Arc::new(RuleRegistry::load(Arc::clone(&store))?);
        let fields = FieldRegistry::load(Arc::clone(&store))?;
        Ok(Self {
            batches: BatchManager::new(store, Arc::clone(&rules), engine),
            rules,
            fields,
            exporter: Exporter::new(export_dir),
        })
    }

    // -- Batches --------------------------------------------------------------

    pub fn list_batches(&self) -> Result<Vec<BatchListing>, ServiceError> {
        Ok(self
            .batches
            .list()?
            .into_iter()
            .map(|h| BatchListing {
                batch_id: h.batch_id.to_string(),
                batch_name: h.batch_name,
                created_at: h.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                rerun_of: h.rerun_of.map(|id| id.to_string()),
            })
            .collect())
    }

    pub fn create_batch(
        &self,
        batch_name: &str,
        source: Upload,
        target: Upload,
    ) -> Result<BatchSummary, ServiceError> {
        let batch = self.batches.create(batch_name, source, target)?;
        Ok(batch_summary(&batch))
    }

    pub fn batch_results(&self, batch_id: &str) -> Result<BatchResults, ServiceError> {
        let batch = self.batches.get(parse_batch_id(batch_id)?)?;
        let unmatched = batch.unmatched();
        Ok(BatchResults {
            matched: batch.matched(),
            suspected: batch.suspected(),
            unmatched_source: unmatched.unmatched_source,
            unmatched_target: unmatched.unmatched_target,
        })
    }

    pub fn rerun_batch(&self, batch_id: &str) -> Result<BatchSummary, ServiceError> {
        let batch = self.batches.rerun(parse_batch_id(batch_id)?)?;
        Ok(batch_summary(&batch))
    }

    pub fn export_batch(&self, batch_id: &str, format: ExportFormat) -> Result<ExportInfo, ServiceError> {
        let batch = self.batches.get(parse_batch_id(batch_id)?)?;
        self.exporter.export(&batch, format)
    }

    // -- Fields ---------------------------------------------------------------

    pub fn list_fields(&self) -> Vec<FieldDef> {
        self.fields.list()
    }

    pub fn configure_field(&self, draft: FieldDraft) -> Result<Vec<FieldDef>, ServiceError> {
        self.fields.configure(draft)
    }

    pub fn edit_field(&self, field: FieldDef) -> Result<Vec<FieldDef>, ServiceError> {
        self.fields.edit(field)
    }

    pub fn delete_field(&self, field_name: &str) -> Result<Vec<FieldDef>, ServiceError> {
        self.fields.delete(field_name)
    }

    pub fn field_options(&self) -> FieldOptions {
        self.fields.options()
    }

    // -- Rules ----------------------------------------------------------------

    pub fn list_rules(&self) -> Vec<Rule> {
        self.rules.list()
    }

    pub fn create_rule(&self, draft: RuleDraft) -> Result<Vec<Rule>, ServiceError> {
        self.rules.create(draft)?;
        Ok(self.rules.list())
    }

    pub fn update_rule(&self, rule_id: RuleId, patch: RulePatch) -> Result<Vec<Rule>, ServiceError> {
        self.rules.update(rule_id, patch)?;
        Ok(self.rules.list())
    }

    pub fn delete_rule(&self, rule_id: RuleId) -> Result<Vec<Rule>, ServiceError> {
        self.rules.delete(rule_id)?;
        Ok(self.rules.list())
    }
}
