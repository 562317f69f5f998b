use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::compute_summary;
use crate::model::{
    Classification, Dataset, MatchResult, ReconOutput, ReconSummary, Rule, RunDiagnostics,
    SuspectGroup, UnmatchedSet,
};

/// One upload (or rerun) and its frozen results. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: Uuid,
    pub batch_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub rerun_of: Option<Uuid>,
    pub source_file_name: String,
    pub target_file_name: String,
    pub source_dataset: Dataset,
    pub target_dataset: Dataset,
    /// Rule snapshot the run used.
    pub rules: Vec<Rule>,
    pub outcome: Classification,
    #[serde(default)]
    pub diagnostics: RunDiagnostics,
}

/// Everything needed to build a batch besides the engine output.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub batch_name: String,
    pub source_file_name: String,
    pub target_file_name: String,
    pub source_dataset: Dataset,
    pub target_dataset: Dataset,
    pub rerun_of: Option<Uuid>,
}

impl Batch {
    pub fn new(input: BatchInput, rules: &[Rule], output: ReconOutput) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            batch_name: input.batch_name,
            created_at: Utc::now(),
            rerun_of: input.rerun_of,
            source_file_name: input.source_file_name,
            target_file_name: input.target_file_name,
            source_dataset: input.source_dataset,
            target_dataset: input.target_dataset,
            rules: rules.to_vec(),
            outcome: output.classification,
            diagnostics: output.diagnostics,
        }
    }

    pub fn matched(&self) -> Vec<MatchResult> {
        self.outcome.matched(&self.source_dataset, &self.target_dataset)
    }

    pub fn suspected(&self) -> Vec<SuspectGroup> {
        self.outcome.suspected(&self.source_dataset, &self.target_dataset)
    }

    pub fn unmatched(&self) -> UnmatchedSet {
        self.outcome.unmatched(&self.source_dataset, &self.target_dataset)
    }

    pub fn summary(&self) -> ReconSummary {
        compute_summary(&self.outcome)
    }
}
