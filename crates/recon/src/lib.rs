//! `crosslink-recon`: Rule-driven record linkage engine.
//!
//! Pure engine crate: receives parsed datasets and a rule snapshot, returns
//! a classification of every source row. No file or network IO.

pub mod batch;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod predicate;
pub mod rationale;
pub mod rules;

pub use batch::{Batch, BatchInput};
pub use config::EngineConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{
    Classification, Dataset, MatchClassification, MatchResult, MatchType, ReconOutput, ReconSummary,
    Row, Rule, RuleId, Side, SourceOutcome, SuspectGroup, UnmatchedSet, Value,
};
pub use predicate::{Predicate, PredicateError};
pub use rules::{RuleDraft, RulePatch, RuleSet};
