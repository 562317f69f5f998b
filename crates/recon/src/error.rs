use thiserror::Error;

use crate::model::Side;
use crate::predicate::PredicateError;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (threshold ordering, bad tolerance, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A rule failed validation on create/update.
    #[error("rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },
    /// A rule's code block does not compile.
    #[error("rule '{rule}': code block rejected: {source}")]
    Predicate {
        rule: String,
        #[source]
        source: PredicateError,
    },
    /// No rule with this id exists in the rule set.
    #[error("rule {0} not found")]
    RuleNotFound(u64),
    /// A dataset handed to the engine has no rows.
    #[error("{0} dataset has no rows")]
    EmptyDataset(Side),
    /// The scoring pool could not be built.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}
