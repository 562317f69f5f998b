use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Engine config
// ---------------------------------------------------------------------------

/// Tuning for a matching run. Lives under `[engine]` in `crosslink.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub fuzzy: FuzzyConfig,
    /// Absolute difference accepted by `numeric` rules.
    pub numeric_tolerance: f64,
    /// Scoring threads. `None` uses available parallelism.
    pub workers: Option<usize>,
    /// Cap on candidates kept per suspect group.
    pub max_suspect_targets: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            fuzzy: FuzzyConfig::default(),
            numeric_tolerance: 0.0,
            workers: None,
            max_suspect_targets: 25,
        }
    }
}

/// Hit-count thresholds.
///
/// A target becomes a candidate at `suspect_min_hits`. A unique top candidate
/// at or above `definite_min_hits` is a definite match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub suspect_min_hits: usize,
    pub definite_min_hits: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspect_min_hits: 1,
            definite_min_hits: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Jaro-Winkler similarity in (0, 1].
    pub threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self { threshold: 0.9 }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.thresholds;
        if t.suspect_min_hits < 1 {
            return Err(ReconError::ConfigValidation(
                "thresholds.suspect_min_hits must be at least 1".into(),
            ));
        }
        if t.suspect_min_hits > t.definite_min_hits {
            return Err(ReconError::ConfigValidation(format!(
                "thresholds.suspect_min_hits ({}) exceeds definite_min_hits ({})",
                t.suspect_min_hits, t.definite_min_hits
            )));
        }

        if !(self.fuzzy.threshold > 0.0 && self.fuzzy.threshold <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "fuzzy.threshold must be in (0, 1], got {}",
                self.fuzzy.threshold
            )));
        }

        if !self.numeric_tolerance.is_finite() || self.numeric_tolerance < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "numeric_tolerance must be a non-negative number, got {}",
                self.numeric_tolerance
            )));
        }

        if self.workers == Some(0) {
            return Err(ReconError::ConfigValidation("workers must be at least 1".into()));
        }

        if self.max_suspect_targets == 0 {
            return Err(ReconError::ConfigValidation(
                "max_suspect_targets must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
