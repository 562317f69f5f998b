use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::model::{Dataset, MatchClassification, MatchType, Row, Rule, RuleId, Value};
use crate::predicate::{Predicate, PredicateError};

/// Trim, lowercase and collapse inner whitespace.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Check {
    Builtin(MatchType),
    Predicate(Predicate),
    /// Evaluating always fails (bad code block, custom without code).
    Broken(String),
}

/// A rule that takes part in scoring.
#[derive(Debug)]
pub struct PlannedRule {
    pub rule: Rule,
    check: Check,
}

/// Outcome of one rule on one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Hit,
    Miss,
    Failed(String),
}

/// The scoring-ready view of a rule snapshot.
#[derive(Debug, Default)]
pub struct MatchPlan {
    /// MATCH rules in rule-set order.
    pub rules: Vec<PlannedRule>,
    pub shadowed: Vec<RuleId>,
    pub inert: Vec<RuleId>,
    /// IGNORE rules that claimed their field pair.
    pub ignored: Vec<RuleId>,
}

impl MatchPlan {
    /// Resolve rules in order. The first rule on a (source_field, target_field)
    /// pair owns it; later rules on the same pair are shadowed.
    pub fn build(rules: &[Rule], source: &Dataset, target: &Dataset) -> Self {
        let mut plan = MatchPlan::default();
        let mut claimed: HashSet<(&str, &str)> = HashSet::new();

        for rule in rules {
            if !source.has_column(&rule.source_field) || !target.has_column(&rule.target_field) {
                log::debug!(
                    "rule {} ('{}') is inert: field missing ({} -> {})",
                    rule.rule_id,
                    rule.rule_name,
                    rule.source_field,
                    rule.target_field
                );
                plan.inert.push(rule.rule_id);
                continue;
            }
            if !claimed.insert((rule.source_field.as_str(), rule.target_field.as_str())) {
                plan.shadowed.push(rule.rule_id);
                continue;
            }
            if rule.match_classification == MatchClassification::Ignore {
                plan.ignored.push(rule.rule_id);
                continue;
            }

            let check = match rule.code() {
                Some(code) => match Predicate::compile(code) {
                    Ok(p) => Check::Predicate(p),
                    Err(e) => {
                        log::warn!("rule {} code block does not compile: {e}", rule.rule_id);
                        Check::Broken(compile_failure(&e))
                    }
                },
                None if rule.match_type == MatchType::Custom => {
                    Check::Broken("custom rule has no code block".to_string())
                }
                None => Check::Builtin(rule.match_type),
            };
            plan.rules.push(PlannedRule {
                rule: rule.clone(),
                check,
            });
        }

        plan
    }

    pub fn active_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|p| p.rule.rule_id).collect()
    }
}

fn compile_failure(e: &PredicateError) -> String {
    format!("code block rejected: {e}")
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

impl PlannedRule {
    pub fn evaluate(&self, source: &Row, target: &Row, config: &EngineConfig) -> Signal {
        let s = source.value(&self.rule.source_field);
        let t = target.value(&self.rule.target_field);
        match &self.check {
            Check::Predicate(p) => match p.eval(s, t) {
                Ok(true) => Signal::Hit,
                Ok(false) => Signal::Miss,
                Err(e) => Signal::Failed(e.to_string()),
            },
            Check::Broken(reason) => Signal::Failed(reason.clone()),
            Check::Builtin(match_type) => {
                if !self.rule.select_if_both_same || s.is_null() || t.is_null() {
                    return Signal::Miss;
                }
                if builtin_hit(*match_type, s, t, config) {
                    Signal::Hit
                } else {
                    Signal::Miss
                }
            }
        }
    }
}

fn builtin_hit(match_type: MatchType, s: &Value, t: &Value, config: &EngineConfig) -> bool {
    match match_type {
        MatchType::Exact => s.same_as(t),
        MatchType::Normalized => {
            let a = normalize_text(&s.display());
            !a.is_empty() && a == normalize_text(&t.display())
        }
        MatchType::Fuzzy => {
            let a = normalize_text(&s.display());
            let b = normalize_text(&t.display());
            !a.is_empty() && strsim::jaro_winkler(&a, &b) >= config.fuzzy.threshold
        }
        MatchType::Numeric => match (s.as_number(), t.as_number()) {
            (Some(a), Some(b)) => (a - b).abs() <= config.numeric_tolerance,
            _ => false,
        },
        // Planned as Broken when no code block is present
        MatchType::Custom => false,
    }
}
