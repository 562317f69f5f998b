use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{MatchClassification, MatchType, Rule, RuleId};
use crate::predicate::Predicate;

/// Attributes of a rule before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub rule_name: String,
    #[serde(default)]
    pub description: String,
    pub source_field: String,
    pub target_field: String,
    #[serde(default = "default_true")]
    pub select_if_both_same: bool,
    #[serde(default = "default_classification")]
    pub match_classification: MatchClassification,
    #[serde(default = "default_match_type")]
    pub match_type: MatchType,
    #[serde(default)]
    pub rationale_statement: String,
    #[serde(default)]
    pub code_block: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_classification() -> MatchClassification {
    MatchClassification::Match
}

fn default_match_type() -> MatchType {
    MatchType::Exact
}

/// Partial update. `None` leaves a field unchanged; an empty `code_block`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePatch {
    pub rule_name: Option<String>,
    pub description: Option<String>,
    pub source_field: Option<String>,
    pub target_field: Option<String>,
    pub select_if_both_same: Option<bool>,
    pub match_classification: Option<MatchClassification>,
    pub match_type: Option<MatchType>,
    pub rationale_statement: Option<String>,
    pub code_block: Option<String>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        *self == RulePatch::default()
    }

    fn apply(self, rule: &mut Rule) {
        if let Some(v) = self.rule_name {
            rule.rule_name = v;
        }
        if let Some(v) = self.description {
            rule.description = v;
        }
        if let Some(v) = self.source_field {
            rule.source_field = v;
        }
        if let Some(v) = self.target_field {
            rule.target_field = v;
        }
        if let Some(v) = self.select_if_both_same {
            rule.select_if_both_same = v;
        }
        if let Some(v) = self.match_classification {
            rule.match_classification = v;
        }
        if let Some(v) = self.match_type {
            rule.match_type = v;
        }
        if let Some(v) = self.rationale_statement {
            rule.rationale_statement = v;
        }
        if let Some(v) = self.code_block {
            rule.code_block = if v.trim().is_empty() { None } else { Some(v) };
        }
    }
}

/// Ordered, id-stable collection of rules.
///
/// Ids are handed out from a monotonic counter and never reused, even after
/// the highest-numbered rule is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
    next_id: RuleId,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            next_id: 1,
        }
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. `next_id` is raised past any existing id.
    pub fn from_parts(rules: Vec<Rule>, next_id: RuleId) -> Self {
        let floor = rules.iter().map(|r| r.rule_id + 1).max().unwrap_or(1);
        Self {
            rules,
            next_id: next_id.max(floor),
        }
    }

    pub fn next_id(&self) -> RuleId {
        self.next_id
    }

    pub fn create(&mut self, draft: RuleDraft) -> Result<Rule, ReconError> {
        let rule = Rule {
            rule_id: self.next_id,
            rule_name: draft.rule_name.trim().to_string(),
            description: draft.description,
            source_field: draft.source_field.trim().to_string(),
            target_field: draft.target_field.trim().to_string(),
            select_if_both_same: draft.select_if_both_same,
            match_classification: draft.match_classification,
            match_type: draft.match_type,
            rationale_statement: draft.rationale_statement,
            code_block: draft.code_block.filter(|c| !c.trim().is_empty()),
        };
        validate_rule(&rule)?;
        self.next_id += 1;
        self.rules.push(rule.clone());
        log::debug!("created rule {} '{}'", rule.rule_id, rule.rule_name);
        Ok(rule)
    }

    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, rule_id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    pub fn update(&mut self, rule_id: RuleId, patch: RulePatch) -> Result<Rule, ReconError> {
        let slot = self
            .rules
            .iter_mut()
            .find(|r| r.rule_id == rule_id)
            .ok_or(ReconError::RuleNotFound(rule_id))?;
        let mut updated = slot.clone();
        patch.apply(&mut updated);
        updated.rule_name = updated.rule_name.trim().to_string();
        updated.source_field = updated.source_field.trim().to_string();
        updated.target_field = updated.target_field.trim().to_string();
        validate_rule(&updated)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete(&mut self, rule_id: RuleId) -> Result<Rule, ReconError> {
        let pos = self
            .rules
            .iter()
            .position(|r| r.rule_id == rule_id)
            .ok_or(ReconError::RuleNotFound(rule_id))?;
        Ok(self.rules.remove(pos))
    }

    /// Immutable copy handed to a matching run.
    pub fn snapshot(&self) -> Arc<[Rule]> {
        Arc::from(self.rules.as_slice())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn validate_rule(rule: &Rule) -> Result<(), ReconError> {
    let invalid = |reason: &str| ReconError::InvalidRule {
        rule: rule.rule_name.clone(),
        reason: reason.to_string(),
    };
    if rule.rule_name.trim().is_empty() {
        return Err(invalid("rule_name is required"));
    }
    if rule.source_field.trim().is_empty() {
        return Err(invalid("source_field is required"));
    }
    if rule.target_field.trim().is_empty() {
        return Err(invalid("target_field is required"));
    }
    match rule.code() {
        Some(code) => {
            Predicate::compile(code).map_err(|source| ReconError::Predicate {
                rule: rule.rule_name.clone(),
                source,
            })?;
        }
        None if rule.match_type == MatchType::Custom => {
            return Err(invalid("custom match type requires a code_block"));
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> RuleDraft {
        RuleDraft {
            rule_name: name.into(),
            description: String::new(),
            source_field: "email".into(),
            target_field: "email".into(),
            select_if_both_same: true,
            match_classification: MatchClassification::Match,
            match_type: MatchType::Exact,
            rationale_statement: String::new(),
            code_block: None,
        }
    }

    #[test]
    fn ids_are_never_reused() {
        let mut set = RuleSet::new();
        let a = set.create(draft("a")).unwrap();
        let b = set.create(draft("b")).unwrap();
        assert_eq!((a.rule_id, b.rule_id), (1, 2));
        set.delete(b.rule_id).unwrap();
        let c = set.create(draft("c")).unwrap();
        assert_eq!(c.rule_id, 3);
    }

    #[test]
    fn create_validates() {
        let mut set = RuleSet::new();
        assert!(matches!(set.create(draft("  ")), Err(ReconError::InvalidRule { .. })));

        let mut custom = draft("c");
        custom.match_type = MatchType::Custom;
        assert!(matches!(set.create(custom.clone()), Err(ReconError::InvalidRule { .. })));

        custom.code_block = Some("source ==".into());
        assert!(matches!(set.create(custom.clone()), Err(ReconError::Predicate { .. })));

        custom.code_block = Some("lower(source) == lower(target)".into());
        assert!(set.create(custom).is_ok());
        // Failed creates do not burn ids
        assert_eq!(set.list()[0].rule_id, 1);
    }

    #[test]
    fn update_applies_patch_and_keeps_id() {
        let mut set = RuleSet::new();
        let rule = set.create(draft("a")).unwrap();
        let updated = set
            .update(
                rule.rule_id,
                RulePatch {
                    match_type: Some(MatchType::Normalized),
                    rule_name: Some("renamed".into()),
                    ..RulePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.rule_id, rule.rule_id);
        assert_eq!(updated.match_type, MatchType::Normalized);
        assert_eq!(set.get(rule.rule_id).unwrap().rule_name, "renamed");
    }

    #[test]
    fn invalid_update_leaves_rule_untouched() {
        let mut set = RuleSet::new();
        let rule = set.create(draft("a")).unwrap();
        let err = set
            .update(
                rule.rule_id,
                RulePatch {
                    source_field: Some(String::new()),
                    ..RulePatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ReconError::InvalidRule { .. }));
        assert_eq!(set.get(rule.rule_id), Some(&rule));
    }

    #[test]
    fn missing_rule_is_not_found() {
        let mut set = RuleSet::new();
        assert!(matches!(set.delete(9), Err(ReconError::RuleNotFound(9))));
        assert!(matches!(set.update(9, RulePatch::default()), Err(ReconError::RuleNotFound(9))));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut set = RuleSet::new();
        set.create(draft("a")).unwrap();
        let snap = set.snapshot();
        set.delete(1).unwrap();
        assert_eq!(snap.len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn from_parts_raises_counter() {
        let mut set = RuleSet::new();
        set.create(draft("a")).unwrap();
        set.create(draft("b")).unwrap();
        let restored = RuleSet::from_parts(set.list().to_vec(), 1);
        assert_eq!(restored.next_id(), 3);
    }
}
