use std::sync::Arc;

use parking_lot::RwLock;

use crosslink_recon::{Rule, RuleDraft, RuleId, RulePatch, RuleSet};
use crosslink_store::Store;

use crate::error::ServiceError;

/// The live rule set. Every mutation is persisted before it becomes visible;
/// a failed save leaves the previous set in place.
pub struct RuleRegistry {
    rules: RwLock<RuleSet>,
    store: Arc<dyn Store>,
}

impl RuleRegistry {
    pub fn load(store: Arc<dyn Store>) -> Result<Self, ServiceError> {
        let rules = store.load_rules()?.unwrap_or_default();
        log::info!("loaded {} rules (next id {})", rules.len(), rules.next_id());
        Ok(Self {
            rules: RwLock::new(rules),
            store,
        })
    }

    pub fn list(&self) -> Vec<Rule> {
        self.rules.read().list().to_vec()
    }

    pub fn get(&self, rule_id: RuleId) -> Option<Rule> {
        self.rules.read().get(rule_id).cloned()
    }

    /// Frozen copy for a matching run.
    pub fn snapshot(&self) -> Arc<[Rule]> {
        self.rules.read().snapshot()
    }

    pub fn create(&self, draft: RuleDraft) -> Result<Rule, ServiceError> {
        self.mutate(|set| Ok(set.create(draft)?))
    }

    pub fn update(&self, rule_id: RuleId, patch: RulePatch) -> Result<Rule, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::validation(format!("rule {rule_id}: nothing to update")));
        }
        self.mutate(|set| Ok(set.update(rule_id, patch)?))
    }

    pub fn delete(&self, rule_id: RuleId) -> Result<Rule, ServiceError> {
        self.mutate(|set| Ok(set.delete(rule_id)?))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RuleSet) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut guard = self.rules.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.store.save_rules(&next)?;
        *guard = next;
        Ok(out)
    }
}
