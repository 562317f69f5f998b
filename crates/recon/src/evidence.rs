use crate::model::{Classification, ReconSummary, SourceOutcome};

/// Compute summary counts from a classification.
pub fn compute_summary(classification: &Classification) -> ReconSummary {
    let mut summary = ReconSummary {
        unmatched_target: classification.unmatched_targets.len(),
        ..ReconSummary::default()
    };

    for outcome in &classification.sources {
        match outcome {
            SourceOutcome::Matched(_) => summary.matched += 1,
            SourceOutcome::Suspected { candidates } => {
                summary.suspected += 1;
                summary.suspect_candidates += candidates.len();
            }
            SourceOutcome::Unmatched => summary.unmatched_source += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchClassification, MatchType, PairEvidence, Rule};

    fn evidence(target_index: usize) -> PairEvidence {
        PairEvidence {
            target_index,
            hits: 1,
            rule: Rule {
                rule_id: 1,
                rule_name: "r".into(),
                description: String::new(),
                source_field: "a".into(),
                target_field: "b".into(),
                select_if_both_same: true,
                match_classification: MatchClassification::Match,
                match_type: MatchType::Exact,
                rationale_statement: String::new(),
                code_block: None,
            },
            matched_rule_ids: vec![1],
            rationale_statement: String::new(),
        }
    }

    #[test]
    fn summary_counts() {
        let classification = Classification {
            sources: vec![
                SourceOutcome::Matched(evidence(0)),
                SourceOutcome::Matched(evidence(1)),
                SourceOutcome::Suspected {
                    candidates: vec![evidence(2), evidence(3)],
                },
                SourceOutcome::Unmatched,
            ],
            unmatched_targets: vec![4],
        };
        let summary = compute_summary(&classification);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.suspected, 1);
        assert_eq!(summary.suspect_candidates, 2);
        assert_eq!(summary.unmatched_source, 1);
        assert_eq!(summary.unmatched_target, 1);
    }
}
