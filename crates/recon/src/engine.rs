use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;

use crate::classify::{finalize, propose, Candidate, Resolved};
use crate::config::EngineConfig;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::matcher::{MatchPlan, Signal};
use crate::model::{
    Classification, Dataset, PairEvidence, ReconOutput, Row, Rule, RunDiagnostics, Side, SourceOutcome,
};
use crate::rationale::{render, RationaleContext};

/// Scores for one source row.
struct RowScore {
    candidates: Vec<Candidate>,
    /// plan index → (failure count, first failure message)
    failures: BTreeMap<usize, (usize, String)>,
}

/// Run the matcher over two datasets with a frozen rule snapshot.
pub fn run(
    config: &EngineConfig,
    rules: &[Rule],
    source: &Dataset,
    target: &Dataset,
) -> Result<ReconOutput, ReconError> {
    config.validate()?;
    if source.is_empty() {
        return Err(ReconError::EmptyDataset(Side::Source));
    }
    if target.is_empty() {
        return Err(ReconError::EmptyDataset(Side::Target));
    }

    let started = Instant::now();
    let plan = MatchPlan::build(rules, source, target);
    log::info!(
        "matching {} source x {} target rows with {} active rules ({} shadowed, {} inert)",
        source.len(),
        target.len(),
        plan.rules.len(),
        plan.shadowed.len(),
        plan.inert.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.unwrap_or(0))
        .build()
        .map_err(|e| ReconError::WorkerPool(e.to_string()))?;

    let scores: Vec<RowScore> = pool.install(|| {
        source
            .rows
            .par_iter()
            .map(|row| score_row(&plan, row, target, config))
            .collect()
    });

    // Merge failures in source order so the first message is deterministic
    let mut failures: BTreeMap<usize, (usize, String)> = BTreeMap::new();
    let mut proposals = Vec::with_capacity(scores.len());
    for score in scores {
        for (idx, (count, msg)) in score.failures {
            let entry = failures.entry(idx).or_insert((0, msg));
            entry.0 += count;
        }
        proposals.push(propose(score.candidates, &config.thresholds, config.max_suspect_targets));
    }
    for (idx, (count, msg)) in &failures {
        log::warn!(
            "rule {} failed on {count} pair(s); first failure: {msg}",
            plan.rules[*idx].rule.rule_id
        );
    }

    let finalized = finalize(proposals, target.len());
    if finalized.ambiguous_demotions > 0 {
        log::debug!(
            "{} source row(s) demoted to suspected over shared targets",
            finalized.ambiguous_demotions
        );
    }

    let evidence = |source_index: usize, c: Candidate| -> PairEvidence {
        let winner = &plan.rules[c.hit_rules[0]].rule;
        let rationale = render(&RationaleContext {
            rule: winner,
            source: &source.rows[source_index],
            target: &target.rows[c.target_index],
            hits: c.hits,
        });
        PairEvidence {
            target_index: c.target_index,
            hits: c.hits,
            rule: winner.clone(),
            matched_rule_ids: c.hit_rules.iter().map(|&i| plan.rules[i].rule.rule_id).collect(),
            rationale_statement: rationale,
        }
    };

    let sources = finalized
        .sources
        .into_iter()
        .enumerate()
        .map(|(i, resolved)| match resolved {
            Resolved::Matched(c) => SourceOutcome::Matched(evidence(i, c)),
            Resolved::Suspected(cands) => SourceOutcome::Suspected {
                candidates: cands.into_iter().map(|c| evidence(i, c)).collect(),
            },
            Resolved::Unmatched => SourceOutcome::Unmatched,
        })
        .collect();

    let classification = Classification {
        sources,
        unmatched_targets: finalized.unmatched_targets,
    };
    let summary = compute_summary(&classification);
    let duration_ms = started.elapsed().as_millis() as u64;

    log::info!(
        "matched={} suspected={} unmatched_source={} unmatched_target={} in {duration_ms}ms",
        summary.matched,
        summary.suspected,
        summary.unmatched_source,
        summary.unmatched_target
    );

    let diagnostics = RunDiagnostics {
        active_rules: plan.active_ids(),
        shadowed_rules: plan.shadowed.clone(),
        inert_rules: plan.inert.clone(),
        ignored_rules: plan.ignored.clone(),
        rule_failures: failures
            .into_iter()
            .map(|(idx, (count, _))| (plan.rules[idx].rule.rule_id, count))
            .collect(),
        ambiguous_demotions: finalized.ambiguous_demotions,
        pairs_evaluated: (source.len() as u64) * (target.len() as u64),
        duration_ms,
    };

    Ok(ReconOutput {
        classification,
        summary,
        diagnostics,
    })
}

fn score_row(
    plan: &MatchPlan,
    row: &Row,
    target: &Dataset,
    config: &EngineConfig,
) -> RowScore {
    let mut candidates = Vec::new();
    let mut failures: BTreeMap<usize, (usize, String)> = BTreeMap::new();

    for (target_index, target_row) in target.rows.iter().enumerate() {
        let mut hit_rules = Vec::new();
        for (idx, planned) in plan.rules.iter().enumerate() {
            match planned.evaluate(row, target_row, config) {
                Signal::Hit => hit_rules.push(idx),
                Signal::Miss => {}
                Signal::Failed(msg) => {
                    let entry = failures.entry(idx).or_insert((0, msg));
                    entry.0 += 1;
                }
            }
        }
        if hit_rules.len() >= config.thresholds.suspect_min_hits {
            candidates.push(Candidate {
                target_index,
                hits: hit_rules.len(),
                hit_rules,
            });
        }
    }

    RowScore {
        candidates,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchClassification, MatchType, Value};

    fn email_rule() -> Rule {
        Rule {
            rule_id: 1,
            rule_name: "Email".into(),
            description: String::new(),
            source_field: "email".into(),
            target_field: "email".into(),
            select_if_both_same: true,
            match_classification: MatchClassification::Match,
            match_type: MatchType::Exact,
            rationale_statement: "Email {source_value} matches".into(),
            code_block: None,
        }
    }

    fn emails(name: &str, values: &[&str]) -> Dataset {
        Dataset::new(
            name,
            vec!["email".into()],
            values
                .iter()
                .map(|v| Row::from_pairs([("email", Value::from(*v))]))
                .collect(),
        )
    }

    #[test]
    fn rejects_empty_datasets() {
        let err = run(&EngineConfig::default(), &[email_rule()], &emails("s", &[]), &emails("t", &["a"]))
            .unwrap_err();
        assert!(matches!(err, ReconError::EmptyDataset(Side::Source)));
        let err = run(&EngineConfig::default(), &[email_rule()], &emails("s", &["a"]), &emails("t", &[]))
            .unwrap_err();
        assert!(matches!(err, ReconError::EmptyDataset(Side::Target)));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig {
            max_suspect_targets: 0,
            ..EngineConfig::default()
        };
        let err = run(&config, &[email_rule()], &emails("s", &["a"]), &emails("t", &["a"])).unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }

    #[test]
    fn match_carries_rationale_and_rule_ids() {
        let out = run(
            &EngineConfig::default(),
            &[email_rule()],
            &emails("s", &["a@x.com"]),
            &emails("t", &["a@x.com", "b@x.com"]),
        )
        .unwrap();
        match &out.classification.sources[0] {
            SourceOutcome::Matched(ev) => {
                assert_eq!(ev.target_index, 0);
                assert_eq!(ev.matched_rule_ids, vec![1]);
                assert_eq!(ev.rationale_statement, "Email a@x.com matches");
            }
            other => panic!("expected match, got {other:?}"),
        }
        assert_eq!(out.classification.unmatched_targets, vec![1]);
        assert_eq!(out.diagnostics.pairs_evaluated, 2);
    }

    #[test]
    fn broken_code_block_is_counted_not_fatal() {
        let mut rule = email_rule();
        rule.match_type = MatchType::Custom;
        rule.code_block = Some("lower(source)".into());
        let out = run(
            &EngineConfig::default(),
            &[rule],
            &emails("s", &["a"]),
            &emails("t", &["a", "b"]),
        )
        .unwrap();
        assert_eq!(out.summary.unmatched_source, 1);
        assert_eq!(out.diagnostics.rule_failures.get(&1), Some(&2));
    }

    #[test]
    fn single_worker_matches_default_pool() {
        let s = emails("s", &["a", "b", "c", "a"]);
        let t = emails("t", &["c", "a", "b"]);
        let one = EngineConfig {
            workers: Some(1),
            ..EngineConfig::default()
        };
        let a = run(&one, &[email_rule()], &s, &t).unwrap();
        let b = run(&EngineConfig::default(), &[email_rule()], &s, &t).unwrap();
        assert_eq!(a.classification, b.classification);
    }
}
