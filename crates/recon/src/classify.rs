use std::collections::{HashMap, HashSet};

use crate::config::Thresholds;

/// Score of one (source, target) pair that reached the candidate threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub target_index: usize,
    pub hits: usize,
    /// Plan indexes of the rules that hit, in rule-set order.
    pub hit_rules: Vec<usize>,
}

/// Per-source decision taken without looking at other sources.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    None,
    /// Unique top candidate at or above the definite threshold. The full
    /// candidate list is kept in case finalization demotes it.
    Definite(Vec<Candidate>),
    Suspect(Vec<Candidate>),
}

/// Final decision for one source row.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Matched(Candidate),
    Suspected(Vec<Candidate>),
    Unmatched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub sources: Vec<Resolved>,
    pub unmatched_targets: Vec<usize>,
    pub ambiguous_demotions: usize,
}

/// Order candidates (hits desc, target asc), cap them and decide.
pub fn propose(mut candidates: Vec<Candidate>, thresholds: &Thresholds, max_targets: usize) -> Proposal {
    candidates.retain(|c| c.hits >= thresholds.suspect_min_hits);
    if candidates.is_empty() {
        return Proposal::None;
    }
    candidates.sort_by(|a, b| b.hits.cmp(&a.hits).then(a.target_index.cmp(&b.target_index)));

    let top = candidates[0].hits;
    let unique_top = candidates.get(1).map_or(true, |second| second.hits < top);
    candidates.truncate(max_targets.max(1));

    if unique_top && top >= thresholds.definite_min_hits {
        Proposal::Definite(candidates)
    } else {
        Proposal::Suspect(candidates)
    }
}

/// Resolve cross-source conflicts once every row has been proposed.
///
/// A target proposed definitely by more than one source demotes all of them
/// to suspected. Targets held by a surviving definite match are dropped from
/// every suspect group; a group left empty becomes unmatched.
pub fn finalize(proposals: Vec<Proposal>, target_count: usize) -> Finalized {
    let mut claims: HashMap<usize, usize> = HashMap::new();
    for p in &proposals {
        if let Proposal::Definite(c) = p {
            *claims.entry(c[0].target_index).or_insert(0) += 1;
        }
    }

    let mut ambiguous_demotions = 0;
    let mut staged: Vec<Resolved> = proposals
        .into_iter()
        .map(|p| match p {
            Proposal::None => Resolved::Unmatched,
            Proposal::Suspect(c) => Resolved::Suspected(c),
            Proposal::Definite(mut c) => {
                if claims.get(&c[0].target_index).copied().unwrap_or(0) > 1 {
                    ambiguous_demotions += 1;
                    Resolved::Suspected(c)
                } else {
                    Resolved::Matched(c.swap_remove(0))
                }
            }
        })
        .collect();

    let claimed: HashSet<usize> = staged
        .iter()
        .filter_map(|r| match r {
            Resolved::Matched(c) => Some(c.target_index),
            _ => None,
        })
        .collect();

    let mut referenced = claimed.clone();
    for r in staged.iter_mut() {
        if let Resolved::Suspected(c) = r {
            c.retain(|cand| !claimed.contains(&cand.target_index));
            if c.is_empty() {
                *r = Resolved::Unmatched;
            } else {
                referenced.extend(c.iter().map(|cand| cand.target_index));
            }
        }
    }

    let unmatched_targets = (0..target_count).filter(|t| !referenced.contains(t)).collect();

    Finalized {
        sources: staged,
        unmatched_targets,
        ambiguous_demotions,
    }
}
