//! Human and `--json` rendering shared by the subcommands.

use std::io::{self, Write};

use serde::Serialize;

use crosslink_protocol::{BatchListing, BatchResults, BatchSummary, FieldDef, FieldOptions};
use crosslink_recon::model::{Row, Rule};

use crate::CliError;

/// Widest cell printed before truncation.
const MAX_CELL: usize = 40;

/// Exactly one JSON value on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{text}").map_err(|e| CliError::io(e.to_string()))
}

pub fn print_summary(summary: &BatchSummary) {
    println!("Batch:     {} ({})", summary.batch_name, summary.batch_id);
    println!("Matched:   {}", summary.matched_count);
    println!("Suspected: {}", summary.suspected_count);
    println!("Unmatched: {} source, {} target", summary.unmatched_source_count, summary.unmatched_target_count);
}

pub fn print_listing(batches: &[BatchListing]) {
    if batches.is_empty() {
        println!("(no batches)");
        return;
    }
    for b in batches {
        match &b.rerun_of {
            Some(parent) => println!("{}  {}  {}  (rerun of {parent})", b.batch_id, b.created_at, b.batch_name),
            None => println!("{}  {}  {}", b.batch_id, b.created_at, b.batch_name),
        }
    }
}

pub fn print_results(results: &BatchResults) {
    println!("Matched ({})", results.matched.len());
    for m in &results.matched {
        println!(
            "  source #{} -> target #{}  [{}; {} hit(s)]",
            m.source_index, m.target_index, m.rule.rule_name, m.hits
        );
        println!("    {}", m.rationale_statement);
    }

    println!("Suspected ({})", results.suspected.len());
    for g in &results.suspected {
        println!("  source #{}  {}", g.source_index, compact(&g.source_record));
        for t in &g.targets {
            println!(
                "    ? target #{}  [{}; {} hit(s)]  {}",
                t.target_index,
                t.rule.rule_name,
                t.hits,
                compact(&t.target_record)
            );
        }
    }

    println!("Unmatched source ({})", results.unmatched_source.len());
    for r in &results.unmatched_source {
        println!("  #{}  {}", r.row_index, compact(&r.record));
    }
    println!("Unmatched target ({})", results.unmatched_target.len());
    for r in &results.unmatched_target {
        println!("  #{}  {}", r.row_index, compact(&r.record));
    }
}

pub fn print_rules(rules: &[Rule]) {
    if rules.is_empty() {
        println!("(no rules)");
        return;
    }
    for r in rules {
        println!(
            "{:>4}  {:<24} {} -> {}  {} {}{}",
            r.rule_id,
            truncate(&r.rule_name, 24),
            r.source_field,
            r.target_field,
            serde_plain(&r.match_classification),
            r.match_type,
            if r.code().is_some() { " (code)" } else { "" }
        );
    }
}

pub fn print_fields(fields: &[FieldDef]) {
    if fields.is_empty() {
        println!("(no fields)");
        return;
    }
    for f in fields {
        println!(
            "{:<24} {:<10} {}{}",
            truncate(&f.field_name, 24),
            f.field_type,
            f.description,
            if f.is_active { "" } else { "  [inactive]" }
        );
    }
}

pub fn print_options(options: &FieldOptions) {
    let classes: Vec<String> = options.match_classification.iter().map(serde_plain).collect();
    let types: Vec<String> = options.match_types.iter().map(|t| t.to_string()).collect();
    println!("match_classification: {}", classes.join(", "));
    println!("match_types:          {}", types.join(", "));
}

fn compact(row: &Row) -> String {
    row.iter()
        .map(|(k, v)| format!("{k}={}", truncate(&v.display(), MAX_CELL)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Wire spelling of a unit enum.
fn serde_plain<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslink_recon::model::{MatchClassification, Value};

    #[test]
    fn truncates_long_cells() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }

    #[test]
    fn compact_row() {
        let row = Row::from_pairs([("email", Value::from("a@x.com")), ("n", Value::Number(2.0))]);
        assert_eq!(compact(&row), "email=a@x.com, n=2");
    }

    #[test]
    fn plain_enum_names() {
        assert_eq!(serde_plain(&MatchClassification::Ignore), "IGNORE");
    }
}
