//! `crosslink run`: One-shot match of two files, nothing persisted.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Deserialize;

use crosslink_io::{batch_sheets, load_dataset_path, write_json, write_workbook};
use crosslink_protocol::BatchResults;
use crosslink_recon::{Batch, BatchInput, RuleDraft, RuleSet};
use crosslink_service::batches::batch_summary;
use crosslink_service::Settings;

use crate::exit_codes::{EXIT_RUN_UNRESOLVED, EXIT_VALIDATION};
use crate::output::{print_json, print_results, print_summary};
use crate::CliError;

#[derive(Args)]
pub struct RunArgs {
    /// Source dataset (.csv or .xlsx)
    pub source: PathBuf,

    /// Target dataset (.csv or .xlsx)
    pub target: PathBuf,

    /// Rules file: TOML with [[rule]] tables, or a JSON array
    #[arg(long, short = 'r', value_name = "FILE")]
    pub rules: PathBuf,

    /// Print the full results as one JSON document
    #[arg(long)]
    pub json: bool,

    /// Also write the results to FILE (.xlsx or .json)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit 8 when any row is left suspected or unmatched
    #[arg(long)]
    pub strict: bool,
}

#[derive(Deserialize)]
struct RulesFile {
    #[serde(default)]
    rule: Vec<RuleDraft>,
}

pub fn cmd_run(settings: &Settings, args: RunArgs) -> Result<(), CliError> {
    let rules = load_rules(&args.rules)?;
    let source = load_dataset_path(&args.source).map_err(|e| dataset_error(&args.source, e))?;
    let target = load_dataset_path(&args.target).map_err(|e| dataset_error(&args.target, e))?;

    let snapshot = rules.snapshot();
    let output = crosslink_recon::run(&settings.engine, &snapshot, &source, &target)
        .map_err(|e| CliError::service(e.into()))?;

    let input = BatchInput {
        batch_name: file_stem(&args.source),
        source_file_name: file_name(&args.source),
        target_file_name: file_name(&args.target),
        source_dataset: source,
        target_dataset: target,
        rerun_of: None,
    };
    let batch = Batch::new(input, &snapshot, output);

    if let Some(path) = &args.output {
        write_output(&batch, path)?;
    }

    let summary = batch_summary(&batch);
    let unmatched = batch.unmatched();
    let results = BatchResults {
        matched: batch.matched(),
        suspected: batch.suspected(),
        unmatched_source: unmatched.unmatched_source,
        unmatched_target: unmatched.unmatched_target,
    };
    if args.json {
        print_json(&results)?;
    } else {
        print_results(&results);
        println!();
        print_summary(&summary);
    }

    let unresolved = summary.suspected_count + summary.unmatched_source_count + summary.unmatched_target_count;
    if args.strict && unresolved > 0 {
        return Err(CliError {
            code: EXIT_RUN_UNRESOLVED,
            message: format!("{unresolved} row(s) left suspected or unmatched"),
            hint: None,
        });
    }
    Ok(())
}

/// Parse drafts and assign ids in file order.
fn load_rules(path: &Path) -> Result<RuleSet, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("{}: {e}", path.display())))?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let drafts: Vec<RuleDraft> = if is_toml {
        toml::from_str::<RulesFile>(&text).map(|f| f.rule).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }
    .map_err(|e| CliError {
        code: EXIT_VALIDATION,
        message: format!("{}: {e}", path.display()),
        hint: Some("expected [[rule]] tables (TOML) or an array of rules (JSON)".to_string()),
    })?;

    let mut set = RuleSet::new();
    for draft in drafts {
        set.create(draft).map_err(|e| CliError::service(e.into()))?;
    }
    log::debug!("loaded {} rule(s) from {}", set.len(), path.display());
    Ok(set)
}

fn write_output(batch: &Batch, path: &Path) -> Result<(), CliError> {
    let is_xlsx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    let bytes = if is_xlsx {
        write_workbook(&batch_sheets(batch))
    } else {
        write_json(batch)
    }
    .map_err(|e| CliError::service(e.into()))?;

    std::fs::write(path, bytes).map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn dataset_error(path: &Path, err: crosslink_io::DatasetError) -> CliError {
    CliError::service(err.into()).with_hint(format!("while reading {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string())
}
