//! `crosslink batch`: Batch lifecycle.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use crosslink_protocol::ExportFormat;
use crosslink_service::{LinkService, Upload};

use crate::output::{print_json, print_listing, print_results, print_summary};
use crate::CliError;

#[derive(Subcommand)]
pub enum BatchCommands {
    /// List stored batches, newest first
    List {
        #[arg(long)]
        json: bool,
    },

    /// Upload a source and a target file and match them with the current rules
    #[command(after_help = "\
Examples:
  crosslink batch create 'Q3 payouts' stripe.csv ledger.xlsx
  crosslink batch create nightly a.csv b.csv --json")]
    Create {
        /// Batch name
        name: String,
        /// Source dataset (.csv or .xlsx)
        source: PathBuf,
        /// Target dataset (.csv or .xlsx)
        target: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Show matched, suspected and unmatched rows of a batch
    Results {
        batch_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Match a stored batch again under the current rules (creates a new batch)
    Rerun {
        batch_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Write the batch to the export directory
    Export {
        batch_id: String,
        #[arg(long, short = 'f', value_enum, default_value = "xlsx")]
        format: FormatArg,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Xlsx,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Xlsx => ExportFormat::Xlsx,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

pub fn cmd_batch(service: &LinkService, cmd: BatchCommands) -> Result<(), CliError> {
    match cmd {
        BatchCommands::List { json } => {
            let batches = service.list_batches().map_err(CliError::service)?;
            if json {
                print_json(&batches)
            } else {
                print_listing(&batches);
                Ok(())
            }
        }
        BatchCommands::Create { name, source, target, json } => {
            let source = read_upload(&source)?;
            let target = read_upload(&target)?;
            let summary = service
                .create_batch(&name, source, target)
                .map_err(CliError::service)?;
            if json {
                print_json(&summary)
            } else {
                print_summary(&summary);
                Ok(())
            }
        }
        BatchCommands::Results { batch_id, json } => {
            let results = service.batch_results(&batch_id).map_err(CliError::service)?;
            if json {
                print_json(&results)
            } else {
                print_results(&results);
                Ok(())
            }
        }
        BatchCommands::Rerun { batch_id, json } => {
            let summary = service.rerun_batch(&batch_id).map_err(CliError::service)?;
            if json {
                print_json(&summary)
            } else {
                println!("Rerun of {batch_id}");
                print_summary(&summary);
                Ok(())
            }
        }
        BatchCommands::Export { batch_id, format, json } => {
            let info = service
                .export_batch(&batch_id, format.into())
                .map_err(CliError::service)?;
            if json {
                print_json(&info)
            } else {
                println!("{}", info.file_link);
                Ok(())
            }
        }
    }
}

fn read_upload(path: &PathBuf) -> Result<Upload, CliError> {
    Upload::from_path(path).map_err(|e| {
        CliError::service(e).with_hint(format!("check that {} exists and is readable", path.display()))
    })
}
