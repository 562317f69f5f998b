// CrossLink CLI - rule-driven record linkage between two datasets

mod batch;
mod exit_codes;
mod field;
mod output;
mod rule;
mod run;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::OnceLock;

use clap::{Parser, Subcommand};

use crosslink_protocol::PROTOCOL_VERSION;
use crosslink_service::{LinkService, ServiceError, Settings};

use exit_codes::{kind_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "crosslink")]
#[command(about = "Match source and target datasets with editable rules")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Config file (default: <config_dir>/crosslink/crosslink.toml)
    #[arg(long, global = true, env = "CROSSLINK_CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect, rerun and export batches
    #[command(subcommand)]
    Batch(batch::BatchCommands),

    /// Manage linkage rules
    #[command(subcommand)]
    Rule(rule::RuleCommands),

    /// Manage the field registry
    #[command(subcommand)]
    Field(field::FieldCommands),

    /// Serve every operation as newline-delimited JSON over TCP
    #[command(after_help = "\
Examples:
  crosslink serve
  crosslink serve --listen 0.0.0.0:7878
  echo '{\"op\":\"list_batches\"}' | nc 127.0.0.1 7878")]
    Serve {
        /// Address to bind (default from [server] listen)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Match two files once with a rules file; nothing is stored
    #[command(after_help = "\
Examples:
  crosslink run source.csv target.xlsx --rules rules.toml
  crosslink run source.csv target.csv --rules rules.json --json
  crosslink run source.csv target.csv --rules rules.toml --strict")]
    Run(run::RunArgs),
}

fn long_version() -> &'static str {
    static LONG_VERSION: OnceLock<String> = OnceLock::new();
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} ({})\ntarget:  {}\nprotocol_version: {}",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_COMMIT_HASH"),
            env!("TARGET"),
            PROTOCOL_VERSION,
        )
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => load_settings(cli.config.as_ref()).and_then(|s| run::cmd_run(&s, args)),
        Commands::Serve { listen } => load_settings(cli.config.as_ref()).and_then(|s| serve::cmd_serve(&s, listen)),
        Commands::Batch(cmd) => open_service(cli.config.as_ref()).and_then(|svc| batch::cmd_batch(&svc, cmd)),
        Commands::Rule(cmd) => open_service(cli.config.as_ref()).and_then(|svc| rule::cmd_rule(&svc, cmd)),
        Commands::Field(cmd) => open_service(cli.config.as_ref()).and_then(|svc| field::cmd_field(&svc, cmd)),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {message}");
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| CliError::service(e).with_hint("check the config file or pass --config"))
}

fn open_service(path: Option<&PathBuf>) -> Result<LinkService, CliError> {
    let settings = load_settings(path)?;
    LinkService::open(&settings).map_err(CliError::service)
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Exit code follows the boundary error kind.
    pub fn service(err: ServiceError) -> Self {
        let kind = err.kind();
        let hint = match &err {
            ServiceError::Dataset(_) => Some("accepted formats: .csv, .xlsx with a header row".to_string()),
            ServiceError::Store(e) if e.is_transient() => Some("the store is busy; retry shortly".to_string()),
            ServiceError::Recon(crosslink_recon::ReconError::Predicate { .. }) => {
                Some("code_block accepts an expression over source_value and target_value".to_string())
            }
            _ => None,
        };
        Self { code: kind_exit_code(kind), message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
