//! `crosslink rule`: Rule set editing.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crosslink_recon::{MatchClassification, MatchType, RuleDraft, RuleId, RulePatch};
use crosslink_service::LinkService;

use crate::output::{print_json, print_rules};
use crate::CliError;

#[derive(Subcommand)]
pub enum RuleCommands {
    /// List rules in evaluation order
    List {
        #[arg(long)]
        json: bool,
    },

    /// Append a rule
    #[command(after_help = "\
Examples:
  crosslink rule create --name Email --source-field email --target-field email
  crosslink rule create --name Phone --source-field phone --target-field tel \\
      --match-type custom --code 'digits(source_value) == digits(target_value)'
  crosslink rule create --name Memo --source-field memo --target-field memo --classification ignore")]
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        source_field: String,
        #[arg(long)]
        target_field: String,
        #[command(flatten)]
        attrs: RuleAttrs,
        #[arg(long)]
        json: bool,
    },

    /// Change attributes of a rule; unspecified attributes are kept
    Update {
        rule_id: RuleId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        source_field: Option<String>,
        #[arg(long)]
        target_field: Option<String>,
        #[command(flatten)]
        attrs: RuleAttrs,
        /// Remove the rule's code block
        #[arg(long, conflicts_with_all = ["code", "code_file"])]
        clear_code: bool,
        #[arg(long)]
        json: bool,
    },

    /// Remove a rule. Stored batches keep their own copy.
    Delete {
        rule_id: RuleId,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct RuleAttrs {
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_enum)]
    classification: Option<ClassificationArg>,
    #[arg(long, value_enum)]
    match_type: Option<MatchTypeArg>,
    /// Template with {source_value}, {target_value}, {rule_name}, ...
    #[arg(long)]
    rationale: Option<String>,
    /// Predicate expression over source_value and target_value
    #[arg(long, conflicts_with = "code_file")]
    code: Option<String>,
    /// Read the predicate from a file
    #[arg(long, value_name = "PATH")]
    code_file: Option<PathBuf>,
    /// Whether equal values count as a hit
    #[arg(long)]
    select_if_both_same: Option<bool>,
}

impl RuleAttrs {
    fn code(&self) -> Result<Option<String>, CliError> {
        match (&self.code, &self.code_file) {
            (Some(code), _) => Ok(Some(code.clone())),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|e| CliError::usage(format!("{}: {e}", path.display()))),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ClassificationArg {
    Match,
    Ignore,
}

impl From<ClassificationArg> for MatchClassification {
    fn from(c: ClassificationArg) -> Self {
        match c {
            ClassificationArg::Match => MatchClassification::Match,
            ClassificationArg::Ignore => MatchClassification::Ignore,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MatchTypeArg {
    Exact,
    Normalized,
    Fuzzy,
    Numeric,
    Custom,
}

impl From<MatchTypeArg> for MatchType {
    fn from(t: MatchTypeArg) -> Self {
        match t {
            MatchTypeArg::Exact => MatchType::Exact,
            MatchTypeArg::Normalized => MatchType::Normalized,
            MatchTypeArg::Fuzzy => MatchType::Fuzzy,
            MatchTypeArg::Numeric => MatchType::Numeric,
            MatchTypeArg::Custom => MatchType::Custom,
        }
    }
}

pub fn cmd_rule(service: &LinkService, cmd: RuleCommands) -> Result<(), CliError> {
    let (rules, json) = match cmd {
        RuleCommands::List { json } => (service.list_rules(), json),
        RuleCommands::Create { name, source_field, target_field, attrs, json } => {
            let code_block = attrs.code()?;
            let draft = RuleDraft {
                rule_name: name,
                description: attrs.description.unwrap_or_default(),
                source_field,
                target_field,
                select_if_both_same: attrs.select_if_both_same.unwrap_or(true),
                match_classification: attrs
                    .classification
                    .map(Into::into)
                    .unwrap_or(MatchClassification::Match),
                match_type: attrs.match_type.map(Into::into).unwrap_or(MatchType::Exact),
                rationale_statement: attrs.rationale.unwrap_or_default(),
                code_block,
            };
            (service.create_rule(draft).map_err(CliError::service)?, json)
        }
        RuleCommands::Update {
            rule_id,
            name,
            source_field,
            target_field,
            attrs,
            clear_code,
            json,
        } => {
            let code_block = if clear_code { Some(String::new()) } else { attrs.code()? };
            let patch = RulePatch {
                rule_name: name,
                description: attrs.description,
                source_field,
                target_field,
                select_if_both_same: attrs.select_if_both_same,
                match_classification: attrs.classification.map(Into::into),
                match_type: attrs.match_type.map(Into::into),
                rationale_statement: attrs.rationale,
                code_block,
            };
            if patch.is_empty() {
                return Err(CliError::usage("nothing to update").with_hint("pass at least one attribute, e.g. --match-type normalized"));
            }
            (service.update_rule(rule_id, patch).map_err(CliError::service)?, json)
        }
        RuleCommands::Delete { rule_id, json } => {
            (service.delete_rule(rule_id).map_err(CliError::service)?, json)
        }
    };

    if json {
        print_json(&rules)
    } else {
        print_rules(&rules);
        Ok(())
    }
}
