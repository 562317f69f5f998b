//! `crosslink field`: Field registry.

use clap::Subcommand;

use crosslink_protocol::{FieldDef, FieldDraft};
use crosslink_service::{LinkService, ServiceError};

use crate::output::{print_fields, print_json, print_options};
use crate::CliError;

#[derive(Subcommand)]
pub enum FieldCommands {
    /// List registered fields
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show the selectable match classifications and match types
    Options {
        #[arg(long)]
        json: bool,
    },

    /// Register a field
    Add {
        name: String,
        #[arg(long = "type", default_value = "string")]
        field_type: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        json: bool,
    },

    /// Change a field's type, description or active flag. Names are fixed.
    Edit {
        name: String,
        #[arg(long = "type")]
        field_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "inactive")]
        active: bool,
        #[arg(long)]
        inactive: bool,
        #[arg(long)]
        json: bool,
    },

    /// Remove a field
    Delete {
        name: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_field(service: &LinkService, cmd: FieldCommands) -> Result<(), CliError> {
    let (fields, json) = match cmd {
        FieldCommands::Options { json } => {
            let options = service.field_options();
            return if json {
                print_json(&options)
            } else {
                print_options(&options);
                Ok(())
            };
        }
        FieldCommands::List { json } => (service.list_fields(), json),
        FieldCommands::Add { name, field_type, description, json } => {
            let draft = FieldDraft { field_name: name, field_type, description };
            (service.configure_field(draft).map_err(CliError::service)?, json)
        }
        FieldCommands::Edit { name, field_type, description, active, inactive, json } => {
            let current = service
                .list_fields()
                .into_iter()
                .find(|f| f.field_name == name.trim())
                .ok_or_else(|| CliError::service(ServiceError::not_found(format!("field '{name}' not found"))))?;
            let edit = FieldDef {
                field_name: current.field_name,
                field_type: field_type.unwrap_or(current.field_type),
                description: description.unwrap_or(current.description),
                is_active: if active {
                    true
                } else if inactive {
                    false
                } else {
                    current.is_active
                },
            };
            (service.edit_field(edit).map_err(CliError::service)?, json)
        }
        FieldCommands::Delete { name, json } => {
            (service.delete_field(&name).map_err(CliError::service)?, json)
        }
    };

    if json {
        print_json(&fields)
    } else {
        print_fields(&fields);
        Ok(())
    }
}
