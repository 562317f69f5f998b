//! `crosslink-service`: The application layer.
//!
//! Owns the rule and field registries, runs batches through the engine,
//! persists them through a [`crosslink_store::Store`], writes exports and
//! serves every operation over newline-delimited JSON.

pub mod batches;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod fields;
pub mod rules;
pub mod server;
pub mod service;
pub mod settings;

pub use batches::{BatchManager, Upload};
pub use dispatch::{dispatch, handle_line};
pub use error::ServiceError;
pub use export::Exporter;
pub use fields::FieldRegistry;
pub use rules::RuleRegistry;
pub use server::Server;
pub use service::LinkService;
pub use settings::Settings;
