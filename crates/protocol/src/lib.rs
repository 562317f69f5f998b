//! CrossLink Service Protocol
//!
//! Canonical request/response types shared by the service, its JSONL TCP
//! server and the CLI. One request per line, one response per line.
//!
//! # Usage
//!
//! ```ignore
//! use crosslink_protocol::{Request, Operation, ApiResponse};
//!
//! let req: Request = serde_json::from_str(r#"{"op":"list_batches"}"#)?;
//! let line = serde_json::to_string(&ApiResponse::error(ErrorKind::NotFound, "no such batch"))?;
//! ```

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crosslink_recon::model::{IndexedRow, MatchClassification, MatchResult, MatchType, RuleId, SuspectGroup};
use crosslink_recon::rules::{RuleDraft, RulePatch};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Requests
// =============================================================================

/// One request line. `id` is echoed back on the response when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub operation: Operation,
}

impl Request {
    pub fn new(operation: Operation) -> Self {
        Self { id: None, operation }
    }
}

/// Every boundary operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    // Batches
    ListBatches,
    CreateBatch {
        batch_name: String,
        source_file: FilePayload,
        target_file: FilePayload,
    },
    GetBatchResults {
        batch_id: String,
    },
    RerunBatch {
        batch_id: String,
    },
    ExportBatch {
        batch_id: String,
        #[serde(default)]
        format: ExportFormat,
    },

    // Fields
    ListFields,
    ConfigureField(FieldDraft),
    EditField(FieldDef),
    DeleteField {
        field_name: String,
    },
    FieldOptions,

    // Rules
    ListRules,
    CreateRule(RuleDraft),
    UpdateRule(RuleUpdate),
    DeleteRule {
        rule_id: RuleId,
    },
}

impl Operation {
    /// Wire name of the operation, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListBatches => "list_batches",
            Operation::CreateBatch { .. } => "create_batch",
            Operation::GetBatchResults { .. } => "get_batch_results",
            Operation::RerunBatch { .. } => "rerun_batch",
            Operation::ExportBatch { .. } => "export_batch",
            Operation::ListFields => "list_fields",
            Operation::ConfigureField(_) => "configure_field",
            Operation::EditField(_) => "edit_field",
            Operation::DeleteField { .. } => "delete_field",
            Operation::FieldOptions => "field_options",
            Operation::ListRules => "list_rules",
            Operation::CreateRule(_) => "create_rule",
            Operation::UpdateRule(_) => "update_rule",
            Operation::DeleteRule { .. } => "delete_rule",
        }
    }
}

/// An uploaded file carried inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    pub file_name: String,
    pub content_base64: String,
}

impl FilePayload {
    pub fn from_bytes(file_name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.content_base64.trim())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

/// `update_rule` body: the id plus whichever attributes change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub rule_id: RuleId,
    #[serde(flatten)]
    pub patch: RulePatch,
}

// =============================================================================
// Fields
// =============================================================================

/// A named, typed attribute available to rule authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// `configure_field` body. New fields start active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDraft {
    pub field_name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
}

/// Selectable values for rule authoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOptions {
    pub match_classification: Vec<MatchClassification>,
    pub match_types: Vec<MatchType>,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            match_classification: MatchClassification::ALL.to_vec(),
            match_types: MatchType::ALL.to_vec(),
        }
    }
}

// =============================================================================
// Batch payloads
// =============================================================================

/// `list_batches` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchListing {
    pub batch_id: String,
    pub batch_name: String,
    pub created_at: String, // RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_of: Option<String>,
}

/// Counts returned by `create_batch` and `rerun_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub batch_name: String,
    pub matched_count: usize,
    pub suspected_count: usize,
    pub unmatched_source_count: usize,
    pub unmatched_target_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    pub matched: Vec<MatchResult>,
    pub suspected: Vec<SuspectGroup>,
    pub unmatched_source: Vec<IndexedRow>,
    pub unmatched_target: Vec<IndexedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub file_name: String,
    /// `file://` URL of the written artifact.
    pub file_link: String,
}

// =============================================================================
// Responses
// =============================================================================

/// Error taxonomy surfaced at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Engine,
    Export,
    Transient,
}

impl ErrorKind {
    pub fn status(self) -> Status {
        match self {
            ErrorKind::Validation => Status::BadRequest,
            ErrorKind::NotFound => Status::NotFound,
            ErrorKind::Engine => Status::UnprocessableEntity,
            ErrorKind::Export => Status::InternalServerError,
            ErrorKind::Transient => Status::ServiceUnavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    NotFound,
    UnprocessableEntity,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::UnprocessableEntity => 422,
            Status::InternalServerError => 500,
            Status::ServiceUnavailable => 503,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "CREATED",
            Status::BadRequest => "BAD REQUEST",
            Status::NotFound => "NOT FOUND",
            Status::UnprocessableEntity => "UNPROCESSABLE ENTITY",
            Status::InternalServerError => "INTERNAL SERVER ERROR",
            Status::ServiceUnavailable => "SERVICE UNAVAILABLE",
        }
    }
}

/// Response envelope for every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status_code: u16,
    pub status_message: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Export responses repeat the file name and link at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_link: Option<String>,
}

impl ApiResponse {
    /// Success with a payload. A payload that fails to serialize becomes an
    /// export error rather than a panic.
    pub fn success<T: Serialize>(status: Status, message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                id: None,
                status_code: status.code(),
                status_message: status.message().to_string(),
                message: message.into(),
                data: Some(value),
                error_kind: None,
                file_name: None,
                file_link: None,
            },
            Err(e) => Self::error(ErrorKind::Export, format!("failed to encode response: {e}")),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = kind.status();
        Self {
            id: None,
            status_code: status.code(),
            status_message: status.message().to_string(),
            message: message.into(),
            data: None,
            error_kind: Some(kind),
            file_name: None,
            file_link: None,
        }
    }

    /// Success envelope for an export, with `file_name`/`file_link` both in
    /// `data` and at the top level.
    pub fn exported(message: impl Into<String>, info: &ExportInfo) -> Self {
        let mut response = Self::success(Status::Ok, message, info);
        if response.is_success() {
            response.file_name = Some(info.file_name.clone());
            response.file_link = Some(info.file_link.clone());
        }
        response
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_operation_parses() {
        let req: Request = serde_json::from_str(r#"{"op":"list_batches","id":"7"}"#).unwrap();
        assert_eq!(req.id.as_deref(), Some("7"));
        assert!(matches!(req.operation, Operation::ListBatches));
    }

    #[test]
    fn create_batch_parses_files() {
        let line = r#"{"op":"create_batch","batch_name":"Q3","source_file":{"file_name":"s.csv","content_base64":"ZW1haWwK"},"target_file":{"file_name":"t.csv","content_base64":""}}"#;
        let req: Request = serde_json::from_str(line).unwrap();
        match req.operation {
            Operation::CreateBatch { batch_name, source_file, .. } => {
                assert_eq!(batch_name, "Q3");
                assert_eq!(source_file.decode().unwrap(), b"email\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_rule_flattens_patch() {
        let line = r#"{"op":"update_rule","rule_id":3,"match_type":"NORMALIZED","rule_name":"Email"}"#;
        let req: Request = serde_json::from_str(line).unwrap();
        match req.operation {
            Operation::UpdateRule(update) => {
                assert_eq!(update.rule_id, 3);
                assert_eq!(update.patch.match_type, Some(MatchType::Normalized));
                assert_eq!(update.patch.rule_name.as_deref(), Some("Email"));
                assert_eq!(update.patch.description, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn field_uses_type_key() {
        let field: FieldDef =
            serde_json::from_str(r#"{"field_name":"email","type":"string"}"#).unwrap();
        assert_eq!(field.field_type, "string");
        assert!(field.is_active);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "string");
    }

    #[test]
    fn export_format_defaults_to_xlsx() {
        let req: Request = serde_json::from_str(r#"{"op":"export_batch","batch_id":"x"}"#).unwrap();
        assert!(matches!(
            req.operation,
            Operation::ExportBatch { format: ExportFormat::Xlsx, .. }
        ));
    }

    #[test]
    fn error_envelope() {
        let resp = ApiResponse::error(ErrorKind::NotFound, "batch x not found").with_id(Some("1".into()));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status_code"], 404);
        assert_eq!(json["status_message"], "NOT FOUND");
        assert_eq!(json["error_kind"], "not_found");
        assert!(json.get("data").is_none());
        assert!(json.get("file_link").is_none());
    }

    #[test]
    fn export_envelope_mirrors_file_keys() {
        let info = ExportInfo {
            file_name: "q3_1.xlsx".into(),
            file_link: "file:///tmp/q3_1.xlsx".into(),
        };
        let json = serde_json::to_value(ApiResponse::exported("Batch exported", &info)).unwrap();
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["file_name"], "q3_1.xlsx");
        assert_eq!(json["file_link"], "file:///tmp/q3_1.xlsx");
        assert_eq!(json["data"]["file_link"], "file:///tmp/q3_1.xlsx");
    }

    #[test]
    fn success_envelope() {
        let resp = ApiResponse::success(Status::Created, "created", &FieldOptions::default());
        assert_eq!(resp.status_code, 201);
        let data = resp.data.unwrap();
        assert_eq!(data["match_classification"][0], "MATCH");
        assert_eq!(data["match_types"][4], "custom");
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"drop_tables"}"#).is_err());
    }
}
