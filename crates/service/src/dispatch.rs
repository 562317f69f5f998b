//! Request → response routing. Nothing here panics past the boundary: errors
//! become error envelopes and a panicking handler becomes an engine error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crosslink_protocol::{ApiResponse, ErrorKind, Operation, Request, Status};

use crate::batches::Upload;
use crate::error::ServiceError;
use crate::service::LinkService;

/// Parse one JSON request line and handle it.
pub fn handle_line(service: &LinkService, line: &str) -> ApiResponse {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => dispatch(service, request),
        Err(e) => ApiResponse::error(ErrorKind::Validation, format!("malformed request: {e}")),
    }
}

pub fn dispatch(service: &LinkService, request: Request) -> ApiResponse {
    let Request { id, operation } = request;
    let op = operation.name();
    log::debug!("dispatch {op}");

    let response = match catch_unwind(AssertUnwindSafe(|| route(service, operation))) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let kind = e.kind();
            match kind {
                ErrorKind::Validation | ErrorKind::NotFound => log::debug!("{op}: {e}"),
                _ => log::warn!("{op} failed: {e}"),
            }
            ApiResponse::error(kind, e.to_string())
        }
        Err(_) => {
            log::error!("{op}: handler panicked");
            ApiResponse::error(ErrorKind::Engine, format!("{op}: internal error"))
        }
    };
    response.with_id(id)
}

fn ok<T: Serialize>(message: &str, data: &T) -> Result<ApiResponse, ServiceError> {
    Ok(ApiResponse::success(Status::Ok, message, data))
}

fn created<T: Serialize>(message: &str, data: &T) -> Result<ApiResponse, ServiceError> {
    Ok(ApiResponse::success(Status::Created, message, data))
}

fn route(service: &LinkService, operation: Operation) -> Result<ApiResponse, ServiceError> {
    match operation {
        Operation::ListBatches => ok("Batches fetched", &service.list_batches()?),
        Operation::CreateBatch {
            batch_name,
            source_file,
            target_file,
        } => {
            let source = Upload::from_payload(&source_file)?;
            let target = Upload::from_payload(&target_file)?;
            ok(
                "Batch processed successfully",
                &service.create_batch(&batch_name, source, target)?,
            )
        }
        Operation::GetBatchResults { batch_id } => {
            ok("Batch results fetched", &service.batch_results(&batch_id)?)
        }
        Operation::RerunBatch { batch_id } => ok(
            "Batch re-run successfully",
            &service.rerun_batch(&batch_id)?,
        ),
        Operation::ExportBatch { batch_id, format } => {
            let info = service.export_batch(&batch_id, format)?;
            Ok(ApiResponse::exported("Batch exported", &info))
        }

        Operation::ListFields => ok("Fields fetched", &service.list_fields()),
        Operation::ConfigureField(draft) => {
            created("Field added successfully", &service.configure_field(draft)?)
        }
        Operation::EditField(field) => ok("Field updated successfully", &service.edit_field(field)?),
        Operation::DeleteField { field_name } => ok(
            "Field deleted successfully",
            &service.delete_field(&field_name)?,
        ),
        Operation::FieldOptions => ok("Field options fetched", &service.field_options()),

        Operation::ListRules => ok("Rules fetched", &service.list_rules()),
        Operation::CreateRule(draft) => created("Rule created successfully", &service.create_rule(draft)?),
        Operation::UpdateRule(update) => ok(
            "Rule updated successfully",
            &service.update_rule(update.rule_id, update.patch)?,
        ),
        Operation::DeleteRule { rule_id } => {
            ok("Rule deleted successfully", &service.delete_rule(rule_id)?)
        }
    }
}
