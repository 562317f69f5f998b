use std::sync::Arc;

use crosslink_protocol::{ErrorKind, ExportFormat, FilePayload, FieldDraft, Operation, Request};
use crosslink_recon::{EngineConfig, MatchType, RuleDraft, RulePatch};
use crosslink_service::{dispatch, handle_line, LinkService, Upload};
use crosslink_store::{MemoryStore, SqliteStore, Store};

fn email_rule() -> RuleDraft {
    serde_json::from_value(serde_json::json!({
        "rule_name": "Email",
        "source_field": "email",
        "target_field": "email",
        "rationale_statement": "Same email {source_value}",
    }))
    .unwrap()
}

fn csv(name: &str, body: &str) -> Upload {
    Upload::new(name, body.as_bytes().to_vec())
}

struct Fixture {
    service: LinkService,
    _dir: tempfile::TempDir,
}

fn fixture_with(store: Arc<dyn Store>, dir: tempfile::TempDir) -> Fixture {
    let service = LinkService::with_store(store, EngineConfig::default(), dir.path().join("exports")).unwrap();
    Fixture { service, _dir: dir }
}

impl Fixture {
    fn export_path(&self, file_name: &str) -> std::path::PathBuf {
        self._dir.path().join("exports").join(file_name)
    }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(MemoryStore::new()), tempfile::tempdir().unwrap())
}

#[test]
fn create_batch_and_read_results() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();

    let summary = f
        .service
        .create_batch(
            " Payouts ",
            csv("source.csv", "email,name\na@x.com,Ann\n"),
            csv("target.csv", "email\na@x.com\nb@x.com\n"),
        )
        .unwrap();
    assert_eq!(summary.batch_name, "Payouts");
    assert_eq!(
        (
            summary.matched_count,
            summary.suspected_count,
            summary.unmatched_source_count,
            summary.unmatched_target_count
        ),
        (1, 0, 0, 1)
    );

    let results = f.service.batch_results(&summary.batch_id).unwrap();
    assert_eq!(results.matched.len(), 1);
    assert_eq!(results.matched[0].rationale_statement, "Same email a@x.com");
    assert_eq!(results.unmatched_target.len(), 1);
    assert_eq!(results.unmatched_target[0].row_index, 1);
}

#[test]
fn rerun_uses_current_rules_and_keeps_original() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();
    let first = f
        .service
        .create_batch(
            "Q3",
            csv("s.csv", "email\nA@X.com\nb@x.com\n"),
            csv("t.csv", "email\na@x.com\nb@x.com\n"),
        )
        .unwrap();
    assert_eq!(first.matched_count, 1);

    f.service
        .update_rule(
            1,
            RulePatch {
                match_type: Some(MatchType::Normalized),
                ..Default::default()
            },
        )
        .unwrap();
    let second = f.service.rerun_batch(&first.batch_id).unwrap();
    assert_ne!(second.batch_id, first.batch_id);
    assert_eq!(second.batch_name, "Q3");
    assert_eq!(second.matched_count, 2);

    // The original batch still reports its own results.
    let original = f.service.batch_results(&first.batch_id).unwrap();
    assert_eq!(original.matched.len(), 1);
    assert_eq!(original.matched[0].rule.match_type, MatchType::Exact);

    let listed = f.service.list_batches().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].batch_id, second.batch_id);
    assert_eq!(listed[0].rerun_of.as_deref(), Some(first.batch_id.as_str()));
}

#[test]
fn rerun_with_same_rules_is_stable() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();
    let first = f
        .service
        .create_batch(
            "dup",
            csv("s.csv", "email\na@x.com\nc@x.com\n"),
            csv("t.csv", "email\na@x.com\na@x.com\nc@x.com\n"),
        )
        .unwrap();
    let again = f.service.rerun_batch(&first.batch_id).unwrap();
    assert_eq!(
        (first.matched_count, first.suspected_count, first.unmatched_target_count),
        (again.matched_count, again.suspected_count, again.unmatched_target_count)
    );
    assert_eq!(first.suspected_count, 1);
}

#[test]
fn bad_uploads_are_validation_errors() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();

    let err = f
        .service
        .create_batch("x", csv("s.pdf", "email\na\n"), csv("t.csv", "email\na\n"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = f
        .service
        .create_batch("x", csv("s.csv", "email\n"), csv("t.csv", "email\na\n"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = f
        .service
        .create_batch("   ", csv("s.csv", "email\na\n"), csv("t.csv", "email\na\n"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(f.service.list_batches().unwrap().is_empty());
}

#[test]
fn export_writes_files() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();
    // Nothing matches: every section but the unmatched ones is empty.
    let summary = f
        .service
        .create_batch(
            "no overlap",
            csv("s.csv", "email\na@x.com\n"),
            csv("t.csv", "email\nz@x.com\n"),
        )
        .unwrap();
    assert_eq!(summary.matched_count, 0);

    let info = f.service.export_batch(&summary.batch_id, ExportFormat::Xlsx).unwrap();
    assert!(info.file_name.ends_with(".xlsx"));
    assert!(info.file_link.starts_with("file://"));
    let path = f.export_path(&info.file_name);
    let bytes = std::fs::read(path).unwrap();
    assert_eq!(&bytes[..2], b"PK");

    let info = f.service.export_batch(&summary.batch_id, ExportFormat::Json).unwrap();
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(f.export_path(&info.file_name)).unwrap()).unwrap();
    assert_eq!(doc["batch_id"], summary.batch_id);
    assert_eq!(doc["matched"], serde_json::json!([]));
}

#[test]
fn unknown_batch_is_not_found_everywhere() {
    let f = fixture();
    let id = uuid::Uuid::new_v4().to_string();
    assert_eq!(f.service.batch_results(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(f.service.rerun_batch(&id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        f.service.export_batch(&id, ExportFormat::Xlsx).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn boundary_create_batch_over_base64() {
    let f = fixture();
    f.service.create_rule(email_rule()).unwrap();
    let request = Request {
        id: Some("42".into()),
        operation: Operation::CreateBatch {
            batch_name: "wire".into(),
            source_file: FilePayload::from_bytes("s.csv", b"email\na@x.com\n"),
            target_file: FilePayload::from_bytes("t.csv", b"email\na@x.com\n"),
        },
    };
    let resp = dispatch(&f.service, request);
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.status_message, "OK");
    assert_eq!(resp.id.as_deref(), Some("42"));
    let data = resp.data.unwrap();
    assert_eq!(data["matched_count"], 1);

    let line = format!(r#"{{"op":"get_batch_results","batch_id":{}}}"#, data["batch_id"]);
    let resp = handle_line(&f.service, &line);
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.data.unwrap()["matched"][0]["source_index"], 0);

    let line = format!(r#"{{"op":"rerun_batch","batch_id":{}}}"#, data["batch_id"]);
    let resp = handle_line(&f.service, &line);
    assert_eq!(resp.status_code, 200);
    assert_ne!(resp.data.unwrap()["batch_id"], data["batch_id"]);

    let line = format!(r#"{{"op":"export_batch","batch_id":{},"format":"json"}}"#, data["batch_id"]);
    let resp = handle_line(&f.service, &line);
    assert_eq!(resp.status_code, 200);
    let file_name = resp.file_name.clone().unwrap();
    assert!(file_name.ends_with(".json"));
    assert!(resp.file_link.as_deref().unwrap().starts_with("file://"));
    assert_eq!(resp.data.unwrap()["file_name"], file_name.as_str());

    let resp = handle_line(
        &f.service,
        r#"{"op":"create_batch","batch_name":"b","source_file":{"file_name":"s.csv","content_base64":"%%%"},"target_file":{"file_name":"t.csv","content_base64":""}}"#,
    );
    assert_eq!(resp.status_code, 400);
}

#[test]
fn fields_through_the_boundary() {
    let f = fixture();
    f.service
        .configure_field(FieldDraft {
            field_name: "email".into(),
            field_type: "string".into(),
            description: "contact".into(),
        })
        .unwrap();

    let resp = handle_line(
        &f.service,
        r#"{"op":"edit_field","field_name":"email","type":"string","description":"primary","is_active":false}"#,
    );
    assert_eq!(resp.status_code, 200);
    let data = resp.data.unwrap();
    assert_eq!(data[0]["description"], "primary");
    assert_eq!(data[0]["is_active"], false);

    let resp = handle_line(&f.service, r#"{"op":"field_options"}"#);
    let data = resp.data.unwrap();
    assert_eq!(data["match_classification"], serde_json::json!(["MATCH", "IGNORE"]));

    let resp = handle_line(&f.service, r#"{"op":"delete_field","field_name":"phone"}"#);
    assert_eq!(resp.status_code, 404);
}

#[test]
fn sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("crosslink.db");
    let batch_id = {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
        let service = LinkService::with_store(store, EngineConfig::default(), dir.path()).unwrap();
        service.create_rule(email_rule()).unwrap();
        service
            .create_batch("kept", csv("s.csv", "email\na@x.com\n"), csv("t.csv", "email\na@x.com\n"))
            .unwrap()
            .batch_id
    };

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db).unwrap());
    let service = LinkService::with_store(store, EngineConfig::default(), dir.path()).unwrap();
    assert_eq!(service.list_rules().len(), 1);
    assert_eq!(service.batch_results(&batch_id).unwrap().matched.len(), 1);
    // Ids keep counting from where they stopped.
    let rules = service.create_rule(email_rule()).unwrap();
    assert_eq!(rules[1].rule_id, 2);
}

// -------------------------------------------------------------------------
// Concurrency
// -------------------------------------------------------------------------

fn shared_service() -> (Arc<LinkService>, Arc<dyn Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let service =
        LinkService::with_store(Arc::clone(&store), EngineConfig::default(), dir.path().join("exports")).unwrap();
    (Arc::new(service), store, dir)
}

#[test]
fn concurrent_reruns_of_one_batch_are_independent() {
    let (service, _store, _dir) = shared_service();
    service.create_rule(email_rule()).unwrap();
    let first = service
        .create_batch(
            "Q3",
            csv("s.csv", "email\na@x.com\nb@x.com\nc@x.com\n"),
            csv("t.csv", "email\na@x.com\na@x.com\nb@x.com\nd@x.com\n"),
        )
        .unwrap();
    let before = service.batch_results(&first.batch_id).unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let batch_id = first.batch_id.clone();
            std::thread::spawn(move || service.rerun_batch(&batch_id))
        })
        .collect();
    let reruns: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_ne!(reruns[0].batch_id, reruns[1].batch_id);
    for rerun in &reruns {
        assert_ne!(rerun.batch_id, first.batch_id);
        assert_eq!(
            (rerun.matched_count, rerun.suspected_count, rerun.unmatched_source_count, rerun.unmatched_target_count),
            (first.matched_count, first.suspected_count, first.unmatched_source_count, first.unmatched_target_count)
        );
    }
    assert_eq!(service.batch_results(&first.batch_id).unwrap(), before);
    assert_eq!(service.list_batches().unwrap().len(), 3);
}

#[test]
fn rule_edits_during_reruns_never_mix_snapshots() {
    let (service, store, _dir) = shared_service();
    service.create_rule(email_rule()).unwrap();
    let first = service
        .create_batch(
            "mixed case",
            csv("s.csv", "email\nA@X.com\nb@x.com\n"),
            csv("t.csv", "email\na@x.com\nb@x.com\n"),
        )
        .unwrap();
    assert_eq!(first.matched_count, 1);

    let editor = {
        let service = Arc::clone(&service);
        std::thread::spawn(move || {
            for i in 0..20 {
                let match_type = if i % 2 == 0 { MatchType::Normalized } else { MatchType::Exact };
                service
                    .update_rule(
                        1,
                        RulePatch {
                            match_type: Some(match_type),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            }
        })
    };
    let runner = {
        let service = Arc::clone(&service);
        let batch_id = first.batch_id.clone();
        std::thread::spawn(move || {
            (0..10)
                .map(|_| service.rerun_batch(&batch_id).unwrap().batch_id)
                .collect::<Vec<_>>()
        })
    };
    editor.join().unwrap();
    let rerun_ids = runner.join().unwrap();

    // Each stored batch agrees with the one rule snapshot it recorded.
    for id in rerun_ids {
        let batch = store
            .get_batch(id.parse().unwrap())
            .unwrap()
            .expect("rerun was stored");
        assert_eq!(batch.rules.len(), 1);
        let expected = match batch.rules[0].match_type {
            MatchType::Exact => 1,
            MatchType::Normalized => 2,
            other => panic!("unexpected match type {other:?}"),
        };
        assert_eq!(batch.summary().matched, expected);
        for m in batch.matched() {
            assert_eq!(m.rule, batch.rules[0]);
        }
    }
}
