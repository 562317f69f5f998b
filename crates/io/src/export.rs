// Batch export: multi-sheet XLSX or a JSON document of the same content.

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;

use crosslink_recon::model::{IndexedRow, MatchResult, ReconSummary, Row, SuspectGroup, UnmatchedSet, Value};
use crosslink_recon::Batch;

use crate::error::ExportError;

/// Excel's per-cell text limit.
pub const MAX_CELL_CHARS: usize = 32_767;

pub const SHEET_SUMMARY: &str = "Summary";
pub const SHEET_MATCHED: &str = "Matched";
pub const SHEET_SUSPECTED: &str = "Suspected";
pub const SHEET_UNMATCHED_SOURCE: &str = "Unmatched Source";
pub const SHEET_UNMATCHED_TARGET: &str = "Unmatched Target";

/// One tabular sheet of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Everything a JSON export carries.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDocument<'a> {
    pub batch_id: String,
    pub batch_name: &'a str,
    pub created_at: String,
    pub rerun_of: Option<String>,
    pub source_file_name: &'a str,
    pub target_file_name: &'a str,
    pub summary: ReconSummary,
    pub matched: Vec<MatchResult>,
    pub suspected: Vec<SuspectGroup>,
    #[serde(flatten)]
    pub unmatched: UnmatchedSet,
}

impl<'a> BatchDocument<'a> {
    pub fn new(batch: &'a Batch) -> Self {
        Self {
            batch_id: batch.batch_id.to_string(),
            batch_name: &batch.batch_name,
            created_at: batch.created_at.to_rfc3339(),
            rerun_of: batch.rerun_of.map(|id| id.to_string()),
            source_file_name: &batch.source_file_name,
            target_file_name: &batch.target_file_name,
            summary: batch.summary(),
            matched: batch.matched(),
            suspected: batch.suspected(),
            unmatched: batch.unmatched(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sheet layout
// ---------------------------------------------------------------------------

/// Lay a batch out as the five export sheets. Empty sections keep their header.
pub fn batch_sheets(batch: &Batch) -> Vec<SheetData> {
    let source_cols = &batch.source_dataset.columns;
    let target_cols = &batch.target_dataset.columns;
    let summary = batch.summary();

    let text = |s: &str| Value::Text(s.to_string());
    let count = |n: usize| Value::Number(n as f64);

    let summary_sheet = SheetData {
        name: SHEET_SUMMARY.to_string(),
        headers: vec!["Field".into(), "Value".into()],
        rows: vec![
            vec![text("batch_id"), text(&batch.batch_id.to_string())],
            vec![text("batch_name"), text(&batch.batch_name)],
            vec![text("created_at"), text(&batch.created_at.to_rfc3339())],
            vec![
                text("rerun_of"),
                batch.rerun_of.map(|id| text(&id.to_string())).unwrap_or_default(),
            ],
            vec![text("source_file_name"), text(&batch.source_file_name)],
            vec![text("target_file_name"), text(&batch.target_file_name)],
            vec![text("rules_applied"), count(batch.rules.len())],
            vec![text("matched"), count(summary.matched)],
            vec![text("suspected"), count(summary.suspected)],
            vec![text("unmatched_source"), count(summary.unmatched_source)],
            vec![text("unmatched_target"), count(summary.unmatched_target)],
        ],
    };

    let pair_headers = |lead: &[&str]| -> Vec<String> {
        lead.iter()
            .map(|s| s.to_string())
            .chain(source_cols.iter().map(|c| format!("source.{c}")))
            .chain(target_cols.iter().map(|c| format!("target.{c}")))
            .collect()
    };

    let matched_sheet = SheetData {
        name: SHEET_MATCHED.to_string(),
        headers: pair_headers(&[
            "source_index",
            "target_index",
            "rule_id",
            "rule_name",
            "hits",
            "matched_rule_ids",
            "rationale_statement",
        ]),
        rows: batch
            .matched()
            .into_iter()
            .map(|m| {
                let ids = m
                    .matched_rule_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut row = vec![
                    count(m.source_index),
                    count(m.target_index),
                    Value::Number(m.rule.rule_id as f64),
                    text(&m.rule.rule_name),
                    count(m.hits),
                    Value::Text(ids),
                    Value::Text(m.rationale_statement),
                ];
                row.extend(record_values(&m.source_record, source_cols));
                row.extend(record_values(&m.target_record, target_cols));
                row
            })
            .collect(),
    };

    let mut suspect_rows = Vec::new();
    for group in batch.suspected() {
        for t in &group.targets {
            let mut row = vec![
                count(group.source_index),
                count(t.target_index),
                Value::Number(t.rule.rule_id as f64),
                text(&t.rule.rule_name),
                count(t.hits),
                text(&t.rationale_statement),
            ];
            row.extend(record_values(&group.source_record, source_cols));
            row.extend(record_values(&t.target_record, target_cols));
            suspect_rows.push(row);
        }
    }
    let suspected_sheet = SheetData {
        name: SHEET_SUSPECTED.to_string(),
        headers: pair_headers(&[
            "source_index",
            "target_index",
            "rule_id",
            "rule_name",
            "hits",
            "rationale_statement",
        ]),
        rows: suspect_rows,
    };

    let unmatched = batch.unmatched();
    let side_sheet = |name: &str, cols: &[String], rows: &[IndexedRow]| SheetData {
        name: name.to_string(),
        headers: std::iter::once("row_index".to_string()).chain(cols.iter().cloned()).collect(),
        rows: rows
            .iter()
            .map(|r| {
                let mut row = vec![count(r.row_index)];
                row.extend(record_values(&r.record, cols));
                row
            })
            .collect(),
    };

    vec![
        summary_sheet,
        matched_sheet,
        suspected_sheet,
        side_sheet(SHEET_UNMATCHED_SOURCE, source_cols, &unmatched.unmatched_source),
        side_sheet(SHEET_UNMATCHED_TARGET, target_cols, &unmatched.unmatched_target),
    ]
}

fn record_values<'a>(record: &'a Row, columns: &'a [String]) -> impl Iterator<Item = Value> + 'a {
    columns.iter().map(move |c| record.value(c).clone())
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Serialize sheets to an in-memory XLSX file.
pub fn write_workbook(sheets: &[SheetData]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook
            .add_worksheet()
            .set_name(&sheet.name)
            .map_err(|e| ExportError::Writer(format!("sheet '{}': {e}", sheet.name)))?;

        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, header, &header_format)
                .map_err(|e| ExportError::Writer(e.to_string()))?;
        }

        for (r, row) in sheet.rows.iter().enumerate() {
            let xl_row = (r + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let column = || sheet.headers.get(col).cloned().unwrap_or_default();
                match value {
                    Value::Null => {}
                    Value::Number(n) => {
                        if !n.is_finite() {
                            return Err(ExportError::NonFiniteNumber {
                                sheet: sheet.name.clone(),
                                row: r + 1,
                                column: column(),
                            });
                        }
                        worksheet
                            .write_number(xl_row, col as u16, *n)
                            .map_err(|e| ExportError::Writer(e.to_string()))?;
                    }
                    Value::Text(s) => {
                        let len = s.chars().count();
                        if len > MAX_CELL_CHARS {
                            return Err(ExportError::TextTooLong {
                                sheet: sheet.name.clone(),
                                row: r + 1,
                                column: column(),
                                len,
                            });
                        }
                        worksheet
                            .write_string(xl_row, col as u16, s)
                            .map_err(|e| ExportError::Writer(e.to_string()))?;
                    }
                }
            }
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| ExportError::Writer(format!("failed to save workbook: {e}")))
}

/// Pretty JSON of the full batch document.
pub fn write_json(batch: &Batch) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec_pretty(&BatchDocument::new(batch))?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Reader, Xlsx};
    use crosslink_recon::model::Dataset;
    use crosslink_recon::{run, BatchInput, EngineConfig, MatchClassification, MatchType, Rule};

    use super::*;

    fn email_rule() -> Rule {
        Rule {
            rule_id: 1,
            rule_name: "Email".into(),
            description: String::new(),
            source_field: "email".into(),
            target_field: "email".into(),
            select_if_both_same: true,
            match_classification: MatchClassification::Match,
            match_type: MatchType::Exact,
            rationale_statement: String::new(),
            code_block: None,
        }
    }

    fn batch(source: &[&str], target: &[&str], rules: &[Rule]) -> Batch {
        let ds = |name: &str, values: &[&str]| {
            Dataset::new(
                name,
                vec!["email".into()],
                values
                    .iter()
                    .map(|v| Row::from_pairs([("email", Value::from(*v))]))
                    .collect(),
            )
        };
        let source = ds("s.csv", source);
        let target = ds("t.csv", target);
        let output = run(&EngineConfig::default(), rules, &source, &target).unwrap();
        Batch::new(
            BatchInput {
                batch_name: "Test".into(),
                source_file_name: "s.csv".into(),
                target_file_name: "t.csv".into(),
                source_dataset: source,
                target_dataset: target,
                rerun_of: None,
            },
            rules,
            output,
        )
    }

    #[test]
    fn sheets_follow_batch_sections() {
        let b = batch(&["a@x.com", "z@x.com"], &["a@x.com", "b@x.com"], &[email_rule()]);
        let sheets = batch_sheets(&b);
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![SHEET_SUMMARY, SHEET_MATCHED, SHEET_SUSPECTED, SHEET_UNMATCHED_SOURCE, SHEET_UNMATCHED_TARGET]
        );
        assert_eq!(sheets[1].rows.len(), 1);
        assert_eq!(sheets[1].headers.last().map(String::as_str), Some("target.email"));
        assert!(sheets[2].rows.is_empty());
        assert_eq!(sheets[3].rows[0], vec![Value::Number(1.0), Value::from("z@x.com")]);
        assert_eq!(sheets[4].rows[0], vec![Value::Number(1.0), Value::from("b@x.com")]);
    }

    #[test]
    fn empty_sections_still_get_headers() {
        // No rules: nothing matches, so Matched and Suspected are empty
        let b = batch(&["a@x.com"], &["b@x.com"], &[]);
        let bytes = write_workbook(&batch_sheets(&b)).unwrap();

        let mut wb: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        assert_eq!(wb.sheet_names().len(), 5);
        let matched = wb.worksheet_range(SHEET_MATCHED).unwrap();
        assert_eq!(matched.height(), 1);
        let first = matched.rows().next().unwrap();
        assert_eq!(first[0].to_string(), "source_index");
    }

    #[test]
    fn oversized_text_is_rejected() {
        let sheet = SheetData {
            name: "Big".into(),
            headers: vec!["note".into()],
            rows: vec![vec![Value::Text("x".repeat(MAX_CELL_CHARS + 1))]],
        };
        let err = write_workbook(&[sheet]).unwrap_err();
        assert!(matches!(err, ExportError::TextTooLong { row: 1, .. }));
    }

    #[test]
    fn non_finite_number_is_rejected() {
        let sheet = SheetData {
            name: "Nums".into(),
            headers: vec!["n".into()],
            rows: vec![vec![Value::Number(f64::INFINITY)]],
        };
        let err = write_workbook(&[sheet]).unwrap_err();
        assert!(matches!(err, ExportError::NonFiniteNumber { .. }));
    }

    #[test]
    fn json_document_has_all_sections() {
        let b = batch(&["a@x.com"], &["a@x.com", "b@x.com"], &[email_rule()]);
        let json: serde_json::Value = serde_json::from_slice(&write_json(&b).unwrap()).unwrap();
        assert_eq!(json["batch_name"], "Test");
        assert_eq!(json["matched"].as_array().unwrap().len(), 1);
        assert_eq!(json["unmatched_target"][0]["record"]["email"], "b@x.com");
        assert_eq!(json["summary"]["matched"], 1);
    }
}
