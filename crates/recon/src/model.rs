use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Cell values + rows
// ---------------------------------------------------------------------------

/// A scalar cell value from either dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

/// Integers longer than this stay text: f64 cannot hold them exactly.
const MAX_NUMERIC_DIGITS: usize = 15;

impl Value {
    /// Infer a value from raw delimited text.
    ///
    /// Only canonical decimal literals become numbers, so identifiers such as
    /// `00123` or `+44...` keep their exact spelling.
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if is_canonical_number(trimmed) {
            if let Ok(n) = trimmed.parse::<f64>() {
                if n.is_finite() {
                    return Value::Number(n);
                }
            }
        }
        Value::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used for comparisons, rationale and export.
    pub fn display(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Number(n) => Cow::Owned(format_number(*n)),
        }
    }

    /// Numeric reading: numbers as-is, text only when it parses cleanly.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Null => None,
        }
    }

    /// Equality across representations: `Number(5)` equals `Text("5")`.
    /// Nulls never compare equal.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.display() == other.display(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// Integers without decimals, everything else in shortest form.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn is_canonical_number(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if int.is_empty() || int.len() > MAX_NUMERIC_DIGITS {
        return false;
    }
    if !int.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if int.len() > 1 && int.starts_with('0') {
        return false;
    }
    match frac {
        Some(f) => !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}

/// One record: field name → value, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Append a field. A repeated name replaces the earlier value in place.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Value for `name`, `Null` when the column is absent.
    pub fn value(&self, name: &str) -> &Value {
        const NULL: Value = Value::Null;
        self.get(name).unwrap_or(&NULL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every field is null (blank spreadsheet line).
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_null())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field name to scalar value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((k, v)) = access.next_entry::<String, Value>()? {
                    row.push(k, v);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// A parsed input file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub type RuleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchClassification {
    #[serde(rename = "MATCH", alias = "match", alias = "Match")]
    Match,
    #[serde(rename = "IGNORE", alias = "ignore", alias = "Ignore")]
    Ignore,
}

impl MatchClassification {
    pub const ALL: [MatchClassification; 2] = [Self::Match, Self::Ignore];
}

impl fmt::Display for MatchClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "MATCH"),
            Self::Ignore => write!(f, "IGNORE"),
        }
    }
}

/// How a rule compares its two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[serde(alias = "EXACT", alias = "Exact")]
    Exact,
    /// Trimmed, case-folded, inner whitespace collapsed.
    #[serde(alias = "NORMALIZED", alias = "Normalized")]
    Normalized,
    /// String similarity at or above the configured threshold.
    #[serde(alias = "FUZZY", alias = "Fuzzy")]
    Fuzzy,
    /// Both numeric, absolute difference within the configured tolerance.
    #[serde(alias = "NUMERIC", alias = "Numeric")]
    Numeric,
    /// Decided entirely by the rule's code block.
    #[serde(alias = "CUSTOM", alias = "Custom")]
    Custom,
}

impl MatchType {
    pub const ALL: [MatchType; 5] = [
        Self::Exact,
        Self::Normalized,
        Self::Fuzzy,
        Self::Numeric,
        Self::Custom,
    ];
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Normalized => write!(f, "normalized"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Numeric => write!(f, "numeric"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A user-defined field-to-field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: RuleId,
    pub rule_name: String,
    #[serde(default)]
    pub description: String,
    pub source_field: String,
    pub target_field: String,
    #[serde(default)]
    pub select_if_both_same: bool,
    pub match_classification: MatchClassification,
    pub match_type: MatchType,
    #[serde(default)]
    pub rationale_statement: String,
    #[serde(default)]
    pub code_block: Option<String>,
}

impl Rule {
    /// Code block with surrounding whitespace removed; `None` when blank.
    pub fn code(&self) -> Option<&str> {
        self.code_block
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Why a target row is linked to a source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEvidence {
    pub target_index: usize,
    pub hits: usize,
    /// Winning rule, frozen at match time.
    pub rule: Rule,
    /// Every rule that fired for the pair, in rule-set order.
    pub matched_rule_ids: Vec<RuleId>,
    pub rationale_statement: String,
}

/// Final state of one source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Matched(PairEvidence),
    Suspected { candidates: Vec<PairEvidence> },
    Unmatched,
}

/// Engine output: one outcome per source row (by index) plus the target rows
/// nobody claimed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sources: Vec<SourceOutcome>,
    pub unmatched_targets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_index: usize,
    pub target_index: usize,
    pub rule: Rule,
    pub rationale_statement: String,
    pub hits: usize,
    pub matched_rule_ids: Vec<RuleId>,
    pub source_record: Row,
    pub target_record: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectTarget {
    pub target_index: usize,
    pub target_record: Row,
    pub rule: Rule,
    pub rationale_statement: String,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectGroup {
    pub source_index: usize,
    pub source_record: Row,
    pub targets: Vec<SuspectTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRow {
    pub row_index: usize,
    pub record: Row,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedSet {
    pub unmatched_source: Vec<IndexedRow>,
    pub unmatched_target: Vec<IndexedRow>,
}

impl Classification {
    pub fn matched(&self, source: &Dataset, target: &Dataset) -> Vec<MatchResult> {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(source_index, outcome)| match outcome {
                SourceOutcome::Matched(ev) => Some(MatchResult {
                    source_index,
                    target_index: ev.target_index,
                    rule: ev.rule.clone(),
                    rationale_statement: ev.rationale_statement.clone(),
                    hits: ev.hits,
                    matched_rule_ids: ev.matched_rule_ids.clone(),
                    source_record: record_at(source, source_index),
                    target_record: record_at(target, ev.target_index),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn suspected(&self, source: &Dataset, target: &Dataset) -> Vec<SuspectGroup> {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(source_index, outcome)| match outcome {
                SourceOutcome::Suspected { candidates } => Some(SuspectGroup {
                    source_index,
                    source_record: record_at(source, source_index),
                    targets: candidates
                        .iter()
                        .map(|ev| SuspectTarget {
                            target_index: ev.target_index,
                            target_record: record_at(target, ev.target_index),
                            rule: ev.rule.clone(),
                            rationale_statement: ev.rationale_statement.clone(),
                            hits: ev.hits,
                        })
                        .collect(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn unmatched(&self, source: &Dataset, target: &Dataset) -> UnmatchedSet {
        let unmatched_source = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, SourceOutcome::Unmatched))
            .map(|(i, _)| IndexedRow {
                row_index: i,
                record: record_at(source, i),
            })
            .collect();
        let unmatched_target = self
            .unmatched_targets
            .iter()
            .map(|&i| IndexedRow {
                row_index: i,
                record: record_at(target, i),
            })
            .collect();
        UnmatchedSet {
            unmatched_source,
            unmatched_target,
        }
    }
}

fn record_at(dataset: &Dataset, index: usize) -> Row {
    dataset.rows.get(index).cloned().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Summary + diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconSummary {
    pub matched: usize,
    pub suspected: usize,
    pub unmatched_source: usize,
    pub unmatched_target: usize,
    /// Total target candidates across all suspect groups.
    pub suspect_candidates: usize,
}

/// What the engine did with the rule snapshot, for operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub active_rules: Vec<RuleId>,
    /// Rules hidden by an earlier rule on the same field pair.
    pub shadowed_rules: Vec<RuleId>,
    /// Rules naming a field absent from the datasets.
    pub inert_rules: Vec<RuleId>,
    /// IGNORE rules that claimed their field pair.
    #[serde(default)]
    pub ignored_rules: Vec<RuleId>,
    /// Per-pair evaluation failures, keyed by rule id.
    pub rule_failures: BTreeMap<RuleId, usize>,
    /// Source rows whose definite match collided with another source row.
    pub ambiguous_demotions: usize,
    pub pairs_evaluated: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconOutput {
    pub classification: Classification,
    pub summary: ReconSummary,
    pub diagnostics: RunDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_keeps_identifiers_as_text() {
        assert_eq!(Value::infer("42"), Value::Number(42.0));
        assert_eq!(Value::infer("-3.5"), Value::Number(-3.5));
        assert_eq!(Value::infer("00123"), Value::Text("00123".into()));
        assert_eq!(Value::infer("+44"), Value::Text("+44".into()));
        assert_eq!(Value::infer("1e5"), Value::Text("1e5".into()));
        assert_eq!(Value::infer("1234567890123456789"), Value::Text("1234567890123456789".into()));
        assert_eq!(Value::infer("   "), Value::Null);
    }

    #[test]
    fn same_as_crosses_representations() {
        assert!(Value::Number(5.0).same_as(&Value::Text("5".into())));
        assert!(Value::from("a@x.com").same_as(&Value::from("a@x.com")));
        assert!(!Value::Null.same_as(&Value::Null));
        assert!(!Value::from("A").same_as(&Value::from("a")));
    }

    #[test]
    fn row_serializes_in_column_order() {
        let row = Row::from_pairs([("zeta", Value::from("z")), ("alpha", Value::Number(1.0))]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":"z","alpha":1.0}"#);
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn row_null_round_trips() {
        let back: Row = serde_json::from_str(r#"{"a":null,"b":"x"}"#).unwrap();
        assert_eq!(back.value("a"), &Value::Null);
        assert_eq!(back.value("missing"), &Value::Null);
        assert!(!back.is_blank());
    }

    #[test]
    fn classification_serde_uses_status_tag() {
        let json = serde_json::to_value(SourceOutcome::Unmatched).unwrap();
        assert_eq!(json["status"], "unmatched");
    }

    #[test]
    fn match_type_accepts_upper_case() {
        let t: MatchType = serde_json::from_str("\"EXACT\"").unwrap();
        assert_eq!(t, MatchType::Exact);
        let c: MatchClassification = serde_json::from_str("\"match\"").unwrap();
        assert_eq!(c, MatchClassification::Match);
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"MATCH\"");
    }
}
