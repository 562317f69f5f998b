// CSV/TSV ingestion

use crosslink_recon::model::{Dataset, Value};

use crate::dataset::build_dataset;
use crate::error::DatasetError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn parse_csv(file_name: &str, bytes: &[u8]) -> Result<Dataset, DatasetError> {
    let content = decode_text(bytes);
    let delimiter = sniff_delimiter(&content);
    log::debug!("{file_name}: sniffed delimiter {:?}", delimiter as char);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DatasetError::Csv {
            file: file_name.to_string(),
            message: e.to_string(),
        })?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match header {
            None => header = Some(record.iter().map(|f| f.trim().to_string()).collect()),
            Some(_) => rows.push(record.iter().map(Value::infer).collect()),
        }
    }

    let header = header.ok_or_else(|| DatasetError::NoHeader(file_name.to_string()))?;
    build_dataset(file_name, header, rows)
}

/// Decode bytes to text: UTF-8 (BOM stripped) or Windows-1252 as a fallback
/// (common for Excel-exported CSVs).
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Delimiters tried by [`sniff_delimiter`]; earlier entries win ties.
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_LINES: usize = 10;

/// Pick the delimiter whose field count on the header line is repeated by
/// the most sample lines, weighted by that count. Falls back to comma.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let mut best = (0u64, b',');
    for delim in DELIMITERS {
        let mut widths = sample.iter().map(|line| field_count(line, delim));
        let Some(width) = widths.next().filter(|&w| w > 1) else {
            continue;
        };
        let agreeing = 1 + widths.filter(|&w| w == width).count() as u64;
        let score = agreeing * width as u64;
        if score > best.0 {
            best = (score, delim);
        }
    }
    best.1
}

/// Quote-aware field count of a single line.
fn field_count(line: &str, delim: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}
