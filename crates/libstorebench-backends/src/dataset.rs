//! Dataset file readers and predicate evaluation shared by all adapters.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use libstorebench_core::config::{NumericOp, PredicateSpec};

use crate::error::{BackendError, Result};

/// A loaded dataset row: one JSON object.
pub type Document = Map<String, Value>;

/// Field set on updated documents and matched by the delete step.
pub const UPDATED_FLAG: &str = "benchmark_updated";

/// Read a dataset file, dispatching on extension.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") | Some("jsonl") => read_json_lines(path),
        Some("csv") => read_csv(path),
        _ => Err(BackendError::UnsupportedFormat(
            path.display().to_string(),
        )),
    }
}

/// JSON-lines reader. Malformed lines are skipped.
fn read_json_lines(path: &Path) -> Result<Vec<Document>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut documents = Vec::new();
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(&line) {
            Ok(doc) => documents.push(doc),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("skipped {} malformed lines in {}", skipped, path.display());
    }
    Ok(documents)
}

/// CSV reader. Values that parse as numbers become JSON numbers so
/// numeric predicates apply to them; malformed records are skipped.
fn read_csv(path: &Path) -> Result<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut documents = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let mut doc = Document::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            doc.insert(header.to_string(), infer_value(field));
        }
        documents.push(doc);
    }
    if skipped > 0 {
        debug!("skipped {} malformed records in {}", skipped, path.display());
    }
    Ok(documents)
}

fn infer_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = field.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = field.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(field.to_string())
}

/// A document matches when the numeric comparison holds or the text
/// field contains any keyword, case-insensitively.
pub fn matches_predicate(doc: &Document, predicate: &PredicateSpec) -> bool {
    if let Some(value) = doc.get(&predicate.numeric_field).and_then(Value::as_f64) {
        let hit = match predicate.numeric_op {
            NumericOp::Gt => value > predicate.threshold,
            NumericOp::Gte => value >= predicate.threshold,
        };
        if hit {
            return true;
        }
    }
    if let Some(text) = doc.get(&predicate.text_field).and_then(Value::as_str) {
        let lower = text.to_lowercase();
        return predicate
            .keywords
            .iter()
            .any(|keyword| lower.contains(&keyword.to_lowercase()));
    }
    false
}

/// Mark a document as touched by the update step.
pub fn flag_updated(doc: &mut Document) {
    doc.insert(UPDATED_FLAG.to_string(), Value::Bool(true));
}

pub fn is_flagged(doc: &Document) -> bool {
    doc.get(UPDATED_FLAG).and_then(Value::as_bool).unwrap_or(false)
}
