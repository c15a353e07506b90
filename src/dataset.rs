//! Evaluation datasets
//!
//! Loads the shared record schema produced by upstream retrieval pipelines:
//! one JSON array of objects, each carrying a ranked chunk list and a set of
//! gold evidence strings. Chunk and evidence fields arrive in several
//! shapes, so loading coerces them permissively — unrecognized entries are
//! dropped (logged at debug level), never raised.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Recognized chunk-text keys, checked in priority order; first hit wins.
const CHUNK_TEXT_KEYS: [&str; 5] = ["chunk_content", "content", "text", "raw", "value"];

/// One query's retrieval output plus its gold evidence.
///
/// Chunk order is retrieval rank (rank 1 first) and is never reordered.
/// A record with no evidence is excluded from aggregation but is not an
/// error — it is reported separately as a data-quality signal.
#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub question_id: String,
    /// Original query text, carried only for diagnostics export.
    pub question: Option<String>,
    /// Candidate chunk texts, ordered by retrieval rank.
    pub chunks: Vec<String>,
    /// Gold evidence strings that should be covered by the chunks.
    pub evidence: Vec<String>,
}

impl EvaluationRecord {
    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }
}

/// Raw record as it appears on disk, before coercion.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    chunks: Option<Value>,
    #[serde(default)]
    evidence: Option<Value>,
    #[serde(default)]
    evidences: Option<Value>,
}

impl RawRecord {
    /// Coerce into a clean record. `idx` supplies the positional
    /// `question_id` placeholder when the field is absent.
    fn coerce(self, idx: usize) -> EvaluationRecord {
        let question_id = self
            .question_id
            .unwrap_or_else(|| format!("idx{}", idx));
        let chunks = coerce_chunks(self.chunks.as_ref());
        // `evidence` wins over `evidences` when both keys are present.
        let evidence = coerce_evidence(self.evidence.as_ref().or(self.evidences.as_ref()));

        EvaluationRecord {
            question_id,
            question: self.question,
            chunks,
            evidence,
        }
    }
}

/// Extract chunk texts from the heterogeneous `chunks` field.
///
/// Accepted element shapes: a plain string, or an object exposing the text
/// under one of `CHUNK_TEXT_KEYS` (priority order). Everything else is
/// dropped.
fn coerce_chunks(raw: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = raw else {
        if let Some(other) = raw {
            if !other.is_null() {
                tracing::debug!("dropping non-array chunks field: {}", other);
            }
        }
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => out.push(s.clone()),
            Value::Object(map) => {
                let text = CHUNK_TEXT_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                match text {
                    Some(t) => out.push(t.to_string()),
                    None => tracing::debug!("dropping chunk object without a text key"),
                }
            }
            other => tracing::debug!("dropping unrecognized chunk entry: {}", other),
        }
    }
    out
}

/// Keep only string elements of the evidence array.
fn coerce_evidence(raw: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            other => {
                tracing::debug!("dropping non-string evidence entry: {}", other);
                None
            }
        })
        .collect()
}

/// Load a dataset file: a JSON array of records.
pub fn load_dataset(path: &Path) -> Result<Vec<EvaluationRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;

    let raw: Vec<RawRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset: {}", path.display()))?;

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(idx, r)| r.coerce(idx))
        .collect())
}

/// Data-quality summary for a loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub records: usize,
    pub without_evidence: usize,
    pub without_chunks: usize,
    pub total_chunks: usize,
    pub total_evidence: usize,
}

impl DatasetSummary {
    pub fn avg_chunks_per_record(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.total_chunks as f64 / self.records as f64
        }
    }
}

/// Summarize a dataset for validation output.
pub fn summarize(records: &[EvaluationRecord]) -> DatasetSummary {
    DatasetSummary {
        records: records.len(),
        without_evidence: records.iter().filter(|r| !r.has_evidence()).count(),
        without_chunks: records.iter().filter(|r| r.chunks.is_empty()).count(),
        total_chunks: records.iter().map(|r| r.chunks.len()).sum(),
        total_evidence: records.iter().map(|r| r.evidence.len()).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_from(value: Value) -> EvaluationRecord {
        let raw: RawRecord = serde_json::from_value(value).unwrap();
        raw.coerce(7)
    }

    #[test]
    fn test_coerce_string_chunks() {
        let rec = record_from(json!({
            "question_id": "q1",
            "chunks": ["a", "b"],
            "evidence": ["e"]
        }));
        assert_eq!(rec.chunks, vec!["a", "b"]);
        assert_eq!(rec.evidence, vec!["e"]);
    }

    #[test]
    fn test_coerce_object_chunks_key_priority() {
        let rec = record_from(json!({
            "chunks": [
                {"content": "second", "chunk_content": "first"},
                {"text": "third"},
                {"unrelated": 1},
                42
            ],
            "evidence": ["e"]
        }));
        // chunk_content outranks content; unrecognized entries are dropped.
        assert_eq!(rec.chunks, vec!["first", "third"]);
    }

    #[test]
    fn test_coerce_non_array_chunks_dropped() {
        let rec = record_from(json!({"chunks": "not a list", "evidence": ["e"]}));
        assert!(rec.chunks.is_empty());
    }

    #[test]
    fn test_evidence_key_wins_over_evidences() {
        let rec = record_from(json!({
            "chunks": [],
            "evidence": ["a"],
            "evidences": ["b", "c"]
        }));
        assert_eq!(rec.evidence, vec!["a"]);

        let rec = record_from(json!({"chunks": [], "evidences": ["b", "c"]}));
        assert_eq!(rec.evidence, vec!["b", "c"]);
    }

    #[test]
    fn test_evidence_non_string_entries_dropped() {
        let rec = record_from(json!({"evidence": ["keep", 5, null, ["nested"]]}));
        assert_eq!(rec.evidence, vec!["keep"]);
    }

    #[test]
    fn test_question_id_placeholder() {
        let rec = record_from(json!({"chunks": [], "evidence": []}));
        assert_eq!(rec.question_id, "idx7");
        assert!(!rec.has_evidence());
    }

    #[test]
    fn test_load_dataset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"[
                {"question_id": "q0", "question": "what time?",
                 "chunks": ["meeting at 3pm"], "evidence": ["meeting at 3pm"]},
                {"chunks": [{"content": "x"}]}
            ]"#,
        )
        .unwrap();

        let records = load_dataset(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question_id, "q0");
        assert_eq!(records[1].question_id, "idx1");
        assert!(!records[1].has_evidence());

        let summary = summarize(&records);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.without_evidence, 1);
        assert_eq!(summary.total_chunks, 2);
    }

    #[test]
    fn test_load_dataset_bad_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_dataset(&path).is_err());
    }
}
