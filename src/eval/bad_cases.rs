//! Bad-case extraction for manual review
//!
//! Selects outlier records from the per-record metric stream: every record
//! whose metric falls strictly below a threshold, and/or the bottom-N
//! records per metric. Selections are merged and deduplicated by
//! `(idx, question_id)` — the first matching rule supplies the reason tag.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::dataset::EvaluationRecord;
use crate::eval::aggregate::PerRecordMetrics;
use crate::eval::quality::MetricSet;
use crate::config::Cutoff;

/// Selection rules for the extractor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BadCaseConfig {
    /// `metric -> cutoff value`; selects records with `metric < value`.
    pub thresholds: BTreeMap<String, f64>,
    /// `metric -> N`; selects the N records with the lowest metric value.
    pub bottoms: BTreeMap<String, usize>,
    /// Attach the record's original question text to each entry.
    #[serde(skip)]
    pub include_question: bool,
}

impl BadCaseConfig {
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty() && self.bottoms.is_empty()
    }
}

/// One flagged record.
#[derive(Debug, Clone, Serialize)]
pub struct BadCaseEntry {
    pub idx: usize,
    pub question_id: String,
    /// Which rule selected this record, e.g. `thresh:recall<0.3` or
    /// `bottom:f1@5`.
    pub reason: String,
    pub metrics: MetricSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Bad cases grouped per cutoff label, ready for export.
#[derive(Debug, Serialize)]
pub struct BadCaseReport {
    pub config: BadCaseConfig,
    /// Entry count per cutoff label.
    pub counts: BTreeMap<String, usize>,
    pub by_k: BTreeMap<String, Vec<BadCaseEntry>>,
}

/// Select outlier records from per-record metrics, grouped by cutoff.
///
/// `records` supplies the optional question text; it must be the dataset
/// the metrics were computed from, indexed by `idx`.
pub fn select_bad_cases(
    per_record: &BTreeMap<Cutoff, Vec<PerRecordMetrics>>,
    records: &[EvaluationRecord],
    config: &BadCaseConfig,
) -> BadCaseReport {
    let mut by_k = BTreeMap::new();
    let mut counts = BTreeMap::new();

    for (cutoff, entries) in per_record {
        let mut selected: Vec<(String, &PerRecordMetrics)> = Vec::new();

        for (metric, thr) in &config.thresholds {
            for pr in entries {
                if pr.metrics.get(metric).unwrap_or(0.0) < *thr {
                    selected.push((format!("thresh:{metric}<{thr}"), pr));
                }
            }
        }

        for (metric, n) in &config.bottoms {
            let mut worst: Vec<&PerRecordMetrics> = entries.iter().collect();
            // Stable ascending sort keeps dataset order among ties.
            worst.sort_by(|a, b| {
                let va = a.metrics.get(metric).unwrap_or(0.0);
                let vb = b.metrics.get(metric).unwrap_or(0.0);
                va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
            });
            for pr in worst.into_iter().take(*n) {
                selected.push((format!("bottom:{metric}@{n}"), pr));
            }
        }

        let mut seen: HashSet<(usize, &str)> = HashSet::new();
        let mut items = Vec::new();
        for (reason, pr) in selected {
            if !seen.insert((pr.idx, pr.question_id.as_str())) {
                continue;
            }
            let question = if config.include_question {
                records.get(pr.idx).and_then(|r| r.question.clone())
            } else {
                None
            };
            items.push(BadCaseEntry {
                idx: pr.idx,
                question_id: pr.question_id.clone(),
                reason,
                metrics: pr.metrics,
                question,
            });
        }

        counts.insert(cutoff.label(), items.len());
        by_k.insert(cutoff.label(), items);
    }

    BadCaseReport {
        config: config.clone(),
        counts,
        by_k,
    }
}

/// Flatten a bad-case report to CSV, one row per (cutoff, record) pair.
pub fn bad_cases_to_csv(report: &BadCaseReport) -> String {
    let mut csv = String::from("k,idx,question_id,reason,precision,recall,f1,ndcg,question\n");
    for (label, items) in &report.by_k {
        for entry in items {
            csv.push_str(&format!(
                "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{}\n",
                label,
                entry.idx,
                escape_csv(&entry.question_id),
                escape_csv(&entry.reason),
                entry.metrics.precision,
                entry.metrics.recall,
                entry.metrics.f1,
                entry.metrics.ndcg,
                escape_csv(entry.question.as_deref().unwrap_or("")),
            ));
        }
    }
    csv
}

/// Simple CSV field escaping.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
