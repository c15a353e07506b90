//! Per-record counts and metric computation
//!
//! For one query the evaluator produces raw `Counts` at every requested
//! cutoff; `counts_to_metrics` turns counts into precision/recall/F1/nDCG.
//! Counts are kept separate from metrics so they can also be pooled across
//! records for micro aggregation.

use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ops::AddAssign;

use crate::config::{Cutoff, EvalOptions, PrecisionMode};
use crate::dataset::EvaluationRecord;
use crate::eval::matching::evidence_match;
use crate::normalize::{normalize, strip_speaker_prefix};

/// Metric names, in report order.
pub const METRIC_KEYS: [&str; 4] = ["precision", "recall", "f1", "ndcg"];

/// Raw counts for one (record, cutoff) pair.
///
/// Element-wise addable, so micro aggregation is a plain running sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Counts {
    /// Distinct evidence strings covered by at least one retained chunk.
    /// Matching the same evidence from two chunks counts once.
    pub tp_evidence: u64,
    /// Chunk count after applying the cutoff.
    pub retrieved: u64,
    /// Total evidence count for the record (cutoff-independent).
    pub gold: u64,
    /// Retained chunks that matched at least one evidence string.
    pub rel_chunks: u64,
    pub dcg: f64,
    pub idcg: f64,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.tp_evidence += rhs.tp_evidence;
        self.retrieved += rhs.retrieved;
        self.gold += rhs.gold;
        self.rel_chunks += rhs.rel_chunks;
        self.dcg += rhs.dcg;
        self.idcg += rhs.idcg;
    }
}

/// Final metrics for one (record, cutoff) pair, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSet {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub ndcg: f64,
}

impl MetricSet {
    /// Look up a metric by name (for threshold/bottom-N selection rules).
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "precision" => Some(self.precision),
            "recall" => Some(self.recall),
            "f1" => Some(self.f1),
            "ndcg" => Some(self.ndcg),
            _ => None,
        }
    }
}

/// Compute raw counts for one record at one cutoff.
///
/// Chunks are truncated to the cutoff (rank order preserved), then every
/// retained chunk is tested against every evidence string. DCG credits each
/// relevant chunk at its 1-based rank within the truncated list; IDCG
/// front-loads `min(rel_chunks, retrieved)` hits. Capping by `rel_chunks`
/// rather than `gold` keeps nDCG ≤ 1 when several chunks independently
/// cover the same evidence item.
pub fn evaluate_counts(
    chunks: &[String],
    evidence: &[String],
    cutoff: Cutoff,
    contain_threshold: f64,
) -> Counts {
    let retained = match cutoff {
        Cutoff::Fixed(k) => &chunks[..k.min(chunks.len())],
        Cutoff::All => chunks,
    };

    let chunks_n: Vec<String> = retained
        .iter()
        .map(|c| normalize(strip_speaker_prefix(c)))
        .collect();
    let evidence_n: Vec<String> = evidence
        .iter()
        .map(|e| normalize(strip_speaker_prefix(e)))
        .collect();

    let mut hit_evidence: HashSet<&str> = HashSet::new();
    let mut rel_chunks: u64 = 0;
    let mut dcg = 0.0_f64;

    for (i, chunk) in chunks_n.iter().enumerate() {
        let mut matched = false;
        for ev in &evidence_n {
            if evidence_match(chunk, ev, contain_threshold) {
                matched = true;
                hit_evidence.insert(ev.as_str());
            }
        }
        if matched {
            rel_chunks += 1;
            // i is 0-indexed, rank is i+1; discount is log2(rank + 1).
            dcg += 1.0 / ((i as f64 + 2.0).log2());
        }
    }

    let retrieved = chunks_n.len() as u64;
    let ideal_hits = rel_chunks.min(retrieved);
    let idcg: f64 = (1..=ideal_hits)
        .map(|i| 1.0 / ((i as f64 + 1.0).log2()))
        .sum();

    Counts {
        tp_evidence: hit_evidence.len() as u64,
        retrieved,
        gold: evidence_n.len() as u64,
        rel_chunks,
        dcg,
        idcg,
    }
}

/// Convert raw counts into metrics under the selected precision mode.
///
/// Every zero denominator yields 0, never NaN.
pub fn counts_to_metrics(counts: &Counts, mode: PrecisionMode) -> MetricSet {
    let precision = if counts.retrieved > 0 {
        let numerator = match mode {
            PrecisionMode::Ir => counts.rel_chunks,
            PrecisionMode::Legacy => counts.tp_evidence,
        };
        numerator as f64 / counts.retrieved as f64
    } else {
        0.0
    };

    let recall = if counts.gold > 0 {
        counts.tp_evidence as f64 / counts.gold as f64
    } else {
        0.0
    };

    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let ndcg = if counts.idcg > 0.0 {
        counts.dcg / counts.idcg
    } else {
        0.0
    };

    MetricSet {
        precision,
        recall,
        f1,
        ndcg,
    }
}

/// Counts and metrics for one cutoff of one record.
#[derive(Debug, Clone, Copy)]
pub struct RecordEval {
    pub counts: Counts,
    pub metrics: MetricSet,
}

/// Evaluate one record at every requested cutoff.
///
/// Fallible so the aggregator can isolate a bad record without aborting the
/// batch.
pub fn evaluate_record(
    record: &EvaluationRecord,
    opts: &EvalOptions,
) -> Result<BTreeMap<Cutoff, RecordEval>> {
    let mut out = BTreeMap::new();
    for cutoff in opts.cutoffs.cutoffs() {
        let counts = evaluate_counts(
            &record.chunks,
            &record.evidence,
            cutoff,
            opts.contain_threshold,
        );
        let metrics = counts_to_metrics(&counts, opts.precision_mode);
        out.insert(cutoff, RecordEval { counts, metrics });
    }
    Ok(out)
}
