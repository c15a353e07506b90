//! Dataset-level aggregation
//!
//! One sequential pass over all records, maintaining per-cutoff macro sums
//! (mean of per-record metrics) and per-cutoff micro sums (pooled raw
//! counts). The two aggregations are mathematically distinct and will
//! generally differ: micro recall is total-matched-evidence over
//! total-gold-evidence across the dataset; macro recall is the unweighted
//! mean of per-record recalls.
//!
//! Records without evidence are skipped (reported, not errors); a failure
//! while scoring one record is recorded and the batch continues.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{Cutoff, EvalOptions};
use crate::dataset::EvaluationRecord;
use crate::eval::quality::{counts_to_metrics, evaluate_record, Counts, MetricSet};

/// Metrics for one record at one cutoff, as kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PerRecordMetrics {
    pub idx: usize,
    pub question_id: String,
    pub metrics: MetricSet,
}

/// A record skipped because it carries no gold evidence.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub idx: usize,
    pub question_id: String,
}

/// Running macro state for one cutoff.
#[derive(Debug, Default)]
struct MacroAccum {
    precision: f64,
    recall: f64,
    f1: f64,
    ndcg: f64,
    records: usize,
}

impl MacroAccum {
    fn add(&mut self, m: &MetricSet) {
        self.precision += m.precision;
        self.recall += m.recall;
        self.f1 += m.f1;
        self.ndcg += m.ndcg;
        self.records += 1;
    }

    fn mean(&self) -> MetricSet {
        if self.records == 0 {
            return MetricSet::default();
        }
        let n = self.records as f64;
        MetricSet {
            precision: self.precision / n,
            recall: self.recall / n,
            f1: self.f1 / n,
            ndcg: self.ndcg / n,
        }
    }
}

/// Everything one evaluation pass produces.
#[derive(Debug)]
pub struct EvalSummary {
    /// Mean of per-record metrics, per cutoff.
    pub macro_avgs: BTreeMap<Cutoff, MetricSet>,
    /// Metrics of the pooled raw counts, per cutoff.
    pub micro_avgs: BTreeMap<Cutoff, MetricSet>,
    /// Number of records contributing to each cutoff's macro mean.
    pub counts: BTreeMap<Cutoff, usize>,
    /// `(index, error description)` for records that failed to score.
    pub failed: Vec<(usize, String)>,
    /// Per-record metrics retained for diagnostics, per cutoff.
    pub per_record: BTreeMap<Cutoff, Vec<PerRecordMetrics>>,
    /// Pooled raw counts, per cutoff, kept for auditability.
    pub micro_sums: BTreeMap<Cutoff, Counts>,
    /// Records excluded for having no gold evidence.
    pub skipped_no_evidence: Vec<SkippedRecord>,
}

/// Evaluate a dataset in one pass.
///
/// Takes any record iterator so the caller can wrap it in a progress bar.
/// Aggregate state is built fresh per call; nothing persists across runs.
pub fn eval_dataset<'a, I>(records: I, opts: &EvalOptions) -> EvalSummary
where
    I: IntoIterator<Item = &'a EvaluationRecord>,
{
    let cutoffs = opts.cutoffs.cutoffs();

    let mut macro_accum: BTreeMap<Cutoff, MacroAccum> = cutoffs
        .iter()
        .map(|c| (*c, MacroAccum::default()))
        .collect();
    let mut micro_sums: BTreeMap<Cutoff, Counts> =
        cutoffs.iter().map(|c| (*c, Counts::default())).collect();
    let mut per_record: BTreeMap<Cutoff, Vec<PerRecordMetrics>> =
        cutoffs.iter().map(|c| (*c, Vec::new())).collect();
    let mut failed = Vec::new();
    let mut skipped_no_evidence = Vec::new();

    for (idx, record) in records.into_iter().enumerate() {
        if !record.has_evidence() {
            skipped_no_evidence.push(SkippedRecord {
                idx,
                question_id: record.question_id.clone(),
            });
            continue;
        }

        let per_k = match evaluate_record(record, opts) {
            Ok(per_k) => per_k,
            Err(e) => {
                tracing::warn!("record {} failed to evaluate: {e:#}", idx);
                failed.push((idx, format!("{e:#}")));
                continue;
            }
        };

        for (cutoff, eval) in per_k {
            macro_accum.entry(cutoff).or_default().add(&eval.metrics);
            *micro_sums.entry(cutoff).or_default() += eval.counts;
            per_record
                .entry(cutoff)
                .or_default()
                .push(PerRecordMetrics {
                    idx,
                    question_id: record.question_id.clone(),
                    metrics: eval.metrics,
                });
        }
    }

    let macro_avgs = macro_accum
        .iter()
        .map(|(c, acc)| (*c, acc.mean()))
        .collect();
    let counts = macro_accum
        .iter()
        .map(|(c, acc)| (*c, acc.records))
        .collect();
    let micro_avgs = micro_sums
        .iter()
        .map(|(c, sums)| (*c, counts_to_metrics(sums, opts.precision_mode)))
        .collect();

    EvalSummary {
        macro_avgs,
        micro_avgs,
        counts,
        failed,
        per_record,
        micro_sums,
        skipped_no_evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CutoffSpec;

    fn record(qid: &str, chunks: &[&str], evidence: &[&str]) -> EvaluationRecord {
        EvaluationRecord {
            question_id: qid.to_string(),
            question: None,
            chunks: chunks.iter().map(|s| s.to_string()).collect(),
            evidence: evidence.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn opts(spec: &str) -> EvalOptions {
        EvalOptions::new(CutoffSpec::parse(spec).unwrap())
    }

    #[test]
    fn test_macro_and_micro_recall_differ() {
        // r1: 1 gold, 1 covered -> recall 1.0
        // r2: 3 gold, 1 covered -> recall 1/3
        // macro recall = (1.0 + 1/3) / 2 = 2/3
        // micro recall = (1 + 1) / (1 + 3) = 1/2
        let records = vec![
            record("r1", &["alpha beta gamma"], &["alpha beta gamma"]),
            record(
                "r2",
                &["delta epsilon zeta"],
                &["delta epsilon zeta", "eta theta iota", "kappa lambda mu"],
            ),
        ];

        let summary = eval_dataset(records.iter(), &opts("all"));
        let macro_recall = summary.macro_avgs[&Cutoff::All].recall;
        let micro_recall = summary.micro_avgs[&Cutoff::All].recall;

        assert!((macro_recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((micro_recall - 0.5).abs() < 1e-9);
        assert!((macro_recall - micro_recall).abs() > 1e-6);

        // Micro recall is exactly pooled tp over pooled gold.
        let sums = &summary.micro_sums[&Cutoff::All];
        assert_eq!(sums.tp_evidence, 2);
        assert_eq!(sums.gold, 4);
    }

    #[test]
    fn test_no_evidence_records_skipped() {
        let records = vec![
            record("with", &["alpha beta gamma"], &["alpha beta gamma"]),
            record("without", &["some chunk"], &[]),
        ];

        let summary = eval_dataset(records.iter(), &opts("all,5"));

        assert_eq!(summary.skipped_no_evidence.len(), 1);
        assert_eq!(summary.skipped_no_evidence[0].idx, 1);
        assert_eq!(summary.skipped_no_evidence[0].question_id, "without");
        // Skipped record contributes to no denominator.
        assert_eq!(summary.counts[&Cutoff::All], 1);
        assert_eq!(summary.counts[&Cutoff::Fixed(5)], 1);
        assert_eq!(summary.micro_sums[&Cutoff::All].gold, 1);
        // With a single perfect record the macro mean stays exact.
        assert!((summary.macro_avgs[&Cutoff::All].recall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_dataset_yields_zeroes() {
        let records: Vec<EvaluationRecord> = Vec::new();
        let summary = eval_dataset(records.iter(), &opts("3,5"));

        for cutoff in [Cutoff::Fixed(3), Cutoff::Fixed(5)] {
            assert_eq!(summary.counts[&cutoff], 0);
            assert_eq!(summary.macro_avgs[&cutoff], MetricSet::default());
            assert_eq!(summary.micro_avgs[&cutoff], MetricSet::default());
        }
        assert!(summary.failed.is_empty());
        assert!(summary.skipped_no_evidence.is_empty());
    }

    #[test]
    fn test_all_metrics_in_unit_interval() {
        let records = vec![
            record("a", &["alpha beta", "gamma delta", "epsilon zeta"], &["alpha beta"]),
            record("b", &["one two", "alpha beta"], &["alpha beta", "missing text"]),
            record("c", &[], &["nothing retrieved"]),
        ];

        let summary = eval_dataset(records.iter(), &opts("all,1,2,10"));
        for table in [&summary.macro_avgs, &summary.micro_avgs] {
            for m in table.values() {
                for v in [m.precision, m.recall, m.f1, m.ndcg] {
                    assert!((0.0..=1.0).contains(&v), "metric out of range: {v}");
                }
            }
        }
    }

    #[test]
    fn test_per_record_lists_track_contributors() {
        let records = vec![
            record("q0", &["alpha beta"], &["alpha beta"]),
            record("skip", &["x"], &[]),
            record("q2", &["gamma delta"], &["gamma delta"]),
        ];

        let summary = eval_dataset(records.iter(), &opts("3"));
        let entries = &summary.per_record[&Cutoff::Fixed(3)];
        assert_eq!(entries.len(), 2);
        // Original dataset indices survive the skip.
        assert_eq!(entries[0].idx, 0);
        assert_eq!(entries[1].idx, 2);
        assert_eq!(entries[1].question_id, "q2");
    }
}
