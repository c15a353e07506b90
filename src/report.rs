//! Evaluation report output
//!
//! Serializes one run's results to JSON: run configuration echo, macro and
//! micro tables keyed by cutoff label, per-record metrics, raw pooled
//! counts for audit, and the skipped/failed record lists.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::EvalOptions;
use crate::eval::aggregate::{EvalSummary, PerRecordMetrics, SkippedRecord};
use crate::eval::quality::{Counts, MetricSet};

/// Run configuration echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub input_file: String,
    /// Cutoff labels in report order.
    pub ks: Vec<String>,
    pub contain_threshold: f64,
    pub precision_mode: String,
    pub skipped_no_evidence: usize,
}

impl RunMeta {
    pub fn new(input_file: &Path, opts: &EvalOptions, summary: &EvalSummary) -> Self {
        Self {
            input_file: input_file.display().to_string(),
            ks: opts.cutoffs.labels(),
            contain_threshold: opts.contain_threshold,
            precision_mode: opts.precision_mode.name().to_string(),
            skipped_no_evidence: summary.skipped_no_evidence.len(),
        }
    }
}

/// The full JSON report for one evaluated dataset.
#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub timestamp: String,
    pub meta: RunMeta,
    pub macro_avgs: BTreeMap<String, MetricSet>,
    pub micro_avgs: BTreeMap<String, MetricSet>,
    pub counts: BTreeMap<String, usize>,
    /// `[index, error]` pairs for records that failed to score.
    pub failed: Vec<(usize, String)>,
    pub per_record: BTreeMap<String, Vec<PerRecordMetrics>>,
    /// Raw pooled counts, kept so the micro computation can be re-checked.
    pub micro_sums: BTreeMap<String, Counts>,
    pub skipped_no_evidence: Vec<SkippedRecord>,
}

impl EvalReport {
    pub fn new(input_file: &Path, opts: &EvalOptions, summary: &EvalSummary) -> Self {
        fn by_label<V: Clone>(
            table: &BTreeMap<crate::config::Cutoff, V>,
        ) -> BTreeMap<String, V> {
            table.iter().map(|(c, v)| (c.label(), v.clone())).collect()
        }

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            meta: RunMeta::new(input_file, opts, summary),
            macro_avgs: by_label(&summary.macro_avgs),
            micro_avgs: by_label(&summary.micro_avgs),
            counts: by_label(&summary.counts),
            failed: summary.failed.clone(),
            per_record: by_label(&summary.per_record),
            micro_sums: by_label(&summary.micro_sums),
            skipped_no_evidence: summary.skipped_no_evidence.clone(),
        }
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn save(&self, out_path: &Path) -> Result<()> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(out_path, json)
            .with_context(|| format!("Failed to write report: {}", out_path.display()))?;
        Ok(())
    }
}

/// Resolve where one input's report lands.
///
/// An explicit `--out` file wins (validated upstream to be used with a
/// single input only); otherwise the report is named after the input file
/// inside `out_dir`. A `.json` extension is appended when missing.
pub fn resolve_output_path(
    out_file: Option<&Path>,
    out_dir: &Path,
    input: &Path,
) -> PathBuf {
    let path = match out_file {
        Some(f) => f.to_path_buf(),
        None => {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "eval".to_string());
            out_dir.join(name)
        }
    };

    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    {
        path
    } else {
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        name.push_str(".json");
        path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CutoffSpec;
    use crate::dataset::EvaluationRecord;
    use crate::eval::eval_dataset;

    fn sample_summary(opts: &EvalOptions) -> EvalSummary {
        let records = vec![EvaluationRecord {
            question_id: "q0".to_string(),
            question: None,
            chunks: vec!["alpha beta gamma".to_string()],
            evidence: vec!["alpha beta gamma".to_string()],
        }];
        eval_dataset(records.iter(), opts)
    }

    #[test]
    fn test_report_keys_use_cutoff_labels() {
        let opts = EvalOptions::new(CutoffSpec::parse("all,3").unwrap());
        let report = EvalReport::new(Path::new("data.json"), &opts, &sample_summary(&opts));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["macro_avgs"].get("3").is_some());
        assert!(json["macro_avgs"].get("ALL").is_some());
        assert!(json["micro_sums"]["ALL"].get("tp_evidence").is_some());
        assert_eq!(json["meta"]["ks"], serde_json::json!(["3", "ALL"]));
        assert_eq!(json["meta"]["precision_mode"], "ir");
    }

    #[test]
    fn test_report_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/results/data.json");

        let opts = EvalOptions::new(CutoffSpec::parse("3").unwrap());
        let report = EvalReport::new(Path::new("data.json"), &opts, &sample_summary(&opts));
        report.save(&out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["meta"]["input_file"], "data.json");
    }

    #[test]
    fn test_resolve_output_path_explicit_file() {
        let path = resolve_output_path(
            Some(Path::new("out/custom")),
            Path::new("ignored"),
            Path::new("in/data.json"),
        );
        assert_eq!(path, PathBuf::from("out/custom.json"));

        let path = resolve_output_path(
            Some(Path::new("out/custom.JSON")),
            Path::new("ignored"),
            Path::new("in/data.json"),
        );
        assert_eq!(path, PathBuf::from("out/custom.JSON"));
    }

    #[test]
    fn test_resolve_output_path_from_input_name() {
        let path = resolve_output_path(
            None,
            Path::new("eval_results"),
            Path::new("datasets/run_a.retrieved.json"),
        );
        assert_eq!(path, PathBuf::from("eval_results/run_a.retrieved.json"));

        let path = resolve_output_path(None, Path::new("eval_results"), Path::new("datasets/run_b"));
        assert_eq!(path, PathBuf::from("eval_results/run_b.json"));
    }
}
