//! Retrieval Evaluation CLI
//!
//! Scores already-retrieved chunks against gold evidence (no retrieval is
//! performed here).
//!
//! ## Quick Start
//!
//! ```bash
//! # Evaluate one dataset at k = 3, 5, 10 plus the ALL pseudo-cutoff
//! ./retrieval-eval run \
//!     --input ./datasets/run_a.retrieved.json \
//!     --ks all,3,5,10
//!
//! # Legacy precision, lower match threshold, explicit output file
//! ./retrieval-eval run \
//!     --input ./datasets/run_a.retrieved.json \
//!     --precision-mode legacy \
//!     --contain-threshold 0.5 \
//!     --out ./results/run_a.json
//!
//! # Also export the worst records for manual review
//! ./retrieval-eval run \
//!     --input ./datasets/run_a.retrieved.json \
//!     --thr-recall 0.3 --bottom-f1 20 \
//!     --bad-json ./results/bad_cases.json \
//!     --bad-csv ./results/bad_cases.csv
//!
//! # Check a dataset file before evaluating it
//! ./retrieval-eval validate --input ./datasets/run_a.retrieved.json
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use retrieval_eval::config::{CutoffSpec, EvalOptions, PrecisionMode};
use retrieval_eval::dataset::{load_dataset, summarize, EvaluationRecord};
use retrieval_eval::eval::{
    bad_cases_to_csv, eval_dataset, select_bad_cases, BadCaseConfig, EvalSummary,
};
use retrieval_eval::report::{resolve_output_path, EvalReport};

/// Precision definition for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum PrecisionModeArg {
    /// rel_chunks / retrieved (standard IR precision)
    #[default]
    Ir,
    /// tp_evidence / retrieved (kept for comparability with older runs)
    Legacy,
}

impl From<PrecisionModeArg> for PrecisionMode {
    fn from(arg: PrecisionModeArg) -> Self {
        match arg {
            PrecisionModeArg::Ir => PrecisionMode::Ir,
            PrecisionModeArg::Legacy => PrecisionMode::Legacy,
        }
    }
}

#[derive(Parser)]
#[command(name = "retrieval-eval")]
#[command(about = "Score retrieved chunks against gold evidence (no retrieval)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate dataset file(s) and save one JSON report per input
    Run {
        /// Path(s) to dataset JSON files (each gets its own report)
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        /// Comma list of cutoffs, e.g. "1,3,5,10"; add 'all' or '0' to
        /// also evaluate every retrieved chunk
        #[arg(long, default_value = "3,5,10")]
        ks: String,

        /// Token-coverage threshold for the match oracle, in (0, 1]
        #[arg(long, default_value_t = 0.85)]
        contain_threshold: f64,

        /// Precision definition
        #[arg(long, value_enum, default_value = "ir")]
        precision_mode: PrecisionModeArg,

        /// Directory for reports (named after each input file)
        #[arg(long, default_value = "eval_results")]
        out_dir: PathBuf,

        /// Explicit report file; only valid with exactly one --input
        #[arg(long)]
        out: Option<PathBuf>,

        /// Path to dump bad cases JSON (for the last evaluated input)
        #[arg(long)]
        bad_json: Option<PathBuf>,

        /// Also dump a CSV flattening of the bad cases
        #[arg(long)]
        bad_csv: Option<PathBuf>,

        /// Select records with recall below this value
        #[arg(long)]
        thr_recall: Option<f64>,

        /// Select records with f1 below this value
        #[arg(long)]
        thr_f1: Option<f64>,

        /// Select the N records with the lowest f1
        #[arg(long)]
        bottom_f1: Option<usize>,
    },

    /// Load dataset file(s) and print a data-quality summary
    Validate {
        /// Path(s) to dataset JSON files
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            ks,
            contain_threshold,
            precision_mode,
            out_dir,
            out,
            bad_json,
            bad_csv,
            thr_recall,
            thr_f1,
            bottom_f1,
        } => run_eval(
            &input,
            &ks,
            contain_threshold,
            precision_mode.into(),
            &out_dir,
            out.as_deref(),
            bad_json.as_deref(),
            bad_csv.as_deref(),
            thr_recall,
            thr_f1,
            bottom_f1,
        ),

        Commands::Validate { input } => validate_datasets(&input),
    }
}

/// Evaluate every input and save one report per input.
#[allow(clippy::too_many_arguments)]
fn run_eval(
    inputs: &[PathBuf],
    ks: &str,
    contain_threshold: f64,
    precision_mode: PrecisionMode,
    out_dir: &Path,
    out_file: Option<&Path>,
    bad_json: Option<&Path>,
    bad_csv: Option<&Path>,
    thr_recall: Option<f64>,
    thr_f1: Option<f64>,
    bottom_f1: Option<usize>,
) -> Result<()> {
    // Configuration errors abort before any evaluation runs.
    if out_file.is_some() && inputs.len() > 1 {
        bail!("--out is only valid with exactly one --input; use --out-dir for multiple inputs");
    }

    let opts = EvalOptions::new(CutoffSpec::parse(ks)?)
        .with_contain_threshold(contain_threshold)
        .with_precision_mode(precision_mode);
    opts.validate()?;

    // Bad-case export applies to the last evaluated input.
    let mut last: Option<(Vec<EvaluationRecord>, EvalSummary)> = None;

    for path in inputs {
        println!("\n=== File: {} ===", path.display());
        let records = load_dataset(path)?;

        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {pos}/{len}")
                .unwrap(),
        );
        pb.set_message("Eval records");

        let summary = eval_dataset(pb.wrap_iter(records.iter()), &opts);
        pb.finish();

        print_report(&summary);

        let out_path = resolve_output_path(out_file, out_dir, path);
        let report = EvalReport::new(path, &opts, &summary);
        report.save(&out_path)?;
        println!("Saved eval results -> {}", out_path.display());

        last = Some((records, summary));
    }

    if let (Some(bad_path), Some((records, summary))) = (bad_json, last.as_ref()) {
        let config = BadCaseConfig {
            thresholds: [
                thr_recall.map(|t| ("recall".to_string(), t)),
                thr_f1.map(|t| ("f1".to_string(), t)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            bottoms: bottom_f1
                .map(|n| BTreeMap::from([("f1".to_string(), n)]))
                .unwrap_or_default(),
            include_question: true,
        };

        let report = select_bad_cases(&summary.per_record, records, &config);
        if let Some(parent) = bad_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(bad_path, serde_json::to_string_pretty(&report)?)?;
        println!("Dumped bad cases to: {}", bad_path.display());

        if let Some(csv_path) = bad_csv {
            if let Some(parent) = csv_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(csv_path, bad_cases_to_csv(&report))?;
            println!("CSV written: {}", csv_path.display());
        }
    } else if bad_csv.is_some() {
        tracing::warn!("--bad-csv has no effect without --bad-json");
    }

    Ok(())
}

/// Print the macro/micro table for every cutoff.
fn print_report(summary: &EvalSummary) {
    println!("=== Retrieval evaluation ===");
    for (cutoff, n) in &summary.counts {
        let ma = &summary.macro_avgs[cutoff];
        let mi = &summary.micro_avgs[cutoff];
        println!("--- @ {} (n={}) ---", cutoff.label(), n);
        println!(
            "Macro  | P: {:.4}  R: {:.4}  F1: {:.4}  nDCG: {:.4}",
            ma.precision, ma.recall, ma.f1, ma.ndcg
        );
        println!(
            "Micro  | P: {:.4}  R: {:.4}  F1: {:.4}  nDCG: {:.4}",
            mi.precision, mi.recall, mi.f1, mi.ndcg
        );
    }

    if !summary.skipped_no_evidence.is_empty() {
        println!(
            "\n[Info] Skipped {} record(s) without evidence.",
            summary.skipped_no_evidence.len()
        );
    }

    if !summary.failed.is_empty() {
        println!("[Warn] {} record(s) failed, skipped:", summary.failed.len());
        for (i, (idx, err)) in summary.failed.iter().take(10).enumerate() {
            println!("  {}. index={}, err={}", i + 1, idx, err);
        }
        if summary.failed.len() > 10 {
            println!("  ... and {} more", summary.failed.len() - 10);
        }
    }
}

/// Load and summarize dataset file(s) without evaluating them.
fn validate_datasets(inputs: &[PathBuf]) -> Result<()> {
    for path in inputs {
        println!("Validating {}...", path.display());
        let records = load_dataset(path)?;
        let summary = summarize(&records);

        println!("✓ Loaded {} record(s)", summary.records);
        println!("  Records without evidence: {}", summary.without_evidence);
        println!("  Records without chunks:   {}", summary.without_chunks);
        println!(
            "  Chunks: {} total, {:.1} avg/record",
            summary.total_chunks,
            summary.avg_chunks_per_record()
        );
        println!("  Evidence strings: {} total", summary.total_evidence);

        if summary.without_evidence > 0 {
            println!(
                "  ⚠ {} record(s) will be skipped during evaluation",
                summary.without_evidence
            );
        }
    }
    Ok(())
}
