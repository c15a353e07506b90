//! Run configuration for retrieval evaluation
//!
//! Defines the rank-cutoff model (`Cutoff`, `CutoffSpec`), the precision
//! definition (`PrecisionMode`) and the bundled `EvalOptions`.

use anyhow::{bail, Result};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Default token-coverage threshold for the match oracle.
pub const DEFAULT_CONTAIN_THRESHOLD: f64 = 0.85;

/// A rank depth at which metrics are computed.
///
/// `All` means "every chunk retrieved for this record" — its effective
/// retrieved-count varies per record, but it is one logical cutoff in the
/// aggregate tables. It is a real variant, not a sentinel integer, so it can
/// never collide with a fixed cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Keep the first `k` chunks.
    Fixed(usize),
    /// Keep every retrieved chunk.
    All,
}

impl Cutoff {
    /// Label used for report keys and console output.
    pub fn label(&self) -> String {
        match self {
            Self::Fixed(k) => k.to_string(),
            Self::All => "ALL".to_string(),
        }
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// Fixed cutoffs sort ascending, `All` sorts after every fixed cutoff.
impl Ord for Cutoff {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a.cmp(b),
            (Self::Fixed(_), Self::All) => std::cmp::Ordering::Less,
            (Self::All, Self::Fixed(_)) => std::cmp::Ordering::Greater,
            (Self::All, Self::All) => std::cmp::Ordering::Equal,
        }
    }
}

impl PartialOrd for Cutoff {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Cutoff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// The set of cutoffs requested for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoffSpec {
    /// Fixed cutoffs, sorted ascending, deduplicated.
    pub ks: Vec<usize>,
    /// Whether the `ALL` pseudo-cutoff is enabled.
    pub use_all: bool,
}

impl CutoffSpec {
    /// Parse a comma-separated cutoff string.
    ///
    /// Each token is a positive integer or `all`/`0` (enables the `ALL`
    /// pseudo-cutoff). Duplicates are deduplicated and integers sorted
    /// ascending. Unrecognized tokens are dropped with a warning; a spec
    /// that selects no cutoff at all is rejected.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut ks = BTreeSet::new();
        let mut use_all = false;

        for part in spec.split(',') {
            let token = part.trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            if token == "all" || token == "0" {
                use_all = true;
                continue;
            }
            match token.parse::<usize>() {
                Ok(k) if k > 0 => {
                    ks.insert(k);
                }
                _ => tracing::warn!("ignoring unrecognized cutoff token {:?}", token),
            }
        }

        if ks.is_empty() && !use_all {
            bail!("cutoff spec {:?} selects no cutoffs", spec);
        }

        Ok(Self {
            ks: ks.into_iter().collect(),
            use_all,
        })
    }

    /// All requested cutoffs, fixed ones ascending, `All` last.
    pub fn cutoffs(&self) -> Vec<Cutoff> {
        let mut out: Vec<Cutoff> = self.ks.iter().copied().map(Cutoff::Fixed).collect();
        if self.use_all {
            out.push(Cutoff::All);
        }
        out
    }

    /// Cutoff labels in report order.
    pub fn labels(&self) -> Vec<String> {
        self.cutoffs().iter().map(Cutoff::label).collect()
    }
}

/// Which precision definition to use.
///
/// The two modes measure materially different things and are both kept as
/// explicit, named alternatives:
/// - `Ir`: fraction of retained chunks that are relevant (standard IR
///   precision, recommended).
/// - `Legacy`: fraction of evidence items covered, normalized by chunk
///   count. Not a true precision; kept for comparability with older runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    #[default]
    Ir,
    Legacy,
}

impl PrecisionMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ir => "ir",
            Self::Legacy => "legacy",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ir" => Some(Self::Ir),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }
}

/// Options for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub cutoffs: CutoffSpec,
    pub contain_threshold: f64,
    pub precision_mode: PrecisionMode,
}

impl EvalOptions {
    pub fn new(cutoffs: CutoffSpec) -> Self {
        Self {
            cutoffs,
            contain_threshold: DEFAULT_CONTAIN_THRESHOLD,
            precision_mode: PrecisionMode::default(),
        }
    }

    pub fn with_contain_threshold(mut self, threshold: f64) -> Self {
        self.contain_threshold = threshold;
        self
    }

    pub fn with_precision_mode(mut self, mode: PrecisionMode) -> Self {
        self.precision_mode = mode;
        self
    }

    /// Reject option combinations before any evaluation starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.contain_threshold > 0.0 && self.contain_threshold <= 1.0) {
            bail!(
                "contain threshold must be in (0, 1], got {}",
                self.contain_threshold
            );
        }
        Ok(())
    }
}
