//! Retrieval evaluation library
//!
//! Scores an already-produced ranking of text chunks against gold evidence
//! strings: precision, recall, F1 and nDCG at one or more rank cutoffs,
//! aggregated macro (mean of per-query metrics) and micro (pooled counts).

pub mod config;
pub mod dataset;
pub mod eval;
pub mod normalize;
pub mod report;
