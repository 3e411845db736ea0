//! Error types for the Pension Engine.
//!
//! Only fatal conditions are errors.  Degraded results (totals that
//! diverge from the certificate, insufficient salary history, missing
//! salary caps) are reported as data inside the
//! [`AnalysisReport`](crate::models::AnalysisReport).

use crate::models::Regime;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalizer,
    OverlapResolver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalizer => "normalizer",
            Stage::OverlapResolver => "overlap resolver",
        };
        f.write_str(name)
    }
}

/// Problems with the regime rule tables.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no rule table for {regime} effective on {date}")]
    MissingRegime { regime: Regime, date: chrono::NaiveDate },

    #[error("invalid rule table {regime} {version}: {reason}")]
    InvalidTable {
        regime: Regime,
        version: String,
        reason: String,
    },

    #[error("failed to read rule table {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule table {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fatal errors that abort an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{stage}: period {index}: {reason}")]
    InvalidPeriod {
        stage: Stage,
        index: usize,
        reason: String,
    },

    #[error("{stage}: period {index} starts before period {previous}; input is not ordered by start date")]
    UnorderedPeriods {
        stage: Stage,
        index: usize,
        previous: usize,
    },

    #[error("{stage}: employer {employer_id} reports overlapping periods {first} and {second}")]
    SameEmployerOverlap {
        stage: Stage,
        employer_id: String,
        first: usize,
        second: usize,
    },

    #[error("{stage}: missing mandatory field `{field}`")]
    MissingField { stage: Stage, field: &'static str },

    #[error("conservation engine: no last contribution date; the worker has no employment periods")]
    MissingLastContribution,

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl AnalysisError {
    /// Short machine-readable category used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Config(_) => "configuration",
            _ => "structural",
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
