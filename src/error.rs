//! Error types for foldsim.
//!
//! All errors in foldsim are strongly typed using thiserror.
//! Import errors are recoverable and travel as values; only extraction
//! bookkeeping failures are treated as invariant violations.

use std::path::PathBuf;

use thiserror::Error;

/// Classification of a model parse failure.
///
/// Mirrors the categories `serde_json` reports for JSON input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorCategory {
    /// Failure to read bytes.
    Io,
    /// Input that is not syntactically valid.
    Syntax,
    /// Input that is syntactically valid but semantically wrong.
    Data,
    /// Unexpected end of input.
    Eof,
}

impl From<serde_json::error::Category> for ParseErrorCategory {
    fn from(value: serde_json::error::Category) -> Self {
        match value {
            serde_json::error::Category::Io => Self::Io,
            serde_json::error::Category::Syntax => Self::Syntax,
            serde_json::error::Category::Data => Self::Data,
            serde_json::error::Category::Eof => Self::Eof,
        }
    }
}

/// A model source text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category:?} error on line {line}, column {column}")]
pub struct ParseError {
    /// What kind of failure occurred.
    pub category: ParseErrorCategory,
    /// One-based line of the failure, 0 when unknown.
    pub line: u32,
    /// One-based column of the failure, 0 when unknown.
    pub column: u32,
}

impl From<serde_json::Error> for ParseError {
    fn from(value: serde_json::Error) -> Self {
        Self {
            category: value.classify().into(),
            line: u32::try_from(value.line()).unwrap_or(u32::MAX),
            column: u32::try_from(value.column()).unwrap_or(u32::MAX),
        }
    }
}

/// Result of feeding new model data into a session.
///
/// Every variant is recoverable: the session keeps whatever state it had
/// before the failing part of the update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    #[error("Model source is empty")]
    Empty,

    #[error("Model parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Model load rejected by solver: {reason}")]
    Load {
        reason: String,
    },

    #[error("Fold percentage {value} rejected by solver: {reason}")]
    FoldPercentageRejected {
        value: f32,
        reason: String,
    },
}

impl ImportError {
    /// Returns true if this represents the valid "no model" state.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Errors reported by solver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("Operation requires a loaded model")]
    NotLoaded,

    #[error("No frame {frame} in model ({frame_count} frames)")]
    NoSuchFrame {
        frame: u16,
        frame_count: u16,
    },

    #[error("Invalid model: {reason}")]
    InvalidModel {
        reason: String,
    },

    #[error("Solver rejected request: {reason}")]
    Rejected {
        reason: String,
    },

    #[error("Solver state diverged after {steps} steps")]
    Diverged {
        steps: u64,
    },

    #[error("Extraction region for {channel} holds {actual} floats, expected {expected}")]
    RegionMismatch {
        channel: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config field '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Worker lifecycle errors.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Poisoned lock: {context}")]
    Poisoned {
        context: &'static str,
    },

    #[error("Worker thread panicked")]
    Panicked,
}

/// Top-level error type for foldsim.
#[derive(Debug, Error)]
pub enum FoldSimError {
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl FoldSimError {
    /// Returns true if this is an import error.
    #[must_use]
    pub const fn is_import(&self) -> bool {
        matches!(self, Self::Import(_))
    }

    /// Returns true if the simulation can keep running after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Import(_) => true,
            Self::Solver(e) => !matches!(e, SolverError::RegionMismatch { .. }),
            Self::Config(_) | Self::Worker(_) => false,
        }
    }
}

/// Result type alias for foldsim operations.
pub type FoldSimResult<T> = Result<T, FoldSimError>;
