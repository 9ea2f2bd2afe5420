//! Error handling for the force-plate pipeline
//!
//! Every fatal condition of a trial maps to one [`ForceError`] variant, and
//! each variant carries an explicit [`FailurePolicy`] so the batch runner
//! knows whether to stop the run or move on to the next trial.

use crate::interval::Interval;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for force-plate operations
pub type ForceResult<T> = Result<T, ForceError>;

/// What the batch runner does after a trial fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the whole run; the exception tables need manual curation
    AbortRun,
    /// Drop the current trial and continue with the next one
    SkipTrial,
}

/// Error type for all force-plate operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForceError {
    /// No channel assignment (or calibration matrix) produced the expected shape
    #[error("Dimension mismatch for trial {trial}: expected {expected} channels ({reason})")]
    DimensionMismatch {
        trial: String,
        expected: usize,
        reason: String,
    },

    /// Calibration matrix and signal disagree on the channel count
    #[error("Calibration matrix is {dimension}x{dimension} but the signal has {channels} channels")]
    MatrixMismatch { dimension: usize, channels: usize },

    /// More than one active interval survived the override table
    #[error("More than one onset detected in trial {trial}: {} intervals", intervals.len())]
    MultipleOnsetsDetected {
        trial: String,
        intervals: Vec<Interval>,
    },

    /// Detection produced nothing and no override supplied an interval
    #[error("No onset detected in trial {trial}")]
    NoOnsetDetected { trial: String },

    /// Onset sits before the lower plausibility bound
    #[error("Onset of trial {trial} is before {bound_percent}% of the trial (frame {onset}, {percent:.2}%)")]
    OnsetTooLate {
        trial: String,
        onset: usize,
        bound_percent: f64,
        percent: f64,
    },

    /// Offset sits after the upper plausibility bound
    #[error("Offset of trial {trial} is after {bound_percent}% of the trial (frame {offset}, {percent:.2}%)")]
    OffsetTooEarly {
        trial: String,
        offset: usize,
        bound_percent: f64,
        percent: f64,
    },

    /// The exception table holds contradicting entries for one trial
    #[error("Conflicting exception entries for trial {trial}: {first} vs {second}")]
    ConflictingException {
        trial: String,
        first: String,
        second: String,
    },

    /// Interval bounds violate `start < end`
    #[error("Invalid interval [{start}, {end}]: start must be lower than end")]
    InvalidInterval { start: usize, end: usize },

    /// Invalid pipeline, filter or table configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Malformed signal data
    #[error("Invalid signal: {reason}")]
    InvalidSignal { reason: String },

    /// Filesystem error on a trial input or output
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the processed series failed
    #[error("Export to {} failed: {reason}", path.display())]
    Export { path: PathBuf, reason: String },

    /// Reading or updating the participant configuration store failed
    #[error("Configuration store error for participant {participant}: {reason}")]
    Store { participant: String, reason: String },
}

impl ForceError {
    /// Abort strategy for this error kind
    pub fn policy(&self) -> FailurePolicy {
        match self {
            ForceError::Io { .. } | ForceError::Export { .. } | ForceError::Store { .. } => {
                FailurePolicy::SkipTrial
            }
            _ => FailurePolicy::AbortRun,
        }
    }

    /// Wrap an I/O error with the offending path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForceError::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for configuration errors
    pub fn config(reason: impl Into<String>) -> Self {
        ForceError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Shorthand for signal errors
    pub fn signal(reason: impl Into<String>) -> Self {
        ForceError::InvalidSignal {
            reason: reason.into(),
        }
    }
}
