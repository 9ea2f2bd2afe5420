//! Per-trial exception table
//!
//! Trials are reviewed once by hand; deviations are recorded here as data
//! instead of re-tuning thresholds. Each trial identifier maps to at most one
//! override, and two allow-lists exempt trials from the positional checks.

use forceplate_core::{ForceError, ForceResult, Interval};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::warn;

const BUILTIN_TABLE: &str = include_str!("../data/trial_exceptions.json");

/// Manual outcome recorded for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialException {
    /// Use this interval instead of the detected ones
    Replace(Interval),
    /// Keep the first detected interval but end it at this frame
    Offset(usize),
    /// Exclude the trial from the output
    Skip,
}

impl fmt::Display for TrialException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialException::Replace(interval) => write!(f, "replace {}", interval),
            TrialException::Offset(end) => write!(f, "offset {}", end),
            TrialException::Skip => write!(f, "skip"),
        }
    }
}

/// Detection after the override table was consulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Skip,
    Intervals(Vec<Interval>),
}

/// On-disk layout of the table
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExceptionDocument {
    #[serde(default)]
    overrides: Vec<OverrideEntry>,
    #[serde(default)]
    onset_allow: Vec<String>,
    #[serde(default)]
    offset_allow: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OverrideEntry {
    trial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replace: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    skip: bool,
}

impl OverrideEntry {
    fn exception(&self) -> ForceResult<TrialException> {
        match (self.replace, self.offset, self.skip) {
            (Some(interval), None, false) => Ok(TrialException::Replace(interval)),
            (None, Some(end), false) => Ok(TrialException::Offset(end)),
            (None, None, true) => Ok(TrialException::Skip),
            _ => Err(ForceError::config(format!(
                "exception for trial {} must set exactly one of replace, offset or skip",
                self.trial
            ))),
        }
    }

    fn from_exception(trial: &str, exception: TrialException) -> Self {
        let mut entry = OverrideEntry {
            trial: trial.to_string(),
            replace: None,
            offset: None,
            skip: false,
        };
        match exception {
            TrialException::Replace(interval) => entry.replace = Some(interval),
            TrialException::Offset(end) => entry.offset = Some(end),
            TrialException::Skip => entry.skip = true,
        }
        entry
    }
}

/// Lookup table of manual per-trial outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionTable {
    overrides: BTreeMap<String, TrialException>,
    onset_allow: BTreeSet<String>,
    offset_allow: BTreeSet<String>,
}

impl ExceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exceptions curated for the reference dataset
    pub fn builtin() -> ForceResult<Self> {
        Self::from_json(BUILTIN_TABLE)
    }

    /// Parse a table; contradicting entries for one trial are rejected
    pub fn from_json(json: &str) -> ForceResult<Self> {
        let document: ExceptionDocument = serde_json::from_str(json)
            .map_err(|e| ForceError::config(format!("failed to parse exception table: {}", e)))?;

        let mut table = Self::new();
        for entry in &document.overrides {
            table.insert(&entry.trial, entry.exception()?)?;
        }
        for trial in document.onset_allow {
            table.allow_early_onset(trial);
        }
        for trial in document.offset_allow {
            table.allow_late_offset(trial);
        }
        Ok(table)
    }

    /// Read a table from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ForceResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ForceError::io(path, e))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ForceResult<String> {
        let document = ExceptionDocument {
            overrides: self
                .overrides
                .iter()
                .map(|(trial, exception)| OverrideEntry::from_exception(trial, *exception))
                .collect(),
            onset_allow: self.onset_allow.iter().cloned().collect(),
            offset_allow: self.offset_allow.iter().cloned().collect(),
        };
        serde_json::to_string_pretty(&document)
            .map_err(|e| ForceError::config(format!("failed to serialize exception table: {}", e)))
    }

    /// Record an exception; a repeated identical entry is accepted once
    pub fn insert(&mut self, trial: &str, exception: TrialException) -> ForceResult<()> {
        match self.overrides.get(trial) {
            Some(existing) if *existing == exception => {
                warn!(trial, %exception, "duplicate exception entry ignored");
                Ok(())
            }
            Some(existing) => Err(ForceError::ConflictingException {
                trial: trial.to_string(),
                first: existing.to_string(),
                second: exception.to_string(),
            }),
            None => {
                self.overrides.insert(trial.to_string(), exception);
                Ok(())
            }
        }
    }

    /// Exempt a trial from the early-onset check
    pub fn allow_early_onset(&mut self, trial: impl Into<String>) {
        self.onset_allow.insert(trial.into());
    }

    /// Exempt a trial from the late-offset check
    pub fn allow_late_offset(&mut self, trial: impl Into<String>) {
        self.offset_allow.insert(trial.into());
    }

    pub fn exception(&self, trial: &str) -> Option<TrialException> {
        self.overrides.get(trial).copied()
    }

    pub fn is_onset_allowed(&self, trial: &str) -> bool {
        self.onset_allow.contains(trial)
    }

    pub fn is_offset_allowed(&self, trial: &str) -> bool {
        self.offset_allow.contains(trial)
    }

    /// Number of override entries
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Apply the trial's override, if any, to the detected intervals
    pub fn resolve(&self, trial: &str, detected: Vec<Interval>) -> ForceResult<Resolution> {
        match self.exception(trial) {
            None => Ok(Resolution::Intervals(detected)),
            Some(TrialException::Skip) => Ok(Resolution::Skip),
            Some(TrialException::Replace(interval)) => Ok(Resolution::Intervals(vec![interval])),
            Some(TrialException::Offset(end)) => {
                let mut intervals = detected;
                let first = intervals.first_mut().ok_or_else(|| ForceError::NoOnsetDetected {
                    trial: trial.to_string(),
                })?;
                *first = first.with_end(end)?;
                Ok(Resolution::Intervals(intervals))
            }
        }
    }
}
