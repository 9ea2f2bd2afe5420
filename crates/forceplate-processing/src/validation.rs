//! Boundary-sanity validation of detected intervals

use crate::config::BoundsConfig;
use crate::exceptions::{ExceptionTable, Resolution};
use forceplate_core::{ForceError, ForceResult, Interval};
use tracing::debug;

/// Final decision for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The exception table excludes the trial
    Skip,
    /// Exactly one plausible interval
    Accepted(Interval),
}

/// Applies the exception table, then the count and positional checks
#[derive(Debug, Clone)]
pub struct TrialValidator {
    table: ExceptionTable,
    bounds: BoundsConfig,
}

impl TrialValidator {
    pub fn new(table: ExceptionTable, bounds: BoundsConfig) -> Self {
        Self { table, bounds }
    }

    pub fn table(&self) -> &ExceptionTable {
        &self.table
    }

    pub fn bounds(&self) -> BoundsConfig {
        self.bounds
    }

    /// Validate the intervals detected on a trial of `total_frames` frames
    pub fn validate(
        &self,
        trial: &str,
        detected: Vec<Interval>,
        total_frames: usize,
    ) -> ForceResult<Validation> {
        let intervals = match self.table.resolve(trial, detected)? {
            Resolution::Skip => {
                debug!(trial, "trial skipped by exception table");
                return Ok(Validation::Skip);
            }
            Resolution::Intervals(intervals) => intervals,
        };

        let interval = match intervals.len() {
            0 => {
                return Err(ForceError::NoOnsetDetected {
                    trial: trial.to_string(),
                })
            }
            1 => intervals[0],
            _ => {
                return Err(ForceError::MultipleOnsetsDetected {
                    trial: trial.to_string(),
                    intervals,
                })
            }
        };

        self.check_bounds(trial, interval, total_frames)?;
        Ok(Validation::Accepted(interval))
    }

    /// Reject onsets before, and offsets after, the configured fractions
    pub fn check_bounds(&self, trial: &str, interval: Interval, total_frames: usize) -> ForceResult<()> {
        let percent_of = |frame: usize| {
            if total_frames == 0 {
                0.0
            } else {
                frame as f64 / total_frames as f64 * 100.0
            }
        };

        let onset_bound = (total_frames as f64 * self.bounds.onset_fraction).floor() as usize;
        if interval.start() < onset_bound && !self.table.is_onset_allowed(trial) {
            return Err(ForceError::OnsetTooLate {
                trial: trial.to_string(),
                onset: interval.start(),
                bound_percent: self.bounds.onset_fraction * 100.0,
                percent: percent_of(interval.start()),
            });
        }

        let offset_bound = (total_frames as f64 * self.bounds.offset_fraction).floor() as usize;
        if interval.end() > offset_bound && !self.table.is_offset_allowed(trial) {
            return Err(ForceError::OffsetTooEarly {
                trial: trial.to_string(),
                offset: interval.end(),
                bound_percent: self.bounds.offset_fraction * 100.0,
                percent: percent_of(interval.end()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::TrialException;

    fn interval(start: usize, end: usize) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn validator(table: ExceptionTable) -> TrialValidator {
        TrialValidator::new(table, BoundsConfig::default())
    }

    #[test]
    fn test_onset_bound() {
        let v = validator(ExceptionTable::new());
        assert!(matches!(
            v.validate("t", vec![interval(700, 5000)], 10_000),
            Err(ForceError::OnsetTooLate { onset: 700, .. })
        ));
        assert_eq!(
            v.validate("t", vec![interval(900, 5000)], 10_000).unwrap(),
            Validation::Accepted(interval(900, 5000))
        );
        // bound itself is accepted
        assert!(v.validate("t", vec![interval(800, 5000)], 10_000).is_ok());
    }

    #[test]
    fn test_allow_listed_onset_passes() {
        let mut table = ExceptionTable::new();
        table.allow_early_onset("AmiAF12H2_1");
        let v = validator(table);
        assert!(v.validate("AmiAF12H2_1", vec![interval(700, 5000)], 10_000).is_ok());
        assert!(v.validate("other", vec![interval(700, 5000)], 10_000).is_err());
    }

    #[test]
    fn test_offset_bound() {
        let mut table = ExceptionTable::new();
        table.allow_late_offset("late");
        let v = validator(table);
        assert!(v.validate("t", vec![interval(1000, 9700)], 10_000).is_ok());
        assert!(matches!(
            v.validate("t", vec![interval(1000, 9701)], 10_000),
            Err(ForceError::OffsetTooEarly { offset: 9701, .. })
        ));
        assert!(v.validate("late", vec![interval(1000, 9900)], 10_000).is_ok());
    }

    #[test]
    fn test_interval_count() {
        let v = validator(ExceptionTable::new());
        match v.validate("t", vec![interval(100, 200), interval(300, 400)], 500) {
            Err(ForceError::MultipleOnsetsDetected { intervals, .. }) => assert_eq!(intervals.len(), 2),
            other => panic!("expected multiple onsets, got {:?}", other),
        }
        assert!(matches!(
            v.validate("t", Vec::new(), 500),
            Err(ForceError::NoOnsetDetected { .. })
        ));
    }

    #[test]
    fn test_overrides_apply_before_checks() {
        let v = validator(ExceptionTable::builtin().unwrap());
        assert_eq!(
            v.validate("GatBH18H4_3", Vec::new(), 20_000).unwrap(),
            Validation::Accepted(interval(5271, 15965))
        );
        assert_eq!(
            v.validate("CamBF12H5_3", vec![interval(1, 2), interval(3, 4)], 10).unwrap(),
            Validation::Skip
        );
    }

    #[test]
    fn test_offset_patch_then_bounds() {
        let mut table = ExceptionTable::new();
        table.insert("patched", TrialException::Offset(9000)).unwrap();
        let v = validator(table);
        assert_eq!(
            v.validate("patched", vec![interval(1000, 9990)], 10_000).unwrap(),
            Validation::Accepted(interval(1000, 9000))
        );
    }
}
