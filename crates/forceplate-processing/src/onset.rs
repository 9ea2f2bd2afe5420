//! Onset/offset detection by threshold with minimum duration

use crate::config::OnsetConfig;
use forceplate_core::{ForceResult, Interval, MultiChannelSignal};
use tracing::debug;

/// Threshold detector for active regions of a scalar series
///
/// Samples at or above `threshold` are active. Active samples separated by
/// at most `n_below` inactive samples belong to the same interval, and an
/// interval is kept only when `end - start >= n_above - 1`. NaN samples are
/// inactive.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetDetector {
    threshold: f64,
    n_above: f64,
    n_below: usize,
    threshold2: Option<f64>,
    n_above2: usize,
}

impl OnsetDetector {
    pub fn new(threshold: f64, n_above: f64, n_below: usize) -> Self {
        Self {
            threshold,
            n_above,
            n_below,
            threshold2: None,
            n_above2: 1,
        }
    }

    /// Also require `n_above2` samples at or above `threshold2` in every interval
    pub fn with_secondary(mut self, threshold2: f64, n_above2: usize) -> Self {
        self.threshold2 = Some(threshold2);
        self.n_above2 = n_above2;
        self
    }

    /// Detector for a signal sampled at `sampling_rate`
    pub fn from_config(config: &OnsetConfig, sampling_rate: f64) -> Self {
        let n_above = sampling_rate.trunc() * config.min_active_seconds;
        let detector = Self::new(config.threshold, n_above, config.max_gap_frames);
        match config.threshold2 {
            Some(threshold2) => detector.with_secondary(threshold2, config.min_above2),
            None => detector,
        }
    }

    /// Ascending active intervals, each with `start < end < x.len()`
    pub fn detect(&self, x: &[f64]) -> Vec<Interval> {
        let active: Vec<usize> = x
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v >= self.threshold)
            .map(|(i, _)| i)
            .collect();

        let Some((&first, rest)) = active.split_first() else {
            return Vec::new();
        };

        let mut runs = Vec::new();
        let (mut start, mut previous) = (first, first);
        for &index in rest {
            if index - previous > self.n_below + 1 {
                runs.push((start, previous));
                start = index;
            }
            previous = index;
        }
        runs.push((start, previous));

        let intervals: Vec<Interval> = runs
            .into_iter()
            .filter(|&(start, end)| (end - start) as f64 >= self.n_above - 1.0)
            .filter(|&(start, end)| match self.threshold2 {
                Some(threshold2) => {
                    x[start..=end].iter().filter(|&&v| v >= threshold2).count() >= self.n_above2
                }
                None => true,
            })
            .filter_map(|(start, end)| Interval::new(start, end).ok())
            .collect();

        debug!(count = intervals.len(), ?intervals, "onset detection");
        intervals
    }

    /// Detect on the norm of `channels` of a calibrated signal
    pub fn detect_on_norm(
        &self,
        signal: &MultiChannelSignal,
        channels: &[usize],
    ) -> ForceResult<(Vec<f64>, Vec<Interval>)> {
        let norm = signal.norm(channels)?.to_vec();
        let intervals = self.detect(&norm);
        Ok((norm, intervals))
    }
}
