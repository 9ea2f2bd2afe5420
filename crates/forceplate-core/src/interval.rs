//! Active intervals of a trial (foot-ground contact)

use crate::error::{ForceError, ForceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `[start, end]` pair of frame indices with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[usize; 2]", into = "[usize; 2]")]
pub struct Interval {
    start: usize,
    end: usize,
}

impl Interval {
    /// Create a new interval, rejecting empty or reversed bounds
    pub fn new(start: usize, end: usize) -> ForceResult<Self> {
        if start >= end {
            return Err(ForceError::InvalidInterval { start, end });
        }
        Ok(Interval { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of frames between the bounds
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Same start, different end
    pub fn with_end(&self, end: usize) -> ForceResult<Self> {
        Interval::new(self.start, end)
    }

    /// Onset and offset in seconds for the given sampling rate
    pub fn to_seconds(&self, sampling_rate: f64) -> (f64, f64) {
        (
            self.start as f64 / sampling_rate,
            self.end as f64 / sampling_rate,
        )
    }
}

impl TryFrom<[usize; 2]> for Interval {
    type Error = ForceError;

    fn try_from(bounds: [usize; 2]) -> ForceResult<Self> {
        Interval::new(bounds[0], bounds[1])
    }
}

impl From<Interval> for [usize; 2] {
    fn from(interval: Interval) -> Self {
        [interval.start, interval.end]
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
