//! Ground-contact force profiles for synthetic trials

use serde::{Deserialize, Serialize};

/// Rise and fall time of a contact, in seconds
const RAMP_SECONDS: f64 = 0.05;

/// Vertical force profile of a trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContactPattern {
    /// No contact at all
    Rest,
    /// One contact between `onset` and `offset` seconds
    SingleContact { onset: f64, offset: f64, peak: f64 },
    /// Two separate contacts, e.g. a foot lifted mid-trial
    DoubleContact {
        first: (f64, f64),
        second: (f64, f64),
        peak: f64,
    },
}

fn trapezoid(time: f64, onset: f64, offset: f64, peak: f64) -> f64 {
    if time < onset || time > offset {
        0.0
    } else if time < onset + RAMP_SECONDS {
        peak * (time - onset) / RAMP_SECONDS
    } else if time > offset - RAMP_SECONDS {
        peak * (offset - time) / RAMP_SECONDS
    } else {
        peak
    }
}

impl ContactPattern {
    /// Force magnitude at `time` seconds
    pub fn force_at_time(&self, time: f64) -> f64 {
        match *self {
            ContactPattern::Rest => 0.0,
            ContactPattern::SingleContact { onset, offset, peak } => trapezoid(time, onset, offset, peak),
            ContactPattern::DoubleContact { first, second, peak } => {
                trapezoid(time, first.0, first.1, peak) + trapezoid(time, second.0, second.1, peak)
            }
        }
    }

    /// Contact windows in seconds
    pub fn contacts(&self) -> Vec<(f64, f64)> {
        match *self {
            ContactPattern::Rest => Vec::new(),
            ContactPattern::SingleContact { onset, offset, .. } => vec![(onset, offset)],
            ContactPattern::DoubleContact { first, second, .. } => vec![first, second],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ContactPattern::Rest => "No contact",
            ContactPattern::SingleContact { .. } => "Single contact",
            ContactPattern::DoubleContact { .. } => "Two separate contacts",
        }
    }

    /// Common profiles for a 10 s trial
    pub fn presets() -> Vec<(&'static str, ContactPattern)> {
        vec![
            ("Rest", ContactPattern::Rest),
            (
                "Lift",
                ContactPattern::SingleContact {
                    onset: 2.0,
                    offset: 8.0,
                    peak: 400.0,
                },
            ),
            (
                "Early Lift",
                ContactPattern::SingleContact {
                    onset: 0.6,
                    offset: 5.0,
                    peak: 400.0,
                },
            ),
            (
                "Regrip",
                ContactPattern::DoubleContact {
                    first: (2.0, 4.0),
                    second: (6.0, 8.0),
                    peak: 400.0,
                },
            ),
        ]
    }
}
