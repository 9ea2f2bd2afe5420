//! Channel-to-target assignment
//!
//! A participant's configuration lists assignment attempts in priority
//! order. Each attempt names, slot by slot, the raw channel feeding a
//! target; empty slots are targets the recording did not capture and are
//! filled with NaN so the channel count always matches the target list.

use forceplate_core::{ForceResult, MultiChannelSignal};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One assignment attempt: a raw channel name per target slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Option<String>>", into = "Vec<Option<String>>")]
pub struct AssignmentAttempt {
    slots: Vec<Option<String>>,
}

impl AssignmentAttempt {
    /// Build an attempt; blank names become unassigned slots
    pub fn new<S: Into<String>>(slots: Vec<Option<S>>) -> Self {
        let slots = slots
            .into_iter()
            .map(|slot| slot.map(Into::into).filter(|name: &String| !name.trim().is_empty()))
            .collect();
        Self { slots }
    }

    /// Attempt from plain names, `""` marking an unassigned slot
    pub fn from_names(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| Some(*n)).collect())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Indices of unassigned slots, ascending
    pub fn empty_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Names of the assigned slots, in slot order
    pub fn assigned_names(&self) -> Vec<&str> {
        self.slots.iter().flatten().map(String::as_str).collect()
    }

    /// Extract the assigned channels and pad every empty slot with NaN
    pub fn extract(&self, raw: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        let mut signal = raw.select(&self.assigned_names())?;
        for index in self.empty_slots() {
            signal = signal.insert_nan_channel(index, "")?;
        }
        Ok(signal)
    }
}

impl From<Vec<Option<String>>> for AssignmentAttempt {
    fn from(slots: Vec<Option<String>>) -> Self {
        AssignmentAttempt::new(slots)
    }
}

impl From<AssignmentAttempt> for Vec<Option<String>> {
    fn from(attempt: AssignmentAttempt) -> Self {
        attempt.slots
    }
}

/// Result of channel assignment
#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    /// An attempt produced correctly shaped data
    Assigned {
        signal: MultiChannelSignal,
        /// Index of the accepted attempt
        attempt: usize,
        /// Slots filled with NaN
        nan_slots: Vec<usize>,
    },
    /// No attempt produced the expected channel count
    NoMatch { attempts_tried: usize },
}

/// Try each attempt in order and keep the first one with `expected` channels
///
/// An attempt fails when one of its names is missing from the raw labels or
/// when its padded width differs from `expected`; later attempts are not
/// tried once one succeeds.
pub fn assign_channels(
    attempts: &[AssignmentAttempt],
    raw: &MultiChannelSignal,
    expected: usize,
) -> AssignmentOutcome {
    for (index, attempt) in attempts.iter().enumerate() {
        let signal = match attempt.extract(raw) {
            Ok(signal) => signal,
            Err(e) => {
                trace!(attempt = index, error = %e, "assignment attempt rejected");
                continue;
            }
        };

        if signal.channel_count() != expected {
            trace!(
                attempt = index,
                channels = signal.channel_count(),
                expected,
                "assignment attempt has wrong dimensions"
            );
            continue;
        }

        let nan_slots = attempt.empty_slots();
        debug!(attempt = index, ?nan_slots, "channel assignment selected");
        return AssignmentOutcome::Assigned {
            signal,
            attempt: index,
            nan_slots,
        };
    }

    AssignmentOutcome::NoMatch {
        attempts_tried: attempts.len(),
    }
}
