//! Review hook called before a trial is exported

use forceplate_core::{Interval, MultiChannelSignal};

/// Reviewer verdict for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accept,
    Skip,
}

/// Everything a reviewer sees about a validated trial
#[derive(Debug, Clone, Copy)]
pub struct ReviewContext<'a> {
    pub participant: &'a str,
    pub trial: &'a str,
    pub signal: &'a MultiChannelSignal,
    /// Norm the detection ran on
    pub norm: &'a [f64],
    pub interval: Interval,
}

/// Synchronous review step between validation and export
pub trait TrialReviewer {
    fn review(&mut self, context: &ReviewContext<'_>) -> ReviewDecision;
}

/// Accepts every trial
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TrialReviewer for AcceptAll {
    fn review(&mut self, _context: &ReviewContext<'_>) -> ReviewDecision {
        ReviewDecision::Accept
    }
}
