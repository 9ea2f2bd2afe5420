//! forceplate-simulation: synthetic force-plate trials
//!
//! Deterministic raw trials with configurable contact profiles, sensor bias,
//! noise and NaN dropouts for tests and demos.

pub mod signal_patterns;
pub mod trial_simulator;

pub use signal_patterns::ContactPattern;
pub use trial_simulator::{write_trial_csv, TrialConfig, TrialSimulator};
