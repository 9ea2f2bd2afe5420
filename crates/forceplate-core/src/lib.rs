//! forceplate-core: foundation types for force-plate processing
//!
//! Signal container, active intervals and the error taxonomy shared by the
//! processing, simulation and CLI crates.

pub mod error;
pub mod interval;
pub mod signal;

pub use error::{FailurePolicy, ForceError, ForceResult};
pub use interval::Interval;
pub use signal::MultiChannelSignal;
