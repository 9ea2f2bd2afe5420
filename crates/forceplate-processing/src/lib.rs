//! forceplate-processing: force-plate trial processing
//!
//! Channel assignment, calibration and zero-phase filtering, onset detection,
//! exception-aware validation and export of processed trials.

pub mod assignment;
pub mod calibration;
pub mod config;
pub mod exceptions;
pub mod export;
pub mod filters;
pub mod onset;
pub mod pipeline;
pub mod processor;
pub mod reader;
pub mod review;
pub mod store;
pub mod validation;

pub use assignment::{assign_channels, AssignmentAttempt, AssignmentOutcome};
pub use calibration::{
    CalibratedSignal, CalibrationConfig, CalibrationMatrix, CalibrationTransform, MedianCentering,
    SignFlip, SignalCalibrationFilter, ZeroPhaseLowPass,
};
pub use config::{BoundsConfig, ExportConfig, OnsetConfig, PipelineConfig};
pub use exceptions::{ExceptionTable, Resolution, TrialException};
pub use export::{write_sto, ExportRecord, ExportWriter};
pub use filters::{ButterworthFilter, FilterConfig};
pub use onset::OnsetDetector;
pub use pipeline::{
    trial_files, BatchReport, ForcePipeline, ParticipantFailure, PipelineBuilder, SkipReason, TrialReport,
    TrialStatus,
};
pub use processor::{ProcessorChain, SignalProcessor};
pub use reader::{CsvTrialReader, TrialReader};
pub use review::{AcceptAll, ReviewContext, ReviewDecision, TrialReviewer};
pub use store::{AnalogsConfig, ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use validation::{TrialValidator, Validation};
