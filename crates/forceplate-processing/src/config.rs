//! Configuration management for force-plate processing

use crate::filters::FilterConfig;
use forceplate_core::{ForceError, ForceResult};
use serde::{Deserialize, Serialize};

/// Global processing configuration
///
/// Defaults reproduce the parameters the curated dataset was processed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Configuration name/profile
    pub name: String,
    /// Low-pass applied after calibration
    pub filter: FilterConfig,
    /// First frame of the centering window; the window ends one second in
    pub offset_window_start: usize,
    /// Negate the calibrated signal (force sign convention)
    pub flip_sign: bool,
    /// Onset detection parameters
    pub onset: OnsetConfig,
    /// Positional plausibility bounds
    pub bounds: BoundsConfig,
    /// Export layout
    pub export: ExportConfig,
}

/// Threshold-based onset detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Channels whose Euclidean norm is thresholded
    pub norm_channels: Vec<usize>,
    /// Activation threshold (force units)
    pub threshold: f64,
    /// Minimum active duration in seconds, counted on the truncated sampling rate
    pub min_active_seconds: f64,
    /// Longest below-threshold gap (frames) still bridged into one interval
    pub max_gap_frames: usize,
    /// Optional secondary threshold an interval must reach
    pub threshold2: Option<f64>,
    /// Frames that must reach `threshold2`
    pub min_above2: usize,
}

/// Fractions of the trial length the interval must respect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    /// Onsets before this fraction of the trial are rejected
    pub onset_fraction: f64,
    /// Offsets after this fraction of the trial are rejected
    pub offset_fraction: f64,
}

/// Output layout: `<project>/<participant>/<subdirectory>/<trial>.<extension>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub subdirectory: String,
    pub extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "forces".to_string(),
            filter: FilterConfig::lowpass(30.0, 4),
            offset_window_start: 10,
            flip_sign: true,
            onset: OnsetConfig::default(),
            bounds: BoundsConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            norm_channels: vec![0, 1, 2],
            threshold: 5.0,
            min_active_seconds: 0.5,
            max_gap_frames: 1000,
            threshold2: None,
            min_above2: 1,
        }
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            onset_fraction: 0.08,
            offset_fraction: 0.97,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            subdirectory: "0_forces".to_string(),
            extension: "sto".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Validate entire configuration
    ///
    /// Filter cutoffs are checked against the sampling rate later, once a
    /// trial is loaded.
    pub fn validate(&self) -> ForceResult<()> {
        if self.filter.order == 0 {
            return Err(ForceError::config("filter order must be at least 1"));
        }
        if self.filter.cutoff_hz <= 0.0 {
            return Err(ForceError::config("filter cutoff must be positive"));
        }
        if self.onset.norm_channels.is_empty() {
            return Err(ForceError::config("onset detection needs at least one channel"));
        }
        if !self.onset.threshold.is_finite() {
            return Err(ForceError::config("onset threshold must be finite"));
        }
        if self.onset.min_active_seconds <= 0.0 {
            return Err(ForceError::config("minimum active duration must be positive"));
        }

        let bounds = &self.bounds;
        let in_unit = |f: f64| (0.0..=1.0).contains(&f);
        if !in_unit(bounds.onset_fraction) || !in_unit(bounds.offset_fraction) {
            return Err(ForceError::config("plausibility bounds must be fractions in [0, 1]"));
        }
        if bounds.onset_fraction >= bounds.offset_fraction {
            return Err(ForceError::config(format!(
                "onset bound {} must be lower than offset bound {}",
                bounds.onset_fraction, bounds.offset_fraction
            )));
        }

        if self.export.subdirectory.is_empty() || self.export.extension.is_empty() {
            return Err(ForceError::config("export subdirectory and extension are required"));
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> ForceResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ForceError::config(format!("failed to serialize configuration: {}", e)))
    }

    /// Import configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> ForceResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ForceError::config(format!("failed to deserialize configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
