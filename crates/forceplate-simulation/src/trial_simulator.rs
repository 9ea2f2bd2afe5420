//! Synthetic force-plate trials with sensor bias, noise and dropouts

use crate::signal_patterns::ContactPattern;
use forceplate_core::{ForceError, ForceResult, MultiChannelSignal};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Share of the contact force seen by each channel (Fx, Fy, Fz, Mx, My, Mz)
const CHANNEL_WEIGHTS: [f64; 6] = [0.15, 0.1, 1.0, 0.02, 0.02, 0.01];

/// Configuration for trial simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Trial length in seconds
    pub duration: f64,
    /// Channel names, written with `label_prefix`
    pub labels: Vec<String>,
    pub label_prefix: String,
    pub pattern: ContactPattern,
    /// Gaussian noise standard deviation
    pub noise_std: f64,
    /// Per-channel constant offsets are drawn from `[-max_bias, max_bias]`
    pub max_bias: f64,
    /// Frames whose first channel reads NaN
    pub nan_frames: Vec<usize>,
    pub first_frame_time: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 2000.0,
            duration: 10.0,
            labels: ["Fx", "Fy", "Fz", "Mx", "My", "Mz"].iter().map(|s| s.to_string()).collect(),
            label_prefix: "Voltage:".to_string(),
            pattern: ContactPattern::SingleContact {
                onset: 2.0,
                offset: 8.0,
                peak: 400.0,
            },
            noise_std: 0.2,
            max_bias: 3.0,
            nan_frames: Vec::new(),
            first_frame_time: 0.0,
            seed: Some(42),
        }
    }
}

impl TrialConfig {
    pub fn frame_count(&self) -> usize {
        (self.duration * self.sampling_rate) as usize
    }
}

/// Force-plate trial simulator
pub struct TrialSimulator {
    config: TrialConfig,
    rng: StdRng,
    noise: Normal<f64>,
}

impl TrialSimulator {
    pub fn new(config: TrialConfig) -> ForceResult<Self> {
        if !(config.sampling_rate.is_finite() && config.sampling_rate > 0.0) {
            return Err(ForceError::config(format!(
                "sampling rate must be positive, got {}",
                config.sampling_rate
            )));
        }
        if config.labels.is_empty() {
            return Err(ForceError::config("at least one channel is required"));
        }
        if !(config.noise_std.is_finite() && config.noise_std >= 0.0) {
            return Err(ForceError::config(format!(
                "noise standard deviation must be finite and non-negative, got {}",
                config.noise_std
            )));
        }
        if config.max_bias < 0.0 {
            return Err(ForceError::config("bias range must not be negative"));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| ForceError::config(format!("invalid noise distribution: {}", e)))?;

        Ok(TrialSimulator { config, rng, noise })
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    /// Generate one raw trial
    pub fn generate(&mut self) -> ForceResult<MultiChannelSignal> {
        let channels = self.config.labels.len();
        let frames = self.config.frame_count();
        let rate = self.config.sampling_rate;
        let max_bias = self.config.max_bias;

        let bias: Vec<f64> = (0..channels)
            .map(|_| if max_bias > 0.0 { self.rng.gen_range(-max_bias..=max_bias) } else { 0.0 })
            .collect();

        let mut data = Array2::<f64>::zeros((channels, frames));
        for frame in 0..frames {
            let force = self.config.pattern.force_at_time(frame as f64 / rate);
            for channel in 0..channels {
                let weight = CHANNEL_WEIGHTS[channel % CHANNEL_WEIGHTS.len()];
                data[[channel, frame]] = weight * force + bias[channel] + self.noise.sample(&mut self.rng);
            }
        }
        for &frame in &self.config.nan_frames {
            if frame < frames {
                data[[0, frame]] = f64::NAN;
            }
        }

        let labels = self
            .config
            .labels
            .iter()
            .map(|l| format!("{}{}", self.config.label_prefix, l))
            .collect();
        Ok(MultiChannelSignal::new(labels, data, rate)?.with_first_frame_time(self.config.first_frame_time))
    }
}

/// Write a trial as `time,<labels...>` CSV, NaN as `NaN`
pub fn write_trial_csv(path: &Path, signal: &MultiChannelSignal) -> ForceResult<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| ForceError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let export_error = |e: csv::Error| ForceError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let header = std::iter::once("time").chain(signal.labels().iter().map(String::as_str));
    writer.write_record(header).map_err(export_error)?;

    let data = signal.data();
    for (frame, time) in signal.time_vector().into_iter().enumerate() {
        let column = data.column(frame);
        let row = std::iter::once(time)
            .chain(column.iter().copied())
            .map(|v| v.to_string());
        writer.write_record(row).map_err(export_error)?;
    }
    writer.flush().map_err(|e| ForceError::io(path, e))
}
