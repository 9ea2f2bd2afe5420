//! Digital filters for force-plate processing
//!
//! Butterworth low-pass designed as a cascade of biquad sections and run
//! forward-backward (zero phase), with odd reflection padding and
//! steady-state initial conditions at both passes.

use forceplate_core::{ForceError, ForceResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Filter configuration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Cutoff frequency (Hz)
    pub cutoff_hz: f64,
    /// Filter order
    pub order: usize,
}

impl FilterConfig {
    /// Create lowpass filter configuration
    pub fn lowpass(cutoff_hz: f64, order: usize) -> Self {
        Self { cutoff_hz, order }
    }

    /// Check the configuration against a sampling rate
    pub fn validate(&self, sampling_rate: f64) -> ForceResult<()> {
        if self.order == 0 {
            return Err(ForceError::config("filter order must be at least 1"));
        }
        if !(self.cutoff_hz > 0.0 && self.cutoff_hz < sampling_rate / 2.0) {
            return Err(ForceError::config(format!(
                "cutoff {} Hz must lie in (0, {}) Hz for a {} Hz signal",
                self.cutoff_hz,
                sampling_rate / 2.0,
                sampling_rate
            )));
        }
        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::lowpass(30.0, 4)
    }
}

/// Single biquad section, transposed direct form II
///
/// y[n] = b0*x[n] + z1
/// z1   = b1*x[n] - a1*y[n] + z2
/// z2   = b2*x[n] - a2*y[n]
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadSection {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadSection {
    /// Second-order low-pass section for an analog pole pair `s^2 + damping*s + 1`
    fn lowpass_pair(k: f64, damping: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + damping * k + k2);
        let b0 = k2 * norm;
        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - damping * k + k2) * norm,
        }
    }

    /// First-order low-pass section for odd orders
    fn lowpass_single(k: f64) -> Self {
        let b0 = k / (1.0 + k);
        Self {
            b0,
            b1: b0,
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// State reached after an infinitely long constant input `level`
    fn steady_state(&self, level: f64) -> [f64; 2] {
        let output = self.dc_gain() * level;
        [output - self.b0 * level, self.b2 * level - self.a2 * output]
    }

    fn run(&self, samples: &mut [f64], state: [f64; 2]) {
        let [mut z1, mut z2] = state;
        for sample in samples.iter_mut() {
            let x = *sample;
            let y = self.b0 * x + z1;
            z1 = self.b1 * x - self.a1 * y + z2;
            z2 = self.b2 * x - self.a2 * y;
            *sample = y;
        }
    }
}

/// Butterworth low-pass filter
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    config: FilterConfig,
    sections: Vec<BiquadSection>,
}

impl ButterworthFilter {
    /// Design the filter by bilinear transform with pre-warping at the cutoff
    pub fn lowpass(config: FilterConfig, sampling_rate: f64) -> ForceResult<Self> {
        config.validate(sampling_rate)?;

        let order = config.order;
        let k = (PI * config.cutoff_hz / sampling_rate).tan();

        let mut sections = Vec::with_capacity((order + 1) / 2);
        if order % 2 == 1 {
            sections.push(BiquadSection::lowpass_single(k));
        }
        for pair in 1..=order / 2 {
            let damping = 2.0 * ((2 * pair - 1) as f64 * PI / (2 * order) as f64).sin();
            sections.push(BiquadSection::lowpass_pair(k, damping));
        }

        Ok(ButterworthFilter { config, sections })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Reflection padding used by [`ButterworthFilter::filtfilt`]
    pub fn pad_length(&self) -> usize {
        3 * (self.config.order + 1)
    }

    /// Causal filtering starting from rest
    #[cfg(test)]
    fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut output = input.to_vec();
        for section in &self.sections {
            section.run(&mut output, [0.0, 0.0]);
        }
        output
    }

    /// Zero-phase filtering: forward pass, then backward pass
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }

        let pad = self.pad_length().min(n - 1);
        let mut extended = odd_extension(input, pad);

        self.run_steady(&mut extended);
        extended.reverse();
        self.run_steady(&mut extended);
        extended.reverse();

        extended[pad..pad + n].to_vec()
    }

    /// Run the cascade with every section primed for the first sample
    fn run_steady(&self, samples: &mut [f64]) {
        let mut level = samples[0];
        for section in &self.sections {
            let state = section.steady_state(level);
            section.run(samples, state);
            level *= section.dc_gain();
        }
    }
}

/// Odd reflection of `pad` samples about both end points
fn odd_extension(input: &[f64], pad: usize) -> Vec<f64> {
    let n = input.len();
    let first = input[0];
    let last = input[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    extended.extend_from_slice(input);
    extended.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));
    extended
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn peak(data: &[f64]) -> f64 {
        data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    #[test]
    fn test_filter_config_validation() {
        assert!(FilterConfig::lowpass(30.0, 4).validate(1000.0).is_ok());
        assert!(FilterConfig::lowpass(30.0, 0).validate(1000.0).is_err());
        assert!(FilterConfig::lowpass(600.0, 4).validate(1000.0).is_err());
        assert!(ButterworthFilter::lowpass(FilterConfig::lowpass(-1.0, 2), 1000.0).is_err());
    }

    #[test]
    fn test_section_count_follows_order() {
        for order in 1..=6 {
            let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, order), 1000.0).unwrap();
            assert_eq!(filter.sections.len(), (order + 1) / 2);
        }
    }

    #[test]
    fn test_unity_dc_gain() {
        let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, 4), 2000.0).unwrap();
        let output = filter.filtfilt(&vec![12.5; 500]);
        for v in output {
            assert_abs_diff_eq!(v, 12.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_attenuates_high_frequency() {
        let fs = 1000.0;
        let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, 4), fs).unwrap();
        let output = filter.filtfilt(&sine(200.0, fs, 4000));
        assert!(peak(&output[500..3500]) < 1e-3);
    }

    #[test]
    fn test_half_amplitude_at_cutoff() {
        let fs = 1000.0;
        let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, 4), fs).unwrap();
        let output = filter.filtfilt(&sine(30.0, fs, 4000));
        assert_abs_diff_eq!(peak(&output[1000..3000]), 0.5, epsilon = 0.01);
    }

    #[test]
    fn test_zero_phase_keeps_low_frequency_aligned() {
        let fs = 1000.0;
        let input = sine(2.0, fs, 4000);
        let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, 4), fs).unwrap();
        let output = filter.filtfilt(&input);
        for i in 500..3500 {
            assert_abs_diff_eq!(output[i], input[i], epsilon = 1e-3);
        }

        // a one-pass filter lags the same signal
        let causal = filter.filter(&input);
        let lag_error = (500..3500)
            .map(|i| (causal[i] - input[i]).abs())
            .fold(0.0_f64, f64::max);
        assert!(lag_error > 1e-2);
    }

    #[test]
    fn test_short_and_empty_inputs() {
        let filter = ButterworthFilter::lowpass(FilterConfig::lowpass(30.0, 4), 1000.0).unwrap();
        assert!(filter.filtfilt(&[]).is_empty());
        assert_eq!(filter.filtfilt(&[3.0]).len(), 1);
        assert_eq!(filter.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_odd_extension() {
        let extended = odd_extension(&[1.0, 2.0, 4.0], 2);
        assert_eq!(extended, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
    }
}
