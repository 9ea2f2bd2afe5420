//! Calibration and filtering of assigned force-plate channels
//!
//! Order of operations: NaN frame removal, median centering on the first
//! second, linear calibration, zero-phase low-pass, sign flip.

use crate::config::PipelineConfig;
use crate::filters::{ButterworthFilter, FilterConfig};
use crate::processor::{ProcessorChain, SignalProcessor};
use forceplate_core::{ForceError, ForceResult, MultiChannelSignal};
use ndarray::{Array1, Array2, Axis};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Square matrix mapping raw channel space to calibrated target space
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMatrix {
    matrix: Array2<f64>,
}

impl CalibrationMatrix {
    pub fn new(matrix: Array2<f64>) -> ForceResult<Self> {
        if matrix.is_empty() || matrix.nrows() != matrix.ncols() {
            return Err(ForceError::config(format!(
                "calibration matrix must be square and non-empty, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(ForceError::config("calibration matrix holds non-finite values"));
        }
        Ok(Self { matrix })
    }

    pub fn identity(dimension: usize) -> ForceResult<Self> {
        Self::new(Array2::eye(dimension))
    }

    /// Read a comma-delimited matrix file
    pub fn from_csv_path(path: impl AsRef<Path>) -> ForceResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ForceError::io(path, e))?;
        Self::from_csv_reader(file)
    }

    /// Read a comma-delimited matrix from any reader
    pub fn from_csv_reader<R: Read>(reader: R) -> ForceResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record
                .map_err(|e| ForceError::config(format!("calibration matrix row {}: {}", line, e)))?;
            let row = record
                .iter()
                .map(|field| {
                    field.parse::<f64>().map_err(|_| {
                        ForceError::config(format!(
                            "calibration matrix row {}: '{}' is not a number",
                            line, field
                        ))
                    })
                })
                .collect::<ForceResult<Vec<_>>>()?;
            rows.push(row);
        }

        let dimension = rows.len();
        if rows.iter().any(|row| row.len() != dimension) {
            return Err(ForceError::config(format!(
                "calibration matrix must be square, got {} rows of widths {:?}",
                dimension,
                rows.iter().map(Vec::len).collect::<Vec<_>>()
            )));
        }

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((dimension, dimension), flat)
            .map_err(|e| ForceError::config(format!("calibration matrix shape: {}", e)))?;
        Self::new(matrix)
    }

    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

/// Explicit calibration parameters, shared by every trial of a run
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub matrix: CalibrationMatrix,
    pub filter: FilterConfig,
    pub offset_window_start: usize,
    pub flip_sign: bool,
}

impl CalibrationConfig {
    pub fn new(matrix: CalibrationMatrix, pipeline: &PipelineConfig) -> Self {
        Self {
            matrix,
            filter: pipeline.filter,
            offset_window_start: pipeline.offset_window_start,
            flip_sign: pipeline.flip_sign,
        }
    }
}

/// NaN-ignoring median; `None` when nothing is left
pub fn nan_median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut finite: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let mid = finite.len() / 2;
    Some(if finite.len() % 2 == 0 {
        (finite[mid - 1] + finite[mid]) / 2.0
    } else {
        finite[mid]
    })
}

/// Subtract each channel's median over frames `[start, floor(rate))`
pub struct MedianCentering {
    window_start: usize,
}

impl MedianCentering {
    pub fn new(window_start: usize) -> Self {
        Self { window_start }
    }

    /// Per-channel offsets; channels with an empty window keep a zero offset
    pub fn offsets(&self, signal: &MultiChannelSignal) -> Array1<f64> {
        let window_end = (signal.sampling_rate() as usize).min(signal.frame_count());
        let start = self.window_start.min(window_end);

        signal
            .data()
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(channel, row)| {
                let window = row.slice(ndarray::s![start..window_end]);
                nan_median(window.iter().copied()).unwrap_or_else(|| {
                    warn!(channel, start, window_end, "empty centering window, offset left at zero");
                    0.0
                })
            })
            .collect()
    }
}

impl SignalProcessor for MedianCentering {
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        let offsets = self.offsets(input);
        let centered = input.data() - &offsets.insert_axis(Axis(1));
        input.with_data(centered)
    }

    fn name(&self) -> &str {
        "Median Centering"
    }
}

/// Linear transform `M x data` (one calibrated frame per raw frame)
pub struct CalibrationTransform {
    matrix: CalibrationMatrix,
}

impl CalibrationTransform {
    pub fn new(matrix: CalibrationMatrix) -> Self {
        Self { matrix }
    }
}

impl SignalProcessor for CalibrationTransform {
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        if self.matrix.dimension() != input.channel_count() {
            return Err(ForceError::MatrixMismatch {
                dimension: self.matrix.dimension(),
                channels: input.channel_count(),
            });
        }
        input.with_data(self.matrix.matrix().dot(input.data()))
    }

    fn name(&self) -> &str {
        "Calibration"
    }
}

/// Butterworth low-pass applied forward and backward along time
pub struct ZeroPhaseLowPass {
    config: FilterConfig,
}

impl ZeroPhaseLowPass {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }
}

impl SignalProcessor for ZeroPhaseLowPass {
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        let filter = ButterworthFilter::lowpass(self.config, input.sampling_rate())?;

        let mut filtered = Array2::zeros(input.data().raw_dim());
        for (row, mut target) in input
            .data()
            .axis_iter(Axis(0))
            .zip(filtered.axis_iter_mut(Axis(0)))
        {
            let samples = filter.filtfilt(&row.to_vec());
            target.assign(&Array1::from(samples));
        }
        input.with_data(filtered)
    }

    fn name(&self) -> &str {
        "Zero-phase Low-pass"
    }
}

/// Negate every sample
pub struct SignFlip;

impl SignalProcessor for SignFlip {
    fn process(&self, input: &MultiChannelSignal) -> ForceResult<MultiChannelSignal> {
        input.with_data(-input.data())
    }

    fn name(&self) -> &str {
        "Sign Flip"
    }
}

/// Output of [`SignalCalibrationFilter::process`]
#[derive(Debug, Clone)]
pub struct CalibratedSignal {
    pub signal: MultiChannelSignal,
    /// Frames removed for holding NaN values (indices in the input)
    pub dropped_frames: Vec<usize>,
}

/// Full calibration chain for assigned trials
pub struct SignalCalibrationFilter {
    chain: ProcessorChain,
}

impl SignalCalibrationFilter {
    pub fn new(config: CalibrationConfig) -> Self {
        let mut chain = ProcessorChain::new();
        chain
            .add_processor(Box::new(MedianCentering::new(config.offset_window_start)))
            .add_processor(Box::new(CalibrationTransform::new(config.matrix)))
            .add_processor(Box::new(ZeroPhaseLowPass::new(config.filter)));
        if config.flip_sign {
            chain.add_processor(Box::new(SignFlip));
        }
        Self { chain }
    }

    /// Stage names in execution order, NaN removal excluded
    pub fn stages(&self) -> Vec<String> {
        self.chain.processor_names()
    }

    pub fn process(&self, assigned: &MultiChannelSignal) -> ForceResult<CalibratedSignal> {
        let (cleaned, dropped_frames) = assigned.drop_nan_frames()?;
        if !dropped_frames.is_empty() {
            warn!(
                removed = dropped_frames.len(),
                indices = ?dropped_frames,
                "removing NaN frames"
            );
        }
        debug!(frames = cleaned.frame_count(), "calibrating signal");

        let signal = self.chain.process(&cleaned)?;
        Ok(CalibratedSignal {
            signal,
            dropped_frames,
        })
    }
}
