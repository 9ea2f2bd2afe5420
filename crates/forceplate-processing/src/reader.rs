//! Trial file readers

use csv::{ReaderBuilder, StringRecord, Trim};
use forceplate_core::{ForceError, ForceResult, MultiChannelSignal};
use ndarray::Array2;
use std::io::Read;
use std::path::Path;

/// Relative error below which a derived rate is taken as a whole number of Hz
const RATE_TOLERANCE: f64 = 1e-6;

/// Source of raw analog trials
pub trait TrialReader {
    /// Load every analog channel of a trial file
    fn read(&self, path: &Path) -> ForceResult<MultiChannelSignal>;

    /// File extension the trials are enumerated by, without the dot
    fn extension(&self) -> &str;
}

/// Reader for delimited analog exports
///
/// The first column holds the frame time in seconds and every other column
/// one analog channel. The sampling rate is derived from the time span of
/// the whole trial. Empty fields and `nan` read as NaN.
#[derive(Debug, Clone)]
pub struct CsvTrialReader {
    delimiter: u8,
    extension: String,
}

impl Default for CsvTrialReader {
    fn default() -> Self {
        Self {
            delimiter: b',',
            extension: "csv".to_string(),
        }
    }
}

impl CsvTrialReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Parse a trial from any byte source
    pub fn read_from<R: Read>(&self, source: R) -> ForceResult<MultiChannelSignal> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_reader(source);

        let headers = reader
            .headers()
            .map_err(|e| ForceError::signal(format!("unreadable header: {}", e)))?
            .clone();
        if headers.len() < 2 {
            return Err(ForceError::signal("expected a time column and at least one channel"));
        }
        let labels: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut times = Vec::new();
        let mut values = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ForceError::signal(format!("row {}: {}", row + 1, e)))?;
            if record.len() != headers.len() {
                return Err(ForceError::signal(format!(
                    "row {} has {} fields, expected {}",
                    row + 1,
                    record.len(),
                    headers.len()
                )));
            }
            times.push(parse_field(&record, 0, row)?);
            for column in 1..record.len() {
                values.push(parse_field(&record, column, row)?);
            }
        }

        if times.len() < 2 {
            return Err(ForceError::signal("at least two frames are needed to derive the sampling rate"));
        }
        let frames = times.len();
        let span = times[frames - 1] - times[0];
        if !(span.is_finite() && span > 0.0 && times[1] > times[0]) {
            return Err(ForceError::signal(format!(
                "time stamps must increase, got {} to {}",
                times[0],
                times[frames - 1]
            )));
        }
        let rate = sampling_rate((frames - 1) as f64 / span);

        let frame_major = Array2::from_shape_vec((frames, labels.len()), values)
            .map_err(|e| ForceError::signal(e.to_string()))?;
        let data = frame_major.reversed_axes().as_standard_layout().to_owned();

        Ok(MultiChannelSignal::new(labels, data, rate)?.with_first_frame_time(times[0]))
    }
}

/// Snap a rate derived from time stamps to the nearest whole Hz when it is
/// within rounding error of it
fn sampling_rate(derived: f64) -> f64 {
    let rounded = derived.round();
    if rounded > 0.0 && (derived - rounded).abs() <= RATE_TOLERANCE * rounded {
        rounded
    } else {
        derived
    }
}

fn parse_field(record: &StringRecord, column: usize, row: usize) -> ForceResult<f64> {
    let field = record.get(column).unwrap_or("");
    if field.is_empty() || field.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    field
        .parse::<f64>()
        .map_err(|_| ForceError::signal(format!("row {} column {}: invalid number {:?}", row + 1, column, field)))
}

impl TrialReader for CsvTrialReader {
    fn read(&self, path: &Path) -> ForceResult<MultiChannelSignal> {
        let file = std::fs::File::open(path).map_err(|e| ForceError::io(path, e))?;
        self.read_from(std::io::BufReader::new(file))
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}
