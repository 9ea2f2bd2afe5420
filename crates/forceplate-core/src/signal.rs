//! MultiChannelSignal: core container for force-plate analog data

use crate::error::{ForceError, ForceResult};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use uuid::Uuid;

/// Labeled multi-channel time series
///
/// Data is stored `channels x frames`. Processing stages never mutate a
/// signal in place; they derive a new one with [`MultiChannelSignal::with_data`].
#[derive(Debug, Clone)]
pub struct MultiChannelSignal {
    /// Unique identifier for this signal
    pub id: Uuid,
    labels: Vec<String>,
    data: Array2<f64>,
    sampling_rate: f64,
    first_frame_time: f64,
}

impl MultiChannelSignal {
    /// Create new signal from labels and a `channels x frames` array
    pub fn new(labels: Vec<String>, data: Array2<f64>, sampling_rate: f64) -> ForceResult<Self> {
        if labels.len() != data.nrows() {
            return Err(ForceError::signal(format!(
                "{} labels for {} channels",
                labels.len(),
                data.nrows()
            )));
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(ForceError::signal(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }

        Ok(MultiChannelSignal {
            id: Uuid::new_v4(),
            labels,
            data,
            sampling_rate,
            first_frame_time: 0.0,
        })
    }

    /// Set the time stamp of the first frame (seconds)
    pub fn with_first_frame_time(mut self, time: f64) -> Self {
        self.first_frame_time = time;
        self
    }

    /// Derive a signal with new data and the same labels, rate and start time
    pub fn with_data(&self, data: Array2<f64>) -> ForceResult<Self> {
        Ok(MultiChannelSignal::new(self.labels.clone(), data, self.sampling_rate)?
            .with_first_frame_time(self.first_frame_time))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn first_frame_time(&self) -> f64 {
        self.first_frame_time
    }

    pub fn channel_count(&self) -> usize {
        self.data.nrows()
    }

    pub fn frame_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Signal duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sampling_rate
    }

    /// Time stamp of every frame
    pub fn time_vector(&self) -> Vec<f64> {
        let dt = 1.0 / self.sampling_rate;
        (0..self.frame_count())
            .map(|i| self.first_frame_time + i as f64 * dt)
            .collect()
    }

    /// Data of one channel
    pub fn channel(&self, index: usize) -> ForceResult<ArrayView1<'_, f64>> {
        if index >= self.channel_count() {
            return Err(ForceError::signal(format!(
                "channel index {} out of bounds ({} channels)",
                index,
                self.channel_count()
            )));
        }
        Ok(self.data.row(index))
    }

    /// Position of a channel by name
    ///
    /// A label matches when it equals `name` or when its part after the
    /// last `:` does (readers prefix analog labels with a device name).
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|label| label == name)
            .or_else(|| {
                self.labels.iter().position(|label| {
                    label
                        .rsplit_once(':')
                        .map_or(false, |(_, suffix)| suffix == name)
                })
            })
    }

    /// Extract the named channels, in the requested order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> ForceResult<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.channel_index(name.as_ref()).ok_or_else(|| {
                    ForceError::signal(format!("channel '{}' not found", name.as_ref()))
                })
            })
            .collect::<ForceResult<Vec<_>>>()?;

        let labels = names.iter().map(|n| n.as_ref().to_string()).collect();
        Ok(MultiChannelSignal::new(labels, self.data.select(Axis(0), &indices), self.sampling_rate)?
            .with_first_frame_time(self.first_frame_time))
    }

    /// Insert a NaN-filled channel so that it ends up at `index`
    pub fn insert_nan_channel(&self, index: usize, label: &str) -> ForceResult<Self> {
        if index > self.channel_count() {
            return Err(ForceError::signal(format!(
                "cannot insert channel at {} ({} channels)",
                index,
                self.channel_count()
            )));
        }

        let nan_row = Array2::from_elem((1, self.frame_count()), f64::NAN);
        let data = concatenate(
            Axis(0),
            &[
                self.data.slice(ndarray::s![..index, ..]),
                nan_row.view(),
                self.data.slice(ndarray::s![index.., ..]),
            ],
        )
        .map_err(|e| ForceError::signal(format!("failed to insert channel: {}", e)))?;

        let mut labels = self.labels.clone();
        labels.insert(index, label.to_string());
        Ok(MultiChannelSignal::new(labels, data, self.sampling_rate)?
            .with_first_frame_time(self.first_frame_time))
    }

    /// Frames that hold a NaN in at least one channel
    pub fn nan_frames(&self) -> Vec<usize> {
        self.data
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, frame)| frame.iter().any(|v| v.is_nan()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Drop every frame holding a NaN; returns the cleaned signal and removed indices
    pub fn drop_nan_frames(&self) -> ForceResult<(Self, Vec<usize>)> {
        let removed = self.nan_frames();
        if removed.is_empty() {
            return Ok((self.clone(), removed));
        }

        let kept: Vec<usize> = (0..self.frame_count())
            .filter(|i| removed.binary_search(i).is_err())
            .collect();
        let cleaned = self.with_data(self.data.select(Axis(1), &kept))?;
        Ok((cleaned, removed))
    }

    /// Replace channel labels
    pub fn relabel<S: AsRef<str>>(&self, labels: &[S]) -> ForceResult<Self> {
        if labels.len() != self.channel_count() {
            return Err(ForceError::signal(format!(
                "{} labels for {} channels",
                labels.len(),
                self.channel_count()
            )));
        }
        let mut relabeled = self.clone();
        relabeled.labels = labels.iter().map(|l| l.as_ref().to_string()).collect();
        Ok(relabeled)
    }

    /// Frame-wise Euclidean norm over a subset of channels
    pub fn norm(&self, channels: &[usize]) -> ForceResult<Array1<f64>> {
        let mut sum_sq = Array1::<f64>::zeros(self.frame_count());
        for &index in channels {
            let channel = self.channel(index)?;
            sum_sq.zip_mut_with(&channel, |acc, &v| *acc += v * v);
        }
        Ok(sum_sq.mapv(f64::sqrt))
    }
}
