//! Export of processed trials
//!
//! A processed trial is written as an OpenSim storage file and its contact
//! interval is recorded, in seconds, in the participant's configuration.

use crate::config::ExportConfig;
use crate::store::{staging_path, ConfigStore};
use csv::WriterBuilder;
use forceplate_core::{ForceError, ForceResult, Interval, MultiChannelSignal};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Files and store entries produced for one trial
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub path: PathBuf,
    pub onset_seconds: f64,
    pub offset_seconds: f64,
}

/// Writes `<project>/<participant>/<subdirectory>/<trial>.<extension>`
#[derive(Debug, Clone)]
pub struct ExportWriter {
    project: PathBuf,
    config: ExportConfig,
}

impl ExportWriter {
    pub fn new(project: impl Into<PathBuf>, config: ExportConfig) -> Self {
        Self {
            project: project.into(),
            config,
        }
    }

    pub fn export_path(&self, participant: &str, trial: &str) -> PathBuf {
        self.project
            .join(participant)
            .join(&self.config.subdirectory)
            .join(format!("{}.{}", trial, self.config.extension))
    }

    /// Relabel, write the storage file and record the interval
    ///
    /// The file is staged next to its destination and renamed into place
    /// before the onset is recorded. A failed store update removes it again.
    pub fn export(
        &self,
        store: &mut dyn ConfigStore,
        participant: &str,
        trial: &str,
        signal: &MultiChannelSignal,
        interval: Interval,
        targets: &[String],
    ) -> ForceResult<ExportRecord> {
        let path = self.export_path(participant, trial);
        let relabeled = signal.relabel(targets).map_err(|e| ForceError::Export {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ForceError::Export {
                path: path.clone(),
                reason: format!("cannot create {}: {}", dir.display(), e),
            })?;
        }
        let staging = staging_path(&path);
        if let Err(e) = write_sto(&staging, trial, &relabeled) {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(ForceError::Export {
                path,
                reason: e.to_string(),
            });
        }

        let (onset_seconds, offset_seconds) = interval.to_seconds(signal.sampling_rate());
        if let Err(e) = store.record_onset(participant, trial, onset_seconds, offset_seconds) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        info!(
            participant,
            trial,
            path = %path.display(),
            onset = onset_seconds,
            offset = offset_seconds,
            "trial exported"
        );
        Ok(ExportRecord {
            path,
            onset_seconds,
            offset_seconds,
        })
    }
}

/// Write a signal as an OpenSim storage file
pub fn write_sto(path: &Path, name: &str, signal: &MultiChannelSignal) -> ForceResult<()> {
    let export_error = |reason: String| ForceError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::create(path).map_err(|e| export_error(e.to_string()))?;
    let mut out = BufWriter::new(file);
    write_sto_to(&mut out, name, signal).map_err(export_error)?;
    out.flush().map_err(|e| export_error(e.to_string()))
}

/// Storage file contents: header block, column labels, then one row per frame
pub fn write_sto_to<W: Write>(out: &mut W, name: &str, signal: &MultiChannelSignal) -> Result<(), String> {
    write!(
        out,
        "{}\nversion=1\nnRows={}\nnColumns={}\ninDegrees=no\nendheader\n",
        name,
        signal.frame_count(),
        signal.channel_count() + 1
    )
    .map_err(|e| e.to_string())?;

    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(out);

    let header = std::iter::once("time").chain(signal.labels().iter().map(String::as_str));
    writer.write_record(header).map_err(|e| e.to_string())?;

    let data = signal.data();
    for (frame, time) in signal.time_vector().into_iter().enumerate() {
        let column = data.column(frame);
        let row = std::iter::once(time)
            .chain(column.iter().copied())
            .map(|v| v.to_string());
        writer.write_record(row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}
