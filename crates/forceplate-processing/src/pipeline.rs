//! Batch pipeline: assignment, calibration, detection, validation, export

use crate::assignment::{assign_channels, AssignmentOutcome};
use crate::calibration::{CalibrationConfig, CalibrationMatrix, SignalCalibrationFilter};
use crate::config::PipelineConfig;
use crate::exceptions::ExceptionTable;
use crate::export::{ExportRecord, ExportWriter};
use crate::onset::OnsetDetector;
use crate::reader::{CsvTrialReader, TrialReader};
use crate::review::{AcceptAll, ReviewContext, ReviewDecision, TrialReviewer};
use crate::store::{AnalogsConfig, ConfigStore};
use crate::validation::{TrialValidator, Validation};
use forceplate_core::{FailurePolicy, ForceError, ForceResult, Interval};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Why a trial produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Listed as skipped in the exception table
    ExceptionTable,
    /// Rejected by the review hook
    Reviewer,
}

/// Final state of one trial
#[derive(Debug, Clone, PartialEq)]
pub enum TrialStatus {
    Exported(ExportRecord),
    Skipped(SkipReason),
    /// Failed with an error whose policy only skips the trial
    Failed(String),
}

/// Per-trial entry of a [`BatchReport`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    pub participant: String,
    pub trial: String,
    pub status: TrialStatus,
    /// Accepted interval, if validation got that far
    pub interval: Option<Interval>,
    /// Frames removed for holding NaN values
    pub dropped_frames: usize,
}

/// Participant whose configuration could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantFailure {
    pub participant: String,
    pub error: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub trials: Vec<TrialReport>,
    pub participant_failures: Vec<ParticipantFailure>,
}

impl BatchReport {
    fn count(&self, predicate: impl Fn(&TrialStatus) -> bool) -> usize {
        self.trials.iter().filter(|t| predicate(&t.status)).count()
    }

    pub fn exported(&self) -> usize {
        self.count(|s| matches!(s, TrialStatus::Exported(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TrialStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TrialStatus::Failed(_)))
    }

    pub fn trial(&self, trial: &str) -> Option<&TrialReport> {
        self.trials.iter().find(|t| t.trial == trial)
    }
}

/// Trial files of a directory with the given extension, sorted by name
pub fn trial_files(directory: &Path, extension: &str) -> ForceResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|e| ForceError::io(directory, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ForceError::io(directory, e))?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn trial_name(path: &Path) -> ForceResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| ForceError::signal(format!("no trial name in {}", path.display())))
}

/// Force-plate processing pipeline shared by every trial of a run
pub struct ForcePipeline {
    config: PipelineConfig,
    matrix_dimension: usize,
    calibration: SignalCalibrationFilter,
    validator: TrialValidator,
    writer: ExportWriter,
    reader: Box<dyn TrialReader>,
    reviewer: Box<dyn TrialReviewer>,
}

/// Builder for [`ForcePipeline`]
pub struct PipelineBuilder {
    project: PathBuf,
    config: PipelineConfig,
    matrix: Option<CalibrationMatrix>,
    exceptions: Option<ExceptionTable>,
    reader: Option<Box<dyn TrialReader>>,
    reviewer: Option<Box<dyn TrialReviewer>>,
}

impl PipelineBuilder {
    /// Outputs are written below `project`
    pub fn new(project: impl Into<PathBuf>) -> Self {
        PipelineBuilder {
            project: project.into(),
            config: PipelineConfig::default(),
            matrix: None,
            exceptions: None,
            reader: None,
            reviewer: None,
        }
    }

    pub fn config(&mut self, config: PipelineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn calibration_matrix(&mut self, matrix: CalibrationMatrix) -> &mut Self {
        self.matrix = Some(matrix);
        self
    }

    /// Replace the built-in exception table
    pub fn exceptions(&mut self, table: ExceptionTable) -> &mut Self {
        self.exceptions = Some(table);
        self
    }

    pub fn reader(&mut self, reader: Box<dyn TrialReader>) -> &mut Self {
        self.reader = Some(reader);
        self
    }

    pub fn reviewer(&mut self, reviewer: Box<dyn TrialReviewer>) -> &mut Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn build(self) -> ForceResult<ForcePipeline> {
        self.config.validate()?;
        let matrix = self
            .matrix
            .ok_or_else(|| ForceError::config("a calibration matrix is required"))?;
        let table = match self.exceptions {
            Some(table) => table,
            None => ExceptionTable::builtin()?,
        };

        let matrix_dimension = matrix.dimension();
        let calibration = SignalCalibrationFilter::new(CalibrationConfig::new(matrix, &self.config));
        let validator = TrialValidator::new(table, self.config.bounds);
        let writer = ExportWriter::new(self.project, self.config.export.clone());

        Ok(ForcePipeline {
            config: self.config,
            matrix_dimension,
            calibration,
            validator,
            writer,
            reader: self.reader.unwrap_or_else(|| Box::new(CsvTrialReader::new())),
            reviewer: self.reviewer.unwrap_or_else(|| Box::new(AcceptAll)),
        })
    }
}

impl ForcePipeline {
    pub fn builder(project: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder::new(project)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Calibration stage names in execution order
    pub fn stages(&self) -> Vec<String> {
        self.calibration.stages()
    }

    /// Run one trial file from reading to export
    pub fn process_trial(
        &mut self,
        store: &mut dyn ConfigStore,
        participant: &str,
        analogs: &AnalogsConfig,
        path: &Path,
    ) -> ForceResult<TrialReport> {
        let trial = trial_name(path)?;
        let raw = self.reader.read(path)?;

        let expected = analogs.targets.len();
        let (assigned, nan_slots) = match assign_channels(&analogs.assigned, &raw, expected) {
            AssignmentOutcome::Assigned { signal, nan_slots, .. } => (signal, nan_slots),
            AssignmentOutcome::NoMatch { attempts_tried } => {
                return Err(ForceError::DimensionMismatch {
                    trial,
                    expected,
                    reason: format!("none of {} assignment attempts matched", attempts_tried),
                })
            }
        };
        if !nan_slots.is_empty() {
            info!(trial = %trial, ?nan_slots, "unassigned targets filled with NaN");
        }
        if assigned.channel_count() != self.matrix_dimension {
            return Err(ForceError::DimensionMismatch {
                trial,
                expected: self.matrix_dimension,
                reason: format!(
                    "calibration matrix is {0}x{0}, assignment has {1} channels",
                    self.matrix_dimension,
                    assigned.channel_count()
                ),
            });
        }

        let calibrated = self.calibration.process(&assigned)?;
        let signal = calibrated.signal;
        let dropped_frames = calibrated.dropped_frames.len();

        let detector = OnsetDetector::from_config(&self.config.onset, signal.sampling_rate());
        let (norm, detected) = detector.detect_on_norm(&signal, &self.config.onset.norm_channels)?;

        let mut report = TrialReport {
            participant: participant.to_string(),
            trial: trial.clone(),
            status: TrialStatus::Skipped(SkipReason::ExceptionTable),
            interval: None,
            dropped_frames,
        };

        let interval = match self.validator.validate(&trial, detected, signal.frame_count())? {
            Validation::Skip => return Ok(report),
            Validation::Accepted(interval) => interval,
        };
        report.interval = Some(interval);

        let context = ReviewContext {
            participant,
            trial: &trial,
            signal: &signal,
            norm: &norm,
            interval,
        };
        if self.reviewer.review(&context) == ReviewDecision::Skip {
            report.status = TrialStatus::Skipped(SkipReason::Reviewer);
            return Ok(report);
        }

        let record = self
            .writer
            .export(store, participant, &trial, &signal, interval, &analogs.targets)?;
        report.status = TrialStatus::Exported(record);
        Ok(report)
    }

    /// Process every trial of a participant, in file name order
    pub fn run_participant(
        &mut self,
        store: &mut dyn ConfigStore,
        participant: &str,
        report: &mut BatchReport,
    ) -> ForceResult<()> {
        let analogs = store.analogs(participant)?;
        let directory = analogs.trial_directory().ok_or_else(|| ForceError::Store {
            participant: participant.to_string(),
            reason: "analogs.data lists no directory".to_string(),
        })?;
        let files = trial_files(directory, self.reader.extension())?;
        info!(participant, trials = files.len(), directory = %directory.display(), "processing participant");

        for path in files {
            let start = Instant::now();
            match self.process_trial(store, participant, &analogs, &path) {
                Ok(trial) => {
                    info!(
                        participant,
                        trial = %trial.trial,
                        status = ?trial.status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "trial processed"
                    );
                    report.trials.push(trial);
                }
                Err(e) if e.policy() == FailurePolicy::SkipTrial => {
                    warn!(participant, path = %path.display(), error = %e, "trial failed, continuing");
                    report.trials.push(TrialReport {
                        participant: participant.to_string(),
                        trial: trial_name(&path).unwrap_or_else(|_| path.display().to_string()),
                        status: TrialStatus::Failed(e.to_string()),
                        interval: None,
                        dropped_frames: 0,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Process the given participants in order
    ///
    /// Errors whose policy is [`FailurePolicy::AbortRun`] stop the run and are
    /// returned; the others are recorded in the report.
    pub fn run<S: AsRef<str>>(&mut self, store: &mut dyn ConfigStore, participants: &[S]) -> ForceResult<BatchReport> {
        let mut report = BatchReport::default();
        for (index, participant) in participants.iter().enumerate() {
            let participant = participant.as_ref();
            info!(participant, index, total = participants.len(), "participant");
            match self.run_participant(store, participant, &mut report) {
                Ok(()) => {}
                Err(e) if e.policy() == FailurePolicy::SkipTrial => {
                    warn!(participant, error = %e, "participant skipped");
                    report.participant_failures.push(ParticipantFailure {
                        participant: participant.to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            exported = report.exported(),
            skipped = report.skipped(),
            failed = report.failed(),
            "run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("forceplate-pipeline-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_builder_requires_matrix() {
        let builder = ForcePipeline::builder("/tmp/project");
        assert!(matches!(builder.build(), Err(ForceError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.onset.norm_channels.clear();
        let mut builder = ForcePipeline::builder("/tmp/project");
        builder
            .config(config)
            .calibration_matrix(CalibrationMatrix::identity(3).unwrap());
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_default_stages() {
        let mut builder = ForcePipeline::builder("/tmp/project");
        builder.calibration_matrix(CalibrationMatrix::identity(6).unwrap());
        let pipeline = builder.build().unwrap();
        assert_eq!(pipeline.stages().len(), 4);
        assert_eq!(pipeline.config().filter.order, 4);
    }

    #[test]
    fn test_trial_files_sorted_by_name() {
        let dir = temp_dir();
        for name in ["b.csv", "a.csv", "c.txt", "D.CSV"] {
            std::fs::write(dir.join(name), "").unwrap();
        }
        std::fs::create_dir(dir.join("nested.csv")).unwrap();

        let files = trial_files(&dir, "csv").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["D.CSV", "a.csv", "b.csv"]);

        assert!(matches!(
            trial_files(&dir.join("missing"), "csv"),
            Err(ForceError::Io { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_batch_report_counts() {
        let entry = |trial: &str, status| TrialReport {
            participant: "p".to_string(),
            trial: trial.to_string(),
            status,
            interval: None,
            dropped_frames: 0,
        };
        let report = BatchReport {
            trials: vec![
                entry("a", TrialStatus::Skipped(SkipReason::ExceptionTable)),
                entry("b", TrialStatus::Failed("disk full".to_string())),
                entry("c", TrialStatus::Skipped(SkipReason::Reviewer)),
            ],
            participant_failures: Vec::new(),
        };
        assert_eq!(report.exported(), 0);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.failed(), 1);
        assert!(report.trial("b").is_some());
    }
}
