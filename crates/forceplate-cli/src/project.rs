//! Project layout and run setup

use anyhow::{Context, Result};
use forceplate_processing::{
    BatchReport, CalibrationMatrix, ConfigStore, CsvTrialReader, ExceptionTable, ForcePipeline,
    JsonConfigStore, PipelineConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Files of a processing project
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calibration_matrix_path(&self) -> PathBuf {
        self.root.join("forces_calibration_matrix.csv")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("pipeline.json")
    }

    pub fn exceptions_path(&self) -> PathBuf {
        self.root.join("trial_exceptions.json")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("conf")
    }

    /// `pipeline.json` if present, defaults otherwise
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(PipelineConfig::default());
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        PipelineConfig::from_json(&json).with_context(|| format!("loading {}", path.display()))
    }

    /// `trial_exceptions.json` if present, the built-in table otherwise
    pub fn load_exceptions(&self) -> Result<ExceptionTable> {
        let path = self.exceptions_path();
        if path.exists() {
            ExceptionTable::load(&path).with_context(|| format!("loading {}", path.display()))
        } else {
            ExceptionTable::builtin().context("loading built-in exception table")
        }
    }

    pub fn load_matrix(&self) -> Result<CalibrationMatrix> {
        let path = self.calibration_matrix_path();
        CalibrationMatrix::from_csv_path(&path).with_context(|| format!("loading {}", path.display()))
    }

    /// Process `participants`, or every participant of the store when empty
    pub fn run(&self, participants: &[String], extension: Option<&str>) -> Result<BatchReport> {
        let config = self.load_config()?;
        let exceptions = self.load_exceptions()?;
        let matrix = self.load_matrix()?;
        info!(
            project = %self.root.display(),
            config = %config.name,
            exceptions = exceptions.len(),
            "project loaded"
        );

        let mut reader = CsvTrialReader::new();
        if let Some(extension) = extension {
            reader = reader.with_extension(extension);
        }

        let mut builder = ForcePipeline::builder(&self.root);
        builder
            .config(config)
            .calibration_matrix(matrix)
            .exceptions(exceptions)
            .reader(Box::new(reader));
        let mut pipeline = builder.build().context("building pipeline")?;

        let mut store = JsonConfigStore::new(self.store_dir()).with_base_dir(&self.root);
        let participants = if participants.is_empty() {
            store.participants().context("listing participants")?
        } else {
            participants.to_vec()
        };

        pipeline
            .run(&mut store, &participants)
            .context("processing aborted; curate the exception table and rerun")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_layout() {
        let project = Project::new("/data/lift");
        assert_eq!(
            project.calibration_matrix_path(),
            PathBuf::from("/data/lift/forces_calibration_matrix.csv")
        );
        assert_eq!(project.store_dir(), PathBuf::from("/data/lift/conf"));
        assert_eq!(project.exceptions_path(), PathBuf::from("/data/lift/trial_exceptions.json"));
    }

    #[test]
    fn test_missing_optional_files_use_defaults() {
        let project = Project::new("/nonexistent/project");
        assert_eq!(project.load_config().unwrap(), PipelineConfig::default());
        assert!(project.load_exceptions().unwrap().exception("GatBH18H4_3").is_some());
        assert!(project.load_matrix().is_err());
    }
}
