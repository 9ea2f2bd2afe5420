// tests/pipeline_integration.rs

use approx::assert_abs_diff_eq;
use forceplate_core::{ForceError, Interval};
use forceplate_processing::{
    AnalogsConfig, AssignmentAttempt, CalibrationMatrix, ConfigStore, ExceptionTable, ForcePipeline,
    JsonConfigStore, MemoryConfigStore, ReviewContext, ReviewDecision, SkipReason, TrialReviewer,
    TrialStatus,
};
use forceplate_simulation::{write_trial_csv, ContactPattern, TrialConfig, TrialSimulator};
use std::path::PathBuf;

const TARGETS: [&str; 6] = ["Fx", "Fy", "Fz", "Mx", "My", "Mz"];

/// Temporary project with a trial directory, removed on drop
struct Fixture {
    project: PathBuf,
    trials: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let project = std::env::temp_dir().join(format!("forceplate-it-{}", uuid::Uuid::new_v4()));
        let trials = project.join("raw").join("trials");
        std::fs::create_dir_all(&trials).unwrap();
        Fixture { project, trials }
    }

    fn add_trial(&self, name: &str, config: TrialConfig) {
        let signal = TrialSimulator::new(config).unwrap().generate().unwrap();
        write_trial_csv(&self.trials.join(format!("{}.csv", name)), &signal).unwrap();
    }

    fn analogs(&self) -> AnalogsConfig {
        AnalogsConfig {
            data: vec![self.trials.clone()],
            assigned: vec![
                AssignmentAttempt::from_names(&["Fx", "Fy", "Fz", "Mx", "My", "Mz", "Extra"]),
                AssignmentAttempt::from_names(&TARGETS),
            ],
            targets: TARGETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn store(&self, participant: &str) -> MemoryConfigStore {
        let mut store = MemoryConfigStore::new();
        store.insert_analogs(participant, &self.analogs()).unwrap();
        store
    }

    fn pipeline(&self) -> ForcePipeline {
        let mut builder = ForcePipeline::builder(&self.project);
        builder.calibration_matrix(CalibrationMatrix::identity(TARGETS.len()).unwrap());
        builder.build().unwrap()
    }

    fn export_path(&self, participant: &str, trial: &str) -> PathBuf {
        self.project.join(participant).join("0_forces").join(format!("{}.sto", trial))
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.project);
    }
}

fn lift(onset: f64, offset: f64) -> TrialConfig {
    TrialConfig {
        pattern: ContactPattern::SingleContact {
            onset,
            offset,
            peak: 400.0,
        },
        ..TrialConfig::default()
    }
}

fn rest() -> TrialConfig {
    TrialConfig {
        pattern: ContactPattern::Rest,
        ..TrialConfig::default()
    }
}

#[test]
fn test_end_to_end_export() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));
    fixture.add_trial(
        "trial_b",
        TrialConfig {
            nan_frames: vec![100, 5000],
            seed: Some(7),
            ..lift(3.0, 7.5)
        },
    );

    let mut store = fixture.store("p1");
    let mut pipeline = fixture.pipeline();
    let report = pipeline.run(&mut store, &["p1"]).unwrap();

    assert_eq!(report.exported(), 2);
    assert_eq!(report.failed(), 0);

    let (onset, offset) = store.onset("p1", "trial_a").unwrap().unwrap();
    assert_abs_diff_eq!(onset, 2.0, epsilon = 0.02);
    assert_abs_diff_eq!(offset, 8.0, epsilon = 0.02);

    let trial_b = report.trial("trial_b").unwrap();
    assert_eq!(trial_b.dropped_frames, 2);
    let (onset, offset) = store.onset("p1", "trial_b").unwrap().unwrap();
    assert_abs_diff_eq!(onset, 3.0, epsilon = 0.02);
    assert_abs_diff_eq!(offset, 7.5, epsilon = 0.02);

    let text = std::fs::read_to_string(fixture.export_path("p1", "trial_a")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "trial_a");
    assert_eq!(lines[2], "nRows=20000");
    assert_eq!(lines[3], "nColumns=7");
    assert_eq!(lines[6], "time\tFx\tFy\tFz\tMx\tMy\tMz");
    assert_eq!(lines.len(), 7 + 20_000);
}

#[test]
fn test_replace_override_without_detection() {
    let fixture = Fixture::new();
    fixture.add_trial("GatBH18H4_3", rest());

    let mut store = fixture.store("p1");
    let report = fixture.pipeline().run(&mut store, &["p1"]).unwrap();

    let trial = report.trial("GatBH18H4_3").unwrap();
    assert_eq!(trial.interval, Some(Interval::new(5271, 15965).unwrap()));
    let (onset, offset) = store.onset("p1", "GatBH18H4_3").unwrap().unwrap();
    assert_abs_diff_eq!(onset, 2.6355, epsilon = 1e-9);
    assert_abs_diff_eq!(offset, 7.9825, epsilon = 1e-9);
}

#[test]
fn test_skip_override_writes_nothing() {
    let fixture = Fixture::new();
    fixture.add_trial("CamBF12H5_3", lift(2.0, 8.0));

    let mut store = fixture.store("p1");
    let report = fixture.pipeline().run(&mut store, &["p1"]).unwrap();

    assert_eq!(
        report.trial("CamBF12H5_3").unwrap().status,
        TrialStatus::Skipped(SkipReason::ExceptionTable)
    );
    assert!(!fixture.export_path("p1", "CamBF12H5_3").exists());
    assert_eq!(store.onset("p1", "CamBF12H5_3").unwrap(), None);
    assert!(store.document("p1").unwrap().get("onset").is_none());
}

#[test]
fn test_two_contacts_abort_the_run() {
    let fixture = Fixture::new();
    fixture.add_trial(
        "trial_a",
        TrialConfig {
            pattern: ContactPattern::DoubleContact {
                first: (2.0, 4.0),
                second: (6.0, 8.0),
                peak: 400.0,
            },
            ..TrialConfig::default()
        },
    );
    fixture.add_trial("trial_b", lift(2.0, 8.0));

    let mut store = fixture.store("p1");
    match fixture.pipeline().run(&mut store, &["p1"]) {
        Err(ForceError::MultipleOnsetsDetected { trial, intervals }) => {
            assert_eq!(trial, "trial_a");
            assert_eq!(intervals.len(), 2);
        }
        other => panic!("expected multiple onsets, got {:?}", other),
    }
    // later trials are not processed once the run aborts
    assert_eq!(store.onset("p1", "trial_b").unwrap(), None);
}

#[test]
fn test_early_onset_aborts_unless_allow_listed() {
    let fixture = Fixture::new();
    fixture.add_trial("AmiAF12H2_1", lift(0.6, 6.0));

    let mut store = fixture.store("p1");
    let report = fixture.pipeline().run(&mut store, &["p1"]).unwrap();
    assert_eq!(report.exported(), 1);

    let mut strict = ForcePipeline::builder(&fixture.project);
    strict
        .calibration_matrix(CalibrationMatrix::identity(6).unwrap())
        .exceptions(ExceptionTable::new());
    let result = strict.build().unwrap().run(&mut store, &["p1"]);
    assert!(matches!(result, Err(ForceError::OnsetTooLate { .. })));
}

#[test]
fn test_write_failure_skips_only_that_trial() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));
    fixture.add_trial("trial_b", lift(2.0, 8.0));
    // a directory where the export file should go
    std::fs::create_dir_all(fixture.export_path("p1", "trial_a")).unwrap();

    let mut store = fixture.store("p1");
    let report = fixture.pipeline().run(&mut store, &["p1"]).unwrap();

    assert!(matches!(report.trial("trial_a").unwrap().status, TrialStatus::Failed(_)));
    assert_eq!(store.onset("p1", "trial_a").unwrap(), None);
    assert!(matches!(report.trial("trial_b").unwrap().status, TrialStatus::Exported(_)));
    assert!(store.onset("p1", "trial_b").unwrap().is_some());
}

#[test]
fn test_unmatched_assignment_is_dimension_mismatch() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));

    let mut analogs = fixture.analogs();
    analogs.assigned = vec![AssignmentAttempt::from_names(&["Fx", "Fy", "Fz", "Mx", "My", "Missing"])];
    let mut store = MemoryConfigStore::new();
    store.insert_analogs("p1", &analogs).unwrap();

    match fixture.pipeline().run(&mut store, &["p1"]) {
        Err(ForceError::DimensionMismatch { trial, expected, .. }) => {
            assert_eq!(trial, "trial_a");
            assert_eq!(expected, 6);
        }
        other => panic!("expected dimension mismatch, got {:?}", other),
    }
}

#[test]
fn test_calibration_matrix_dimension_is_checked() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));

    let mut builder = ForcePipeline::builder(&fixture.project);
    builder.calibration_matrix(CalibrationMatrix::identity(3).unwrap());
    let mut store = fixture.store("p1");
    let result = builder.build().unwrap().run(&mut store, &["p1"]);
    assert!(matches!(result, Err(ForceError::DimensionMismatch { expected: 3, .. })));
}

struct RejectAll;

impl TrialReviewer for RejectAll {
    fn review(&mut self, context: &ReviewContext<'_>) -> ReviewDecision {
        assert_eq!(context.norm.len(), context.signal.frame_count());
        ReviewDecision::Skip
    }
}

#[test]
fn test_reviewer_can_reject() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));

    let mut builder = ForcePipeline::builder(&fixture.project);
    builder
        .calibration_matrix(CalibrationMatrix::identity(6).unwrap())
        .reviewer(Box::new(RejectAll));

    let mut store = fixture.store("p1");
    let report = builder.build().unwrap().run(&mut store, &["p1"]).unwrap();
    assert_eq!(
        report.trial("trial_a").unwrap().status,
        TrialStatus::Skipped(SkipReason::Reviewer)
    );
    assert!(!fixture.export_path("p1", "trial_a").exists());
}

#[test]
fn test_json_store_round_trip() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));

    let conf = fixture.project.join("conf");
    std::fs::create_dir_all(&conf).unwrap();
    let document = serde_json::json!({
        "emg": {"data": ["raw/trials"]},
        "analogs": {
            "data": ["raw/trials"],
            "assigned": [TARGETS],
            "targets": TARGETS
        }
    });
    std::fs::write(conf.join("p1.json"), document.to_string()).unwrap();

    let mut store = JsonConfigStore::new(&conf).with_base_dir(&fixture.project);
    let participants = store.participants().unwrap();
    let report = fixture.pipeline().run(&mut store, &participants).unwrap();
    assert_eq!(report.exported(), 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(conf.join("p1.json")).unwrap()).unwrap();
    assert_eq!(written["emg"]["data"][0], "raw/trials");
    let onset = written["onset"]["trial_a"][0].as_f64().unwrap();
    assert_abs_diff_eq!(onset, 2.0, epsilon = 0.02);
}

#[test]
fn test_missing_participant_does_not_abort() {
    let fixture = Fixture::new();
    fixture.add_trial("trial_a", lift(2.0, 8.0));

    let mut store = fixture.store("p1");
    let report = fixture.pipeline().run(&mut store, &["ghost", "p1"]).unwrap();
    assert_eq!(report.participant_failures.len(), 1);
    assert_eq!(report.participant_failures[0].participant, "ghost");
    assert_eq!(report.exported(), 1);
}
