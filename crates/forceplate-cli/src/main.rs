//! Force-plate batch runner
//!
//! Processes every trial of the selected participants of a project and
//! reports exported, skipped and failed trials.

mod project;

use anyhow::Result;
use clap::Parser;
use forceplate_processing::{PipelineConfig, TrialStatus};
use project::Project;
use std::path::PathBuf;
use std::process::ExitCode;

/// Export force-plate trials with their detected onset and offset
#[derive(Parser)]
#[command(name = "forceplate-cli")]
#[command(version)]
#[command(about = "Calibrate, segment and export force-plate trials", long_about = None)]
struct Cli {
    /// Project directory
    project: PathBuf,

    /// Participants to process (default: every participant in <project>/conf)
    participants: Vec<String>,

    /// Extension of the trial files
    #[arg(long)]
    extension: Option<String>,

    /// Print the default pipeline configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        return Ok(ExitCode::SUCCESS);
    }

    let project = Project::new(&cli.project);
    let report = project.run(&cli.participants, cli.extension.as_deref())?;

    for trial in &report.trials {
        let status = match &trial.status {
            TrialStatus::Exported(record) => format!(
                "exported [{:.3}, {:.3}] s -> {}",
                record.onset_seconds,
                record.offset_seconds,
                record.path.display()
            ),
            TrialStatus::Skipped(reason) => format!("skipped ({:?})", reason),
            TrialStatus::Failed(error) => format!("FAILED: {}", error),
        };
        println!("{}/{}: {}", trial.participant, trial.trial, status);
    }
    for failure in &report.participant_failures {
        println!("{}: FAILED: {}", failure.participant, failure.error);
    }
    println!(
        "{} exported, {} skipped, {} failed",
        report.exported(),
        report.skipped(),
        report.failed()
    );

    if report.failed() > 0 || !report.participant_failures.is_empty() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
