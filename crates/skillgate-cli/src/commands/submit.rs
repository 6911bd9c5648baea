//! The `skillgate submit` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use skillgate_core::engine::SubmitOutcome;
use skillgate_core::model::{Answer, AssessmentStatus, Level};

use super::{emit, open_engine, print_score, print_sheet_summary, read_json};

pub async fn execute(
    assessment: Uuid,
    level: String,
    answers_path: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let level: Level = level.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let answers: BTreeMap<String, Answer> = read_json(&answers_path)?;

    let engine = open_engine(config_path.as_deref()).await?;
    let outcome = engine
        .submit_level_answers(assessment, level, answers)
        .await?;

    match &outcome {
        SubmitOutcome::NextLevel { score, sheet } => {
            print_score(level, score);
            print_sheet_summary(sheet);
        }
        SubmitOutcome::Finished { report } => {
            if let Some(score) = report
                .levels
                .iter()
                .find(|l| l.level == level)
                .and_then(|l| l.score.as_ref())
            {
                print_score(level, score);
            }
            match &report.outcome {
                AssessmentStatus::Passed => eprintln!("\nAssessment passed."),
                AssessmentStatus::Failed { level, reason } => {
                    eprintln!("\nAssessment failed at {level}: {reason}")
                }
                AssessmentStatus::InProgress => {}
            }
        }
    }

    emit(&serde_json::to_string_pretty(&outcome)?, output.as_ref())
}
