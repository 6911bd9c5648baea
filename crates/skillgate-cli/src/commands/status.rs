//! The `skillgate status` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use uuid::Uuid;

use skillgate_core::checkpoint::CheckpointStore;
use skillgate_core::error::AssessmentError;
use skillgate_core::model::{AssessmentState, AssessmentStatus};
use skillgate_providers::config::load_config_from;

use super::open_store;

pub async fn execute(
    assessment: Option<Uuid>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}', expected 'text' or 'json'"
    );

    let config = load_config_from(config_path.as_deref())?;
    let store = open_store(&config).await?;

    let Some(id) = assessment else {
        let mut states = Vec::new();
        for id in store.list().await? {
            if let Some(state) = store.load(id).await? {
                states.push(state);
            }
        }
        if states.is_empty() {
            println!("No assessments found in {}", store.root().display());
            return Ok(());
        }
        if format == "json" {
            println!("{}", serde_json::to_string_pretty(&states)?);
        } else {
            print_overview(&states);
        }
        return Ok(());
    };

    let state = store
        .load(id)
        .await?
        .ok_or(AssessmentError::StateNotFound(id))?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_detail(&state);
    }
    Ok(())
}

fn outcome(status: &AssessmentStatus) -> String {
    match status {
        AssessmentStatus::InProgress => "in progress".into(),
        AssessmentStatus::Passed => "passed".into(),
        AssessmentStatus::Failed { level, .. } => format!("failed at level {}", level.number()),
    }
}

fn print_overview(states: &[AssessmentState]) {
    let mut table = Table::new();
    table.set_header(vec!["Assessment", "Candidate", "Level", "Status", "Updated"]);
    for state in states {
        table.add_row(vec![
            Cell::new(state.id),
            Cell::new(&state.candidate_id),
            Cell::new(state.current_level.number()),
            Cell::new(outcome(&state.status)),
            Cell::new(state.updated_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{table}");
}

fn print_detail(state: &AssessmentState) {
    println!("Assessment: {}", state.id);
    println!("Candidate:  {}", state.candidate_id);
    println!("Skills:     {}", state.job.required_skills.join(", "));
    println!("Status:     {}", outcome(&state.status));
    if let AssessmentStatus::Failed { reason, .. } = &state.status {
        println!("Reason:     {reason}");
    }

    let mut table = Table::new();
    table.set_header(vec!["Level", "Status", "Questions", "Answered", "Passed"]);
    for progress in state.progress.values() {
        let passed = match &progress.score {
            Some(score) if score.passed => "yes",
            Some(_) => "no",
            None => "-",
        };
        table.add_row(vec![
            Cell::new(progress.level),
            Cell::new(progress.status),
            Cell::new(progress.questions.len()),
            Cell::new(progress.answers.len()),
            Cell::new(passed),
        ]);
    }
    println!("{table}");
}
