//! The `skillgate report` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use skillgate_core::checkpoint::CheckpointStore;
use skillgate_core::error::AssessmentError;
use skillgate_core::report::AssessmentReport;
use skillgate_providers::config::load_config_from;

use super::{emit, open_store};

pub async fn execute(
    assessment: Uuid,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = open_store(&config).await?;
    let state = store
        .load(assessment)
        .await?
        .ok_or(AssessmentError::StateNotFound(assessment))?;
    let report = AssessmentReport::from_state(&state);

    match format.as_str() {
        "json" => match &output {
            Some(path) => {
                report.save_json(path)?;
                eprintln!("Report saved to: {}", path.display());
                Ok(())
            }
            None => emit(&serde_json::to_string_pretty(&report)?, None),
        },
        "markdown" => emit(&report.to_markdown(), output.as_ref()),
        other => anyhow::bail!("unknown format '{other}', expected 'json' or 'markdown'"),
    }
}
