//! The `skillgate start` command.

use std::path::PathBuf;

use anyhow::Result;

use skillgate_core::model::{CandidateContext, JobDescription, ResumeProfile};

use super::{emit, open_engine, print_sheet_summary, read_json};

pub async fn execute(
    candidate_id: String,
    job_path: PathBuf,
    resume_path: Option<PathBuf>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let job: JobDescription = read_json(&job_path)?;
    let resume: ResumeProfile = match &resume_path {
        Some(path) => read_json(path)?,
        None => ResumeProfile::default(),
    };

    let engine = open_engine(config_path.as_deref()).await?;
    let sheet = engine
        .start_assessment(
            CandidateContext {
                candidate_id,
                resume,
            },
            job,
        )
        .await?;

    print_sheet_summary(&sheet);
    emit(&serde_json::to_string_pretty(&sheet)?, output.as_ref())
}
