//! The `skillgate parse` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use skillgate_core::intake::{parse_job_description, parse_resume, GeneratorFieldExtractor};
use skillgate_providers::config::load_config_from;

use super::emit;

pub async fn execute(
    kind: String,
    input: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(kind.as_str(), "job" | "resume"),
        "unknown kind '{kind}', expected 'job' or 'resume'"
    );

    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let config = load_config_from(config_path.as_deref())?;
    let extractor = GeneratorFieldExtractor::new(
        config.build_provider()?,
        config.default_model.clone(),
    );

    let json = if kind == "job" {
        let job = parse_job_description(&extractor, &text).await?;
        eprintln!(
            "Parsed job description: {} required skill(s)",
            job.required_skills.len()
        );
        serde_json::to_string_pretty(&job)?
    } else {
        let resume = parse_resume(&extractor, &text).await?;
        eprintln!(
            "Parsed resume: {} skill(s), {} project(s)",
            resume.skills.len(),
            resume.projects.len()
        );
        serde_json::to_string_pretty(&resume)?
    };

    emit(&json, output.as_ref())
}
