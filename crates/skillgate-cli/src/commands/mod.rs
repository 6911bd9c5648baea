pub mod init;
pub mod parse;
pub mod recover;
pub mod report;
pub mod start;
pub mod status;
pub mod submit;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::de::DeserializeOwned;

use skillgate_core::dispatch::ProgressReporter;
use skillgate_core::engine::AssessmentEngine;
use skillgate_core::error::AssessmentError;
use skillgate_core::generation::SkillBatch;
use skillgate_core::model::{Level, LevelScore, QuestionSheet};
use skillgate_providers::config::{load_config_from, SkillgateConfig};
use skillgate_store::FileCheckpointStore;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_level_start(&self, level: Level, skills: &[String]) {
        eprintln!("Generating {level} for {} skill(s)", skills.len());
    }

    fn on_skill_complete(&self, _level: Level, batch: &SkillBatch) {
        eprintln!(
            "  Done: {} ({} questions, attempt {})",
            batch.skill,
            batch.questions.len(),
            batch.attempts
        );
    }

    fn on_skill_error(&self, _level: Level, skill: &str, error: &AssessmentError) {
        eprintln!("  ERROR: {skill}: {error}");
    }

    fn on_level_ready(&self, level: Level, questions: usize, elapsed: Duration) {
        eprintln!(
            "{level} ready: {questions} questions ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub(crate) async fn open_store(config: &SkillgateConfig) -> Result<FileCheckpointStore> {
    FileCheckpointStore::open(&config.checkpoint_dir)
        .await
        .with_context(|| {
            format!(
                "failed to open checkpoint directory {}",
                config.checkpoint_dir.display()
            )
        })
}

/// Load config and build an engine over the configured provider and store.
pub(crate) async fn open_engine(config_path: Option<&Path>) -> Result<AssessmentEngine> {
    let config = load_config_from(config_path)?;
    let provider = config.build_provider()?;
    let store = open_store(&config).await?;
    tracing::debug!(
        provider = %config.default_provider,
        model = %config.default_model,
        checkpoints = %config.checkpoint_dir.display(),
        "engine configured"
    );
    Ok(
        AssessmentEngine::new(provider, Arc::new(store), config.engine_config())
            .with_progress(Arc::new(ConsoleReporter)),
    )
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Write `content` to `output`, or stdout when no path is given.
pub(crate) fn emit(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Saved to: {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

pub(crate) fn print_sheet_summary(sheet: &QuestionSheet) {
    let mut per_skill: Vec<(&str, usize)> = Vec::new();
    for question in &sheet.questions {
        match per_skill.iter_mut().find(|(skill, _)| *skill == question.skill) {
            Some((_, count)) => *count += 1,
            None => per_skill.push((question.skill.as_str(), 1)),
        }
    }

    let mut table = Table::new();
    table.set_header(vec!["Skill", "Questions"]);
    for (skill, count) in per_skill {
        table.add_row(vec![Cell::new(skill), Cell::new(count)]);
    }
    eprintln!("\nAssessment {} at {}", sheet.assessment_id, sheet.level);
    eprintln!("{table}");
}

pub(crate) fn print_score(level: Level, score: &LevelScore) {
    let mut table = Table::new();
    table.set_header(vec!["Skill", "Correct", "Total", "Accuracy", "Result"]);
    let failing = score.failing_skills();
    for (skill, s) in &score.per_skill {
        let result = if failing.contains(&skill.as_str()) {
            "FAIL"
        } else {
            "PASS"
        };
        table.add_row(vec![
            Cell::new(skill),
            Cell::new(s.correct),
            Cell::new(s.total),
            Cell::new(format!("{:.1}%", s.accuracy * 100.0)),
            Cell::new(result),
        ]);
    }
    eprintln!("\n{level} (threshold {:.0}%)", score.threshold * 100.0);
    eprintln!("{table}");
}
