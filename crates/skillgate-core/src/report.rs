//! Final assessment report.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AssessmentState, AssessmentStatus, Level, LevelScore, LevelStatus};

/// Outcome of a finished (or in-flight) assessment, derived from its state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub assessment_id: Uuid,
    pub candidate_id: String,
    pub job_title: String,
    pub outcome: AssessmentStatus,
    /// Highest level the candidate passed, if any.
    pub highest_level_passed: Option<Level>,
    pub levels: Vec<LevelReport>,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

/// One level's line in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: Level,
    pub status: LevelStatus,
    pub questions: usize,
    pub answered: usize,
    pub score: Option<LevelScore>,
}

impl AssessmentReport {
    pub fn from_state(state: &AssessmentState) -> Self {
        let levels: Vec<LevelReport> = state
            .progress
            .values()
            .map(|p| LevelReport {
                level: p.level,
                status: p.status,
                questions: p.questions.len(),
                answered: p.answers.len(),
                score: p.score.clone(),
            })
            .collect();

        let highest_level_passed = levels
            .iter()
            .filter(|l| l.status == LevelStatus::Passed)
            .map(|l| l.level)
            .max();

        Self {
            assessment_id: state.id,
            candidate_id: state.candidate_id.clone(),
            job_title: state.job.title.clone(),
            outcome: state.status.clone(),
            highest_level_passed,
            levels,
            started_at: state.created_at,
            generated_at: Utc::now(),
        }
    }

    /// Save the report as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AssessmentReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Render as a markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("## Assessment {}\n\n", self.assessment_id));
        md.push_str(&format!("Candidate: `{}`\n", self.candidate_id));
        if !self.job_title.is_empty() {
            md.push_str(&format!("Role: {}\n", self.job_title));
        }
        let outcome = match &self.outcome {
            AssessmentStatus::InProgress => "in progress".to_string(),
            AssessmentStatus::Passed => "**passed**".to_string(),
            AssessmentStatus::Failed { level, reason } => {
                format!("**failed** at {level}: {reason}")
            }
        };
        md.push_str(&format!("Outcome: {outcome}\n\n"));

        md.push_str("| Level | Skill | Correct | Total | Accuracy |\n");
        md.push_str("|-------|-------|---------|-------|----------|\n");
        for level in &self.levels {
            let Some(score) = &level.score else {
                md.push_str(&format!("| {} | - | - | - | {} |\n", level.level.number(), level.status));
                continue;
            };
            for (skill, s) in &score.per_skill {
                md.push_str(&format!(
                    "| {} | {} | {} | {} | {:.0}% |\n",
                    level.level.number(),
                    skill,
                    s.correct,
                    s.total,
                    s.accuracy * 100.0
                ));
            }
        }
        md
    }
}
