//! Core data model types for skillgate.
//!
//! Questions, per-level progress, the read-only generation inputs, and the
//! checkpointable `AssessmentState` that the engine persists between levels.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssessmentError;

/// One of the escalating assessment stages.
///
/// Serialized as its number (1..=3). Adding a level means adding a variant,
/// extending `next`, and giving it a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    Beginner = 1,
    Intermediate = 2,
    Scenario = 3,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Scenario];

    pub fn number(self) -> u8 {
        self as u8
    }

    /// The level unlocked by passing this one.
    pub fn next(self) -> Option<Level> {
        match self {
            Level::Beginner => Some(Level::Intermediate),
            Level::Intermediate => Some(Level::Scenario),
            Level::Scenario => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Scenario => "scenario",
        }
    }

    /// Questions requested per skill when no override is configured.
    pub fn default_batch_size(self) -> u32 {
        match self {
            Level::Beginner | Level::Intermediate => 5,
            Level::Scenario => 10,
        }
    }

    /// Whether questions of `kind` are valid at this level.
    pub fn accepts(self, kind: QuestionKind) -> bool {
        match self {
            Level::Beginner => kind == QuestionKind::SingleChoice,
            Level::Intermediate => kind == QuestionKind::MultiSelect,
            Level::Scenario => true,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {} ({})", self.number(), self.label())
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::Beginner),
            2 => Ok(Level::Intermediate),
            3 => Ok(Level::Scenario),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.number()
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "beginner" => Ok(Level::Beginner),
            "2" | "intermediate" => Ok(Level::Intermediate),
            "3" | "scenario" => Ok(Level::Scenario),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// Whether a question has one correct option or a set of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiSelect,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => write!(f, "single-choice"),
            QuestionKind::MultiSelect => write!(f, "multi-select"),
        }
    }
}

/// The correct-answer marker of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectAnswer {
    Single(String),
    Multiple(BTreeSet<String>),
}

impl CorrectAnswer {
    pub fn kind(&self) -> QuestionKind {
        match self {
            CorrectAnswer::Single(_) => QuestionKind::SingleChoice,
            CorrectAnswer::Multiple(_) => QuestionKind::MultiSelect,
        }
    }

    /// Exact match for single answers, set equality for multi answers.
    pub fn is_satisfied_by(&self, answer: &Answer) -> bool {
        match (self, answer) {
            (CorrectAnswer::Single(correct), Answer::Single(given)) => correct == given,
            (CorrectAnswer::Single(correct), Answer::Multiple(_)) => {
                answer.selected() == BTreeSet::from([correct.as_str()])
            }
            (CorrectAnswer::Multiple(correct), _) => {
                answer.selected() == correct.iter().map(String::as_str).collect::<BTreeSet<_>>()
            }
        }
    }
}

/// A candidate's submitted answer: one option, or a list of options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(Vec<String>),
}

impl Answer {
    /// The distinct options selected by this answer.
    pub fn selected(&self) -> BTreeSet<&str> {
        match self {
            Answer::Single(option) => BTreeSet::from([option.as_str()]),
            Answer::Multiple(options) => options.iter().map(String::as_str).collect(),
        }
    }
}

/// Descriptive data attached to a question at synthesis time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionMetadata {
    /// The skill whose generation task produced this question.
    pub skill: String,
    /// Suggested time budget in seconds.
    pub time_budget_secs: u32,
    /// Scenario text (scenario level only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

/// A generated, validated question. Never mutated after synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique within the assessment.
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: CorrectAnswer,
    pub level: Level,
    pub metadata: QuestionMetadata,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.correct.kind()
    }

    pub fn skill(&self) -> &str {
        &self.metadata.skill
    }

    /// Candidate-facing view without the correct-answer marker.
    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id.clone(),
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            kind: self.kind(),
            skill: self.metadata.skill.clone(),
            time_budget_secs: self.metadata.time_budget_secs,
            scenario: self.metadata.scenario.clone(),
        }
    }
}

/// What a candidate sees for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub kind: QuestionKind,
    pub skill: String,
    pub time_budget_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

/// The questions a candidate must answer for one level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSheet {
    pub assessment_id: Uuid,
    pub level: Level,
    pub questions: Vec<PublicQuestion>,
}

/// Level controller states.
///
/// `generating -> awaiting_response -> evaluating -> {passed, failed}`, plus
/// `generating -> failed` when a skill's generation fails closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    Generating,
    AwaitingResponse,
    Evaluating,
    Passed,
    Failed,
}

impl LevelStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LevelStatus::Passed | LevelStatus::Failed)
    }

    pub fn can_transition_to(self, next: LevelStatus) -> bool {
        matches!(
            (self, next),
            (LevelStatus::Generating, LevelStatus::AwaitingResponse)
                | (LevelStatus::Generating, LevelStatus::Failed)
                | (LevelStatus::AwaitingResponse, LevelStatus::Evaluating)
                | (LevelStatus::Evaluating, LevelStatus::Passed)
                | (LevelStatus::Evaluating, LevelStatus::Failed)
        )
    }
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelStatus::Generating => write!(f, "generating"),
            LevelStatus::AwaitingResponse => write!(f, "awaiting_response"),
            LevelStatus::Evaluating => write!(f, "evaluating"),
            LevelStatus::Passed => write!(f, "passed"),
            LevelStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Accuracy of one skill within a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillScore {
    pub correct: u32,
    pub total: u32,
    pub accuracy: f64,
}

/// Per-skill breakdown of a level. Every skill gates independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelScore {
    pub per_skill: BTreeMap<String, SkillScore>,
    pub threshold: f64,
    pub passed: bool,
}

impl LevelScore {
    /// Skills whose accuracy fell below the threshold.
    pub fn failing_skills(&self) -> Vec<&str> {
        self.per_skill
            .iter()
            .filter(|(_, s)| s.accuracy + crate::scoring::EPSILON < self.threshold)
            .map(|(skill, _)| skill.as_str())
            .collect()
    }
}

/// Progress of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: Level,
    /// Append-only; merged from all skill tasks after the fan-out barrier.
    pub questions: Vec<Question>,
    /// Question id -> submitted answer.
    #[serde(default)]
    pub answers: BTreeMap<String, Answer>,
    #[serde(default)]
    pub score: Option<LevelScore>,
    #[serde(default)]
    pub completed: bool,
    pub status: LevelStatus,
}

impl LevelProgress {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            questions: Vec::new(),
            answers: BTreeMap::new(),
            score: None,
            completed: false,
            status: LevelStatus::Generating,
        }
    }

    /// Distinct skills represented by this level's questions.
    pub fn skills(&self) -> BTreeSet<&str> {
        self.questions.iter().map(Question::skill).collect()
    }

    pub fn public_questions(&self) -> Vec<PublicQuestion> {
        self.questions.iter().map(Question::to_public).collect()
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// Structured job description. Read-only for the assessment's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Structured resume. Read-only for the assessment's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeProfile {
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub experience: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// The candidate side of `start_assessment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateContext {
    pub candidate_id: String,
    pub resume: ResumeProfile,
}

/// Overall outcome of an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssessmentStatus {
    InProgress,
    Passed,
    Failed { level: Level, reason: String },
}

impl AssessmentStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, AssessmentStatus::InProgress)
    }
}

/// The orchestrator's full checkpointable state; the unit of persistence and
/// of resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentState {
    pub id: Uuid,
    pub candidate_id: String,
    pub job: JobDescription,
    pub resume: ResumeProfile,
    pub current_level: Level,
    pub unlocked_levels: Vec<Level>,
    pub progress: BTreeMap<Level, LevelProgress>,
    pub status: AssessmentStatus,
    /// Bumped on every checkpoint write.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssessmentState {
    /// Fresh state positioned at the first level, about to generate.
    pub fn new(candidate: CandidateContext, job: JobDescription) -> Self {
        let now = Utc::now();
        let first = Level::Beginner;
        Self {
            id: Uuid::new_v4(),
            candidate_id: candidate.candidate_id,
            job,
            resume: candidate.resume,
            current_level: first,
            unlocked_levels: vec![first],
            progress: BTreeMap::from([(first, LevelProgress::new(first))]),
            status: AssessmentStatus::InProgress,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_progress(&self) -> Option<&LevelProgress> {
        self.progress.get(&self.current_level)
    }

    pub fn current_progress_mut(&mut self) -> Option<&mut LevelProgress> {
        self.progress.get_mut(&self.current_level)
    }

    /// Move to `next`, unlocking it and creating its empty progress record.
    /// `current_level` only ever increases.
    pub fn unlock(&mut self, next: Level) -> Result<(), AssessmentError> {
        if next <= self.current_level {
            return Err(AssessmentError::InvalidInput(format!(
                "cannot move from {} back to {next}",
                self.current_level
            )));
        }
        self.current_level = next;
        if !self.unlocked_levels.contains(&next) {
            self.unlocked_levels.push(next);
        }
        self.progress.insert(next, LevelProgress::new(next));
        Ok(())
    }

    pub fn sheet(&self, level: Level) -> Option<QuestionSheet> {
        self.progress.get(&level).map(|p| QuestionSheet {
            assessment_id: self.id,
            level,
            questions: p.public_questions(),
        })
    }
}
