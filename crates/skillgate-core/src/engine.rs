//! Top-level assessment orchestrator.
//!
//! Sequences the level controllers 1 -> 2 -> 3 and gates each on the
//! previous one passing. The engine holds no per-assessment state in memory:
//! every operation loads the checkpoint, advances it to the next suspension
//! point (a level awaiting answers) or a terminal outcome, and saves it back.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::dispatch::{NoopReporter, ProgressReporter, SkillDispatcher};
use crate::error::{AssessmentError, CheckpointError};
use crate::generation::{GenerationSettings, QuestionGenerator};
use crate::level::LevelController;
use crate::model::{
    Answer, AssessmentState, AssessmentStatus, CandidateContext, JobDescription, Level,
    LevelProgress, LevelScore, LevelStatus, QuestionSheet,
};
use crate::prompts::GenerationContext;
use crate::report::AssessmentReport;
use crate::scoring::DEFAULT_PASS_THRESHOLD;
use crate::traits::LlmProvider;

/// Configuration for the assessment engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model used for question generation.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Max tokens for generation.
    pub max_tokens: u32,
    /// Generation attempts after the first, per skill task.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Maximum concurrent skill tasks within a level.
    pub parallelism: usize,
    /// Per-skill accuracy required to pass a level.
    pub pass_threshold: f64,
    /// Questions per skill; `None` uses each level's default.
    pub questions_per_skill: Option<u32>,
    /// Optional system prompt override.
    pub system_prompt_override: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            parallelism: 4,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            questions_per_skill: None,
            system_prompt_override: None,
        }
    }
}

impl EngineConfig {
    fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_attempts: self.max_retries.saturating_add(1),
            retry_delay: self.retry_delay,
            max_retry_delay: Duration::from_secs(60),
            system_prompt: self.system_prompt_override.clone(),
            batch_size: self.questions_per_skill,
        }
    }
}

/// What a successful answer submission leads to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The level passed; the next level's questions are ready.
    NextLevel {
        score: LevelScore,
        sheet: QuestionSheet,
    },
    /// The assessment reached a terminal outcome.
    Finished { report: AssessmentReport },
}

/// The assessment workflow engine.
pub struct AssessmentEngine {
    generator: QuestionGenerator,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl AssessmentEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            generator: QuestionGenerator::new(provider, config.generation_settings()),
            store,
            config,
            progress: Arc::new(NoopReporter),
        }
    }

    /// Report level generation progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an assessment and run it to its first suspension point.
    ///
    /// Returns the level 1 questions. If generation fails the assessment is
    /// checkpointed as failed and the generation error returned.
    #[tracing::instrument(skip_all, fields(candidate = %candidate.candidate_id))]
    pub async fn start_assessment(
        &self,
        candidate: CandidateContext,
        mut job: JobDescription,
    ) -> Result<QuestionSheet, AssessmentError> {
        if candidate.candidate_id.trim().is_empty() {
            return Err(AssessmentError::InvalidInput(
                "candidate id must not be empty".into(),
            ));
        }
        job.required_skills = normalize_skills(&job.required_skills);
        if job.required_skills.is_empty() {
            return Err(AssessmentError::InvalidInput(
                "job description lists no required skills".into(),
            ));
        }

        let mut state = AssessmentState::new(candidate, job);
        let _lease = self.store.acquire(state.id).await?;
        self.checkpoint(&mut state).await?;
        tracing::info!(
            assessment = %state.id,
            skills = ?state.job.required_skills,
            "assessment started"
        );

        self.generate_current_level(&mut state).await
    }

    /// Resume the assessment suspended at `level` with the candidate's answers.
    #[tracing::instrument(skip(self, answers), fields(answers = answers.len()))]
    pub async fn submit_level_answers(
        &self,
        id: Uuid,
        level: Level,
        answers: BTreeMap<String, Answer>,
    ) -> Result<SubmitOutcome, AssessmentError> {
        let _lease = self.store.acquire(id).await?;
        let mut state = self.load_state(id).await?;

        if state.status.is_finished() {
            return Err(AssessmentError::AlreadyCompleted(id));
        }
        if state.current_level != level {
            return Err(AssessmentError::LevelMismatch {
                current: state.current_level,
                submitted: level,
            });
        }

        // Answers, score and unlock land in a single checkpoint.
        let controller = self.level_controller();
        let progress = current_progress_mut(&mut state)?;
        controller.accept_answers(progress, answers)?;
        let score = controller.evaluate(progress)?;

        if !score.passed {
            let reason = format!(
                "skills below threshold: {}",
                score.failing_skills().join(", ")
            );
            tracing::info!(assessment = %id, %level, %reason, "assessment failed");
            state.status = AssessmentStatus::Failed { level, reason };
            self.checkpoint(&mut state).await?;
            return Ok(SubmitOutcome::Finished {
                report: AssessmentReport::from_state(&state),
            });
        }

        let Some(next) = level.next() else {
            tracing::info!(assessment = %id, "assessment passed");
            state.status = AssessmentStatus::Passed;
            self.checkpoint(&mut state).await?;
            return Ok(SubmitOutcome::Finished {
                report: AssessmentReport::from_state(&state),
            });
        };

        state.unlock(next)?;
        self.checkpoint(&mut state).await?;
        tracing::info!(assessment = %id, passed = %level, unlocked = %next, "level passed");

        let sheet = self.generate_current_level(&mut state).await?;
        Ok(SubmitOutcome::NextLevel { score, sheet })
    }

    /// Read-only snapshot of an assessment.
    pub async fn get_assessment_state(&self, id: Uuid) -> Result<AssessmentState, AssessmentError> {
        self.load_state(id).await
    }

    /// Recover an assessment whose current level never finished generating
    /// (e.g. the process died mid fan-out).
    ///
    /// A level still `generating` is generated again; a level already
    /// awaiting answers returns its existing questions unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn resume_generation(&self, id: Uuid) -> Result<QuestionSheet, AssessmentError> {
        let _lease = self.store.acquire(id).await?;
        let mut state = self.load_state(id).await?;

        if state.status.is_finished() {
            return Err(AssessmentError::AlreadyCompleted(id));
        }

        let level = state.current_level;
        match current_progress_mut(&mut state)?.status {
            LevelStatus::Generating => {
                tracing::info!(assessment = %id, %level, "regenerating interrupted level");
                self.generate_current_level(&mut state).await
            }
            LevelStatus::AwaitingResponse => sheet_for(&state, level),
            status => Err(AssessmentError::LevelNotReady { level, status }),
        }
    }

    /// Final (or interim) report for an assessment.
    pub async fn report(&self, id: Uuid) -> Result<AssessmentReport, AssessmentError> {
        let state = self.load_state(id).await?;
        Ok(AssessmentReport::from_state(&state))
    }

    fn level_controller(&self) -> LevelController<'_> {
        LevelController::new(
            SkillDispatcher::new(
                &self.generator,
                self.config.parallelism,
                self.progress.as_ref(),
            ),
            self.config.pass_threshold,
        )
    }

    /// Run the current level's fan-out and checkpoint the result.
    async fn generate_current_level(
        &self,
        state: &mut AssessmentState,
    ) -> Result<QuestionSheet, AssessmentError> {
        let id = state.id;
        let level = state.current_level;
        let controller = self.level_controller();

        let result = {
            let AssessmentState {
                job,
                resume,
                progress,
                ..
            } = &mut *state;
            let level_progress = progress.get_mut(&level).ok_or_else(|| missing(id, level))?;
            let ctx = GenerationContext {
                job: &*job,
                resume: &*resume,
            };
            controller
                .generate(level_progress, &job.required_skills, ctx)
                .await
        };

        if let Err(e) = result {
            state.status = AssessmentStatus::Failed {
                level,
                reason: e.to_string(),
            };
            self.checkpoint(state).await?;
            return Err(e);
        }

        self.checkpoint(state).await?;
        tracing::info!(assessment = %id, %level, "level awaiting answers");
        sheet_for(state, level)
    }

    async fn load_state(&self, id: Uuid) -> Result<AssessmentState, AssessmentError> {
        self.store
            .load(id)
            .await?
            .ok_or(AssessmentError::StateNotFound(id))
    }

    async fn checkpoint(&self, state: &mut AssessmentState) -> Result<(), AssessmentError> {
        state.revision += 1;
        state.updated_at = Utc::now();
        self.store.save(state.id, state).await?;
        Ok(())
    }
}

fn current_progress_mut(
    state: &mut AssessmentState,
) -> Result<&mut LevelProgress, AssessmentError> {
    let (id, level) = (state.id, state.current_level);
    state
        .current_progress_mut()
        .ok_or_else(|| missing(id, level))
}

fn sheet_for(state: &AssessmentState, level: Level) -> Result<QuestionSheet, AssessmentError> {
    state.sheet(level).ok_or_else(|| missing(state.id, level))
}

fn missing(id: Uuid, level: Level) -> AssessmentError {
    CheckpointError::Corrupt {
        id,
        reason: format!("no progress recorded for {level}"),
    }
    .into()
}

/// Trim skill names and drop blanks and case-insensitive duplicates,
/// keeping the first spelling seen.
fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::model::ResumeProfile;
    use crate::testing::{correct_answer, wrong_answer, ScriptedProvider};

    fn engine(provider: ScriptedProvider) -> (AssessmentEngine, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        let config = EngineConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
            questions_per_skill: Some(4),
            ..Default::default()
        };
        let engine = AssessmentEngine::new(Arc::new(provider), store.clone(), config);
        (engine, store)
    }

    fn candidate() -> CandidateContext {
        CandidateContext {
            candidate_id: "cand-1".into(),
            resume: ResumeProfile {
                projects: vec!["Inventory dashboard".into()],
                ..Default::default()
            },
        }
    }

    fn job(skills: &[&str]) -> JobDescription {
        JobDescription {
            title: "Backend Engineer".into(),
            required_skills: skills.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn all_correct(engine: &AssessmentEngine, id: Uuid) -> BTreeMap<String, Answer> {
        let state = engine.get_assessment_state(id).await.unwrap();
        state
            .current_progress()
            .unwrap()
            .questions
            .iter()
            .map(|q| (q.id.clone(), correct_answer(q)))
            .collect()
    }

    #[test]
    fn skills_are_normalized() {
        let skills = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "Kafka".to_string(),
        ];
        assert_eq!(normalize_skills(&skills), vec!["Rust", "Kafka"]);
    }

    #[tokio::test]
    async fn start_returns_level_one_sheet() {
        let (engine, store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust", "Kafka"]))
            .await
            .unwrap();

        assert_eq!(sheet.level, Level::Beginner);
        assert_eq!(sheet.questions.len(), 8);
        let state = store.load(sheet.assessment_id).await.unwrap().unwrap();
        assert_eq!(
            state.current_progress().unwrap().status,
            LevelStatus::AwaitingResponse
        );
        assert!(state.revision >= 2);
    }

    #[tokio::test]
    async fn start_rejects_empty_skills() {
        let (engine, store) = engine(ScriptedProvider::new());
        let err = engine
            .start_assessment(candidate(), job(&["  "]))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::InvalidInput(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn passing_all_levels_completes_assessment() {
        let (engine, _store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust"]))
            .await
            .unwrap();
        let id = sheet.assessment_id;

        for level in [Level::Beginner, Level::Intermediate] {
            let answers = all_correct(&engine, id).await;
            let outcome = engine
                .submit_level_answers(id, level, answers)
                .await
                .unwrap();
            match outcome {
                SubmitOutcome::NextLevel { score, sheet } => {
                    assert!(score.passed);
                    assert_eq!(Some(sheet.level), level.next());
                }
                other => panic!("expected next level, got {other:?}"),
            }
        }

        let answers = all_correct(&engine, id).await;
        let outcome = engine
            .submit_level_answers(id, Level::Scenario, answers)
            .await
            .unwrap();
        let SubmitOutcome::Finished { report } = outcome else {
            panic!("expected finished outcome");
        };
        assert_eq!(report.outcome, AssessmentStatus::Passed);
        assert_eq!(report.highest_level_passed, Some(Level::Scenario));

        let state = engine.get_assessment_state(id).await.unwrap();
        assert_eq!(state.unlocked_levels, Level::ALL.to_vec());
        assert!(state.progress.values().all(|p| p.completed));

        let err = engine
            .submit_level_answers(id, Level::Scenario, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::AlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn failing_a_level_terminates() {
        let (engine, _store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust"]))
            .await
            .unwrap();
        let id = sheet.assessment_id;

        let state = engine.get_assessment_state(id).await.unwrap();
        let answers = state
            .current_progress()
            .unwrap()
            .questions
            .iter()
            .map(|q| (q.id.clone(), wrong_answer(q)))
            .collect();
        let outcome = engine
            .submit_level_answers(id, Level::Beginner, answers)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Finished { ref report }
                if matches!(report.outcome, AssessmentStatus::Failed { level: Level::Beginner, .. })
        ));

        let state = engine.get_assessment_state(id).await.unwrap();
        assert_eq!(state.unlocked_levels, vec![Level::Beginner]);
        assert!(!state.progress.contains_key(&Level::Intermediate));
    }

    #[tokio::test]
    async fn mismatched_level_leaves_state_unchanged() {
        let (engine, _store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust"]))
            .await
            .unwrap();
        let id = sheet.assessment_id;

        let before = engine.get_assessment_state(id).await.unwrap();
        let err = engine
            .submit_level_answers(id, Level::Intermediate, BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssessmentError::LevelMismatch {
                current: Level::Beginner,
                submitted: Level::Intermediate
            }
        ));
        assert_eq!(engine.get_assessment_state(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_assessment_is_not_found() {
        let (engine, _store) = engine(ScriptedProvider::new());
        let id = Uuid::new_v4();
        assert!(matches!(
            engine.get_assessment_state(id).await,
            Err(AssessmentError::StateNotFound(got)) if got == id
        ));
        assert!(matches!(
            engine.submit_level_answers(id, Level::Beginner, BTreeMap::new()).await,
            Err(AssessmentError::StateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn generation_failure_is_checkpointed_as_failed() {
        let (engine, store) =
            engine(ScriptedProvider::new().script("SQL", vec!["not json".into()]));
        let err = engine
            .start_assessment(candidate(), job(&["Rust", "SQL"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::GenerationFailure { .. }));
        assert_eq!(err.skill(), Some("SQL"));

        // The only stored state is the failed one
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn resume_generation_returns_existing_sheet() {
        let (engine, _store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust"]))
            .await
            .unwrap();

        let again = engine
            .resume_generation(sheet.assessment_id)
            .await
            .unwrap();
        assert_eq!(again.questions, sheet.questions);
    }

    #[tokio::test]
    async fn resume_generation_finishes_interrupted_level() {
        let (engine, store) = engine(ScriptedProvider::new());
        let mut state = AssessmentState::new(candidate(), job(&["Rust"]));
        store.save(state.id, &state).await.unwrap();

        let sheet = engine.resume_generation(state.id).await.unwrap();
        assert_eq!(sheet.questions.len(), 4);

        state = engine.get_assessment_state(state.id).await.unwrap();
        assert_eq!(
            state.current_progress().unwrap().status,
            LevelStatus::AwaitingResponse
        );
    }

    #[tokio::test]
    async fn held_lease_rejects_resume() {
        let (engine, store) = engine(ScriptedProvider::new());
        let sheet = engine
            .start_assessment(candidate(), job(&["Rust"]))
            .await
            .unwrap();
        let id = sheet.assessment_id;

        let _lease = store.acquire(id).await.unwrap();
        let answers = all_correct(&engine, id).await;
        let err = engine
            .submit_level_answers(id, Level::Beginner, answers)
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::ConcurrentResumeConflict(got) if got == id));
        assert!(err.is_recoverable_by_caller());
    }
}
