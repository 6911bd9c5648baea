//! Per-level state machine.
//!
//! `generating -> awaiting_response -> evaluating -> {passed, failed}`. The
//! controller mutates a `LevelProgress` in place; persisting it between steps
//! is the engine's job.

use std::collections::BTreeMap;

use crate::dispatch::SkillDispatcher;
use crate::error::AssessmentError;
use crate::model::{Answer, LevelProgress, LevelScore, LevelStatus};
use crate::prompts::GenerationContext;
use crate::scoring::score_level;

/// Move `progress` to `to`, rejecting transitions the state machine forbids.
pub fn transition(progress: &mut LevelProgress, to: LevelStatus) -> Result<(), AssessmentError> {
    if !progress.status.can_transition_to(to) {
        return Err(AssessmentError::InvalidTransition {
            level: progress.level,
            from: progress.status,
            to,
        });
    }
    tracing::debug!(level = %progress.level, from = %progress.status, %to, "level transition");
    progress.status = to;
    Ok(())
}

/// Drives one level through generation, answer intake and scoring.
pub struct LevelController<'a> {
    dispatcher: SkillDispatcher<'a>,
    pass_threshold: f64,
}

impl<'a> LevelController<'a> {
    pub fn new(dispatcher: SkillDispatcher<'a>, pass_threshold: f64) -> Self {
        Self {
            dispatcher,
            pass_threshold,
        }
    }

    /// Fan out generation for `skills` and, once every task has reported,
    /// merge the questions and wait for answers.
    ///
    /// If any skill fails, the level is marked failed and the error returned.
    pub async fn generate(
        &self,
        progress: &mut LevelProgress,
        skills: &[String],
        ctx: GenerationContext<'_>,
    ) -> Result<(), AssessmentError> {
        if progress.status != LevelStatus::Generating {
            return Err(AssessmentError::InvalidTransition {
                level: progress.level,
                from: progress.status,
                to: LevelStatus::AwaitingResponse,
            });
        }

        match self.dispatcher.dispatch(progress.level, skills, ctx).await {
            Ok(questions) => {
                progress.questions.extend(questions);
                transition(progress, LevelStatus::AwaitingResponse)
            }
            Err(e) => {
                transition(progress, LevelStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// Record the candidate's answers and move to evaluation.
    ///
    /// Every answer must name a question of this level; otherwise nothing is
    /// recorded.
    pub fn accept_answers(
        &self,
        progress: &mut LevelProgress,
        answers: BTreeMap<String, Answer>,
    ) -> Result<(), AssessmentError> {
        if progress.status != LevelStatus::AwaitingResponse {
            return Err(AssessmentError::LevelNotReady {
                level: progress.level,
                status: progress.status,
            });
        }
        if let Some(unknown) = answers.keys().find(|id| progress.question(id).is_none()) {
            return Err(AssessmentError::UnknownQuestion(unknown.clone()));
        }

        progress.answers.extend(answers);
        transition(progress, LevelStatus::Evaluating)
    }

    /// Score the recorded answers and close the level.
    pub fn evaluate(&self, progress: &mut LevelProgress) -> Result<LevelScore, AssessmentError> {
        if progress.status != LevelStatus::Evaluating {
            return Err(AssessmentError::LevelNotReady {
                level: progress.level,
                status: progress.status,
            });
        }

        let score = score_level(&progress.questions, &progress.answers, self.pass_threshold);
        let outcome = if score.passed {
            LevelStatus::Passed
        } else {
            LevelStatus::Failed
        };
        transition(progress, outcome)?;
        progress.score = Some(score.clone());
        progress.completed = true;

        tracing::info!(
            level = %progress.level,
            passed = score.passed,
            failing = ?score.failing_skills(),
            "level evaluated"
        );
        Ok(score)
    }
}
