//! Fan-out over skills for one level.
//!
//! Every skill gets its own generation task; tasks run concurrently (bounded
//! by a semaphore) and their batches are merged only after all of them
//! finish. The first failing task aborts the level: the remaining tasks are
//! dropped, which cancels them, and nothing is merged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::error::AssessmentError;
use crate::generation::{QuestionGenerator, SkillBatch};
use crate::model::{Level, Question};
use crate::prompts::GenerationContext;

/// Progress hooks for level generation.
pub trait ProgressReporter: Send + Sync {
    fn on_level_start(&self, level: Level, skills: &[String]);
    fn on_skill_complete(&self, level: Level, batch: &SkillBatch);
    fn on_skill_error(&self, level: Level, skill: &str, error: &AssessmentError);
    fn on_level_ready(&self, level: Level, questions: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_level_start(&self, _: Level, _: &[String]) {}
    fn on_skill_complete(&self, _: Level, _: &SkillBatch) {}
    fn on_skill_error(&self, _: Level, _: &str, _: &AssessmentError) {}
    fn on_level_ready(&self, _: Level, _: usize, _: Duration) {}
}

/// Runs one generation task per skill and merges the results at a barrier.
pub struct SkillDispatcher<'a> {
    generator: &'a QuestionGenerator,
    parallelism: usize,
    progress: &'a dyn ProgressReporter,
}

impl<'a> SkillDispatcher<'a> {
    pub fn new(
        generator: &'a QuestionGenerator,
        parallelism: usize,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            generator,
            parallelism: parallelism.max(1),
            progress,
        }
    }

    /// Generate questions for every skill at `level`.
    ///
    /// On success the merged list holds each skill's batch, in the order the
    /// skills were given. On failure the error of the first task to fail is
    /// returned and no partial result is produced.
    pub async fn dispatch(
        &self,
        level: Level,
        skills: &[String],
        ctx: GenerationContext<'_>,
    ) -> Result<Vec<Question>, AssessmentError> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        self.progress.on_level_start(level, skills);

        let mut pending = FuturesUnordered::new();
        for (index, skill) in skills.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let generator = self.generator;
            pending.push(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => generator.generate_batch(level, skill, ctx).await,
                    Err(_) => Err(AssessmentError::GenerationFailure {
                        skill: skill.clone(),
                        level,
                        attempts: 0,
                        reason: "dispatcher shut down".into(),
                    }),
                };
                (index, skill, result)
            });
        }

        let mut batches: Vec<Option<SkillBatch>> = vec![None; skills.len()];
        while let Some((index, skill, result)) = pending.next().await {
            match result {
                Ok(batch) => {
                    self.progress.on_skill_complete(level, &batch);
                    batches[index] = Some(batch);
                }
                Err(e) => {
                    tracing::error!(%level, skill = %skill, "skill generation failed: {e}");
                    self.progress.on_skill_error(level, skill, &e);
                    if !pending.is_empty() {
                        tracing::debug!(
                            %level,
                            cancelled = pending.len(),
                            "cancelling sibling skill tasks"
                        );
                    }
                    return Err(e);
                }
            }
        }

        let questions: Vec<Question> = batches
            .into_iter()
            .flatten()
            .flat_map(|batch| batch.questions)
            .collect();
        self.progress
            .on_level_ready(level, questions.len(), start.elapsed());
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::error::ProviderError;
    use crate::generation::GenerationSettings;
    use crate::model::{JobDescription, ResumeProfile};
    use crate::testing::{sample_batch, ScriptedProvider};

    fn generator(provider: Arc<ScriptedProvider>, max_attempts: u32) -> QuestionGenerator {
        QuestionGenerator::new(
            provider,
            GenerationSettings {
                max_attempts,
                retry_delay: Duration::from_millis(1),
                max_retry_delay: Duration::from_millis(2),
                batch_size: Some(3),
                ..Default::default()
            },
        )
    }

    fn skills(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn on_level_start(&self, level: Level, skills: &[String]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {} {}", level.number(), skills.len()));
        }
        fn on_skill_complete(&self, _: Level, batch: &SkillBatch) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}", batch.skill));
        }
        fn on_skill_error(&self, _: Level, skill: &str, _: &AssessmentError) {
            self.events.lock().unwrap().push(format!("error {skill}"));
        }
        fn on_level_ready(&self, _: Level, questions: usize, _: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ready {questions}"));
        }
    }

    #[tokio::test]
    async fn merges_every_skill_batch() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_delay("Kafka", Duration::from_millis(20))
                .script("Kafka", vec![sample_batch(Level::Beginner, 3)]),
        );
        let generator = generator(provider.clone(), 2);
        let reporter = RecordingReporter::default();
        let dispatcher = SkillDispatcher::new(&generator, 4, &reporter);
        let (job, resume) = (JobDescription::default(), ResumeProfile::default());
        let ctx = GenerationContext {
            job: &job,
            resume: &resume,
        };

        let questions = dispatcher
            .dispatch(Level::Beginner, &skills(&["Kafka", "Rust", "Go"]), ctx)
            .await
            .unwrap();

        assert_eq!(questions.len(), 9);
        let mut per_skill: BTreeMap<&str, usize> = BTreeMap::new();
        for question in &questions {
            *per_skill.entry(question.skill()).or_default() += 1;
        }
        assert_eq!(
            per_skill,
            BTreeMap::from([("Go", 3), ("Kafka", 3), ("Rust", 3)])
        );
        assert_eq!(provider.call_count(), 3);

        let events = reporter.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start 1 3"));
        assert_eq!(events.last().map(String::as_str), Some("ready 9"));
        // Kafka is delayed, so it completes last
        assert_eq!(events[events.len() - 2], "done Kafka");
    }

    #[tokio::test]
    async fn one_failed_skill_fails_the_level() {
        let provider = Arc::new(ScriptedProvider::new().script("SQL", vec!["nope".into()]));
        let generator = generator(provider, 2);
        let dispatcher = SkillDispatcher::new(&generator, 4, &NoopReporter);
        let (job, resume) = (JobDescription::default(), ResumeProfile::default());
        let ctx = GenerationContext {
            job: &job,
            resume: &resume,
        };

        let err = dispatcher
            .dispatch(Level::Beginner, &skills(&["Rust", "SQL"]), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::GenerationFailure { .. }));
        assert_eq!(err.skill(), Some("SQL"));
    }

    #[tokio::test]
    async fn failure_cancels_slow_siblings() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_delay("Kafka", Duration::from_secs(30))
                .fail_with("SQL", || ProviderError::AuthenticationFailed("revoked".into())),
        );
        let generator = generator(provider.clone(), 1);
        let dispatcher = SkillDispatcher::new(&generator, 4, &NoopReporter);
        let (job, resume) = (JobDescription::default(), ResumeProfile::default());
        let ctx = GenerationContext {
            job: &job,
            resume: &resume,
        };

        let started = Instant::now();
        let err = dispatcher
            .dispatch(Level::Beginner, &skills(&["Kafka", "SQL"]), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.skill(), Some("SQL"));
        assert!(started.elapsed() < Duration::from_secs(5));
        // The delayed Kafka call never completed
        assert_eq!(provider.completed_count(), 1);
    }

    #[tokio::test]
    async fn parallelism_bounds_concurrent_calls() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_delay("Alpha", Duration::from_millis(10))
                .with_delay("Bravo", Duration::from_millis(10))
                .with_delay("Charlie", Duration::from_millis(10)),
        );
        let generator = generator(provider.clone(), 1);
        let dispatcher = SkillDispatcher::new(&generator, 1, &NoopReporter);
        let (job, resume) = (JobDescription::default(), ResumeProfile::default());
        let ctx = GenerationContext {
            job: &job,
            resume: &resume,
        };

        dispatcher
            .dispatch(Level::Beginner, &skills(&["Alpha", "Bravo", "Charlie"]), ctx)
            .await
            .unwrap();
        assert_eq!(provider.max_in_flight(), 1);
    }
}
