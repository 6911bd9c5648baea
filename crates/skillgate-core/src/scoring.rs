//! Per-skill accuracy scoring for a level.

use std::collections::BTreeMap;

use crate::model::{Answer, LevelScore, Question, SkillScore};

/// Default per-skill accuracy required to pass a level.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.70;

/// Absorbs float noise so that e.g. 7/10 meets a 0.7 threshold.
pub const EPSILON: f64 = 1e-9;

/// Score `answers` against `questions`, grouping by skill.
///
/// Unanswered questions count as incorrect. The level passes only if every
/// skill independently reaches `threshold`; a strong skill never compensates
/// for a weak one.
pub fn score_level(
    questions: &[Question],
    answers: &BTreeMap<String, Answer>,
    threshold: f64,
) -> LevelScore {
    let mut tallies: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for question in questions {
        let tally = tallies.entry(question.skill()).or_insert((0, 0));
        tally.1 += 1;
        let correct = answers
            .get(&question.id)
            .is_some_and(|answer| question.correct.is_satisfied_by(answer));
        if correct {
            tally.0 += 1;
        }
    }

    let per_skill: BTreeMap<String, SkillScore> = tallies
        .into_iter()
        .map(|(skill, (correct, total))| {
            (
                skill.to_string(),
                SkillScore {
                    correct,
                    total,
                    accuracy: accuracy(correct, total),
                },
            )
        })
        .collect();

    let passed =
        !per_skill.is_empty() && per_skill.values().all(|s| s.accuracy + EPSILON >= threshold);

    LevelScore {
        per_skill,
        threshold,
        passed,
    }
}

fn accuracy(correct: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}
