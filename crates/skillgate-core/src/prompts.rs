//! Level-specific question generation prompts.
//!
//! Level 1 uses the skill name alone, level 2 adds the candidate's projects
//! and experience, level 3 adds the job title, company, responsibilities and
//! qualifications.

use crate::model::{JobDescription, Level, ResumeProfile};

/// Read-only inputs shared by every skill task of an assessment.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub job: &'a JobDescription,
    pub resume: &'a ResumeProfile,
}

/// Build the generation prompt for one `(level, skill)` task.
pub fn build_prompt(level: Level, skill: &str, ctx: GenerationContext<'_>, count: u32) -> String {
    match level {
        Level::Beginner => beginner_prompt(skill, count),
        Level::Intermediate => intermediate_prompt(skill, ctx.resume, count),
        Level::Scenario => scenario_prompt(skill, ctx.job, count),
    }
}

fn beginner_prompt(skill: &str, count: u32) -> String {
    format!(
        "You are an expert technical evaluator in {skill}. Assess a candidate's {skill} \
         knowledge at the beginner level.\n\
         \n\
         Generate {count} multiple choice questions, each with exactly one correct option.\n\
         \n\
         Respond with a JSON array only. Each element must have this shape:\n\
         {{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"answer\": \"<the correct option, copied exactly>\", \"max_time_required\": <seconds>}}"
    )
}

fn intermediate_prompt(skill: &str, resume: &ResumeProfile, count: u32) -> String {
    format!(
        "You are an expert technical evaluator in {skill}. Assess a candidate's {skill} \
         knowledge at the intermediate level, grounded in their background.\n\
         \n\
         Candidate projects:\n{projects}\n\
         Candidate experience:\n{experience}\n\
         \n\
         Generate {count} multiple select questions. Each may have one or several correct options.\n\
         \n\
         Respond with a JSON array only. Each element must have this shape:\n\
         {{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"answers\": [\"<correct option>\", \"...\"], \"max_time_required\": <seconds>}}",
        projects = bullet_list(&resume.projects),
        experience = bullet_list(&resume.experience),
    )
}

fn scenario_prompt(skill: &str, job: &JobDescription, count: u32) -> String {
    format!(
        "You are an expert evaluator testing whether a candidate can perform a job role. \
         Focus on situations that exercise {skill}.\n\
         \n\
         Title: {title}\n\
         Company: {company}\n\
         Responsibilities:\n{responsibilities}\n\
         Qualifications:\n{qualifications}\n\
         \n\
         Generate {count} scenario-based questions drawn from these responsibilities and \
         qualifications. For each, decide whether one option or several options are correct.\n\
         \n\
         Respond with a JSON array only. Each element must have one of these shapes:\n\
         {{\"scenario\": \"...\", \"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\", \"...\"], \
         \"answer\": \"<the correct option>\", \"max_time_required\": <seconds>}}\n\
         {{\"scenario\": \"...\", \"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\", \"...\"], \
         \"answers\": [\"<correct option>\", \"...\"], \"max_time_required\": <seconds>}}",
        title = or_unspecified(&job.title),
        company = or_unspecified(&job.company),
        responsibilities = bullet_list(&job.responsibilities),
        qualifications = bullet_list(&job.qualifications),
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none listed)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_unspecified(value: &str) -> &str {
    if value.trim().is_empty() {
        "(unspecified)"
    } else {
        value
    }
}
