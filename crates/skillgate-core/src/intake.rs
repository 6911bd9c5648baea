//! Turning free-text job postings and resumes into structured inputs.
//!
//! Runs before an assessment starts; the engine only ever sees the resulting
//! `JobDescription` and `ResumeProfile`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::model::{JobDescription, ResumeProfile};
use crate::traits::{
    extract_json_payload, FieldExtractor, FieldKind, FieldSpec, GenerateRequest, LlmProvider,
};

/// Fields extracted from a job posting.
pub const JOB_DESCRIPTION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "title",
        kind: FieldKind::Text,
        description: "The job title.",
        required: false,
    },
    FieldSpec {
        name: "company",
        kind: FieldKind::Text,
        description: "The company's name.",
        required: false,
    },
    FieldSpec {
        name: "required_skills",
        kind: FieldKind::List,
        description: "Important skills (programming languages, frameworks, tools), \
                      at least 5 if available, most important first.",
        required: true,
    },
    FieldSpec {
        name: "responsibilities",
        kind: FieldKind::List,
        description: "Major job duties or responsibilities.",
        required: false,
    },
    FieldSpec {
        name: "qualifications",
        kind: FieldKind::List,
        description: "Qualifications or eligibility requirements.",
        required: false,
    },
    FieldSpec {
        name: "description",
        kind: FieldKind::Text,
        description: "A short 3-4 line summary of the job.",
        required: false,
    },
];

/// Fields extracted from a resume.
pub const RESUME_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "education",
        kind: FieldKind::List,
        description: "Degrees, certifications or other academic credentials.",
        required: false,
    },
    FieldSpec {
        name: "experience",
        kind: FieldKind::List,
        description: "Work experience with title, company and duration \
                      (e.g. \"Software Developer at TechCorp for 2 years\").",
        required: false,
    },
    FieldSpec {
        name: "skills",
        kind: FieldKind::List,
        description: "Skills mentioned: languages, tools, frameworks, soft skills.",
        required: false,
    },
    FieldSpec {
        name: "projects",
        kind: FieldKind::List,
        description: "Projects that showcase relevant work or technical expertise.",
        required: false,
    },
    FieldSpec {
        name: "certifications",
        kind: FieldKind::List,
        description: "Certifications or additional qualifications.",
        required: false,
    },
    FieldSpec {
        name: "summary",
        kind: FieldKind::Text,
        description: "A short 3-4 line summary of the candidate's background.",
        required: false,
    },
];

/// Extract a `JobDescription` from a free-text posting.
pub async fn parse_job_description(
    extractor: &dyn FieldExtractor,
    text: &str,
) -> Result<JobDescription> {
    parse_with(extractor, text, JOB_DESCRIPTION_FIELDS)
        .await
        .context("failed to parse job description")
}

/// Extract a `ResumeProfile` from a free-text resume.
pub async fn parse_resume(extractor: &dyn FieldExtractor, text: &str) -> Result<ResumeProfile> {
    parse_with(extractor, text, RESUME_FIELDS)
        .await
        .context("failed to parse resume")
}

async fn parse_with<T: DeserializeOwned>(
    extractor: &dyn FieldExtractor,
    text: &str,
    schema: &[FieldSpec],
) -> Result<T> {
    if text.trim().is_empty() {
        bail!("input text is empty");
    }
    let fields = extractor.extract(text, schema).await?;
    let normalized = conform(fields, schema);
    Ok(serde_json::from_value(Value::Object(normalized))?)
}

/// Coerce extracted values to the shapes `schema` promises and drop
/// fields it does not name.
fn conform(mut fields: Map<String, Value>, schema: &[FieldSpec]) -> Map<String, Value> {
    let mut out = Map::new();
    for spec in schema {
        let value = fields.remove(spec.name).unwrap_or(Value::Null);
        let conformed = match spec.kind {
            FieldKind::List => Value::Array(
                as_strings(value)
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            FieldKind::Text => match value {
                Value::Null => continue,
                Value::String(s) => Value::String(s.trim().to_string()),
                Value::Array(_) => Value::String(as_strings(value).join("\n")),
                other => Value::String(other.to_string()),
            },
        };
        out.insert(spec.name.to_string(), conformed);
    }
    out
}

fn as_strings(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => vec![],
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `FieldExtractor` backed by any `LlmProvider`.
pub struct GeneratorFieldExtractor {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl GeneratorFieldExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 2048,
        }
    }

    fn prompt(free_text: &str, schema: &[FieldSpec]) -> String {
        let fields: Vec<String> = schema
            .iter()
            .map(|f| {
                let kind = match f.kind {
                    FieldKind::Text => "string",
                    FieldKind::List => "list of strings",
                };
                let optional = if f.required { "" } else { " Optional." };
                format!("- {}: ({kind}) {}{optional}", f.name, f.description)
            })
            .collect();
        format!(
            "You are an expert data extractor. Extract structured information from the \
             document below.\n\
             \n\
             Document:\n{free_text}\n\
             \n\
             Extract these fields:\n{}\n\
             \n\
             Respond with a single JSON object whose keys are exactly the field names above.",
            fields.join("\n")
        )
    }
}

#[async_trait]
impl FieldExtractor for GeneratorFieldExtractor {
    async fn extract(&self, free_text: &str, schema: &[FieldSpec]) -> Result<Map<String, Value>> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: Self::prompt(free_text, schema),
            system_prompt: Some(
                "You extract structured data. Respond ONLY with valid JSON.".to_string(),
            ),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            stop_sequences: vec![],
        };

        let response = self.provider.generate(&request).await?;
        let payload = extract_json_payload(&response.content);
        let value: Value =
            serde_json::from_str(&payload).context("extractor returned invalid JSON")?;
        let Value::Object(fields) = value else {
            bail!("extractor returned JSON that is not an object");
        };

        let missing: Vec<&str> = schema
            .iter()
            .filter(|f| f.required && fields.get(f.name).map_or(true, is_blank))
            .map(|f| f.name)
            .collect();
        if !missing.is_empty() {
            bail!("missing required field(s): {}", missing.join(", "));
        }

        tracing::debug!(fields = fields.len(), "extracted structured fields");
        Ok(fields)
    }
}
