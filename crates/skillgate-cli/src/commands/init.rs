//! The `skillgate init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("skillgate.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("inputs")?;
    write_if_missing(Path::new("inputs/job.json"), SAMPLE_JOB)?;
    write_if_missing(Path::new("inputs/resume.json"), SAMPLE_RESUME)?;

    println!("\nNext steps:");
    println!("  1. Edit skillgate.toml with your API keys");
    println!("  2. Run: skillgate start --candidate-id cand-1 --job inputs/job.json --resume inputs/resume.json");
    println!("  3. Run: skillgate submit --assessment <id> --level 1 --answers answers.json");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# skillgate configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
default_temperature = 0.7
max_retries = 3
retry_delay_ms = 1000
parallelism = 4
pass_threshold = 0.7
checkpoint_dir = "./skillgate-checkpoints"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
"#;

const SAMPLE_JOB: &str = r#"{
  "title": "Data Engineer",
  "company": "Acme Analytics",
  "required_skills": ["Python", "SQL"],
  "responsibilities": [
    "Build and operate batch ingestion pipelines",
    "Model warehouse tables for reporting"
  ],
  "qualifications": ["3+ years building data platforms"]
}
"#;

const SAMPLE_RESUME: &str = r#"{
  "experience": ["Data Analyst at Northwind for 2 years"],
  "skills": ["Python", "SQL", "Airflow"],
  "projects": ["Nightly sales reconciliation job"],
  "summary": "Analyst moving into data engineering."
}
"#;
