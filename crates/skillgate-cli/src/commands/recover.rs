//! The `skillgate recover` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use super::{emit, open_engine, print_sheet_summary};

pub async fn execute(assessment: Uuid, config_path: Option<PathBuf>) -> Result<()> {
    let engine = open_engine(config_path.as_deref()).await?;
    let sheet = engine.resume_generation(assessment).await?;

    print_sheet_summary(&sheet);
    emit(&serde_json::to_string_pretty(&sheet)?, None)
}
