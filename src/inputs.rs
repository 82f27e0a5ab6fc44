use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct BatchInputs {
    pub prompts: Vec<String>,
    pub guideline: String,
}

/// Reads the prompts and guidelines files. A missing file or an empty
/// prompts list aborts the run before any network activity; a blank
/// guidelines file only degrades the run to unguided responses.
pub async fn load(prompts_file: &Path, guidelines_file: &Path) -> Result<BatchInputs> {
    let prompts = load_prompts(prompts_file).await?;
    let guideline = load_guideline(guidelines_file).await?;
    debug!(
        prompt_count = prompts.len(),
        guideline_len = guideline.len(),
        "loaded batch inputs"
    );
    Ok(BatchInputs { prompts, guideline })
}

async fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompts file '{}'", path.display()))?;

    let prompts = non_blank_lines(&raw);
    if prompts.is_empty() {
        bail!(
            "Prompts file '{}' contains no prompts; nothing to do",
            path.display()
        );
    }
    Ok(prompts)
}

async fn load_guideline(path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read guidelines file '{}'", path.display()))?;

    let guideline = join_guideline_lines(&raw);
    if guideline.is_empty() {
        warn!(
            guidelines_file = %path.display(),
            "guidelines file is blank; expect unguided responses"
        );
    }
    Ok(guideline)
}

fn non_blank_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_guideline_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
