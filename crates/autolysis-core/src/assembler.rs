//! Report assembly
//!
//! [`ReportAssembler`] drives one run: dataset → compressed profile →
//! prompt chain → narrative → sandboxed snippets → `README.md`.
//! [`NarrativeRenderer`] is the last stage on its own, usable without a
//! text service.

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::llm::TextGenerator;
use crate::prompts;
use autolysis_narrative::{narrative_title, rewrite, ExecutionOutcome, SnippetExtractor};
use autolysis_profile::{CompressedProfile, ProfileCompressor};
use autolysis_sandbox::{SandboxConfig, SandboxRunner};
use autolysis_table::{basic_summary, profile_document, Table};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// File name of the persisted narrative
pub const README_FILE: &str = "README.md";

/// One failed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFailure {
    /// 1-based block number
    pub block: usize,
    /// Failure message
    pub message: String,
}

/// Result of resolving a narrative's snippets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNarrative {
    /// Persisted narrative
    pub readme_path: PathBuf,
    /// First level-1 heading, if any
    pub title: Option<String>,
    /// Number of code blocks found
    pub block_count: usize,
    /// Chart files written
    pub artifacts: Vec<PathBuf>,
    /// Blocks that failed
    pub failures: Vec<BlockFailure>,
}

/// Result of a full report run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Identifier of this run
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Sub-questions parsed from the question response
    pub sub_questions: usize,
    /// Detail answers included in the analysis
    pub detail_answers: usize,
    /// Snippet resolution
    #[serde(flatten)]
    pub rendered: RenderedNarrative,
}

/// Dataset loaded and profiled for one run
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    /// Loaded rows
    pub table: Arc<Table>,
    /// Dataset summary used as prompt context
    pub summary: Value,
    /// Compressed profile with audit records
    pub profile: CompressedProfile,
}

/// Check the dataset file and output directory before any work
///
/// # Errors
/// `Input` naming whichever path is missing.
pub fn validate_paths(dataset: &Path, output_dir: &Path) -> Result<(), ReportError> {
    if !dataset.is_file() {
        return Err(ReportError::input(format!("file {} does not exist", dataset.display())));
    }
    if !output_dir.is_dir() {
        return Err(ReportError::input(format!(
            "output directory '{}' does not exist",
            output_dir.display()
        )));
    }
    Ok(())
}

/// Load, profile and compress a dataset on the blocking pool
///
/// # Errors
/// CSV loading or compression failure.
pub async fn prepare_dataset(
    dataset: &Path,
    title: &str,
    compressor: ProfileCompressor,
) -> Result<PreparedDataset, ReportError> {
    let dataset = dataset.to_path_buf();
    let title = title.to_string();
    tokio::task::spawn_blocking(move || -> Result<PreparedDataset, ReportError> {
        let table = Table::from_csv_path(&dataset)?;
        info!(rows = table.n_rows(), columns = table.n_columns(), "dataset loaded");
        let summary = basic_summary(&table);
        let raw = profile_document(&table, &title);
        let profile = compressor.compress_with_audit(raw)?;
        info!(oversized = profile.audit.len(), "profile compressed");
        Ok(PreparedDataset {
            table: Arc::new(table),
            summary,
            profile,
        })
    })
    .await?
}

/// Runs snippets of a narrative and persists the rewritten text
#[derive(Debug, Clone, Default)]
pub struct NarrativeRenderer {
    sandbox: SandboxConfig,
    require_visuals: bool,
}

impl NarrativeRenderer {
    /// Create renderer
    #[must_use]
    pub fn new(sandbox: SandboxConfig, require_visuals: bool) -> Self {
        Self {
            sandbox,
            require_visuals,
        }
    }

    /// Renderer using a report configuration's sandbox and visuals policy
    #[must_use]
    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.sandbox.clone(), config.require_visuals)
    }

    /// Execute every block, rewrite the narrative and write `README.md`
    ///
    /// Nothing is written when the narrative fails the visuals policy or the
    /// rewrite is inconsistent.
    ///
    /// # Errors
    /// `EmptyNarrative`, `Rewrite`, `Io` or a failed blocking task.
    pub async fn render(
        &self,
        narrative: &str,
        table: Arc<Table>,
        output_dir: &Path,
    ) -> Result<RenderedNarrative, ReportError> {
        if !output_dir.is_dir() {
            return Err(ReportError::input(format!(
                "output directory '{}' does not exist",
                output_dir.display()
            )));
        }
        let blocks = SnippetExtractor::default().extract(narrative);
        if blocks.is_empty() {
            if self.require_visuals {
                return Err(ReportError::EmptyNarrative);
            }
            warn!("no python code blocks found in the narrative");
        }

        let runner = SandboxRunner::new(self.sandbox.clone());
        let dir = output_dir.to_path_buf();
        let (blocks, outcomes) = tokio::task::spawn_blocking(move || {
            let outcomes = runner.run_all(&blocks, &table, &dir);
            (blocks, outcomes)
        })
        .await?;

        let rewritten = rewrite(narrative, &blocks, &outcomes)?;
        let readme_path = output_dir.join(README_FILE);
        tokio::fs::write(&readme_path, format!("{rewritten}\n"))
            .await
            .map_err(|e| ReportError::io_error(&readme_path, e))?;

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        for (block, outcome) in blocks.iter().zip(outcomes) {
            match outcome {
                ExecutionOutcome::Artifact(path) => artifacts.push(path),
                ExecutionOutcome::Failure(message) => failures.push(BlockFailure {
                    block: block.number(),
                    message,
                }),
            }
        }
        info!(
            path = %readme_path.display(),
            artifacts = artifacts.len(),
            failures = failures.len(),
            "narrative written"
        );
        Ok(RenderedNarrative {
            readme_path,
            title: narrative_title(&rewritten),
            block_count: blocks.len(),
            artifacts,
            failures,
        })
    }
}

/// Narrative text and the counts behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    /// Story text returned by the service
    pub text: String,
    /// Sub-questions parsed
    pub sub_questions: usize,
    /// Detail answers kept
    pub detail_answers: usize,
}

/// Orchestrates a full report run
#[derive(Debug, Clone)]
pub struct ReportAssembler<G> {
    config: ReportConfig,
    generator: G,
}

impl<G: TextGenerator> ReportAssembler<G> {
    /// Create assembler
    #[must_use]
    pub fn new(config: ReportConfig, generator: G) -> Self {
        Self { config, generator }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Text service in use
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Produce `README.md` and charts for `dataset` in `output_dir`
    ///
    /// # Errors
    /// Any fatal [`ReportError`]; no README is written in that case.
    pub async fn run(&self, dataset: &Path, output_dir: &Path) -> Result<ReportSummary, ReportError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("report", %run_id, started_at = %started_at.to_rfc3339());
        async move {
            info!(dataset = %dataset.display(), "report started");
            validate_paths(dataset, output_dir)?;
            let compressor = ProfileCompressor::new(self.config.compression.clone());
            let prepared = prepare_dataset(dataset, &self.config.title, compressor).await?;
            let narrative = self.narrate(&prepared.summary, &prepared.profile.tree).await?;
            let rendered = NarrativeRenderer::from_config(&self.config)
                .render(&narrative.text, prepared.table, output_dir)
                .await?;
            info!("analysis complete");
            Ok(ReportSummary {
                run_id,
                started_at,
                sub_questions: narrative.sub_questions,
                detail_answers: narrative.detail_answers,
                rendered,
            })
        }
        .instrument(span)
        .await
    }

    /// Run the prompt chain against a summary and compressed profile
    ///
    /// Detail calls that fail are skipped; the question and story calls are
    /// fatal.
    ///
    /// # Errors
    /// `Generation` when the question or story call fails.
    pub async fn narrate(&self, summary: &Value, profile: &Value) -> Result<Narrative, ReportError> {
        let limits = &self.config.generation;
        let response = self
            .generator
            .generate(&prompts::question_prompt(summary, profile), limits.question_max_tokens)
            .await?;
        let sub_questions = prompts::parse_sub_questions(&response);
        info!(count = sub_questions.len(), "sub-questions received");

        let variables = profile.get("variables").and_then(Value::as_object);
        let mut details = Vec::new();
        for question in &sub_questions {
            for name in &question.variables {
                let Some(record) = variables.and_then(|vars| vars.get(name)) else {
                    continue;
                };
                let prompt = prompts::detail_prompt(name, record, &question.text);
                match self.generator.generate(&prompt, limits.question_max_tokens).await {
                    Ok(answer) => details.push(prompts::detail_entry(&question.text, &answer)),
                    Err(err) => warn!(variable = %name, error = %err, "detail prompt failed, skipping"),
                }
            }
        }

        let analysis = prompts::analysis(summary, &details);
        let text = self
            .generator
            .generate(&prompts::story_prompt(&analysis), limits.story_max_tokens)
            .await?;
        info!(chars = text.len(), "narrative received");
        Ok(Narrative {
            text,
            sub_questions: sub_questions.len(),
            detail_answers: details.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_are_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_paths(&dir.path().join("none.csv"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let csv = dir.path().join("data.csv");
        std::fs::write(&csv, "a\n1\n").unwrap();
        let err = validate_paths(&csv, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ReportError::Input(_)));
        assert!(validate_paths(&csv, dir.path()).is_ok());
    }

    #[tokio::test]
    async fn empty_narrative_policy() {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(Table::default());

        let strict = NarrativeRenderer::new(SandboxConfig::default(), true);
        let err = strict.render("# Title\nno code", Arc::clone(&table), dir.path()).await.unwrap_err();
        assert!(matches!(err, ReportError::EmptyNarrative));
        assert!(!dir.path().join(README_FILE).exists());

        let lenient = NarrativeRenderer::new(SandboxConfig::default(), false);
        let rendered = lenient.render("# Title\nno code", table, dir.path()).await.unwrap();
        assert_eq!(rendered.block_count, 0);
        assert_eq!(rendered.title.as_deref(), Some("Title"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(README_FILE)).unwrap(),
            "# Title\nno code\n"
        );
    }
}
