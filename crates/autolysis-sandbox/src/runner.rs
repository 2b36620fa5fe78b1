//! Block execution with isolation and a wall-clock budget

use crate::budget::Budget;
use crate::canvas::{Canvas, Figure};
use crate::error::SnippetError;
use crate::frame::Frame;
use crate::interpreter::Interpreter;
use crate::render::render_png;
use autolysis_narrative::{CodeBlock, ExecutionOutcome};
use autolysis_table::Table;
use crossbeam::channel::{self, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extra wait after the budget before the runner stops listening
const JOIN_GRACE: Duration = Duration::from_millis(250);

/// Limits and output settings of the sandbox (`[sandbox]` in TOML)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Wall-clock budget per block in milliseconds
    pub time_budget_ms: u64,
    /// Default figure width in pixels
    pub figure_width: u32,
    /// Default figure height in pixels
    pub figure_height: u32,
    /// Largest accepted figure dimension in pixels
    pub max_dimension: u32,
    /// Largest sequence a snippet may build
    pub max_elements: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 10_000,
            figure_width: 640,
            figure_height: 480,
            max_dimension: 4000,
            max_elements: 1_000_000,
        }
    }
}

impl SandboxConfig {
    /// Per-block time budget
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Set the per-block time budget
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the default figure size in pixels
    #[must_use]
    pub fn with_figure_size(mut self, width: u32, height: u32) -> Self {
        self.figure_width = width;
        self.figure_height = height;
        self
    }

    /// Set the element limit for sequences built by snippets
    #[must_use]
    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }
}

/// Runs code blocks one at a time, each against a fresh scope and canvas
///
/// A block's failure is confined to its own [`ExecutionOutcome`].
#[derive(Debug, Clone, Default)]
pub struct SandboxRunner {
    config: SandboxConfig,
}

impl SandboxRunner {
    /// Create a runner with the given limits
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute one block against `data`, writing `graph_<n>.png` into `output_dir`
    pub fn run(&self, block: &CodeBlock, data: &Table, output_dir: &Path) -> ExecutionOutcome {
        let frame = Arc::new(Frame::from_table(data));
        self.outcome(block, &frame, output_dir)
    }

    /// Execute every block in order; outcomes are indexed like `blocks`
    pub fn run_all(&self, blocks: &[CodeBlock], data: &Table, output_dir: &Path) -> Vec<ExecutionOutcome> {
        let frame = Arc::new(Frame::from_table(data));
        let outcomes: Vec<ExecutionOutcome> = blocks
            .iter()
            .map(|block| self.outcome(block, &frame, output_dir))
            .collect();
        let artifacts = outcomes.iter().filter(|o| o.is_artifact()).count();
        info!(
            blocks = blocks.len(),
            artifacts,
            failures = blocks.len() - artifacts,
            "snippets executed"
        );
        outcomes
    }

    fn outcome(&self, block: &CodeBlock, frame: &Arc<Frame>, output_dir: &Path) -> ExecutionOutcome {
        let started = Instant::now();
        match self.execute(block, frame, output_dir) {
            Ok(path) => {
                debug!(
                    block = block.number(),
                    path = %path.display(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "chart rendered"
                );
                ExecutionOutcome::Artifact(path)
            }
            Err(err) => {
                warn!(block = block.number(), error = %err, "snippet failed");
                ExecutionOutcome::Failure(err.to_string())
            }
        }
    }

    fn execute(&self, block: &CodeBlock, frame: &Arc<Frame>, output_dir: &Path) -> Result<PathBuf, SnippetError> {
        if !output_dir.is_dir() {
            return Err(SnippetError::OutputDir(output_dir.to_path_buf()));
        }
        let figure = self.interpret(block, frame)?.ok_or(SnippetError::NoFigure)?;
        let path = output_dir.join(format!("graph_{}.png", block.number()));
        render_png(&figure, &path)?;
        Ok(path)
    }

    /// Interpret on a worker thread and wait at most the budget plus a grace period
    fn interpret(&self, block: &CodeBlock, frame: &Arc<Frame>) -> Result<Option<Figure>, SnippetError> {
        let allowed = self.config.time_budget();
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = Budget::new(allowed, Arc::clone(&cancel), self.config.max_elements);
        let canvas = Canvas::new(
            (self.config.figure_width, self.config.figure_height),
            self.config.max_dimension,
        );
        let source = block.source();
        let data = Arc::clone(frame);
        let (tx, rx) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name(format!("snippet-{}", block.number()))
            .spawn(move || {
                let result = Interpreter::new(&source, data, canvas, budget).run();
                // receiver is gone once the runner has timed out
                let _ = tx.send(result);
            })
            .map_err(|e| SnippetError::Panicked(format!("could not start worker: {e}")))?;

        match rx.recv_timeout(allowed + JOIN_GRACE) {
            Ok(result) => {
                let _ = handle.join();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                Err(SnippetError::Timeout(allowed))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SnippetError::Panicked(
                handle.join().err().map_or_else(|| "no result".to_string(), panic_message),
            )),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolysis_narrative::SnippetExtractor;
    use autolysis_table::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::numeric("x", [1.0, 2.0, 3.0]),
            Column::numeric("y", [2.0, 4.0, 8.0]),
        ])
        .unwrap()
    }

    fn blocks(text: &str) -> Vec<CodeBlock> {
        SnippetExtractor::default().extract(text)
    }

    #[test]
    fn config_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.time_budget(), Duration::from_secs(10));
        assert_eq!((config.figure_width, config.figure_height), (640, 480));
    }

    #[test]
    fn config_from_partial_toml() {
        let config: SandboxConfig = toml::from_str("time_budget_ms = 500").unwrap();
        assert_eq!(config.time_budget(), Duration::from_millis(500));
        assert_eq!(config.max_elements, SandboxConfig::default().max_elements);
        assert!(toml::from_str::<SandboxConfig>("budget = 1").is_err());
    }

    #[test]
    fn artifact_named_after_block_number() {
        let dir = tempfile::tempdir().unwrap();
        let found = blocks("```python\nplt.plot(data['x'], data['y'])\n```\n");
        let outcome = SandboxRunner::default().run(&found[0], &table(), dir.path());
        assert_eq!(outcome, ExecutionOutcome::Artifact(dir.path().join("graph_1.png")));
        assert!(dir.path().join("graph_1.png").is_file());
    }

    #[test]
    fn missing_output_dir_fails_block() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let found = blocks("```python\nplt.plot([1])\n```\n");
        let outcome = SandboxRunner::default().run(&found[0], &table(), &missing);
        assert!(outcome.message().unwrap().contains("does not exist"));
    }

    #[test]
    fn block_without_figure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let found = blocks("```python\nm = data['x'].mean()\n```\n");
        let outcome = SandboxRunner::default().run(&found[0], &table(), dir.path());
        assert_eq!(outcome, ExecutionOutcome::failure("block produced no figure"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }
}
