//! Autolysis Core
//!
//! Assembles a dataset report: the CSV is profiled and compressed, a text
//! service answers a chain of prompts, and the chart snippets in the
//! returned narrative are executed in the sandbox before `README.md` is
//! written.
//!
//! # Architecture
//!
//! ```text
//! CSV ─▶ Table ─▶ profile ─▶ ProfileCompressor ─▶ prompt chain ─▶ narrative
//!                                                  (TextGenerator)     │
//!         README.md ◀─ rewrite ◀─ SandboxRunner ◀─ SnippetExtractor ◀──┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use autolysis_core::{CachedGenerator, HttpTextGenerator, ReportAssembler, ReportConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReportConfig::default();
//! let http = HttpTextGenerator::from_env(config.generation.clone())?;
//! let generator = CachedGenerator::new(http, config.generation.cache_capacity);
//! let summary = ReportAssembler::new(config, generator)
//!     .run(Path::new("data.csv"), Path::new("."))
//!     .await?;
//! println!("{} charts", summary.rendered.artifacts.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod assembler;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;

pub use assembler::{
    prepare_dataset, validate_paths, BlockFailure, Narrative, NarrativeRenderer, PreparedDataset,
    RenderedNarrative, ReportAssembler, ReportSummary, README_FILE,
};
pub use config::{GenerationConfig, ReportConfig};
pub use error::{ConfigError, GenerationError, ReportError};
pub use llm::{parse_completion, CachedGenerator, HttpTextGenerator, TextGenerator};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
