//! Autolysis Sandbox
//!
//! Executes generated chart snippets without a host interpreter. Each block
//! is parsed with the tree-sitter Python grammar and evaluated by a
//! restricted interpreter that understands a small dataframe and plotting
//! vocabulary. The figure a block leaves behind is rasterized to PNG.
//!
//! Blocks never share state: every run gets a fresh scope holding `data`,
//! `df`, `plt` and `sns`, its own canvas and its own worker thread bounded
//! by a wall-clock budget.
//!
//! # Example
//!
//! ```rust,no_run
//! use autolysis_narrative::SnippetExtractor;
//! use autolysis_sandbox::{SandboxConfig, SandboxRunner};
//! use autolysis_table::Table;
//! use std::path::Path;
//!
//! let data = Table::from_csv_path("data.csv").unwrap();
//! let blocks = SnippetExtractor::default().extract("```python\nplt.plot([1, 2])\n```\n");
//! let runner = SandboxRunner::new(SandboxConfig::default());
//! let outcomes = runner.run_all(&blocks, &data, Path::new("out"));
//! assert_eq!(outcomes.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod args;
mod budget;
mod canvas;
pub mod error;
mod frame;
mod interpreter;
mod methods;
mod plotting;
mod render;
pub mod runner;
mod value;

pub use error::SnippetError;
pub use runner::{SandboxConfig, SandboxRunner};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
