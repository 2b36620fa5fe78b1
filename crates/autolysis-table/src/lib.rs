//! Autolysis Tables
//!
//! In-memory tabular datasets and the profiling stage that describes them.
//!
//! - [`Table`]: ordered, typed columns loaded from CSV
//! - [`profile_document`]: nested per-column statistical profile
//! - [`basic_summary`]: `head` / `description` / `null_counts` overview

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod profile;
pub mod stats;
pub mod table;

pub use error::TableError;
pub use profile::{basic_summary, profile_document};
pub use table::{format_number, Cell, Column, ColumnKind, Table};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
