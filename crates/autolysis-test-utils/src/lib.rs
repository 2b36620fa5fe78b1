//! Testing utilities for the Autolysis workspace
//!
//! Shared fixtures: a small mixed-type dataset, narrative builders and the
//! reference profile tree.

#![allow(missing_docs)]

use autolysis_table::Table;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Ten rows with numeric, categorical, boolean and missing cells
pub const SAMPLE_CSV: &str = "\
city,year,rainfall,temperature,coastal
Oslo,2019,763,6.1,true
Oslo,2020,810,6.9,true
Rome,2019,798,15.8,false
Rome,2020,,16.4,false
Lima,2019,13,19.2,true
Lima,2020,9,19.8,true
Cairo,2019,18,22.3,false
Cairo,2020,21,22.9,false
Quito,2019,1010,14.0,false
Quito,2020,1105,,false
";

pub fn sample_table() -> Table {
    Table::from_csv_reader(SAMPLE_CSV.as_bytes(), "sample.csv").unwrap()
}

/// Write `contents` to `dir/name` and return the path
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Temporary directory holding `sample.csv`
pub fn sample_csv_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "sample.csv", SAMPLE_CSV);
    (dir, path)
}

/// Fenced python block around `body`
pub fn python_block(body: &str) -> String {
    format!("```python\n{body}\n```")
}

/// Narrative with a heading, one paragraph per block and the blocks themselves
pub fn narrative_with_blocks(bodies: &[&str]) -> String {
    let mut text = String::from("# Weather Report\n\n");
    for (i, body) in bodies.iter().enumerate() {
        text.push_str(&format!("Finding {}.\n\n{}\n\n", i + 1, python_block(body)));
    }
    text.push_str("The end.\n");
    text
}

/// Profile tree with a mixed `variables` record and an oversized list
pub fn oversized_profile() -> Value {
    let blob: Vec<u32> = (0..1000).collect();
    let other: Vec<u32> = (0..600).collect();
    json!({
        "variables": {
            "age": {
                "mean": 30,
                "huge_blob": blob,
            }
        },
        "other": other,
    })
}
