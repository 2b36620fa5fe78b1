//! Column profiling
//!
//! Produces the nested profiling document consumed by the compression
//! stage, and the short `head` / `description` / `null_counts` overview
//! used in prompts.

use crate::stats;
use crate::table::{format_number, Cell, Column, ColumnKind, Table};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Rows shown in `first_rows`, `head` and `sample`
const HEAD_ROWS: usize = 5;

/// Bins of the per-variable histogram
const HISTOGRAM_BINS: usize = 10;

/// Skewness magnitude above which an alert is raised
const SKEW_ALERT: f64 = 20.0;

/// Share of zeros above which an alert is raised
const ZEROS_ALERT: f64 = 0.05;

/// Correlation magnitude above which an alert is raised
const CORRELATION_ALERT: f64 = 0.9;

/// Build the full profiling document for a table
#[must_use]
pub fn profile_document(table: &Table, title: &str) -> Value {
    let started = chrono::Utc::now();
    let columns: Vec<&Column> = table.columns().collect();

    let variables: Vec<(String, Value)> = columns
        .par_iter()
        .map(|column| (column.name().to_string(), describe_variable(column)))
        .collect();

    let correlations = correlation_matrix(&columns);
    let alerts = collect_alerts(table, &variables, &correlations);

    let mut variables_map = Map::new();
    for (name, record) in variables {
        variables_map.insert(name, record);
    }

    let missing: Map<String, Value> = table
        .columns()
        .map(|c| (c.name().to_string(), json!(c.n_missing())))
        .collect();

    let document = json!({
        "analysis": {
            "title": title,
            "date_start": started.to_rfc3339(),
            "date_end": chrono::Utc::now().to_rfc3339(),
        },
        "table": table_section(table),
        "variables": Value::Object(variables_map),
        "correlations": {"pearson": correlations_json(&correlations)},
        "missing": {"bar": missing},
        "alerts": alerts,
        "sample": {"head": head_records(table)},
        "package": {
            "generator": "autolysis",
            "version": crate::VERSION,
        },
    });

    tracing::debug!(columns = table.n_columns(), rows = table.n_rows(), "profile built");
    document
}

/// `head`, `description` and `null_counts` overview
#[must_use]
pub fn basic_summary(table: &Table) -> Value {
    let head: Map<String, Value> = table
        .columns()
        .map(|column| {
            let rows: Map<String, Value> = column
                .cells()
                .iter()
                .take(HEAD_ROWS)
                .enumerate()
                .map(|(i, cell)| (i.to_string(), cell.to_json()))
                .collect();
            (column.name().to_string(), Value::Object(rows))
        })
        .collect();

    let description: Map<String, Value> = table
        .columns()
        .map(|column| (column.name().to_string(), describe_brief(column)))
        .collect();

    let null_counts: Map<String, Value> = table
        .columns()
        .map(|column| (column.name().to_string(), json!(column.n_missing())))
        .collect();

    json!({
        "head": head,
        "description": description,
        "null_counts": null_counts,
    })
}

fn table_section(table: &Table) -> Value {
    let n = table.n_rows();
    let n_var = table.n_columns();
    let cells_missing: usize = table.columns().map(Column::n_missing).sum();
    let total_cells = n * n_var;

    let mut types: IndexMap<&'static str, usize> = IndexMap::new();
    for column in table.columns() {
        *types.entry(column.kind().as_str()).or_insert(0) += 1;
    }

    let duplicates = duplicate_rows(table);

    json!({
        "n": n,
        "n_var": n_var,
        "memory_size": table.columns().map(Column::memory_size).sum::<usize>(),
        "n_cells_missing": cells_missing,
        "n_vars_with_missing": table.columns().filter(|c| c.n_missing() > 0).count(),
        "n_vars_all_missing": table.columns().filter(|c| n > 0 && c.n_missing() == n).count(),
        "p_cells_missing": ratio(cells_missing, total_cells),
        "types": types,
        "n_duplicates": duplicates,
        "p_duplicates": ratio(duplicates, n),
    })
}

fn duplicate_rows(table: &Table) -> usize {
    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(table.n_rows());
    let mut duplicates = 0;
    for index in 0..table.n_rows() {
        if let Some(row) = table.row(index) {
            let key: Vec<String> = row.into_iter().map(Cell::label).collect();
            if !seen.insert(key) {
                duplicates += 1;
            }
        }
    }
    duplicates
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Label counts of present cells, most frequent first
fn value_counts(column: &Column) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for cell in column.cells().iter().filter(|c| !c.is_missing()) {
        *counts.entry(cell.label()).or_insert(0) += 1;
    }
    counts.sort_by(|ka, va, kb, vb| vb.cmp(va).then_with(|| ka.cmp(kb)));
    counts
}

fn describe_variable(column: &Column) -> Value {
    let n = column.len();
    let n_missing = column.n_missing();
    let count = n - n_missing;
    let counts = value_counts(column);
    let n_distinct = counts.len();
    let n_unique = counts.values().filter(|c| **c == 1).count();

    let mut record = Map::new();
    record.insert("type".into(), json!(column.kind().as_str()));
    record.insert("n".into(), json!(n));
    record.insert("count".into(), json!(count));
    record.insert("n_missing".into(), json!(n_missing));
    record.insert("p_missing".into(), json!(ratio(n_missing, n)));
    record.insert("n_distinct".into(), json!(n_distinct));
    record.insert("p_distinct".into(), json!(ratio(n_distinct, count)));
    record.insert("is_unique".into(), json!(count > 0 && n_distinct == count));
    record.insert("n_unique".into(), json!(n_unique));
    record.insert("p_unique".into(), json!(ratio(n_unique, count)));
    record.insert("hashable".into(), json!(true));
    record.insert("ordering".into(), json!(column.kind() == ColumnKind::Numeric));
    record.insert("memory_size".into(), json!(column.memory_size()));
    record.insert(
        "first_rows".into(),
        Value::Object(
            column
                .cells()
                .iter()
                .take(HEAD_ROWS)
                .enumerate()
                .map(|(i, cell)| (i.to_string(), cell.to_json()))
                .collect(),
        ),
    );
    record.insert("value_counts_without_nan".into(), json!(counts));

    match column.kind() {
        ColumnKind::Numeric => describe_numeric(column, &mut record),
        ColumnKind::Categorical | ColumnKind::Boolean => describe_text(column, &mut record),
        ColumnKind::Empty => {}
    }
    Value::Object(record)
}

fn describe_numeric(column: &Column, record: &mut Map<String, Value>) {
    let values = column.numbers();
    let count = values.len();
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let sorted = stats::sorted(&finite);
    let mean = stats::mean(&finite);
    let std = stats::std_dev(&finite);

    let n_zeros = values.iter().filter(|v| **v == 0.0).count();
    let n_negative = values.iter().filter(|v| **v < 0.0).count();
    let n_infinite = count - finite.len();

    let min = sorted.first().copied();
    let max = sorted.last().copied();
    let q = |p: f64| stats::quantile_sorted(&sorted, p);

    record.insert("mean".into(), json!(mean));
    record.insert("std".into(), json!(std));
    record.insert("variance".into(), json!(stats::variance(&finite)));
    record.insert("min".into(), json!(min));
    record.insert("max".into(), json!(max));
    record.insert("sum".into(), json!(finite.iter().sum::<f64>()));
    record.insert("range".into(), json!(min.zip(max).map(|(lo, hi)| hi - lo)));
    for (label, p) in [("5%", 0.05), ("25%", 0.25), ("50%", 0.5), ("75%", 0.75), ("95%", 0.95)] {
        record.insert(label.into(), json!(q(p)));
    }
    record.insert("iqr".into(), json!(q(0.75).zip(q(0.25)).map(|(hi, lo)| hi - lo)));
    record.insert(
        "cv".into(),
        json!(std.zip(mean).and_then(|(s, m)| (m != 0.0).then(|| s / m))),
    );
    record.insert("mad".into(), json!(stats::mad(&finite)));
    record.insert("skewness".into(), json!(stats::skewness(&finite)));
    record.insert("kurtosis".into(), json!(stats::kurtosis(&finite)));
    record.insert("n_zeros".into(), json!(n_zeros));
    record.insert("p_zeros".into(), json!(ratio(n_zeros, column.len())));
    record.insert("n_negative".into(), json!(n_negative));
    record.insert("p_negative".into(), json!(ratio(n_negative, column.len())));
    record.insert("n_infinite".into(), json!(n_infinite));
    record.insert("p_infinite".into(), json!(ratio(n_infinite, column.len())));

    let increasing = values.windows(2).all(|w| w[0] <= w[1]);
    let decreasing = values.windows(2).all(|w| w[0] >= w[1]);
    let increasing_strict = values.windows(2).all(|w| w[0] < w[1]);
    let decreasing_strict = values.windows(2).all(|w| w[0] > w[1]);
    let monotonic = if increasing_strict || decreasing_strict {
        2
    } else if increasing || decreasing {
        1
    } else {
        0
    };
    record.insert("monotonic_increase".into(), json!(increasing));
    record.insert("monotonic_decrease".into(), json!(decreasing));
    record.insert("monotonic_increase_strict".into(), json!(increasing_strict));
    record.insert("monotonic_decrease_strict".into(), json!(decreasing_strict));
    record.insert("monotonic".into(), json!(monotonic));

    if let Some((edges, counts)) = stats::histogram(&finite, HISTOGRAM_BINS) {
        record.insert(
            "histogram".into(),
            json!({"bin_edges": edges, "counts": counts}),
        );
    }
}

fn describe_text(column: &Column, record: &mut Map<String, Value>) {
    let texts: Vec<String> = column
        .cells()
        .iter()
        .filter(|c| !c.is_missing())
        .map(Cell::label)
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let lengths: Vec<f64> = texts.iter().map(|t| t.chars().count() as f64).collect();
    let distinct_chars: HashSet<char> = texts.iter().flat_map(|t| t.chars()).collect();

    record.insert("max_length".into(), json!(lengths.iter().copied().reduce(f64::max)));
    record.insert("min_length".into(), json!(lengths.iter().copied().reduce(f64::min)));
    record.insert("mean_length".into(), json!(stats::mean(&lengths)));
    record.insert("median_length".into(), json!(stats::median(&lengths)));
    record.insert(
        "n_characters".into(),
        json!(texts.iter().map(|t| t.chars().count()).sum::<usize>()),
    );
    record.insert("n_characters_distinct".into(), json!(distinct_chars.len()));
}

/// Short `describe(include='all')` style record
fn describe_brief(column: &Column) -> Value {
    let count = column.len() - column.n_missing();
    if column.kind() == ColumnKind::Numeric {
        let values: Vec<f64> = column.numbers().into_iter().filter(|v| v.is_finite()).collect();
        let sorted = stats::sorted(&values);
        json!({
            "count": count,
            "mean": stats::mean(&values),
            "std": stats::std_dev(&values),
            "min": sorted.first(),
            "25%": stats::quantile_sorted(&sorted, 0.25),
            "50%": stats::quantile_sorted(&sorted, 0.5),
            "75%": stats::quantile_sorted(&sorted, 0.75),
            "max": sorted.last(),
        })
    } else {
        let counts = value_counts(column);
        let top = counts.first();
        json!({
            "count": count,
            "unique": counts.len(),
            "top": top.map(|(label, _)| label.clone()),
            "freq": top.map(|(_, freq)| *freq),
        })
    }
}

type Correlations = Vec<(String, String, f64)>;

fn correlation_matrix(columns: &[&Column]) -> Correlations {
    let numeric: Vec<&&Column> = columns
        .iter()
        .filter(|c| c.kind() == ColumnKind::Numeric)
        .collect();
    let mut pairs = Vec::new();
    for a in &numeric {
        for b in &numeric {
            let (xs, ys): (Vec<f64>, Vec<f64>) = a
                .cells()
                .iter()
                .zip(b.cells())
                .filter_map(|(x, y)| x.as_number().zip(y.as_number()))
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .unzip();
            if let Some(r) = stats::pearson(&xs, &ys) {
                pairs.push((a.name().to_string(), b.name().to_string(), r));
            }
        }
    }
    pairs
}

fn correlations_json(pairs: &Correlations) -> Value {
    let mut matrix: Map<String, Value> = Map::new();
    for (a, b, r) in pairs {
        let row = matrix
            .entry(a.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(row) = row {
            row.insert(b.clone(), json!(r));
        }
    }
    Value::Object(matrix)
}

fn collect_alerts(table: &Table, variables: &[(String, Value)], correlations: &Correlations) -> Vec<String> {
    let mut alerts = Vec::new();
    for (name, record) in variables {
        let get_f = |key: &str| record.get(key).and_then(Value::as_f64);
        let get_u = |key: &str| record.get(key).and_then(Value::as_u64);

        if let (Some(n_missing), Some(p_missing)) = (get_u("n_missing"), get_f("p_missing")) {
            if n_missing > 0 {
                alerts.push(format!(
                    "{name} has {n_missing} ({:.1}%) missing values",
                    p_missing * 100.0
                ));
            }
        }
        let n_distinct = get_u("n_distinct").unwrap_or(0);
        if n_distinct == 1 {
            let constant = record
                .get("first_rows")
                .and_then(Value::as_object)
                .and_then(|rows| rows.values().find(|v| !v.is_null()))
                .map(value_label)
                .unwrap_or_default();
            alerts.push(format!("{name} has constant value \"{constant}\""));
        } else if record.get("is_unique").and_then(Value::as_bool) == Some(true) && n_distinct > 1 {
            alerts.push(format!("{name} has unique values"));
        }
        if let Some(skew) = get_f("skewness") {
            if skew.abs() > SKEW_ALERT {
                alerts.push(format!("{name} is highly skewed (\u{3b3}1 = {skew:.2})"));
            }
        }
        if let (Some(n_zeros), Some(p_zeros)) = (get_u("n_zeros"), get_f("p_zeros")) {
            if p_zeros > ZEROS_ALERT {
                alerts.push(format!("{name} has {n_zeros} ({:.1}%) zeros", p_zeros * 100.0));
            }
        }
    }

    for (a, b, r) in correlations {
        if a < b && r.abs() > CORRELATION_ALERT {
            alerts.push(format!("{a} is highly overall correlated with {b}"));
        }
    }

    let duplicates = duplicate_rows(table);
    if duplicates > 0 {
        alerts.push(format!(
            "Dataset has {duplicates} ({:.1}%) duplicate rows",
            ratio(duplicates, table.n_rows()) * 100.0
        ));
    }
    alerts
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        other => other.to_string(),
    }
}

fn head_records(table: &Table) -> Vec<Value> {
    (0..table.n_rows().min(HEAD_ROWS))
        .filter_map(|index| table.row(index))
        .map(|row| {
            let record: Map<String, Value> = table
                .column_names()
                .zip(row)
                .map(|(name, cell)| (name.to_string(), cell.to_json()))
                .collect();
            Value::Object(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(vec![
            Column::numeric("age", [30.0, 40.0, 50.0, 0.0]),
            Column::new(
                "city",
                vec![
                    Cell::Text("Oslo".into()),
                    Cell::Text("Rome".into()),
                    Cell::Missing,
                    Cell::Text("Oslo".into()),
                ],
            ),
            Column::numeric("twice", [60.0, 80.0, 100.0, 0.0]),
        ])
        .unwrap()
    }

    #[test]
    fn document_has_expected_sections() {
        let doc = profile_document(&sample_table(), "Test");
        for section in ["analysis", "table", "variables", "correlations", "missing", "alerts", "sample", "package"] {
            assert!(doc.get(section).is_some(), "missing section {section}");
        }
        assert_eq!(doc["table"]["n"], 4);
        assert_eq!(doc["table"]["n_var"], 3);
        assert_eq!(doc["table"]["types"]["Numeric"], 2);
    }

    #[test]
    fn variables_keep_column_order_and_stats() {
        let doc = profile_document(&sample_table(), "Test");
        let names: Vec<_> = doc["variables"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["age", "city", "twice"]);

        let age = &doc["variables"]["age"];
        assert_eq!(age["type"], "Numeric");
        assert_eq!(age["mean"], 30.0);
        assert_eq!(age["n_zeros"], 1);
        assert!(age.get("histogram").is_some());

        let city = &doc["variables"]["city"];
        assert_eq!(city["n_missing"], 1);
        assert_eq!(city["n_distinct"], 2);
        assert_eq!(city["max_length"], 4.0);
        assert_eq!(city["value_counts_without_nan"]["Oslo"], 2);
    }

    #[test]
    fn alerts_mention_missing_zeros_and_correlation() {
        let doc = profile_document(&sample_table(), "Test");
        let alerts: Vec<String> = doc["alerts"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a.as_str().map(str::to_string))
            .collect();
        assert!(alerts.iter().any(|a| a == "city has 1 (25.0%) missing values"));
        assert!(alerts.iter().any(|a| a == "age has 1 (25.0%) zeros"));
        assert!(alerts.iter().any(|a| a == "age is highly overall correlated with twice"));
    }

    #[test]
    fn basic_summary_shape() {
        let summary = basic_summary(&sample_table());
        assert_eq!(summary["head"]["age"]["0"], 30.0);
        assert_eq!(summary["null_counts"]["city"], 1);
        assert_eq!(summary["description"]["city"]["top"], "Oslo");
        assert_eq!(summary["description"]["age"]["count"], 4);
    }

    #[test]
    fn duplicate_rows_counted() {
        let table = Table::new(vec![Column::numeric("a", [1.0, 1.0, 2.0])]).unwrap();
        let doc = profile_document(&table, "dup");
        assert_eq!(doc["table"]["n_duplicates"], 1);
    }
}
