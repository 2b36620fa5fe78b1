//! Typed in-memory table
//!
//! Columns keep insertion order; every column has the same row count.

use crate::error::TableError;
use indexmap::IndexMap;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Tokens read as missing values
const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "#n/a"];

/// One cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
    /// Absent value
    Missing,
}

impl Cell {
    /// Parse a raw CSV field
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
        {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if !number.is_nan() => Self::Number(number),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    /// Numeric value, if any
    #[inline]
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text value, if any
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the cell is absent
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Display label used for categories and dictionary keys
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::Missing => "NaN".to_string(),
        }
    }

    /// JSON representation
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Missing => serde_json::Value::Null,
        }
    }

    /// Approximate in-memory footprint in bytes
    fn footprint(&self) -> usize {
        match self {
            Self::Number(_) | Self::Missing => 8,
            Self::Text(s) => 24 + s.len(),
        }
    }
}

/// Integral floats print without a fractional part
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Inferred column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnKind {
    /// All present values are numbers
    Numeric,
    /// All present values are `true` / `false`
    Boolean,
    /// Free text or mixed values
    Categorical,
    /// No present values
    Empty,
}

impl ColumnKind {
    /// Profile type name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::Boolean => "Boolean",
            Self::Categorical => "Categorical",
            Self::Empty => "Unsupported",
        }
    }

    fn infer(cells: &[Cell]) -> Self {
        let mut present = cells.iter().filter(|c| !c.is_missing()).peekable();
        if present.peek().is_none() {
            return Self::Empty;
        }
        let mut numeric = true;
        let mut boolean = true;
        for cell in present {
            match cell {
                Cell::Number(_) => boolean = false,
                Cell::Text(s) => {
                    numeric = false;
                    if !(s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")) {
                        boolean = false;
                    }
                }
                Cell::Missing => {}
            }
        }
        if numeric {
            Self::Numeric
        } else if boolean {
            Self::Boolean
        } else {
            Self::Categorical
        }
    }
}

/// One named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    cells: Vec<Cell>,
    kind: ColumnKind,
}

impl Column {
    /// Create column, inferring its kind
    #[must_use]
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        let kind = ColumnKind::infer(&cells);
        Self {
            name: name.into(),
            cells,
            kind,
        }
    }

    /// Numeric column from plain values
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(name, values.into_iter().map(Cell::Number).collect())
    }

    /// Text column from plain values
    #[must_use]
    pub fn text<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(name, values.into_iter().map(|s| Cell::Text(s.into())).collect())
    }

    /// Column name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cells in row order
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Inferred kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    /// Row count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the column has no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Count of missing cells
    #[must_use]
    pub fn n_missing(&self) -> usize {
        self.cells.iter().filter(|c| c.is_missing()).count()
    }

    /// Present numeric values in row order
    #[must_use]
    pub fn numbers(&self) -> Vec<f64> {
        self.cells.iter().filter_map(Cell::as_number).collect()
    }

    /// Approximate in-memory footprint in bytes
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.cells.iter().map(Cell::footprint).sum()
    }
}

/// Ordered collection of equally long columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: IndexMap<String, Column>,
    n_rows: usize,
}

impl Table {
    /// Build table from columns
    ///
    /// # Errors
    /// `Shape` if column lengths differ or names repeat.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let n_rows = columns.first().map_or(0, Column::len);
        let mut map = IndexMap::with_capacity(columns.len());
        for column in columns {
            if column.len() != n_rows {
                return Err(TableError::Shape(format!(
                    "column '{}' has {} rows, expected {n_rows}",
                    column.name,
                    column.len()
                )));
            }
            if map.contains_key(&column.name) {
                return Err(TableError::Shape(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            map.insert(column.name.clone(), column);
        }
        Ok(Self { columns: map, n_rows })
    }

    /// Load a CSV file with a header row
    ///
    /// # Errors
    /// `NotFound` if the path does not exist, `Csv`/`Io` on read failure.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TableError::NotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path).map_err(|e| TableError::io_error(path, e))?;
        let table = Self::from_csv_reader(file, path)?;
        tracing::info!(
            path = %path.display(),
            rows = table.n_rows(),
            columns = table.n_columns(),
            "dataset loaded"
        );
        Ok(table)
    }

    /// Load CSV from any reader; `origin` names the source in errors
    ///
    /// # Errors
    /// `Csv` on malformed content.
    pub fn from_csv_reader<R: Read>(reader: R, origin: impl AsRef<Path>) -> Result<Self, TableError> {
        let origin = origin.as_ref();
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| TableError::csv(origin, e))?
            .clone();
        let names = dedupe_names(headers.iter());
        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];

        for record in csv_reader.records() {
            let record = record.map_err(|e| TableError::csv(origin, e))?;
            for (slot, field) in cells.iter_mut().zip(record.iter()) {
                slot.push(Cell::parse(field));
            }
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| Column::new(name, cells))
            .collect();
        Self::new(columns)
    }

    /// Column by name
    #[inline]
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns in order
    pub fn columns(&self) -> impl ExactSizeIterator<Item = &Column> {
        self.columns.values()
    }

    /// Column names in order
    pub fn column_names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Row count
    #[inline]
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Column count
    #[inline]
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Cells of one row in column order
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        (index < self.n_rows).then(|| self.columns.values().map(|c| &c.cells[index]).collect())
    }
}

/// Repeated header names get `.1`, `.2`, ... suffixes
fn dedupe_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: IndexMap<String, usize> = IndexMap::new();
    let mut names = Vec::new();
    for header in headers {
        let base = header.trim().to_string();
        let count = seen.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            base
        } else {
            format!("{base}.{count}")
        };
        *count += 1;
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cell_parse_variants() {
        assert_eq!(Cell::parse(" 3.5 "), Cell::Number(3.5));
        assert_eq!(Cell::parse(""), Cell::Missing);
        assert_eq!(Cell::parse("NA"), Cell::Missing);
        assert_eq!(Cell::parse("nan"), Cell::Missing);
        assert_eq!(Cell::parse("hello"), Cell::Text("hello".to_string()));
        assert_eq!(Cell::parse("inf"), Cell::Number(f64::INFINITY));
    }

    #[test]
    fn kind_inference() {
        assert_eq!(Column::numeric("a", [1.0, 2.0]).kind(), ColumnKind::Numeric);
        assert_eq!(Column::text("b", ["x", "y"]).kind(), ColumnKind::Categorical);
        assert_eq!(Column::text("c", ["True", "false"]).kind(), ColumnKind::Boolean);
        assert_eq!(Column::new("d", vec![Cell::Missing]).kind(), ColumnKind::Empty);
    }

    #[test]
    fn csv_loading() {
        let csv = "age,name,score\n30,ann,1.5\n,bob,\n41,cy,2\n";
        let table = Table::from_csv_reader(csv.as_bytes(), "inline.csv").unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["age", "name", "score"]);
        let age = table.column("age").unwrap();
        assert_eq!(age.kind(), ColumnKind::Numeric);
        assert_eq!(age.n_missing(), 1);
        assert_eq!(age.numbers(), vec![30.0, 41.0]);
    }

    #[test]
    fn duplicate_headers_renamed() {
        let csv = "a,a,b\n1,2,3\n";
        let table = Table::from_csv_reader(csv.as_bytes(), "dup.csv").unwrap();
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a", "a.1", "b"]);
    }

    #[test]
    fn ragged_csv_rejected() {
        let csv = "a,b\n1,2\n3\n";
        let err = Table::from_csv_reader(csv.as_bytes(), "ragged.csv").unwrap_err();
        assert!(matches!(err, TableError::Csv { .. }));
    }

    #[test]
    fn csv_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,flag\nann,true\nbob,FALSE\n").unwrap();

        let table = Table::from_csv_path(&path).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column("flag").unwrap().kind(), ColumnKind::Boolean);
        assert_eq!(table.row(1).unwrap()[0], &Cell::Text("bob".to_string()));
        assert!(table.row(2).is_none());
    }

    #[test]
    fn missing_file_reported() {
        let err = Table::from_csv_path("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, TableError::NotFound(_)));
    }

    #[test]
    fn mismatched_columns_rejected() {
        let err = Table::new(vec![
            Column::numeric("a", [1.0]),
            Column::numeric("b", [1.0, 2.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::Shape(_)));
    }

    #[test]
    fn number_labels() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(Cell::Missing.label(), "NaN");
    }
}
