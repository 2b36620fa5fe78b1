//! Column-oriented data seen by snippets as `data` / `df`
//!
//! Frames are immutable: every operation returns a new value. Row labels are
//! strings; frames built from a table label rows `"0"`, `"1"`, ...

use crate::error::SnippetError;
use autolysis_table::{format_number, stats, Cell, Table};
use std::cmp::Ordering;
use std::sync::Arc;

/// Total order used for sorting: numbers, then text, then missing
pub(crate) fn cmp_cells(a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (Cell::Number(x), Cell::Number(y)) => x.total_cmp(y),
        (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
        (Cell::Number(_), Cell::Text(_)) => Ordering::Less,
        (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
        (Cell::Missing, Cell::Missing) => Ordering::Equal,
        (Cell::Missing, _) => Ordering::Greater,
        (_, Cell::Missing) => Ordering::Less,
    }
}

fn default_labels(n: usize) -> Vec<String> {
    (0..n).map(|i| i.to_string()).collect()
}

fn is_numeric(cells: &[Cell]) -> bool {
    cells.iter().all(|c| !matches!(c, Cell::Text(_)))
}

/// Aggregations shared by series, frames and groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reduction {
    Mean,
    Sum,
    Count,
    Size,
    Min,
    Max,
    Median,
    Std,
}

impl Reduction {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "mean" | "average" => Self::Mean,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "size" => Self::Size,
            "min" => Self::Min,
            "max" => Self::Max,
            "median" => Self::Median,
            "std" => Self::Std,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Size => "size",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
        }
    }

    /// Only defined over numeric values
    pub(crate) fn numeric_only(self) -> bool {
        matches!(self, Self::Mean | Self::Sum | Self::Median | Self::Std)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn apply(self, cells: &[Cell]) -> Cell {
        let numbers: Vec<f64> = cells.iter().filter_map(Cell::as_number).collect();
        let number = |v: Option<f64>| v.map_or(Cell::Missing, Cell::Number);
        match self {
            Self::Count => Cell::Number(cells.iter().filter(|c| !c.is_missing()).count() as f64),
            Self::Size => Cell::Number(cells.len() as f64),
            Self::Mean => number(stats::mean(&numbers)),
            Self::Sum => Cell::Number(numbers.iter().sum()),
            Self::Median => number(stats::median(&numbers)),
            Self::Std => number(stats::std_dev(&numbers)),
            Self::Min | Self::Max => {
                let present = cells.iter().filter(|c| !c.is_missing());
                let pick = if self == Self::Min {
                    present.min_by(|a, b| cmp_cells(a, b))
                } else {
                    present.max_by(|a, b| cmp_cells(a, b))
                };
                pick.cloned().unwrap_or(Cell::Missing)
            }
        }
    }
}

/// Labelled one-dimensional data
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Series {
    pub(crate) name: Option<String>,
    pub(crate) index_name: Option<String>,
    pub(crate) labels: Vec<String>,
    pub(crate) cells: Vec<Cell>,
}

impl Series {
    pub(crate) fn new(name: Option<String>, labels: Vec<String>, cells: Vec<Cell>) -> Self {
        Self {
            name,
            index_name: None,
            labels,
            cells,
        }
    }

    pub(crate) fn with_index_name(mut self, index_name: Option<String>) -> Self {
        self.index_name = index_name;
        self
    }

    /// Series with default positional labels
    pub(crate) fn from_cells(name: Option<String>, cells: Vec<Cell>) -> Self {
        Self::new(name, default_labels(cells.len()), cells)
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn is_numeric(&self) -> bool {
        is_numeric(&self.cells)
    }

    /// Cells as floats, missing and text as NaN
    pub(crate) fn floats(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|c| c.as_number().unwrap_or(f64::NAN))
            .collect()
    }

    pub(crate) fn take(&self, rows: &[usize]) -> Self {
        Self::new(
            self.name.clone(),
            rows.iter().map(|&i| self.labels[i].clone()).collect(),
            rows.iter().map(|&i| self.cells[i].clone()).collect(),
        )
        .with_index_name(self.index_name.clone())
    }

    pub(crate) fn dropna(&self) -> Self {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| !self.cells[i].is_missing()).collect();
        self.take(&rows)
    }

    pub(crate) fn head(&self, n: usize) -> Self {
        let rows: Vec<usize> = (0..self.len().min(n)).collect();
        self.take(&rows)
    }

    pub(crate) fn tail(&self, n: usize) -> Self {
        let rows: Vec<usize> = (self.len().saturating_sub(n)..self.len()).collect();
        self.take(&rows)
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> Self {
        let rows: Vec<usize> = (start.min(self.len())..end.min(self.len())).collect();
        self.take(&rows)
    }

    pub(crate) fn filter(&self, mask: &[bool]) -> Result<Self, SnippetError> {
        if mask.len() != self.len() {
            return Err(SnippetError::value_error(format!(
                "boolean mask of length {} does not match length {}",
                mask.len(),
                self.len()
            )));
        }
        let rows: Vec<usize> = (0..self.len()).filter(|&i| mask[i]).collect();
        Ok(self.take(&rows))
    }

    /// Counts per distinct value, most frequent first, ties in first-seen order
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn value_counts(&self) -> Self {
        let mut counts: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
        for cell in self.cells.iter().filter(|c| !c.is_missing()) {
            *counts.entry(cell.label()).or_insert(0) += 1;
        }
        let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        let (labels, cells) = entries
            .into_iter()
            .map(|(label, count)| (label, Cell::Number(count as f64)))
            .unzip();
        Self::new(Some("count".to_string()), labels, cells).with_index_name(self.name.clone())
    }

    pub(crate) fn sort_values(&self, ascending: bool) -> Self {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.sort_by(|&a, &b| {
            let (x, y) = (&self.cells[a], &self.cells[b]);
            directed(cmp_cells(x, y), ascending, x, y)
        });
        self.take(&rows)
    }

    pub(crate) fn sort_index(&self, ascending: bool) -> Self {
        let mut rows: Vec<usize> = (0..self.len()).collect();
        rows.sort_by(|&a, &b| {
            let (la, lb) = (Cell::parse(&self.labels[a]), Cell::parse(&self.labels[b]));
            let order = cmp_cells(&la, &lb);
            if ascending {
                order
            } else {
                order.reverse()
            }
        });
        self.take(&rows)
    }

    pub(crate) fn nlargest(&self, n: usize, largest: bool) -> Self {
        let present = self.dropna();
        present.sort_values(!largest).head(n)
    }

    pub(crate) fn reduce(&self, reduction: Reduction) -> Result<Cell, SnippetError> {
        if reduction.numeric_only() && !self.is_numeric() {
            return Err(SnippetError::type_error(format!(
                "cannot compute {} of non-numeric series",
                reduction.name()
            )));
        }
        Ok(reduction.apply(&self.cells))
    }

    /// Distinct present values in first-seen order
    pub(crate) fn unique(&self) -> Vec<Cell> {
        let mut seen = std::collections::HashSet::new();
        self.cells
            .iter()
            .filter(|c| !c.is_missing())
            .filter(|c| seen.insert(c.label()))
            .cloned()
            .collect()
    }

    pub(crate) fn isnull(&self) -> Self {
        self.map_cells(|c| Cell::Number(if c.is_missing() { 1.0 } else { 0.0 }))
    }

    pub(crate) fn map_cells(&self, f: impl FnMut(&Cell) -> Cell) -> Self {
        Self::new(
            self.name.clone(),
            self.labels.clone(),
            self.cells.iter().map(f).collect(),
        )
        .with_index_name(self.index_name.clone())
    }

    /// Element-wise numeric transform; text stays text
    pub(crate) fn map_numbers(&self, f: impl Fn(f64) -> f64) -> Self {
        self.map_cells(|c| match c {
            Cell::Number(n) => Cell::Number(f(*n)),
            other => other.clone(),
        })
    }

    pub(crate) fn cumsum(&self) -> Self {
        let mut total = 0.0;
        self.map_cells(|c| match c {
            Cell::Number(n) => {
                total += n;
                Cell::Number(total)
            }
            other => other.clone(),
        })
    }

    /// Element-wise combination with another aligned series
    pub(crate) fn zip_numbers(
        &self,
        other: &Self,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, SnippetError> {
        if other.len() != self.len() {
            return Err(SnippetError::value_error(format!(
                "operands have lengths {} and {}",
                self.len(),
                other.len()
            )));
        }
        let cells = self
            .cells
            .iter()
            .zip(&other.cells)
            .map(|(a, b)| match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Cell::Number(f(x, y)),
                _ => Cell::Missing,
            })
            .collect();
        Ok(Self::new(self.name.clone(), self.labels.clone(), cells).with_index_name(self.index_name.clone()))
    }
}

impl Series {
    /// Frame with the index as a leading column
    pub(crate) fn reset_index(&self) -> Frame {
        let index_name = self.index_name.clone().unwrap_or_else(|| "index".to_string());
        let value_name = self.name.clone().unwrap_or_else(|| "0".to_string());
        Frame {
            index_name: None,
            labels: default_labels(self.len()),
            names: vec![index_name, value_name],
            columns: vec![
                self.labels.iter().map(|l| Cell::parse(l)).collect(),
                self.cells.clone(),
            ],
        }
    }
}

fn directed(order: Ordering, ascending: bool, a: &Cell, b: &Cell) -> Ordering {
    // missing values stay last in both directions
    match (a.is_missing(), b.is_missing()) {
        (false, false) if !ascending => order.reverse(),
        _ => order,
    }
}

/// Labelled two-dimensional data
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub(crate) index_name: Option<String>,
    pub(crate) labels: Vec<String>,
    pub(crate) names: Vec<String>,
    pub(crate) columns: Vec<Vec<Cell>>,
}

impl Frame {
    pub(crate) fn from_table(table: &Table) -> Self {
        Self {
            index_name: None,
            labels: default_labels(table.n_rows()),
            names: table.column_names().map(str::to_string).collect(),
            columns: table.columns().map(|c| c.cells().to_vec()).collect(),
        }
    }

    /// Frame from aligned series; labels come from the first one
    pub(crate) fn from_series(series: Vec<Series>) -> Self {
        let labels = series.first().map(|s| s.labels.clone()).unwrap_or_default();
        let names = series
            .iter()
            .enumerate()
            .map(|(i, s)| s.name.clone().unwrap_or_else(|| i.to_string()))
            .collect();
        let index_name = series.first().and_then(|s| s.index_name.clone());
        let columns = series.into_iter().map(|s| s.cells).collect();
        Self {
            index_name,
            labels,
            names,
            columns,
        }
    }

    /// Frame from named columns of equal length
    pub(crate) fn from_columns(names: Vec<String>, columns: Vec<Vec<Cell>>) -> Result<Self, SnippetError> {
        let n = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != n) {
            return Err(SnippetError::value_error("all arrays must be of the same length"));
        }
        Ok(Self {
            index_name: None,
            labels: default_labels(n),
            names,
            columns,
        })
    }

    pub(crate) fn n_rows(&self) -> usize {
        self.labels.len()
    }

    /// Move the index into a leading column
    pub(crate) fn reset_index(&self) -> Self {
        let mut names = vec![self.index_name.clone().unwrap_or_else(|| "index".to_string())];
        names.extend(self.names.iter().cloned());
        let mut columns = vec![self.labels.iter().map(|l| Cell::parse(l)).collect::<Vec<_>>()];
        columns.extend(self.columns.iter().cloned());
        Self {
            index_name: None,
            labels: default_labels(self.n_rows()),
            names,
            columns,
        }
    }

    /// Use a column as the index
    pub(crate) fn set_index(&self, name: &str) -> Result<Self, SnippetError> {
        let key = self.position(name)?;
        let keep: Vec<usize> = (0..self.n_columns()).filter(|&i| i != key).collect();
        let mut frame = self.project(&keep);
        frame.labels = self.columns[key].iter().map(cell_text).collect();
        frame.index_name = Some(name.to_string());
        Ok(frame)
    }

    pub(crate) fn drop_columns(&self, names: &[String]) -> Result<Self, SnippetError> {
        for name in names {
            self.position(name)?;
        }
        let keep: Vec<usize> = (0..self.n_columns())
            .filter(|&i| !names.contains(&self.names[i]))
            .collect();
        Ok(self.project(&keep))
    }

    pub(crate) fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn position(&self, name: &str) -> Result<usize, SnippetError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SnippetError::Key(format!("'{name}'")))
    }

    pub(crate) fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub(crate) fn column(&self, name: &str) -> Result<Series, SnippetError> {
        let i = self.position(name)?;
        Ok(Series::new(
            Some(name.to_string()),
            self.labels.clone(),
            self.columns[i].clone(),
        ))
    }

    pub(crate) fn is_numeric_column(&self, i: usize) -> bool {
        let cells = &self.columns[i];
        is_numeric(cells) && cells.iter().any(|c| !c.is_missing())
    }

    pub(crate) fn select(&self, names: &[String]) -> Result<Self, SnippetError> {
        let positions = names
            .iter()
            .map(|n| self.position(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.project(&positions))
    }

    fn project(&self, positions: &[usize]) -> Self {
        Self {
            index_name: self.index_name.clone(),
            labels: self.labels.clone(),
            names: positions.iter().map(|&i| self.names[i].clone()).collect(),
            columns: positions.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    pub(crate) fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index_name: self.index_name.clone(),
            labels: rows.iter().map(|&r| self.labels[r].clone()).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r].clone()).collect())
                .collect(),
        }
    }

    pub(crate) fn filter(&self, mask: &[bool]) -> Result<Self, SnippetError> {
        if mask.len() != self.n_rows() {
            return Err(SnippetError::value_error(format!(
                "boolean mask of length {} does not match {} rows",
                mask.len(),
                self.n_rows()
            )));
        }
        let rows: Vec<usize> = (0..self.n_rows()).filter(|&r| mask[r]).collect();
        Ok(self.take_rows(&rows))
    }

    pub(crate) fn dropna(&self, subset: Option<&[String]>) -> Result<Self, SnippetError> {
        let checked: Vec<usize> = match subset {
            Some(names) => names
                .iter()
                .map(|n| self.position(n))
                .collect::<Result<_, _>>()?,
            None => (0..self.n_columns()).collect(),
        };
        let rows: Vec<usize> = (0..self.n_rows())
            .filter(|&r| checked.iter().all(|&c| !self.columns[c][r].is_missing()))
            .collect();
        Ok(self.take_rows(&rows))
    }

    pub(crate) fn head(&self, n: usize) -> Self {
        let rows: Vec<usize> = (0..self.n_rows().min(n)).collect();
        self.take_rows(&rows)
    }

    pub(crate) fn tail(&self, n: usize) -> Self {
        let rows: Vec<usize> = (self.n_rows().saturating_sub(n)..self.n_rows()).collect();
        self.take_rows(&rows)
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> Self {
        let rows: Vec<usize> = (start.min(self.n_rows())..end.min(self.n_rows())).collect();
        self.take_rows(&rows)
    }

    pub(crate) fn sort_values(&self, by: &[String], ascending: bool) -> Result<Self, SnippetError> {
        let keys = by
            .iter()
            .map(|n| self.position(n))
            .collect::<Result<Vec<_>, _>>()?;
        let mut rows: Vec<usize> = (0..self.n_rows()).collect();
        rows.sort_by(|&a, &b| {
            keys.iter()
                .map(|&k| {
                    let (x, y) = (&self.columns[k][a], &self.columns[k][b]);
                    directed(cmp_cells(x, y), ascending, x, y)
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(self.take_rows(&rows))
    }

    /// One value per column, labelled by column name
    pub(crate) fn reduce(&self, reduction: Reduction) -> Series {
        let (labels, cells) = (0..self.n_columns())
            .filter(|&i| !reduction.numeric_only() || self.is_numeric_column(i))
            .map(|i| (self.names[i].clone(), reduction.apply(&self.columns[i])))
            .unzip();
        Series::new(Some(reduction.name().to_string()), labels, cells)
    }

    /// Pairwise Pearson correlation of numeric columns
    pub(crate) fn corr(&self) -> Self {
        let numeric: Vec<usize> = (0..self.n_columns())
            .filter(|&i| self.is_numeric_column(i))
            .collect();
        let names: Vec<String> = numeric.iter().map(|&i| self.names[i].clone()).collect();
        let columns = numeric
            .iter()
            .map(|&a| {
                numeric
                    .iter()
                    .map(|&b| {
                        let (xs, ys): (Vec<f64>, Vec<f64>) = self.columns[a]
                            .iter()
                            .zip(&self.columns[b])
                            .filter_map(|(x, y)| x.as_number().zip(y.as_number()))
                            .filter(|(x, y)| x.is_finite() && y.is_finite())
                            .unzip();
                        stats::pearson(&xs, &ys).map_or(Cell::Missing, Cell::Number)
                    })
                    .collect()
            })
            .collect();
        Self {
            index_name: None,
            labels: names.clone(),
            names,
            columns,
        }
    }

    /// Keep columns whose kind matches one of the pandas dtype names
    pub(crate) fn select_dtypes(&self, include: &[String]) -> Result<Self, SnippetError> {
        let mut want_numeric = false;
        let mut want_text = false;
        for dtype in include {
            match dtype.as_str() {
                "number" | "numeric" | "int" | "int64" | "float" | "float64" => want_numeric = true,
                "object" | "category" | "string" | "str" | "bool" => want_text = true,
                other => {
                    return Err(SnippetError::type_error(format!("data type '{other}' not understood")))
                }
            }
        }
        let positions: Vec<usize> = (0..self.n_columns())
            .filter(|&i| {
                let numeric = self.is_numeric_column(i);
                (want_numeric && numeric) || (want_text && !numeric)
            })
            .collect();
        Ok(self.project(&positions))
    }

    pub(crate) fn isnull(&self) -> Self {
        Self {
            index_name: self.index_name.clone(),
            labels: self.labels.clone(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| {
                    col.iter()
                        .map(|c| Cell::Number(if c.is_missing() { 1.0 } else { 0.0 }))
                        .collect()
                })
                .collect(),
        }
    }

    /// Rows as cell vectors in column order
    pub(crate) fn rows(&self) -> Vec<Vec<Cell>> {
        (0..self.n_rows())
            .map(|r| self.columns.iter().map(|c| c[r].clone()).collect())
            .collect()
    }

    /// Numeric columns as rows of floats, used for heatmaps
    pub(crate) fn matrix(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows())
            .map(|r| {
                self.columns
                    .iter()
                    .map(|c| c[r].as_number().unwrap_or(f64::NAN))
                    .collect()
            })
            .collect()
    }
}

/// Column selection after `groupby(...)`
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    All,
    Column(String),
    Columns(Vec<String>),
}

/// Result of aggregating a group
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Aggregate {
    Series(Series),
    Frame(Frame),
}

/// Pending `groupby` over one key column
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupBy {
    pub(crate) frame: Arc<Frame>,
    pub(crate) key: String,
    pub(crate) selection: Selection,
}

impl GroupBy {
    pub(crate) fn new(frame: Arc<Frame>, key: String) -> Result<Self, SnippetError> {
        frame.position(&key)?;
        Ok(Self {
            frame,
            key,
            selection: Selection::All,
        })
    }

    pub(crate) fn select(&self, selection: Selection) -> Result<Self, SnippetError> {
        match &selection {
            Selection::Column(name) => {
                self.frame.position(name)?;
            }
            Selection::Columns(names) => {
                for name in names {
                    self.frame.position(name)?;
                }
            }
            Selection::All => {}
        }
        Ok(Self {
            frame: Arc::clone(&self.frame),
            key: self.key.clone(),
            selection,
        })
    }

    /// Row indices per group, groups sorted by key; missing keys dropped
    fn groups(&self) -> Result<Vec<(Cell, Vec<usize>)>, SnippetError> {
        let key = self.frame.position(&self.key)?;
        let mut groups: indexmap::IndexMap<String, (Cell, Vec<usize>)> = indexmap::IndexMap::new();
        for (row, cell) in self.frame.columns[key].iter().enumerate() {
            if cell.is_missing() {
                continue;
            }
            groups
                .entry(cell.label())
                .or_insert_with(|| (cell.clone(), Vec::new()))
                .1
                .push(row);
        }
        let mut groups: Vec<(Cell, Vec<usize>)> = groups.into_values().collect();
        groups.sort_by(|a, b| cmp_cells(&a.0, &b.0));
        Ok(groups)
    }

    pub(crate) fn aggregate(&self, reduction: Reduction) -> Result<Aggregate, SnippetError> {
        let groups = self.groups()?;
        let labels: Vec<String> = groups.iter().map(|(k, _)| k.label()).collect();

        if reduction == Reduction::Size {
            #[allow(clippy::cast_precision_loss)]
            let cells = groups
                .iter()
                .map(|(_, rows)| Cell::Number(rows.len() as f64))
                .collect();
            return Ok(Aggregate::Series(
                Series::new(Some("size".to_string()), labels, cells)
                    .with_index_name(Some(self.key.clone())),
            ));
        }

        let aggregate_column = |i: usize| -> Vec<Cell> {
            groups
                .iter()
                .map(|(_, rows)| {
                    let cells: Vec<Cell> = rows.iter().map(|&r| self.frame.columns[i][r].clone()).collect();
                    reduction.apply(&cells)
                })
                .collect()
        };

        match &self.selection {
            Selection::Column(name) => {
                let i = self.frame.position(name)?;
                if reduction.numeric_only() && !self.frame.is_numeric_column(i) {
                    return Err(SnippetError::type_error(format!(
                        "cannot compute {} of non-numeric column '{name}'",
                        reduction.name()
                    )));
                }
                Ok(Aggregate::Series(
                    Series::new(Some(name.clone()), labels, aggregate_column(i))
                        .with_index_name(Some(self.key.clone())),
                ))
            }
            selection => {
                let names: Vec<String> = match selection {
                    Selection::Columns(names) => names.clone(),
                    _ => self
                        .frame
                        .names
                        .iter()
                        .filter(|n| **n != self.key)
                        .cloned()
                        .collect(),
                };
                let mut out_names = Vec::new();
                let mut columns = Vec::new();
                for name in names {
                    let i = self.frame.position(&name)?;
                    if reduction.numeric_only() && !self.frame.is_numeric_column(i) {
                        continue;
                    }
                    columns.push(aggregate_column(i));
                    out_names.push(name);
                }
                Ok(Aggregate::Frame(Frame {
                    index_name: Some(self.key.clone()),
                    labels,
                    names: out_names,
                    columns,
                }))
            }
        }
    }
}

/// Display form of a label-like cell
pub(crate) fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Number(n) => format_number(*n),
        Cell::Text(s) => s.clone(),
        Cell::Missing => "nan".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolysis_table::Column;

    fn frame() -> Frame {
        let table = Table::new(vec![
            Column::text("city", ["Oslo", "Rome", "Oslo", "Lima"]),
            Column::new(
                "temp",
                vec![Cell::Number(4.0), Cell::Number(20.0), Cell::Missing, Cell::Number(18.0)],
            ),
            Column::numeric("rain", [10.0, 2.0, 12.0, 1.0]),
        ])
        .unwrap();
        Frame::from_table(&table)
    }

    #[test]
    fn column_and_dropna() {
        let temp = frame().column("temp").unwrap();
        assert_eq!(temp.len(), 4);
        let present = temp.dropna();
        assert_eq!(present.labels, vec!["0", "1", "3"]);
        assert!(frame().column("nope").is_err());
    }

    #[test]
    fn value_counts_order() {
        let counts = frame().column("city").unwrap().value_counts();
        assert_eq!(counts.labels, vec!["Oslo", "Rome", "Lima"]);
        assert_eq!(counts.cells[0], Cell::Number(2.0));
    }

    #[test]
    fn reductions() {
        let means = frame().reduce(Reduction::Mean);
        assert_eq!(means.labels, vec!["temp", "rain"]);
        assert_eq!(means.cells[0], Cell::Number(14.0));
        let counts = frame().reduce(Reduction::Count);
        assert_eq!(counts.cells, vec![Cell::Number(4.0), Cell::Number(3.0), Cell::Number(4.0)]);
        assert!(frame().column("city").unwrap().reduce(Reduction::Mean).is_err());
    }

    #[test]
    fn groupby_mean_sorted_by_key() {
        let grouped = GroupBy::new(Arc::new(frame()), "city".into())
            .unwrap()
            .select(Selection::Column("rain".into()))
            .unwrap();
        let Aggregate::Series(series) = grouped.aggregate(Reduction::Mean).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(series.labels, vec!["Lima", "Oslo", "Rome"]);
        assert_eq!(series.cells, vec![Cell::Number(1.0), Cell::Number(11.0), Cell::Number(2.0)]);
    }

    #[test]
    fn sort_keeps_missing_last() {
        let sorted = frame().sort_values(&["temp".to_string()], false).unwrap();
        assert_eq!(sorted.labels, vec!["1", "3", "0", "2"]);
    }

    #[test]
    fn corr_is_square() {
        let corr = frame().corr();
        assert_eq!(corr.names, vec!["temp", "rain"]);
        assert_eq!(corr.labels, corr.names);
        assert_eq!(corr.matrix().len(), 2);
    }

    #[test]
    fn select_dtypes_splits_kinds() {
        let numbers = frame().select_dtypes(&["number".into()]).unwrap();
        assert_eq!(numbers.names, vec!["temp", "rain"]);
        let objects = frame().select_dtypes(&["object".into()]).unwrap();
        assert_eq!(objects.names, vec!["city"]);
    }
}
