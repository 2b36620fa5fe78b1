//! Attributes, methods and subscripts of runtime values
//!
//! The interpreter resolves `obj.name` through [`attribute`], calls bound
//! methods through [`call_method`] and `obj[key]` through [`subscript`].

use crate::args::Args;
use crate::budget::Budget;
use crate::canvas::Canvas;
use crate::error::SnippetError;
use crate::frame::{cell_text, Aggregate, Frame, GroupBy, Reduction, Selection, Series};
use crate::plotting::{self, cells_of, numbers_of};
use crate::value::{Module, Value};
use autolysis_table::{stats, Cell};
use std::sync::Arc;

/// Evaluated subscript key
#[derive(Debug, Clone)]
pub(crate) enum Key {
    Item(Value),
    Slice(Slice),
    Pair(Box<Key>, Box<Key>),
}

/// `start:stop:step` with Python defaults
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Slice {
    pub(crate) start: Option<i64>,
    pub(crate) stop: Option<i64>,
    pub(crate) step: Option<i64>,
}

impl Slice {
    /// Selected positions in a sequence of `len` elements
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub(crate) fn positions(&self, len: usize) -> Result<Vec<usize>, SnippetError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(SnippetError::value_error("slice step cannot be zero"));
        }
        let n = len as i64;
        let norm = |v: i64| if v < 0 { v + n } else { v };
        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map_or(0, norm).clamp(0, n);
            let stop = self.stop.map_or(n, norm).clamp(0, n);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = self.start.map_or(n - 1, norm).clamp(-1, n - 1);
            let stop = self.stop.map_or(-1, |v| norm(v).clamp(-1, n - 1));
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

/// Python-style index with negative positions
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn position(index: i64, len: usize, what: &str) -> Result<usize, SnippetError> {
    let n = len as i64;
    let i = if index < 0 { index + n } else { index };
    if (0..n).contains(&i) {
        Ok(i as usize)
    } else {
        Err(SnippetError::Index(format!("{what} index out of range")))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn count_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Scalar result of a reduction; counts come back as ints
#[allow(clippy::cast_possible_truncation)]
fn reduced(reduction: Reduction, cell: &Cell) -> Value {
    match (reduction, cell) {
        (Reduction::Count | Reduction::Size, Cell::Number(n)) => Value::Int(*n as i64),
        (_, cell) => Value::from_cell(cell),
    }
}

fn aggregate_value(aggregate: Aggregate) -> Value {
    match aggregate {
        Aggregate::Series(series) => Value::series(series),
        Aggregate::Frame(frame) => Value::frame(frame),
    }
}

/// Series built from any vector-like value
pub(crate) fn to_series(value: &Value, name: Option<String>) -> Result<Series, SnippetError> {
    match value {
        Value::Series(series) => {
            let mut series = (**series).clone();
            if name.is_some() {
                series.name = name;
            }
            Ok(series)
        }
        Value::Dict(pairs) => {
            let labels = pairs.iter().map(|(k, _)| k.display()).collect();
            let cells = pairs.iter().map(|(_, v)| v.to_cell()).collect::<Result<_, _>>()?;
            Ok(Series::new(name, labels, cells))
        }
        other => Ok(Series::from_cells(name, cells_of(other, "data")?)),
    }
}

/// `.values` / `.tolist()` of a series
fn series_items(series: &Series) -> Value {
    Value::List(series.cells.iter().map(Value::from_cell).collect())
}

fn labels_value(labels: &[String]) -> Value {
    Value::List(labels.iter().map(|l| Value::from_label(l)).collect())
}

fn dtype_name(cells: &[Cell]) -> &'static str {
    if cells.iter().any(|c| matches!(c, Cell::Text(_))) {
        "object"
    } else {
        "float64"
    }
}

// ---------------------------------------------------------------------------
// Attributes

/// `receiver.name` without a call
pub(crate) fn attribute(receiver: &Value, name: &str) -> Result<Value, SnippetError> {
    match receiver {
        Value::Module(module) => module_attribute(*module, name),
        Value::Frame(frame) => Ok(match name {
            "columns" => Value::List(frame.names.iter().cloned().map(Value::Str).collect()),
            "index" => labels_value(&frame.labels),
            "shape" => Value::Tuple(vec![count_value(frame.n_rows()), count_value(frame.n_columns())]),
            "size" => count_value(frame.n_rows() * frame.n_columns()),
            "empty" => Value::Bool(frame.n_rows() == 0 || frame.n_columns() == 0),
            "values" => Value::List(
                frame
                    .rows()
                    .iter()
                    .map(|row| Value::List(row.iter().map(Value::from_cell).collect()))
                    .collect(),
            ),
            "dtypes" => Value::series(Series::new(
                None,
                frame.names.clone(),
                frame
                    .columns
                    .iter()
                    .map(|c| Cell::Text(dtype_name(c).to_string()))
                    .collect(),
            )),
            "T" => Value::frame(transpose(frame)),
            column if frame.has_column(column) => Value::series(frame.column(column)?),
            method => Value::bound(receiver.clone(), method),
        }),
        Value::Series(series) => Ok(match name {
            "values" => series_items(series),
            "index" => labels_value(&series.labels),
            "name" => series.name.clone().map_or(Value::None, Value::Str),
            "shape" => Value::Tuple(vec![count_value(series.len())]),
            "size" => count_value(series.len()),
            "empty" => Value::Bool(series.len() == 0),
            "dtype" => Value::Str(dtype_name(&series.cells).to_string()),
            method => Value::bound(receiver.clone(), method),
        }),
        Value::Mask(mask) => Ok(match name {
            "values" => Value::List(mask.iter().map(|b| Value::Bool(*b)).collect()),
            "size" => count_value(mask.len()),
            method => Value::bound(receiver.clone(), method),
        }),
        Value::GroupBy(groups) if groups.frame.has_column(name) => Ok(Value::GroupBy(Arc::new(
            groups.select(Selection::Column(name.to_string()))?,
        ))),
        Value::Bound { receiver, method } => Ok(Value::bound((**receiver).clone(), &format!("{method}.{name}"))),
        Value::Exception { message, .. } if name == "args" => {
            Ok(Value::Tuple(vec![Value::Str(message.clone())]))
        }
        Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Builtin(_) => {
            Err(SnippetError::attribute(receiver.type_name(), name))
        }
        _ => Ok(Value::bound(receiver.clone(), name)),
    }
}

fn module_attribute(module: Module, name: &str) -> Result<Value, SnippetError> {
    if let Some(submodule) = module.submodule(name) {
        return Ok(Value::Module(submodule));
    }
    match (module, name) {
        (Module::Numpy, "nan" | "NaN") => Ok(Value::Float(f64::NAN)),
        (Module::Numpy, "inf") => Ok(Value::Float(f64::INFINITY)),
        (Module::Numpy, "pi") => Ok(Value::Float(std::f64::consts::PI)),
        (Module::Numpy, "e") => Ok(Value::Float(std::f64::consts::E)),
        (Module::Pandas, "NA" | "NaT") => Ok(Value::Float(f64::NAN)),
        _ => Ok(Value::bound(Value::Module(module), name)),
    }
}

fn transpose(frame: &Frame) -> Frame {
    Frame {
        index_name: None,
        labels: frame.names.clone(),
        names: frame.labels.clone(),
        columns: frame.rows(),
    }
}

// ---------------------------------------------------------------------------
// Method calls

/// Call `method` on `receiver`
pub(crate) fn call_method(
    canvas: &mut Canvas,
    budget: &Budget,
    receiver: &Value,
    method: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    match receiver {
        Value::Module(Module::Pyplot) => plotting::pyplot(canvas, method, args),
        Value::Module(Module::Seaborn) => plotting::seaborn(canvas, budget, method, args),
        Value::Module(Module::Numpy) => numpy(budget, method, args),
        Value::Module(Module::Pandas) => pandas(method, args),
        Value::Module(Module::Matplotlib) => match method {
            "use" | "rc" | "rcdefaults" => Ok(Value::None),
            name if name.contains('.') => Ok(Value::None),
            other => Err(SnippetError::attribute("module", other)),
        },
        Value::Figure(id) => plotting::figure_method(canvas, *id, method, args),
        Value::Axes(target) => plotting::axes_method(canvas, *target, method, args),
        Value::Series(series) => series_method(canvas, budget, series, method, args),
        Value::Frame(frame) => frame_method(canvas, budget, frame, method, args),
        Value::GroupBy(groups) => groupby_method(groups, method, args),
        Value::Mask(mask) => mask_method(mask, method, args),
        Value::Str(text) => string_method(text, method, args),
        Value::Dict(pairs) => dict_method(pairs, method, args),
        Value::List(items) | Value::Tuple(items) => match method {
            "count" => {
                let needle = args.require(0, "value", "count")?;
                Ok(count_value(items.iter().filter(|v| v.equals(needle)).count()))
            }
            "index" => {
                let needle = args.require(0, "value", "index")?;
                items
                    .iter()
                    .position(|v| v.equals(needle))
                    .map(count_value)
                    .ok_or_else(|| SnippetError::value_error(format!("{} is not in list", needle.repr())))
            }
            "copy" => Ok(receiver.clone()),
            other => Err(SnippetError::attribute(receiver.type_name(), other)),
        },
        other => Err(SnippetError::attribute(other.type_name(), method)),
    }
}

/// Plot kind from `plot(kind=...)` or `plot.<kind>()`
fn plot_kind<'a>(method: &'a str, args: &'a Args) -> &'a str {
    method
        .strip_prefix("plot.")
        .unwrap_or_else(|| args.str_opt(usize::MAX, "kind").unwrap_or("line"))
}

#[allow(clippy::too_many_lines)]
fn series_method(
    canvas: &mut Canvas,
    budget: &Budget,
    series: &Arc<Series>,
    method: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    if let Some(reduction) = Reduction::parse(method) {
        return Ok(reduced(reduction, &series.reduce(reduction)?));
    }
    if let Some(operation) = method.strip_prefix("str.") {
        return series_string(series, operation, args);
    }
    if method == "plot" || method.starts_with("plot.") {
        return plotting::series_plot(canvas, budget, series, plot_kind(method, args), args);
    }
    let result = match method {
        "head" => series.head(args.count_or(0, "n", 5)?),
        "tail" => series.tail(args.count_or(0, "n", 5)?),
        "dropna" => series.dropna(),
        "value_counts" => {
            let mut counts = series.value_counts();
            if args.bool_or(usize::MAX, "normalize", false) {
                let total: f64 = counts.floats().iter().sum();
                counts = counts.map_numbers(|n| n / total);
                counts.name = Some("proportion".to_string());
            }
            if args.bool_or(usize::MAX, "ascending", false) {
                counts = counts.sort_values(true);
            }
            counts
        }
        "sort_values" => series.sort_values(args.bool_or(usize::MAX, "ascending", true)),
        "sort_index" => series.sort_index(args.bool_or(usize::MAX, "ascending", true)),
        "nlargest" => series.nlargest(args.count_or(0, "n", 5)?, true),
        "nsmallest" => series.nlargest(args.count_or(0, "n", 5)?, false),
        "describe" => describe_series(series),
        "isnull" | "isna" => return Ok(Value::Mask(Arc::new(series.cells.iter().map(Cell::is_missing).collect()))),
        "notnull" | "notna" => {
            return Ok(Value::Mask(Arc::new(series.cells.iter().map(|c| !c.is_missing()).collect())))
        }
        "fillna" => {
            let fill = args.require(0, "value", "fillna")?.to_cell()?;
            series.map_cells(|c| if c.is_missing() { fill.clone() } else { c.clone() })
        }
        "astype" => astype(series, args.require(0, "dtype", "astype")?)?,
        "round" => {
            let factor = 10f64.powi(i32::try_from(args.count_or(0, "decimals", 0)?).unwrap_or(i32::MAX));
            series.map_numbers(|n| (n * factor).round() / factor)
        }
        "abs" => series.map_numbers(f64::abs),
        "cumsum" => series.cumsum(),
        "clip" => {
            let lower = args.f64_or(0, "lower", f64::NEG_INFINITY)?;
            let upper = args.f64_or(1, "upper", f64::INFINITY)?;
            series.map_numbers(|n| n.clamp(lower, upper))
        }
        "copy" => (**series).clone(),
        "unique" => return Ok(Value::List(series.unique().iter().map(Value::from_cell).collect())),
        "nunique" => return Ok(count_value(series.unique().len())),
        "tolist" | "to_list" | "to_numpy" => return Ok(series_items(series)),
        "to_frame" => return Ok(Value::frame(Frame::from_series(vec![(**series).clone()]))),
        "reset_index" => return Ok(Value::frame(series.reset_index())),
        "idxmax" | "idxmin" => {
            let present = series.dropna();
            let sorted = present.sort_values(method == "idxmin");
            return sorted
                .labels
                .first()
                .map(|l| Value::from_label(l))
                .ok_or_else(|| SnippetError::value_error(format!("attempt to get {method} of an empty sequence")));
        }
        "var" => {
            return Ok(Value::Float(stats::variance(&finite(&series.floats())).unwrap_or(f64::NAN)));
        }
        "quantile" => {
            let q = args.f64_or(0, "q", 0.5)?;
            return Ok(Value::Float(quantile(&series.floats(), q).unwrap_or(f64::NAN)));
        }
        "corr" => {
            let other = to_series(args.require(0, "other", "corr")?, None)?;
            let (xs, ys): (Vec<f64>, Vec<f64>) = series
                .floats()
                .into_iter()
                .zip(other.floats())
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .unzip();
            return Ok(Value::Float(stats::pearson(&xs, &ys).unwrap_or(f64::NAN)));
        }
        "between" => {
            let lo = args.f64_or(0, "left", f64::NEG_INFINITY)?;
            let hi = args.f64_or(1, "right", f64::INFINITY)?;
            return Ok(Value::Mask(Arc::new(
                series.floats().iter().map(|v| (lo..=hi).contains(v)).collect(),
            )));
        }
        "isin" => {
            let wanted = args.require(0, "values", "isin")?.iterate("isin")?;
            return Ok(Value::Mask(Arc::new(
                series
                    .cells
                    .iter()
                    .map(|c| wanted.iter().any(|w| w.equals(&Value::from_cell(c))))
                    .collect(),
            )));
        }
        "hist" => return plotting::series_plot(canvas, budget, series, "hist", args),
        "items" => {
            return Ok(Value::List(
                series
                    .labels
                    .iter()
                    .zip(&series.cells)
                    .map(|(l, c)| Value::Tuple(vec![Value::from_label(l), Value::from_cell(c)]))
                    .collect(),
            ))
        }
        other => return Err(SnippetError::attribute("Series", other)),
    };
    Ok(Value::series(result))
}

fn series_string(series: &Series, operation: &str, args: &Args) -> Result<Value, SnippetError> {
    let text = |f: &dyn Fn(&str) -> Cell| {
        series.map_cells(|c| match c {
            Cell::Text(s) => f(s),
            other => other.clone(),
        })
    };
    let flags = |f: &dyn Fn(&str) -> bool| {
        Value::Mask(Arc::new(
            series
                .cells
                .iter()
                .map(|c| matches!(c, Cell::Text(s) if f(s)))
                .collect(),
        ))
    };
    #[allow(clippy::cast_precision_loss)]
    let result = match operation {
        "lower" => text(&|s| Cell::Text(s.to_lowercase())),
        "upper" => text(&|s| Cell::Text(s.to_uppercase())),
        "strip" => text(&|s| Cell::Text(s.trim().to_string())),
        "title" => text(&|s| Cell::Text(title_case(s))),
        "len" => text(&|s| Cell::Number(s.chars().count() as f64)),
        "replace" => {
            let from = string_arg(args, 0, "pat")?;
            let to = string_arg(args, 1, "repl")?;
            text(&|s| Cell::Text(s.replace(&from, &to)))
        }
        "contains" => {
            let needle = string_arg(args, 0, "pat")?;
            return Ok(flags(&|s| s.contains(&needle)));
        }
        "startswith" => {
            let needle = string_arg(args, 0, "pat")?;
            return Ok(flags(&|s| s.starts_with(&needle)));
        }
        "endswith" => {
            let needle = string_arg(args, 0, "pat")?;
            return Ok(flags(&|s| s.ends_with(&needle)));
        }
        other => return Err(SnippetError::attribute("StringMethods", other)),
    };
    Ok(Value::series(result))
}

fn astype(series: &Series, dtype: &Value) -> Result<Series, SnippetError> {
    let name = match dtype {
        Value::Str(s) => s.as_str(),
        Value::Builtin(b) => match b {
            crate::value::Builtin::Int => "int",
            crate::value::Builtin::Float => "float",
            crate::value::Builtin::Str => "str",
            _ => return Err(SnippetError::type_error("dtype not understood")),
        },
        other => return Err(SnippetError::type_error(format!("dtype not understood: {}", other.type_name()))),
    };
    match name {
        "int" | "int64" | "int32" => {
            let mut failure = None;
            let cast = series.map_cells(|c| match c {
                Cell::Number(n) => Cell::Number(n.trunc()),
                Cell::Text(t) => match Cell::parse(t) {
                    Cell::Number(n) => Cell::Number(n.trunc()),
                    _ => {
                        failure.get_or_insert_with(|| t.clone());
                        Cell::Missing
                    }
                },
                Cell::Missing => {
                    failure.get_or_insert_with(|| "nan".to_string());
                    Cell::Missing
                }
            });
            match failure {
                Some(bad) => Err(SnippetError::value_error(format!("invalid literal for int(): '{bad}'"))),
                None => Ok(cast),
            }
        }
        "float" | "float64" | "float32" => {
            let mut failure = None;
            let cast = series.map_cells(|c| match c {
                Cell::Text(t) => match Cell::parse(t) {
                    number @ Cell::Number(_) => number,
                    _ => {
                        failure.get_or_insert_with(|| t.clone());
                        Cell::Missing
                    }
                },
                other => other.clone(),
            });
            match failure {
                Some(bad) => Err(SnippetError::value_error(format!(
                    "could not convert string to float: '{bad}'"
                ))),
                None => Ok(cast),
            }
        }
        "str" | "object" | "string" | "category" => Ok(series.map_cells(|c| match c {
            Cell::Missing => Cell::Missing,
            other => Cell::Text(cell_text(other)),
        })),
        other => Err(SnippetError::type_error(format!("data type '{other}' not understood"))),
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn quantile(values: &[f64], q: f64) -> Option<f64> {
    stats::quantile_sorted(&stats::sorted(&finite(values)), q)
}

const DESCRIBE_ROWS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

#[allow(clippy::cast_precision_loss)]
fn numeric_summary(cells: &[Cell]) -> Vec<Cell> {
    let values: Vec<f64> = cells.iter().filter_map(Cell::as_number).filter(|v| v.is_finite()).collect();
    let sorted = stats::sorted(&values);
    let number = |v: Option<f64>| v.map_or(Cell::Missing, Cell::Number);
    vec![
        Cell::Number(values.len() as f64),
        number(stats::mean(&values)),
        number(stats::std_dev(&values)),
        number(sorted.first().copied()),
        number(stats::quantile_sorted(&sorted, 0.25)),
        number(stats::quantile_sorted(&sorted, 0.5)),
        number(stats::quantile_sorted(&sorted, 0.75)),
        number(sorted.last().copied()),
    ]
}

#[allow(clippy::cast_precision_loss)]
fn describe_series(series: &Series) -> Series {
    if series.is_numeric() {
        return Series::new(
            series.name.clone(),
            DESCRIBE_ROWS.iter().map(|s| (*s).to_string()).collect(),
            numeric_summary(&series.cells),
        );
    }
    let counts = series.value_counts();
    let present = series.cells.iter().filter(|c| !c.is_missing()).count();
    Series::new(
        series.name.clone(),
        ["count", "unique", "top", "freq"].iter().map(|s| (*s).to_string()).collect(),
        vec![
            Cell::Number(present as f64),
            Cell::Number(counts.len() as f64),
            counts.labels.first().map_or(Cell::Missing, |l| Cell::Text(l.clone())),
            counts.cells.first().cloned().unwrap_or(Cell::Missing),
        ],
    )
}

fn describe_frame(frame: &Frame) -> Result<Frame, SnippetError> {
    let numeric: Vec<usize> = (0..frame.n_columns()).filter(|&i| frame.is_numeric_column(i)).collect();
    if numeric.is_empty() {
        let series: Vec<Series> = frame
            .names
            .iter()
            .map(|name| frame.column(name).map(|s| describe_series(&s)))
            .collect::<Result<_, _>>()?;
        return Ok(Frame::from_series(series));
    }
    Ok(Frame {
        index_name: None,
        labels: DESCRIBE_ROWS.iter().map(|s| (*s).to_string()).collect(),
        names: numeric.iter().map(|&i| frame.names[i].clone()).collect(),
        columns: numeric.iter().map(|&i| numeric_summary(&frame.columns[i])).collect(),
    })
}

#[allow(clippy::too_many_lines)]
fn frame_method(
    canvas: &mut Canvas,
    budget: &Budget,
    frame: &Arc<Frame>,
    method: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    if let Some(reduction) = Reduction::parse(method) {
        return Ok(Value::series(frame.reduce(reduction)));
    }
    if method == "plot" || method.starts_with("plot.") {
        return plotting::frame_plot(canvas, budget, frame, plot_kind(method, args), args);
    }
    let names_arg = |index: usize, name: &str| -> Result<Option<Vec<String>>, SnippetError> {
        args.get(index, name).map(|v| v.as_names(name)).transpose()
    };
    let result = match method {
        "head" => frame.head(args.count_or(0, "n", 5)?),
        "tail" => frame.tail(args.count_or(0, "n", 5)?),
        "describe" => describe_frame(frame)?,
        "dropna" => frame.dropna(names_arg(usize::MAX, "subset")?.as_deref())?,
        "fillna" => {
            let fill = args.require(0, "value", "fillna")?.to_cell()?;
            let mut filled = (**frame).clone();
            for column in &mut filled.columns {
                for cell in column.iter_mut().filter(|c| c.is_missing()) {
                    *cell = fill.clone();
                }
            }
            filled
        }
        "select_dtypes" => {
            let include = names_arg(0, "include")?
                .ok_or_else(|| SnippetError::value_error("at least one of include or exclude must be nonempty"))?;
            frame.select_dtypes(&include)?
        }
        "corr" => {
            if let Some(method) = args.str_opt(0, "method").filter(|m| *m != "pearson") {
                return Err(SnippetError::unsupported(format!("correlation method '{method}'")));
            }
            frame.corr()
        }
        "groupby" => {
            let by = args.require(0, "by", "groupby")?;
            let key = match by.as_names("by")?.as_slice() {
                [key] => key.clone(),
                _ => return Err(SnippetError::unsupported("groupby over several keys")),
            };
            return Ok(Value::GroupBy(Arc::new(GroupBy::new(Arc::clone(frame), key)?)));
        }
        "sort_values" => {
            let by = names_arg(0, "by")?.ok_or_else(|| SnippetError::type_error("sort_values() missing 'by'"))?;
            frame.sort_values(&by, args.bool_or(usize::MAX, "ascending", true))?
        }
        "nlargest" | "nsmallest" => {
            let n = args.count_or(0, "n", 5)?;
            let by = names_arg(1, "columns")?.ok_or_else(|| SnippetError::type_error(format!("{method}() missing 'columns'")))?;
            frame
                .dropna(Some(&by))?
                .sort_values(&by, method == "nsmallest")?
                .head(n)
        }
        "isnull" | "isna" => frame.isnull(),
        "nunique" => {
            let counts = frame
                .columns
                .iter()
                .map(|c| {
                    #[allow(clippy::cast_precision_loss)]
                    let n = Series::from_cells(None, c.clone()).unique().len() as f64;
                    Cell::Number(n)
                })
                .collect();
            return Ok(Value::series(Series::new(None, frame.names.clone(), counts)));
        }
        "drop" => {
            let columns = names_arg(usize::MAX, "columns")?
                .or(if args.kw("axis").and_then(Value::as_i64) == Some(1) || args.str_opt(usize::MAX, "axis") == Some("columns") {
                    names_arg(0, "labels")?
                } else {
                    None
                })
                .ok_or_else(|| SnippetError::unsupported("drop without columns"))?;
            frame.drop_columns(&columns)?
        }
        "rename" => {
            let Some(Value::Dict(mapping)) = args.kw("columns") else {
                return Err(SnippetError::unsupported("rename without a columns mapping"));
            };
            let mut renamed = (**frame).clone();
            for name in &mut renamed.names {
                if let Some((_, to)) = mapping.iter().find(|(from, _)| from.as_str() == Some(name.as_str())) {
                    *name = to.display();
                }
            }
            renamed
        }
        "drop_duplicates" => {
            let mut seen = std::collections::HashSet::new();
            let rows: Vec<usize> = frame
                .rows()
                .iter()
                .enumerate()
                .filter(|(_, row)| seen.insert(row.iter().map(Cell::label).collect::<Vec<_>>()))
                .map(|(i, _)| i)
                .collect();
            frame.take_rows(&rows)
        }
        "reset_index" => {
            if args.bool_or(usize::MAX, "drop", false) {
                let mut reset = (**frame).clone();
                reset.labels = (0..frame.n_rows()).map(|i| i.to_string()).collect();
                reset.index_name = None;
                reset
            } else {
                frame.reset_index()
            }
        }
        "set_index" => frame.set_index(&string_arg(args, 0, "keys")?)?,
        "copy" => (**frame).clone(),
        "to_numpy" => return attribute(&Value::Frame(Arc::clone(frame)), "values"),
        "info" => return Ok(Value::None),
        "hist" => return plotting::frame_hist(canvas, frame, args),
        "boxplot" => return plotting::frame_boxplot(canvas, frame, args),
        "transpose" => transpose(frame),
        other => return Err(SnippetError::attribute("DataFrame", other)),
    };
    Ok(Value::frame(result))
}

fn groupby_method(groups: &GroupBy, method: &str, args: &Args) -> Result<Value, SnippetError> {
    let name = match method {
        "agg" | "aggregate" => string_arg(args, 0, "func")?,
        other => other.to_string(),
    };
    let reduction = Reduction::parse(&name).ok_or_else(|| SnippetError::attribute("DataFrameGroupBy", &name))?;
    groups.aggregate(reduction).map(aggregate_value)
}

#[allow(clippy::cast_precision_loss)]
fn mask_method(mask: &[bool], method: &str, args: &Args) -> Result<Value, SnippetError> {
    let hits = mask.iter().filter(|b| **b).count();
    match method {
        "sum" => Ok(count_value(hits)),
        "mean" if mask.is_empty() => Ok(Value::Float(f64::NAN)),
        "mean" => Ok(Value::Float(hits as f64 / mask.len() as f64)),
        "any" => Ok(Value::Bool(hits > 0)),
        "all" => Ok(Value::Bool(hits == mask.len())),
        "astype" => {
            let series = Series::from_cells(
                None,
                mask.iter().map(|b| Cell::Number(if *b { 1.0 } else { 0.0 })).collect(),
            );
            Ok(Value::series(astype(&series, args.require(0, "dtype", "astype")?)?))
        }
        "tolist" | "to_list" => Ok(Value::List(mask.iter().map(|b| Value::Bool(*b)).collect())),
        other => Err(SnippetError::attribute("Series", other)),
    }
}

fn string_arg(args: &Args, index: usize, name: &str) -> Result<String, SnippetError> {
    args.require(index, name, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SnippetError::type_error(format!("{name} must be a string")))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

fn string_method(text: &str, method: &str, args: &Args) -> Result<Value, SnippetError> {
    let string = |s: String| Ok(Value::Str(s));
    match method {
        "upper" => string(text.to_uppercase()),
        "lower" => string(text.to_lowercase()),
        "title" => string(title_case(text)),
        "capitalize" => {
            let mut chars = text.chars();
            string(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "strip" => string(text.trim().to_string()),
        "lstrip" => string(text.trim_start().to_string()),
        "rstrip" => string(text.trim_end().to_string()),
        "replace" => string(text.replace(&string_arg(args, 0, "old")?, &string_arg(args, 1, "new")?)),
        "startswith" => Ok(Value::Bool(text.starts_with(&string_arg(args, 0, "prefix")?))),
        "endswith" => Ok(Value::Bool(text.ends_with(&string_arg(args, 0, "suffix")?))),
        "split" => {
            let parts: Vec<Value> = match args.str_opt(0, "sep") {
                Some(sep) if !sep.is_empty() => text.split(sep).map(|p| Value::Str(p.to_string())).collect(),
                Some(_) => return Err(SnippetError::value_error("empty separator")),
                None => text.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
            };
            Ok(Value::List(parts))
        }
        "join" => {
            let items = args.require(0, "iterable", "join")?.iterate("join")?;
            let parts = items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        SnippetError::type_error(format!("expected str instance, {} found", v.type_name()))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            string(parts.join(text))
        }
        "format" => string(format_template(text, args)?),
        "zfill" => {
            let width = args.count_or(0, "width", 0)?;
            let pad = width.saturating_sub(text.chars().count());
            string(match text.strip_prefix('-') {
                Some(rest) => format!("-{}{rest}", "0".repeat(pad)),
                None => format!("{}{text}", "0".repeat(pad)),
            })
        }
        other => Err(SnippetError::attribute("str", other)),
    }
}

fn dict_method(pairs: &[(Value, Value)], method: &str, args: &Args) -> Result<Value, SnippetError> {
    match method {
        "keys" => Ok(Value::List(pairs.iter().map(|(k, _)| k.clone()).collect())),
        "values" => Ok(Value::List(pairs.iter().map(|(_, v)| v.clone()).collect())),
        "items" => Ok(Value::List(
            pairs
                .iter()
                .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "get" => {
            let key = args.require(0, "key", "get")?;
            Ok(pairs
                .iter()
                .find(|(k, _)| k.equals(key))
                .map_or_else(|| args.positional.get(1).cloned().unwrap_or(Value::None), |(_, v)| v.clone()))
        }
        other => Err(SnippetError::attribute("dict", other)),
    }
}

// ---------------------------------------------------------------------------
// numpy and pandas

/// Apply `f` element-wise to a scalar or vector
pub(crate) fn elementwise(value: &Value, f: impl Fn(f64) -> f64) -> Result<Value, SnippetError> {
    match value {
        Value::Series(series) => Ok(Value::series(series.map_numbers(f))),
        Value::List(_) | Value::Tuple(_) | Value::Mask(_) => Ok(Value::series(to_series(value, None)?.map_numbers(f))),
        scalar => scalar
            .as_f64()
            .map(|x| Value::Float(f(x)))
            .ok_or_else(|| SnippetError::type_error(format!("unsupported operand type {}", scalar.type_name()))),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn numpy(budget: &Budget, name: &str, args: &Args) -> Result<Value, SnippetError> {
    let vector = |values: Vec<f64>| Value::series(Series::from_cells(None, values.into_iter().map(Cell::Number).collect()));
    match name {
        "arange" => {
            let (start, stop) = match (args.positional.first(), args.positional.get(1)) {
                (Some(stop), None) => (0.0, stop.as_f64().unwrap_or(0.0)),
                _ => (args.f64_or(0, "start", 0.0)?, args.f64_or(1, "stop", 0.0)?),
            };
            let step = args.f64_or(2, "step", 1.0)?;
            if step == 0.0 {
                return Err(SnippetError::ZeroDivision);
            }
            let count = ((stop - start) / step).ceil().max(0.0);
            budget.ensure_len(if count.is_finite() { count as usize } else { usize::MAX })?;
            Ok(vector((0..count as usize).map(|i| start + step * i as f64).collect()))
        }
        "linspace" => {
            let start = args.f64_or(0, "start", 0.0)?;
            let stop = args.f64_or(1, "stop", 1.0)?;
            let num = args.count_or(2, "num", 50)?;
            budget.ensure_len(num)?;
            let values = match num {
                0 => Vec::new(),
                1 => vec![start],
                n => (0..n).map(|i| start + (stop - start) * i as f64 / (n - 1) as f64).collect(),
            };
            Ok(vector(values))
        }
        "zeros" | "ones" => {
            let n = args.count_or(0, "shape", 0)?;
            budget.ensure_len(n)?;
            Ok(vector(vec![if name == "ones" { 1.0 } else { 0.0 }; n]))
        }
        "array" | "asarray" => match args.require(0, "object", name)? {
            nested @ Value::List(items) if items.iter().any(|v| matches!(v, Value::List(_) | Value::Tuple(_))) => {
                Ok(nested.clone())
            }
            other => Ok(Value::series(to_series(other, None)?)),
        },
        "mean" | "median" | "std" | "sum" | "min" | "max" | "nanmean" | "nanmedian" | "nanstd" | "nansum" | "nanmin"
        | "nanmax" => {
            let values = finite(&numbers_of(args.require(0, "a", name)?, "a")?);
            let result = match name.trim_start_matches("nan") {
                "mean" => stats::mean(&values),
                "median" => stats::median(&values),
                "std" if values.len() == 1 => Some(0.0),
                "std" => {
                    let n = values.len() as f64;
                    stats::variance(&values).map(|v| (v * (n - 1.0) / n).sqrt())
                }
                "sum" => Some(values.iter().sum()),
                "min" => values.iter().copied().reduce(f64::min),
                _ => values.iter().copied().reduce(f64::max),
            };
            result
                .map(Value::Float)
                .ok_or_else(|| SnippetError::value_error(format!("zero-size array to reduction operation {name}")))
        }
        "percentile" | "quantile" => {
            let values = numbers_of(args.require(0, "a", name)?, "a")?;
            let q = args.f64_or(1, "q", 50.0)?;
            let q = if name == "percentile" { q / 100.0 } else { q };
            Ok(Value::Float(quantile(&values, q).unwrap_or(f64::NAN)))
        }
        "sqrt" => elementwise(args.require(0, "x", name)?, f64::sqrt),
        "log" => elementwise(args.require(0, "x", name)?, f64::ln),
        "log10" => elementwise(args.require(0, "x", name)?, f64::log10),
        "log1p" => elementwise(args.require(0, "x", name)?, f64::ln_1p),
        "exp" => elementwise(args.require(0, "x", name)?, f64::exp),
        "abs" => elementwise(args.require(0, "x", name)?, f64::abs),
        "sin" => elementwise(args.require(0, "x", name)?, f64::sin),
        "cos" => elementwise(args.require(0, "x", name)?, f64::cos),
        "round" => {
            let factor = 10f64.powi(i32::try_from(args.count_or(1, "decimals", 0)?).unwrap_or(i32::MAX));
            elementwise(args.require(0, "a", name)?, |x| (x * factor).round() / factor)
        }
        "isnan" => match args.require(0, "x", name)? {
            Value::Series(series) => Ok(Value::Mask(Arc::new(series.cells.iter().map(Cell::is_missing).collect()))),
            scalar => Ok(Value::Bool(scalar.as_f64().is_some_and(f64::is_nan))),
        },
        other => Err(SnippetError::unsupported(format!("np.{other}"))),
    }
}

fn pandas(name: &str, args: &Args) -> Result<Value, SnippetError> {
    match name {
        "Series" => {
            let data = args.get(0, "data").cloned().unwrap_or(Value::List(Vec::new()));
            let name = args.kw("name").map(Value::display);
            let mut series = to_series(&data, name)?;
            if let Some(index) = args.get(1, "index") {
                let labels: Vec<String> = index.iterate("index")?.iter().map(Value::display).collect();
                if labels.len() != series.len() {
                    return Err(SnippetError::value_error(format!(
                        "length of values ({}) does not match length of index ({})",
                        series.len(),
                        labels.len()
                    )));
                }
                series.labels = labels;
            }
            Ok(Value::series(series))
        }
        "DataFrame" => match args.get(0, "data") {
            Some(Value::Dict(pairs)) => {
                let names = pairs.iter().map(|(k, _)| k.display()).collect();
                let columns = pairs
                    .iter()
                    .map(|(_, v)| cells_of(v, "column"))
                    .collect::<Result<_, _>>()?;
                Ok(Value::frame(Frame::from_columns(names, columns)?))
            }
            Some(Value::Frame(frame)) => Ok(Value::Frame(Arc::clone(frame))),
            Some(Value::Series(series)) => Ok(Value::frame(Frame::from_series(vec![(**series).clone()]))),
            Some(other) => Err(SnippetError::unsupported(format!("DataFrame from {}", other.type_name()))),
            None => Ok(Value::frame(Frame::from_columns(Vec::new(), Vec::new())?)),
        },
        "to_numeric" => {
            let coerce = args.str_opt(usize::MAX, "errors") == Some("coerce");
            let series = to_series(args.require(0, "arg", name)?, None)?;
            let mut failure = None;
            let numbers = series.map_cells(|c| match c {
                Cell::Text(t) => match Cell::parse(t) {
                    number @ Cell::Number(_) => number,
                    _ => {
                        failure.get_or_insert_with(|| t.clone());
                        Cell::Missing
                    }
                },
                other => other.clone(),
            });
            match failure {
                Some(bad) if !coerce => Err(SnippetError::value_error(format!("unable to parse string \"{bad}\""))),
                _ => Ok(Value::series(numbers)),
            }
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            let negate = name.starts_with("not");
            match args.require(0, "obj", name)? {
                Value::Series(series) => Ok(Value::Mask(Arc::new(
                    series.cells.iter().map(|c| c.is_missing() != negate).collect(),
                ))),
                scalar => Ok(Value::Bool(matches!(scalar.to_cell(), Ok(Cell::Missing)) != negate)),
            }
        }
        other => Err(SnippetError::unsupported(format!("pd.{other}"))),
    }
}

// ---------------------------------------------------------------------------
// Subscripts

/// `receiver[key]`
pub(crate) fn subscript(receiver: &Value, key: &Key) -> Result<Value, SnippetError> {
    match (receiver, key) {
        (Value::Frame(frame), Key::Item(Value::Str(name))) => Ok(Value::series(frame.column(name)?)),
        (Value::Frame(frame), Key::Item(names @ Value::List(_))) => {
            Ok(Value::frame(frame.select(&names.as_names("columns")?)?))
        }
        (Value::Frame(frame), Key::Item(Value::Mask(mask))) => Ok(Value::frame(frame.filter(mask)?)),
        (Value::Frame(frame), Key::Slice(slice)) => Ok(Value::frame(frame.take_rows(&slice.positions(frame.n_rows())?))),

        (Value::Series(series), Key::Item(Value::Mask(mask))) => Ok(Value::series(series.filter(mask)?)),
        (Value::Series(series), Key::Slice(slice)) => Ok(Value::series(series.take(&slice.positions(series.len())?))),
        (Value::Series(series), Key::Item(label)) => series_label(series, label),

        (Value::GroupBy(groups), Key::Item(Value::Str(name))) => {
            Ok(Value::GroupBy(Arc::new(groups.select(Selection::Column(name.clone()))?)))
        }
        (Value::GroupBy(groups), Key::Item(names @ Value::List(_))) => Ok(Value::GroupBy(Arc::new(
            groups.select(Selection::Columns(names.as_names("columns")?))?,
        ))),

        (Value::Mask(mask), Key::Item(index)) => {
            let i = index.as_i64().ok_or_else(|| SnippetError::type_error("mask indices must be integers"))?;
            Ok(Value::Bool(mask[position(i, mask.len(), "mask")?]))
        }

        (Value::List(items) | Value::Tuple(items), Key::Item(index)) => {
            let i = index.as_i64().ok_or_else(|| {
                SnippetError::type_error(format!("list indices must be integers, not {}", index.type_name()))
            })?;
            Ok(items[position(i, items.len(), "list")?].clone())
        }
        (Value::List(items), Key::Slice(slice)) => {
            Ok(Value::List(slice.positions(items.len())?.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Tuple(items), Key::Slice(slice)) => {
            Ok(Value::Tuple(slice.positions(items.len())?.into_iter().map(|i| items[i].clone()).collect()))
        }

        (Value::Str(text), Key::Item(index)) => {
            let chars: Vec<char> = text.chars().collect();
            let i = index.as_i64().ok_or_else(|| SnippetError::type_error("string indices must be integers"))?;
            Ok(Value::Str(chars[position(i, chars.len(), "string")?].to_string()))
        }
        (Value::Str(text), Key::Slice(slice)) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::Str(slice.positions(chars.len())?.into_iter().map(|i| chars[i]).collect()))
        }

        (Value::Dict(pairs), Key::Item(key)) => pairs
            .iter()
            .find(|(k, _)| k.equals(key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| SnippetError::Key(key.repr())),

        (Value::Bound { receiver, method }, key) if method == "iloc" => positional_index(receiver, key),
        (Value::Bound { receiver, method }, key) if method == "loc" => label_index(receiver, key),

        (other, _) => Err(SnippetError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn series_label(series: &Series, label: &Value) -> Result<Value, SnippetError> {
    let text = label.display();
    if let Some(i) = series.labels.iter().position(|l| *l == text) {
        return Ok(Value::from_cell(&series.cells[i]));
    }
    Err(SnippetError::Key(label.repr()))
}

fn positions_of(key: &Key, len: usize) -> Result<Vec<usize>, SnippetError> {
    match key {
        Key::Slice(slice) => slice.positions(len),
        Key::Item(Value::List(items)) => items
            .iter()
            .map(|v| {
                let i = v.as_i64().ok_or_else(|| SnippetError::type_error("positions must be integers"))?;
                position(i, len, "iloc")
            })
            .collect(),
        Key::Item(value) => {
            let i = value.as_i64().ok_or_else(|| SnippetError::type_error("positions must be integers"))?;
            Ok(vec![position(i, len, "iloc")?])
        }
        Key::Pair(..) => Err(SnippetError::Index("too many indexers".to_string())),
    }
}

/// `.iloc[...]`
fn positional_index(receiver: &Value, key: &Key) -> Result<Value, SnippetError> {
    match receiver {
        Value::Series(series) => match key {
            Key::Item(Value::Int(i)) => Ok(Value::from_cell(&series.cells[position(*i, series.len(), "iloc")?])),
            key => Ok(Value::series(series.take(&positions_of(key, series.len())?))),
        },
        Value::Frame(frame) => match key {
            Key::Item(Value::Int(i)) => Ok(Value::series(frame_row(frame, position(*i, frame.n_rows(), "iloc")?))),
            Key::Pair(rows, columns) => {
                let single_column = matches!(**columns, Key::Item(Value::Int(_)));
                let positions = positions_of(columns, frame.n_columns())?;
                let names: Vec<String> = positions.iter().map(|&c| frame.names[c].clone()).collect();
                let projected = frame.select(&names)?;
                match (rows.as_ref(), single_column) {
                    (Key::Item(Value::Int(i)), true) => {
                        Ok(Value::from_cell(&projected.columns[0][position(*i, frame.n_rows(), "iloc")?]))
                    }
                    (rows, true) => {
                        let rows = positions_of(rows, frame.n_rows())?;
                        Ok(Value::series(projected.column(&names[0])?.take(&rows)))
                    }
                    (rows, false) => Ok(Value::frame(projected.take_rows(&positions_of(rows, frame.n_rows())?))),
                }
            }
            key => Ok(Value::frame(frame.take_rows(&positions_of(key, frame.n_rows())?))),
        },
        other => Err(SnippetError::attribute(other.type_name(), "iloc")),
    }
}

fn frame_row(frame: &Frame, row: usize) -> Series {
    Series::new(
        Some(frame.labels[row].clone()),
        frame.names.clone(),
        frame.columns.iter().map(|c| c[row].clone()).collect(),
    )
}

/// `.loc[...]`
fn label_index(receiver: &Value, key: &Key) -> Result<Value, SnippetError> {
    match receiver {
        Value::Series(series) => match key {
            Key::Item(Value::Mask(mask)) => Ok(Value::series(series.filter(mask)?)),
            Key::Item(label) => series_label(series, label),
            _ => Err(SnippetError::unsupported("label slicing")),
        },
        Value::Frame(frame) => {
            let (rows, columns) = match key {
                Key::Pair(rows, columns) => (rows.as_ref(), Some(columns.as_ref())),
                rows => (rows, None),
            };
            let selected = match rows {
                Key::Item(Value::Mask(mask)) => frame.filter(mask)?,
                Key::Slice(slice) if slice.start.is_none() && slice.stop.is_none() && slice.step.is_none() => {
                    (**frame).clone()
                }
                Key::Item(label) => {
                    let text = label.display();
                    let row = frame
                        .labels
                        .iter()
                        .position(|l| *l == text)
                        .ok_or_else(|| SnippetError::Key(label.repr()))?;
                    if columns.is_none() {
                        return Ok(Value::series(frame_row(frame, row)));
                    }
                    frame.take_rows(&[row])
                }
                _ => return Err(SnippetError::unsupported("label slicing")),
            };
            match columns {
                None => Ok(Value::frame(selected)),
                Some(Key::Item(Value::Str(name))) => {
                    let series = selected.column(name)?;
                    if matches!(rows, Key::Item(v) if !matches!(v, Value::Mask(_))) {
                        return Ok(series.cells.first().map_or(Value::None, Value::from_cell));
                    }
                    Ok(Value::series(series))
                }
                Some(Key::Item(names @ Value::List(_))) => Ok(Value::frame(selected.select(&names.as_names("columns")?)?)),
                Some(_) => Err(SnippetError::unsupported("column slicing in loc")),
            }
        }
        other => Err(SnippetError::attribute(other.type_name(), "loc")),
    }
}

// ---------------------------------------------------------------------------
// String formatting

/// Parsed `[[fill]align][sign][0][width][,][.precision][type]`
#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: bool,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, SnippetError> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Self::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if let Some(c @ ('+' | '-' | ' ')) = chars.get(i).copied() {
            out.sign = c == '+';
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }
        let digits = |i: &mut usize| {
            let start = *i;
            while chars.get(*i).is_some_and(char::is_ascii_digit) {
                *i += 1;
            }
            chars[start..*i].iter().collect::<String>()
        };
        out.width = digits(&mut i).parse().unwrap_or(0);
        if matches!(chars.get(i), Some(',' | '_')) {
            out.grouping = true;
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            out.precision = Some(
                digits(&mut i)
                    .parse()
                    .map_err(|_| SnippetError::value_error("format specifier missing precision"))?,
            );
        }
        if let Some(&kind) = chars.get(i) {
            out.kind = Some(kind);
            i += 1;
        }
        if i != chars.len() {
            return Err(SnippetError::value_error(format!("invalid format specifier '{spec}'")));
        }
        Ok(out)
    }
}

fn group_thousands(body: &str) -> String {
    let (sign, rest) = body.strip_prefix('-').map_or(("", body), |r| ("-", r));
    let (int, frac) = rest.find('.').map_or((rest, ""), |p| rest.split_at(p));
    let digits: Vec<char> = int.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    format!("{sign}{grouped}{frac}")
}

fn scientific(x: f64, precision: usize) -> String {
    let raw = format!("{x:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => raw,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn general(x: f64, precision: usize) -> String {
    if x == 0.0 || !x.is_finite() {
        return Value::Float(x).display().trim_end_matches(".0").to_string();
    }
    let precision = precision.max(1);
    let exponent = x.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= precision as i32 {
        let s = scientific(x, precision - 1);
        match s.split_once('e') {
            Some((m, e)) if m.contains('.') => format!("{}e{e}", m.trim_end_matches('0').trim_end_matches('.')),
            _ => s,
        }
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        let s = format!("{x:.decimals$}");
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    }
}

/// Python `format(value, spec)`
pub(crate) fn format_spec(value: &Value, spec: &str) -> Result<String, SnippetError> {
    if spec.is_empty() {
        return Ok(value.display());
    }
    let spec = FormatSpec::parse(spec)?;
    let number = || {
        value
            .as_f64()
            .ok_or_else(|| SnippetError::value_error(format!("Unknown format code for object of type '{}'", value.type_name())))
    };
    let numeric = value.as_f64().is_some();
    let mut body = match spec.kind {
        Some('d') => match value {
            Value::Int(_) | Value::Bool(_) => value.as_i64().unwrap_or(0).to_string(),
            other => {
                return Err(SnippetError::value_error(format!(
                    "Unknown format code 'd' for object of type '{}'",
                    other.type_name()
                )))
            }
        },
        Some('f' | 'F') => {
            let p = spec.precision.unwrap_or(6);
            format!("{:.p$}", number()?)
        }
        Some('e' | 'E') => scientific(number()?, spec.precision.unwrap_or(6)),
        Some('%') => {
            let p = spec.precision.unwrap_or(6);
            format!("{:.p$}%", number()? * 100.0)
        }
        Some('g' | 'G') => general(number()?, spec.precision.unwrap_or(6)),
        None if numeric && spec.precision.is_some() => match value {
            Value::Int(i) => i.to_string(),
            _ => general(number()?, spec.precision.unwrap_or(6)),
        },
        Some('s') | None => {
            let text = value.display();
            match (spec.precision, numeric) {
                (Some(p), false) => text.chars().take(p).collect(),
                _ => text,
            }
        }
        Some(other) => {
            return Err(SnippetError::value_error(format!("Unknown format code '{other}'")));
        }
    };
    if spec.grouping && numeric {
        body = group_thousands(&body);
    }
    if spec.sign && numeric && !body.starts_with('-') {
        body.insert(0, '+');
    }
    let len = body.chars().count();
    if len >= spec.width {
        return Ok(body);
    }
    let pad = spec.width - len;
    if spec.zero && numeric && spec.align.is_none() {
        let (sign, rest) = match body.chars().next() {
            Some(c @ ('-' | '+')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body.clone()),
        };
        return Ok(format!("{sign}{}{rest}", "0".repeat(pad)));
    }
    let fill = spec.fill.unwrap_or(' ').to_string();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '<' => format!("{body}{}", fill.repeat(pad)),
        '^' => format!("{}{body}{}", fill.repeat(pad / 2), fill.repeat(pad - pad / 2)),
        _ => format!("{}{body}", fill.repeat(pad)),
    })
}

/// Python `str.format` with positional, numbered and named fields
pub(crate) fn format_template(template: &str, args: &Args) -> Result<String, SnippetError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(SnippetError::value_error("Single '{' encountered in format string")),
                    }
                }
                let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = head.split_once('!').map_or((head, None), |(n, c)| (n, Some(c)));
                let value = if name.is_empty() {
                    next_auto += 1;
                    args.positional.get(next_auto - 1)
                } else if let Ok(i) = name.parse::<usize>() {
                    args.positional.get(i)
                } else {
                    args.kw(name)
                };
                let value = value.ok_or_else(|| {
                    if name.is_empty() || name.parse::<usize>().is_ok() {
                        SnippetError::Index("Replacement index out of range".to_string())
                    } else {
                        SnippetError::Key(format!("'{name}'"))
                    }
                })?;
                let rendered = match conversion {
                    Some("r") => format_spec(&Value::Str(value.repr()), spec)?,
                    _ => format_spec(value, spec)?,
                };
                out.push_str(&rendered);
            }
            '}' => return Err(SnippetError::value_error("Single '}' encountered in format string")),
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolysis_table::{Column, Table};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn frame() -> Arc<Frame> {
        let table = Table::new(vec![
            Column::text("city", ["Oslo", "Rome", "Oslo"]),
            Column::numeric("rain", [10.0, 2.0, 12.0]),
        ])
        .unwrap();
        Arc::new(Frame::from_table(&table))
    }

    fn call(receiver: &Value, method: &str, args: &Args) -> Result<Value, SnippetError> {
        let mut canvas = Canvas::new((640, 480), 4000);
        let budget = Budget::new(Duration::from_secs(5), Arc::new(AtomicBool::new(false)), 10_000);
        call_method(&mut canvas, &budget, receiver, method, args)
    }

    #[test]
    fn slices_follow_python() {
        let slice = |start, stop, step| Slice { start, stop, step };
        assert_eq!(slice(None, None, None).positions(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(slice(Some(-2), None, None).positions(4).unwrap(), vec![2, 3]);
        assert_eq!(slice(None, None, Some(-1)).positions(3).unwrap(), vec![2, 1, 0]);
        assert_eq!(slice(Some(1), Some(100), Some(2)).positions(5).unwrap(), vec![1, 3]);
        assert!(slice(None, None, Some(0)).positions(3).is_err());
    }

    #[test]
    fn frame_attributes() {
        let data = Value::Frame(frame());
        assert!(matches!(attribute(&data, "shape").unwrap(), Value::Tuple(v) if v.len() == 2));
        assert!(matches!(attribute(&data, "rain").unwrap(), Value::Series(_)));
        assert!(matches!(attribute(&data, "head").unwrap(), Value::Bound { .. }));
    }

    #[test]
    fn groupby_through_subscript() {
        let grouped = call(&Value::Frame(frame()), "groupby", &Args::positional(vec![Value::Str("city".into())])).unwrap();
        let selected = subscript(&grouped, &Key::Item(Value::Str("rain".into()))).unwrap();
        let Value::Series(mean) = call(&selected, "mean", &Args::default()).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(mean.labels, vec!["Oslo", "Rome"]);
        assert_eq!(mean.cells, vec![Cell::Number(11.0), Cell::Number(2.0)]);
    }

    #[test]
    fn describe_has_quartiles() {
        let Value::Frame(described) = call(&Value::Frame(frame()), "describe", &Args::default()).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(described.names, vec!["rain"]);
        assert_eq!(described.labels[4], "25%");
        assert_eq!(described.columns[0][0], Cell::Number(3.0));
    }

    #[test]
    fn iloc_and_loc() {
        let data = Value::Frame(frame());
        let iloc = attribute(&data, "iloc").unwrap();
        let first = subscript(&iloc, &Key::Pair(Box::new(Key::Item(Value::Int(0))), Box::new(Key::Item(Value::Int(1))))).unwrap();
        assert!(first.equals(&Value::Float(10.0)));
        let loc = attribute(&data, "loc").unwrap();
        let cell = subscript(&loc, &Key::Pair(Box::new(Key::Item(Value::Int(1))), Box::new(Key::Item(Value::Str("city".into()))))).unwrap();
        assert!(cell.equals(&Value::Str("Rome".into())));
    }

    #[test]
    fn format_specs() {
        assert_eq!(format_spec(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_spec(&Value::Float(1_234_567.891), ",.1f").unwrap(), "1,234,567.9");
        assert_eq!(format_spec(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_spec(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_spec(&Value::Str("ab".into()), "*^6").unwrap(), "**ab**");
        assert_eq!(format_spec(&Value::Float(12345.0), ".3g").unwrap(), "1.23e+04");
        assert_eq!(format_spec(&Value::Int(7), "03d").unwrap(), "007");
        assert!(format_spec(&Value::Float(1.5), "d").is_err());
    }

    #[test]
    fn format_templates() {
        let args = Args {
            positional: vec![Value::Str("rain".into()), Value::Float(0.5)],
            keywords: vec![("unit".into(), Value::Str("mm".into()))],
        };
        assert_eq!(format_template("{} is {:.1f} {unit} {{x}}", &args).unwrap(), "rain is 0.5 mm {x}");
        assert_eq!(format_template("{1}/{0!r}", &args).unwrap(), "0.5/'rain'");
        assert!(format_template("{5}", &args).is_err());
    }

    #[test]
    fn numpy_ranges_respect_limits() {
        let Value::Series(range) = call(&Value::Module(Module::Numpy), "arange", &Args::positional(vec![Value::Int(4)])).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(range.floats(), vec![0.0, 1.0, 2.0, 3.0]);
        let huge = call(&Value::Module(Module::Numpy), "arange", &Args::positional(vec![Value::Float(1e12)]));
        assert!(matches!(huge, Err(SnippetError::TooLarge { .. })));
    }

    #[test]
    fn to_numeric_coerces() {
        let args = Args {
            positional: vec![Value::List(vec![Value::Str("1".into()), Value::Str("x".into())])],
            keywords: vec![("errors".into(), Value::Str("coerce".into()))],
        };
        let Value::Series(numbers) = call(&Value::Module(Module::Pandas), "to_numeric", &args).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(numbers.cells, vec![Cell::Number(1.0), Cell::Missing]);
    }
}
