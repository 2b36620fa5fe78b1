//! `plt`, `sns`, axes and figure calls
//!
//! Every drawing call resolves its target axes, converts its inputs into
//! data coordinates and appends marks. Text-only calls are recorded or
//! accepted without effect.

use crate::args::Args;
use crate::budget::Budget;
use crate::canvas::{parse_color, Axes, AxesRef, BoxStats, Canvas, CloseTarget, MarkKind, Rect};
use crate::error::SnippetError;
use crate::frame::{cell_text, Frame, Series};
use crate::value::Value;
use autolysis_table::{stats, Cell};
use std::f64::consts::PI;
use std::sync::Arc;

/// `plt` calls accepted without effect on the figure
const PYPLOT_DECORATIONS: &[&str] = &[
    "legend",
    "grid",
    "tight_layout",
    "xticks",
    "yticks",
    "show",
    "suptitle",
    "colorbar",
    "text",
    "annotate",
    "subplots_adjust",
    "axis",
    "xscale",
    "yscale",
    "margins",
    "locator_params",
    "setp",
    "rc",
    "draw",
    "ion",
    "ioff",
    "minorticks_on",
    "figtext",
    "tick_params",
];

/// Axes calls accepted without effect on the figure
const AXES_DECORATIONS: &[&str] = &[
    "legend",
    "grid",
    "tick_params",
    "set_xticks",
    "set_yticks",
    "set_xticklabels",
    "set_yticklabels",
    "axis",
    "invert_xaxis",
    "invert_yaxis",
    "text",
    "annotate",
    "set_aspect",
    "margins",
    "set_facecolor",
    "label_outer",
    "set_xscale",
    "set_yscale",
    "bar_label",
    "set_axisbelow",
    "locator_params",
    "minorticks_on",
    "set_frame_on",
    "set_axis_off",
];

/// Figure calls accepted without effect
const FIGURE_DECORATIONS: &[&str] = &[
    "suptitle",
    "tight_layout",
    "colorbar",
    "legend",
    "subplots_adjust",
    "show",
    "text",
    "align_labels",
    "set_dpi",
    "set_facecolor",
];

/// Seaborn theme calls
const SEABORN_THEME: &[&str] = &[
    "set",
    "set_theme",
    "set_style",
    "set_palette",
    "set_context",
    "despine",
    "color_palette",
    "reset_defaults",
    "reset_orig",
];

/// Calls that draw on an axes, shared by `plt` and axes handles
const DRAWING: &[&str] = &[
    "plot", "scatter", "bar", "barh", "hist", "boxplot", "imshow", "axhline", "axvline", "pie",
];

const KDE_POINTS: usize = 200;

// ---------------------------------------------------------------------------
// Input conversion

/// Cells of a vector-like argument
pub(crate) fn cells_of(value: &Value, what: &str) -> Result<Vec<Cell>, SnippetError> {
    match value {
        Value::Series(series) => Ok(series.cells.clone()),
        Value::Mask(mask) => Ok(mask
            .iter()
            .map(|b| Cell::Number(if *b { 1.0 } else { 0.0 }))
            .collect()),
        Value::List(items) | Value::Tuple(items) => items.iter().map(Value::to_cell).collect(),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Str(_) => Ok(vec![value.to_cell()?]),
        other => Err(SnippetError::type_error(format!(
            "{what} must be array-like, not {}",
            other.type_name()
        ))),
    }
}

/// Numeric data; text is an error
pub(crate) fn numbers_of(value: &Value, what: &str) -> Result<Vec<f64>, SnippetError> {
    cells_of(value, what)?
        .into_iter()
        .map(|cell| match cell {
            Cell::Number(n) => Ok(n),
            Cell::Missing => Ok(f64::NAN),
            Cell::Text(t) => Err(SnippetError::value_error(format!(
                "could not convert string to float: '{t}'"
            ))),
        })
        .collect()
}

/// Positions; text becomes categories of the axes
fn coords(axes: &mut Axes, value: &Value, what: &str) -> Result<Vec<f64>, SnippetError> {
    Ok(cells_of(value, what)?
        .iter()
        .map(|cell| match cell {
            Cell::Number(n) => *n,
            Cell::Text(t) => axes.category(t),
            Cell::Missing => f64::NAN,
        })
        .collect())
}

/// Positions of series labels
fn label_coords(axes: &mut Axes, labels: &[String]) -> Vec<f64> {
    labels
        .iter()
        .map(|label| match Cell::parse(label) {
            Cell::Number(n) => n,
            _ => axes.category(label),
        })
        .collect()
}

/// Default x for a y vector: series labels, else positions
#[allow(clippy::cast_precision_loss)]
fn default_x(axes: &mut Axes, y: &Value, n: usize) -> Vec<f64> {
    match y {
        Value::Series(series) => label_coords(axes, &series.labels),
        _ => (0..n).map(|i| i as f64).collect(),
    }
}

fn is_categorical(value: &Value) -> bool {
    cells_of(value, "data").is_ok_and(|cells| cells.iter().any(|c| matches!(c, Cell::Text(_))))
}

fn finite_pairs(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect()
}

fn same_length(xs: &[f64], ys: &[f64]) -> Result<(), SnippetError> {
    if xs.len() == ys.len() {
        Ok(())
    } else {
        Err(SnippetError::value_error(format!(
            "x and y must have same first dimension, but have shapes ({},) and ({},)",
            xs.len(),
            ys.len()
        )))
    }
}

fn explicit_color(args: &Args) -> Option<[u8; 3]> {
    args.kw("color")
        .or_else(|| args.kw("c"))
        .and_then(Value::as_str)
        .and_then(parse_color)
}

/// Axes from an `ax=` keyword, else the current axes
fn target(canvas: &mut Canvas, args: &Args) -> Result<AxesRef, SnippetError> {
    match args.kw("ax") {
        Some(Value::Axes(axes)) => Ok(*axes),
        Some(other) if !matches!(other, Value::None) => Err(SnippetError::type_error(format!(
            "ax must be an Axes, not {}",
            other.type_name()
        ))),
        _ => canvas.gca(),
    }
}

/// Rows of numbers from a frame or nested list
fn matrix_of(value: &Value) -> Result<Vec<Vec<f64>>, SnippetError> {
    match value {
        Value::Frame(frame) => Ok(frame.matrix()),
        Value::List(rows) | Value::Tuple(rows) => rows.iter().map(|row| numbers_of(row, "row")).collect(),
        other => Err(SnippetError::type_error(format!(
            "expected 2-D data, not {}",
            other.type_name()
        ))),
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

// ---------------------------------------------------------------------------
// Geometry builders

enum Bins {
    Count(usize),
    Edges(Vec<f64>),
}

fn bins_arg(args: &Args, index: usize, n: usize) -> Result<Bins, SnippetError> {
    match args.get(index, "bins") {
        None => Ok(Bins::Count(10)),
        Some(Value::Str(_)) => Ok(Bins::Count(sturges(n))),
        Some(v @ (Value::List(_) | Value::Tuple(_))) => Ok(Bins::Edges(numbers_of(v, "bins")?)),
        Some(v) => {
            let count = v.as_count("bins")?;
            if count == 0 {
                return Err(SnippetError::value_error("bins must be positive"));
            }
            Ok(Bins::Count(count.min(10_000)))
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn sturges(n: usize) -> usize {
    if n < 2 {
        1
    } else {
        (n as f64).log2().ceil() as usize + 1
    }
}

/// Histogram bars; `density` scales areas to sum to one
#[allow(clippy::cast_precision_loss)]
fn hist_rects(values: &[f64], bins: &Bins, density: bool) -> Vec<Rect> {
    let values = finite(values);
    let (edges, counts): (Vec<f64>, Vec<usize>) = match bins {
        Bins::Count(n) => match stats::histogram(&values, *n) {
            Some(h) => h,
            None => return Vec::new(),
        },
        Bins::Edges(edges) => {
            if edges.len() < 2 {
                return Vec::new();
            }
            let mut counts = vec![0; edges.len() - 1];
            for v in &values {
                let last = edges.len() - 2;
                if let Some(i) = (0..=last).find(|&i| *v >= edges[i] && (*v < edges[i + 1] || (i == last && *v <= edges[i + 1]))) {
                    counts[i] += 1;
                }
            }
            (edges.clone(), counts)
        }
    };
    let total: usize = counts.iter().sum();
    edges
        .windows(2)
        .zip(counts)
        .map(|(edge, count)| {
            let width = edge[1] - edge[0];
            let height = if density && total > 0 && width > 0.0 {
                count as f64 / (total as f64 * width)
            } else {
                count as f64
            };
            Rect {
                x0: edge[0],
                x1: edge[1],
                y0: 0.0,
                y1: height,
            }
        })
        .collect()
}

fn swap_rects(rects: Vec<Rect>) -> Vec<Rect> {
    rects
        .into_iter()
        .map(|r| Rect {
            x0: r.y0,
            x1: r.y1,
            y0: r.x0,
            y1: r.x1,
        })
        .collect()
}

fn bar_rects(positions: &[f64], heights: &[f64], width: f64, base: f64) -> Vec<Rect> {
    positions
        .iter()
        .zip(heights)
        .filter(|(p, h)| p.is_finite() && h.is_finite())
        .map(|(p, h)| Rect {
            x0: p - width / 2.0,
            x1: p + width / 2.0,
            y0: base,
            y1: base + h,
        })
        .collect()
}

/// Gaussian kernel density with Silverman's bandwidth
#[allow(clippy::cast_precision_loss)]
fn kde_curve(values: &[f64], budget: &Budget) -> Result<Option<Vec<(f64, f64)>>, SnippetError> {
    let values = finite(values);
    let Some(std) = stats::std_dev(&values).filter(|s| *s > 0.0) else {
        return Ok(None);
    };
    let n = values.len() as f64;
    let h = 1.06 * std * n.powf(-0.2);
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min) - 3.0 * h;
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 3.0 * h;
    let norm = 1.0 / (n * h * (2.0 * PI).sqrt());
    let mut curve = Vec::with_capacity(KDE_POINTS);
    for i in 0..KDE_POINTS {
        if i % 20 == 0 {
            budget.check()?;
        }
        let x = lo + (hi - lo) * i as f64 / (KDE_POINTS - 1) as f64;
        let density: f64 = values.iter().map(|v| (-0.5 * ((x - v) / h).powi(2)).exp()).sum();
        curve.push((x, density * norm));
    }
    Ok(Some(curve))
}

/// Box per group of values, at positions `first`, `first + 1`, ...
#[allow(clippy::cast_precision_loss)]
fn push_boxes(axes: &mut Axes, groups: &[Vec<f64>], first: f64, color: Option<[u8; 3]>) {
    let mut color = color;
    for (i, values) in groups.iter().enumerate() {
        if let Some(stats) = BoxStats::from_values(first + i as f64, values) {
            axes.push(MarkKind::Box(stats), color);
            color = color.or_else(|| axes.marks.last().map(|m| m.color));
        }
    }
}

/// Mean of values per key, keys in first-seen order
fn grouped_mean(keys: &[Cell], values: &[f64]) -> Vec<(String, f64)> {
    let mut groups: indexmap::IndexMap<String, Vec<f64>> = indexmap::IndexMap::new();
    for (key, value) in keys.iter().zip(values) {
        if key.is_missing() || !value.is_finite() {
            continue;
        }
        groups.entry(cell_text(key)).or_default().push(*value);
    }
    groups
        .into_iter()
        .filter_map(|(k, vs)| stats::mean(&vs).map(|m| (k, m)))
        .collect()
}

/// Values per key, keys in first-seen order
fn grouped_values(keys: &[Cell], values: &[f64]) -> Vec<(String, Vec<f64>)> {
    let mut groups: indexmap::IndexMap<String, Vec<f64>> = indexmap::IndexMap::new();
    for (key, value) in keys.iter().zip(values) {
        if !key.is_missing() {
            groups.entry(cell_text(key)).or_default().push(*value);
        }
    }
    groups.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Drawing calls

/// `plot`, `scatter`, `bar`, ... on one axes
pub(crate) fn draw(
    canvas: &mut Canvas,
    target: AxesRef,
    name: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    let color = explicit_color(args);
    let axes = canvas.axes_mut(target)?;
    match name {
        "plot" => plot(axes, args, color)?,
        "scatter" => {
            let x = args.require(0, "x", "scatter")?;
            let y = args.require(1, "y", "scatter")?;
            let xs = coords(axes, x, "x")?;
            let ys = coords(axes, y, "y")?;
            same_length(&xs, &ys)?;
            axes.push(MarkKind::Points(finite_pairs(&xs, &ys)), color);
        }
        "bar" | "barh" => {
            let horizontal = name == "barh";
            let (pos_name, len_name, thick_name, base_name) = if horizontal {
                ("y", "width", "height", "left")
            } else {
                ("x", "height", "width", "bottom")
            };
            let positions = coords(axes, args.require(0, pos_name, name)?, pos_name)?;
            let mut lengths = numbers_of(args.require(1, len_name, name)?, len_name)?;
            if lengths.len() == 1 && positions.len() > 1 {
                lengths = vec![lengths[0]; positions.len()];
            }
            same_length(&positions, &lengths)?;
            let thickness = args.f64_or(usize::MAX, thick_name, 0.8)?;
            let base = args.f64_or(usize::MAX, base_name, 0.0)?;
            let rects = bar_rects(&positions, &lengths, thickness, base);
            let rects = if horizontal { swap_rects(rects) } else { rects };
            axes.push(MarkKind::Rects(rects), color);
        }
        "hist" => {
            let values = numbers_of(args.require(0, "x", "hist")?, "x")?;
            let bins = bins_arg(args, 1, values.len())?;
            let rects = hist_rects(&values, &bins, args.bool_or(usize::MAX, "density", false));
            let horizontal = args.str_opt(usize::MAX, "orientation") == Some("horizontal");
            let rects = if horizontal { swap_rects(rects) } else { rects };
            axes.push(MarkKind::Rects(rects), color);
        }
        "boxplot" => {
            let data = args.require(0, "x", "boxplot")?;
            let groups = box_groups(data)?;
            push_boxes(axes, &groups, 1.0, color);
        }
        "imshow" => {
            let matrix = matrix_of(args.require(0, "X", "imshow")?)?;
            axes.push(MarkKind::Heatmap(matrix), None);
        }
        "axhline" => {
            let y = args.f64_or(0, "y", 0.0)?;
            axes.push(MarkKind::HLine(y), color);
        }
        "axvline" => {
            let x = args.f64_or(0, "x", 0.0)?;
            axes.push(MarkKind::VLine(x), color);
        }
        "pie" => {
            let values = numbers_of(args.require(0, "x", "pie")?, "x")?;
            axes.push(MarkKind::Pie(values), None);
        }
        other => return Err(SnippetError::unsupported(format!("drawing call '{other}'"))),
    }
    Ok(Value::None)
}

/// `plot(y)`, `plot(x, y)` and either with a trailing format string
fn plot(axes: &mut Axes, args: &Args, color: Option<[u8; 3]>) -> Result<(), SnippetError> {
    let mut data: Vec<&Value> = Vec::new();
    let mut format = None;
    for value in &args.positional {
        match value {
            Value::Str(f) if !data.is_empty() => format = Some(f.as_str()),
            _ => data.push(value),
        }
    }
    let (xs, ys) = match data.as_slice() {
        [y] => {
            let ys = numbers_of(y, "y")?;
            (default_x(axes, y, ys.len()), ys)
        }
        [x, y] => (coords(axes, x, "x")?, numbers_of(y, "y")?),
        [] => match (args.kw("x"), args.kw("y")) {
            (Some(x), Some(y)) => (coords(axes, x, "x")?, numbers_of(y, "y")?),
            _ => return Err(SnippetError::type_error("plot() needs y values")),
        },
        _ => return Err(SnippetError::unsupported("plot with several x/y groups")),
    };
    same_length(&xs, &ys)?;

    let format_color = format
        .and_then(|f| f.chars().find(|c| "bgrcmykw".contains(*c)))
        .and_then(|c| parse_color(&c.to_string()));
    let markers_only = format.is_some_and(|f| f.chars().any(|c| "o.sx^*+dv".contains(c)) && !f.contains('-'));
    let points = finite_pairs(&xs, &ys);
    let kind = if markers_only {
        MarkKind::Points(points)
    } else {
        MarkKind::Line(points)
    };
    axes.push(kind, color.or(format_color));
    Ok(())
}

/// Groups for a box plot: frame columns, nested sequences or one vector
fn box_groups(data: &Value) -> Result<Vec<Vec<f64>>, SnippetError> {
    match data {
        Value::Frame(frame) => Ok((0..frame.n_columns())
            .filter(|&i| frame.is_numeric_column(i))
            .map(|i| frame.columns[i].iter().map(|c| c.as_number().unwrap_or(f64::NAN)).collect())
            .collect()),
        Value::List(items) | Value::Tuple(items)
            if items.iter().all(|v| matches!(v, Value::List(_) | Value::Tuple(_) | Value::Series(_))) && !items.is_empty() =>
        {
            items.iter().map(|v| numbers_of(v, "x")).collect()
        }
        other => Ok(vec![numbers_of(other, "x")?]),
    }
}

fn limits(canvas: &mut Canvas, x_axis: bool, args: &Args) -> Result<Value, SnippetError> {
    let target = canvas.gca()?;
    set_limits(canvas, target, x_axis, args)
}

fn set_limits(canvas: &mut Canvas, target: AxesRef, x_axis: bool, args: &Args) -> Result<Value, SnippetError> {
    let (lo_name, hi_name) = if x_axis { ("left", "right") } else { ("bottom", "top") };
    let axes = canvas.axes_mut(target)?;
    let requested = match args.positional.first() {
        Some(pair @ (Value::List(_) | Value::Tuple(_))) => {
            let values = numbers_of(pair, "limits")?;
            match values.as_slice() {
                [lo, hi] => Some((*lo, *hi)),
                _ => return Err(SnippetError::value_error("limits must have two elements")),
            }
        }
        _ => {
            let lo = args.get(0, lo_name).and_then(Value::as_f64);
            let hi = args.get(1, hi_name).and_then(Value::as_f64);
            let current = if x_axis { axes.xlim } else { axes.ylim };
            match (lo, hi) {
                (None, None) => None,
                (lo, hi) => {
                    let (clo, chi) = current.unwrap_or((0.0, 1.0));
                    Some((lo.unwrap_or(clo), hi.unwrap_or(chi)))
                }
            }
        }
    };
    let slot = if x_axis { &mut axes.xlim } else { &mut axes.ylim };
    if let Some(range) = requested {
        *slot = Some(range);
    }
    let (lo, hi) = slot.unwrap_or((0.0, 1.0));
    Ok(Value::Tuple(vec![Value::Float(lo), Value::Float(hi)]))
}

fn record_text(canvas: &mut Canvas, target: AxesRef, field: &str, args: &Args) -> Result<Value, SnippetError> {
    let text = args.get(0, "label").map(Value::display);
    let axes = canvas.axes_mut(target)?;
    match field {
        "title" => axes.title = text,
        "xlabel" => axes.xlabel = text,
        _ => axes.ylabel = text,
    }
    Ok(Value::None)
}

/// Axes handle for a subplot grid, squeezed like matplotlib
fn grid_value(rows: usize, cols: usize, refs: Vec<AxesRef>, squeeze: bool) -> Value {
    let mut handles: Vec<Value> = refs.into_iter().map(Value::Axes).collect();
    if squeeze && handles.len() == 1 {
        return handles.remove(0);
    }
    if squeeze && (rows == 1 || cols == 1) {
        return Value::List(handles);
    }
    let mut grid = Vec::with_capacity(rows);
    for _ in 0..rows {
        let rest = handles.split_off(cols.min(handles.len()));
        grid.push(Value::List(std::mem::replace(&mut handles, rest)));
    }
    Value::List(grid)
}

// ---------------------------------------------------------------------------
// Receivers

/// `plt.<name>(...)`
pub(crate) fn pyplot(canvas: &mut Canvas, name: &str, args: &Args) -> Result<Value, SnippetError> {
    match name {
        "figure" => {
            let id = canvas.open(1, 1, args.pair(usize::MAX, "figsize")?)?;
            Ok(Value::Figure(id))
        }
        "subplots" => {
            let rows = args.count_or(0, "nrows", 1)?;
            let cols = args.count_or(1, "ncols", 1)?;
            let id = canvas.open(rows, cols, args.pair(usize::MAX, "figsize")?)?;
            let refs = canvas.axes_of(id)?;
            let squeeze = args.bool_or(usize::MAX, "squeeze", true);
            Ok(Value::Tuple(vec![Value::Figure(id), grid_value(rows, cols, refs, squeeze)]))
        }
        "subplot" => {
            let (rows, cols, index) = match args.positional.as_slice() {
                [code] => {
                    let code = code.as_count("subplot")?;
                    (code / 100, (code / 10) % 10, code % 10)
                }
                _ => (
                    args.count_or(0, "nrows", 1)?,
                    args.count_or(1, "ncols", 1)?,
                    args.count_or(2, "index", 1)?,
                ),
            };
            Ok(Value::Axes(canvas.subplot(rows, cols, index)?))
        }
        "gca" => Ok(Value::Axes(canvas.gca()?)),
        "gcf" => Ok(Value::Figure(canvas.current_figure()?)),
        "title" | "xlabel" | "ylabel" => {
            let target = canvas.gca()?;
            record_text(canvas, target, name, args)
        }
        "xlim" => limits(canvas, true, args),
        "ylim" => limits(canvas, false, args),
        "close" => {
            let target = match args.positional.first() {
                None => CloseTarget::Current,
                Some(Value::Str(s)) if s == "all" => CloseTarget::All,
                Some(Value::Figure(id)) => CloseTarget::Figure(*id),
                Some(other) => {
                    return Err(SnippetError::type_error(format!(
                        "close() got unexpected {}",
                        other.type_name()
                    )))
                }
            };
            canvas.close(target);
            Ok(Value::None)
        }
        "clf" => {
            canvas.clear_figure()?;
            Ok(Value::None)
        }
        "cla" => {
            let target = canvas.gca()?;
            canvas.axes_mut(target)?.clear();
            Ok(Value::None)
        }
        "savefig" => {
            let id = canvas.current_figure()?;
            canvas.snapshot(id)?;
            Ok(Value::None)
        }
        name if DRAWING.contains(&name) => {
            let target = canvas.gca()?;
            draw(canvas, target, name, args)
        }
        name if PYPLOT_DECORATIONS.contains(&name) || name.contains('.') => Ok(Value::None),
        other => Err(SnippetError::unsupported(format!("plt.{other}"))),
    }
}

/// `ax.<name>(...)`
pub(crate) fn axes_method(
    canvas: &mut Canvas,
    target: AxesRef,
    name: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    match name {
        name if DRAWING.contains(&name) => draw(canvas, target, name, args),
        "set_title" => record_text(canvas, target, "title", args),
        "set_xlabel" => record_text(canvas, target, "xlabel", args),
        "set_ylabel" => record_text(canvas, target, "ylabel", args),
        "set_xlim" => set_limits(canvas, target, true, args),
        "set_ylim" => set_limits(canvas, target, false, args),
        "set" => {
            for (key, value) in &args.keywords {
                let single = Args::positional(vec![value.clone()]);
                match key.as_str() {
                    "title" | "xlabel" | "ylabel" => {
                        record_text(canvas, target, key, &single)?;
                    }
                    "xlim" => {
                        set_limits(canvas, target, true, &single)?;
                    }
                    "ylim" => {
                        set_limits(canvas, target, false, &single)?;
                    }
                    _ => {}
                }
            }
            Ok(Value::None)
        }
        "cla" | "clear" => {
            canvas.axes_mut(target)?.clear();
            Ok(Value::None)
        }
        "get_figure" => Ok(Value::Figure(target.figure)),
        name if AXES_DECORATIONS.contains(&name) || name.contains('.') => Ok(Value::None),
        other => Err(SnippetError::unsupported(format!("Axes.{other}"))),
    }
}

/// `fig.<name>(...)`
pub(crate) fn figure_method(
    canvas: &mut Canvas,
    id: usize,
    name: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    match name {
        "savefig" => {
            canvas.snapshot(id)?;
            Ok(Value::None)
        }
        "set_size_inches" => {
            let size = match args.pair(0, "w")? {
                Some(size) => size,
                None => (args.f64_or(0, "w", 6.4)?, args.f64_or(1, "h", 4.8)?),
            };
            canvas.resize(id, size)?;
            Ok(Value::None)
        }
        "add_subplot" | "gca" => {
            let target = AxesRef { figure: id, axes: 0 };
            canvas.activate(target)?;
            Ok(Value::Axes(target))
        }
        "clf" => {
            canvas.activate(AxesRef { figure: id, axes: 0 })?;
            canvas.clear_figure()?;
            Ok(Value::None)
        }
        name if FIGURE_DECORATIONS.contains(&name) || name.contains('.') => Ok(Value::None),
        other => Err(SnippetError::unsupported(format!("Figure.{other}"))),
    }
}

/// Resolved seaborn inputs: long-form frame, x and y vectors
struct SeabornInputs {
    frame: Option<Arc<Frame>>,
    x: Option<Value>,
    y: Option<Value>,
}

fn seaborn_inputs(args: &Args) -> Result<SeabornInputs, SnippetError> {
    let data = args.get(0, "data").cloned();
    let frame = match &data {
        Some(Value::Frame(frame)) => Some(Arc::clone(frame)),
        _ => None,
    };
    let resolve = |value: Option<&Value>| -> Result<Option<Value>, SnippetError> {
        match (value, &frame) {
            (Some(Value::Str(name)), Some(frame)) => Ok(Some(Value::series(frame.column(name)?))),
            (Some(Value::None) | None, _) => Ok(None),
            (Some(other), _) => Ok(Some(other.clone())),
        }
    };
    let mut x = resolve(args.kw("x"))?;
    let y = resolve(args.kw("y"))?;
    if x.is_none() && y.is_none() && frame.is_none() {
        x = data.filter(|d| !matches!(d, Value::None));
    }
    Ok(SeabornInputs { frame, x, y })
}

/// Numeric columns of a wide-form frame
fn numeric_columns(frame: &Frame) -> Vec<(String, Vec<f64>)> {
    (0..frame.n_columns())
        .filter(|&i| frame.is_numeric_column(i))
        .map(|i| {
            (
                frame.names[i].clone(),
                frame.columns[i].iter().map(|c| c.as_number().unwrap_or(f64::NAN)).collect(),
            )
        })
        .collect()
}

/// Count bars per category, vertical unless `horizontal`
fn count_bars(axes: &mut Axes, values: &Value, horizontal: bool, color: Option<[u8; 3]>) -> Result<(), SnippetError> {
    let cells = cells_of(values, "data")?;
    let mut counts: indexmap::IndexMap<String, f64> = indexmap::IndexMap::new();
    let numeric = cells.iter().all(|c| !matches!(c, Cell::Text(_)));
    let mut present: Vec<&Cell> = cells.iter().filter(|c| !c.is_missing()).collect();
    if numeric {
        present.sort_by(|a, b| crate::frame::cmp_cells(a, b));
    }
    for cell in present {
        *counts.entry(cell_text(cell)).or_insert(0.0) += 1.0;
    }
    let positions: Vec<f64> = counts.keys().map(|k| axes.category(k)).collect();
    let heights: Vec<f64> = counts.values().copied().collect();
    let rects = bar_rects(&positions, &heights, 0.8, 0.0);
    axes.push(
        MarkKind::Rects(if horizontal { swap_rects(rects) } else { rects }),
        color,
    );
    Ok(())
}

/// `sns.<name>(...)`
pub(crate) fn seaborn(
    canvas: &mut Canvas,
    budget: &Budget,
    name: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    if SEABORN_THEME.contains(&name) {
        return Ok(Value::None);
    }
    let inputs = seaborn_inputs(args)?;
    let color = explicit_color(args);
    let target = match name {
        "heatmap" | "histplot" | "distplot" | "kdeplot" | "countplot" | "barplot" | "scatterplot"
        | "lineplot" | "boxplot" | "violinplot" | "stripplot" | "regplot" => target(canvas, args)?,
        other => return Err(SnippetError::unsupported(format!("sns.{other}"))),
    };
    let axes = canvas.axes_mut(target)?;

    match name {
        "heatmap" => {
            let data = args.require(0, "data", "heatmap")?;
            axes.push(MarkKind::Heatmap(matrix_of(data)?), None);
        }
        "histplot" | "distplot" => {
            let horizontal = inputs.x.is_none() && inputs.y.is_some();
            match inputs.x.as_ref().or(inputs.y.as_ref()) {
                Some(values) if is_categorical(values) => count_bars(axes, values, horizontal, color)?,
                Some(values) => {
                    let numbers = numbers_of(values, "x")?;
                    hist_with_kde(axes, budget, &numbers, args, name == "distplot", horizontal, color)?;
                }
                None => {
                    let frame = inputs
                        .frame
                        .ok_or_else(|| SnippetError::type_error(format!("{name}() needs data")))?;
                    for (_, numbers) in numeric_columns(&frame) {
                        hist_with_kde(axes, budget, &numbers, args, false, false, None)?;
                    }
                }
            }
        }
        "kdeplot" => {
            let columns: Vec<Vec<f64>> = match inputs.x.as_ref().or(inputs.y.as_ref()) {
                Some(values) => vec![numbers_of(values, "x")?],
                None => inputs
                    .frame
                    .map(|f| numeric_columns(&f).into_iter().map(|(_, v)| v).collect())
                    .unwrap_or_default(),
            };
            for numbers in columns {
                if let Some(curve) = kde_curve(&numbers, budget)? {
                    axes.push(MarkKind::Line(curve), color);
                }
            }
        }
        "countplot" => {
            let (values, horizontal) = match (&inputs.x, &inputs.y) {
                (Some(x), _) => (x, false),
                (None, Some(y)) => (y, true),
                (None, None) => return Err(SnippetError::type_error("countplot() needs x or y")),
            };
            count_bars(axes, values, horizontal, color)?;
        }
        "barplot" => match (&inputs.x, &inputs.y) {
            (Some(x), Some(y)) => {
                let horizontal = !is_categorical(x) && is_categorical(y);
                let (keys, values) = if horizontal { (y, x) } else { (x, y) };
                let means = grouped_mean(&cells_of(keys, "x")?, &numbers_of(values, "y")?);
                let positions: Vec<f64> = means.iter().map(|(k, _)| axes.category(k)).collect();
                let heights: Vec<f64> = means.iter().map(|(_, m)| *m).collect();
                let rects = bar_rects(&positions, &heights, 0.8, 0.0);
                axes.push(MarkKind::Rects(if horizontal { swap_rects(rects) } else { rects }), color);
            }
            (Some(single), None) | (None, Some(single)) => {
                let mean = stats::mean(&finite(&numbers_of(single, "x")?)).unwrap_or(0.0);
                axes.push(MarkKind::Rects(bar_rects(&[0.0], &[mean], 0.8, 0.0)), color);
            }
            (None, None) => {
                let frame = inputs
                    .frame
                    .ok_or_else(|| SnippetError::type_error("barplot() needs data"))?;
                let means: Vec<(String, f64)> = numeric_columns(&frame)
                    .into_iter()
                    .filter_map(|(name, v)| stats::mean(&finite(&v)).map(|m| (name, m)))
                    .collect();
                let positions: Vec<f64> = means.iter().map(|(k, _)| axes.category(k)).collect();
                let heights: Vec<f64> = means.iter().map(|(_, m)| *m).collect();
                axes.push(MarkKind::Rects(bar_rects(&positions, &heights, 0.8, 0.0)), color);
            }
        },
        "scatterplot" | "stripplot" | "regplot" => {
            let (Some(x), Some(y)) = (&inputs.x, &inputs.y) else {
                return Err(SnippetError::type_error(format!("{name}() needs x and y")));
            };
            let xs = coords(axes, x, "x")?;
            let ys = coords(axes, y, "y")?;
            same_length(&xs, &ys)?;
            let points = finite_pairs(&xs, &ys);
            if name == "regplot" {
                if let Some(line) = fitted_line(&points) {
                    axes.push(MarkKind::Points(points), color);
                    let line_color = axes.marks.last().map(|m| m.color);
                    axes.push(MarkKind::Line(line), line_color);
                    return Ok(Value::Axes(target));
                }
            }
            axes.push(MarkKind::Points(points), color);
        }
        "lineplot" => {
            let (xs, ys) = match (&inputs.x, &inputs.y) {
                (Some(x), Some(y)) => (coords(axes, x, "x")?, numbers_of(y, "y")?),
                (Some(y), None) | (None, Some(y)) => {
                    let ys = numbers_of(y, "y")?;
                    (default_x(axes, y, ys.len()), ys)
                }
                (None, None) => return Err(SnippetError::type_error("lineplot() needs x or y")),
            };
            same_length(&xs, &ys)?;
            let keys: Vec<Cell> = xs.iter().map(|x| Cell::Number(*x)).collect();
            let mut means: Vec<(f64, f64)> = grouped_mean(&keys, &ys)
                .into_iter()
                .filter_map(|(k, m)| k.parse::<f64>().ok().map(|x| (x, m)))
                .collect();
            means.sort_by(|a, b| a.0.total_cmp(&b.0));
            axes.push(MarkKind::Line(means), color);
        }
        "boxplot" | "violinplot" => match (&inputs.x, &inputs.y) {
            (Some(x), Some(y)) => {
                let horizontal = !is_categorical(x) && is_categorical(y);
                let (keys, values) = if horizontal { (y, x) } else { (x, y) };
                let groups = grouped_values(&cells_of(keys, "x")?, &numbers_of(values, "y")?);
                for (key, _) in &groups {
                    axes.category(key);
                }
                let values: Vec<Vec<f64>> = groups.into_iter().map(|(_, v)| v).collect();
                push_boxes(axes, &values, 0.0, color);
            }
            (Some(single), None) | (None, Some(single)) => {
                push_boxes(axes, &[numbers_of(single, "x")?], 0.0, color);
            }
            (None, None) => {
                let frame = inputs
                    .frame
                    .ok_or_else(|| SnippetError::type_error(format!("{name}() needs data")))?;
                let columns: Vec<Vec<f64>> = numeric_columns(&frame).into_iter().map(|(_, v)| v).collect();
                push_boxes(axes, &columns, 0.0, color);
            }
        },
        _ => {}
    }
    Ok(Value::Axes(target))
}

#[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
fn hist_with_kde(
    axes: &mut Axes,
    budget: &Budget,
    numbers: &[f64],
    args: &Args,
    kde_default: bool,
    horizontal: bool,
    color: Option<[u8; 3]>,
) -> Result<(), SnippetError> {
    let bins = match args.kw("bins") {
        Some(Value::Int(_) | Value::List(_) | Value::Tuple(_)) => bins_arg(args, usize::MAX, numbers.len())?,
        _ => Bins::Count(sturges(finite(numbers).len())),
    };
    let rects = hist_rects(numbers, &bins, false);
    let bin_width = rects.first().map_or(1.0, |r| r.x1 - r.x0);
    let rects = if horizontal { swap_rects(rects) } else { rects };
    axes.push(MarkKind::Rects(rects), color);
    if args.bool_or(usize::MAX, "kde", kde_default) {
        let n = finite(numbers).len() as f64;
        if let Some(curve) = kde_curve(numbers, budget)? {
            let scaled = curve
                .into_iter()
                .map(|(x, d)| if horizontal { (d * n * bin_width, x) } else { (x, d * n * bin_width) })
                .collect();
            let line_color = axes.marks.last().map(|m| m.color);
            axes.push(MarkKind::Line(scaled), line_color);
        }
    }
    Ok(())
}

/// Least-squares line across the x range of the points
#[allow(clippy::cast_precision_loss)]
fn fitted_line(points: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let (mx, my) = (stats::mean(&xs)?, stats::mean(&ys)?);
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;
    let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(vec![(lo, my + slope * (lo - mx)), (hi, my + slope * (hi - mx))])
}

// ---------------------------------------------------------------------------
// pandas plotting

/// `series.plot(kind=...)` and `series.plot.<kind>()`
pub(crate) fn series_plot(
    canvas: &mut Canvas,
    budget: &Budget,
    series: &Series,
    kind: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    let target = target(canvas, args)?;
    let color = explicit_color(args);
    let axes = canvas.axes_mut(target)?;
    let values = series.floats();
    match kind {
        "line" | "area" => {
            let xs = label_coords(axes, &series.labels);
            axes.push(MarkKind::Line(finite_pairs(&xs, &values)), color);
        }
        "bar" | "barh" => {
            let positions: Vec<f64> = series.labels.iter().map(|l| axes.category(l)).collect();
            let rects = bar_rects(&positions, &values, 0.8, 0.0);
            let rects = if kind == "barh" { swap_rects(rects) } else { rects };
            axes.push(MarkKind::Rects(rects), color);
        }
        "hist" => {
            let bins = bins_arg(args, usize::MAX, values.len())?;
            axes.push(MarkKind::Rects(hist_rects(&values, &bins, false)), color);
        }
        "box" => push_boxes(axes, &[values], 1.0, color),
        "kde" | "density" => {
            if let Some(curve) = kde_curve(&values, budget)? {
                axes.push(MarkKind::Line(curve), color);
            }
        }
        "pie" => axes.push(MarkKind::Pie(values), None),
        other => return Err(SnippetError::unsupported(format!("plot kind '{other}'"))),
    }
    Ok(Value::Axes(target))
}

/// `frame.plot(x=, y=, kind=)` and `frame.plot.<kind>()`
#[allow(clippy::cast_precision_loss)]
pub(crate) fn frame_plot(
    canvas: &mut Canvas,
    budget: &Budget,
    frame: &Frame,
    kind: &str,
    args: &Args,
) -> Result<Value, SnippetError> {
    let x_name = args.str_opt(0, "x").map(str::to_string);
    let y_names: Vec<String> = match args.get(1, "y") {
        Some(v) => v.as_names("y")?,
        None => (0..frame.n_columns())
            .filter(|&i| frame.is_numeric_column(i) && Some(&frame.names[i]) != x_name.as_ref())
            .map(|i| frame.names[i].clone())
            .collect(),
    };
    let y_columns: Vec<Series> = y_names.iter().map(|n| frame.column(n)).collect::<Result<_, _>>()?;

    if kind == "scatter" {
        let (Some(x), Some(y)) = (&x_name, y_names.first()) else {
            return Err(SnippetError::value_error("scatter requires an x and y column"));
        };
        let target = target(canvas, args)?;
        let color = explicit_color(args);
        let axes = canvas.axes_mut(target)?;
        let xs = coords(axes, &Value::series(frame.column(x)?), "x")?;
        let ys = coords(axes, &Value::series(frame.column(y)?), "y")?;
        axes.push(MarkKind::Points(finite_pairs(&xs, &ys)), color);
        return Ok(Value::Axes(target));
    }

    if kind == "pie" {
        let column = y_columns
            .first()
            .ok_or_else(|| SnippetError::value_error("pie requires a y column"))?;
        return series_plot(canvas, budget, column, "pie", args);
    }

    let target = target(canvas, args)?;
    let axes = canvas.axes_mut(target)?;
    let x_labels: Vec<String> = match &x_name {
        Some(name) => frame.column(name)?.cells.iter().map(cell_text).collect(),
        None => frame.labels.clone(),
    };
    match kind {
        "line" | "area" => {
            let xs = label_coords(axes, &x_labels);
            for column in &y_columns {
                axes.push(MarkKind::Line(finite_pairs(&xs, &column.floats())), None);
            }
        }
        "bar" | "barh" => {
            let positions: Vec<f64> = x_labels.iter().map(|l| axes.category(l)).collect();
            let width = 0.8 / y_columns.len().max(1) as f64;
            for (j, column) in y_columns.iter().enumerate() {
                let shifted: Vec<f64> = positions
                    .iter()
                    .map(|p| p - 0.4 + width * (j as f64 + 0.5))
                    .collect();
                let rects = bar_rects(&shifted, &column.floats(), width, 0.0);
                let rects = if kind == "barh" { swap_rects(rects) } else { rects };
                axes.push(MarkKind::Rects(rects), None);
            }
        }
        "hist" => {
            let bins = bins_arg(args, usize::MAX, frame.n_rows())?;
            for column in &y_columns {
                axes.push(MarkKind::Rects(hist_rects(&column.floats(), &bins, false)), None);
            }
        }
        "box" => {
            let groups: Vec<Vec<f64>> = y_columns.iter().map(Series::floats).collect();
            push_boxes(axes, &groups, 1.0, None);
        }
        "kde" | "density" => {
            for column in &y_columns {
                if let Some(curve) = kde_curve(&column.floats(), budget)? {
                    axes.push(MarkKind::Line(curve), None);
                }
            }
        }
        other => return Err(SnippetError::unsupported(format!("plot kind '{other}'"))),
    }
    Ok(Value::Axes(target))
}

/// `frame.hist()`: one histogram per numeric column on a new grid figure
pub(crate) fn frame_hist(canvas: &mut Canvas, frame: &Frame, args: &Args) -> Result<Value, SnippetError> {
    let columns = numeric_columns(frame);
    if columns.is_empty() {
        return Err(SnippetError::value_error("hist method requires numerical columns"));
    }
    let cols = columns.len().min(3);
    let rows = columns.len().div_ceil(cols);
    let id = canvas.open(rows, cols, args.pair(usize::MAX, "figsize")?)?;
    let bins = bins_arg(args, usize::MAX, frame.n_rows())?;
    for (axes_index, (_, values)) in columns.iter().enumerate() {
        let axes = canvas.axes_mut(AxesRef { figure: id, axes: axes_index })?;
        axes.push(MarkKind::Rects(hist_rects(values, &bins, false)), None);
    }
    Ok(Value::None)
}

/// `frame.boxplot(column=...)`
pub(crate) fn frame_boxplot(canvas: &mut Canvas, frame: &Frame, args: &Args) -> Result<Value, SnippetError> {
    let selected = match args.get(0, "column") {
        Some(names) => frame.select(&names.as_names("column")?)?,
        None => frame.clone(),
    };
    let target = target(canvas, args)?;
    let groups: Vec<Vec<f64>> = numeric_columns(&selected).into_iter().map(|(_, v)| v).collect();
    push_boxes(canvas.axes_mut(target)?, &groups, 1.0, None);
    Ok(Value::Axes(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn canvas() -> Canvas {
        Canvas::new((640, 480), 4000)
    }

    fn budget() -> Budget {
        Budget::new(Duration::from_secs(5), Arc::new(AtomicBool::new(false)), 1000)
    }

    fn numbers(values: &[f64]) -> Value {
        Value::List(values.iter().map(|v| Value::Float(*v)).collect())
    }

    fn marks(canvas: Canvas) -> Vec<MarkKind> {
        canvas
            .finish()
            .map(|f| f.axes.into_iter().flat_map(|a| a.marks).map(|m| m.kind).collect())
            .unwrap_or_default()
    }

    #[test]
    fn plot_single_vector_uses_positions() {
        let mut canvas = canvas();
        pyplot(&mut canvas, "plot", &Args::positional(vec![numbers(&[5.0, 6.0])])).unwrap();
        assert_eq!(marks(canvas), vec![MarkKind::Line(vec![(0.0, 5.0), (1.0, 6.0)])]);
    }

    #[test]
    fn plot_length_mismatch_fails() {
        let mut canvas = canvas();
        let args = Args::positional(vec![numbers(&[1.0, 2.0]), numbers(&[1.0])]);
        assert!(matches!(pyplot(&mut canvas, "plot", &args), Err(SnippetError::Value(_))));
    }

    #[test]
    fn categorical_bars() {
        let mut canvas = canvas();
        let labels = Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]);
        pyplot(&mut canvas, "bar", &Args::positional(vec![labels, numbers(&[3.0, 4.0])])).unwrap();
        let MarkKind::Rects(rects) = &marks(canvas)[0] else {
            panic!("expected bars");
        };
        assert_eq!(rects.len(), 2);
        assert!((rects[1].x0 - 0.6).abs() < 1e-9);
        assert_eq!(rects[1].y1, 4.0);
    }

    #[test]
    fn subplots_grid_shapes() {
        let mut canvas = canvas();
        let args = Args::positional(vec![Value::Int(2), Value::Int(2)]);
        let Value::Tuple(parts) = pyplot(&mut canvas, "subplots", &args).unwrap() else {
            panic!("expected tuple");
        };
        let Value::List(rows) = &parts[1] else {
            panic!("expected grid");
        };
        assert_eq!(rows.len(), 2);
        assert!(matches!(&rows[1], Value::List(cells) if cells.len() == 2));
    }

    #[test]
    fn seaborn_countplot_counts() {
        let mut canvas = canvas();
        let args = Args {
            positional: Vec::new(),
            keywords: vec![(
                "x".into(),
                Value::List(vec![Value::Str("a".into()), Value::Str("b".into()), Value::Str("a".into())]),
            )],
        };
        seaborn(&mut canvas, &budget(), "countplot", &args).unwrap();
        let MarkKind::Rects(rects) = &marks(canvas)[0] else {
            panic!("expected bars");
        };
        assert_eq!(rects[0].y1, 2.0);
        assert_eq!(rects[1].y1, 1.0);
    }

    #[test]
    fn seaborn_unknown_function_is_unsupported() {
        let mut canvas = canvas();
        let err = seaborn(&mut canvas, &budget(), "pairplot", &Args::default()).unwrap_err();
        assert_eq!(err, SnippetError::unsupported("sns.pairplot"));
    }

    #[test]
    fn histogram_with_explicit_edges() {
        let rects = hist_rects(&[0.5, 1.5, 2.0], &Bins::Edges(vec![0.0, 1.0, 2.0]), false);
        assert_eq!(rects.iter().map(|r| r.y1).collect::<Vec<_>>(), vec![1.0, 2.0]);
    }

    #[test]
    fn kde_integrates_to_about_one() {
        let values: Vec<f64> = (0..50).map(f64::from).collect();
        let curve = kde_curve(&values, &budget()).unwrap().unwrap();
        let step = curve[1].0 - curve[0].0;
        let area: f64 = curve.iter().map(|(_, d)| d * step).sum();
        assert!((area - 1.0).abs() < 0.05);
    }

    #[test]
    fn decorations_are_accepted() {
        let mut canvas = canvas();
        for name in ["legend", "tight_layout", "show", "style.use"] {
            assert!(matches!(pyplot(&mut canvas, name, &Args::default()), Ok(Value::None)));
        }
        assert!(pyplot(&mut canvas, "stackplot", &Args::default()).is_err());
    }
}
