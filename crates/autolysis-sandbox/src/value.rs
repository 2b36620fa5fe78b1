//! Runtime values of the snippet interpreter

use crate::canvas::AxesRef;
use crate::error::SnippetError;
use crate::frame::{cell_text, Frame, GroupBy, Series};
use autolysis_table::{format_number, Cell};
use std::sync::Arc;

/// Importable modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Module {
    Matplotlib,
    Pyplot,
    Seaborn,
    Pandas,
    Numpy,
}

impl Module {
    /// Module for a dotted import path
    pub(crate) fn resolve(path: &str) -> Option<Self> {
        Some(match path {
            "matplotlib" => Self::Matplotlib,
            "matplotlib.pyplot" => Self::Pyplot,
            "seaborn" => Self::Seaborn,
            "pandas" => Self::Pandas,
            "numpy" => Self::Numpy,
            _ => return None,
        })
    }

    /// Submodule reached by attribute access
    pub(crate) fn submodule(self, name: &str) -> Option<Self> {
        match (self, name) {
            (Self::Matplotlib, "pyplot") => Some(Self::Pyplot),
            _ => None,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Matplotlib => "matplotlib",
            Self::Pyplot => "matplotlib.pyplot",
            Self::Seaborn => "seaborn",
            Self::Pandas => "pandas",
            Self::Numpy => "numpy",
        }
    }
}

/// Built-in functions available without import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Len,
    Range,
    List,
    Sorted,
    Print,
    Min,
    Max,
    Sum,
    Abs,
    Round,
    Str,
    Int,
    Float,
    Zip,
}

impl Builtin {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Self::Len,
            "range" => Self::Range,
            "list" => Self::List,
            "sorted" => Self::Sorted,
            "print" => Self::Print,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "abs" => Self::Abs,
            "round" => Self::Round,
            "str" => Self::Str,
            "int" => Self::Int,
            "float" => Self::Float,
            "zip" => Self::Zip,
            _ => return None,
        })
    }
}

/// Exception classes a snippet may construct and raise
pub(crate) const EXCEPTION_TYPES: &[&str] = &[
    "Exception",
    "ValueError",
    "TypeError",
    "RuntimeError",
    "KeyError",
    "IndexError",
    "ZeroDivisionError",
    "AssertionError",
    "NotImplementedError",
];

/// A value bound in a snippet scope
#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Series(Arc<Series>),
    Frame(Arc<Frame>),
    GroupBy(Arc<GroupBy>),
    Mask(Arc<Vec<bool>>),
    Module(Module),
    Figure(usize),
    Axes(AxesRef),
    Builtin(Builtin),
    ExceptionType(String),
    Exception { kind: String, message: String },
    /// Method looked up on a receiver, awaiting its call
    Bound { receiver: Box<Value>, method: String },
}

impl Value {
    pub(crate) fn series(series: Series) -> Self {
        Self::Series(Arc::new(series))
    }

    pub(crate) fn frame(frame: Frame) -> Self {
        Self::Frame(Arc::new(frame))
    }

    pub(crate) fn bound(receiver: Self, method: &str) -> Self {
        Self::Bound {
            receiver: Box::new(receiver),
            method: method.to_string(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Series(_) | Self::Mask(_) => "Series",
            Self::Frame(_) => "DataFrame",
            Self::GroupBy(_) => "DataFrameGroupBy",
            Self::Module(_) => "module",
            Self::Figure(_) => "Figure",
            Self::Axes(_) => "Axes",
            Self::Builtin(_) | Self::Bound { .. } => "builtin_function_or_method",
            Self::ExceptionType(_) => "type",
            Self::Exception { .. } => "Exception",
        }
    }

    /// Python truthiness
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) | Self::Tuple(items) => !items.is_empty(),
            Self::Dict(pairs) => !pairs.is_empty(),
            _ => true,
        }
    }

    /// Numeric scalar view
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Non-negative count argument
    pub(crate) fn as_count(&self, what: &str) -> Result<usize, SnippetError> {
        self.as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| {
                SnippetError::type_error(format!(
                    "{what} must be a non-negative int, not {}",
                    self.type_name()
                ))
            })
    }

    /// Scalar view of a table cell
    pub(crate) fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Number(n) => Self::Float(*n),
            Cell::Text(s) => Self::Str(s.clone()),
            Cell::Missing => Self::Float(f64::NAN),
        }
    }

    /// Label text as a scalar, numeric when it parses
    pub(crate) fn from_label(label: &str) -> Self {
        if let Ok(i) = label.parse::<i64>() {
            Self::Int(i)
        } else {
            match Cell::parse(label) {
                Cell::Number(n) => Self::Float(n),
                _ => Self::Str(label.to_string()),
            }
        }
    }

    /// Table cell for a scalar
    pub(crate) fn to_cell(&self) -> Result<Cell, SnippetError> {
        match self {
            Self::None => Ok(Cell::Missing),
            Self::Float(f) if f.is_nan() => Ok(Cell::Missing),
            Self::Str(s) => Ok(Cell::Text(s.clone())),
            other => other.as_f64().map(Cell::Number).ok_or_else(|| {
                SnippetError::type_error(format!("cannot store {} in a series", other.type_name()))
            }),
        }
    }

    /// Elements when the value is iterable
    pub(crate) fn items(&self) -> Option<Vec<Self>> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items.clone()),
            Self::Dict(pairs) => Some(pairs.iter().map(|(k, _)| k.clone()).collect()),
            Self::Series(series) => Some(series.cells.iter().map(Self::from_cell).collect()),
            Self::Mask(mask) => Some(mask.iter().map(|b| Self::Bool(*b)).collect()),
            Self::Frame(frame) => Some(frame.names.iter().cloned().map(Self::Str).collect()),
            Self::Str(s) => Some(s.chars().map(|c| Self::Str(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Elements, or a type error naming the context
    pub(crate) fn iterate(&self, context: &str) -> Result<Vec<Self>, SnippetError> {
        self.items().ok_or_else(|| {
            SnippetError::type_error(format!(
                "'{}' object is not iterable ({context})",
                self.type_name()
            ))
        })
    }

    /// String list argument such as `['a', 'b']` or a single `'a'`
    pub(crate) fn as_names(&self, what: &str) -> Result<Vec<String>, SnippetError> {
        match self {
            Self::Str(s) => Ok(vec![s.clone()]),
            Self::List(items) | Self::Tuple(items) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        SnippetError::type_error(format!("{what} must contain strings"))
                    })
                })
                .collect(),
            other => Err(SnippetError::type_error(format!(
                "{what} must be a string or list of strings, not {}",
                other.type_name()
            ))),
        }
    }

    /// Python `str()`
    pub(crate) fn display(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => display_float(*f),
            Self::Str(s) => s.clone(),
            Self::List(items) => format!("[{}]", join_repr(items)),
            Self::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Self::Tuple(items) => format!("({})", join_repr(items)),
            Self::Dict(pairs) => format!(
                "{{{}}}",
                pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::Series(series) => series
                .labels
                .iter()
                .zip(&series.cells)
                .map(|(l, c)| format!("{l}    {}", cell_text(c)))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Frame(frame) => format!("DataFrame({} rows x {} columns)", frame.n_rows(), frame.n_columns()),
            Self::Module(module) => format!("<module '{}'>", module.name()),
            Self::ExceptionType(kind) => format!("<class '{kind}'>"),
            Self::Exception { message, .. } => message.clone(),
            other => format!("<{}>", other.type_name()),
        }
    }

    /// Python `repr()` for scalars inside containers
    pub(crate) fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("'{s}'"),
            other => other.display(),
        }
    }

    /// Python `==` over scalars and containers
    pub(crate) fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            (Self::Figure(a), Self::Figure(b)) => a == b,
            (Self::Axes(a), Self::Axes(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Python ordering; `None` when the operands are not comparable
    pub(crate) fn compare(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        std::cmp::Ordering::Equal => {}
                        order => return Some(order),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

fn display_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{}.0", format_number(f))
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_python() {
        assert_eq!(Value::Float(3.0).display(), "3.0");
        assert_eq!(Value::Float(2.5).display(), "2.5");
        assert_eq!(Value::Bool(true).display(), "True");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Str("a".into())]).display(),
            "[1, 'a']"
        );
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).display(), "(1,)");
    }

    #[test]
    fn labels_become_numbers_when_possible() {
        assert!(matches!(Value::from_label("2021"), Value::Int(2021)));
        assert!(matches!(Value::from_label("1.5"), Value::Float(_)));
        assert!(matches!(Value::from_label("Oslo"), Value::Str(_)));
    }

    #[test]
    fn equality_and_ordering() {
        assert!(Value::Int(2).equals(&Value::Float(2.0)));
        assert!(!Value::Str("2".into()).equals(&Value::Int(2)));
        assert_eq!(
            Value::Str("a".into()).compare(&Value::Str("b".into())),
            Some(std::cmp::Ordering::Less)
        );
        assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn counts_reject_negatives() {
        assert_eq!(Value::Int(3).as_count("n").unwrap(), 3);
        assert!(Value::Int(-1).as_count("n").is_err());
        assert!(Value::Str("x".into()).as_count("n").is_err());
    }
}
