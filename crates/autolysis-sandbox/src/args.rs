//! Call arguments

use crate::error::SnippetError;
use crate::value::Value;

/// Evaluated positional and keyword arguments of one call
#[derive(Debug, Clone, Default)]
pub(crate) struct Args {
    pub(crate) positional: Vec<Value>,
    pub(crate) keywords: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }

    /// Keyword argument by name
    pub(crate) fn kw(&self, name: &str) -> Option<&Value> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Argument passed by keyword or at `index`; `None` values count as absent
    pub(crate) fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kw(name)
            .or_else(|| self.positional.get(index))
            .filter(|v| !matches!(v, Value::None))
    }

    pub(crate) fn require(&self, index: usize, name: &str, function: &str) -> Result<&Value, SnippetError> {
        self.get(index, name).ok_or_else(|| {
            SnippetError::type_error(format!("{function}() missing required argument '{name}'"))
        })
    }

    pub(crate) fn f64_or(&self, index: usize, name: &str, default: f64) -> Result<f64, SnippetError> {
        match self.get(index, name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| {
                SnippetError::type_error(format!("{name} must be a number, not {}", v.type_name()))
            }),
        }
    }

    pub(crate) fn count_or(&self, index: usize, name: &str, default: usize) -> Result<usize, SnippetError> {
        self.get(index, name).map_or(Ok(default), |v| v.as_count(name))
    }

    pub(crate) fn bool_or(&self, index: usize, name: &str, default: bool) -> bool {
        self.get(index, name).map_or(default, Value::truthy)
    }

    pub(crate) fn str_opt(&self, index: usize, name: &str) -> Option<&str> {
        self.get(index, name).and_then(Value::as_str)
    }

    /// `(width, height)` pair from a `figsize`-style argument
    pub(crate) fn pair(&self, index: usize, name: &str) -> Result<Option<(f64, f64)>, SnippetError> {
        let Some(value) = self.get(index, name) else {
            return Ok(None);
        };
        let items = value.iterate(name)?;
        match items.as_slice() {
            [a, b] => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(Some((a, b))),
                _ => Err(SnippetError::type_error(format!("{name} must contain numbers"))),
            },
            _ => Err(SnippetError::value_error(format!("{name} must have two elements"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_wins_over_position() {
        let args = Args {
            positional: vec![Value::Int(1)],
            keywords: vec![("bins".into(), Value::Int(20))],
        };
        assert_eq!(args.count_or(0, "bins", 10).unwrap(), 20);
        assert_eq!(args.count_or(3, "other", 10).unwrap(), 10);
    }

    #[test]
    fn none_is_absent() {
        let args = Args::positional(vec![Value::None]);
        assert!(args.get(0, "x").is_none());
        assert!(args.require(0, "x", "f").is_err());
    }

    #[test]
    fn pairs() {
        let args = Args {
            positional: Vec::new(),
            keywords: vec![("figsize".into(), Value::Tuple(vec![Value::Int(10), Value::Float(6.0)]))],
        };
        assert_eq!(args.pair(99, "figsize").unwrap(), Some((10.0, 6.0)));
    }
}
