//! Restricted snippet interpreter
//!
//! Snippets are parsed with the tree-sitter Python grammar and evaluated
//! node by node. Only the statement and expression kinds matched below are
//! executed; everything else fails the block with an `Unsupported` error.
//! The interpreter owns the block's canvas and scope, so nothing survives
//! from one block to the next.

use crate::args::Args;
use crate::budget::Budget;
use crate::canvas::{Canvas, Figure};
use crate::error::SnippetError;
use crate::frame::{Frame, Series};
use crate::methods::{self, Key, Slice};
use crate::value::{Builtin, Module, Value, EXCEPTION_TYPES};
use autolysis_table::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

/// Parse `source`; the first error node becomes a syntax error with its line
pub(crate) fn parse(source: &str) -> Result<Tree, SnippetError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| SnippetError::Parser(e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| SnippetError::Parser("parser returned no tree".to_string()))?;
    let root = tree.root_node();
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let message = if bad.is_missing() {
            format!("expected '{}'", bad.kind())
        } else {
            "invalid syntax".to_string()
        };
        return Err(SnippetError::Syntax {
            line: bad.start_position().row + 1,
            message,
        });
    }
    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn field<'t>(node: Node<'t>, name: &str) -> Result<Node<'t>, SnippetError> {
    node.child_by_field_name(name)
        .ok_or_else(|| SnippetError::Parser(format!("'{}' node without '{name}'", node.kind())))
}

fn fields<'t>(node: Node<'t>, name: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(name, &mut cursor).collect()
}

/// Readable name of an unsupported node kind
fn describe_kind(kind: &str) -> String {
    kind.trim_end_matches("_statement")
        .trim_end_matches("_definition")
        .replace('_', " ")
}

/// Evaluation state of one block
pub(crate) struct Interpreter<'s> {
    source: &'s str,
    scope: HashMap<String, Value>,
    canvas: Canvas,
    budget: Budget,
    printed: Vec<String>,
}

impl<'s> Interpreter<'s> {
    /// Fresh scope holding only the dataset and the plotting modules
    pub(crate) fn new(source: &'s str, data: Arc<Frame>, canvas: Canvas, budget: Budget) -> Self {
        let mut scope = HashMap::new();
        scope.insert("data".to_string(), Value::Frame(Arc::clone(&data)));
        scope.insert("df".to_string(), Value::Frame(data));
        scope.insert("plt".to_string(), Value::Module(Module::Pyplot));
        scope.insert("sns".to_string(), Value::Module(Module::Seaborn));
        Self {
            source,
            scope,
            canvas,
            budget,
            printed: Vec::new(),
        }
    }

    /// Run every statement and hand back the figure left on the canvas
    pub(crate) fn run(mut self) -> Result<Option<Figure>, SnippetError> {
        let tree = parse(self.source)?;
        for statement in named(tree.root_node()) {
            self.budget.check()?;
            self.statement(statement)?;
        }
        if !self.printed.is_empty() {
            debug!(lines = self.printed.len(), output = %self.printed.join("\n"), "snippet printed output");
        }
        Ok(self.canvas.finish())
    }

    fn text(&self, node: Node<'_>) -> Result<&'s str, SnippetError> {
        node.utf8_text(self.source.as_bytes())
            .map_err(|e| SnippetError::Parser(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Statements

    fn statement(&mut self, node: Node<'_>) -> Result<(), SnippetError> {
        match node.kind() {
            "expression_statement" => {
                for child in named(node) {
                    match child.kind() {
                        "assignment" => {
                            self.assignment(child)?;
                        }
                        "augmented_assignment" => {
                            return Err(SnippetError::unsupported("augmented assignment"));
                        }
                        _ => {
                            self.eval(child)?;
                        }
                    }
                }
                Ok(())
            }
            "import_statement" => {
                for name in fields(node, "name") {
                    self.import(name)?;
                }
                Ok(())
            }
            "import_from_statement" => self.import_from(node),
            "raise_statement" => Err(self.raise(node)),
            "pass_statement" => Ok(()),
            kind => Err(SnippetError::unsupported(format!("{} statements", describe_kind(kind)))),
        }
    }

    fn import(&mut self, node: Node<'_>) -> Result<(), SnippetError> {
        let (path_node, alias) = match node.kind() {
            "aliased_import" => (field(node, "name")?, Some(self.text(field(node, "alias")?)?)),
            _ => (node, None),
        };
        let path = self.text(path_node)?;
        let module = Module::resolve(path).ok_or_else(|| SnippetError::unsupported(format!("import of module '{path}'")))?;
        match alias {
            Some(alias) => {
                self.scope.insert(alias.to_string(), Value::Module(module));
            }
            None => {
                let top = path.split('.').next().unwrap_or(path);
                let root = Module::resolve(top).unwrap_or(module);
                self.scope.insert(top.to_string(), Value::Module(root));
            }
        }
        Ok(())
    }

    fn import_from(&mut self, node: Node<'_>) -> Result<(), SnippetError> {
        let path = self.text(field(node, "module_name")?)?;
        let module = Module::resolve(path).ok_or_else(|| SnippetError::unsupported(format!("import of module '{path}'")))?;
        let names = fields(node, "name");
        if names.is_empty() {
            return Err(SnippetError::unsupported("wildcard import"));
        }
        for name in names {
            let (name_node, alias) = match name.kind() {
                "aliased_import" => (field(name, "name")?, Some(field(name, "alias")?)),
                _ => (name, None),
            };
            let imported = self.text(name_node)?;
            let value = match module.submodule(imported) {
                Some(submodule) => Value::Module(submodule),
                None => methods::attribute(&Value::Module(module), imported)?,
            };
            let binding = match alias {
                Some(alias) => self.text(alias)?,
                None => imported,
            };
            self.scope.insert(binding.to_string(), value);
        }
        Ok(())
    }

    fn raise(&mut self, node: Node<'_>) -> SnippetError {
        let Some(expression) = named(node).into_iter().next() else {
            return SnippetError::Raised {
                kind: "RuntimeError".to_string(),
                message: "No active exception to reraise".to_string(),
            };
        };
        match self.eval(expression) {
            Ok(Value::Exception { kind, message }) => SnippetError::Raised { kind, message },
            Ok(Value::ExceptionType(kind)) => SnippetError::Raised {
                kind,
                message: String::new(),
            },
            Ok(_) => SnippetError::type_error("exceptions must derive from BaseException"),
            Err(err) => err,
        }
    }

    fn assignment(&mut self, node: Node<'_>) -> Result<Value, SnippetError> {
        let Some(right) = node.child_by_field_name("right") else {
            return Ok(Value::None);
        };
        let value = if right.kind() == "assignment" {
            self.assignment(right)?
        } else {
            self.eval(right)?
        };
        self.bind(field(node, "left")?, value.clone())?;
        Ok(value)
    }

    fn bind(&mut self, target: Node<'_>, value: Value) -> Result<(), SnippetError> {
        match target.kind() {
            "identifier" => {
                self.scope.insert(self.text(target)?.to_string(), value);
                Ok(())
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list" => {
                let targets = named(target);
                let values = value.iterate("unpacking")?;
                if values.len() != targets.len() {
                    return Err(SnippetError::value_error(if values.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            values.len()
                        )
                    }));
                }
                for (target, value) in targets.into_iter().zip(values) {
                    self.bind(target, value)?;
                }
                Ok(())
            }
            "parenthesized_expression" => match named(target).first() {
                Some(inner) => self.bind(*inner, value),
                None => Err(SnippetError::unsupported("empty assignment target")),
            },
            "attribute" | "subscript" => Err(SnippetError::unsupported("assignment to attributes or items")),
            kind => Err(SnippetError::unsupported(format!("assignment to {}", describe_kind(kind)))),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions

    #[allow(clippy::too_many_lines)]
    fn eval(&mut self, node: Node<'_>) -> Result<Value, SnippetError> {
        match node.kind() {
            "identifier" => self.lookup(self.text(node)?),
            "integer" => {
                let digits = self.text(node)?.replace('_', "");
                let parsed = match digits.get(..2) {
                    Some("0x" | "0X") => i64::from_str_radix(&digits[2..], 16).ok(),
                    Some("0o" | "0O") => i64::from_str_radix(&digits[2..], 8).ok(),
                    Some("0b" | "0B") => i64::from_str_radix(&digits[2..], 2).ok(),
                    _ => digits.parse().ok(),
                };
                match parsed {
                    Some(i) => Ok(Value::Int(i)),
                    None => digits
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| SnippetError::unsupported(format!("integer literal '{digits}'"))),
                }
            }
            "float" => {
                let digits = self.text(node)?.replace('_', "");
                digits
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| SnippetError::unsupported(format!("numeric literal '{digits}'")))
            }
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "none" => Ok(Value::None),
            "string" => self.string(node).map(Value::Str),
            "concatenated_string" => {
                let mut joined = String::new();
                for part in named(node) {
                    joined.push_str(&self.string(part)?);
                }
                Ok(Value::Str(joined))
            }
            "list" | "tuple" | "expression_list" => {
                let children = named(node);
                self.budget.ensure_len(children.len())?;
                let items = children
                    .into_iter()
                    .map(|c| self.eval(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if node.kind() == "list" {
                    Value::List(items)
                } else {
                    Value::Tuple(items)
                })
            }
            "dictionary" => {
                let mut pairs: Vec<(Value, Value)> = Vec::new();
                for pair in named(node) {
                    if pair.kind() != "pair" {
                        return Err(SnippetError::unsupported("dictionary unpacking"));
                    }
                    let key = self.eval(field(pair, "key")?)?;
                    let value = self.eval(field(pair, "value")?)?;
                    match pairs.iter_mut().find(|pair| pair.0.equals(&key)) {
                        Some(slot) => slot.1 = value,
                        None => pairs.push((key, value)),
                    }
                }
                Ok(Value::Dict(pairs))
            }
            "parenthesized_expression" => match named(node).first() {
                Some(inner) => self.eval(*inner),
                None => Ok(Value::Tuple(Vec::new())),
            },
            "attribute" => {
                let object = self.eval(field(node, "object")?)?;
                let name = self.text(field(node, "attribute")?)?;
                methods::attribute(&object, name)
            }
            "subscript" => {
                let value = self.eval(field(node, "value")?)?;
                let mut keys = fields(node, "subscript")
                    .into_iter()
                    .map(|k| self.key(k))
                    .collect::<Result<Vec<_>, _>>()?;
                let key = match keys.len() {
                    1 => keys.remove(0),
                    2 => {
                        let columns = keys.remove(1);
                        Key::Pair(Box::new(keys.remove(0)), Box::new(columns))
                    }
                    _ => return Err(SnippetError::unsupported("multi-dimensional subscripts")),
                };
                methods::subscript(&value, &key)
            }
            "call" => {
                self.budget.check()?;
                let callee = self.eval(field(node, "function")?)?;
                let arguments = field(node, "arguments")?;
                if arguments.kind() != "argument_list" {
                    return Err(SnippetError::unsupported("generator expressions"));
                }
                let args = self.arguments(arguments)?;
                self.call(callee, &args)
            }
            "unary_operator" => {
                let operator = self.text(field(node, "operator")?)?;
                let operand = self.eval(field(node, "argument")?)?;
                unary(operator, operand)
            }
            "not_operator" => {
                let operand = self.eval(field(node, "argument")?)?;
                Ok(Value::Bool(!truth(&operand)?))
            }
            "binary_operator" => {
                let left = self.eval(field(node, "left")?)?;
                let right = self.eval(field(node, "right")?)?;
                let operator = self.text(field(node, "operator")?)?;
                self.binary(operator, left, right)
            }
            "comparison_operator" => {
                let operands = named(node);
                let operators = fields(node, "operators");
                let Some(first) = operands.first() else {
                    return Err(SnippetError::Parser("comparison without operands".to_string()));
                };
                let mut left = self.eval(*first)?;
                let mut result = Value::Bool(true);
                for (operator, right_node) in operators.into_iter().zip(operands.into_iter().skip(1)) {
                    let right = self.eval(right_node)?;
                    let outcome = compare(operator.kind(), &left, &right)?;
                    if !matches!(outcome, Value::Bool(_)) {
                        // element-wise comparisons do not chain
                        return Ok(outcome);
                    }
                    if !truth(&outcome)? {
                        return Ok(outcome);
                    }
                    result = outcome;
                    left = right;
                }
                Ok(result)
            }
            "boolean_operator" => {
                let left = self.eval(field(node, "left")?)?;
                let operator = self.text(field(node, "operator")?)?;
                match (operator, truth(&left)?) {
                    ("and", false) | ("or", true) => Ok(left),
                    _ => self.eval(field(node, "right")?),
                }
            }
            "conditional_expression" => {
                let parts = named(node);
                let [body, condition, alternative] = parts.as_slice() else {
                    return Err(SnippetError::Parser("malformed conditional expression".to_string()));
                };
                let condition = self.eval(*condition)?;
                if truth(&condition)? {
                    self.eval(*body)
                } else {
                    self.eval(*alternative)
                }
            }
            "list_comprehension" | "dictionary_comprehension" | "set_comprehension" | "generator_expression" => {
                Err(SnippetError::unsupported("comprehensions"))
            }
            "lambda" => Err(SnippetError::unsupported("lambda expressions")),
            kind => Err(SnippetError::unsupported(format!("{} expressions", describe_kind(kind)))),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, SnippetError> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        if EXCEPTION_TYPES.contains(&name) {
            return Ok(Value::ExceptionType(name.to_string()));
        }
        Err(SnippetError::Name(name.to_string()))
    }

    fn key(&mut self, node: Node<'_>) -> Result<Key, SnippetError> {
        if node.kind() != "slice" {
            return Ok(Key::Item(self.eval(node)?));
        }
        let mut bounds: [Option<i64>; 3] = [None; 3];
        let mut segment = 0;
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            if child.kind() == ":" {
                segment += 1;
                continue;
            }
            if !child.is_named() || segment > 2 {
                continue;
            }
            let value = self.eval(child)?;
            bounds[segment] = match value {
                Value::None => None,
                other => Some(other.as_i64().ok_or_else(|| {
                    SnippetError::type_error("slice indices must be integers or None")
                })?),
            };
        }
        Ok(Key::Slice(Slice {
            start: bounds[0],
            stop: bounds[1],
            step: bounds[2],
        }))
    }

    fn arguments(&mut self, node: Node<'_>) -> Result<Args, SnippetError> {
        let mut args = Args::default();
        for argument in named(node) {
            match argument.kind() {
                "keyword_argument" => {
                    let name = self.text(field(argument, "name")?)?.to_string();
                    let value = self.eval(field(argument, "value")?)?;
                    args.keywords.push((name, value));
                }
                "list_splat" | "dictionary_splat" => {
                    return Err(SnippetError::unsupported("argument unpacking"));
                }
                _ => {
                    let value = self.eval(argument)?;
                    args.positional.push(value);
                }
            }
        }
        Ok(args)
    }

    fn call(&mut self, callee: Value, args: &Args) -> Result<Value, SnippetError> {
        match callee {
            Value::Builtin(builtin) => self.builtin(builtin, args),
            Value::ExceptionType(kind) => Ok(Value::Exception {
                kind,
                message: args.positional.first().map(Value::display).unwrap_or_default(),
            }),
            Value::Bound { receiver, method } => {
                methods::call_method(&mut self.canvas, &self.budget, &receiver, &method, args)
            }
            other => Err(SnippetError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Strings

    fn string(&mut self, node: Node<'_>) -> Result<String, SnippetError> {
        let start = named(node)
            .first()
            .copied()
            .filter(|c| c.kind() == "string_start")
            .ok_or_else(|| SnippetError::Parser("string without start".to_string()))?;
        let prefix: String = self
            .text(start)?
            .chars()
            .take_while(|c| *c != '\'' && *c != '"')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if prefix.contains('b') {
            return Err(SnippetError::unsupported("bytes literals"));
        }
        let formatted = prefix.contains('f');
        let raw = prefix.contains('r');

        let mut out = String::new();
        for part in named(node) {
            match part.kind() {
                "string_content" => {
                    let content = self.text(part)?;
                    let content = if raw { content.to_string() } else { unescape(content) };
                    if formatted {
                        out.push_str(&content.replace("{{", "{").replace("}}", "}"));
                    } else {
                        out.push_str(&content);
                    }
                }
                "interpolation" => out.push_str(&self.interpolation(part)?),
                _ => {}
            }
        }
        Ok(out)
    }

    fn interpolation(&mut self, node: Node<'_>) -> Result<String, SnippetError> {
        let value = self.eval(field(node, "expression")?)?;
        let value = match node.child_by_field_name("type_conversion") {
            Some(conversion) if self.text(conversion)? == "!r" => Value::Str(value.repr()),
            Some(_) => Value::Str(value.display()),
            None => value,
        };
        let spec = match node.child_by_field_name("format_specifier") {
            Some(spec) => {
                let text = self.text(spec)?;
                let text = text.strip_prefix(':').unwrap_or(text);
                if text.contains('{') {
                    return Err(SnippetError::unsupported("nested format specifiers"));
                }
                text
            }
            None => "",
        };
        methods::format_spec(&value, spec)
    }

    // -----------------------------------------------------------------------
    // Operators

    #[allow(clippy::cast_precision_loss)]
    fn binary(&self, operator: &str, left: Value, right: Value) -> Result<Value, SnippetError> {
        match (&left, &right) {
            (Value::Series(_) | Value::Mask(_), _) | (_, Value::Series(_) | Value::Mask(_)) => {
                return vector_binary(operator, &left, &right);
            }
            (Value::Int(a), Value::Int(b)) => return int_binary(operator, *a, *b),
            (Value::Str(a), Value::Str(b)) if operator == "+" => return Ok(Value::Str(format!("{a}{b}"))),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) if operator == "*" => {
                let n = usize::try_from(*n).unwrap_or(0);
                self.budget.ensure_len(s.len().saturating_mul(n))?;
                return Ok(Value::Str(s.repeat(n)));
            }
            (Value::List(a), Value::List(b)) if operator == "+" => {
                self.budget.ensure_len(a.len() + b.len())?;
                return Ok(Value::List(a.iter().chain(b).cloned().collect()));
            }
            (Value::Tuple(a), Value::Tuple(b)) if operator == "+" => {
                self.budget.ensure_len(a.len() + b.len())?;
                return Ok(Value::Tuple(a.iter().chain(b).cloned().collect()));
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) if operator == "*" => {
                let n = usize::try_from(*n).unwrap_or(0);
                self.budget.ensure_len(items.len().saturating_mul(n))?;
                let mut repeated = Vec::with_capacity(items.len() * n);
                for _ in 0..n {
                    repeated.extend(items.iter().cloned());
                }
                return Ok(Value::List(repeated));
            }
            (Value::Bool(a), Value::Bool(b)) if matches!(operator, "&" | "|" | "^") => {
                return Ok(Value::Bool(match operator {
                    "&" => *a & *b,
                    "|" => *a | *b,
                    _ => *a ^ *b,
                }));
            }
            _ => {}
        }
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_binary(operator, a, b),
            _ => Err(SnippetError::type_error(format!(
                "unsupported operand type(s) for {operator}: '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Builtins

    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn builtin(&mut self, builtin: Builtin, args: &Args) -> Result<Value, SnippetError> {
        let first = || args.require(0, "x", "builtin");
        match builtin {
            Builtin::Len => {
                let n = match first()? {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) | Value::Tuple(items) => items.len(),
                    Value::Dict(pairs) => pairs.len(),
                    Value::Series(series) => series.len(),
                    Value::Mask(mask) => mask.len(),
                    Value::Frame(frame) => frame.n_rows(),
                    other => {
                        return Err(SnippetError::type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
            }
            Builtin::Range => {
                let ints = args
                    .positional
                    .iter()
                    .map(|v| {
                        v.as_i64()
                            .ok_or_else(|| SnippetError::type_error("range() arguments must be integers"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(SnippetError::type_error("range expected 1 to 3 arguments")),
                };
                if step == 0 {
                    return Err(SnippetError::value_error("range() arg 3 must not be zero"));
                }
                let span = if step > 0 { stop - start } else { start - stop };
                let count = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
                self.budget.ensure_len(usize::try_from(count).unwrap_or(usize::MAX))?;
                Ok(Value::List((0..count).map(|i| Value::Int(start + i * step)).collect()))
            }
            Builtin::List => match args.positional.first() {
                Some(value) => Ok(Value::List(value.iterate("list()")?)),
                None => Ok(Value::List(Vec::new())),
            },
            Builtin::Sorted => {
                let mut items = first()?.iterate("sorted()")?;
                self.budget.ensure_len(items.len())?;
                let mut incomparable = None;
                items.sort_by(|a, b| {
                    a.compare(b).unwrap_or_else(|| {
                        incomparable.get_or_insert((a.type_name(), b.type_name()));
                        std::cmp::Ordering::Equal
                    })
                });
                if let Some((a, b)) = incomparable {
                    return Err(SnippetError::type_error(format!(
                        "'<' not supported between instances of '{a}' and '{b}'"
                    )));
                }
                if args.bool_or(usize::MAX, "reverse", false) {
                    items.reverse();
                }
                Ok(Value::List(items))
            }
            Builtin::Print => {
                let sep = args.str_opt(usize::MAX, "sep").unwrap_or(" ");
                let line = args.positional.iter().map(Value::display).collect::<Vec<_>>().join(sep);
                self.printed.push(line);
                Ok(Value::None)
            }
            Builtin::Min | Builtin::Max => {
                let items = match args.positional.as_slice() {
                    [single] => single.iterate("min/max")?,
                    many => many.to_vec(),
                };
                let want = if builtin == Builtin::Min {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
                let mut best: Option<Value> = None;
                for item in items {
                    best = Some(match best {
                        None => item,
                        Some(current) => match item.compare(&current) {
                            Some(order) if order == want => item,
                            Some(_) => current,
                            None => {
                                return Err(SnippetError::type_error(format!(
                                    "'<' not supported between instances of '{}' and '{}'",
                                    item.type_name(),
                                    current.type_name()
                                )))
                            }
                        },
                    });
                }
                best.ok_or_else(|| SnippetError::value_error("min/max() arg is an empty sequence"))
            }
            Builtin::Sum => {
                let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
                for item in first()?.iterate("sum()")? {
                    total = self.binary("+", total, item)?;
                }
                Ok(total)
            }
            Builtin::Abs => match first()? {
                Value::Int(i) => Ok(Value::Int(i.checked_abs().ok_or_else(|| SnippetError::value_error("integer overflow"))?)),
                other => methods::elementwise(other, f64::abs),
            },
            Builtin::Round => {
                let digits = args.get(1, "ndigits").map(|d| {
                    d.as_i64()
                        .ok_or_else(|| SnippetError::type_error("ndigits must be an integer"))
                });
                match (first()?, digits.transpose()?) {
                    (Value::Int(i), _) => Ok(Value::Int(*i)),
                    (value, None) => {
                        let x = value.as_f64().ok_or_else(|| {
                            SnippetError::type_error(format!("type {} doesn't define __round__", value.type_name()))
                        })?;
                        if !x.is_finite() {
                            return Err(SnippetError::value_error("cannot convert float NaN or infinity to integer"));
                        }
                        Ok(Value::Int(x.round_ties_even() as i64))
                    }
                    (value, Some(n)) => {
                        let factor = 10f64.powi(i32::try_from(n).unwrap_or(0));
                        methods::elementwise(value, |x| (x * factor).round_ties_even() / factor)
                    }
                }
            }
            Builtin::Str => Ok(Value::Str(args.positional.first().map(Value::display).unwrap_or_default())),
            Builtin::Int => match args.positional.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Str(s)) => s
                    .trim()
                    .replace('_', "")
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| SnippetError::value_error(format!("invalid literal for int() with base 10: '{s}'"))),
                Some(value) => {
                    let x = value.as_f64().ok_or_else(|| {
                        SnippetError::type_error(format!(
                            "int() argument must be a string or a number, not '{}'",
                            value.type_name()
                        ))
                    })?;
                    if !x.is_finite() {
                        return Err(SnippetError::value_error("cannot convert float NaN or infinity to integer"));
                    }
                    Ok(Value::Int(x.trunc() as i64))
                }
            },
            Builtin::Float => match args.positional.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => {
                    let trimmed = s.trim().to_ascii_lowercase();
                    let parsed = match trimmed.as_str() {
                        "nan" => Some(f64::NAN),
                        "inf" | "infinity" | "+inf" => Some(f64::INFINITY),
                        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                        other => other.parse().ok(),
                    };
                    parsed
                        .map(Value::Float)
                        .ok_or_else(|| SnippetError::value_error(format!("could not convert string to float: '{s}'")))
                }
                Some(value) => value.as_f64().map(Value::Float).ok_or_else(|| {
                    SnippetError::type_error(format!(
                        "float() argument must be a string or a number, not '{}'",
                        value.type_name()
                    ))
                }),
            },
            Builtin::Zip => {
                let columns = args
                    .positional
                    .iter()
                    .map(|v| v.iterate("zip()"))
                    .collect::<Result<Vec<_>, _>>()?;
                let n = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Value::List(
                    (0..n)
                        .map(|i| Value::Tuple(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                ))
            }
        }
    }
}

/// Truth value in a boolean context; vectors are ambiguous
fn truth(value: &Value) -> Result<bool, SnippetError> {
    match value {
        Value::Series(_) | Value::Mask(_) | Value::Frame(_) => Err(SnippetError::value_error(format!(
            "The truth value of a {} is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
            value.type_name()
        ))),
        other => Ok(other.truthy()),
    }
}

fn unary(operator: &str, operand: Value) -> Result<Value, SnippetError> {
    match (operator, operand) {
        ("-", Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| SnippetError::value_error("integer overflow")),
        ("-", Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        ("-", value) => methods::elementwise(&value, |x| -x),
        ("+", value @ (Value::Int(_) | Value::Float(_) | Value::Series(_))) => Ok(value),
        ("~", Value::Mask(mask)) => Ok(Value::Mask(Arc::new(mask.iter().map(|b| !b).collect()))),
        ("~", Value::Int(i)) => Ok(Value::Int(!i)),
        ("~", Value::Bool(b)) => Ok(Value::Int(!i64::from(b))),
        (operator, value) => Err(SnippetError::type_error(format!(
            "bad operand type for unary {operator}: '{}'",
            value.type_name()
        ))),
    }
}

fn int_binary(operator: &str, a: i64, b: i64) -> Result<Value, SnippetError> {
    #[allow(clippy::cast_precision_loss)]
    let overflow = || float_binary(operator, a as f64, b as f64);
    match operator {
        "+" => a.checked_add(b).map_or_else(overflow, |v| Ok(Value::Int(v))),
        "-" => a.checked_sub(b).map_or_else(overflow, |v| Ok(Value::Int(v))),
        "*" => a.checked_mul(b).map_or_else(overflow, |v| Ok(Value::Int(v))),
        "//" | "%" if b == 0 => Err(SnippetError::ZeroDivision),
        "//" => Ok(Value::Int(a.div_euclid(b) - i64::from(b < 0 && a.rem_euclid(b) != 0))),
        "%" => {
            let r = a.rem_euclid(b);
            Ok(Value::Int(if b < 0 && r != 0 { r + b } else { r }))
        }
        "**" if b >= 0 => u32::try_from(b)
            .ok()
            .and_then(|e| a.checked_pow(e))
            .map_or_else(overflow, |v| Ok(Value::Int(v))),
        "&" => Ok(Value::Int(a & b)),
        "|" => Ok(Value::Int(a | b)),
        "^" => Ok(Value::Int(a ^ b)),
        _ => overflow(),
    }
}

fn float_binary(operator: &str, a: f64, b: f64) -> Result<Value, SnippetError> {
    let value = match operator {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "//" | "%" if b == 0.0 => return Err(SnippetError::ZeroDivision),
        "/" => a / b,
        "//" => (a / b).floor(),
        "%" => a - b * (a / b).floor(),
        "**" => a.powf(b),
        other => {
            return Err(SnippetError::type_error(format!(
                "unsupported operand type(s) for {other}: 'float' and 'float'"
            )))
        }
    };
    Ok(Value::Float(value))
}

fn as_vector(value: &Value) -> Result<Option<Series>, SnippetError> {
    match value {
        Value::Series(series) => Ok(Some((**series).clone())),
        Value::Mask(mask) => Ok(Some(Series::from_cells(
            None,
            mask.iter().map(|b| Cell::Number(if *b { 1.0 } else { 0.0 })).collect(),
        ))),
        Value::List(_) | Value::Tuple(_) => methods::to_series(value, None).map(Some),
        _ => Ok(None),
    }
}

/// Arithmetic and logic where at least one side is a vector
fn vector_binary(operator: &str, left: &Value, right: &Value) -> Result<Value, SnippetError> {
    if let (Value::Mask(a), Value::Mask(b)) = (left, right) {
        if a.len() != b.len() {
            return Err(SnippetError::value_error("operands could not be broadcast together"));
        }
        let combined = a.iter().zip(b.iter()).map(|(x, y)| match operator {
            "&" => Ok(*x && *y),
            "|" => Ok(*x || *y),
            "^" => Ok(*x ^ *y),
            other => Err(SnippetError::type_error(format!("unsupported operand for masks: {other}"))),
        });
        return Ok(Value::Mask(Arc::new(combined.collect::<Result<_, _>>()?)));
    }
    let op: fn(f64, f64) -> f64 = match operator {
        "+" => |a, b| a + b,
        "-" => |a, b| a - b,
        "*" => |a, b| a * b,
        "/" => |a, b| a / b,
        "//" => |a, b| (a / b).floor(),
        "%" => |a, b| a - b * (a / b).floor(),
        "**" => f64::powf,
        other => {
            return Err(SnippetError::type_error(format!(
                "unsupported operand type(s) for {other}: '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    match (as_vector(left)?, as_vector(right)?) {
        (Some(a), Some(b)) => Ok(Value::series(a.zip_numbers(&b, op)?)),
        (Some(a), None) => {
            let b = scalar_operand(right)?;
            Ok(Value::series(a.map_numbers(|x| op(x, b))))
        }
        (None, Some(b)) => {
            let a = scalar_operand(left)?;
            Ok(Value::series(b.map_numbers(|x| op(a, x))))
        }
        (None, None) => Err(SnippetError::type_error("vector operation without a vector")),
    }
}

fn scalar_operand(value: &Value) -> Result<f64, SnippetError> {
    value.as_f64().ok_or_else(|| {
        SnippetError::type_error(format!("unsupported operand type: '{}'", value.type_name()))
    })
}

/// One comparison; vectors compare element-wise into a mask
fn compare(operator: &str, left: &Value, right: &Value) -> Result<Value, SnippetError> {
    match operator {
        "in" | "not in" => {
            let found = contains(right, left)?;
            return Ok(Value::Bool(found == (operator == "in")));
        }
        "is" => return Ok(Value::Bool(identical(left, right))),
        "is not" => return Ok(Value::Bool(!identical(left, right))),
        _ => {}
    }
    if let Value::Series(series) = left {
        let cells: Vec<Cell> = match right {
            Value::Series(other) if other.len() == series.len() => other.cells.clone(),
            Value::Series(_) => return Err(SnippetError::value_error("can only compare identically-labeled Series objects")),
            scalar => vec![scalar.to_cell()?; series.len()],
        };
        let mask = series
            .cells
            .iter()
            .zip(&cells)
            .map(|(a, b)| cell_matches(operator, a, b))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Mask(Arc::new(mask)));
    }
    if let Value::Series(_) = right {
        let flipped = match operator {
            "<" => ">",
            ">" => "<",
            "<=" => ">=",
            ">=" => "<=",
            other => other,
        };
        return compare(flipped, right, left);
    }
    let ordering = || {
        left.compare(right).ok_or_else(|| {
            SnippetError::type_error(format!(
                "'{operator}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))
        })
    };
    let result = match operator {
        "==" => left.equals(right),
        "!=" | "<>" => !left.equals(right),
        "<" => ordering()?.is_lt(),
        "<=" => ordering()?.is_le(),
        ">" => ordering()?.is_gt(),
        ">=" => ordering()?.is_ge(),
        other => return Err(SnippetError::unsupported(format!("comparison '{other}'"))),
    };
    Ok(Value::Bool(result))
}

fn cell_matches(operator: &str, a: &Cell, b: &Cell) -> Result<bool, SnippetError> {
    let ordering = match (a, b) {
        (Cell::Missing, _) | (_, Cell::Missing) => return Ok(operator == "!="),
        (Cell::Number(x), Cell::Number(y)) => x.partial_cmp(y),
        (Cell::Text(x), Cell::Text(y)) => Some(x.cmp(y)),
        _ if matches!(operator, "==" | "!=") => return Ok(operator == "!="),
        _ => {
            return Err(SnippetError::type_error(format!(
                "'{operator}' not supported between str and number values"
            )))
        }
    };
    let Some(ordering) = ordering else {
        return Ok(operator == "!=");
    };
    Ok(match operator {
        "==" => ordering.is_eq(),
        "!=" | "<>" => ordering.is_ne(),
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        other => return Err(SnippetError::unsupported(format!("comparison '{other}'"))),
    })
}

fn contains(container: &Value, needle: &Value) -> Result<bool, SnippetError> {
    match container {
        Value::Str(haystack) => match needle {
            Value::Str(n) => Ok(haystack.contains(n.as_str())),
            other => Err(SnippetError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| v.equals(needle))),
        Value::Dict(pairs) => Ok(pairs.iter().any(|(k, _)| k.equals(needle))),
        Value::Frame(frame) => Ok(needle.as_str().is_some_and(|n| frame.has_column(n))),
        Value::Series(series) => Ok(series.labels.contains(&needle.display())),
        other => Err(SnippetError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Series(x), Value::Series(y)) => Arc::ptr_eq(x, y),
        (Value::Frame(x), Value::Frame(y)) => Arc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

/// Resolve backslash escapes of a non-raw string literal
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MarkKind;
    use autolysis_table::{Column, Table};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn data() -> Arc<Frame> {
        let table = Table::new(vec![
            Column::text("city", ["Oslo", "Rome", "Oslo", "Lima"]),
            Column::numeric("rain", [10.0, 2.0, 12.0, 1.0]),
            Column::numeric("temp", [4.0, 20.0, 6.0, 18.0]),
        ])
        .unwrap();
        Arc::new(Frame::from_table(&table))
    }

    fn run_with(source: &str, allowed: Duration) -> Result<Option<Figure>, SnippetError> {
        let budget = Budget::new(allowed, Arc::new(AtomicBool::new(false)), 100_000);
        Interpreter::new(source, data(), Canvas::new((640, 480), 4000), budget).run()
    }

    fn run(source: &str) -> Result<Option<Figure>, SnippetError> {
        run_with(source, Duration::from_secs(10))
    }

    fn marks(source: &str) -> Vec<MarkKind> {
        run(source)
            .unwrap()
            .expect("figure")
            .axes
            .into_iter()
            .flat_map(|a| a.marks)
            .map(|m| m.kind)
            .collect()
    }

    #[test]
    fn plain_plot() {
        assert_eq!(
            marks("plt.plot([1, 2, 3])"),
            vec![MarkKind::Line(vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)])]
        );
    }

    #[test]
    fn no_drawing_means_no_figure() {
        assert!(run("x = 1 + 2").unwrap().is_none());
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = run("x = 1\ny = (2 +\n").unwrap_err();
        assert!(matches!(err, SnippetError::Syntax { .. }), "{err:?}");
    }

    #[test]
    fn raise_carries_kind_and_message() {
        assert_eq!(
            run("raise ValueError('bad column')").unwrap_err(),
            SnippetError::Raised {
                kind: "ValueError".into(),
                message: "bad column".into()
            }
        );
        assert_eq!(
            run("raise ValueError()").unwrap_err().to_string(),
            "ValueError: "
        );
    }

    #[test]
    fn loops_are_unsupported() {
        let err = run("for c in data.columns:\n    pass").unwrap_err();
        assert_eq!(err, SnippetError::unsupported("for statements"));
        assert!(matches!(run("x += 1").unwrap_err(), SnippetError::Unsupported(_)));
    }

    #[test]
    fn unknown_modules_are_rejected() {
        assert!(matches!(run("import os").unwrap_err(), SnippetError::Unsupported(_)));
        assert!(run("import numpy as np\nimport pandas as pd\nfrom matplotlib import pyplot").is_ok());
    }

    #[test]
    fn unbound_names_fail() {
        assert_eq!(run("plt.plot(values)").unwrap_err(), SnippetError::Name("values".into()));
    }

    #[test]
    fn groupby_bar_chart() {
        let source = "means = data.groupby('city')['rain'].mean()\nmeans.plot(kind='bar')\nplt.title(f'Rain by city ({len(means)} cities)')";
        let figure = run(source).unwrap().expect("figure");
        assert_eq!(figure.axes[0].title.as_deref(), Some("Rain by city (3 cities)"));
        let MarkKind::Rects(rects) = &figure.axes[0].marks[0].kind else {
            panic!("expected bars");
        };
        assert_eq!(rects.len(), 3);
    }

    #[test]
    fn subplots_unpack_and_mask_filter() {
        let source = "fig, ax = plt.subplots(figsize=(8, 4))\nwet = data[data['rain'] > 5]\nax.scatter(wet['temp'], wet['rain'])";
        let figure = run(source).unwrap().expect("figure");
        assert_eq!((figure.width, figure.height), (800, 400));
        assert_eq!(
            figure.axes[0].marks[0].kind,
            MarkKind::Points(vec![(4.0, 10.0), (6.0, 12.0)])
        );
    }

    #[test]
    fn arithmetic_follows_python() {
        let source = "a = 7 // 2\nb = -7 // 2\nc = 7 / 2\nd = 2 ** 10\nplt.plot([a, b, c, d])";
        assert_eq!(
            marks(source),
            vec![MarkKind::Line(vec![(0.0, 3.0), (1.0, -4.0), (2.0, 3.5), (3.0, 1024.0)])]
        );
        assert_eq!(run("x = 1 / 0").unwrap_err(), SnippetError::ZeroDivision);
    }

    #[test]
    fn dictionary_literals_keep_first_position_and_last_value() {
        let source = "d = {'a': 1, 'b': 5, 'a': 3}\nplt.plot(d.values())";
        assert_eq!(marks(source), vec![MarkKind::Line(vec![(0.0, 3.0), (1.0, 5.0)])]);

        let source = "d = {'rain': 2}\nplt.plot([len(d), d['rain'], d.get('snow', 9)])";
        assert_eq!(
            marks(source),
            vec![MarkKind::Line(vec![(0.0, 1.0), (1.0, 2.0), (2.0, 9.0)])]
        );
    }

    #[test]
    fn list_repetition_is_bounded() {
        assert!(matches!(run("x = [0] * 10000000").unwrap_err(), SnippetError::TooLarge { .. }));
    }

    #[test]
    fn zero_budget_times_out() {
        assert!(run_with("plt.plot([1])", Duration::ZERO).unwrap_err().is_timeout());
    }

    #[test]
    fn strings_and_formatting() {
        let source = "label = 'Mean: {:.2f}'.format(data['rain'].mean())\nplt.title(label + '\\u00b0')\nplt.plot([1])";
        let figure = run(source).unwrap().expect("figure");
        assert_eq!(figure.axes[0].title.as_deref(), Some("Mean: 6.25\u{b0}"));
    }

    #[test]
    fn attribute_assignment_is_rejected() {
        assert!(matches!(run("data.x = 1").unwrap_err(), SnippetError::Unsupported(_)));
    }

    #[test]
    fn unescape_handles_common_sequences() {
        assert_eq!(unescape(r"a\nb\tc\\d\x41"), "a\nb\tc\\dA");
        assert_eq!(unescape(r"\q"), "\\q");
    }
}
