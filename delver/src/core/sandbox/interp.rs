//! Tree-walking evaluator for snippet programs.
//!
//! The environment is rebuilt for every invocation: the document under the
//! fixed name `doc`, the `re` and `json` capabilities, and a small set of
//! pure builtins. There is no filesystem, network, process, clock, or
//! reflection surface anywhere below this module, and nothing survives
//! between invocations. Error strings are diagnostics for the oracle.

use std::collections::HashMap;
use std::rc::Rc;

use crate::core::sandbox::parser::{BinOp, CmpOp, Expr, Stmt};

/// Upper bound on elements produced by `range`.
const RANGE_CAP: usize = 100_000;
/// Upper bound on characters/elements produced by `*` repetition.
const REPEAT_CAP: usize = 1_000_000;
/// Upper bound on matches materialized by `re.finditer`.
pub(super) const FINDITER_CAP: usize = 10_000;

pub type EvalResult<T> = Result<T, String>;

/// Runtime value. Everything is immutable; clones are cheap via `Rc`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Dict(Rc<Vec<(Value, Value)>>),
    Match(Rc<MatchData>),
}

/// A regex match with group texts and char-offset spans.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    /// Group 0 is the whole match.
    pub groups: Vec<Option<String>>,
    pub spans: Vec<Option<(i64, i64)>>,
}

impl Value {
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(Rc::from(text.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(items) => !items.is_empty(),
            Value::Match(_) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Match(_) => "re.Match",
        }
    }

    /// Python `str()` rendering.
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// Python `repr()` rendering, used inside containers and diagnostics.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Dict(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Match(m) => match (&m.groups[0], m.spans[0]) {
                (Some(text), Some((start, end))) => format!(
                    "<re.Match span=({start}, {end}), match={}>",
                    quote_str(text)
                ),
                _ => "<re.Match>".to_string(),
            },
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

const BUILTINS: &[&str] = &[
    "len", "str", "int", "float", "bool", "list", "dict", "range", "min", "max", "sum", "sorted",
    "any", "all", "abs",
];

/// Run a parsed program against the document and return the final bindings.
pub fn run(document: &str, program: &[Stmt]) -> EvalResult<HashMap<String, Value>> {
    let mut interp = Interp {
        env: HashMap::from([("doc".to_string(), Value::str(document))]),
    };
    for stmt in program {
        interp.exec(stmt)?;
    }
    Ok(interp.env)
}

struct Interp {
    env: HashMap<String, Value>,
}

impl Interp {
    fn exec(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match stmt {
            // Allow-listed modules are pre-bound, so the import is a no-op.
            Stmt::Import(_) => Ok(()),
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.env.insert(name.clone(), value);
                Ok(())
            }
            Stmt::Expr(expr) => self.eval(expr).map(|_| ()),
        }
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            Expr::Dict(items) => {
                let mut pairs = Vec::with_capacity(items.len());
                for (key, value) in items {
                    pairs.push((self.eval(key)?, self.eval(value)?));
                }
                Ok(Value::Dict(Rc::new(pairs)))
            }
            Expr::Cond { test, then, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() { Ok(left) } else { self.eval(right) }
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() { self.eval(right) } else { Ok(left) }
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::Compare { left, rest } => self.eval_compare(left, rest),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Neg(operand) => match self.eval(operand)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow".to_string()),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
                other => Err(format!("bad operand type for unary -: '{}'", other.type_name())),
            },
            Expr::Call { callee, args, kwargs } => self.eval_call(callee, args, kwargs),
            Expr::Attr { object, name } => self.eval_attr(object, name),
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                index_value(&object, &index)
            }
            Expr::Slice { object, start, stop } => {
                let object = self.eval(object)?;
                let start = self.eval_optional_index(start.as_deref())?;
                let stop = self.eval_optional_index(stop.as_deref())?;
                slice_value(&object, start, stop)
            }
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }
        if name == "re" || name == "json" {
            return Err(format!("module '{name}' cannot be used as a value"));
        }
        if BUILTINS.contains(&name) {
            return Err(format!("builtin '{name}' must be called directly"));
        }
        Err(format!("name '{name}' is not defined"))
    }

    fn eval_optional_index(&mut self, expr: Option<&Expr>) -> EvalResult<Option<i64>> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Int(i) => Ok(Some(i)),
                other => Err(format!(
                    "slice indices must be integers, not '{}'",
                    other.type_name()
                )),
            },
        }
    }

    fn eval_compare(&mut self, left: &Expr, rest: &[(CmpOp, Expr)]) -> EvalResult<Value> {
        let mut previous = self.eval(left)?;
        for (op, rhs) in rest {
            let rhs = self.eval(rhs)?;
            if !compare(*op, &previous, &rhs)? {
                return Ok(Value::Bool(false));
            }
            previous = rhs;
        }
        Ok(Value::Bool(true))
    }

    /// Attribute access outside call position: module constants only.
    fn eval_attr(&mut self, object: &Expr, name: &str) -> EvalResult<Value> {
        if let Expr::Name(module) = object {
            if module == "re" && !self.env.contains_key(module.as_str()) {
                return re_flag(name)
                    .map(Value::Int)
                    .ok_or_else(|| format!("module 're' has no attribute '{name}'"));
            }
            if module == "json" && !self.env.contains_key(module.as_str()) {
                return Err(format!("module 'json' has no attribute '{name}'"));
            }
        }
        let value = self.eval(object)?;
        Err(format!(
            "method '{name}' of '{}' must be called",
            value.type_name()
        ))
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> EvalResult<Value> {
        let args = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<EvalResult<Vec<_>>>()?;
        let mut kw = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            kw.push((name.clone(), self.eval(expr)?));
        }

        match callee {
            Expr::Name(name) if !self.env.contains_key(name.as_str()) => {
                if BUILTINS.contains(&name.as_str()) {
                    return call_builtin(name, &args, &kw);
                }
                if name == "re" || name == "json" {
                    return Err(format!("module '{name}' is not callable"));
                }
                Err(format!("name '{name}' is not defined"))
            }
            Expr::Attr { object, name } => {
                if let Expr::Name(module) = object.as_ref() {
                    if module == "re" && !self.env.contains_key(module.as_str()) {
                        return super::regex_mod::call(name, &args, &kw);
                    }
                    if module == "json" && !self.env.contains_key(module.as_str()) {
                        return super::json_mod::call(name, &args, &kw);
                    }
                }
                let receiver = self.eval(object)?;
                call_method(&receiver, name, &args, &kw)
            }
            other => {
                let value = self.eval(other)?;
                Err(format!("'{}' object is not callable", value.type_name()))
            }
        }
    }
}

pub(super) fn re_flag(name: &str) -> Option<i64> {
    // Numeric values match the Python flag constants.
    match name {
        "IGNORECASE" | "I" => Some(2),
        "MULTILINE" | "M" => Some(8),
        "DOTALL" | "S" => Some(16),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => numeric(op, left, right),
        BinOp::Mul => mul(left, right),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod => numeric(op, left, right),
        BinOp::BitOr => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
            _ => Err(operand_error("|", left, right)),
        },
    }
}

fn add(left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(a);
            out.push_str(b);
            Ok(Value::str(out))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::list(items))
        }
        _ => numeric(BinOp::Add, left, right),
    }
}

fn mul(left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            let count = (*n).max(0) as usize;
            let chars = s.chars().count().saturating_mul(count);
            if chars > REPEAT_CAP {
                return Err("string repetition result is too large".to_string());
            }
            Ok(Value::str(s.repeat(count)))
        }
        (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
            let count = (*n).max(0) as usize;
            if items.len().saturating_mul(count) > REPEAT_CAP {
                return Err("list repetition result is too large".to_string());
            }
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => numeric(BinOp::Mul, left, right),
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::BitOr => "|",
    };
    match (as_number(left), as_number(right)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => int_op(op, a, b, symbol),
        (Some(a), Some(b)) => float_op(op, a.as_f64(), b.as_f64()),
        _ => Err(operand_error(symbol, left, right)),
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }
}

fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        _ => None,
    }
}

fn int_op(op: BinOp, a: i64, b: i64, symbol: &str) -> EvalResult<Value> {
    let overflow = || format!("integer overflow in '{symbol}'");
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Div => {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            let quotient = a / b;
            let remainder = a % b;
            if remainder != 0 && (remainder < 0) != (b < 0) {
                Ok(Value::Int(quotient - 1))
            } else {
                Ok(Value::Int(quotient))
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            let remainder = a % b;
            if remainder != 0 && (remainder < 0) != (b < 0) {
                Ok(Value::Int(remainder + b))
            } else {
                Ok(Value::Int(remainder))
            }
        }
        BinOp::BitOr => Ok(Value::Int(a | b)),
    }
}

fn float_op(op: BinOp, a: f64, b: f64) -> EvalResult<Value> {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(a / b))
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float((a / b).floor()))
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            let remainder = a % b;
            if remainder != 0.0 && (remainder < 0.0) != (b < 0.0) {
                Ok(Value::Float(remainder + b))
            } else {
                Ok(Value::Float(remainder))
            }
        }
        BinOp::BitOr => Err("unsupported operand type(s) for |: 'float' and 'float'".to_string()),
    }
}

fn operand_error(symbol: &str, left: &Value, right: &Value) -> String {
    format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    )
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
    match op {
        // Identity is approximated by equality; `is None` is the case that
        // matters in practice.
        CmpOp::Eq | CmpOp::Is => Ok(value_eq(left, right)),
        CmpOp::Ne | CmpOp::IsNot => Ok(!value_eq(left, right)),
        CmpOp::Lt => ordering(left, right).map(|o| o == std::cmp::Ordering::Less),
        CmpOp::Le => ordering(left, right).map(|o| o != std::cmp::Ordering::Greater),
        CmpOp::Gt => ordering(left, right).map(|o| o == std::cmp::Ordering::Greater),
        CmpOp::Ge => ordering(left, right).map(|o| o != std::cmp::Ordering::Less),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
    }
}

pub(super) fn value_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => i64::from(*a) == *b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| value_eq(x, y))
        }
        (Value::Dict(a), Value::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.iter()
                        .any(|(bk, bv)| value_eq(k, bk) && value_eq(v, bv))
                })
        }
        _ => left == right,
    }
}

pub(super) fn ordering(left: &Value, right: &Value) -> EvalResult<std::cmp::Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.as_ref().cmp(b.as_ref())),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let cmp = ordering(x, y)?;
                if cmp != std::cmp::Ordering::Equal {
                    return Ok(cmp);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| "cannot order NaN values".to_string()),
            _ => Err(format!(
                "'<' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            )),
        },
    }
}

fn contains(container: &Value, needle: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(haystack) => match needle {
            Value::Str(sub) => Ok(haystack.contains(sub.as_ref())),
            other => Err(format!(
                "'in <string>' requires string as left operand, not '{}'",
                other.type_name()
            )),
        },
        Value::List(items) => Ok(items.iter().any(|item| value_eq(item, needle))),
        Value::Dict(items) => Ok(items.iter().any(|(key, _)| value_eq(key, needle))),
        other => Err(format!("argument of type '{}' is not iterable", other.type_name())),
    }
}

// ---------------------------------------------------------------------------
// Indexing and slicing
// ---------------------------------------------------------------------------

fn index_value(object: &Value, index: &Value) -> EvalResult<Value> {
    match object {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let position = resolve_index(index, chars.len(), "string")?;
            Ok(Value::str(chars[position].to_string()))
        }
        Value::List(items) => {
            let position = resolve_index(index, items.len(), "list")?;
            Ok(items[position].clone())
        }
        Value::Dict(items) => items
            .iter()
            .find(|(key, _)| value_eq(key, index))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| format!("key {} not found", index.repr())),
        // `m[1]` is shorthand for `m.group(1)`.
        Value::Match(m) => match index {
            Value::Int(i) => match_group(m, *i),
            other => Err(format!(
                "match indices must be integers, not '{}'",
                other.type_name()
            )),
        },
        other => Err(format!("'{}' object is not subscriptable", other.type_name())),
    }
}

fn resolve_index(index: &Value, len: usize, what: &str) -> EvalResult<usize> {
    let Value::Int(i) = index else {
        return Err(format!(
            "{what} indices must be integers, not '{}'",
            index.type_name()
        ));
    };
    let resolved = if *i < 0 { *i + len as i64 } else { *i };
    if resolved < 0 || resolved as usize >= len {
        return Err(format!("{what} index out of range"));
    }
    Ok(resolved as usize)
}

fn slice_value(object: &Value, start: Option<i64>, stop: Option<i64>) -> EvalResult<Value> {
    match object {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = clamp_slice(start, stop, chars.len());
            Ok(Value::str(chars[from..to].iter().collect::<String>()))
        }
        Value::List(items) => {
            let (from, to) = clamp_slice(start, stop, items.len());
            Ok(Value::list(items[from..to].to_vec()))
        }
        other => Err(format!("'{}' object cannot be sliced", other.type_name())),
    }
}

/// Python slice clamping: out-of-range bounds never error.
fn clamp_slice(start: Option<i64>, stop: Option<i64>, len: usize) -> (usize, usize) {
    let resolve = |bound: i64| -> usize {
        let adjusted = if bound < 0 { bound + len as i64 } else { bound };
        adjusted.clamp(0, len as i64) as usize
    };
    let from = start.map_or(0, resolve);
    let to = stop.map_or(len, resolve);
    (from, to.max(from))
}

pub(super) fn match_group(m: &MatchData, index: i64) -> EvalResult<Value> {
    if index < 0 || index as usize >= m.groups.len() {
        return Err(format!("no such group: {index}"));
    }
    Ok(match &m.groups[index as usize] {
        Some(text) => Value::str(text.clone()),
        None => Value::None,
    })
}

// ---------------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------------

fn call_builtin(name: &str, args: &[Value], kwargs: &[(String, Value)]) -> EvalResult<Value> {
    if !kwargs.is_empty() && name != "sorted" {
        return Err(format!("{name}() takes no keyword arguments"));
    }
    match name {
        "len" => {
            let [value] = expect_args::<1>(name, args)?;
            match value {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Dict(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(format!("object of type '{}' has no len()", other.type_name())),
            }
        }
        "str" => {
            let [value] = expect_args::<1>(name, args)?;
            Ok(Value::str(value.display()))
        }
        "int" => {
            let [value] = expect_args::<1>(name, args)?;
            match value {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| format!("invalid literal for int(): {}", quote_str(s))),
                other => Err(format!("int() argument must not be '{}'", other.type_name())),
            }
        }
        "float" => {
            let [value] = expect_args::<1>(name, args)?;
            match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("could not convert string to float: {}", quote_str(s))),
                other => Err(format!("float() argument must not be '{}'", other.type_name())),
            }
        }
        "bool" => {
            let [value] = expect_args::<1>(name, args)?;
            Ok(Value::Bool(value.is_truthy()))
        }
        "list" => match args {
            [] => Ok(Value::list(Vec::new())),
            [Value::List(items)] => Ok(Value::list(items.as_ref().clone())),
            [Value::Str(s)] => Ok(Value::list(
                s.chars().map(|c| Value::str(c.to_string())).collect(),
            )),
            [Value::Dict(items)] => Ok(Value::list(
                items.iter().map(|(key, _)| key.clone()).collect(),
            )),
            [other] => Err(format!("'{}' object is not iterable", other.type_name())),
            _ => Err("list() takes at most 1 argument".to_string()),
        },
        "dict" => match args {
            [] => Ok(Value::Dict(Rc::new(Vec::new()))),
            [Value::Dict(items)] => Ok(Value::Dict(Rc::new(items.as_ref().clone()))),
            [other] => Err(format!("dict() argument must be a dict, not '{}'", other.type_name())),
            _ => Err("dict() takes at most 1 argument".to_string()),
        },
        "range" => builtin_range(args),
        "min" | "max" => builtin_min_max(name, args),
        "sum" => builtin_sum(args),
        "sorted" => builtin_sorted(args, kwargs),
        "any" => {
            let [value] = expect_args::<1>(name, args)?;
            let items = as_list(value, "any")?;
            Ok(Value::Bool(items.iter().any(Value::is_truthy)))
        }
        "all" => {
            let [value] = expect_args::<1>(name, args)?;
            let items = as_list(value, "all")?;
            Ok(Value::Bool(items.iter().all(Value::is_truthy)))
        }
        "abs" => {
            let [value] = expect_args::<1>(name, args)?;
            match value {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow in abs()".to_string()),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(format!("bad operand type for abs(): '{}'", other.type_name())),
            }
        }
        _ => Err(format!("name '{name}' is not defined")),
    }
}

fn expect_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> EvalResult<&'a [Value; N]> {
    args.try_into()
        .map_err(|_| format!("{name}() takes exactly {N} argument(s), got {}", args.len()))
}

fn as_list<'a>(value: &'a Value, name: &str) -> EvalResult<&'a [Value]> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(format!(
            "{name}() argument must be a list, not '{}'",
            other.type_name()
        )),
    }
}

fn builtin_range(args: &[Value]) -> EvalResult<Value> {
    let int_arg = |value: &Value| -> EvalResult<i64> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(format!(
                "range() arguments must be integers, not '{}'",
                other.type_name()
            )),
        }
    };
    let (start, stop, step) = match args {
        [stop] => (0, int_arg(stop)?, 1),
        [start, stop] => (int_arg(start)?, int_arg(stop)?, 1),
        [start, stop, step] => (int_arg(start)?, int_arg(stop)?, int_arg(step)?),
        _ => return Err("range() takes 1 to 3 arguments".to_string()),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        if items.len() >= RANGE_CAP {
            return Err(format!("range() result exceeds {RANGE_CAP} elements"));
        }
        items.push(Value::Int(current));
        current += step;
    }
    Ok(Value::list(items))
}

fn builtin_min_max(name: &str, args: &[Value]) -> EvalResult<Value> {
    let items: Vec<Value> = match args {
        [] => return Err(format!("{name}() expected at least 1 argument")),
        [Value::List(items)] => items.as_ref().clone(),
        [single] => {
            return Err(format!(
                "'{}' object is not iterable",
                single.type_name()
            ));
        }
        many => many.to_vec(),
    };
    if items.is_empty() {
        return Err(format!("{name}() arg is an empty sequence"));
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        let cmp = ordering(item, &best)?;
        let better = if name == "min" {
            cmp == std::cmp::Ordering::Less
        } else {
            cmp == std::cmp::Ordering::Greater
        };
        if better {
            best = item.clone();
        }
    }
    Ok(best)
}

fn builtin_sum(args: &[Value]) -> EvalResult<Value> {
    let (items, start) = match args {
        [items] => (as_list(items, "sum")?, Value::Int(0)),
        [items, start] => (as_list(items, "sum")?, start.clone()),
        _ => return Err("sum() takes 1 or 2 arguments".to_string()),
    };
    let mut total = start;
    for item in items {
        total = binary(BinOp::Add, &total, item)?;
    }
    Ok(total)
}

fn builtin_sorted(args: &[Value], kwargs: &[(String, Value)]) -> EvalResult<Value> {
    let [value] = expect_args::<1>("sorted", args)?;
    let mut reverse = false;
    for (name, value) in kwargs {
        match name.as_str() {
            "reverse" => reverse = value.is_truthy(),
            "key" => return Err("sorted(key=...) is not supported".to_string()),
            other => return Err(format!("sorted() got an unexpected keyword '{other}'")),
        }
    }
    let mut items = as_list(value, "sorted")?.to_vec();
    let mut failure = None;
    items.sort_by(|a, b| match ordering(a, b) {
        Ok(cmp) => cmp,
        Err(err) => {
            failure.get_or_insert(err);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::list(items))
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

fn call_method(
    receiver: &Value,
    name: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> EvalResult<Value> {
    if !kwargs.is_empty() {
        return Err(format!("{name}() takes no keyword arguments"));
    }
    match receiver {
        Value::Str(s) => super::str_methods::call(s, name, args),
        Value::List(items) => list_method(items, name, args),
        Value::Dict(items) => dict_method(items, name, args),
        Value::Match(m) => match_method(m, name, args),
        other => Err(format!(
            "'{}' object has no method '{name}'",
            other.type_name()
        )),
    }
}

fn list_method(items: &[Value], name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "count" => {
            let [needle] = expect_args::<1>(name, args)?;
            let count = items.iter().filter(|&item| value_eq(item, needle)).count();
            Ok(Value::Int(count as i64))
        }
        "index" => {
            let [needle] = expect_args::<1>(name, args)?;
            items
                .iter()
                .position(|item| value_eq(item, needle))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| format!("{} is not in list", needle.repr()))
        }
        "append" | "extend" | "insert" | "remove" | "pop" | "sort" | "reverse" | "clear" => Err(
            format!("list.{name}() is not available; lists are immutable here"),
        ),
        other => Err(format!("'list' object has no method '{other}'")),
    }
}

fn dict_method(items: &[(Value, Value)], name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "get" => {
            let (key, default) = match args {
                [key] => (key, Value::None),
                [key, default] => (key, default.clone()),
                _ => return Err("get() takes 1 or 2 arguments".to_string()),
            };
            Ok(items
                .iter()
                .find(|(k, _)| value_eq(k, key))
                .map(|(_, v)| v.clone())
                .unwrap_or(default))
        }
        "keys" => Ok(Value::list(items.iter().map(|(k, _)| k.clone()).collect())),
        "values" => Ok(Value::list(items.iter().map(|(_, v)| v.clone()).collect())),
        "items" => Ok(Value::list(
            items
                .iter()
                .map(|(k, v)| Value::list(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        other => Err(format!("'dict' object has no method '{other}'")),
    }
}

fn match_method(m: &MatchData, name: &str, args: &[Value]) -> EvalResult<Value> {
    let group_index = |args: &[Value]| -> EvalResult<i64> {
        match args {
            [] => Ok(0),
            [Value::Int(i)] => Ok(*i),
            [other] => Err(format!(
                "group indices must be integers, not '{}'",
                other.type_name()
            )),
            _ => Err("expected at most 1 group index".to_string()),
        }
    };
    match name {
        "group" => match args {
            [] => match_group(m, 0),
            [Value::Int(i)] => match_group(m, *i),
            many if many.iter().all(|a| matches!(a, Value::Int(_))) => {
                let mut groups = Vec::with_capacity(many.len());
                for arg in many {
                    if let Value::Int(i) = arg {
                        groups.push(match_group(m, *i)?);
                    }
                }
                Ok(Value::list(groups))
            }
            _ => Err("group indices must be integers".to_string()),
        },
        "groups" => Ok(Value::list(
            (1..m.groups.len() as i64)
                .map(|i| match_group(m, i))
                .collect::<EvalResult<Vec<_>>>()?,
        )),
        "start" | "end" | "span" => {
            let index = group_index(args)?;
            if index < 0 || index as usize >= m.spans.len() {
                return Err(format!("no such group: {index}"));
            }
            let Some((start, end)) = m.spans[index as usize] else {
                return Ok(match name {
                    "span" => Value::list(vec![Value::Int(-1), Value::Int(-1)]),
                    _ => Value::Int(-1),
                });
            };
            Ok(match name {
                "start" => Value::Int(start),
                "end" => Value::Int(end),
                _ => Value::list(vec![Value::Int(start), Value::Int(end)]),
            })
        }
        other => Err(format!("'re.Match' object has no method '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::parser::parse;

    fn eval_result(source: &str) -> EvalResult<Option<Value>> {
        let program = parse(source).map_err(|e| e.to_string())?;
        let env = run("alpha beta gamma", &program)?;
        Ok(env.get("result").cloned())
    }

    fn result_of(source: &str) -> Value {
        eval_result(source).expect("eval").expect("result bound")
    }

    #[test]
    fn doc_is_bound_and_sliceable() {
        assert_eq!(result_of("result = doc[0:5]"), Value::str("alpha"));
        assert_eq!(result_of("result = doc[-5:]"), Value::str("gamma"));
        assert_eq!(result_of("result = len(doc)"), Value::Int(16));
    }

    #[test]
    fn conditional_and_boolean_operands() {
        assert_eq!(result_of("result = 'x' or 'y'"), Value::str("x"));
        assert_eq!(result_of("result = '' or 'y'"), Value::str("y"));
        assert_eq!(result_of("result = 1 if 'beta' in doc else 2"), Value::Int(1));
        assert_eq!(result_of("result = not ''"), Value::Bool(true));
    }

    #[test]
    fn arithmetic_follows_python_semantics() {
        assert_eq!(result_of("result = 7 // 2"), Value::Int(3));
        assert_eq!(result_of("result = -7 // 2"), Value::Int(-4));
        assert_eq!(result_of("result = -7 % 2"), Value::Int(1));
        assert_eq!(result_of("result = 7 / 2"), Value::Float(3.5));
        assert_eq!(result_of("result = 'ab' * 3"), Value::str("ababab"));
    }

    #[test]
    fn division_by_zero_is_diagnostic() {
        let err = eval_result("result = 1 / 0").expect_err("error");
        assert_eq!(err, "division by zero");
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(result_of("n = 5\nresult = 0 <= n <= 10"), Value::Bool(true));
        assert_eq!(result_of("n = 15\nresult = 0 <= n <= 10"), Value::Bool(false));
    }

    #[test]
    fn undefined_name_is_diagnostic() {
        let err = eval_result("result = missing + 1").expect_err("error");
        assert_eq!(err, "name 'missing' is not defined");
    }

    #[test]
    fn builtins_cover_the_allow_list() {
        assert_eq!(result_of("result = min([3, 1, 2])"), Value::Int(1));
        assert_eq!(result_of("result = max(3, 1, 2)"), Value::Int(3));
        assert_eq!(result_of("result = sum([1, 2, 3])"), Value::Int(6));
        assert_eq!(
            result_of("result = sorted(['b', 'a'])"),
            Value::list(vec![Value::str("a"), Value::str("b")])
        );
        assert_eq!(
            result_of("result = sorted([1, 3, 2], reverse=True)"),
            Value::list(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
        assert_eq!(result_of("result = any(['', 'x'])"), Value::Bool(true));
        assert_eq!(result_of("result = all(['', 'x'])"), Value::Bool(false));
        assert_eq!(result_of("result = abs(-4)"), Value::Int(4));
        assert_eq!(result_of("result = int('42')"), Value::Int(42));
        assert_eq!(result_of("result = range(3)[2]"), Value::Int(2));
    }

    #[test]
    fn range_cap_is_enforced() {
        let err = eval_result("result = range(10000000)").expect_err("error");
        assert!(err.contains("range() result exceeds"));
    }

    #[test]
    fn repetition_cap_is_enforced() {
        let err = eval_result("result = 'a' * 99999999").expect_err("error");
        assert!(err.contains("too large"));
    }

    #[test]
    fn dict_access_and_methods() {
        assert_eq!(
            result_of("d = {'a': 1, 'b': 2}\nresult = d['b']"),
            Value::Int(2)
        );
        assert_eq!(
            result_of("d = {'a': 1}\nresult = d.get('missing', 9)"),
            Value::Int(9)
        );
        assert_eq!(
            result_of("d = {'a': 1}\nresult = d.keys()"),
            Value::list(vec![Value::str("a")])
        );
    }

    #[test]
    fn shadowing_doc_is_local_to_the_snippet() {
        assert_eq!(result_of("doc = 'tiny'\nresult = doc"), Value::str("tiny"));
        // A later run still sees the pristine document.
        assert_eq!(result_of("result = doc[:5]"), Value::str("alpha"));
    }

    #[test]
    fn modules_are_not_first_class() {
        let err = eval_result("r = re\nresult = 1").expect_err("error");
        assert!(err.contains("module 're' cannot be used as a value"));
    }

    #[test]
    fn str_rendering_matches_python_conventions() {
        assert_eq!(result_of("result = str(2.0)"), Value::str("2.0"));
        assert_eq!(result_of("result = str([1, 'a', None])"), Value::str("[1, 'a', None]"));
        assert_eq!(result_of("result = str({'k': True})"), Value::str("{'k': True}"));
    }
}
