//! String methods exposed inside the sandbox.
//!
//! Indices returned to snippets are character offsets, consistent with the
//! interpreter's indexing and slicing.

use std::rc::Rc;

use crate::core::sandbox::interp::{EvalResult, Value};

pub(super) fn call(receiver: &Rc<str>, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_set(name, args)?;
            let is_strippable =
                |c: char| chars.as_ref().map_or(c.is_whitespace(), |set| set.contains(&c));
            let stripped = match name {
                "strip" => receiver.trim_matches(is_strippable),
                "lstrip" => receiver.trim_start_matches(is_strippable),
                _ => receiver.trim_end_matches(is_strippable),
            };
            Ok(Value::str(stripped))
        }
        "lower" => no_args(name, args).map(|()| Value::str(receiver.to_lowercase())),
        "upper" => no_args(name, args).map(|()| Value::str(receiver.to_uppercase())),
        "split" => split(receiver, args),
        "splitlines" => {
            no_args(name, args)?;
            Ok(Value::list(receiver.lines().map(Value::str).collect()))
        }
        "join" => {
            let [Value::List(items)] = args else {
                return Err("join() takes exactly one list argument".to_string());
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Value::Str(s) => parts.push(s.to_string()),
                    other => {
                        return Err(format!(
                            "sequence item for join() must be str, not '{}'",
                            type_of(other)
                        ));
                    }
                }
            }
            Ok(Value::str(parts.join(receiver)))
        }
        "replace" => {
            let (old, new, count) = match args {
                [Value::Str(old), Value::Str(new)] => (old, new, None),
                [Value::Str(old), Value::Str(new), Value::Int(count)] => (old, new, Some(*count)),
                _ => return Err("replace() takes two strings and an optional count".to_string()),
            };
            let replaced = match count {
                Some(n) if n >= 0 => receiver.replacen(old.as_ref(), new, n as usize),
                _ => receiver.replace(old.as_ref(), new),
            };
            Ok(Value::str(replaced))
        }
        "find" => {
            let (needle, from) = match args {
                [Value::Str(needle)] => (needle, 0i64),
                [Value::Str(needle), Value::Int(from)] => (needle, *from),
                _ => return Err("find() takes a string and an optional start index".to_string()),
            };
            let char_count = receiver.chars().count();
            let from = from.clamp(0, char_count as i64) as usize;
            let from_byte = byte_of_char(receiver, from);
            match receiver[from_byte..].find(needle.as_ref()) {
                Some(offset) => {
                    let found = char_of_byte(receiver, from_byte + offset);
                    Ok(Value::Int(found as i64))
                }
                None => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            let [Value::Str(needle)] = args else {
                return Err("count() takes exactly one string argument".to_string());
            };
            Ok(Value::Int(receiver.matches(needle.as_ref()).count() as i64))
        }
        "startswith" | "endswith" => {
            let matches_one = |prefix: &str| {
                if name == "startswith" {
                    receiver.starts_with(prefix)
                } else {
                    receiver.ends_with(prefix)
                }
            };
            match args {
                [Value::Str(s)] => Ok(Value::Bool(matches_one(s))),
                // Python accepts a tuple of alternatives; a list stands in here.
                [Value::List(items)] => {
                    for item in items.iter() {
                        let Value::Str(s) = item else {
                            return Err(format!("{name}() alternatives must be strings"));
                        };
                        if matches_one(s) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                _ => Err(format!("{name}() takes a string or a list of strings")),
            }
        }
        other => Err(format!("'str' object has no method '{other}'")),
    }
}

fn split(receiver: &str, args: &[Value]) -> EvalResult<Value> {
    let (separator, maxsplit) = match args {
        [] => (None, None),
        [Value::Str(sep)] => (Some(sep.clone()), None),
        [Value::Str(sep), Value::Int(maxsplit)] => (Some(sep.clone()), Some(*maxsplit)),
        [Value::None] => (None, None),
        _ => return Err("split() takes an optional separator and maxsplit".to_string()),
    };
    let parts: Vec<Value> = match separator {
        // Whitespace split drops empty fields, as in Python.
        None => receiver.split_whitespace().map(Value::str).collect(),
        Some(sep) if sep.is_empty() => return Err("empty separator".to_string()),
        Some(sep) => match maxsplit {
            Some(n) if n >= 0 => receiver
                .splitn(n as usize + 1, sep.as_ref())
                .map(Value::str)
                .collect(),
            _ => receiver.split(sep.as_ref()).map(Value::str).collect(),
        },
    };
    Ok(Value::list(parts))
}

fn strip_set(name: &str, args: &[Value]) -> EvalResult<Option<Vec<char>>> {
    match args {
        [] => Ok(None),
        [Value::Str(chars)] => Ok(Some(chars.chars().collect())),
        _ => Err(format!("{name}() takes an optional string of characters")),
    }
}

fn no_args(name: &str, args: &[Value]) -> EvalResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("{name}() takes no arguments"))
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
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

pub(super) fn byte_of_char(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map_or(s.len(), |(byte, _)| byte)
}

pub(super) fn char_of_byte(s: &str, byte_index: usize) -> usize {
    s[..byte_index].chars().count()
}
