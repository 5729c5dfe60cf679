//! The `json` capability: structured-data encode/decode for snippets.

use std::rc::Rc;

use crate::core::sandbox::interp::{EvalResult, Value};

pub(super) fn call(name: &str, args: &[Value], kwargs: &[(String, Value)]) -> EvalResult<Value> {
    match name {
        "dumps" => {
            let [value] = args else {
                return Err("dumps() takes exactly one argument".to_string());
            };
            let mut indent = false;
            for (key, value) in kwargs {
                match key.as_str() {
                    "indent" => indent = value.is_truthy(),
                    other => return Err(format!("dumps() got an unexpected keyword '{other}'")),
                }
            }
            let json = to_json(value)?;
            let rendered = if indent {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            rendered
                .map(Value::str)
                .map_err(|err| format!("dumps() failed: {err}"))
        }
        "loads" => {
            let [Value::Str(text)] = args else {
                return Err("loads() takes exactly one string argument".to_string());
            };
            if !kwargs.is_empty() {
                return Err("loads() takes no keyword arguments".to_string());
            }
            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|err| format!("invalid JSON: {err}"))?;
            Ok(from_json(&parsed))
        }
        other => Err(format!("module 'json' has no function '{other}'")),
    }
}

fn to_json(value: &Value) -> EvalResult<serde_json::Value> {
    match value {
        Value::None => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(i) => Ok(serde_json::Value::from(*i)),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| "out of range float value is not JSON serializable".to_string()),
        Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::List(items) => {
            let array = items.iter().map(to_json).collect::<EvalResult<Vec<_>>>()?;
            Ok(serde_json::Value::Array(array))
        }
        Value::Dict(items) => {
            let mut object = serde_json::Map::with_capacity(items.len());
            for (key, value) in items.iter() {
                object.insert(json_key(key)?, to_json(value)?);
            }
            Ok(serde_json::Value::Object(object))
        }
        Value::Match(_) => Err("object of type 're.Match' is not JSON serializable".to_string()),
    }
}

/// Non-string keys are coerced the way Python's `json.dumps` coerces them.
fn json_key(key: &Value) -> EvalResult<String> {
    match key {
        Value::Str(s) => Ok(s.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Bool(true) => Ok("true".to_string()),
        Value::Bool(false) => Ok("false".to_string()),
        Value::None => Ok("null".to_string()),
        other => Err(format!(
            "dict key of type '{}' is not JSON serializable",
            match other {
                Value::Float(_) => "float",
                Value::List(_) => "list",
                Value::Dict(_) => "dict",
                _ => "re.Match",
            }
        )),
    }
}

fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(from_json).collect()),
        serde_json::Value::Object(object) => Value::Dict(Rc::new(
            object
                .iter()
                .map(|(key, value)| (Value::str(key.clone()), from_json(value)))
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_renders_containers() {
        let value = Value::Dict(Rc::new(vec![
            (Value::str("rate"), Value::Float(2.5)),
            (Value::str("items"), Value::list(vec![Value::Int(1), Value::None])),
        ]));
        // serde_json orders object keys; rendering stays deterministic.
        let result = call("dumps", &[value], &[]).expect("dumps");
        assert_eq!(
            result,
            Value::str(r#"{"items":[1,null],"rate":2.5}"#)
        );
    }

    #[test]
    fn loads_round_trips_into_sandbox_values() {
        let result = call("loads", &[Value::str(r#"{"a": [1, 2.5, "x"]}"#)], &[]).expect("loads");
        let Value::Dict(items) = result else { panic!("expected dict") };
        assert_eq!(items[0].0, Value::str("a"));
        let Value::List(inner) = &items[0].1 else { panic!("expected list") };
        assert_eq!(inner[0], Value::Int(1));
        assert_eq!(inner[1], Value::Float(2.5));
        assert_eq!(inner[2], Value::str("x"));
    }

    #[test]
    fn invalid_json_is_diagnostic() {
        let err = call("loads", &[Value::str("{nope")], &[]).expect_err("error");
        assert!(err.starts_with("invalid JSON:"));
    }

    #[test]
    fn match_values_are_not_serializable() {
        let m = Value::Match(Rc::new(crate::core::sandbox::interp::MatchData {
            groups: vec![Some("x".to_string())],
            spans: vec![Some((0, 1))],
        }));
        let err = call("dumps", &[m], &[]).expect_err("error");
        assert!(err.contains("not JSON serializable"));
    }
}
