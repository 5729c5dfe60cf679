//! The `re` capability: pattern matching against sandbox strings.
//!
//! Thin adapter from the Python-style call surface oracles write
//! (`re.search(pattern, string, flags)`) onto the `regex` crate. Patterns the
//! engine cannot express (back-references, look-around) fail with the
//! engine's own diagnostic, which is safe to hand back to the oracle.

use std::rc::Rc;

use regex::{Regex, RegexBuilder};

use crate::core::sandbox::interp::{EvalResult, FINDITER_CAP, MatchData, Value};
use crate::core::sandbox::str_methods::char_of_byte;

pub(super) fn call(name: &str, args: &[Value], kwargs: &[(String, Value)]) -> EvalResult<Value> {
    match name {
        "search" => {
            let (pattern, haystack, flags) = pattern_string_flags(name, args, kwargs, 2)?;
            let regex = compile(&pattern, flags)?;
            Ok(first_match(&regex, &haystack))
        }
        "match" => {
            let (pattern, haystack, flags) = pattern_string_flags(name, args, kwargs, 2)?;
            let regex = compile(&format!(r"\A(?:{pattern})"), flags)?;
            Ok(first_match(&regex, &haystack))
        }
        "fullmatch" => {
            let (pattern, haystack, flags) = pattern_string_flags(name, args, kwargs, 2)?;
            let regex = compile(&format!(r"\A(?:{pattern})\z"), flags)?;
            Ok(first_match(&regex, &haystack))
        }
        "findall" => {
            let (pattern, haystack, flags) = pattern_string_flags(name, args, kwargs, 2)?;
            let regex = compile(&pattern, flags)?;
            findall(&regex, &haystack)
        }
        "finditer" => {
            let (pattern, haystack, flags) = pattern_string_flags(name, args, kwargs, 2)?;
            let regex = compile(&pattern, flags)?;
            let mut matches = Vec::new();
            for caps in regex.captures_iter(&haystack) {
                if matches.len() >= FINDITER_CAP {
                    return Err(format!("finditer() produced more than {FINDITER_CAP} matches"));
                }
                matches.push(match_value(&caps, &haystack));
            }
            Ok(Value::list(matches))
        }
        "split" => {
            let [Value::Str(pattern), Value::Str(haystack), rest @ ..] = args else {
                return Err("split() takes a pattern and a string".to_string());
            };
            let maxsplit = int_option(rest.first(), kwargs, "maxsplit")?.unwrap_or(0);
            let flags = int_option(rest.get(1), kwargs, "flags")?.unwrap_or(0);
            let regex = compile(pattern, flags)?;
            let parts: Vec<Value> = if maxsplit > 0 {
                regex
                    .splitn(haystack, maxsplit as usize + 1)
                    .map(Value::str)
                    .collect()
            } else {
                regex.split(haystack).map(Value::str).collect()
            };
            Ok(Value::list(parts))
        }
        "sub" => {
            let [Value::Str(pattern), Value::Str(repl), Value::Str(haystack), rest @ ..] = args
            else {
                return Err("sub() takes a pattern, a replacement, and a string".to_string());
            };
            let count = int_option(rest.first(), kwargs, "count")?.unwrap_or(0);
            let flags = int_option(rest.get(1), kwargs, "flags")?.unwrap_or(0);
            let regex = compile(pattern, flags)?;
            let replacement = translate_replacement(repl);
            let replaced = if count > 0 {
                regex.replacen(haystack, count as usize, replacement.as_str())
            } else {
                regex.replace_all(haystack, replacement.as_str())
            };
            Ok(Value::str(replaced.into_owned()))
        }
        other => Err(format!("module 're' has no function '{other}'")),
    }
}

fn compile(pattern: &str, flags: i64) -> EvalResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags & 2 != 0)
        .multi_line(flags & 8 != 0)
        .dot_matches_new_line(flags & 16 != 0)
        .build()
        .map_err(|err| format!("invalid regular expression: {err}"))
}

/// Common `(pattern, string[, flags])` argument shape.
fn pattern_string_flags(
    name: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    flags_position: usize,
) -> EvalResult<(Rc<str>, Rc<str>, i64)> {
    let [Value::Str(pattern), Value::Str(haystack), ..] = args else {
        return Err(format!("{name}() takes a pattern string and a subject string"));
    };
    if args.len() > flags_position + 1 {
        return Err(format!("{name}() takes at most {} arguments", flags_position + 1));
    }
    let flags = int_option(args.get(flags_position), kwargs, "flags")?.unwrap_or(0);
    Ok((pattern.clone(), haystack.clone(), flags))
}

fn int_option(
    positional: Option<&Value>,
    kwargs: &[(String, Value)],
    name: &str,
) -> EvalResult<Option<i64>> {
    let value = positional.or_else(|| {
        kwargs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    });
    match value {
        None => Ok(None),
        Some(Value::Int(i)) => Ok(Some(*i)),
        Some(other) => Err(format!(
            "'{name}' must be an integer, not a {}",
            match other {
                Value::Str(_) => "string",
                _ => "non-integer value",
            }
        )),
    }
}

fn first_match(regex: &Regex, haystack: &str) -> Value {
    match regex.captures(haystack) {
        Some(caps) => match_value(&caps, haystack),
        None => Value::None,
    }
}

fn match_value(caps: &regex::Captures<'_>, haystack: &str) -> Value {
    let mut groups = Vec::with_capacity(caps.len());
    let mut spans = Vec::with_capacity(caps.len());
    for index in 0..caps.len() {
        match caps.get(index) {
            Some(group) => {
                groups.push(Some(group.as_str().to_string()));
                spans.push(Some((
                    char_of_byte(haystack, group.start()) as i64,
                    char_of_byte(haystack, group.end()) as i64,
                )));
            }
            None => {
                groups.push(None);
                spans.push(None);
            }
        }
    }
    Value::Match(Rc::new(MatchData { groups, spans }))
}

/// Python `findall` semantics: whole matches without groups, group 1 with one
/// group, a list per match with several groups. Unmatched groups become "".
fn findall(regex: &Regex, haystack: &str) -> EvalResult<Value> {
    let group_count = regex.captures_len() - 1;
    let mut results = Vec::new();
    for caps in regex.captures_iter(haystack) {
        if results.len() >= FINDITER_CAP {
            return Err(format!("findall() produced more than {FINDITER_CAP} matches"));
        }
        let item = match group_count {
            0 => Value::str(&caps[0]),
            1 => Value::str(caps.get(1).map_or("", |g| g.as_str())),
            _ => Value::list(
                (1..=group_count)
                    .map(|i| Value::str(caps.get(i).map_or("", |g| g.as_str())))
                    .collect(),
            ),
        };
        results.push(item);
    }
    Ok(Value::list(results))
}

/// Translate a Python replacement template (`\1`, `\g<name>`) to the `$`
/// syntax the `regex` crate expands, escaping literal `$`.
fn translate_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str("${");
                    out.push_str(&digits);
                    out.push('}');
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let mut name = String::new();
                        for d in chars.by_ref() {
                            if d == '>' {
                                break;
                            }
                            name.push(d);
                        }
                        out.push_str("${");
                        out.push_str(&name);
                        out.push('}');
                    } else {
                        out.push('g');
                    }
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::interp::value_eq;

    fn strs(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::str(*s)).collect())
    }

    #[test]
    fn search_returns_match_with_groups() {
        let result = call(
            "search",
            &[Value::str(r"(\d+)%"), Value::str("rate is 42% today")],
            &[],
        )
        .expect("search");
        let Value::Match(m) = result else { panic!("expected match") };
        assert_eq!(m.groups[0].as_deref(), Some("42%"));
        assert_eq!(m.groups[1].as_deref(), Some("42"));
        assert_eq!(m.spans[0], Some((8, 11)));
    }

    #[test]
    fn search_without_match_is_none() {
        let result = call("search", &[Value::str("xyz"), Value::str("abc")], &[]).expect("search");
        assert_eq!(result, Value::None);
    }

    #[test]
    fn match_is_anchored_at_start() {
        let found = call("match", &[Value::str("ab"), Value::str("abc")], &[]).expect("match");
        assert!(matches!(found, Value::Match(_)));
        let missed = call("match", &[Value::str("bc"), Value::str("abc")], &[]).expect("match");
        assert_eq!(missed, Value::None);
    }

    #[test]
    fn findall_group_arity() {
        let whole = call("findall", &[Value::str(r"\d+"), Value::str("1 a 22")], &[])
            .expect("findall");
        assert!(value_eq(&whole, &strs(&["1", "22"])));

        let single = call(
            "findall",
            &[Value::str(r"(\d+)%"), Value::str("5% and 10%")],
            &[],
        )
        .expect("findall");
        assert!(value_eq(&single, &strs(&["5", "10"])));

        let pairs = call(
            "findall",
            &[Value::str(r"(\w+)=(\d+)"), Value::str("a=1 b=2")],
            &[],
        )
        .expect("findall");
        let expected = Value::list(vec![strs(&["a", "1"]), strs(&["b", "2"])]);
        assert!(value_eq(&pairs, &expected));
    }

    #[test]
    fn flags_are_honored() {
        let result = call(
            "search",
            &[Value::str("penalty"), Value::str("LATE PENALTY"), Value::Int(2)],
            &[],
        )
        .expect("search");
        assert!(matches!(result, Value::Match(_)));

        let via_kwarg = call(
            "search",
            &[Value::str("penalty"), Value::str("LATE PENALTY")],
            &[("flags".to_string(), Value::Int(2))],
        )
        .expect("search");
        assert!(matches!(via_kwarg, Value::Match(_)));
    }

    #[test]
    fn sub_translates_backreferences() {
        let result = call(
            "sub",
            &[
                Value::str(r"(\w+)@(\w+)"),
                Value::str(r"\2 at \1"),
                Value::str("user@host"),
            ],
            &[],
        )
        .expect("sub");
        assert_eq!(result, Value::str("host at user"));
    }

    #[test]
    fn sub_escapes_literal_dollars() {
        let result = call(
            "sub",
            &[Value::str(r"\d+"), Value::str("$0"), Value::str("pay 42 now")],
            &[],
        )
        .expect("sub");
        assert_eq!(result, Value::str("pay $0 now"));
    }

    #[test]
    fn split_with_maxsplit() {
        let result = call(
            "split",
            &[Value::str(r",\s*"), Value::str("a, b, c"), Value::Int(1)],
            &[],
        )
        .expect("split");
        assert!(value_eq(&result, &strs(&["a", "b, c"])));
    }

    #[test]
    fn invalid_pattern_is_diagnostic() {
        let err = call("search", &[Value::str("("), Value::str("x")], &[]).expect_err("error");
        assert!(err.starts_with("invalid regular expression:"));
    }

    #[test]
    fn spans_are_char_offsets() {
        let result = call("search", &[Value::str("β"), Value::str("ααβ")], &[]).expect("search");
        let Value::Match(m) = result else { panic!("expected match") };
        assert_eq!(m.spans[0], Some((2, 3)));
    }
}
