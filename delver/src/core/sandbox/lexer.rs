//! Tokenizer for the restricted search snippet language.
//!
//! The surface syntax is the Python expression subset oracles actually emit:
//! assignments, calls, attribute access, subscripts, literals, and boolean /
//! comparison / arithmetic operators. Anything else is rejected here or in
//! the parser with a diagnostic safe to echo back to the oracle.

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    // Keywords.
    Import,
    If,
    Else,
    Or,
    And,
    Not,
    In,
    Is,
    True,
    False,
    None,
    // Operators and punctuation.
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    /// Statement separator (newline or `;`).
    Newline,
}

/// Statement-level keywords the sandbox deliberately does not support.
const REJECTED_KEYWORDS: &[&str] = &[
    "def", "class", "for", "while", "lambda", "return", "yield", "try", "except", "finally",
    "raise", "with", "from", "as", "global", "nonlocal", "del", "assert", "pass", "break",
    "continue", "async", "await",
];

/// Tokenize a snippet. Errors are diagnostics, never host detail.
pub fn tokenize(source: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    // Newlines inside brackets are implicit continuations, as in Python.
    let mut bracket_depth = 0usize;

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\\' => {
                // Explicit line continuation.
                chars.next();
                match chars.next() {
                    Some('\n') => line += 1,
                    Some('\r') => {
                        if chars.peek() == Some(&'\n') {
                            chars.next();
                        }
                        line += 1;
                    }
                    _ => return Err(format!("line {line}: stray '\\'")),
                }
            }
            '\n' => {
                chars.next();
                line += 1;
                if bracket_depth == 0 && !matches!(tokens.last(), Some(Tok::Newline) | Option::None)
                {
                    tokens.push(Tok::Newline);
                }
            }
            ';' => {
                chars.next();
                if !matches!(tokens.last(), Some(Tok::Newline) | Option::None) {
                    tokens.push(Tok::Newline);
                }
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\'' | '"' => {
                tokens.push(Tok::Str(read_string(&mut chars, false, line)?));
            }
            '0'..='9' => {
                tokens.push(read_number(&mut chars, line)?);
            }
            '.' => {
                chars.next();
                if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    tokens.push(read_fraction(&mut chars, line)?);
                } else {
                    tokens.push(Tok::Dot);
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let word = read_word(&mut chars);
                // Raw string prefix: r'...' / R"...".
                if (word == "r" || word == "R") && matches!(chars.peek(), Some('\'' | '"')) {
                    tokens.push(Tok::Str(read_string(&mut chars, true, line)?));
                    continue;
                }
                if (word == "f" || word == "F") && matches!(chars.peek(), Some('\'' | '"')) {
                    return Err(format!(
                        "line {line}: f-strings are not supported; build strings with +"
                    ));
                }
                tokens.push(keyword_or_name(&word, line)?);
            }
            '(' | '[' | '{' => {
                bracket_depth += 1;
                tokens.push(match ch {
                    '(' => Tok::LParen,
                    '[' => Tok::LBracket,
                    _ => Tok::LBrace,
                });
                chars.next();
            }
            ')' | ']' | '}' => {
                bracket_depth = bracket_depth.saturating_sub(1);
                tokens.push(match ch {
                    ')' => Tok::RParen,
                    ']' => Tok::RBracket,
                    _ => Tok::RBrace,
                });
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    return Err(format!("line {line}: operator '**' is not supported"));
                }
                tokens.push(Tok::Star);
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(Tok::SlashSlash);
                } else {
                    tokens.push(Tok::Slash);
                }
            }
            '%' => {
                chars.next();
                tokens.push(Tok::Percent);
            }
            '|' => {
                chars.next();
                tokens.push(Tok::Pipe);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Eq);
                } else {
                    tokens.push(Tok::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Ne);
                } else {
                    return Err(format!("line {line}: unexpected '!'"));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Le);
                } else {
                    tokens.push(Tok::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Ge);
                } else {
                    tokens.push(Tok::Gt);
                }
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Tok::Colon);
            }
            other => {
                return Err(format!("line {line}: unexpected character '{other}'"));
            }
        }
    }

    Ok(tokens)
}

fn keyword_or_name(word: &str, line: usize) -> Result<Tok, String> {
    if REJECTED_KEYWORDS.contains(&word) {
        return Err(format!(
            "line {line}: '{word}' is not supported in search snippets"
        ));
    }
    Ok(match word {
        "import" => Tok::Import,
        "if" => Tok::If,
        "else" => Tok::Else,
        "or" => Tok::Or,
        "and" => Tok::And,
        "not" => Tok::Not,
        "in" => Tok::In,
        "is" => Tok::Is,
        "True" => Tok::True,
        "False" => Tok::False,
        "None" => Tok::None,
        _ => Tok::Name(word.to_string()),
    })
}

fn read_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

fn read_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<Tok, String> {
    let mut digits = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' | '_' => {
                if c != '_' {
                    digits.push(c);
                }
                chars.next();
            }
            '.' if !is_float => {
                is_float = true;
                digits.push(c);
                chars.next();
            }
            'e' | 'E' => {
                is_float = true;
                digits.push(c);
                chars.next();
                if let Some(&sign) = chars.peek() {
                    if sign == '+' || sign == '-' {
                        digits.push(sign);
                        chars.next();
                    }
                }
            }
            _ => break,
        }
    }
    if is_float {
        digits
            .parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| format!("line {line}: invalid number literal '{digits}'"))
    } else {
        digits
            .parse::<i64>()
            .map(Tok::Int)
            .map_err(|_| format!("line {line}: integer literal '{digits}' is too large"))
    }
}

/// A float written with a leading dot (`.5`). The dot is already consumed.
fn read_fraction(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<Tok, String> {
    let mut digits = String::from("0.");
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    digits
        .parse::<f64>()
        .map(Tok::Float)
        .map_err(|_| format!("line {line}: invalid number literal '{digits}'"))
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    raw: bool,
    line: usize,
) -> Result<String, String> {
    let quote = chars.next().expect("caller checked the opening quote");
    let mut value = String::new();
    loop {
        match chars.next() {
            Option::None | Some('\n') => {
                return Err(format!("line {line}: unterminated string literal"));
            }
            Some(c) if c == quote => return Ok(value),
            Some('\\') => {
                let Some(escaped) = chars.next() else {
                    return Err(format!("line {line}: unterminated string literal"));
                };
                if raw {
                    // Raw strings keep the backslash, but it still shields a quote.
                    value.push('\\');
                    value.push(escaped);
                } else {
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        // Python leaves unknown escapes in place.
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
            }
            Some(c) => value.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_assignment_with_call() {
        let tokens = tokenize("m = re.search(r'\\d+', doc)").expect("tokenize");
        assert_eq!(tokens[0], Tok::Name("m".to_string()));
        assert_eq!(tokens[1], Tok::Assign);
        assert_eq!(tokens[2], Tok::Name("re".to_string()));
        assert_eq!(tokens[3], Tok::Dot);
        assert!(tokens.contains(&Tok::Str("\\d+".to_string())));
    }

    #[test]
    fn raw_string_keeps_backslashes() {
        let tokens = tokenize(r"p = r'\b(\d+)%'").expect("tokenize");
        assert!(tokens.contains(&Tok::Str(r"\b(\d+)%".to_string())));
    }

    #[test]
    fn plain_string_resolves_escapes() {
        let tokens = tokenize(r#"s = 'a\nb'"#).expect("tokenize");
        assert!(tokens.contains(&Tok::Str("a\nb".to_string())));
    }

    #[test]
    fn newlines_inside_brackets_do_not_separate() {
        let tokens = tokenize("x = re.findall(\n  'a',\n  doc\n)").expect("tokenize");
        assert_eq!(tokens.iter().filter(|t| **t == Tok::Newline).count(), 0);
    }

    #[test]
    fn semicolons_and_newlines_collapse() {
        let tokens = tokenize("a = 1;\nb = 2\n\n\nc = 3").expect("tokenize");
        assert_eq!(tokens.iter().filter(|t| **t == Tok::Newline).count(), 2);
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = tokenize("a = 1  # trailing note").expect("tokenize");
        assert_eq!(tokens, vec![Tok::Name("a".to_string()), Tok::Assign, Tok::Int(1)]);
    }

    #[test]
    fn loops_are_rejected_with_diagnostic() {
        let err = tokenize("for x in y:\n    pass").expect_err("reject");
        assert!(err.contains("'for' is not supported"));
    }

    #[test]
    fn power_operator_is_rejected() {
        let err = tokenize("x = 2 ** 8").expect_err("reject");
        assert!(err.contains("'**'"));
    }

    #[test]
    fn leading_dot_float() {
        let tokens = tokenize("c = .85").expect("tokenize");
        assert!(tokens.contains(&Tok::Float(0.85)));
    }
}
