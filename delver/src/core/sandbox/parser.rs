//! Recursive-descent parser producing the snippet AST.
//!
//! Capability restriction starts here: imports outside the allow-list,
//! underscore attribute access, and unsupported statement forms are compile
//! errors carrying diagnostics meant for the oracle, not the host log.

use crate::core::sandbox::lexer::{Tok, tokenize};

/// Modules pre-bound inside the sandbox. Importing them is a tolerated no-op;
/// importing anything else is a compile error.
pub const ALLOWED_MODULES: &[&str] = &["re", "json"];

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import re` / `import json` — accepted and ignored.
    Import(String),
    Assign { name: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `then if test else orelse`
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Chained comparison: `left op0 rhs0 op1 rhs1 ...`
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attr {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    BitOr,
}

pub fn parse(source: &str) -> Result<Vec<Stmt>, String> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, String> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while self.peek().is_some() {
            statements.push(self.statement()?);
            match self.peek() {
                Some(Tok::Newline) => self.skip_newlines(),
                Some(other) => {
                    return Err(format!("unexpected {} after statement", describe(other)));
                }
                None => break,
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        if self.eat(&Tok::Import) {
            // `import re`, `import json`, or `import re, json`.
            let first = self.import_module()?;
            while self.eat(&Tok::Comma) {
                self.import_module()?;
            }
            return Ok(Stmt::Import(first));
        }

        // Assignment needs two tokens of lookahead: NAME '='.
        if let (Some(Tok::Name(name)), Some(Tok::Assign)) =
            (self.peek().cloned(), self.peek_at(1).cloned())
        {
            self.next();
            self.next();
            let value = self.expression()?;
            return Ok(Stmt::Assign { name, value });
        }

        Ok(Stmt::Expr(self.expression()?))
    }

    fn import_module(&mut self) -> Result<String, String> {
        let Some(Tok::Name(module)) = self.next() else {
            return Err("expected a module name after 'import'".to_string());
        };
        if !ALLOWED_MODULES.contains(&module.as_str()) {
            return Err(format!(
                "import of '{module}' is not allowed; only 're' and 'json' are available \
                 (both are already in scope)"
            ));
        }
        if self.eat(&Tok::Dot) {
            return Err("submodule imports are not supported".to_string());
        }
        Ok(module)
    }

    fn expression(&mut self) -> Result<Expr, String> {
        let value = self.or_expr()?;
        // Conditional expression: `value if test else orelse`.
        if self.eat(&Tok::If) {
            let test = self.or_expr()?;
            if !self.eat(&Tok::Else) {
                return Err("conditional expression is missing 'else'".to_string());
            }
            let orelse = self.expression()?;
            return Ok(Expr::Cond {
                test: Box::new(test),
                then: Box::new(value),
                orelse: Box::new(orelse),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and_expr()?;
        while self.eat(&Tok::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.not_expr()?;
        while self.eat(&Tok::And) {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Not) {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op()? {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            rest,
        })
    }

    fn comparison_op(&mut self) -> Result<Option<CmpOp>, String> {
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            Some(Tok::In) => CmpOp::In,
            Some(Tok::Is) => {
                self.next();
                if self.eat(&Tok::Not) {
                    return Ok(Some(CmpOp::IsNot));
                }
                return Ok(Some(CmpOp::Is));
            }
            Some(Tok::Not) => {
                // Only valid as `not in` at this position.
                self.next();
                if self.eat(&Tok::In) {
                    return Ok(Some(CmpOp::NotIn));
                }
                return Err("expected 'in' after 'not' in comparison".to_string());
            }
            _ => return Ok(None),
        };
        self.next();
        Ok(Some(op))
    }

    fn arith(&mut self) -> Result<Expr, String> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                Some(Tok::Pipe) => BinOp::BitOr,
                _ => break,
            };
            self.next();
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::SlashSlash) => BinOp::FloorDiv,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.next();
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.factor()?)));
        }
        if self.eat(&Tok::Plus) {
            return self.factor();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(&Tok::Dot) {
                let Some(Tok::Name(name)) = self.next() else {
                    return Err("expected an attribute name after '.'".to_string());
                };
                if name.starts_with('_') {
                    return Err(format!("attribute '{name}' is not allowed"));
                }
                expr = Expr::Attr {
                    object: Box::new(expr),
                    name,
                };
            } else if self.eat(&Tok::LParen) {
                let (args, kwargs) = self.call_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat(&Tok::LBracket) {
                expr = self.subscript(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), String> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            if let (Some(Tok::Name(name)), Some(Tok::Assign)) =
                (self.peek().cloned(), self.peek_at(1).cloned())
            {
                self.next();
                self.next();
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err("positional argument after keyword argument".to_string());
                }
                args.push(self.expression()?);
            }
            if self.eat(&Tok::Comma) {
                // Trailing comma before the closing paren is fine.
                if self.eat(&Tok::RParen) {
                    return Ok((args, kwargs));
                }
                continue;
            }
            if self.eat(&Tok::RParen) {
                return Ok((args, kwargs));
            }
            return Err("expected ',' or ')' in call arguments".to_string());
        }
    }

    fn subscript(&mut self, object: Expr) -> Result<Expr, String> {
        // `[:stop]`, `[start:]`, `[start:stop]`, `[:]` or a plain index.
        let start = if matches!(self.peek(), Some(Tok::Colon)) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if self.eat(&Tok::Colon) {
            let stop = if matches!(self.peek(), Some(Tok::RBracket)) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            if self.eat(&Tok::Colon) {
                return Err("slice step is not supported".to_string());
            }
            if !self.eat(&Tok::RBracket) {
                return Err("expected ']' to close slice".to_string());
            }
            return Ok(Expr::Slice {
                object: Box::new(object),
                start,
                stop,
            });
        }
        if !self.eat(&Tok::RBracket) {
            return Err("expected ']' to close index".to_string());
        }
        let Some(index) = start else {
            return Err("empty subscript".to_string());
        };
        Ok(Expr::Index {
            object: Box::new(object),
            index,
        })
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Int(value)) => Ok(Expr::Int(value)),
            Some(Tok::Float(value)) => Ok(Expr::Float(value)),
            Some(Tok::Str(value)) => Ok(Expr::Str(value)),
            Some(Tok::True) => Ok(Expr::Bool(true)),
            Some(Tok::False) => Ok(Expr::Bool(false)),
            Some(Tok::None) => Ok(Expr::None),
            Some(Tok::Name(name)) => Ok(Expr::Name(name)),
            Some(Tok::LParen) => {
                let inner = self.expression()?;
                if !self.eat(&Tok::RParen) {
                    return Err("expected ')'".to_string());
                }
                Ok(inner)
            }
            Some(Tok::LBracket) => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expression()?);
                    if self.eat(&Tok::Comma) {
                        if self.eat(&Tok::RBracket) {
                            return Ok(Expr::List(items));
                        }
                        continue;
                    }
                    if self.eat(&Tok::RBracket) {
                        return Ok(Expr::List(items));
                    }
                    return Err("expected ',' or ']' in list".to_string());
                }
            }
            Some(Tok::LBrace) => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Dict(items));
                }
                loop {
                    let key = self.expression()?;
                    if !self.eat(&Tok::Colon) {
                        return Err("expected ':' after dict key".to_string());
                    }
                    let value = self.expression()?;
                    items.push((key, value));
                    if self.eat(&Tok::Comma) {
                        if self.eat(&Tok::RBrace) {
                            return Ok(Expr::Dict(items));
                        }
                        continue;
                    }
                    if self.eat(&Tok::RBrace) {
                        return Ok(Expr::Dict(items));
                    }
                    return Err("expected ',' or '}' in dict".to_string());
                }
            }
            Some(other) => Err(format!("unexpected {}", describe(&other))),
            None => Err("unexpected end of snippet".to_string()),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Tok> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }
}

fn describe(token: &Tok) -> String {
    match token {
        Tok::Name(name) => format!("name '{name}'"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Int(value) => format!("'{value}'"),
        Tok::Float(value) => format!("'{value}'"),
        Tok::Newline => "end of line".to_string(),
        other => format!("'{other:?}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_chain() {
        let program = parse("m = re.search(r'x', doc)\nresult = m.group(0) if m else None")
            .expect("parse");
        assert_eq!(program.len(), 2);
        assert!(matches!(&program[0], Stmt::Assign { name, .. } if name == "m"));
        assert!(matches!(
            &program[1],
            Stmt::Assign { name, value: Expr::Cond { .. } } if name == "result"
        ));
    }

    #[test]
    fn allowed_import_is_noop_statement() {
        let program = parse("import re\nresult = 1").expect("parse");
        assert_eq!(program[0], Stmt::Import("re".to_string()));
    }

    #[test]
    fn disallowed_import_is_compile_error() {
        let err = parse("import os\nresult = 1").expect_err("reject");
        assert!(err.contains("import of 'os' is not allowed"));
        assert!(err.contains("'re' and 'json'"));
    }

    #[test]
    fn underscore_attribute_is_compile_error() {
        let err = parse("result = doc.__class__").expect_err("reject");
        assert!(err.contains("'__class__' is not allowed"));
    }

    #[test]
    fn kwargs_parse_after_positional() {
        let program = parse("result = re.findall('x', doc, flags=re.I)").expect("parse");
        let Stmt::Assign { value: Expr::Call { args, kwargs, .. }, .. } = &program[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs[0].0, "flags");
    }

    #[test]
    fn slices_parse_with_open_ends() {
        assert!(parse("result = doc[100:200]").is_ok());
        assert!(parse("result = doc[:50]").is_ok());
        assert!(parse("result = doc[50:]").is_ok());
        let err = parse("result = doc[::2]").expect_err("reject step");
        assert!(err.contains("slice step"));
    }

    #[test]
    fn not_in_and_is_not_parse() {
        assert!(parse("result = 'x' not in doc").is_ok());
        assert!(parse("result = m is not None").is_ok());
    }

    #[test]
    fn chained_comparison_parses() {
        let program = parse("result = 0 <= n <= 10").expect("parse");
        let Stmt::Assign { value: Expr::Compare { rest, .. }, .. } = &program[0] else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
    }
}
