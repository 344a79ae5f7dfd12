//! Placeholder expression language.
//!
//! Parses the expressions found inside `{{ }}` placeholders and directive
//! parameters: constants (decimal, float, hex, quoted string, boolean),
//! variables, chained `.attr` / `[key]` / call postfixes, and trailing
//! `| filter(args)` applications.

use serde_json::Value;

use crate::error::{EngineError, Result};

/// A parsed expression.
///
/// `Concat` and `ToStr` never come out of the parser; they are built when a
/// cell mixes literal text with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value (number, boolean).
    Const(Value),
    /// A quoted string literal.
    StrConst(String),
    /// A variable lookup by name.
    Var(String),
    /// `obj.name`
    GetAttr { obj: Box<Expr>, name: String },
    /// `obj[key]`
    GetItem { obj: Box<Expr>, key: Box<Expr> },
    /// `obj(args...)`
    Call { obj: Box<Expr>, args: Vec<CallArg> },
    /// `obj | name(args...)`
    Filter {
        obj: Box<Expr>,
        name: String,
        args: Vec<CallArg>,
    },
    /// Concatenation of rendered parts.
    Concat(Vec<Expr>),
    /// Render the inner value as display text.
    ToStr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Pos(Expr),
    Named(String, Expr),
}

/// Parse a complete expression, filters included. Trailing input is an error.
pub fn parse_expression(text: &str) -> Result<Expr> {
    let mut parser = Parser::new(text)?;
    let expr = parser.parse_filtered()?;
    parser.expect_end()?;
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    Minus,
    Comma,
    Colon,
    Eq,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'.' => {
                tokens.push((Token::Dot, start));
                i += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, start));
                i += 1;
            }
            b',' => {
                tokens.push((Token::Comma, start));
                i += 1;
            }
            b':' => {
                tokens.push((Token::Colon, start));
                i += 1;
            }
            b'=' => {
                tokens.push((Token::Eq, start));
                i += 1;
            }
            b'|' => {
                tokens.push((Token::Pipe, start));
                i += 1;
            }
            b'(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            b'[' => {
                tokens.push((Token::LBracket, start));
                i += 1;
            }
            b']' => {
                tokens.push((Token::RBracket, start));
                i += 1;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                let mut value = String::new();
                let mut closed = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' if i + 1 < bytes.len() => {
                            // The escaped character may be multi-byte too.
                            let escaped = text[i + 1..].chars().next().unwrap();
                            if escaped == quote as char || escaped == '\\' {
                                value.push(escaped);
                            } else {
                                value.push('\\');
                                value.push(escaped);
                            }
                            i += 1 + escaped.len_utf8();
                        }
                        b if b == quote => {
                            i += 1;
                            closed = true;
                            break;
                        }
                        _ => {
                            // Strings are sliced byte-wise but pushed as chars,
                            // so walk multi-byte sequences whole.
                            let rest = &text[i..];
                            let ch = rest.chars().next().unwrap();
                            value.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                if !closed {
                    return Err(EngineError::Parse {
                        offset: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
                tokens.push((Token::Str(value), start));
            }
            b'0'..=b'9' => {
                if bytes[i] == b'0' && i + 1 < bytes.len() && (bytes[i + 1] | 0x20) == b'x' {
                    i += 2;
                    let digits_start = i;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    let value = i64::from_str_radix(&text[digits_start..i], 16).map_err(|_| {
                        EngineError::Parse {
                            offset: start,
                            message: "invalid hex literal".to_string(),
                        }
                    })?;
                    tokens.push((Token::Int(value), start));
                } else {
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    let mut is_float = false;
                    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                        is_float = true;
                        i += 1;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                    let literal = &text[start..i];
                    if is_float {
                        let value = literal.parse::<f64>().map_err(|_| EngineError::Parse {
                            offset: start,
                            message: "invalid number literal".to_string(),
                        })?;
                        tokens.push((Token::Float(value), start));
                    } else {
                        let value = literal.parse::<i64>().map_err(|_| EngineError::Parse {
                            offset: start,
                            message: "invalid number literal".to_string(),
                        })?;
                        tokens.push((Token::Int(value), start));
                    }
                }
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Token::Ident(text[start..i].to_string()), start));
            }
            other => {
                return Err(EngineError::Parse {
                    offset: start,
                    message: format!("unexpected character '{}'", other as char),
                });
            }
        }
    }
    Ok(tokens)
}

/// Token-stream parser shared by the expression and directive grammars.
pub(crate) struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    pub(crate) fn new(text: &str) -> Result<Parser> {
        Ok(Parser {
            tokens: tokenize(text)?,
            pos: 0,
            end: text.len(),
        })
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", token)))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<String> {
        match self.bump() {
            Some((Token::Ident(name), _)) => Ok(name),
            Some((tok, offset)) => Err(EngineError::Parse {
                offset,
                message: format!("expected identifier, found {:?}", tok),
            }),
            None => Err(self.error("expected identifier")),
        }
    }

    /// Parse an expression followed by any number of `| filter` applications.
    pub(crate) fn parse_filtered(&mut self) -> Result<Expr> {
        let mut expr = self.parse_expr()?;
        while self.eat(&Token::Pipe) {
            let name = self.expect_ident()?;
            let args = if self.eat(&Token::LParen) {
                self.parse_call_args()?
            } else {
                Vec::new()
            };
            expr = Expr::Filter {
                obj: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    /// Parse a primary expression with its postfix chain, no filters.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident()?;
                expr = Expr::GetAttr {
                    obj: Box::new(expr),
                    name,
                };
            } else if self.eat(&Token::LBracket) {
                let key = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = Expr::GetItem {
                    obj: Box::new(expr),
                    key: Box::new(key),
                };
            } else if self.eat(&Token::LParen) {
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    obj: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some((Token::Int(n), _)) => Ok(Expr::Const(Value::from(n))),
            Some((Token::Float(f), _)) => Ok(Expr::Const(Value::from(f))),
            Some((Token::Minus, _)) => match self.bump() {
                Some((Token::Int(n), _)) => Ok(Expr::Const(Value::from(-n))),
                Some((Token::Float(f), _)) => Ok(Expr::Const(Value::from(-f))),
                Some((tok, offset)) => Err(EngineError::Parse {
                    offset,
                    message: format!("expected a number after '-', found {:?}", tok),
                }),
                None => Err(self.error("expected a number after '-'")),
            },
            Some((Token::Str(s), _)) => Ok(Expr::StrConst(s)),
            Some((Token::Ident(name), _)) => match name.as_str() {
                "true" | "True" => Ok(Expr::Const(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Const(Value::Bool(false))),
                _ => Ok(Expr::Var(name)),
            },
            Some((tok, offset)) => Err(EngineError::Parse {
                offset,
                message: format!("expected expression, found {:?}", tok),
            }),
            None => Err(self.error("expected expression")),
        }
    }

    /// Parse call arguments after an opening paren, consuming the closing one.
    fn parse_call_args(&mut self) -> Result<Vec<CallArg>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            let named = matches!(self.peek(), Some(Token::Ident(_)))
                && self.peek_at(1) == Some(&Token::Eq);
            if named {
                let name = self.expect_ident()?;
                self.expect(Token::Eq)?;
                args.push(CallArg::Named(name, self.parse_expr()?));
            } else {
                args.push(CallArg::Pos(self.parse_expr()?));
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            break;
        }
        Ok(args)
    }
}
