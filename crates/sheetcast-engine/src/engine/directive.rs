//! Cell annotation grammar.
//!
//! A directive is a single annotation line: a name, then either `=` and a
//! value (`col-width=10`) or a comma and parameter list
//! (`loop-down, for row in rows, last_cell=C3`). Names are matched
//! case-insensitively and `-` and `_` are interchangeable.

use crate::engine::cell_ref::{CellRange, CellRef};
use crate::engine::cells::Axis;
use crate::engine::expr::{Expr, Parser, Token};
use crate::error::{EngineError, Result};

/// Stacking axis of a loop region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDirection {
    Down,
    Right,
}

/// Shared parameters of `loop-down`, `loop-right` and `loop-sheet`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSpec {
    pub var: String,
    pub items: Expr,
    /// Optional alias exposing the iteration state as `<name>_loop`.
    pub name: Option<String>,
    pub last_cell: Option<CellRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Group {
        last_cell: Option<CellRef>,
    },
    Loop {
        direction: LoopDirection,
        spec: LoopSpec,
    },
    SheetLoop {
        spec: LoopSpec,
    },
    If {
        condition: Expr,
        last_cell: Option<CellRef>,
        else_block: Option<CellRange>,
    },
    Remove {
        last_cell: Option<CellRef>,
    },
    Merge {
        rows: Option<Expr>,
        cols: Option<Expr>,
    },
    ColWidth(Expr),
    RowHeight(Expr),
    FuncArgAxis(Axis),
}

/// Parse one annotation line into a directive.
pub fn parse_directive(text: &str) -> Result<Directive> {
    let text = text.trim();
    let name_len = text
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
        .count();
    let (raw_name, rest) = text.split_at(name_len);
    let name = raw_name.to_ascii_lowercase().replace('-', "_");
    let rest = rest.trim_start();
    let tail = if rest.is_empty() {
        ""
    } else if let Some(tail) = rest.strip_prefix(',') {
        tail
    } else if let Some(tail) = rest.strip_prefix('=') {
        tail
    } else {
        return Err(EngineError::Parse {
            offset: name_len,
            message: format!("malformed directive '{}'", text),
        });
    };

    match name.as_str() {
        "group" => Ok(Directive::Group {
            last_cell: parse_extent_params(tail)?,
        }),
        "loop_down" => Ok(Directive::Loop {
            direction: LoopDirection::Down,
            spec: parse_loop_spec(tail)?,
        }),
        "loop_right" => Ok(Directive::Loop {
            direction: LoopDirection::Right,
            spec: parse_loop_spec(tail)?,
        }),
        "loop_sheet" => Ok(Directive::SheetLoop {
            spec: parse_loop_spec(tail)?,
        }),
        "if" => parse_if(tail),
        "remove" => Ok(Directive::Remove {
            last_cell: parse_extent_params(tail)?,
        }),
        "merge" => parse_merge(tail),
        "col_width" => Ok(Directive::ColWidth(parse_value_tail(tail)?)),
        "row_height" => Ok(Directive::RowHeight(parse_value_tail(tail)?)),
        "func_arg_v" => parse_axis(tail, Axis::Vertical),
        "func_arg_h" => parse_axis(tail, Axis::Horizontal),
        _ => Err(EngineError::Parse {
            offset: 0,
            message: format!("unknown directive '{}'", raw_name),
        }),
    }
}

fn expect_cell(parser: &mut Parser) -> Result<CellRef> {
    let name = parser.expect_ident()?;
    CellRef::parse(&name).ok_or_else(|| parser.error(format!("invalid cell reference '{}'", name)))
}

/// `last_cell=<cell>` as the only accepted parameter.
fn parse_extent_params(tail: &str) -> Result<Option<CellRef>> {
    if tail.trim().is_empty() {
        return Ok(None);
    }
    let mut parser = Parser::new(tail)?;
    let mut last_cell = None;
    while !parser.at_end() {
        let param = parser.expect_ident()?;
        parser.expect(Token::Eq)?;
        match param.as_str() {
            "last_cell" => last_cell = Some(expect_cell(&mut parser)?),
            _ => return Err(parser.error(format!("unknown parameter '{}'", param))),
        }
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(last_cell)
}

/// `for <var> in <items>` followed by optional `name=` / `last_cell=`.
fn parse_loop_spec(tail: &str) -> Result<LoopSpec> {
    let mut parser = Parser::new(tail)?;
    let keyword = parser.expect_ident()?;
    if keyword != "for" {
        return Err(parser.error("expected 'for'"));
    }
    let var = parser.expect_ident()?;
    let keyword = parser.expect_ident()?;
    if keyword != "in" {
        return Err(parser.error("expected 'in'"));
    }
    let items = parser.parse_expr()?;
    let mut name = None;
    let mut last_cell = None;
    while parser.eat(&Token::Comma) {
        let param = parser.expect_ident()?;
        parser.expect(Token::Eq)?;
        match param.as_str() {
            "name" => name = Some(parser.expect_ident()?),
            "last_cell" => last_cell = Some(expect_cell(&mut parser)?),
            _ => return Err(parser.error(format!("unknown loop parameter '{}'", param))),
        }
    }
    parser.expect_end()?;
    Ok(LoopSpec {
        var,
        items,
        name,
        last_cell,
    })
}

fn parse_if(tail: &str) -> Result<Directive> {
    let mut parser = Parser::new(tail)?;
    let mut condition = None;
    let mut last_cell = None;
    let mut else_block = None;
    loop {
        let param = parser.expect_ident()?;
        parser.expect(Token::Eq)?;
        match param.as_str() {
            "condition" => condition = Some(parser.parse_expr()?),
            "last_cell" => last_cell = Some(expect_cell(&mut parser)?),
            "else" => {
                let start = expect_cell(&mut parser)?;
                let end = if parser.eat(&Token::Colon) {
                    expect_cell(&mut parser)?
                } else {
                    start
                };
                else_block = Some(CellRange::new(start, end));
            }
            _ => return Err(parser.error(format!("unknown if parameter '{}'", param))),
        }
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    let condition = condition.ok_or_else(|| parser.error("if directive requires a condition"))?;
    Ok(Directive::If {
        condition,
        last_cell,
        else_block,
    })
}

fn parse_merge(tail: &str) -> Result<Directive> {
    if tail.trim().is_empty() {
        return Ok(Directive::Merge {
            rows: None,
            cols: None,
        });
    }
    let mut parser = Parser::new(tail)?;
    let mut rows = None;
    let mut cols = None;
    loop {
        let param = parser.expect_ident()?;
        parser.expect(Token::Eq)?;
        match param.as_str() {
            "rows" => rows = Some(parser.parse_expr()?),
            "cols" => cols = Some(parser.parse_expr()?),
            _ => return Err(parser.error(format!("unknown merge parameter '{}'", param))),
        }
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(Directive::Merge { rows, cols })
}

fn parse_value_tail(tail: &str) -> Result<Expr> {
    let mut parser = Parser::new(tail)?;
    let expr = parser.parse_filtered()?;
    parser.expect_end()?;
    Ok(expr)
}

fn parse_axis(tail: &str, axis: Axis) -> Result<Directive> {
    if !tail.trim().is_empty() {
        return Err(EngineError::Parse {
            offset: 0,
            message: "func-arg directives take no parameters".to_string(),
        });
    }
    Ok(Directive::FuncArgAxis(axis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::expr::parse_expression;

    #[test]
    fn test_parse_loop_down() {
        let directive = parse_directive("loop-down, for row in data.rows, last_cell=C3").unwrap();
        assert_eq!(
            directive,
            Directive::Loop {
                direction: LoopDirection::Down,
                spec: LoopSpec {
                    var: "row".to_string(),
                    items: parse_expression("data.rows").unwrap(),
                    name: None,
                    last_cell: Some(CellRef::new(2, 2)),
                },
            }
        );
    }

    #[test]
    fn test_parse_loop_with_alias() {
        let directive = parse_directive("LOOP_RIGHT, for v in vals, name=outer").unwrap();
        let Directive::Loop { direction, spec } = directive else {
            panic!("expected loop");
        };
        assert_eq!(direction, LoopDirection::Right);
        assert_eq!(spec.name.as_deref(), Some("outer"));
        assert_eq!(spec.last_cell, None);
    }

    #[test]
    fn test_parse_if_with_else_range() {
        let directive =
            parse_directive("if, condition=flag, last_cell=B2, else=D1:E2").unwrap();
        let Directive::If {
            condition,
            last_cell,
            else_block,
        } = directive
        else {
            panic!("expected if");
        };
        assert_eq!(condition, Expr::Var("flag".to_string()));
        assert_eq!(last_cell, Some(CellRef::new(1, 1)));
        assert_eq!(
            else_block,
            Some(CellRange::new(CellRef::new(0, 3), CellRef::new(1, 4)))
        );
    }

    #[test]
    fn test_parse_if_requires_condition() {
        assert!(parse_directive("if, last_cell=B2").is_err());
    }

    #[test]
    fn test_parse_col_width_value() {
        let directive = parse_directive("col-width=style.width | default_if_none(10)").unwrap();
        assert!(matches!(directive, Directive::ColWidth(Expr::Filter { .. })));
    }

    #[test]
    fn test_parse_merge() {
        let directive = parse_directive("merge, rows=2, cols=span").unwrap();
        let Directive::Merge { rows, cols } = directive else {
            panic!("expected merge");
        };
        assert!(rows.is_some());
        assert_eq!(cols, Some(Expr::Var("span".to_string())));
    }

    #[test]
    fn test_parse_unknown_directive() {
        assert!(parse_directive("explode").is_err());
        assert!(parse_directive("func-arg-v, last_cell=B2").is_err());
    }
}
