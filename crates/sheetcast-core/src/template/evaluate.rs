//! Template evaluation: instantiate a node tree against input data.
//!
//! Evaluation expands loops into one region per item, picks conditional
//! branches and computes every cell expression, producing the cell groups
//! the layout engine then collapses and places.

use sheetcast_engine::engine::{
    Cell, CellGroup, CellRef, ChildGroup, Context, Expr, FuncArg, FuncCell, LoopCellGroup,
    SheetGroup, Value, eval, is_truthy, loop_metadata, to_display,
};
use sheetcast_engine::EngineError;

use crate::error::{Breadcrumb, Result, TemplateError};
use crate::template::nodes::{
    CellNode, FormulaNode, MergeSpec, SheetBody, SheetLoopNode, SheetNode, TemplateNode,
};

/// One sheet's evaluated content, ready for layout.
pub(crate) struct EvaluatedSheet {
    pub(crate) name: String,
    pub(crate) group: SheetGroup,
}

pub(crate) fn evaluate_sheets(
    sheets: &[SheetNode],
    ctx: &mut Context,
) -> Result<Vec<EvaluatedSheet>> {
    let mut evaluator = Evaluator {
        hint: Breadcrumb::default(),
    };
    let mut out = Vec::new();
    for sheet in sheets {
        match sheet {
            SheetNode::Sheet(body) => out.push(evaluator.evaluate_sheet(body, ctx)?),
            SheetNode::Loop(node) => evaluator.evaluate_sheet_loop(node, ctx, &mut out)?,
        }
    }
    Ok(out)
}

struct Evaluator {
    hint: Breadcrumb,
}

impl Evaluator {
    fn runtime_err(&self, source: EngineError) -> TemplateError {
        TemplateError::Runtime {
            breadcrumb: self.hint.clone(),
            source,
        }
    }

    fn eval_expr(&self, expr: &Expr, ctx: &Context) -> Result<Value> {
        eval(expr, ctx).map_err(|err| self.runtime_err(err))
    }

    /// Items of a loop must evaluate to an array.
    fn eval_items(&self, expr: &Expr, ctx: &Context) -> Result<Vec<Value>> {
        match self.eval_expr(expr, ctx)? {
            Value::Array(items) => Ok(items),
            other => Err(self.runtime_err(EngineError::Type(format!(
                "can not iterate over {}",
                other
            )))),
        }
    }

    fn evaluate_sheet_loop(
        &mut self,
        node: &SheetLoopNode,
        ctx: &mut Context,
        out: &mut Vec<EvaluatedSheet>,
    ) -> Result<()> {
        let items = self.eval_items(&node.items, ctx)?;
        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            ctx.push_scope();
            ctx.bind(&node.var, item);
            ctx.bind("loop", loop_metadata(index, length));
            if let Some(alias) = &node.alias {
                ctx.bind(&format!("{}_loop", alias), loop_metadata(index, length));
            }
            let result = self.evaluate_sheet(&node.sheet, ctx);
            ctx.pop_scope();
            out.push(result?);
        }
        Ok(())
    }

    fn evaluate_sheet(&mut self, sheet: &SheetBody, ctx: &mut Context) -> Result<EvaluatedSheet> {
        self.hint.push("sheet name");
        let name = to_display(&self.eval_expr(&sheet.name, ctx)?);
        self.hint.pop();
        self.hint.push(format!("sheet:{}", name));
        let mut group = CellGroup::new(sheet.size);
        let result = self.evaluate_body(&sheet.body, ctx, &mut group);
        self.hint.pop();
        result?;
        Ok(EvaluatedSheet {
            name,
            group: SheetGroup::new(group),
        })
    }

    fn evaluate_body(
        &mut self,
        body: &[TemplateNode],
        ctx: &mut Context,
        group: &mut CellGroup,
    ) -> Result<()> {
        for node in body {
            match node {
                TemplateNode::Cell(cell) => self.evaluate_cell(cell, ctx, group)?,
                TemplateNode::Formula(formula) => self.evaluate_formula(formula, ctx, group)?,
                TemplateNode::Group(inner) => {
                    let mut child = CellGroup::new(inner.size);
                    self.evaluate_body(&inner.body, ctx, &mut child)?;
                    group.add_group(inner.row, inner.col, ChildGroup::Group(child));
                }
                TemplateNode::Delete(delete) => {
                    // An empty group of the original extent; its rows and
                    // columns collapse away.
                    group.add_group(
                        delete.row,
                        delete.col,
                        ChildGroup::Group(CellGroup::new(delete.size)),
                    );
                }
                TemplateNode::Cond(cond) => {
                    let mut child = CellGroup::new(cond.size);
                    let condition = self.eval_expr(&cond.condition, ctx)?;
                    if is_truthy(&condition) {
                        self.evaluate_body(&cond.body, ctx, &mut child)?;
                    } else if let Some(else_body) = &cond.else_body {
                        self.evaluate_body(else_body, ctx, &mut child)?;
                    }
                    group.add_group(cond.row, cond.col, ChildGroup::Group(child));
                }
                TemplateNode::Loop(node) => {
                    let items = self.eval_items(&node.items, ctx)?;
                    let length = items.len();
                    let mut loop_group = LoopCellGroup::new(node.size, node.direction);
                    for (index, item) in items.into_iter().enumerate() {
                        ctx.push_scope();
                        ctx.bind(&node.var, item);
                        ctx.bind("loop", loop_metadata(index, length));
                        if let Some(alias) = &node.alias {
                            ctx.bind(&format!("{}_loop", alias), loop_metadata(index, length));
                        }
                        let mut iteration = CellGroup::new(node.size);
                        let result = self.evaluate_body(&node.body, ctx, &mut iteration);
                        ctx.pop_scope();
                        result?;
                        loop_group.add_group(iteration);
                    }
                    group.add_group(node.row, node.col, ChildGroup::Loop(loop_group));
                }
                TemplateNode::SheetLoop(_) => {
                    return Err(TemplateError::LayoutInvariant(
                        "sheet loop nested inside a region".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn evaluate_cell(
        &mut self,
        cell: &CellNode,
        ctx: &Context,
        group: &mut CellGroup,
    ) -> Result<()> {
        self.hint
            .push(format!("cell:{}", CellRef::new(cell.row, cell.col)));
        let value = match &cell.value {
            Some(expr) => self.eval_expr(expr, ctx)?,
            None => Value::Null,
        };
        let row_height = self.eval_dimension(cell.row_height.as_ref(), ctx)?;
        let col_width = self.eval_dimension(cell.col_width.as_ref(), ctx)?;
        group.add_cell(Cell::new(
            cell.row,
            cell.col,
            cell.style.clone(),
            value,
            row_height,
            col_width,
        ));
        self.add_merge(cell.row, cell.col, cell.merge.as_ref(), ctx, group)?;
        self.hint.pop();
        Ok(())
    }

    fn evaluate_formula(
        &mut self,
        formula: &FormulaNode,
        ctx: &Context,
        group: &mut CellGroup,
    ) -> Result<()> {
        self.hint
            .push(format!("cell:{}", CellRef::new(formula.row, formula.col)));
        let row_height = self.eval_dimension(formula.row_height.as_ref(), ctx)?;
        let col_width = self.eval_dimension(formula.col_width.as_ref(), ctx)?;
        let args = formula
            .args
            .iter()
            .map(|arg| FuncArg::new(arg.start, arg.end, arg.cells.clone(), arg.axis))
            .collect();
        group.add_func_cell(FuncCell::new(
            formula.row,
            formula.col,
            formula.style.clone(),
            formula.text.clone(),
            row_height,
            col_width,
            args,
            None,
        ));
        self.add_merge(formula.row, formula.col, formula.merge.as_ref(), ctx, group)?;
        self.hint.pop();
        Ok(())
    }

    fn add_merge(
        &self,
        row: usize,
        col: usize,
        merge: Option<&MergeSpec>,
        ctx: &Context,
        group: &mut CellGroup,
    ) -> Result<()> {
        let Some(merge) = merge else {
            return Ok(());
        };
        let rows = self.eval_count(merge.rows.as_ref(), ctx)?;
        let cols = self.eval_count(merge.cols.as_ref(), ctx)?;
        group.add_merge(row, col, rows, cols);
        Ok(())
    }

    /// A merge extent; defaults to one when not given.
    fn eval_count(&self, expr: Option<&Expr>, ctx: &Context) -> Result<usize> {
        let Some(expr) = expr else {
            return Ok(1);
        };
        let value = self.eval_expr(expr, ctx)?;
        value.as_u64().map(|count| count as usize).ok_or_else(|| {
            self.runtime_err(EngineError::Type(format!(
                "merge extent must be a non-negative integer, got {}",
                value
            )))
        })
    }

    /// A row height or column width; null means not set.
    fn eval_dimension(&self, expr: Option<&Expr>, ctx: &Context) -> Result<Option<f64>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.eval_expr(expr, ctx)? {
            Value::Null => Ok(None),
            value => value.as_f64().map(Some).ok_or_else(|| {
                self.runtime_err(EngineError::Type(format!(
                    "dimension must be a number, got {}",
                    value
                )))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::nodes::{DeleteNode, LoopNode};
    use serde_json::json;
    use sheetcast_engine::engine::{Environment, LoopDirection, Size};

    fn const_str(text: &str) -> Expr {
        Expr::Const(Value::String(text.to_string()))
    }

    fn cell_node(row: usize, col: usize, value: Expr) -> TemplateNode {
        TemplateNode::Cell(CellNode {
            row,
            col,
            value: Some(value),
            style: None,
            row_height: None,
            col_width: None,
            merge: None,
        })
    }

    fn sheet(body: Vec<TemplateNode>, size: Size) -> Vec<SheetNode> {
        vec![SheetNode::Sheet(SheetBody {
            name: const_str("out"),
            size,
            body,
        })]
    }

    #[test]
    fn test_loop_expands_per_item() {
        let env = Environment::new();
        let data = json!({ "names": ["ada", "grace"] });
        let mut ctx = Context::new(&env, &data);
        let body = vec![TemplateNode::Loop(LoopNode {
            row: 0,
            col: 0,
            size: Size::new(1, 1),
            var: "n".to_string(),
            items: Expr::Var("names".to_string()),
            alias: None,
            direction: LoopDirection::Down,
            body: vec![cell_node(0, 0, Expr::Var("n".to_string()))],
        })];
        let sheets = evaluate_sheets(&sheet(body, Size::new(1, 1)), &mut ctx).unwrap();
        assert_eq!(sheets.len(), 1);
        // The finalized sheet carries the one-cell framing shift.
        let result = sheets.into_iter().next().unwrap().group.into_final();
        assert_eq!(result.size, Size::new(3, 2));
        assert_eq!(result.grid()[1][1], json!("ada"));
        assert_eq!(result.grid()[2][1], json!("grace"));
    }

    #[test]
    fn test_loop_metadata_binding() {
        let env = Environment::new();
        let data = json!({ "items": [10, 20] });
        let mut ctx = Context::new(&env, &data);
        let body = vec![TemplateNode::Loop(LoopNode {
            row: 0,
            col: 0,
            size: Size::new(1, 1),
            var: "x".to_string(),
            items: Expr::Var("items".to_string()),
            alias: None,
            direction: LoopDirection::Down,
            body: vec![cell_node(
                0,
                0,
                Expr::GetAttr {
                    obj: Box::new(Expr::Var("loop".to_string())),
                    name: "index".to_string(),
                },
            )],
        })];
        let sheets = evaluate_sheets(&sheet(body, Size::new(1, 1)), &mut ctx).unwrap();
        let result = sheets.into_iter().next().unwrap().group.into_final();
        assert_eq!(result.grid()[1][1], json!(1));
        assert_eq!(result.grid()[2][1], json!(2));
    }

    #[test]
    fn test_cond_false_without_else_collapses() {
        let env = Environment::new();
        let data = json!({ "show": false });
        let mut ctx = Context::new(&env, &data);
        let body = vec![
            TemplateNode::Cond(crate::template::nodes::CondNode {
                row: 0,
                col: 0,
                size: Size::new(1, 1),
                condition: Expr::Var("show".to_string()),
                body: vec![cell_node(0, 0, const_str("hidden"))],
                else_body: None,
            }),
            cell_node(1, 0, const_str("kept")),
        ];
        let sheets = evaluate_sheets(&sheet(body, Size::new(2, 1)), &mut ctx).unwrap();
        let result = sheets.into_iter().next().unwrap().group.into_final();
        assert_eq!(result.size, Size::new(2, 2));
        assert_eq!(result.grid()[1][1], json!("kept"));
    }

    #[test]
    fn test_delete_collapses_extent() {
        let env = Environment::new();
        let data = json!({});
        let mut ctx = Context::new(&env, &data);
        let body = vec![
            TemplateNode::Delete(DeleteNode {
                row: 0,
                col: 0,
                size: Size::new(1, 1),
            }),
            cell_node(1, 0, const_str("kept")),
        ];
        let sheets = evaluate_sheets(&sheet(body, Size::new(2, 1)), &mut ctx).unwrap();
        let result = sheets.into_iter().next().unwrap().group.into_final();
        assert_eq!(result.size, Size::new(2, 2));
        assert_eq!(result.grid()[1][1], json!("kept"));
    }

    #[test]
    fn test_sheet_loop_names_each_sheet() {
        let env = Environment::new();
        let data = json!({ "depts": [{ "name": "north" }, { "name": "south" }] });
        let mut ctx = Context::new(&env, &data);
        let name = Expr::ToStr(Box::new(Expr::GetAttr {
            obj: Box::new(Expr::Var("d".to_string())),
            name: "name".to_string(),
        }));
        let sheets = vec![SheetNode::Loop(SheetLoopNode {
            var: "d".to_string(),
            items: Expr::Var("depts".to_string()),
            alias: None,
            sheet: SheetBody {
                name,
                size: Size::new(1, 1),
                body: vec![cell_node(
                    0,
                    0,
                    Expr::GetAttr {
                        obj: Box::new(Expr::Var("d".to_string())),
                        name: "name".to_string(),
                    },
                )],
            },
        })];
        let evaluated = evaluate_sheets(&sheets, &mut ctx).unwrap();
        let names: Vec<_> = evaluated.iter().map(|sheet| sheet.name.clone()).collect();
        assert_eq!(names, vec!["north", "south"]);
    }

    #[test]
    fn test_loop_over_non_array_is_runtime_error() {
        let env = Environment::new();
        let data = json!({ "items": 5 });
        let mut ctx = Context::new(&env, &data);
        let body = vec![TemplateNode::Loop(LoopNode {
            row: 0,
            col: 0,
            size: Size::new(1, 1),
            var: "x".to_string(),
            items: Expr::Var("items".to_string()),
            alias: None,
            direction: LoopDirection::Down,
            body: vec![],
        })];
        assert!(matches!(
            evaluate_sheets(&sheet(body, Size::new(1, 1)), &mut ctx),
            Err(TemplateError::Runtime { .. })
        ));
    }
}
