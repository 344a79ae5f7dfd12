//! Runtime cells produced by evaluation.
//!
//! [`Cell`] is a concrete value at a template-relative coordinate.
//! [`FuncCell`] is a formula cell whose reference tokens are resolved to
//! final coordinates during layout and spliced back into the formula text
//! once placement settles.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::engine::cell_ref::CellRef;

/// Axis restriction for a formula argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub style: Option<String>,
    pub value: Value,
    pub row_height: Option<f64>,
    pub col_width: Option<f64>,
}

impl Cell {
    pub fn new(
        row: usize,
        col: usize,
        style: Option<String>,
        value: Value,
        row_height: Option<f64>,
        col_width: Option<f64>,
    ) -> Cell {
        Cell {
            row,
            col,
            style,
            value,
            row_height,
            col_width,
        }
    }

    pub(crate) fn translate(&mut self, rows: isize, cols: isize) {
        self.row = (self.row as isize + rows) as usize;
        self.col = (self.col as isize + cols) as usize;
    }
}

/// A merged rectangle anchored at its top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Merge {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Merge {
        Merge {
            row,
            col,
            rows,
            cols,
        }
    }

    pub(crate) fn translate(&mut self, rows: isize, cols: isize) {
        self.row = (self.row as isize + rows) as usize;
        self.col = (self.col as isize + cols) as usize;
    }
}

/// One reference token inside a formula's text.
///
/// `cells` holds the referenced coordinates relative to the formula cell
/// itself, so entries can be negative. As layout resolves them they migrate
/// into `final_cells` as absolute coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncArg {
    pub start: usize,
    pub end: usize,
    pub cells: Vec<(isize, isize)>,
    pub axis: Option<Axis>,
    final_cells: Vec<(usize, usize)>,
}

impl FuncArg {
    pub fn new(start: usize, end: usize, cells: Vec<(isize, isize)>, axis: Option<Axis>) -> FuncArg {
        FuncArg {
            start,
            end,
            cells,
            axis,
            final_cells: Vec::new(),
        }
    }

    /// Record the final positions matched for one referenced coordinate,
    /// keeping only positions on the formula cell's own row or column when
    /// an axis restriction is set.
    fn finalize(
        &mut self,
        current_row: usize,
        current_col: usize,
        template_cell: (isize, isize),
        matched: &[(usize, usize)],
    ) {
        self.cells.retain(|cell| *cell != template_cell);
        match self.axis {
            Some(Axis::Horizontal) => self
                .final_cells
                .extend(matched.iter().copied().filter(|(row, _)| *row == current_row)),
            Some(Axis::Vertical) => self
                .final_cells
                .extend(matched.iter().copied().filter(|(_, col)| *col == current_col)),
            None => self.final_cells.extend_from_slice(matched),
        }
    }
}

/// A formula cell. `initial_value` is the full text including the leading
/// `=`; `args` are keyed by their byte span in that text.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncCell {
    pub row: usize,
    pub col: usize,
    pub style: Option<String>,
    pub initial_value: String,
    pub row_height: Option<f64>,
    pub col_width: Option<f64>,
    default_value: Value,
    args: BTreeMap<(usize, usize), FuncArg>,
    final_args: Vec<FuncArg>,
}

impl FuncCell {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        row: usize,
        col: usize,
        style: Option<String>,
        initial_value: String,
        row_height: Option<f64>,
        col_width: Option<f64>,
        args: Vec<FuncArg>,
        default_value: Option<Value>,
    ) -> FuncCell {
        FuncCell {
            row,
            col,
            style,
            initial_value,
            row_height,
            col_width,
            default_value: default_value.unwrap_or_else(|| Value::String(String::new())),
            args: args.into_iter().map(|arg| ((arg.start, arg.end), arg)).collect(),
            final_args: Vec::new(),
        }
    }

    pub(crate) fn translate(&mut self, rows: isize, cols: isize) {
        self.row = (self.row as isize + rows) as usize;
        self.col = (self.col as isize + cols) as usize;
        for arg in &mut self.final_args {
            for (row, col) in &mut arg.final_cells {
                *row = (*row as isize + rows) as usize;
                *col = (*col as isize + cols) as usize;
            }
        }
    }

    /// Pending references: each argument span paired with each coordinate it
    /// still waits on.
    pub(crate) fn pending_refs(&self) -> Vec<((usize, usize), (isize, isize))> {
        let mut out = Vec::new();
        for (span, arg) in &self.args {
            for cell in &arg.cells {
                out.push((*span, *cell));
            }
        }
        out
    }

    /// Resolve one pending reference against the positions placed at its
    /// target coordinate. An argument with nothing left pending is done.
    pub(crate) fn finalize_ref(
        &mut self,
        span: (usize, usize),
        template_cell: (isize, isize),
        matched: &[(usize, usize)],
    ) {
        let Some(arg) = self.args.get_mut(&span) else {
            return;
        };
        arg.finalize(self.row, self.col, template_cell, matched);
        if arg.cells.is_empty() {
            if let Some(done) = self.args.remove(&span) {
                self.final_args.push(done);
            }
        }
    }

    /// Render the finalized formula text.
    ///
    /// Each argument becomes a single range token when its positions tile a
    /// rectangle, otherwise a comma list. An argument with no surviving
    /// positions, or a formula with none finalized at all, yields the
    /// default value instead. Coordinates are 1-based here; the sheet
    /// framing shift has already been applied.
    pub fn final_value(&self) -> Value {
        if self.final_args.is_empty() {
            return self.default_value.clone();
        }
        let mut spans: Vec<(usize, usize, String)> = Vec::new();
        for arg in &self.final_args {
            let mut cells = arg.final_cells.clone();
            cells.sort_unstable();
            let (Some(first), Some(last)) = (cells.first().copied(), cells.last().copied()) else {
                return self.default_value.clone();
            };
            let area = (last.0 - first.0 + 1) * (last.1 - first.1 + 1);
            let token = if cells.len() > 1 && cells.len() == area {
                format!("{}:{}", ref_text(first), ref_text(last))
            } else {
                cells
                    .iter()
                    .map(|cell| ref_text(*cell))
                    .collect::<Vec<_>>()
                    .join(",")
            };
            spans.push((arg.start, arg.end, token));
        }
        spans.sort_by_key(|(start, _, _)| *start);
        let mut out = String::new();
        let mut prev = 0;
        for (start, end, token) in spans {
            out.push_str(&self.initial_value[prev..start]);
            out.push_str(&token);
            prev = end;
        }
        out.push_str(&self.initial_value[prev..]);
        Value::String(out)
    }
}

fn ref_text((row, col): (usize, usize)) -> String {
    debug_assert!(row >= 1 && col >= 1);
    format!("{}{}", CellRef::col_to_letters(col - 1), row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_value_rectangle_becomes_range() {
        let arg = FuncArg::new(5, 7, vec![(1, 1)], None);
        let mut cell = FuncCell::new(0, 0, None, "=SUM(B2)".to_string(), None, None, vec![arg], None);
        cell.finalize_ref((5, 7), (1, 1), &[(2, 2), (2, 3), (3, 2), (3, 3)]);
        assert_eq!(cell.final_value(), json!("=SUM(B2:C3)"));
    }

    #[test]
    fn test_final_value_sparse_becomes_list() {
        let arg = FuncArg::new(5, 7, vec![(1, 1)], None);
        let mut cell = FuncCell::new(0, 0, None, "=SUM(B2)".to_string(), None, None, vec![arg], None);
        cell.finalize_ref((5, 7), (1, 1), &[(2, 2), (4, 2)]);
        assert_eq!(cell.final_value(), json!("=SUM(B2,B4)"));
    }

    #[test]
    fn test_axis_filter_keeps_own_row() {
        let arg = FuncArg::new(5, 7, vec![(1, 0)], Some(Axis::Horizontal));
        let mut cell = FuncCell::new(2, 1, None, "=SUM(B2)".to_string(), None, None, vec![arg], None);
        cell.finalize_ref((5, 7), (1, 0), &[(2, 2), (5, 2), (2, 3)]);
        assert_eq!(cell.final_value(), json!("=SUM(B2:C2)"));
    }

    #[test]
    fn test_default_when_no_args_finalized() {
        let arg = FuncArg::new(5, 7, vec![(1, 1)], None);
        let cell = FuncCell::new(0, 0, None, "=SUM(B2)".to_string(), None, None, vec![arg], None);
        assert_eq!(cell.final_value(), json!(""));
    }

    #[test]
    fn test_default_when_arg_matched_nothing() {
        let arg = FuncArg::new(5, 7, vec![(1, 1)], None);
        let mut cell = FuncCell::new(
            0,
            0,
            None,
            "=SUM(B2)".to_string(),
            None,
            None,
            vec![arg],
            Some(json!(0)),
        );
        cell.finalize_ref((5, 7), (1, 1), &[]);
        assert_eq!(cell.final_value(), json!(0));
    }
}
