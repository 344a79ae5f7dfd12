//! Template assembly: scan a source document into a template node tree.
//!
//! Assembly walks each sheet's used extent in row-major order, consuming
//! annotation directives one at a time. A region directive claims its
//! rectangle and recurses, so further directives on the same cell are
//! picked up by the recursive pass. Consumed cells leave the pending maps,
//! which is what lets removed or branched content disappear from the
//! enclosing region.

use std::collections::BTreeMap;

use sheetcast_engine::engine::{
    Axis, CellRef, Directive, Expr, Size, Value, parse_directive, parse_expression,
    scan_formula_refs,
};

use crate::document::{DocumentReader, SheetReader};
use crate::error::{Breadcrumb, Result, TemplateError};
use crate::template::nodes::{
    ArgSpec, CellNode, CondNode, DeleteNode, FormulaNode, GroupNode, LoopNode, MergeSpec,
    SheetBody, SheetLoopNode, SheetNode, TemplateNode,
};

pub(crate) fn assemble(reader: &dyn DocumentReader) -> Result<Vec<SheetNode>> {
    reader
        .sheets()
        .into_iter()
        .map(|sheet| SheetAssembler::new(sheet).assemble())
        .collect()
}

/// A cell parsed from the grid, still at absolute sheet coordinates.
/// Formula argument coordinates are absolute too until the cell is consumed
/// into a region body.
enum PendingCell {
    Cell(CellNode),
    Formula(FormulaNode),
}

impl PendingCell {
    fn set_merge(&mut self, merge: MergeSpec) {
        match self {
            PendingCell::Cell(cell) => cell.merge = Some(merge),
            PendingCell::Formula(cell) => cell.merge = Some(merge),
        }
    }

    fn set_row_height(&mut self, value: Expr) {
        match self {
            PendingCell::Cell(cell) => cell.row_height = Some(value),
            PendingCell::Formula(cell) => cell.row_height = Some(value),
        }
    }

    fn set_col_width(&mut self, value: Expr) {
        match self {
            PendingCell::Cell(cell) => cell.col_width = Some(value),
            PendingCell::Formula(cell) => cell.col_width = Some(value),
        }
    }

    /// Re-anchor to a region starting at `(start_row, start_col)`. Formula
    /// references become relative to the formula cell itself.
    fn into_node(self, start_row: usize, start_col: usize) -> TemplateNode {
        match self {
            PendingCell::Cell(mut cell) => {
                cell.row -= start_row;
                cell.col -= start_col;
                TemplateNode::Cell(cell)
            }
            PendingCell::Formula(mut cell) => {
                for arg in &mut cell.args {
                    for (row, col) in &mut arg.cells {
                        *row -= cell.row as isize;
                        *col -= cell.col as isize;
                    }
                }
                cell.row -= start_row;
                cell.col -= start_col;
                TemplateNode::Formula(cell)
            }
        }
    }
}

/// A processed region's absolute extent, plus the body-index path to reach
/// its node in the finished tree. Used to place else-branch removals.
struct RegionRecord {
    base: (usize, usize),
    height: usize,
    width: usize,
    path: Vec<usize>,
}

struct SheetAssembler<'a> {
    sheet: &'a dyn SheetReader,
    hint: Breadcrumb,
    cells: BTreeMap<(usize, usize), PendingCell>,
    directives: BTreeMap<(usize, usize), Vec<Directive>>,
    regions: Vec<RegionRecord>,
    post_remove: Vec<(CellRef, CellRef)>,
    path: Vec<usize>,
    else_depth: usize,
}

impl<'a> SheetAssembler<'a> {
    fn new(sheet: &'a dyn SheetReader) -> SheetAssembler<'a> {
        SheetAssembler {
            sheet,
            hint: Breadcrumb::default(),
            cells: BTreeMap::new(),
            directives: BTreeMap::new(),
            regions: Vec::new(),
            post_remove: Vec::new(),
            path: Vec::new(),
            else_depth: 0,
        }
    }

    fn grammar_err(&self, source: sheetcast_engine::EngineError) -> TemplateError {
        TemplateError::Grammar {
            breadcrumb: self.hint.clone(),
            source,
        }
    }

    fn spatial_err(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Spatial {
            breadcrumb: self.hint.clone(),
            message: message.into(),
        }
    }

    fn assemble(mut self) -> Result<SheetNode> {
        self.hint.push(format!("sheet:{}", self.sheet.name()));
        let rows = self.sheet.rows();
        let cols = self.sheet.cols();

        self.scan_cells()?;
        self.collect_directives()?;

        let mut body = if rows == 0 || cols == 0 {
            Vec::new()
        } else {
            self.process_region(0, 0, rows - 1, cols - 1)?
        };

        let sheet_name = self.sheet.name().to_string();
        self.hint.push("sheet name");
        let name = Expr::ToStr(Box::new(self.parse_value(&sheet_name)?));
        self.hint.pop();

        let mut sheet = if matches!(body.first(), Some(TemplateNode::SheetLoop(_))) {
            let Some(TemplateNode::SheetLoop(node)) = body.into_iter().next() else {
                unreachable!()
            };
            let mut node = *node;
            node.sheet.name = name;
            SheetNode::Loop(node)
        } else {
            SheetNode::Sheet(SheetBody {
                name,
                size: Size::new(rows, cols),
                body,
            })
        };

        self.apply_post_remove(&mut sheet)?;
        self.hint.pop();
        Ok(sheet)
    }

    /// Parse every cell of the extent into a pending cell. Empty cells
    /// still produce nodes so their rows and columns stay pinned.
    fn scan_cells(&mut self) -> Result<()> {
        let mut merged: BTreeMap<(usize, usize), (usize, usize)> = BTreeMap::new();
        for range in self.sheet.merged_ranges() {
            merged.insert((range.row, range.col), (range.rows, range.cols));
        }

        for row in 0..self.sheet.rows() {
            for col in 0..self.sheet.cols() {
                self.hint.push(format!("cell:{}", CellRef::new(row, col)));
                let style = self.sheet.style(row, col);
                let row_height = self
                    .sheet
                    .row_height(row)
                    .map(|height| Expr::Const(Value::from(height)));
                let col_width = self
                    .sheet
                    .col_width(col)
                    .map(|width| Expr::Const(Value::from(width)));
                let merge = merged.get(&(row, col)).map(|(rows, cols)| MergeSpec {
                    rows: Some(Expr::Const(Value::from(*rows))),
                    cols: Some(Expr::Const(Value::from(*cols))),
                });

                let pending = match self.sheet.value(row, col) {
                    Some(Value::String(text)) if text.starts_with('=') => {
                        let args = scan_formula_refs(&text)
                            .into_iter()
                            .map(|(span, cells)| ArgSpec {
                                start: span.start,
                                end: span.end,
                                cells: cells
                                    .into_iter()
                                    .map(|cell| (cell.row as isize, cell.col as isize))
                                    .collect(),
                                axis: None,
                            })
                            .collect();
                        PendingCell::Formula(FormulaNode {
                            row,
                            col,
                            text,
                            style,
                            row_height,
                            col_width,
                            merge,
                            args,
                        })
                    }
                    value => {
                        let value = match value {
                            Some(Value::String(text)) => Some(self.parse_value(&text)?),
                            Some(other) => Some(Expr::Const(other)),
                            None => None,
                        };
                        PendingCell::Cell(CellNode {
                            row,
                            col,
                            value,
                            style,
                            row_height,
                            col_width,
                            merge,
                        })
                    }
                };
                self.cells.insert((row, col), pending);
                self.hint.pop();
            }
        }
        Ok(())
    }

    /// Split cell text into literal runs and `{{ }}` placeholder
    /// expressions. An unterminated placeholder is kept as literal text.
    fn parse_value(&mut self, text: &str) -> Result<Expr> {
        if !text.contains("{{") {
            return Ok(Expr::Const(Value::String(text.to_string())));
        }
        let mut body = Vec::new();
        let mut index = 0;
        while index < text.len() {
            match text[index..].find("{{") {
                Some(0) => match text[index..].find("}}") {
                    Some(close) => {
                        let inner = &text[index + 2..index + close];
                        self.hint
                            .push(format!("index:{}-{}", index + 2, index + close));
                        let expr =
                            parse_expression(inner).map_err(|err| self.grammar_err(err))?;
                        self.hint.pop();
                        body.push(expr);
                        index += close + 2;
                    }
                    None => {
                        body.push(Expr::Const(Value::String(text[index..].to_string())));
                        index = text.len();
                    }
                },
                Some(next) => {
                    body.push(Expr::Const(Value::String(
                        text[index..index + next].to_string(),
                    )));
                    index += next;
                }
                None => {
                    body.push(Expr::Const(Value::String(text[index..].to_string())));
                    index = text.len();
                }
            }
        }
        if body.len() == 1 {
            return Ok(body.remove(0));
        }
        let body = body
            .into_iter()
            .map(|expr| match expr {
                Expr::Const(_) | Expr::StrConst(_) => expr,
                other => Expr::ToStr(Box::new(other)),
            })
            .collect();
        Ok(Expr::Concat(body))
    }

    /// Gather annotation lines into parsed directives per cell. A leading
    /// `synt-v2` line switches the whole annotation to block form, where
    /// each cell-reference line introduces the directives that follow it
    /// until a `===` separator.
    fn collect_directives(&mut self) -> Result<()> {
        let mut raw: BTreeMap<(usize, usize), Vec<String>> = BTreeMap::new();
        for row in 0..self.sheet.rows() {
            for col in 0..self.sheet.cols() {
                let Some(text) = self.sheet.annotation(row, col) else {
                    continue;
                };
                let lines: Vec<&str> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect();
                let Some(first) = lines.first() else { continue };
                if first.eq_ignore_ascii_case("synt-v2") {
                    self.hint.push(format!("cell:{}", CellRef::new(row, col)));
                    let block = self.parse_synt_v2(&lines[1..])?;
                    self.hint.pop();
                    for (cell, line) in block {
                        raw.entry((cell.row, cell.col)).or_default().push(line);
                    }
                } else {
                    raw.entry((row, col))
                        .or_default()
                        .extend(lines.into_iter().map(str::to_string));
                }
            }
        }

        for ((row, col), lines) in raw {
            self.hint.push(format!("cell:{}", CellRef::new(row, col)));
            let mut parsed = Vec::new();
            for (index, line) in lines.iter().enumerate() {
                self.hint.push(format!("directive_index:{}", index));
                parsed.push(parse_directive(line).map_err(|err| self.grammar_err(err))?);
                self.hint.pop();
            }
            self.hint.pop();
            self.directives.insert((row, col), parsed);
        }
        Ok(())
    }

    fn parse_synt_v2(&self, lines: &[&str]) -> Result<Vec<(CellRef, String)>> {
        let mut out = Vec::new();
        let mut current: Option<CellRef> = None;
        for line in lines {
            match current {
                None => {
                    let cell = CellRef::parse(line).ok_or_else(|| {
                        self.spatial_err(format!("invalid cell reference '{}'", line))
                    })?;
                    current = Some(cell);
                }
                Some(cell) => {
                    if line.bytes().all(|b| b == b'=') {
                        current = None;
                    } else {
                        out.push((cell, line.to_string()));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Process one rectangular region (inclusive bounds, absolute
    /// coordinates) into a body of region-relative nodes.
    fn process_region(
        &mut self,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    ) -> Result<Vec<TemplateNode>> {
        let mut body = Vec::new();
        for row in start_row..=end_row {
            for col in start_col..=end_col {
                if let Some(directive) = self.pop_directive(row, col) {
                    self.hint.push(format!("cell:{}", CellRef::new(row, col)));
                    let node = self.apply_directive(
                        row,
                        col,
                        directive,
                        (start_row, start_col),
                        (end_row, end_col),
                        body.len(),
                    )?;
                    self.hint.pop();
                    if let Some(node) = node {
                        body.push(node);
                    }
                }
                if let Some(cell) = self.cells.remove(&(row, col)) {
                    body.push(cell.into_node(start_row, start_col));
                }
            }
        }
        Ok(body)
    }

    fn pop_directive(&mut self, row: usize, col: usize) -> Option<Directive> {
        let pending = self.directives.get_mut(&(row, col))?;
        let directive = pending.remove(0);
        if pending.is_empty() {
            self.directives.remove(&(row, col));
        }
        Some(directive)
    }

    fn apply_directive(
        &mut self,
        row: usize,
        col: usize,
        directive: Directive,
        start: (usize, usize),
        end: (usize, usize),
        next_index: usize,
    ) -> Result<Option<TemplateNode>> {
        match directive {
            Directive::Merge { rows, cols } => match self.cells.get_mut(&(row, col)) {
                Some(cell) => {
                    cell.set_merge(MergeSpec { rows, cols });
                    Ok(None)
                }
                None => Err(self.spatial_err("merge directive on a consumed cell")),
            },
            Directive::RowHeight(value) => match self.cells.get_mut(&(row, col)) {
                Some(cell) => {
                    cell.set_row_height(value);
                    Ok(None)
                }
                None => Err(self.spatial_err("row-height directive on a consumed cell")),
            },
            Directive::ColWidth(value) => match self.cells.get_mut(&(row, col)) {
                Some(cell) => {
                    cell.set_col_width(value);
                    Ok(None)
                }
                None => Err(self.spatial_err("col-width directive on a consumed cell")),
            },
            Directive::FuncArgAxis(axis) => {
                self.apply_func_arg_axis(row, col, axis)?;
                Ok(None)
            }
            Directive::Remove { last_cell } => {
                let last = last_cell.unwrap_or(CellRef::new(row, col));
                self.check_extent(row, col, last)?;
                for del_row in row..=last.row {
                    for del_col in col..=last.col {
                        self.directives.remove(&(del_row, del_col));
                        self.cells.remove(&(del_row, del_col));
                    }
                }
                Ok(Some(TemplateNode::Delete(DeleteNode {
                    row: row - start.0,
                    col: col - start.1,
                    size: extent_size(row, col, last),
                })))
            }
            Directive::Group { last_cell } => {
                let last = last_cell.unwrap_or(CellRef::new(row, col));
                self.check_extent(row, col, last)?;
                let body = self.process_recorded(row, col, last, next_index)?;
                Ok(Some(TemplateNode::Group(GroupNode {
                    row: row - start.0,
                    col: col - start.1,
                    size: extent_size(row, col, last),
                    body,
                })))
            }
            Directive::Loop { direction, spec } => {
                let last = spec.last_cell.unwrap_or(CellRef::new(row, col));
                self.check_extent(row, col, last)?;
                let body = self.process_recorded(row, col, last, next_index)?;
                Ok(Some(TemplateNode::Loop(LoopNode {
                    row: row - start.0,
                    col: col - start.1,
                    size: extent_size(row, col, last),
                    var: spec.var,
                    items: spec.items,
                    alias: spec.name,
                    direction,
                    body,
                })))
            }
            Directive::If {
                condition,
                last_cell,
                else_block,
            } => {
                let last = last_cell.unwrap_or(CellRef::new(row, col));
                self.check_extent(row, col, last)?;
                let body = self.process_recorded(row, col, last, next_index)?;
                let else_body = match else_block {
                    Some(range) => {
                        self.else_depth += 1;
                        let result = self.process_region(
                            range.start.row,
                            range.start.col,
                            range.end.row,
                            range.end.col,
                        );
                        self.else_depth -= 1;
                        self.post_remove.push((range.start, range.end));
                        Some(result?)
                    }
                    None => None,
                };
                Ok(Some(TemplateNode::Cond(CondNode {
                    row: row - start.0,
                    col: col - start.1,
                    size: extent_size(row, col, last),
                    condition,
                    body,
                    else_body,
                })))
            }
            Directive::SheetLoop { spec } => {
                // A sheet loop always claims the whole enclosing region.
                let body = self.process_region(row, col, end.0, end.1)?;
                if self.else_depth == 0 {
                    self.regions.push(RegionRecord {
                        base: (row, col),
                        height: end.0 - row + 1,
                        width: end.1 - col + 1,
                        path: self.path.clone(),
                    });
                }
                Ok(Some(TemplateNode::SheetLoop(Box::new(SheetLoopNode {
                    var: spec.var,
                    items: spec.items,
                    alias: spec.name,
                    sheet: SheetBody {
                        // Placeholder; the caller fills in the sheet name.
                        name: Expr::Const(Value::Null),
                        size: Size::new(end.0 + 1, end.1 + 1),
                        body,
                    },
                }))))
            }
        }
    }

    /// Process a region's body and record its extent for else-branch
    /// removal targeting. Extents inside else branches are not recorded;
    /// they are not part of the primary tree.
    fn process_recorded(
        &mut self,
        row: usize,
        col: usize,
        last: CellRef,
        next_index: usize,
    ) -> Result<Vec<TemplateNode>> {
        self.path.push(next_index);
        let body = self.process_region(row, col, last.row, last.col);
        let path = self.path.clone();
        self.path.pop();
        let body = body?;
        if self.else_depth == 0 {
            let size = extent_size(row, col, last);
            self.regions.push(RegionRecord {
                base: (row, col),
                height: size.height,
                width: size.width,
                path,
            });
        }
        Ok(body)
    }

    fn apply_func_arg_axis(&mut self, row: usize, col: usize, axis: Axis) -> Result<()> {
        match self.cells.get_mut(&(row, col)) {
            Some(PendingCell::Formula(formula)) => {
                for arg in &mut formula.args {
                    arg.axis = Some(axis);
                }
            }
            _ => {
                return Err(self.spatial_err("func-arg directive requires a formula cell"));
            }
        }
        if self.directives.contains_key(&(row, col)) {
            return Err(self.spatial_err("func-arg directive must be the last on its cell"));
        }
        Ok(())
    }

    fn check_extent(&self, row: usize, col: usize, last: CellRef) -> Result<()> {
        if last.row < row || last.col < col {
            return Err(self.spatial_err(format!(
                "last_cell {} lies before the directive cell {}",
                last,
                CellRef::new(row, col)
            )));
        }
        if last.row >= self.sheet.rows() || last.col >= self.sheet.cols() {
            return Err(self.spatial_err(format!(
                "last_cell {} lies outside the sheet extent",
                last
            )));
        }
        Ok(())
    }

    /// Attach a removal node for each consumed else extent to the last
    /// recorded region containing it, falling back to the sheet root. The
    /// containment check is lenient by one row and column, so an extent
    /// directly adjacent to a region still counts as inside it.
    fn apply_post_remove(&mut self, sheet: &mut SheetNode) -> Result<()> {
        if self.post_remove.is_empty() {
            return Ok(());
        }
        let root_body = match sheet {
            SheetNode::Sheet(body) => &mut body.body,
            SheetNode::Loop(node) => &mut node.sheet.body,
        };
        let post_remove = std::mem::take(&mut self.post_remove);
        for (start, end) in post_remove {
            let mut target: Option<&RegionRecord> = None;
            for record in &self.regions {
                if start.row >= record.base.0
                    && start.col >= record.base.1
                    && end.row <= record.base.0 + record.height
                    && end.col <= record.base.1 + record.width
                {
                    target = Some(record);
                }
            }
            let (base, path) = match target {
                Some(record) => (record.base, record.path.as_slice()),
                None => ((0, 0), &[] as &[usize]),
            };
            let body = body_at(root_body, path).ok_or_else(|| TemplateError::Spatial {
                breadcrumb: self.hint.clone(),
                message: format!("can not place removal of else extent {}:{}", start, end),
            })?;
            body.push(TemplateNode::Delete(DeleteNode {
                row: start.row - base.0,
                col: start.col - base.1,
                size: extent_size(start.row, start.col, end),
            }));
        }
        Ok(())
    }
}

fn extent_size(row: usize, col: usize, last: CellRef) -> Size {
    Size::new(last.row - row + 1, last.col - col + 1)
}

/// Navigate a body by child indices, descending into region bodies.
fn body_at<'t>(body: &'t mut Vec<TemplateNode>, path: &[usize]) -> Option<&'t mut Vec<TemplateNode>> {
    let Some((&index, rest)) = path.split_first() else {
        return Some(body);
    };
    match body.get_mut(index)? {
        TemplateNode::Group(group) => body_at(&mut group.body, rest),
        TemplateNode::Loop(node) => body_at(&mut node.body, rest),
        TemplateNode::Cond(node) => body_at(&mut node.body, rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MemoryDocument, MemorySheet};
    use sheetcast_engine::engine::LoopDirection;

    fn assemble_one(sheet: MemorySheet) -> SheetNode {
        let mut doc = MemoryDocument::new();
        doc.add_sheet(sheet);
        assemble(&doc).unwrap().into_iter().next().unwrap()
    }

    #[test]
    fn test_plain_cells_and_placeholders() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "Title");
        sheet.set_value(0, 1, "{{ a }} and {{ b }}");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        assert_eq!(body.size, Size::new(1, 2));
        let TemplateNode::Cell(cell) = &body.body[0] else {
            panic!("expected cell");
        };
        assert_eq!(
            cell.value,
            Some(Expr::Const(Value::String("Title".to_string())))
        );
        let TemplateNode::Cell(cell) = &body.body[1] else {
            panic!("expected cell");
        };
        let Some(Expr::Concat(parts)) = &cell.value else {
            panic!("expected concat");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[0], Expr::ToStr(_)));
        assert_eq!(parts[1], Expr::Const(Value::String(" and ".to_string())));
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "x {{ broken");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        let TemplateNode::Cell(cell) = &body.body[0] else {
            panic!("expected cell");
        };
        let Some(Expr::Concat(parts)) = &cell.value else {
            panic!("expected concat");
        };
        assert_eq!(parts[1], Expr::Const(Value::String("{{ broken".to_string())));
    }

    #[test]
    fn test_loop_consumes_extent() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "H");
        sheet.set_value(1, 0, "{{ r }}");
        sheet.annotate(1, 0, "loop-down, for r in rows, last_cell=A2");
        sheet.set_value(2, 0, "F");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        assert_eq!(body.body.len(), 3);
        let TemplateNode::Loop(node) = &body.body[1] else {
            panic!("expected loop");
        };
        assert_eq!(node.direction, LoopDirection::Down);
        assert_eq!((node.row, node.col), (1, 0));
        assert_eq!(node.size, Size::new(1, 1));
        assert_eq!(node.body.len(), 1);
        let TemplateNode::Cell(inner) = &node.body[0] else {
            panic!("expected cell in loop body");
        };
        assert_eq!((inner.row, inner.col), (0, 0));
    }

    #[test]
    fn test_nested_loops_on_one_cell() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "{{ v }}");
        sheet.annotate(0, 0, "loop-down, for row in table");
        sheet.annotate(0, 0, "loop-right, for v in row");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        let TemplateNode::Loop(outer) = &body.body[0] else {
            panic!("expected outer loop");
        };
        assert_eq!(outer.direction, LoopDirection::Down);
        let TemplateNode::Loop(inner) = &outer.body[0] else {
            panic!("expected inner loop");
        };
        assert_eq!(inner.direction, LoopDirection::Right);
        assert!(matches!(inner.body[0], TemplateNode::Cell(_)));
    }

    #[test]
    fn test_formula_args_relative_to_cell() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, 10);
        sheet.set_value(0, 1, "=A1*2");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        let TemplateNode::Formula(formula) = &body.body[1] else {
            panic!("expected formula");
        };
        assert_eq!(formula.args.len(), 1);
        assert_eq!(formula.args[0].start, 1);
        assert_eq!(formula.args[0].end, 3);
        assert_eq!(formula.args[0].cells, vec![(0, -1)]);
    }

    #[test]
    fn test_func_arg_axis_applies_to_formula() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "=SUM(A1)");
        sheet.annotate(0, 0, "func-arg-v");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        let TemplateNode::Formula(formula) = &body.body[0] else {
            panic!("expected formula");
        };
        assert_eq!(formula.args[0].axis, Some(Axis::Vertical));
    }

    #[test]
    fn test_func_arg_axis_must_be_last() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "=SUM(A1)");
        sheet.annotate(0, 0, "func-arg-v");
        sheet.annotate(0, 0, "merge, cols=2");
        let mut doc = MemoryDocument::new();
        doc.add_sheet(sheet);
        assert!(matches!(
            assemble(&doc),
            Err(TemplateError::Spatial { .. })
        ));
    }

    #[test]
    fn test_remove_prunes_cells_and_directives() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "keep");
        sheet.set_value(1, 0, "gone");
        sheet.annotate(1, 0, "remove, last_cell=B2");
        sheet.set_value(1, 1, "gone too");
        sheet.annotate(1, 1, "loop-down, for x in xs");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        // The untouched (0,1) cell still materializes as an empty node.
        assert_eq!(body.body.len(), 3);
        assert!(matches!(body.body[0], TemplateNode::Cell(_)));
        let TemplateNode::Cell(empty) = &body.body[1] else {
            panic!("expected empty cell node");
        };
        assert_eq!((empty.row, empty.col), (0, 1));
        assert_eq!(empty.value, None);
        let TemplateNode::Delete(delete) = &body.body[2] else {
            panic!("expected delete node");
        };
        assert_eq!((delete.row, delete.col), (1, 0));
        assert_eq!(delete.size, Size::new(1, 2));
    }

    #[test]
    fn test_if_with_else_adds_post_remove_at_root() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "then");
        sheet.annotate(0, 0, "if, condition=flag, else=C1");
        sheet.set_value(0, 1, "middle");
        sheet.set_value(0, 2, "otherwise");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        assert_eq!(body.body.len(), 3);
        let TemplateNode::Cond(cond) = &body.body[0] else {
            panic!("expected cond");
        };
        assert_eq!(cond.else_body.as_ref().map(Vec::len), Some(1));
        // The else extent is scrubbed from the output by a removal node
        // attached to the sheet root.
        let TemplateNode::Delete(delete) = body.body.last().unwrap() else {
            panic!("expected trailing delete");
        };
        assert_eq!((delete.row, delete.col), (0, 2));
        assert_eq!(delete.size, Size::new(1, 1));
    }

    #[test]
    fn test_adjacent_else_removal_lands_in_cond_body() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "then");
        sheet.annotate(0, 0, "if, condition=flag, else=B1");
        sheet.set_value(0, 1, "otherwise");
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        // Lenient containment counts the adjacent column as part of the
        // cond region, so the removal is appended to the cond body.
        assert_eq!(body.body.len(), 1);
        let TemplateNode::Cond(cond) = &body.body[0] else {
            panic!("expected cond");
        };
        assert_eq!(cond.body.len(), 2);
        let TemplateNode::Delete(delete) = cond.body.last().unwrap() else {
            panic!("expected delete inside cond body");
        };
        assert_eq!((delete.row, delete.col), (0, 1));
    }

    #[test]
    fn test_sheet_loop_becomes_root() {
        let mut sheet = MemorySheet::new("{{ dept.name }}");
        sheet.set_value(0, 0, "{{ dept.title }}");
        sheet.annotate(0, 0, "loop-sheet, for dept in departments");
        let SheetNode::Loop(node) = assemble_one(sheet) else {
            panic!("expected sheet loop");
        };
        assert_eq!(node.var, "dept");
        assert_eq!(node.sheet.size, Size::new(1, 1));
        assert!(matches!(node.sheet.name, Expr::ToStr(_)));
    }

    #[test]
    fn test_synt_v2_block_annotations() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "{{ r }}");
        sheet.set_value(1, 0, "x");
        sheet.annotate(
            1,
            0,
            "synt-v2\nA1\nloop-down, for r in rows\n====\nA2\nrow-height=20",
        );
        let SheetNode::Sheet(body) = assemble_one(sheet) else {
            panic!("expected plain sheet");
        };
        let TemplateNode::Loop(node) = &body.body[0] else {
            panic!("expected loop from block annotation");
        };
        assert_eq!(node.var, "r");
        let TemplateNode::Cell(cell) = &body.body[1] else {
            panic!("expected cell");
        };
        assert!(cell.row_height.is_some());
    }

    #[test]
    fn test_unknown_directive_is_grammar_error() {
        let mut sheet = MemorySheet::new("s");
        sheet.set_value(0, 0, "x");
        sheet.annotate(0, 0, "detonate");
        let mut doc = MemoryDocument::new();
        doc.add_sheet(sheet);
        assert!(matches!(
            assemble(&doc),
            Err(TemplateError::Grammar { .. })
        ));
    }
}
