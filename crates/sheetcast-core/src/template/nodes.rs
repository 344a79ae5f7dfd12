//! Template node tree.
//!
//! The parsed, still template-relative form of a document: literal cells,
//! formula cells, and region nodes fixed at their assembly-time size.
//! Coordinates in each node are relative to the enclosing region.

use sheetcast_engine::engine::{Axis, Expr, LoopDirection, Size};

/// Merge declaration on a cell; missing counts default to one.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    pub rows: Option<Expr>,
    pub cols: Option<Expr>,
}

/// A literal cell. `value` is `None` for an empty template cell, which
/// still pins its row and column during layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CellNode {
    pub row: usize,
    pub col: usize,
    pub value: Option<Expr>,
    pub style: Option<String>,
    pub row_height: Option<Expr>,
    pub col_width: Option<Expr>,
    pub merge: Option<MergeSpec>,
}

/// One reference token inside a formula, relative to the formula cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub start: usize,
    pub end: usize,
    pub cells: Vec<(isize, isize)>,
    pub axis: Option<Axis>,
}

/// A formula cell (`=`-prefixed text).
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaNode {
    pub row: usize,
    pub col: usize,
    pub text: String,
    pub style: Option<String>,
    pub row_height: Option<Expr>,
    pub col_width: Option<Expr>,
    pub merge: Option<MergeSpec>,
    pub args: Vec<ArgSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub row: usize,
    pub col: usize,
    pub size: Size,
    pub body: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopNode {
    pub row: usize,
    pub col: usize,
    pub size: Size,
    pub var: String,
    pub items: Expr,
    pub alias: Option<String>,
    pub direction: LoopDirection,
    pub body: Vec<TemplateNode>,
}

/// A conditional region. The false branch without an `else_body` renders
/// an empty region of the same size, which then collapses.
#[derive(Debug, Clone, PartialEq)]
pub struct CondNode {
    pub row: usize,
    pub col: usize,
    pub size: Size,
    pub condition: Expr,
    pub body: Vec<TemplateNode>,
    pub else_body: Option<Vec<TemplateNode>>,
}

/// An unconditionally removed region.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteNode {
    pub row: usize,
    pub col: usize,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Cell(CellNode),
    Formula(FormulaNode),
    Group(GroupNode),
    Loop(LoopNode),
    Cond(CondNode),
    Delete(DeleteNode),
    /// Only valid as the first node of a sheet body; evaluation rejects it
    /// anywhere else.
    SheetLoop(Box<SheetLoopNode>),
}

/// A sheet body: name expression plus the root region's content.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetBody {
    pub name: Expr,
    pub size: Size,
    pub body: Vec<TemplateNode>,
}

/// A sheet template repeated per item, producing one output sheet each.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLoopNode {
    pub var: String,
    pub items: Expr,
    pub alias: Option<String>,
    pub sheet: SheetBody,
}

/// One sheet of the template document.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetNode {
    Sheet(SheetBody),
    Loop(SheetLoopNode),
}
