//! Template computation engine.
//!
//! This module provides the evaluation machinery behind a template render:
//!
//! - [`CellRef`], [`CellRange`] - Cell reference parsing (A1 notation ↔ row/col indices)
//! - [`Expr`], [`parse_expression`] - Placeholder expression language
//! - [`Directive`], [`parse_directive`] - Cell annotation grammar
//! - [`Environment`], [`Context`] - Filter/function registries and variable scoping
//! - [`eval`], [`is_truthy`], [`to_display`] - Expression evaluation
//! - [`CellGroup`], [`LoopCellGroup`], [`SheetGroup`] - Layout of evaluated regions
//! - [`FuncCell`], [`FuncArg`] - Formula cells with relocatable references

mod cell_ref;
mod cells;
mod context;
mod directive;
mod eval;
mod expr;
mod filters;
mod layout;

pub use cell_ref::{CellRange, CellRef, scan_formula_refs};
pub use cells::{Axis, Cell, FuncArg, FuncCell, Merge};
pub use context::{Context, Environment, ResolveMode, loop_metadata};
pub use directive::{Directive, LoopDirection, LoopSpec, parse_directive};
pub use eval::{eval, is_truthy, to_display};
pub use expr::{CallArg, Expr, parse_expression};
pub use filters::{default_if_none, yes_no};
pub use layout::{
    CellGroup, ChildGroup, FinalResult, LoopCellGroup, SheetGroup, SheetResult, Size,
};

pub use serde_json::Value;
