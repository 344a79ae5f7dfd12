//! Document collaborator interfaces.
//!
//! The template core never touches a document format directly. A
//! [`DocumentReader`] supplies the template's cells, annotations and merged
//! ranges; a [`DocumentWriter`] receives the laid-out output. Reader
//! coordinates are 0-based; writer coordinates are 1-based, the framing
//! shift applied during sheet layout accounts for the difference.

mod memory;

pub use memory::{MemoryDocument, MemorySheet, MemoryWriter};

use sheetcast_engine::engine::Value;

use crate::error::Result;

/// A merged rectangle declared in the source document, anchored at its
/// top-left cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergedRange {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Read access to one template sheet.
pub trait SheetReader {
    fn name(&self) -> &str;
    /// Extent of the used area, in rows.
    fn rows(&self) -> usize;
    /// Extent of the used area, in columns.
    fn cols(&self) -> usize;
    fn value(&self, row: usize, col: usize) -> Option<Value>;
    /// Opaque style identifier for the cell, passed through to the writer.
    fn style(&self, row: usize, col: usize) -> Option<String>;
    fn row_height(&self, row: usize) -> Option<f64>;
    fn col_width(&self, col: usize) -> Option<f64>;
    /// Annotation (comment) text attached to the cell, if any.
    fn annotation(&self, row: usize, col: usize) -> Option<String>;
    fn merged_ranges(&self) -> Vec<MergedRange>;
}

/// Read access to a whole template document: an ordered list of sheets.
pub trait DocumentReader {
    fn sheets(&self) -> Vec<&dyn SheetReader>;
}

/// Write access for the rendered document.
pub trait DocumentWriter {
    /// Open a new output sheet; subsequent cell writes target it.
    fn create_sheet(&mut self, name: &str) -> Result<()>;
    fn set_cell(&mut self, row: usize, col: usize, value: &Value, style: Option<&str>)
    -> Result<()>;
    fn set_row_height(&mut self, row: usize, height: f64) -> Result<()>;
    fn set_col_width(&mut self, col: usize, width: f64) -> Result<()>;
    fn merge_range(&mut self, row: usize, col: usize, rows: usize, cols: usize) -> Result<()>;
    /// Serialize the finished document to bytes.
    fn finish(&mut self) -> Result<Vec<u8>>;
}
