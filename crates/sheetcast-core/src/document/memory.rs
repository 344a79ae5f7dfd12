//! In-memory document implementations.
//!
//! [`MemoryDocument`] and [`MemorySheet`] hold a template grid built in
//! code. [`MemoryWriter`] collects rendered output and serializes it to
//! deterministic JSON bytes, which makes renders byte-comparable.

use std::collections::BTreeMap;

use serde::Serialize;

use sheetcast_engine::engine::Value;

use super::{DocumentReader, DocumentWriter, MergedRange, SheetReader};
use crate::error::{Result, TemplateError};

/// A template sheet assembled in memory.
#[derive(Default)]
pub struct MemorySheet {
    name: String,
    values: BTreeMap<(usize, usize), Value>,
    styles: BTreeMap<(usize, usize), String>,
    annotations: BTreeMap<(usize, usize), String>,
    row_heights: BTreeMap<usize, f64>,
    col_widths: BTreeMap<usize, f64>,
    merged: Vec<MergedRange>,
    rows: usize,
    cols: usize,
}

impl MemorySheet {
    pub fn new(name: &str) -> MemorySheet {
        MemorySheet {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn grow(&mut self, row: usize, col: usize) {
        self.rows = self.rows.max(row + 1);
        self.cols = self.cols.max(col + 1);
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: impl Into<Value>) -> &mut Self {
        self.grow(row, col);
        self.values.insert((row, col), value.into());
        self
    }

    pub fn set_style(&mut self, row: usize, col: usize, style: &str) -> &mut Self {
        self.grow(row, col);
        self.styles.insert((row, col), style.to_string());
        self
    }

    /// Append an annotation line to the cell. Repeated calls stack lines,
    /// as a multi-line comment would.
    pub fn annotate(&mut self, row: usize, col: usize, text: &str) -> &mut Self {
        self.grow(row, col);
        let entry = self.annotations.entry((row, col)).or_default();
        if !entry.is_empty() {
            entry.push('\n');
        }
        entry.push_str(text);
        self
    }

    pub fn set_row_height(&mut self, row: usize, height: f64) -> &mut Self {
        self.row_heights.insert(row, height);
        self
    }

    pub fn set_col_width(&mut self, col: usize, width: f64) -> &mut Self {
        self.col_widths.insert(col, width);
        self
    }

    pub fn add_merge(&mut self, row: usize, col: usize, rows: usize, cols: usize) -> &mut Self {
        self.merged.push(MergedRange {
            row,
            col,
            rows,
            cols,
        });
        self
    }
}

impl SheetReader for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn value(&self, row: usize, col: usize) -> Option<Value> {
        self.values.get(&(row, col)).cloned()
    }

    fn style(&self, row: usize, col: usize) -> Option<String> {
        self.styles.get(&(row, col)).cloned()
    }

    fn row_height(&self, row: usize) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    fn col_width(&self, col: usize) -> Option<f64> {
        self.col_widths.get(&col).copied()
    }

    fn annotation(&self, row: usize, col: usize) -> Option<String> {
        self.annotations.get(&(row, col)).cloned()
    }

    fn merged_ranges(&self) -> Vec<MergedRange> {
        self.merged.clone()
    }
}

/// A template document held in memory.
#[derive(Default)]
pub struct MemoryDocument {
    sheets: Vec<MemorySheet>,
}

impl MemoryDocument {
    pub fn new() -> MemoryDocument {
        MemoryDocument::default()
    }

    pub fn add_sheet(&mut self, sheet: MemorySheet) -> &mut Self {
        self.sheets.push(sheet);
        self
    }
}

impl DocumentReader for MemoryDocument {
    fn sheets(&self) -> Vec<&dyn SheetReader> {
        self.sheets
            .iter()
            .map(|sheet| sheet as &dyn SheetReader)
            .collect()
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct WrittenCell {
    row: usize,
    col: usize,
    value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct WrittenSheet {
    name: String,
    cells: Vec<WrittenCell>,
    row_heights: BTreeMap<usize, f64>,
    col_widths: BTreeMap<usize, f64>,
    merges: Vec<(usize, usize, usize, usize)>,
}

/// A writer that keeps the rendered document in memory and serializes it to
/// JSON on finish.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    sheets: Vec<WrittenSheet>,
}

impl MemoryWriter {
    pub fn new() -> MemoryWriter {
        MemoryWriter::default()
    }

    fn current(&mut self) -> Result<&mut WrittenSheet> {
        self.sheets
            .last_mut()
            .ok_or_else(|| TemplateError::Write("no sheet created".to_string()))
    }

    fn sheet(&self, name: &str) -> Option<&WrittenSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }

    /// Value written at a 1-based coordinate, if any.
    pub fn value(&self, sheet: &str, row: usize, col: usize) -> Option<&Value> {
        self.sheet(sheet)?
            .cells
            .iter()
            .find(|cell| cell.row == row && cell.col == col)
            .map(|cell| &cell.value)
    }

    pub fn style(&self, sheet: &str, row: usize, col: usize) -> Option<&str> {
        self.sheet(sheet)?
            .cells
            .iter()
            .find(|cell| cell.row == row && cell.col == col)?
            .style
            .as_deref()
    }

    pub fn merges(&self, sheet: &str) -> Vec<(usize, usize, usize, usize)> {
        self.sheet(sheet)
            .map(|sheet| sheet.merges.clone())
            .unwrap_or_default()
    }

    pub fn row_height(&self, sheet: &str, row: usize) -> Option<f64> {
        self.sheet(sheet)?.row_heights.get(&row).copied()
    }

    pub fn col_width(&self, sheet: &str, col: usize) -> Option<f64> {
        self.sheet(sheet)?.col_widths.get(&col).copied()
    }
}

impl DocumentWriter for MemoryWriter {
    fn create_sheet(&mut self, name: &str) -> Result<()> {
        self.sheets.push(WrittenSheet {
            name: name.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    fn set_cell(
        &mut self,
        row: usize,
        col: usize,
        value: &Value,
        style: Option<&str>,
    ) -> Result<()> {
        self.current()?.cells.push(WrittenCell {
            row,
            col,
            value: value.clone(),
            style: style.map(str::to_string),
        });
        Ok(())
    }

    fn set_row_height(&mut self, row: usize, height: f64) -> Result<()> {
        self.current()?.row_heights.insert(row, height);
        Ok(())
    }

    fn set_col_width(&mut self, col: usize, width: f64) -> Result<()> {
        self.current()?.col_widths.insert(col, width);
        Ok(())
    }

    fn merge_range(&mut self, row: usize, col: usize, rows: usize, cols: usize) -> Result<()> {
        self.current()?.merges.push((row, col, rows, cols));
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.sheets)
            .map_err(|err| TemplateError::Write(err.to_string()))
    }
}
