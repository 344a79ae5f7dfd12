//! Template facade: parse once, render many times.
//!
//! [`Template::parse`] assembles a source document into a node tree.
//! [`Template::render`] evaluates that tree against input data and streams
//! the laid-out result into a [`DocumentWriter`]. The tree is immutable
//! after parsing, so one template can render any number of documents.

mod assemble;
mod evaluate;
pub mod nodes;

use sheetcast_engine::engine::{Context, Environment, Value};

use crate::document::{DocumentReader, DocumentWriter};
use crate::error::Result;
use crate::template::nodes::SheetNode;

/// A parsed spreadsheet template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    sheets: Vec<SheetNode>,
}

impl Template {
    /// Assemble a template from a source document.
    pub fn parse(reader: &dyn DocumentReader) -> Result<Template> {
        Ok(Template {
            sheets: assemble::assemble(reader)?,
        })
    }

    /// Render the template against `data`, writing the output document
    /// through `writer` and returning the serialized bytes.
    pub fn render(
        &self,
        env: &Environment,
        data: &Value,
        writer: &mut dyn DocumentWriter,
    ) -> Result<Vec<u8>> {
        let mut ctx = Context::new(env, data);
        let evaluated = evaluate::evaluate_sheets(&self.sheets, &mut ctx)?;
        for sheet in evaluated {
            writer.create_sheet(&sheet.name)?;
            let result = sheet.group.into_final();
            for cell in &result.cells {
                writer.set_cell(cell.row, cell.col, &cell.value, cell.style.as_deref())?;
                if let Some(height) = cell.row_height {
                    writer.set_row_height(cell.row, height)?;
                }
                if let Some(width) = cell.col_width {
                    writer.set_col_width(cell.col, width)?;
                }
            }
            for merge in &result.merges {
                writer.merge_range(merge.row, merge.col, merge.rows, merge.cols)?;
            }
        }
        writer.finish()
    }
}
