//! sheetcast-core - document model, template assembly and rendering.

pub mod document;
pub mod error;
pub mod template;

pub use document::{
    DocumentReader, DocumentWriter, MemoryDocument, MemorySheet, MemoryWriter, MergedRange,
    SheetReader,
};
pub use error::{Breadcrumb, Result, TemplateError};
pub use template::Template;

pub use sheetcast_engine::engine::{CellRef, Environment, ResolveMode, Value};
