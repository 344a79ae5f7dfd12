//! sheetcast-engine - expression language, directive grammar and cell layout.

pub mod engine;
pub mod error;

pub use error::{EngineError, Result};
