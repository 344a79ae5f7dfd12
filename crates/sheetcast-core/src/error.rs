//! Error types for sheetcast core.

use std::fmt;

use thiserror::Error;

use sheetcast_engine::EngineError;

/// Trail of locations (sheet, cell, directive) leading to a failure.
#[derive(Clone, Debug, Default)]
pub struct Breadcrumb(Vec<String>);

impl Breadcrumb {
    pub fn push(&mut self, part: impl Into<String>) {
        self.0.push(part.into());
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }
}

impl fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<document>")
        } else {
            write!(f, "{}", self.0.join(", "))
        }
    }
}

/// Errors that can occur while assembling or rendering a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("grammar error at {breadcrumb}: {source}")]
    Grammar {
        breadcrumb: Breadcrumb,
        #[source]
        source: EngineError,
    },

    #[error("spatial error at {breadcrumb}: {message}")]
    Spatial {
        breadcrumb: Breadcrumb,
        message: String,
    },

    #[error("runtime error at {breadcrumb}: {source}")]
    Runtime {
        breadcrumb: Breadcrumb,
        #[source]
        source: EngineError,
    },

    #[error("layout invariant violated: {0}")]
    LayoutInvariant(String),

    #[error("write error: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
