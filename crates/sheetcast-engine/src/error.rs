//! Error types for the sheetcast engine.

use thiserror::Error;

/// Errors raised while parsing expressions and directives or while
/// evaluating them against a context.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("can not find variable '{0}'")]
    UnresolvedVariable(String),

    #[error("can not get attribute '{attr}' from {value}")]
    Attribute { attr: String, value: String },

    #[error("can not get item {key} from {value}")]
    Item { key: String, value: String },

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("{0}")]
    Type(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
