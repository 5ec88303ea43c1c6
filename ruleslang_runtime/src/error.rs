//! Runtime error types.
//!
//! These carry no source location; the evaluator attaches the offending
//! node's span when it surfaces them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Member or index access through a null address
    #[error("Null reference")]
    NullReference,

    /// Integer division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Array or string index outside `0..length`
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: u64 },

    /// A semantic feature the evaluator does not support yet
    #[error("value not implemented: {0}")]
    NotImplemented(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
