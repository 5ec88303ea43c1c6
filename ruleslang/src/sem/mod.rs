//! Semantic analysis: scopes, typing, literal reduction, and the typed
//! semantic tree the evaluator walks.

pub mod analyzer;
pub mod context;
pub mod reduce;
pub mod tree;

pub use analyzer::{Analyzer, CONTEXT_SLOT};
pub use context::{BlockKind, Context, Variable};
pub use tree::{
    BinaryOp, CompareOp, FieldSelector, LogicalOp, SemExpr, SemExprKind, SemFunction, SemProgram,
    SemStmt, SemStmtKind,
};
