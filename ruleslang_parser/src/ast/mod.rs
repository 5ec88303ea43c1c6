//! Syntactic tree for RulesLang programs.
//!
//! Expressions and statements are tagged sums, one enum per category; every
//! node carries its `[start, end)` span into the source.

mod display;
mod expression;
mod statement;

pub use expression::{
    Expression, ExpressionKind, LabeledExpression, NamedType, TypeExpression, TypeExpressionKind,
};
pub use statement::{DeclarationKind, Parameter, Statement, StatementKind};
