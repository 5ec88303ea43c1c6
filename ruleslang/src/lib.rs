//! RulesLang
//!
//! An embeddable rule/expression language: programs compile from source
//! text and evaluate against a JSON-like input, producing a JSON-like
//! output or "not applicable". Statically typed, with a numeric tower and
//! well-defined widening, algebraic composite types, first-order
//! functions, composite literals with defaulting, and an
//! indentation-sensitive block syntax.
//!
//! # Example
//!
//! ```
//! use ruleslang::Rule;
//! use serde_json::json;
//!
//! let rule = Rule::compile(
//!     "def Input {a: sint32, b: sint32}\nreturn .a + .b",
//! ).expect("compile failed");
//! let output = rule.run(&json!({"a": 2, "b": 3})).expect("run failed");
//! assert_eq!(output, json!(5));
//! ```

pub mod eval;
pub mod rule;
pub mod sem;
pub mod shell;
pub mod types;

pub use eval::{Evaluator, Flow};
pub use rule::{type_descriptor, Rule, RuleError};
pub use sem::{Analyzer, SemProgram};
pub use shell::{run_shell, ShellSession};
pub use types::{convertible_to, join, Type};

// Re-export the pipeline front end for embedders.
pub use ruleslang_parser::{expand_operators, parse, parse_expression, SourceError, Span};
