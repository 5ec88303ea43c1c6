//! The typed semantic tree.
//!
//! Isomorphic to the syntactic tree but lowered: every node carries its
//! resolved type and span, names are resolved to frame slots or function
//! indices, implicit conversions are explicit `Convert` nodes, and
//! composite literals are decomposed into tuple/struct/array literal
//! nodes whose element order matches the target layout.

use ruleslang_parser::Span;

use crate::types::{StringEncoding, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct SemProgram {
    pub statements: Vec<SemStmt>,
    pub functions: Vec<SemFunction>,
    /// The rule input structure (empty when the program defines no
    /// `Input` type).
    pub input_type: Type,
    /// Join of the types of all top-level `return` values.
    pub output_type: Option<Type>,
    /// Byte size of the top-level frame; slot 0 holds the input address.
    pub frame_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemFunction {
    pub name: String,
    pub parameters: Vec<(String, Type)>,
    /// Frame offset of each parameter slot, in declaration order.
    pub parameter_offsets: Vec<usize>,
    pub return_type: Option<Type>,
    pub body: Vec<SemStmt>,
    pub frame_size: usize,
}

/// How a member of a tuple or structure is addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSelector {
    /// By layout position (tuples).
    Position(usize),
    /// By member name (structures, to accommodate widening reorders).
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
    ShiftLeft,
    ShiftRight,
    ShiftRightLogical,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    pub fn from_source(source: &str) -> Option<CompareOp> {
        Some(match source {
            "==" => CompareOp::Equal,
            "!=" => CompareOp::NotEqual,
            "===" => CompareOp::Identical,
            "!==" => CompareOp::NotIdentical,
            "<" => CompareOp::Less,
            "<=" => CompareOp::LessEqual,
            ">" => CompareOp::Greater,
            ">=" => CompareOp::GreaterEqual,
            _ => return None,
        })
    }

    pub fn is_identity(self) -> bool {
        matches!(self, CompareOp::Identical | CompareOp::NotIdentical)
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Less | CompareOp::LessEqual | CompareOp::Greater | CompareOp::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemExpr {
    pub kind: SemExprKind,
    pub ty: Type,
    pub span: Span,
}

impl SemExpr {
    pub fn new(kind: SemExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn is_literal_value(&self) -> bool {
        self.ty.is_literal()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemExprKind {
    BoolValue(bool),
    SintValue(i64),
    UintValue(u64),
    FloatValue(f64),
    StringValue(StringEncoding, Vec<char>),
    NullValue,
    /// Read a frame slot.
    SlotGet { offset: usize },
    TupleLiteral(Vec<SemExpr>),
    /// Values in layout order; `None` members keep their zero fill.
    StructLiteral(Vec<Option<SemExpr>>),
    /// Explicitly indexed values plus the catch-all "other" value, which
    /// is evaluated at most once.
    ArrayLiteral {
        length: u64,
        values: Vec<(u64, SemExpr)>,
        other: Option<Box<SemExpr>>,
    },
    FieldAccess {
        object: Box<SemExpr>,
        selector: FieldSelector,
    },
    IndexAccess {
        object: Box<SemExpr>,
        index: Box<SemExpr>,
    },
    Call {
        function: usize,
        arguments: Vec<SemExpr>,
    },
    /// Implicit conversion of `value` to this node's type.
    Convert { value: Box<SemExpr> },
    Negate(Box<SemExpr>),
    LogicalNot(Box<SemExpr>),
    BitwiseNot(Box<SemExpr>),
    Binary {
        op: BinaryOp,
        left: Box<SemExpr>,
        right: Box<SemExpr>,
    },
    /// `a op b op c ...`: operands evaluate once each, left to right,
    /// short-circuiting on the first false link.
    CompareChain {
        operands: Vec<SemExpr>,
        operators: Vec<CompareOp>,
    },
    /// A type comparison decided during analysis; the operand still
    /// evaluates for its effects.
    TypeCheck {
        value: Box<SemExpr>,
        result: bool,
    },
    Logical {
        op: LogicalOp,
        left: Box<SemExpr>,
        right: Box<SemExpr>,
    },
    Conditional {
        condition: Box<SemExpr>,
        true_value: Box<SemExpr>,
        false_value: Box<SemExpr>,
    },
    Concatenate {
        left: Box<SemExpr>,
        right: Box<SemExpr>,
    },
    /// Field access over a type name; evaluation is not implemented.
    StaticFieldAccess {
        type_name: String,
        member: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemStmt {
    pub kind: SemStmtKind,
    pub span: Span,
}

impl SemStmt {
    pub fn new(kind: SemStmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemStmtKind {
    /// Initialize a frame slot; `None` keeps the zero fill.
    Declare {
        offset: usize,
        ty: Type,
        value: Option<SemExpr>,
    },
    AssignSlot {
        offset: usize,
        ty: Type,
        value: SemExpr,
    },
    AssignField {
        object: SemExpr,
        selector: FieldSelector,
        value: SemExpr,
    },
    AssignIndex {
        object: SemExpr,
        index: SemExpr,
        value: SemExpr,
    },
    /// A call evaluated for its effects; any result is dropped.
    Call {
        function: usize,
        arguments: Vec<SemExpr>,
    },
    If {
        blocks: Vec<(SemExpr, Vec<SemStmt>)>,
        else_statements: Vec<SemStmt>,
    },
    While {
        label: Option<String>,
        condition: SemExpr,
        body: Vec<SemStmt>,
    },
    Return(Option<SemExpr>),
    Break(Option<String>),
    Continue(Option<String>),
}
