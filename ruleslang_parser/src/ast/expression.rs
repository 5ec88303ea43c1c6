//! Expression nodes.

use crate::span::Span;
use crate::token::Token;

/// A possibly dotted type name with optional array dimensions, e.g.
/// `sint32[4]` or `geo.Point[]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    pub name: Vec<Token>,
    /// One entry per `[...]` suffix; `None` for an unsized `[]`.
    pub dimensions: Vec<Option<Expression>>,
    pub span: Span,
}

impl NamedType {
    /// The dotted name without dimensions.
    pub fn dotted_name(&self) -> String {
        self.name
            .iter()
            .map(|t| t.source.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A type expression: a named type or a brace composite (`{T1, T2}` tuple,
/// `{a: T1, b: T2}` structure).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpression {
    pub kind: TypeExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpressionKind {
    Named(NamedType),
    Composite {
        members: Vec<(Option<Token>, TypeExpression)>,
    },
}

/// A composite-literal part, optionally labeled with a struct field name,
/// an array index, or the catch-all `other` label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExpression {
    pub label: Option<Token>,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    BooleanLiteral(Token),
    StringLiteral(Token),
    SignedIntegerLiteral(Token),
    UnsignedIntegerLiteral(Token),
    FloatLiteral(Token),
    NullLiteral,
    /// A dotted name reference, e.g. `a` or `a.b.c`.
    Name(Vec<Token>),
    /// `.field` — a field of the rule input.
    ContextFieldAccess(Token),
    FieldAccess(Box<Expression>, Token),
    IndexAccess(Box<Expression>, Box<Expression>),
    FunctionCall(Box<Expression>, Vec<Expression>),
    /// Unary `+` or `-`; the token is the operator.
    Sign(Token, Box<Expression>),
    LogicalNot(Box<Expression>),
    BitwiseNot(Box<Expression>),
    Exponent(Box<Expression>, Box<Expression>),
    /// `left name right` — a named infix function call.
    Infix(Box<Expression>, Token, Box<Expression>),
    Multiply(Box<Expression>, Token, Box<Expression>),
    Add(Box<Expression>, Token, Box<Expression>),
    Shift(Box<Expression>, Token, Box<Expression>),
    /// A comparison chain `a op b op c ...` with a single optional trailing
    /// type comparison `value typeOp T`.
    Compare {
        operands: Vec<Expression>,
        operators: Vec<Token>,
        type_compare: Option<(Token, NamedType)>,
    },
    BitwiseAnd(Box<Expression>, Box<Expression>),
    BitwiseXor(Box<Expression>, Box<Expression>),
    BitwiseOr(Box<Expression>, Box<Expression>),
    LogicalAnd(Box<Expression>, Box<Expression>),
    LogicalXor(Box<Expression>, Box<Expression>),
    LogicalOr(Box<Expression>, Box<Expression>),
    Concatenate(Box<Expression>, Box<Expression>),
    Range(Box<Expression>, Box<Expression>),
    /// `true_value if condition else false_value`
    Conditional {
        condition: Box<Expression>,
        true_value: Box<Expression>,
        false_value: Box<Expression>,
    },
    CompositeLiteral(Vec<LabeledExpression>),
    Initializer(NamedType, Vec<LabeledExpression>),
}
