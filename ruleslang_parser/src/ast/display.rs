//! Tree rendering: the structural `Display` form used in diagnostics and
//! tests, and the `to_source` printer that emits re-parseable source text.

use std::fmt;

use super::expression::{
    Expression, ExpressionKind, LabeledExpression, NamedType, TypeExpression, TypeExpressionKind,
};
use super::statement::{DeclarationKind, Statement, StatementKind};

fn join<T: fmt::Display>(items: &[T], joiner: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(joiner)
}

impl fmt::Display for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted_name())?;
        for dimension in &self.dimensions {
            match dimension {
                Some(size) => write!(f, "[{}]", size.to_source())?,
                None => write!(f, "[]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeExpressionKind::Named(named) => write!(f, "{}", named),
            TypeExpressionKind::Composite { members } => {
                let parts: Vec<String> = members
                    .iter()
                    .map(|(label, member)| match label {
                        Some(label) => format!("{}: {}", label.source, member),
                        None => member.to_string(),
                    })
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl fmt::Display for LabeledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{}: ", label.source)?;
        }
        write!(f, "{}", self.value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::BooleanLiteral(token)
            | ExpressionKind::StringLiteral(token)
            | ExpressionKind::SignedIntegerLiteral(token)
            | ExpressionKind::UnsignedIntegerLiteral(token)
            | ExpressionKind::FloatLiteral(token) => write!(f, "{}", token),
            ExpressionKind::NullLiteral => write!(f, "NullLiteral(null)"),
            ExpressionKind::Name(name) => {
                let parts: Vec<&str> = name.iter().map(|t| t.source.as_str()).collect();
                write!(f, "{}", parts.join("."))
            }
            ExpressionKind::ContextFieldAccess(name) => {
                write!(f, "ContextFieldAccess(.{})", name.source)
            }
            ExpressionKind::FieldAccess(object, name) => {
                write!(f, "FieldAccess({}.{})", object, name.source)
            }
            ExpressionKind::IndexAccess(object, index) => {
                write!(f, "IndexAccess({}[{}])", object, index)
            }
            ExpressionKind::FunctionCall(object, arguments) => {
                write!(f, "FunctionCall({}({}))", object, join(arguments, ", "))
            }
            ExpressionKind::Sign(operator, inner) => {
                write!(f, "Sign({}{})", operator.source, inner)
            }
            ExpressionKind::LogicalNot(inner) => write!(f, "LogicalNot(!{})", inner),
            ExpressionKind::BitwiseNot(inner) => write!(f, "BitwiseNot(~{})", inner),
            ExpressionKind::Exponent(left, right) => {
                write!(f, "Exponent({} ** {})", left, right)
            }
            ExpressionKind::Infix(left, function, right) => {
                write!(f, "Infix({} {} {})", left, function.source, right)
            }
            ExpressionKind::Multiply(left, operator, right) => {
                write!(f, "Multiply({} {} {})", left, operator.source, right)
            }
            ExpressionKind::Add(left, operator, right) => {
                write!(f, "Add({} {} {})", left, operator.source, right)
            }
            ExpressionKind::Shift(left, operator, right) => {
                write!(f, "Shift({} {} {})", left, operator.source, right)
            }
            ExpressionKind::Compare {
                operands,
                operators,
                type_compare,
            } => {
                write!(f, "Compare({}", operands[0])?;
                for (operator, operand) in operators.iter().zip(operands.iter().skip(1)) {
                    write!(f, " {} {}", operator.source, operand)?;
                }
                if let Some((operator, target)) = type_compare {
                    write!(f, " {} {}", operator.source, target)?;
                }
                write!(f, ")")
            }
            ExpressionKind::BitwiseAnd(left, right) => {
                write!(f, "BitwiseAnd({} & {})", left, right)
            }
            ExpressionKind::BitwiseXor(left, right) => {
                write!(f, "BitwiseXor({} ^ {})", left, right)
            }
            ExpressionKind::BitwiseOr(left, right) => {
                write!(f, "BitwiseOr({} | {})", left, right)
            }
            ExpressionKind::LogicalAnd(left, right) => {
                write!(f, "LogicalAnd({} && {})", left, right)
            }
            ExpressionKind::LogicalXor(left, right) => {
                write!(f, "LogicalXor({} ^^ {})", left, right)
            }
            ExpressionKind::LogicalOr(left, right) => {
                write!(f, "LogicalOr({} || {})", left, right)
            }
            ExpressionKind::Concatenate(left, right) => {
                write!(f, "Concatenate({} ~ {})", left, right)
            }
            ExpressionKind::Range(from, to) => write!(f, "Range({} .. {})", from, to),
            ExpressionKind::Conditional {
                condition,
                true_value,
                false_value,
            } => write!(
                f,
                "Conditional({} if {} else {})",
                true_value, condition, false_value
            ),
            ExpressionKind::CompositeLiteral(values) => {
                write!(f, "CompositeLiteral({{{}}})", join(values, ", "))
            }
            ExpressionKind::Initializer(named_type, values) => {
                write!(f, "Initializer({}{{{}}})", named_type, join(values, ", "))
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StatementKind::TypeDefinition {
                name,
                type_expression,
            } => write!(f, "TypeDefinition(def {} {})", name.source, type_expression),
            StatementKind::VariableDeclaration {
                kind,
                declared_type,
                name,
                value,
            } => {
                let keyword = match kind {
                    DeclarationKind::Let => "let",
                    DeclarationKind::Var => "var",
                };
                write!(f, "VariableDeclaration({}", keyword)?;
                if let Some(declared) = declared_type {
                    write!(f, " {}", declared)?;
                }
                write!(f, " {}", name.source)?;
                if let Some(value) = value {
                    write!(f, " = {}", value)?;
                }
                write!(f, ")")
            }
            StatementKind::Assignment {
                target,
                operator,
                value,
            } => write!(f, "Assignment({} {} {})", target, operator.source, value),
            StatementKind::FunctionCallStatement(call) => {
                write!(f, "FunctionCallStatement({})", call)
            }
            StatementKind::ConditionalStatement {
                blocks,
                false_statements,
            } => {
                write!(f, "ConditionalStatement(")?;
                for (i, (condition, statements)) in blocks.iter().enumerate() {
                    if i == 0 {
                        write!(f, "if {}: {}", condition, join(statements, "; "))?;
                    } else {
                        write!(f, "; else if {}: {}", condition, join(statements, "; "))?;
                    }
                }
                if !false_statements.is_empty() {
                    write!(f, "; else: {}", join(false_statements, "; "))?;
                }
                write!(f, ")")
            }
            StatementKind::LoopStatement {
                label,
                condition,
                body,
            } => {
                write!(f, "LoopStatement(")?;
                if let Some(label) = label {
                    write!(f, "{}: ", label.source)?;
                }
                write!(f, "while {}: {})", condition, join(body, "; "))
            }
            StatementKind::FunctionDefinition {
                name,
                parameters,
                return_type,
                body,
            } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|p| format!("{} {}", p.parameter_type, p.name.source))
                    .collect();
                write!(f, "FunctionDefinition(func {}({})", name.source, params.join(", "))?;
                if let Some(return_type) = return_type {
                    write!(f, " {}", return_type)?;
                }
                write!(f, ": {})", join(body, "; "))
            }
            StatementKind::ReturnStatement(value) => match value {
                Some(value) => write!(f, "ReturnStatement(return {})", value),
                None => write!(f, "ReturnStatement(return)"),
            },
            StatementKind::BreakStatement(label) => match label {
                Some(label) => write!(f, "BreakStatement(break {})", label.source),
                None => write!(f, "BreakStatement(break)"),
            },
            StatementKind::ContinueStatement(label) => match label {
                Some(label) => write!(f, "ContinueStatement(continue {})", label.source),
                None => write!(f, "ContinueStatement(continue)"),
            },
        }
    }
}

impl Expression {
    /// Render as source text. Compound expressions are parenthesized so the
    /// output re-parses to the same tree regardless of context.
    pub fn to_source(&self) -> String {
        match &self.kind {
            ExpressionKind::BooleanLiteral(token)
            | ExpressionKind::StringLiteral(token)
            | ExpressionKind::SignedIntegerLiteral(token)
            | ExpressionKind::UnsignedIntegerLiteral(token)
            | ExpressionKind::FloatLiteral(token) => token.source.clone(),
            ExpressionKind::NullLiteral => "null".to_string(),
            ExpressionKind::Name(name) => name
                .iter()
                .map(|t| t.source.as_str())
                .collect::<Vec<_>>()
                .join("."),
            ExpressionKind::ContextFieldAccess(name) => format!(".{}", name.source),
            ExpressionKind::FieldAccess(object, name) => {
                format!("{}.{}", object.to_source(), name.source)
            }
            ExpressionKind::IndexAccess(object, index) => {
                format!("{}[{}]", object.to_source(), index.to_source())
            }
            ExpressionKind::FunctionCall(object, arguments) => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_source()).collect();
                format!("{}({})", object.to_source(), args.join(", "))
            }
            ExpressionKind::Sign(operator, inner) => {
                format!("({}{})", operator.source, inner.to_source())
            }
            ExpressionKind::LogicalNot(inner) => format!("(!{})", inner.to_source()),
            ExpressionKind::BitwiseNot(inner) => format!("(~{})", inner.to_source()),
            ExpressionKind::Exponent(left, right) => {
                format!("({} ** {})", left.to_source(), right.to_source())
            }
            ExpressionKind::Infix(left, function, right) => format!(
                "({} {} {})",
                left.to_source(),
                function.source,
                right.to_source()
            ),
            ExpressionKind::Multiply(left, operator, right)
            | ExpressionKind::Add(left, operator, right)
            | ExpressionKind::Shift(left, operator, right) => format!(
                "({} {} {})",
                left.to_source(),
                operator.source,
                right.to_source()
            ),
            ExpressionKind::Compare {
                operands,
                operators,
                type_compare,
            } => {
                let mut source = format!("({}", operands[0].to_source());
                for (operator, operand) in operators.iter().zip(operands.iter().skip(1)) {
                    source.push_str(&format!(" {} {}", operator.source, operand.to_source()));
                }
                if let Some((operator, target)) = type_compare {
                    source.push_str(&format!(" {} {}", operator.source, target));
                }
                source.push(')');
                source
            }
            ExpressionKind::BitwiseAnd(left, right) => {
                format!("({} & {})", left.to_source(), right.to_source())
            }
            ExpressionKind::BitwiseXor(left, right) => {
                format!("({} ^ {})", left.to_source(), right.to_source())
            }
            ExpressionKind::BitwiseOr(left, right) => {
                format!("({} | {})", left.to_source(), right.to_source())
            }
            ExpressionKind::LogicalAnd(left, right) => {
                format!("({} && {})", left.to_source(), right.to_source())
            }
            ExpressionKind::LogicalXor(left, right) => {
                format!("({} ^^ {})", left.to_source(), right.to_source())
            }
            ExpressionKind::LogicalOr(left, right) => {
                format!("({} || {})", left.to_source(), right.to_source())
            }
            ExpressionKind::Concatenate(left, right) => {
                format!("({} ~ {})", left.to_source(), right.to_source())
            }
            ExpressionKind::Range(from, to) => {
                format!("({} .. {})", from.to_source(), to.to_source())
            }
            ExpressionKind::Conditional {
                condition,
                true_value,
                false_value,
            } => format!(
                "({} if {} else {})",
                true_value.to_source(),
                condition.to_source(),
                false_value.to_source()
            ),
            ExpressionKind::CompositeLiteral(values) => {
                format!("{{{}}}", labeled_to_source(values))
            }
            ExpressionKind::Initializer(named_type, values) => {
                format!("{} {{{}}}", named_type, labeled_to_source(values))
            }
        }
    }
}

fn labeled_to_source(values: &[LabeledExpression]) -> String {
    values
        .iter()
        .map(|labeled| match &labeled.label {
            Some(label) => format!("{}: {}", label.source, labeled.value.to_source()),
            None => labeled.value.to_source(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Statement {
    /// Render as source text at the given indentation depth (four spaces
    /// per level).
    pub fn to_source(&self, depth: usize) -> String {
        let pad = "    ".repeat(depth);
        match &self.kind {
            StatementKind::TypeDefinition {
                name,
                type_expression,
            } => format!("{}def {} {}", pad, name.source, type_expression),
            StatementKind::VariableDeclaration {
                kind,
                declared_type,
                name,
                value,
            } => {
                let keyword = match kind {
                    DeclarationKind::Let => "let",
                    DeclarationKind::Var => "var",
                };
                let mut line = format!("{}{}", pad, keyword);
                if let Some(declared) = declared_type {
                    line.push_str(&format!(" {}", declared));
                }
                line.push_str(&format!(" {}", name.source));
                if let Some(value) = value {
                    line.push_str(&format!(" = {}", value.to_source()));
                }
                line
            }
            StatementKind::Assignment {
                target,
                operator,
                value,
            } => format!(
                "{}{} {} {}",
                pad,
                target.to_source(),
                operator.source,
                value.to_source()
            ),
            StatementKind::FunctionCallStatement(call) => format!("{}{}", pad, call.to_source()),
            StatementKind::ConditionalStatement {
                blocks,
                false_statements,
            } => {
                let mut lines = Vec::new();
                for (i, (condition, statements)) in blocks.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "else if" };
                    lines.push(format!("{}{} {}:", pad, keyword, condition.to_source()));
                    for statement in statements {
                        lines.push(statement.to_source(depth + 1));
                    }
                }
                if !false_statements.is_empty() {
                    lines.push(format!("{}else:", pad));
                    for statement in false_statements {
                        lines.push(statement.to_source(depth + 1));
                    }
                }
                lines.join("\n")
            }
            StatementKind::LoopStatement {
                label,
                condition,
                body,
            } => {
                let prefix = match label {
                    Some(label) => format!("{}: ", label.source),
                    None => String::new(),
                };
                let mut lines = vec![format!(
                    "{}{}while {}:",
                    pad,
                    prefix,
                    condition.to_source()
                )];
                for statement in body {
                    lines.push(statement.to_source(depth + 1));
                }
                lines.join("\n")
            }
            StatementKind::FunctionDefinition {
                name,
                parameters,
                return_type,
                body,
            } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|p| format!("{} {}", p.parameter_type, p.name.source))
                    .collect();
                let returns = match return_type {
                    Some(return_type) => format!(" {}", return_type),
                    None => String::new(),
                };
                let mut lines = vec![format!(
                    "{}func {}({}){}:",
                    pad,
                    name.source,
                    params.join(", "),
                    returns
                )];
                for statement in body {
                    lines.push(statement.to_source(depth + 1));
                }
                lines.join("\n")
            }
            StatementKind::ReturnStatement(value) => match value {
                Some(value) => format!("{}return {}", pad, value.to_source()),
                None => format!("{}return", pad),
            },
            StatementKind::BreakStatement(label) => match label {
                Some(label) => format!("{}break {}", pad, label.source),
                None => format!("{}break", pad),
            },
            StatementKind::ContinueStatement(label) => match label {
                Some(label) => format!("{}continue {}", pad, label.source),
                None => format!("{}continue", pad),
            },
        }
    }
}
