//! Expression analysis: typing, narrowing, conversion insertion, overload
//! resolution, and per-node literal folding.

use ruleslang_parser::ast::{Expression, ExpressionKind, LabeledExpression, NamedType};
use ruleslang_parser::{SourceError, SourceResult, Span, Token, TokenKind};

use crate::sem::reduce::fold;
use crate::sem::tree::{
    BinaryOp, CompareOp, FieldSelector, LogicalOp, SemExpr, SemExprKind,
};
use crate::types::{
    convertible_to, join, lift_literal, narrow_integer_literal, string_unit_type, StringEncoding,
    Type,
};

use super::Analyzer;

const MAX_RANGE_LENGTH: i128 = 65536;

impl Analyzer {
    pub(crate) fn analyze_expression(
        &mut self,
        expression: &Expression,
        expected: Option<&Type>,
    ) -> SourceResult<SemExpr> {
        let span = expression.span;
        match &expression.kind {
            ExpressionKind::BooleanLiteral(token) => {
                let TokenKind::BooleanLiteral(value) = token.kind else {
                    unreachable!()
                };
                Ok(SemExpr::new(
                    SemExprKind::BoolValue(value),
                    Type::BoolLiteral(value),
                    span,
                ))
            }
            ExpressionKind::SignedIntegerLiteral(token) => {
                let TokenKind::SignedIntegerLiteral(value) = token.kind else {
                    unreachable!()
                };
                Ok(SemExpr::new(
                    SemExprKind::SintValue(value),
                    Type::SintLiteral(value),
                    span,
                ))
            }
            ExpressionKind::UnsignedIntegerLiteral(token) => {
                let TokenKind::UnsignedIntegerLiteral(value) = token.kind else {
                    unreachable!()
                };
                Ok(SemExpr::new(
                    SemExprKind::UintValue(value),
                    Type::UintLiteral(value),
                    span,
                ))
            }
            ExpressionKind::FloatLiteral(token) => {
                let TokenKind::FloatLiteral(value) = token.kind else {
                    unreachable!()
                };
                Ok(SemExpr::new(
                    SemExprKind::FloatValue(value),
                    Type::FloatLiteral(value),
                    span,
                ))
            }
            ExpressionKind::StringLiteral(token) => {
                let TokenKind::StringLiteral(value) = &token.kind else {
                    unreachable!()
                };
                Ok(SemExpr::new(
                    SemExprKind::StringValue(StringEncoding::Utf8, value.clone()),
                    Type::StringLiteral(StringEncoding::Utf8, value.clone()),
                    span,
                ))
            }
            ExpressionKind::NullLiteral => {
                Ok(SemExpr::new(SemExprKind::NullValue, Type::NullLiteral, span))
            }
            ExpressionKind::Name(parts) => self.resolve_name(parts, span),
            ExpressionKind::ContextFieldAccess(name) => self.analyze_context_access(name, span),
            ExpressionKind::FieldAccess(object, name) => {
                let object = self.analyze_expression(object, None)?;
                self.member_access(object, name, span)
            }
            ExpressionKind::IndexAccess(object, index) => {
                self.analyze_index_access(object, index, span)
            }
            ExpressionKind::FunctionCall(callee, arguments) => {
                let (function, arguments) = self.resolve_call(callee, arguments, span)?;
                let Some(return_type) = self.functions()[function].return_type.clone() else {
                    return Err(SourceError::new(
                        "This function does not return a value",
                        span,
                    ));
                };
                Ok(SemExpr::new(
                    SemExprKind::Call {
                        function,
                        arguments,
                    },
                    return_type,
                    span,
                ))
            }
            ExpressionKind::Sign(operator, inner) => {
                let inner = self.analyze_expression(inner, expected)?;
                if !inner.ty.is_numeric() {
                    return Err(SourceError::new(
                        format!("Cannot apply '{}' to {}", operator.source, inner.ty),
                        span,
                    ));
                }
                if operator.is("+") {
                    return Ok(inner);
                }
                if matches!(
                    inner.ty,
                    Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64
                ) {
                    return Err(SourceError::new("Cannot negate an unsigned value", span));
                }
                let ty = inner.ty.clone();
                fold(SemExpr::new(SemExprKind::Negate(Box::new(inner)), ty, span))
            }
            ExpressionKind::LogicalNot(inner) => {
                let inner = self.analyze_expression(inner, Some(&Type::Bool))?;
                if !matches!(inner.ty, Type::Bool | Type::BoolLiteral(_)) {
                    return Err(SourceError::new(
                        format!("Cannot apply '!' to {}", inner.ty),
                        span,
                    ));
                }
                fold(SemExpr::new(
                    SemExprKind::LogicalNot(Box::new(inner)),
                    Type::Bool,
                    span,
                ))
            }
            ExpressionKind::BitwiseNot(inner) => {
                let inner = self.analyze_expression(inner, expected)?;
                if !inner.ty.is_integral() {
                    return Err(SourceError::new(
                        format!("Cannot apply '~' to {}", inner.ty),
                        span,
                    ));
                }
                let ty = inner.ty.clone();
                fold(SemExpr::new(
                    SemExprKind::BitwiseNot(Box::new(inner)),
                    ty,
                    span,
                ))
            }
            ExpressionKind::Exponent(left, right) => {
                self.analyze_arithmetic(BinaryOp::Power, left, right, span)
            }
            ExpressionKind::Multiply(left, operator, right) => {
                let op = match operator.source.as_str() {
                    "*" => BinaryOp::Multiply,
                    "/" => BinaryOp::Divide,
                    _ => BinaryOp::Remainder,
                };
                self.analyze_arithmetic(op, left, right, span)
            }
            ExpressionKind::Add(left, operator, right) => {
                let op = if operator.is("+") {
                    BinaryOp::Add
                } else {
                    BinaryOp::Subtract
                };
                self.analyze_arithmetic(op, left, right, span)
            }
            ExpressionKind::Shift(left, operator, right) => {
                let op = match operator.source.as_str() {
                    "<<" => BinaryOp::ShiftLeft,
                    ">>" => BinaryOp::ShiftRight,
                    _ => BinaryOp::ShiftRightLogical,
                };
                self.analyze_shift(op, left, right, span)
            }
            ExpressionKind::Infix(left, function, right) => {
                let arguments = [left.as_ref().clone(), right.as_ref().clone()];
                let (function, arguments) =
                    self.resolve_named_call(&function.source, function.span, &arguments)?;
                let Some(return_type) = self.functions()[function].return_type.clone() else {
                    return Err(SourceError::new(
                        "This function does not return a value",
                        span,
                    ));
                };
                Ok(SemExpr::new(
                    SemExprKind::Call {
                        function,
                        arguments,
                    },
                    return_type,
                    span,
                ))
            }
            ExpressionKind::Compare {
                operands,
                operators,
                type_compare,
            } => self.analyze_compare(operands, operators, type_compare.as_ref(), span),
            ExpressionKind::BitwiseAnd(left, right) => {
                self.analyze_bitwise(BinaryOp::BitAnd, left, right, span)
            }
            ExpressionKind::BitwiseXor(left, right) => {
                self.analyze_bitwise(BinaryOp::BitXor, left, right, span)
            }
            ExpressionKind::BitwiseOr(left, right) => {
                self.analyze_bitwise(BinaryOp::BitOr, left, right, span)
            }
            ExpressionKind::LogicalAnd(left, right) => {
                self.analyze_logical(LogicalOp::And, left, right, span)
            }
            ExpressionKind::LogicalXor(left, right) => {
                self.analyze_logical(LogicalOp::Xor, left, right, span)
            }
            ExpressionKind::LogicalOr(left, right) => {
                self.analyze_logical(LogicalOp::Or, left, right, span)
            }
            ExpressionKind::Concatenate(left, right) => self.analyze_concatenate(left, right, span),
            ExpressionKind::Range(from, to) => self.analyze_range(from, to, span),
            ExpressionKind::Conditional {
                condition,
                true_value,
                false_value,
            } => {
                let condition = self.analyze_expression(condition, Some(&Type::Bool))?;
                if !matches!(condition.ty, Type::Bool | Type::BoolLiteral(_)) {
                    return Err(SourceError::new(
                        format!("Condition must be bool, found {}", condition.ty),
                        condition.span,
                    ));
                }
                let true_value = self.analyze_expression(true_value, expected)?;
                let false_value = self.analyze_expression(false_value, expected)?;
                if let Type::BoolLiteral(chosen) = condition.ty {
                    return Ok(if chosen { true_value } else { false_value });
                }
                let ty = join(&true_value.ty, &false_value.ty).ok_or_else(|| {
                    SourceError::new(
                        format!(
                            "No common type for {} and {}",
                            true_value.ty, false_value.ty
                        ),
                        span,
                    )
                })?;
                let true_value = self.convert(true_value, &ty)?;
                let false_value = self.convert(false_value, &ty)?;
                Ok(SemExpr::new(
                    SemExprKind::Conditional {
                        condition: Box::new(condition),
                        true_value: Box::new(true_value),
                        false_value: Box::new(false_value),
                    },
                    ty,
                    span,
                ))
            }
            ExpressionKind::CompositeLiteral(values) => {
                self.analyze_composite(values, expected, span)
            }
            ExpressionKind::Initializer(named_type, values) => {
                let ty = self.resolve_named_type(named_type)?;
                self.analyze_composite(values, Some(&ty), span)
            }
        }
    }

    // ==================== Names and access ====================

    pub(crate) fn resolve_name(&mut self, parts: &[Token], span: Span) -> SourceResult<SemExpr> {
        let first = &parts[0];
        if let Some(variable) = self.context.lookup_variable(&first.source) {
            let mut value = if variable.ty.is_literal() {
                literal_value(&variable.ty, first.span)
            } else {
                SemExpr::new(
                    SemExprKind::SlotGet {
                        offset: variable.offset,
                    },
                    variable.ty.clone(),
                    first.span,
                )
            };
            for part in &parts[1..] {
                value = self.member_access(value, part, span)?;
            }
            return Ok(value);
        }

        let is_type = Type::atomic_by_name(&first.source).is_some()
            || self.context.lookup_type(&first.source).is_some();
        if is_type {
            // Static field lookup over a type name; evaluation of this is
            // not implemented.
            if parts.len() == 2 {
                return Ok(SemExpr::new(
                    SemExprKind::StaticFieldAccess {
                        type_name: first.source.clone(),
                        member: parts[1].source.clone(),
                    },
                    Type::Any,
                    span,
                ));
            }
            return Err(SourceError::with_offender(
                "Expected a value, found a type",
                &first.source,
                first.span,
            ));
        }

        if !self.context.lookup_functions(&first.source).is_empty() {
            return Err(SourceError::with_offender(
                "Expected a value, found a function",
                &first.source,
                first.span,
            ));
        }

        Err(SourceError::with_offender(
            "Unknown name",
            &first.source,
            first.span,
        ))
    }

    fn analyze_context_access(&mut self, name: &Token, span: Span) -> SourceResult<SemExpr> {
        if self.context.enclosing_function().is_some() {
            return Err(SourceError::new(
                "The rule input is not available inside functions",
                span,
            ));
        }
        let input_type = self.input_type().clone();
        let Type::Structure(members) = &input_type else {
            unreachable!("the input type is always a structure");
        };
        let Some((_, member)) = members.iter().find(|(n, _)| *n == name.source) else {
            return Err(SourceError::with_offender(
                "Unknown context field",
                &name.source,
                name.span,
            ));
        };
        let object = SemExpr::new(
            SemExprKind::SlotGet {
                offset: super::CONTEXT_SLOT,
            },
            input_type.clone(),
            span,
        );
        Ok(SemExpr::new(
            SemExprKind::FieldAccess {
                object: Box::new(object),
                selector: FieldSelector::Name(name.source.clone()),
            },
            member.clone(),
            span,
        ))
    }

    pub(crate) fn member_access(
        &mut self,
        object: SemExpr,
        name: &Token,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let Type::Structure(members) = &object.ty else {
            return Err(SourceError::with_offender(
                format!("No field '{}' on type {}", name.source, object.ty),
                &name.source,
                name.span,
            ));
        };
        let Some((_, member)) = members.iter().find(|(n, _)| *n == name.source) else {
            return Err(SourceError::with_offender(
                "Unknown field",
                &name.source,
                name.span,
            ));
        };
        let member = member.clone();
        Ok(SemExpr::new(
            SemExprKind::FieldAccess {
                object: Box::new(object),
                selector: FieldSelector::Name(name.source.clone()),
            },
            member,
            span,
        ))
    }

    fn analyze_index_access(
        &mut self,
        object: &Expression,
        index: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let object = self.analyze_expression(object, None)?;
        match object.ty.clone() {
            Type::Array { component, .. } => {
                let index = self.analyze_index(index)?;
                Ok(SemExpr::new(
                    SemExprKind::IndexAccess {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    *component,
                    span,
                ))
            }
            Type::StringLiteral(encoding, _) => {
                let index = self.analyze_index(index)?;
                Ok(SemExpr::new(
                    SemExprKind::IndexAccess {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    string_unit_type(encoding),
                    span,
                ))
            }
            Type::Tuple(members) => {
                let position = self.constant_index(index, members.len())?;
                Ok(SemExpr::new(
                    SemExprKind::FieldAccess {
                        object: Box::new(object),
                        selector: FieldSelector::Position(position),
                    },
                    members[position].clone(),
                    span,
                ))
            }
            Type::Structure(members) => {
                let position = self.constant_index(index, members.len())?;
                let (name, member) = members[position].clone();
                Ok(SemExpr::new(
                    SemExprKind::FieldAccess {
                        object: Box::new(object),
                        selector: FieldSelector::Name(name),
                    },
                    member,
                    span,
                ))
            }
            other => Err(SourceError::new(
                format!("Cannot index a value of type {}", other),
                span,
            )),
        }
    }

    /// An array or string index: any integral value, literals defaulting
    /// to sint64.
    pub(crate) fn analyze_index(&mut self, index: &Expression) -> SourceResult<SemExpr> {
        let index = self.analyze_expression(index, Some(&Type::Sint64))?;
        if !index.ty.is_integral() {
            return Err(SourceError::new(
                format!("Index must be an integer, found {}", index.ty),
                index.span,
            ));
        }
        if index.ty.is_literal() {
            let lifted = lift_literal_int(&index.ty);
            return Ok(retype(index, lifted));
        }
        Ok(index)
    }

    /// A tuple or structure index must be known statically.
    pub(crate) fn constant_index(
        &mut self,
        index: &Expression,
        length: usize,
    ) -> SourceResult<usize> {
        let index = self.analyze_expression(index, None)?;
        let value = match index.ty {
            Type::SintLiteral(v) if v >= 0 => v as u64,
            Type::UintLiteral(v) => v,
            _ => {
                return Err(SourceError::new(
                    "Tuple and structure indices must be constant integers",
                    index.span,
                ));
            }
        };
        if value as usize >= length {
            return Err(SourceError::new(
                format!("Index {} out of bounds for {} members", value, length),
                index.span,
            ));
        }
        Ok(value as usize)
    }

    // ==================== Calls ====================

    pub(crate) fn resolve_call(
        &mut self,
        callee: &Expression,
        arguments: &[Expression],
        _span: Span,
    ) -> SourceResult<(usize, Vec<SemExpr>)> {
        let ExpressionKind::Name(parts) = &callee.kind else {
            return Err(SourceError::new("Expected a function name", callee.span));
        };
        if parts.len() != 1 {
            return Err(SourceError::with_offender(
                "Unknown function",
                parts
                    .iter()
                    .map(|p| p.source.as_str())
                    .collect::<Vec<_>>()
                    .join("."),
                callee.span,
            ));
        }
        self.resolve_named_call(&parts[0].source, parts[0].span, arguments)
    }

    /// Overload resolution: the best-fit signature by pointwise
    /// specificity; ambiguity is an error.
    pub(crate) fn resolve_named_call(
        &mut self,
        name: &str,
        name_span: Span,
        arguments: &[Expression],
    ) -> SourceResult<(usize, Vec<SemExpr>)> {
        let candidates = self.context.lookup_functions(name);
        if candidates.is_empty() {
            return Err(SourceError::with_offender(
                "Unknown function",
                name,
                name_span,
            ));
        }

        let arguments = arguments
            .iter()
            .map(|a| self.analyze_expression(a, None))
            .collect::<SourceResult<Vec<_>>>()?;

        let viable: Vec<usize> = candidates
            .into_iter()
            .filter(|id| {
                let function = &self.functions()[*id];
                function.parameters.len() == arguments.len()
                    && function
                        .parameters
                        .iter()
                        .zip(&arguments)
                        .all(|((_, parameter), argument)| convertible_to(&argument.ty, parameter))
            })
            .collect();
        if viable.is_empty() {
            return Err(SourceError::with_offender(
                "No matching call",
                name,
                name_span,
            ));
        }

        let at_least_as_specific = |a: usize, b: usize| {
            self.functions()[a]
                .parameters
                .iter()
                .zip(&self.functions()[b].parameters)
                .all(|((_, pa), (_, pb))| convertible_to(pa, pb))
        };
        let best: Vec<usize> = viable
            .iter()
            .copied()
            .filter(|a| viable.iter().all(|b| at_least_as_specific(*a, *b)))
            .collect();
        // No unique minimum: either no candidate is at least as specific
        // as all others, or several are mutually convertible (distinct
        // types can be `<:` each other, e.g. reordered structures).
        if best.len() != 1 {
            return Err(SourceError::with_offender(
                "Ambiguous call",
                name,
                name_span,
            ));
        }
        let function = best[0];

        let parameters: Vec<Type> = self.functions()[function]
            .parameters
            .iter()
            .map(|(_, t)| t.clone())
            .collect();
        let arguments = arguments
            .into_iter()
            .zip(&parameters)
            .map(|(argument, parameter)| self.convert(argument, parameter))
            .collect::<SourceResult<Vec<_>>>()?;
        Ok((function, arguments))
    }

    // ==================== Operators ====================

    fn analyze_arithmetic(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let left = self.analyze_expression(left, None)?;
        let right = self.analyze_expression(right, None)?;
        for operand in [&left, &right] {
            if !operand.ty.is_numeric() {
                return Err(SourceError::new(
                    format!("Arithmetic needs numeric operands, found {}", operand.ty),
                    operand.span,
                ));
            }
        }
        if left.ty.is_literal() && right.ty.is_literal() {
            return fold(SemExpr::new(
                SemExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Type::Fp64,
                span,
            ));
        }
        let left = narrow_toward(left, &right.ty);
        let right = narrow_toward(right, &left.ty);
        let ty = join(&left.ty, &right.ty).ok_or_else(|| {
            SourceError::new(
                format!("No common type for {} and {}", left.ty, right.ty),
                span,
            )
        })?;
        let left = self.convert(left, &ty)?;
        let right = self.convert(right, &ty)?;
        Ok(SemExpr::new(
            SemExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn analyze_shift(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let left = self.analyze_expression(left, None)?;
        let right = self.analyze_expression(right, None)?;
        for operand in [&left, &right] {
            if !operand.ty.is_integral() {
                return Err(SourceError::new(
                    format!("Shifts need integer operands, found {}", operand.ty),
                    operand.span,
                ));
            }
        }
        if left.ty.is_literal() && right.ty.is_literal() {
            return fold(SemExpr::new(
                SemExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Type::Sint64,
                span,
            ));
        }
        let left = if left.ty.is_literal() {
            let lifted = lift_literal_int(&left.ty);
            retype(left, lifted)
        } else {
            left
        };
        let right = if right.ty.is_literal() {
            retype(right, Type::Sint64)
        } else {
            right
        };
        // The result takes the left operand's type.
        let ty = left.ty.clone();
        Ok(SemExpr::new(
            SemExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn analyze_bitwise(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let left = self.analyze_expression(left, None)?;
        let right = self.analyze_expression(right, None)?;
        for operand in [&left, &right] {
            if !operand.ty.is_integral() {
                return Err(SourceError::new(
                    format!(
                        "Bitwise operators need integer operands, found {}",
                        operand.ty
                    ),
                    operand.span,
                ));
            }
        }
        if left.ty.is_literal() && right.ty.is_literal() {
            return fold(SemExpr::new(
                SemExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Type::Sint64,
                span,
            ));
        }
        let left = narrow_toward(left, &right.ty);
        let right = narrow_toward(right, &left.ty);
        let ty = join(&left.ty, &right.ty).ok_or_else(|| {
            SourceError::new(
                format!("No common type for {} and {}", left.ty, right.ty),
                span,
            )
        })?;
        let left = self.convert(left, &ty)?;
        let right = self.convert(right, &ty)?;
        Ok(SemExpr::new(
            SemExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn analyze_logical(
        &mut self,
        op: LogicalOp,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let left = self.analyze_expression(left, Some(&Type::Bool))?;
        let right = self.analyze_expression(right, Some(&Type::Bool))?;
        for operand in [&left, &right] {
            if !matches!(operand.ty, Type::Bool | Type::BoolLiteral(_)) {
                return Err(SourceError::new(
                    format!("Logical operators need bool operands, found {}", operand.ty),
                    operand.span,
                ));
            }
        }
        fold(SemExpr::new(
            SemExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::Bool,
            span,
        ))
    }

    fn analyze_compare(
        &mut self,
        operands: &[Expression],
        operators: &[Token],
        type_compare: Option<&(Token, NamedType)>,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let mut sem_operands = operands
            .iter()
            .map(|o| self.analyze_expression(o, None))
            .collect::<SourceResult<Vec<_>>>()?;
        let ops: Vec<CompareOp> = operators
            .iter()
            .map(|o| CompareOp::from_source(&o.source).expect("value compare operator"))
            .collect();

        let mut chain: Option<SemExpr> = None;
        if !ops.is_empty() {
            // One common type for the whole chain.
            let mut common = sem_operands[0].ty.clone();
            for operand in &sem_operands[1..] {
                common = join(&common, &operand.ty).ok_or_else(|| {
                    SourceError::new(
                        format!("Cannot compare {} and {}", common, operand.ty),
                        operand.span,
                    )
                })?;
            }
            if ops.iter().any(|o| o.is_ordering()) && !common.is_numeric() {
                return Err(SourceError::new(
                    format!("Cannot order values of type {}", common),
                    span,
                ));
            }
            let identity_on_references =
                ops.iter().any(|o| o.is_identity()) && common.is_reference();
            if identity_on_references {
                let all_equal = sem_operands.iter().all(|o| o.ty == sem_operands[0].ty);
                if !all_equal {
                    return Err(SourceError::new(
                        "Identity comparison needs operands of one type",
                        span,
                    ));
                }
            } else {
                sem_operands = sem_operands
                    .into_iter()
                    .map(|o| self.convert(o, &common))
                    .collect::<SourceResult<Vec<_>>>()?;
            }
            chain = Some(fold(SemExpr::new(
                SemExprKind::CompareChain {
                    operands: sem_operands.clone(),
                    operators: ops,
                },
                Type::Bool,
                span,
            ))?);
        }

        let type_check = match type_compare {
            None => None,
            Some((operator, target)) => {
                let target = self.resolve_named_type(target)?;
                let value = if chain.is_some() {
                    // The chain already evaluates every operand; the type
                    // comparison contributes only its constant result.
                    None
                } else {
                    Some(sem_operands.remove(0))
                };
                let subject_ty = match &value {
                    Some(value) => value.ty.clone(),
                    None => sem_operands
                        .last()
                        .map(|o| o.ty.clone())
                        .unwrap_or(Type::Any),
                };
                let subject = lift_literal(&subject_ty);
                let result = type_compare_result(&operator.source, &subject, &target);
                Some((value, result))
            }
        };

        match (chain, type_check) {
            (Some(chain), None) => Ok(chain),
            (None, Some((Some(value), result))) => fold(SemExpr::new(
                SemExprKind::TypeCheck {
                    value: Box::new(value),
                    result,
                },
                Type::Bool,
                span,
            )),
            (Some(chain), Some((_, result))) => fold(SemExpr::new(
                SemExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(chain),
                    right: Box::new(SemExpr::new(
                        SemExprKind::BoolValue(result),
                        Type::BoolLiteral(result),
                        span,
                    )),
                },
                Type::Bool,
                span,
            )),
            _ => unreachable!("a compare node has operators or a type comparison"),
        }
    }

    fn analyze_concatenate(
        &mut self,
        left: &Expression,
        right: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let left = self.analyze_expression(left, None)?;
        let right = self.analyze_expression(right, None)?;
        if left.ty.is_literal() && right.ty.is_literal() {
            if let (Type::StringLiteral(..), Type::StringLiteral(..)) = (&left.ty, &right.ty) {
                return fold(SemExpr::new(
                    SemExprKind::Concatenate {
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    Type::Any,
                    span,
                ));
            }
        }
        let left = as_array_value(left, span)?;
        let right = as_array_value(right, span)?;
        let (Type::Array {
            component: left_component,
            size: left_size,
        }, Type::Array {
            component: right_component,
            size: right_size,
        }) = (left.ty.clone(), right.ty.clone())
        else {
            unreachable!()
        };
        let component = join(&left_component, &right_component).ok_or_else(|| {
            SourceError::new(
                format!(
                    "No common component type for {} and {}",
                    left_component, right_component
                ),
                span,
            )
        })?;
        let size = match (left_size, right_size) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        let left = self.convert(
            left,
            &Type::Array {
                component: Box::new(component.clone()),
                size: left_size,
            },
        )?;
        let right = self.convert(
            right,
            &Type::Array {
                component: Box::new(component.clone()),
                size: right_size,
            },
        )?;
        Ok(SemExpr::new(
            SemExprKind::Concatenate {
                left: Box::new(left),
                right: Box::new(right),
            },
            Type::Array {
                component: Box::new(component),
                size,
            },
            span,
        ))
    }

    /// Both bounds must reduce to integer literals; the range becomes a
    /// sint64 array literal with an exclusive upper bound.
    fn analyze_range(
        &mut self,
        from: &Expression,
        to: &Expression,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let from = self.analyze_expression(from, None)?;
        let to = self.analyze_expression(to, None)?;
        let bounds: Vec<i128> = [&from, &to]
            .iter()
            .map(|bound| match bound.ty {
                Type::SintLiteral(v) => Ok(v as i128),
                Type::UintLiteral(v) => Ok(v as i128),
                _ => Err(SourceError::new(
                    "Range bounds must be constant integers",
                    bound.span,
                )),
            })
            .collect::<SourceResult<_>>()?;
        let length = (bounds[1] - bounds[0]).max(0);
        if length > MAX_RANGE_LENGTH {
            return Err(SourceError::new("Range too large", span));
        }
        let values = (0..length)
            .map(|i| {
                let value = (bounds[0] + i) as i64;
                (
                    i as u64,
                    SemExpr::new(SemExprKind::SintValue(value), Type::Sint64, span),
                )
            })
            .collect();
        Ok(SemExpr::new(
            SemExprKind::ArrayLiteral {
                length: length as u64,
                values,
                other: None,
            },
            Type::Array {
                component: Box::new(Type::Sint64),
                size: Some(length as u64),
            },
            span,
        ))
    }

    // ==================== Composite literals ====================

    fn analyze_composite(
        &mut self,
        values: &[LabeledExpression],
        expected: Option<&Type>,
        span: Span,
    ) -> SourceResult<SemExpr> {
        match expected {
            Some(Type::Array { component, size }) => {
                self.analyze_array_literal(values, component, *size, span)
            }
            Some(Type::Tuple(members)) => self.analyze_tuple_literal(values, members, span),
            Some(Type::Structure(members)) => {
                self.analyze_struct_literal(values, members, span)
            }
            Some(Type::Any) | None => self.infer_composite(values, span),
            Some(other) => Err(SourceError::new(
                format!("Cannot build a composite value of type {}", other),
                span,
            )),
        }
    }

    fn analyze_array_literal(
        &mut self,
        values: &[LabeledExpression],
        component: &Type,
        size: Option<u64>,
        span: Span,
    ) -> SourceResult<SemExpr> {
        let mut out = Vec::new();
        let mut other = None;
        let mut next_index = 0u64;
        for labeled in values {
            let index = match &labeled.label {
                None => {
                    let index = next_index;
                    next_index += 1;
                    Some(index)
                }
                Some(label) if label.is_identifier() && label.is("other") => None,
                Some(label) if label.is_identifier() => {
                    return Err(SourceError::with_offender(
                        "Array labels must be indices or 'other'",
                        &label.source,
                        label.span,
                    ));
                }
                Some(label) => {
                    let index = match label.kind {
                        TokenKind::SignedIntegerLiteral(v) if v >= 0 => v as u64,
                        TokenKind::UnsignedIntegerLiteral(v) => v,
                        _ => {
                            return Err(SourceError::with_offender(
                                "Array labels must be indices or 'other'",
                                &label.source,
                                label.span,
                            ));
                        }
                    };
                    next_index = index + 1;
                    Some(index)
                }
            };
            let value = self.analyze_expression(&labeled.value, Some(component))?;
            let value = self.convert(value, component)?;
            match index {
                Some(index) => {
                    if out.iter().any(|(i, _)| *i == index) {
                        return Err(SourceError::new(
                            format!("Index {} provided twice", index),
                            labeled.value.span,
                        ));
                    }
                    out.push((index, value));
                }
                None => {
                    if other.is_some() {
                        return Err(SourceError::new(
                            "The 'other' value is provided twice",
                            labeled.value.span,
                        ));
                    }
                    other = Some(Box::new(value));
                }
            }
        }
        let length = size.unwrap_or(next_index);
        for (index, value) in &out {
            if *index >= length {
                return Err(SourceError::new(
                    format!("Index {} out of bounds for length {}", index, length),
                    value.span,
                ));
            }
        }
        Ok(SemExpr::new(
            SemExprKind::ArrayLiteral {
                length,
                values: out,
                other,
            },
            Type::Array {
                component: Box::new(component.clone()),
                size: Some(length),
            },
            span,
        ))
    }

    fn analyze_tuple_literal(
        &mut self,
        values: &[LabeledExpression],
        members: &[Type],
        span: Span,
    ) -> SourceResult<SemExpr> {
        if let Some(labeled) = values.iter().find(|v| v.label.is_some()) {
            return Err(SourceError::new(
                "Tuple values cannot be labeled",
                labeled.value.span,
            ));
        }
        if values.len() != members.len() {
            return Err(SourceError::new(
                format!("Expected {} values, found {}", members.len(), values.len()),
                span,
            ));
        }
        let out = values
            .iter()
            .zip(members)
            .map(|(labeled, member)| {
                let value = self.analyze_expression(&labeled.value, Some(member))?;
                self.convert(value, member)
            })
            .collect::<SourceResult<Vec<_>>>()?;
        Ok(SemExpr::new(
            SemExprKind::TupleLiteral(out),
            Type::Tuple(members.to_vec()),
            span,
        ))
    }

    fn analyze_struct_literal(
        &mut self,
        values: &[LabeledExpression],
        members: &[(String, Type)],
        span: Span,
    ) -> SourceResult<SemExpr> {
        let mut slots: Vec<Option<SemExpr>> = vec![None; members.len()];
        let mut position = 0usize;
        for labeled in values {
            let index = match &labeled.label {
                Some(label) if label.is_identifier() => {
                    let Some(index) = members.iter().position(|(n, _)| *n == label.source)
                    else {
                        return Err(SourceError::with_offender(
                            "Unknown field",
                            &label.source,
                            label.span,
                        ));
                    };
                    position = index + 1;
                    index
                }
                Some(label) => {
                    return Err(SourceError::with_offender(
                        "Structure labels must be field names",
                        &label.source,
                        label.span,
                    ));
                }
                None => {
                    if position >= members.len() {
                        return Err(SourceError::new(
                            format!("Expected at most {} values", members.len()),
                            labeled.value.span,
                        ));
                    }
                    let index = position;
                    position += 1;
                    index
                }
            };
            if slots[index].is_some() {
                return Err(SourceError::new(
                    format!("Field '{}' provided twice", members[index].0),
                    labeled.value.span,
                ));
            }
            let member = &members[index].1;
            let value = self.analyze_expression(&labeled.value, Some(member))?;
            slots[index] = Some(self.convert(value, member)?);
        }
        Ok(SemExpr::new(
            SemExprKind::StructLiteral(slots),
            Type::Structure(members.to_vec()),
            span,
        ))
    }

    /// A composite literal without a target type: all-labeled means a
    /// structure, unlabeled means a tuple.
    fn infer_composite(
        &mut self,
        values: &[LabeledExpression],
        span: Span,
    ) -> SourceResult<SemExpr> {
        let labeled = values.iter().filter(|v| v.label.is_some()).count();
        if labeled == values.len() && !values.is_empty() {
            let mut members = Vec::new();
            let mut out = Vec::new();
            for labeled in values {
                let label = labeled.label.as_ref().unwrap();
                if !label.is_identifier() || label.is("other") {
                    return Err(SourceError::new(
                        "Cannot infer the type of this composite literal",
                        span,
                    ));
                }
                if members.iter().any(|(n, _): &(String, Type)| *n == label.source) {
                    return Err(SourceError::with_offender(
                        "Field provided twice",
                        &label.source,
                        label.span,
                    ));
                }
                let value = self.analyze_expression(&labeled.value, None)?;
                let member = lift_literal(&value.ty);
                let value = self.convert(value, &member)?;
                members.push((label.source.clone(), member));
                out.push(Some(value));
            }
            return Ok(SemExpr::new(
                SemExprKind::StructLiteral(out),
                Type::Structure(members),
                span,
            ));
        }
        if labeled == 0 {
            let mut members = Vec::new();
            let mut out = Vec::new();
            for labeled in values {
                let value = self.analyze_expression(&labeled.value, None)?;
                let member = lift_literal(&value.ty);
                let value = self.convert(value, &member)?;
                members.push(member);
                out.push(value);
            }
            return Ok(SemExpr::new(
                SemExprKind::TupleLiteral(out),
                Type::Tuple(members),
                span,
            ));
        }
        Err(SourceError::new(
            "Cannot infer the type of this composite literal",
            span,
        ))
    }

    // ==================== Conversion ====================

    /// Convert `value` to `target`, inserting an explicit conversion node
    /// where the representation changes. Literal-typed nodes retype in
    /// place and materialize directly as the target.
    pub(crate) fn convert(&mut self, value: SemExpr, target: &Type) -> SourceResult<SemExpr> {
        if &value.ty == target {
            return Ok(value);
        }
        if !convertible_to(&value.ty, target) {
            return Err(SourceError::new(
                format!("Cannot convert {} to {}", value.ty, target),
                value.span,
            ));
        }
        if value.ty.is_literal() {
            return Ok(retype(value, target.clone()));
        }
        let span = value.span;
        Ok(SemExpr::new(
            SemExprKind::Convert {
                value: Box::new(value),
            },
            target.clone(),
            span,
        ))
    }
}

/// Narrow a literal operand toward the other side's atomic type.
fn narrow_toward(value: SemExpr, other: &Type) -> SemExpr {
    if !value.ty.is_literal() {
        return value;
    }
    match value.ty {
        Type::SintLiteral(_) | Type::UintLiteral(_) => {
            let narrowed = narrow_integer_literal(&value.ty, other);
            retype(value, narrowed)
        }
        Type::FloatLiteral(v) => {
            let target = if matches!(other, Type::Fp32) && (v as f32).is_finite() {
                Type::Fp32
            } else {
                Type::Fp64
            };
            retype(value, target)
        }
        _ => value,
    }
}

fn retype(mut value: SemExpr, ty: Type) -> SemExpr {
    value.ty = ty;
    value
}

fn lift_literal_int(ty: &Type) -> Type {
    match ty {
        Type::UintLiteral(_) => Type::Uint64,
        _ => Type::Sint64,
    }
}

/// Rebuild a literal-typed variable use as a literal node.
fn literal_value(ty: &Type, span: Span) -> SemExpr {
    match ty {
        Type::BoolLiteral(v) => SemExpr::new(SemExprKind::BoolValue(*v), ty.clone(), span),
        Type::SintLiteral(v) => SemExpr::new(SemExprKind::SintValue(*v), ty.clone(), span),
        Type::UintLiteral(v) => SemExpr::new(SemExprKind::UintValue(*v), ty.clone(), span),
        Type::FloatLiteral(v) => SemExpr::new(SemExprKind::FloatValue(*v), ty.clone(), span),
        Type::StringLiteral(encoding, value) => SemExpr::new(
            SemExprKind::StringValue(*encoding, value.clone()),
            ty.clone(),
            span,
        ),
        Type::NullLiteral => SemExpr::new(SemExprKind::NullValue, ty.clone(), span),
        _ => unreachable!("not a literal type"),
    }
}

/// View a value as an array for concatenation: string literals lift to
/// their code-unit arrays.
fn as_array_value(value: SemExpr, span: Span) -> SourceResult<SemExpr> {
    match &value.ty {
        Type::Array { .. } => Ok(value),
        Type::StringLiteral(..) => {
            let lifted = lift_literal(&value.ty);
            Ok(retype(value, lifted))
        }
        other => Err(SourceError::new(
            format!("Cannot concatenate a value of type {}", other),
            span,
        )),
    }
}

fn type_compare_result(operator: &str, subject: &Type, target: &Type) -> bool {
    match operator {
        "::" => subject == target,
        "!:" => subject != target,
        "<:" => convertible_to(subject, target),
        ">:" => convertible_to(target, subject),
        "<<:" => convertible_to(subject, target) && subject != target,
        ">>:" => convertible_to(target, subject) && subject != target,
        "<:>" => convertible_to(subject, target) || convertible_to(target, subject),
        _ => unreachable!("unknown type compare operator '{}'", operator),
    }
}
