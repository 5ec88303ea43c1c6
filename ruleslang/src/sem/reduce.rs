//! Literal reduction.
//!
//! Folds pure subtrees whose operands are literal-typed into literal
//! nodes. The analyzer folds each node as it is built so literal types
//! keep flowing upward (`let t = 1 + 1` binds the literal type 2);
//! [`reduce`] re-applies the fold bottom-up over a whole tree and is
//! idempotent. Arithmetic overflow here is a semantic error.

use ruleslang_parser::{SourceError, SourceResult, Span};

use crate::types::Type;

use super::tree::{BinaryOp, CompareOp, LogicalOp, SemExpr, SemExprKind};

/// Reduce a whole expression bottom-up. Running it twice yields the same
/// tree.
pub fn reduce(expr: SemExpr) -> SourceResult<SemExpr> {
    let SemExpr { kind, ty, span } = expr;
    let kind = match kind {
        SemExprKind::TupleLiteral(values) => SemExprKind::TupleLiteral(
            values.into_iter().map(reduce).collect::<SourceResult<_>>()?,
        ),
        SemExprKind::StructLiteral(values) => SemExprKind::StructLiteral(
            values
                .into_iter()
                .map(|v| v.map(reduce).transpose())
                .collect::<SourceResult<_>>()?,
        ),
        SemExprKind::ArrayLiteral {
            length,
            values,
            other,
        } => SemExprKind::ArrayLiteral {
            length,
            values: values
                .into_iter()
                .map(|(i, v)| Ok((i, reduce(v)?)))
                .collect::<SourceResult<_>>()?,
            other: match other {
                Some(other) => Some(Box::new(reduce(*other)?)),
                None => None,
            },
        },
        SemExprKind::FieldAccess { object, selector } => SemExprKind::FieldAccess {
            object: Box::new(reduce(*object)?),
            selector,
        },
        SemExprKind::IndexAccess { object, index } => SemExprKind::IndexAccess {
            object: Box::new(reduce(*object)?),
            index: Box::new(reduce(*index)?),
        },
        SemExprKind::Call {
            function,
            arguments,
        } => SemExprKind::Call {
            function,
            arguments: arguments
                .into_iter()
                .map(reduce)
                .collect::<SourceResult<_>>()?,
        },
        SemExprKind::Convert { value } => SemExprKind::Convert {
            value: Box::new(reduce(*value)?),
        },
        SemExprKind::Negate(value) => SemExprKind::Negate(Box::new(reduce(*value)?)),
        SemExprKind::LogicalNot(value) => SemExprKind::LogicalNot(Box::new(reduce(*value)?)),
        SemExprKind::BitwiseNot(value) => SemExprKind::BitwiseNot(Box::new(reduce(*value)?)),
        SemExprKind::Binary { op, left, right } => SemExprKind::Binary {
            op,
            left: Box::new(reduce(*left)?),
            right: Box::new(reduce(*right)?),
        },
        SemExprKind::CompareChain {
            operands,
            operators,
        } => SemExprKind::CompareChain {
            operands: operands
                .into_iter()
                .map(reduce)
                .collect::<SourceResult<_>>()?,
            operators,
        },
        SemExprKind::TypeCheck { value, result } => SemExprKind::TypeCheck {
            value: Box::new(reduce(*value)?),
            result,
        },
        SemExprKind::Logical { op, left, right } => SemExprKind::Logical {
            op,
            left: Box::new(reduce(*left)?),
            right: Box::new(reduce(*right)?),
        },
        SemExprKind::Conditional {
            condition,
            true_value,
            false_value,
        } => SemExprKind::Conditional {
            condition: Box::new(reduce(*condition)?),
            true_value: Box::new(reduce(*true_value)?),
            false_value: Box::new(reduce(*false_value)?),
        },
        SemExprKind::Concatenate { left, right } => SemExprKind::Concatenate {
            left: Box::new(reduce(*left)?),
            right: Box::new(reduce(*right)?),
        },
        other => other,
    };
    fold(SemExpr::new(kind, ty, span))
}

/// Fold one node whose children are already reduced. Non-foldable nodes
/// pass through unchanged.
pub fn fold(expr: SemExpr) -> SourceResult<SemExpr> {
    let span = expr.span;
    match &expr.kind {
        SemExprKind::Negate(value) => {
            if let Some(v) = literal_int(value) {
                return int_literal(-v, span);
            }
            if let Some(v) = literal_float(value) {
                return Ok(float_literal(-v, span));
            }
            Ok(expr)
        }
        SemExprKind::LogicalNot(value) => match literal_bool(value) {
            Some(v) => Ok(bool_literal(!v, span)),
            None => Ok(expr),
        },
        SemExprKind::BitwiseNot(value) => match &value.ty {
            Type::SintLiteral(v) => int_literal(!(*v as i128), span),
            Type::UintLiteral(v) => Ok(SemExpr::new(
                SemExprKind::UintValue(!v),
                Type::UintLiteral(!v),
                span,
            )),
            _ => Ok(expr),
        },
        SemExprKind::Binary { op, left, right } => fold_binary(expr.clone(), *op, left, right),
        SemExprKind::CompareChain {
            operands,
            operators,
        } => fold_compare(expr.clone(), operands, operators),
        SemExprKind::Logical { op, left, right } => {
            match (*op, literal_bool(left), literal_bool(right)) {
                (LogicalOp::And, Some(false), _) => Ok(bool_literal(false, span)),
                (LogicalOp::And, Some(true), _) => Ok(right.as_ref().clone()),
                (LogicalOp::Or, Some(true), _) => Ok(bool_literal(true, span)),
                (LogicalOp::Or, Some(false), _) => Ok(right.as_ref().clone()),
                (LogicalOp::Xor, Some(a), Some(b)) => Ok(bool_literal(a != b, span)),
                _ => Ok(expr),
            }
        }
        SemExprKind::Conditional {
            condition,
            true_value,
            false_value,
        } => match literal_bool(condition) {
            Some(true) => Ok(true_value.as_ref().clone()),
            Some(false) => Ok(false_value.as_ref().clone()),
            None => Ok(expr),
        },
        SemExprKind::Concatenate { left, right } => {
            if let (
                SemExprKind::StringValue(encoding, left_value),
                SemExprKind::StringValue(_, right_value),
            ) = (&left.kind, &right.kind)
            {
                if left.is_literal_value() && right.is_literal_value() {
                    let mut value = left_value.clone();
                    value.extend_from_slice(right_value);
                    return Ok(SemExpr::new(
                        SemExprKind::StringValue(*encoding, value.clone()),
                        Type::StringLiteral(*encoding, value),
                        span,
                    ));
                }
            }
            Ok(expr)
        }
        SemExprKind::TypeCheck { value, result } => {
            if value.is_literal_value() {
                return Ok(bool_literal(*result, span));
            }
            Ok(expr)
        }
        _ => Ok(expr),
    }
}

fn fold_binary(
    expr: SemExpr,
    op: BinaryOp,
    left: &SemExpr,
    right: &SemExpr,
) -> SourceResult<SemExpr> {
    let span = expr.span;
    if let (Some(a), Some(b)) = (literal_int(left), literal_int(right)) {
        return fold_integer_binary(op, a, b, span);
    }
    let float_pair = match (literal_number(left), literal_number(right)) {
        (Some(a), Some(b)) if left.ty.is_float() || right.ty.is_float() => Some((a, b)),
        _ => None,
    };
    if let Some((a, b)) = float_pair {
        let value = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Remainder => a % b,
            BinaryOp::Power => a.powf(b),
            _ => return Ok(expr),
        };
        if value.is_infinite() {
            return Err(SourceError::new(
                "Arithmetic overflow in constant expression",
                span,
            ));
        }
        return Ok(float_literal(value, span));
    }
    Ok(expr)
}

fn fold_integer_binary(op: BinaryOp, a: i128, b: i128, span: Span) -> SourceResult<SemExpr> {
    let overflow = || SourceError::new("Arithmetic overflow in constant expression", span);
    let value = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Subtract => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Multiply => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Divide => {
            if b == 0 {
                return Err(SourceError::new(
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a / b
        }
        BinaryOp::Remainder => {
            if b == 0 {
                return Err(SourceError::new(
                    "Division by zero in constant expression",
                    span,
                ));
            }
            a % b
        }
        BinaryOp::Power => {
            if b < 0 {
                return Err(SourceError::new(
                    "Negative exponent in constant expression",
                    span,
                ));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).ok_or_else(overflow)?
        }
        BinaryOp::ShiftLeft => {
            let amount = shift_amount(b, span)?;
            a.checked_shl(amount).ok_or_else(overflow)?
        }
        BinaryOp::ShiftRight => {
            let amount = shift_amount(b, span)?;
            a >> amount
        }
        BinaryOp::ShiftRightLogical => {
            let amount = shift_amount(b, span)?;
            ((a as i64 as u64) >> amount) as i128
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            let (x, y) = (a as i64 as u64, b as i64 as u64);
            let bits = match op {
                BinaryOp::BitAnd => x & y,
                BinaryOp::BitOr => x | y,
                _ => x ^ y,
            };
            // Both operands in the signed class keep a signed result.
            if a <= i64::MAX as i128 && b <= i64::MAX as i128 {
                bits as i64 as i128
            } else {
                bits as i128
            }
        }
    };
    int_literal(value, span)
}

fn shift_amount(b: i128, span: Span) -> SourceResult<u32> {
    if !(0..64).contains(&b) {
        return Err(SourceError::new(
            "Shift amount out of range in constant expression",
            span,
        ));
    }
    Ok(b as u32)
}

fn fold_compare(
    expr: SemExpr,
    operands: &[SemExpr],
    operators: &[CompareOp],
) -> SourceResult<SemExpr> {
    let span = expr.span;
    if !operands.iter().all(|o| o.is_literal_value()) {
        return Ok(expr);
    }
    let mut result = true;
    for (i, op) in operators.iter().enumerate() {
        let left = &operands[i];
        let right = &operands[i + 1];
        let link = if let (Some(a), Some(b)) = (literal_number(left), literal_number(right)) {
            match op {
                CompareOp::Equal | CompareOp::Identical => a == b,
                CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
                CompareOp::Less => a < b,
                CompareOp::LessEqual => a <= b,
                CompareOp::Greater => a > b,
                CompareOp::GreaterEqual => a >= b,
            }
        } else if let (Some(a), Some(b)) = (literal_bool(left), literal_bool(right)) {
            match op {
                CompareOp::Equal | CompareOp::Identical => a == b,
                CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
                _ => return Ok(expr),
            }
        } else if let (SemExprKind::StringValue(_, a), SemExprKind::StringValue(_, b)) =
            (&left.kind, &right.kind)
        {
            match op {
                CompareOp::Equal | CompareOp::Identical => a == b,
                CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
                _ => return Ok(expr),
            }
        } else {
            return Ok(expr);
        };
        if !link {
            result = false;
            break;
        }
    }
    Ok(bool_literal(result, span))
}

fn literal_int(expr: &SemExpr) -> Option<i128> {
    match expr.ty {
        Type::SintLiteral(v) => Some(v as i128),
        Type::UintLiteral(v) => Some(v as i128),
        _ => None,
    }
}

fn literal_float(expr: &SemExpr) -> Option<f64> {
    match expr.ty {
        Type::FloatLiteral(v) => Some(v),
        _ => None,
    }
}

/// Any numeric literal as a float, for mixed-literal folding.
fn literal_number(expr: &SemExpr) -> Option<f64> {
    literal_float(expr).or_else(|| literal_int(expr).map(|v| v as f64))
}

fn literal_bool(expr: &SemExpr) -> Option<bool> {
    match expr.ty {
        Type::BoolLiteral(v) => Some(v),
        _ => None,
    }
}

/// Build an integer literal node, preferring the signed class; values
/// above `i64::MAX` stay unsigned; values outside both are an overflow.
pub fn int_literal(value: i128, span: Span) -> SourceResult<SemExpr> {
    if let Ok(v) = i64::try_from(value) {
        return Ok(SemExpr::new(
            SemExprKind::SintValue(v),
            Type::SintLiteral(v),
            span,
        ));
    }
    if let Ok(v) = u64::try_from(value) {
        return Ok(SemExpr::new(
            SemExprKind::UintValue(v),
            Type::UintLiteral(v),
            span,
        ));
    }
    Err(SourceError::new(
        "Arithmetic overflow in constant expression",
        span,
    ))
}

pub fn float_literal(value: f64, span: Span) -> SemExpr {
    SemExpr::new(
        SemExprKind::FloatValue(value),
        Type::FloatLiteral(value),
        span,
    )
}

pub fn bool_literal(value: bool, span: Span) -> SemExpr {
    SemExpr::new(
        SemExprKind::BoolValue(value),
        Type::BoolLiteral(value),
        span,
    )
}
