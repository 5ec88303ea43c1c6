//! The conversion relation and join over the type lattice.

use super::layout::{string_unit_length, string_unit_type};
use super::{StringEncoding, Type};

/// Whether a value of type `a` implicitly converts to type `b`
/// (specific-to-general: `a <: b`).
pub fn convertible_to(a: &Type, b: &Type) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        // Same-signedness integers widen; unsigned fits the next signed up.
        _ if a.is_atomic() && b.is_atomic() => {
            if let (Some((a_signed, a_bits)), Some((b_signed, b_bits))) =
                (a.integer_width(), b.integer_width())
            {
                return match (a_signed, b_signed) {
                    (true, true) | (false, false) => a_bits <= b_bits,
                    (false, true) => a_bits < b_bits,
                    (true, false) => false,
                };
            }
            matches!((a, b), (Type::Fp32, Type::Fp64))
        }
        (Type::BoolLiteral(_), Type::Bool) => true,
        (Type::SintLiteral(v), _) => signed_fits(*v, b),
        (Type::UintLiteral(v), _) => unsigned_fits(*v, b),
        (Type::FloatLiteral(v), Type::Fp32) => (*v as f32).is_finite(),
        (Type::FloatLiteral(_), Type::Fp64) => true,
        (Type::StringLiteral(_, value), Type::StringLiteral(target_encoding, target_value)) => {
            value == target_value && encoding_represents(*target_encoding, value)
        }
        (Type::StringLiteral(_, value), Type::Array { component, size }) => {
            let Some(target_encoding) = encoding_of_unit(component) else {
                return false;
            };
            if !encoding_represents(target_encoding, value) {
                return false;
            }
            let length = string_unit_length(target_encoding, value) as u64;
            match size {
                Some(size) => *size == length,
                None => true,
            }
        }
        (Type::NullLiteral, t) if t.is_reference() => true,
        (
            Type::Array {
                component: a_component,
                size: a_size,
            },
            Type::Array {
                component: b_component,
                size: b_size,
            },
        ) => {
            convertible_to(a_component, b_component)
                && match b_size {
                    None => true,
                    Some(b_size) => *a_size == Some(*b_size),
                }
        }
        (Type::Tuple(a_members), Type::Tuple(b_members)) => {
            a_members.len() == b_members.len()
                && a_members
                    .iter()
                    .zip(b_members)
                    .all(|(am, bm)| convertible_to(am, bm))
        }
        // Target member names must be a subset of the source's, with
        // pointwise widening; names may be reordered.
        (Type::Structure(a_members), Type::Structure(b_members)) => {
            b_members.iter().all(|(name, b_member)| {
                a_members
                    .iter()
                    .any(|(a_name, a_member)| a_name == name && convertible_to(a_member, b_member))
            })
        }
        (t, Type::Any) => t.is_reference(),
        _ => false,
    }
}

fn signed_fits(v: i64, target: &Type) -> bool {
    match target {
        Type::Sint8 => i8::try_from(v).is_ok(),
        Type::Sint16 => i16::try_from(v).is_ok(),
        Type::Sint32 => i32::try_from(v).is_ok(),
        Type::Sint64 => true,
        Type::Uint8 => u8::try_from(v).is_ok(),
        Type::Uint16 => u16::try_from(v).is_ok(),
        Type::Uint32 => u32::try_from(v).is_ok(),
        Type::Uint64 => v >= 0,
        Type::Fp32 | Type::Fp64 => true,
        _ => false,
    }
}

fn unsigned_fits(v: u64, target: &Type) -> bool {
    match target {
        Type::Sint8 => i8::try_from(v).is_ok(),
        Type::Sint16 => i16::try_from(v).is_ok(),
        Type::Sint32 => i32::try_from(v).is_ok(),
        Type::Sint64 => i64::try_from(v).is_ok(),
        Type::Uint8 => u8::try_from(v).is_ok(),
        Type::Uint16 => u16::try_from(v).is_ok(),
        Type::Uint32 => u32::try_from(v).is_ok(),
        Type::Uint64 => true,
        Type::Fp32 | Type::Fp64 => true,
        _ => false,
    }
}

// Every supported encoding covers all Unicode scalar values (UTF-16 via
// surrogate pairs), so representability never fails today; the hook stays
// for encodings that cannot.
fn encoding_represents(_encoding: StringEncoding, _value: &[char]) -> bool {
    true
}

fn encoding_of_unit(component: &Type) -> Option<StringEncoding> {
    match component {
        Type::Uint8 => Some(StringEncoding::Utf8),
        Type::Uint16 => Some(StringEncoding::Utf16),
        Type::Uint32 => Some(StringEncoding::Utf32),
        _ => None,
    }
}

/// Lift a literal type to the general type its values materialize as.
pub fn lift_literal(t: &Type) -> Type {
    match t {
        Type::BoolLiteral(_) => Type::Bool,
        Type::SintLiteral(_) => Type::Sint64,
        Type::UintLiteral(_) => Type::Uint64,
        Type::FloatLiteral(_) => Type::Fp64,
        Type::StringLiteral(encoding, value) => Type::Array {
            component: Box::new(string_unit_type(*encoding)),
            size: Some(string_unit_length(*encoding, value) as u64),
        },
        other => other.clone(),
    }
}

/// Narrow an integer literal against the other operand of a binary
/// operator: the literal takes the other side's atomic type when it fits,
/// otherwise the smallest atomic that fits.
pub fn narrow_integer_literal(literal: &Type, other: &Type) -> Type {
    if !matches!(literal, Type::SintLiteral(_) | Type::UintLiteral(_)) {
        return literal.clone();
    }
    if other.is_atomic() && convertible_to(literal, other) {
        return other.clone();
    }
    let candidates = match literal {
        Type::SintLiteral(_) => [Type::Sint8, Type::Sint16, Type::Sint32, Type::Sint64],
        _ => [Type::Uint8, Type::Uint16, Type::Uint32, Type::Uint64],
    };
    for candidate in candidates {
        if convertible_to(literal, &candidate) {
            return candidate;
        }
    }
    lift_literal(literal)
}

/// Least upper bound of two types, or `None` when no common type exists.
pub fn join(a: &Type, b: &Type) -> Option<Type> {
    if a == b {
        return Some(a.clone());
    }
    if convertible_to(a, b) {
        return Some(b.clone());
    }
    if convertible_to(b, a) {
        return Some(a.clone());
    }

    // Literals lift toward the other operand before joining.
    if a.is_literal() && !matches!(a, Type::NullLiteral) {
        let lifted = if b.is_atomic() {
            narrow_integer_literal(a, b)
        } else {
            lift_literal(a)
        };
        if &lifted != a {
            return join(&lifted, b);
        }
    }
    if b.is_literal() && !matches!(b, Type::NullLiteral) {
        let lifted = if a.is_atomic() {
            narrow_integer_literal(b, a)
        } else {
            lift_literal(b)
        };
        if &lifted != b {
            return join(a, &lifted);
        }
    }

    match (a, b) {
        _ if a.is_atomic() && b.is_atomic() => {
            let (a_signed, a_bits) = a.integer_width()?;
            let (b_signed, b_bits) = b.integer_width()?;
            match (a_signed, b_signed) {
                // Same signedness is handled by convertible_to above;
                // mixed needs a signed type wider than the unsigned one.
                (false, true) => signed_wider_than(a_bits, b_bits),
                (true, false) => signed_wider_than(b_bits, a_bits),
                _ => None,
            }
        }
        (
            Type::Array {
                component: a_component,
                size: a_size,
            },
            Type::Array {
                component: b_component,
                size: b_size,
            },
        ) => {
            let component = join(a_component, b_component)?;
            let size = if a_size == b_size { *a_size } else { None };
            Some(Type::Array {
                component: Box::new(component),
                size,
            })
        }
        (Type::Tuple(a_members), Type::Tuple(b_members)) => {
            if a_members.len() != b_members.len() {
                return Some(Type::Any);
            }
            let members: Option<Vec<Type>> = a_members
                .iter()
                .zip(b_members)
                .map(|(am, bm)| join(am, bm))
                .collect();
            match members {
                Some(members) => Some(Type::Tuple(members)),
                None => Some(Type::Any),
            }
        }
        (Type::Structure(a_members), Type::Structure(b_members)) => {
            let mut members = Vec::new();
            for (name, a_member) in a_members {
                if let Some((_, b_member)) = b_members.iter().find(|(n, _)| n == name) {
                    if let Some(joined) = join(a_member, b_member) {
                        members.push((name.clone(), joined));
                    }
                }
            }
            Some(Type::Structure(members))
        }
        _ if a.is_reference() && b.is_reference() => Some(Type::Any),
        _ => None,
    }
}

fn signed_wider_than(unsigned_bits: u32, signed_bits: u32) -> Option<Type> {
    let needed = signed_bits.max(unsigned_bits * 2);
    match needed {
        0..=16 => Some(Type::Sint16),
        32 => Some(Type::Sint32),
        64 => Some(Type::Sint64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert!(convertible_to(&Type::Sint8, &Type::Sint32));
        assert!(convertible_to(&Type::Uint16, &Type::Uint64));
        assert!(convertible_to(&Type::Uint16, &Type::Sint32));
        assert!(!convertible_to(&Type::Uint32, &Type::Sint32));
        assert!(!convertible_to(&Type::Sint16, &Type::Uint32));
        assert!(!convertible_to(&Type::Sint64, &Type::Sint32));
        assert!(convertible_to(&Type::Fp32, &Type::Fp64));
        assert!(!convertible_to(&Type::Fp64, &Type::Fp32));
        assert!(!convertible_to(&Type::Sint32, &Type::Fp64));
    }

    #[test]
    fn test_literal_fitting() {
        assert!(convertible_to(&Type::SintLiteral(200), &Type::Uint8));
        assert!(!convertible_to(&Type::SintLiteral(300), &Type::Uint8));
        assert!(convertible_to(&Type::SintLiteral(-1), &Type::Sint8));
        assert!(!convertible_to(&Type::SintLiteral(-1), &Type::Uint64));
        assert!(convertible_to(&Type::UintLiteral(1 << 40), &Type::Sint64));
        assert!(convertible_to(&Type::SintLiteral(1), &Type::Fp64));
    }

    #[test]
    fn test_string_literal_to_array() {
        let hello: Vec<char> = "hi".chars().collect();
        let literal = Type::StringLiteral(StringEncoding::Utf8, hello);
        let bytes = Type::Array {
            component: Box::new(Type::Uint8),
            size: Some(2),
        };
        assert!(convertible_to(&literal, &bytes));
        let wrong_size = Type::Array {
            component: Box::new(Type::Uint8),
            size: Some(3),
        };
        assert!(!convertible_to(&literal, &wrong_size));
    }

    #[test]
    fn test_array_sizes() {
        let sized = Type::Array {
            component: Box::new(Type::Sint32),
            size: Some(4),
        };
        let unsized_ty = Type::Array {
            component: Box::new(Type::Sint32),
            size: None,
        };
        assert!(convertible_to(&sized, &unsized_ty));
        assert!(!convertible_to(&unsized_ty, &sized));
    }

    #[test]
    fn test_structure_widening_reorders_and_drops() {
        let source = Type::Structure(vec![
            ("a".to_string(), Type::Sint32),
            ("b".to_string(), Type::Bool),
        ]);
        let target = Type::Structure(vec![("b".to_string(), Type::Bool)]);
        assert!(convertible_to(&source, &target));
        assert!(!convertible_to(&target, &source));
        assert!(convertible_to(&source, &Type::Any));
        assert!(!convertible_to(&Type::Sint32, &Type::Any));
    }

    #[test]
    fn test_null_converts_to_references() {
        assert!(convertible_to(&Type::NullLiteral, &Type::Any));
        assert!(convertible_to(
            &Type::NullLiteral,
            &Type::Tuple(vec![Type::Bool])
        ));
        assert!(!convertible_to(&Type::NullLiteral, &Type::Sint32));
    }

    #[test]
    fn test_join_numeric() {
        assert_eq!(join(&Type::Sint16, &Type::Sint64), Some(Type::Sint64));
        assert_eq!(join(&Type::Uint16, &Type::Sint16), Some(Type::Sint32));
        assert_eq!(join(&Type::Uint32, &Type::Sint8), Some(Type::Sint64));
        assert_eq!(join(&Type::Uint64, &Type::Sint64), None);
        assert_eq!(join(&Type::Fp32, &Type::Fp64), Some(Type::Fp64));
        assert_eq!(join(&Type::Sint64, &Type::Fp64), None);
        assert_eq!(join(&Type::Bool, &Type::Sint8), None);
    }

    #[test]
    fn test_join_literals() {
        assert_eq!(join(&Type::SintLiteral(1), &Type::Sint32), Some(Type::Sint32));
        assert_eq!(
            join(&Type::SintLiteral(300), &Type::Sint8),
            Some(Type::Sint16)
        );
        assert_eq!(
            join(&Type::SintLiteral(1), &Type::SintLiteral(2)),
            Some(Type::Sint64)
        );
    }

    #[test]
    fn test_narrowing() {
        assert_eq!(
            narrow_integer_literal(&Type::SintLiteral(5), &Type::Sint8),
            Type::Sint8
        );
        assert_eq!(
            narrow_integer_literal(&Type::SintLiteral(300), &Type::Sint8),
            Type::Sint16
        );
        assert_eq!(
            narrow_integer_literal(&Type::UintLiteral(70000), &Type::Uint8),
            Type::Uint32
        );
    }

    #[test]
    fn test_join_structures() {
        let a = Type::Structure(vec![
            ("x".to_string(), Type::Sint16),
            ("y".to_string(), Type::Bool),
        ]);
        let b = Type::Structure(vec![("x".to_string(), Type::Sint64)]);
        assert_eq!(
            join(&a, &b),
            Some(Type::Structure(vec![("x".to_string(), Type::Sint64)]))
        );
    }
}
