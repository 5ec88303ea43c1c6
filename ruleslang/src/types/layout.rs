//! Bridge from lattice types to runtime sizes and interned identities.

use ruleslang_runtime::{intern, IdentityId, TypeIdentity, REFERENCE_SIZE};

use super::{StringEncoding, Type};

/// On-stack size in bytes of a value of this type. Literal types size as
/// the type their values materialize to; reference types are addresses.
pub fn value_size(t: &Type) -> usize {
    match t {
        Type::Bool | Type::Sint8 | Type::Uint8 => 1,
        Type::Sint16 | Type::Uint16 => 2,
        Type::Sint32 | Type::Uint32 | Type::Fp32 => 4,
        Type::Sint64 | Type::Uint64 | Type::Fp64 => 8,
        Type::BoolLiteral(_) => 1,
        Type::SintLiteral(_) | Type::UintLiteral(_) | Type::FloatLiteral(_) => 8,
        Type::StringLiteral(..)
        | Type::NullLiteral
        | Type::Array { .. }
        | Type::Tuple(_)
        | Type::Structure(_)
        | Type::Any => REFERENCE_SIZE,
    }
}

/// The atomic code-unit type of a string encoding.
pub fn string_unit_type(encoding: StringEncoding) -> Type {
    match encoding {
        StringEncoding::Utf8 => Type::Uint8,
        StringEncoding::Utf16 => Type::Uint16,
        StringEncoding::Utf32 => Type::Uint32,
    }
}

/// Length of a string value in code units of the given encoding.
pub fn string_unit_length(encoding: StringEncoding, value: &[char]) -> usize {
    match encoding {
        StringEncoding::Utf8 => value.iter().map(|c| c.len_utf8()).sum(),
        StringEncoding::Utf16 => value.iter().map(|c| c.len_utf16()).sum(),
        StringEncoding::Utf32 => value.len(),
    }
}

/// Intern and return the runtime identity for a reference type.
///
/// Panics on non-reference types: only heap objects carry identities.
pub fn identity_for(t: &Type) -> IdentityId {
    match t {
        Type::Array { component, .. } => intern(TypeIdentity::array(value_size(component))),
        Type::Tuple(members) => {
            intern(TypeIdentity::tuple(members.iter().map(value_size).collect()))
        }
        Type::Structure(members) => intern(TypeIdentity::structure(
            members.iter().map(|(name, _)| name.clone()).collect(),
            members.iter().map(|(_, member)| value_size(member)).collect(),
        )),
        Type::StringLiteral(encoding, _) => intern(TypeIdentity::string(encoding.unit_size())),
        Type::Any => intern(TypeIdentity::any()),
        other => panic!("no identity for non-reference type {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_sizes() {
        assert_eq!(value_size(&Type::Bool), 1);
        assert_eq!(value_size(&Type::Sint16), 2);
        assert_eq!(value_size(&Type::Fp32), 4);
        assert_eq!(value_size(&Type::Uint64), 8);
    }

    #[test]
    fn test_references_are_addresses() {
        assert_eq!(value_size(&Type::Any), 8);
        assert_eq!(
            value_size(&Type::Array {
                component: Box::new(Type::Uint8),
                size: None
            }),
            8
        );
    }

    #[test]
    fn test_string_unit_lengths() {
        let value: Vec<char> = "aé€".chars().collect();
        assert_eq!(string_unit_length(StringEncoding::Utf8, &value), 6);
        assert_eq!(string_unit_length(StringEncoding::Utf16, &value), 3);
        assert_eq!(string_unit_length(StringEncoding::Utf32, &value), 3);
    }

    #[test]
    fn test_identity_sharing() {
        let a = Type::Tuple(vec![Type::Sint32, Type::Bool]);
        let b = Type::Tuple(vec![Type::Sint32, Type::Bool]);
        assert_eq!(identity_for(&a), identity_for(&b));
    }
}
