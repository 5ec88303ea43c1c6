//! The RulesLang type lattice.
//!
//! Atomic numeric and boolean types live on the value stack; literal types
//! are singletons carrying their value; composite types (arrays, tuples,
//! structures, strings, `any`) are reference types whose values live on
//! the heap.

mod convert;
mod layout;

pub use convert::{convertible_to, join, lift_literal, narrow_integer_literal};
pub use layout::{identity_for, string_unit_length, string_unit_type, value_size};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringEncoding {
    Utf8,
    Utf16,
    Utf32,
}

impl StringEncoding {
    pub fn unit_size(self) -> usize {
        match self {
            StringEncoding::Utf8 => 1,
            StringEncoding::Utf16 => 2,
            StringEncoding::Utf32 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Bool,
    Sint8,
    Sint16,
    Sint32,
    Sint64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Fp32,
    Fp64,
    BoolLiteral(bool),
    SintLiteral(i64),
    UintLiteral(u64),
    FloatLiteral(f64),
    StringLiteral(StringEncoding, Vec<char>),
    NullLiteral,
    Array {
        component: Box<Type>,
        size: Option<u64>,
    },
    Tuple(Vec<Type>),
    Structure(Vec<(String, Type)>),
    Any,
}

impl Type {
    /// Resolve one of the built-in atomic type names.
    pub fn atomic_by_name(name: &str) -> Option<Type> {
        Some(match name {
            "bool" => Type::Bool,
            "sint8" => Type::Sint8,
            "sint16" => Type::Sint16,
            "sint32" => Type::Sint32,
            "sint64" => Type::Sint64,
            "uint8" => Type::Uint8,
            "uint16" => Type::Uint16,
            "uint32" => Type::Uint32,
            "uint64" => Type::Uint64,
            "fp32" => Type::Fp32,
            "fp64" => Type::Fp64,
            _ => return None,
        })
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Sint8
                | Type::Sint16
                | Type::Sint32
                | Type::Sint64
                | Type::Uint8
                | Type::Uint16
                | Type::Uint32
                | Type::Uint64
                | Type::Fp32
                | Type::Fp64
        )
    }

    /// Values of reference types are heap addresses.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::StringLiteral(..)
                | Type::NullLiteral
                | Type::Array { .. }
                | Type::Tuple(_)
                | Type::Structure(_)
                | Type::Any
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Type::BoolLiteral(_)
                | Type::SintLiteral(_)
                | Type::UintLiteral(_)
                | Type::FloatLiteral(_)
                | Type::StringLiteral(..)
                | Type::NullLiteral
        )
    }

    /// `(signed, bits)` for atomic integer types.
    pub fn integer_width(&self) -> Option<(bool, u32)> {
        Some(match self {
            Type::Sint8 => (true, 8),
            Type::Sint16 => (true, 16),
            Type::Sint32 => (true, 32),
            Type::Sint64 => (true, 64),
            Type::Uint8 => (false, 8),
            Type::Uint16 => (false, 16),
            Type::Uint32 => (false, 32),
            Type::Uint64 => (false, 64),
            _ => return None,
        })
    }

    pub fn is_integral(&self) -> bool {
        self.integer_width().is_some()
            || matches!(self, Type::SintLiteral(_) | Type::UintLiteral(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Fp32 | Type::Fp64 | Type::FloatLiteral(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_float()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Sint8 => write!(f, "sint8"),
            Type::Sint16 => write!(f, "sint16"),
            Type::Sint32 => write!(f, "sint32"),
            Type::Sint64 => write!(f, "sint64"),
            Type::Uint8 => write!(f, "uint8"),
            Type::Uint16 => write!(f, "uint16"),
            Type::Uint32 => write!(f, "uint32"),
            Type::Uint64 => write!(f, "uint64"),
            Type::Fp32 => write!(f, "fp32"),
            Type::Fp64 => write!(f, "fp64"),
            Type::BoolLiteral(v) => write!(f, "bool literal {}", v),
            Type::SintLiteral(v) => write!(f, "sint literal {}", v),
            Type::UintLiteral(v) => write!(f, "uint literal {}", v),
            Type::FloatLiteral(v) => write!(f, "float literal {}", v),
            Type::StringLiteral(encoding, value) => {
                let text: String = value.iter().collect();
                let name = match encoding {
                    StringEncoding::Utf8 => "utf8",
                    StringEncoding::Utf16 => "utf16",
                    StringEncoding::Utf32 => "utf32",
                };
                write!(f, "{} string literal {:?}", name, text)
            }
            Type::NullLiteral => write!(f, "null"),
            Type::Array { component, size } => match size {
                Some(size) => write!(f, "{}[{}]", component, size),
                None => write!(f, "{}[]", component),
            },
            Type::Tuple(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Type::Structure(members) => {
                let parts: Vec<String> = members
                    .iter()
                    .map(|(name, member)| format!("{}: {}", name, member))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Type::Any => write!(f, "any"),
        }
    }
}
