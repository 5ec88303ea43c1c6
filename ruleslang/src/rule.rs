//! The rule-function interface.
//!
//! A compiled rule exposes its input type as a JSON descriptor and a
//! `run` that marshals a JSON input onto the heap, evaluates the program,
//! and marshals the returned value back to JSON. A rule that executes no
//! top-level `return` (or a bare one) is not applicable and yields JSON
//! `null`.

use serde_json::{json, Map, Value};
use thiserror::Error;

use ruleslang_parser::{expand_operators, Parser, SourceError};
use ruleslang_runtime::{Address, Heap, IdentityKind};

use crate::eval::{float_from_bytes, int_from_bytes, int_to_bytes, Evaluator};
use crate::sem::{Analyzer, SemProgram};
use crate::types::{convertible_to, identity_for, value_size, StringEncoding, Type};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("Invalid input: {0}")]
    Input(String),
}

#[derive(Debug)]
pub struct Rule {
    source: String,
    program: SemProgram,
}

impl Rule {
    /// Compile a rule: parse, expand operators, analyze.
    pub fn compile(source: &str) -> Result<Rule, SourceError> {
        let mut parser = Parser::new(source);
        let normalized = parser.source().to_string();
        let mut statements = parser.parse_program()?;
        expand_operators(&mut statements);
        let program = Analyzer::new_program().analyze_program(&statements)?;
        Ok(Rule {
            source: normalized,
            program,
        })
    }

    /// The normalized source text, for error rendering.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn input_type(&self) -> &Type {
        &self.program.input_type
    }

    pub fn output_type(&self) -> Option<&Type> {
        self.program.output_type.as_ref()
    }

    /// The input type as a JSON descriptor document.
    pub fn input_format(&self) -> Value {
        type_descriptor(&self.program.input_type)
    }

    /// The descriptor serialized to its string form.
    pub fn input_format_string(&self) -> String {
        self.input_format().to_string()
    }

    /// Evaluate the rule against a JSON input. Returns the output value,
    /// or JSON `null` when the rule is not applicable.
    pub fn run(&self, input: &Value) -> Result<Value, RuleError> {
        let mut evaluator = Evaluator::new();
        let input_bytes =
            marshal_value(&mut evaluator.heap, input, &self.program.input_type)?;
        let input_address = Address::from_le_bytes(input_bytes.try_into().unwrap());
        let result = self.run_with(&mut evaluator, input_address)?;
        Ok(result)
    }

    fn run_with(
        &self,
        evaluator: &mut Evaluator,
        input: Address,
    ) -> Result<Value, RuleError> {
        match evaluator.run_program(&self.program, input)? {
            None => Ok(Value::Null),
            Some((variant, ty)) => Ok(unmarshal_value(&evaluator.heap, variant.bytes(), &ty)),
        }
    }
}

/// Serialize a type to its descriptor document.
pub fn type_descriptor(ty: &Type) -> Value {
    match ty {
        Type::Bool => json!("bool"),
        Type::Sint8 => json!("sint8"),
        Type::Sint16 => json!("sint16"),
        Type::Sint32 => json!("sint32"),
        Type::Sint64 => json!("sint64"),
        Type::Uint8 => json!("uint8"),
        Type::Uint16 => json!("uint16"),
        Type::Uint32 => json!("uint32"),
        Type::Uint64 => json!("uint64"),
        Type::Fp32 => json!("fp32"),
        Type::Fp64 => json!("fp64"),
        Type::Array { component, size } => match size {
            Some(size) => json!({"array": type_descriptor(component), "size": size}),
            None => json!({"array": type_descriptor(component)}),
        },
        Type::Tuple(members) => {
            json!({"tuple": members.iter().map(type_descriptor).collect::<Vec<_>>()})
        }
        Type::Structure(members) => {
            let mut map = Map::new();
            for (name, member) in members {
                map.insert(name.clone(), type_descriptor(member));
            }
            json!({"struct": map})
        }
        Type::Any => json!("any"),
        literal => type_descriptor(&crate::types::lift_literal(literal)),
    }
}

/// Marshal a JSON value into its on-stack representation, allocating
/// reference values on the heap.
fn marshal_value(heap: &mut Heap, value: &Value, ty: &Type) -> Result<Vec<u8>, RuleError> {
    match ty {
        Type::Bool => match value.as_bool() {
            Some(v) => Ok(vec![v as u8]),
            None => Err(type_mismatch(value, ty)),
        },
        Type::Sint8 | Type::Sint16 | Type::Sint32 | Type::Sint64 => {
            let Some(v) = value.as_i64() else {
                return Err(type_mismatch(value, ty));
            };
            if !convertible_to(&Type::SintLiteral(v), ty) {
                return Err(RuleError::Input(format!("{} does not fit {}", v, ty)));
            }
            Ok(int_to_bytes(ty, v as i128))
        }
        Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64 => {
            let Some(v) = value.as_u64() else {
                return Err(type_mismatch(value, ty));
            };
            if !convertible_to(&Type::UintLiteral(v), ty) {
                return Err(RuleError::Input(format!("{} does not fit {}", v, ty)));
            }
            Ok(int_to_bytes(ty, v as i128))
        }
        Type::Fp32 => match value.as_f64() {
            Some(v) => Ok((v as f32).to_le_bytes().to_vec()),
            None => Err(type_mismatch(value, ty)),
        },
        Type::Fp64 => match value.as_f64() {
            Some(v) => Ok(v.to_le_bytes().to_vec()),
            None => Err(type_mismatch(value, ty)),
        },
        Type::Array { component, size } => {
            if value.is_null() {
                return Ok(0u64.to_le_bytes().to_vec());
            }
            if let Some(text) = value.as_str() {
                return marshal_string(heap, text, component, *size);
            }
            let Some(elements) = value.as_array() else {
                return Err(type_mismatch(value, ty));
            };
            if let Some(size) = size {
                if elements.len() as u64 != *size {
                    return Err(RuleError::Input(format!(
                        "expected {} elements, found {}",
                        size,
                        elements.len()
                    )));
                }
            }
            let component_size = value_size(component);
            let element_bytes = elements
                .iter()
                .map(|element| marshal_value(heap, element, component))
                .collect::<Result<Vec<_>, _>>()?;
            let address = heap.allocate(
                identity_for(ty),
                8 + component_size * elements.len(),
            );
            let data = heap.data_offset(address);
            heap.write_u64(data, elements.len() as u64);
            for (index, bytes) in element_bytes.iter().enumerate() {
                heap.write(data + 8 + component_size * index, bytes);
            }
            Ok(address.to_le_bytes().to_vec())
        }
        Type::Tuple(members) => {
            if value.is_null() {
                return Ok(0u64.to_le_bytes().to_vec());
            }
            let Some(elements) = value.as_array() else {
                return Err(type_mismatch(value, ty));
            };
            if elements.len() != members.len() {
                return Err(RuleError::Input(format!(
                    "expected {} members, found {}",
                    members.len(),
                    elements.len()
                )));
            }
            let member_bytes = elements
                .iter()
                .zip(members)
                .map(|(element, member)| marshal_value(heap, element, member))
                .collect::<Result<Vec<_>, _>>()?;
            let identity = identity_for(ty);
            let record = ruleslang_runtime::lookup(identity);
            let address = heap.allocate(identity, record.data_size);
            let data = heap.data_offset(address);
            for (index, bytes) in member_bytes.iter().enumerate() {
                heap.write(data + record.member_offsets[index], bytes);
            }
            Ok(address.to_le_bytes().to_vec())
        }
        Type::Structure(members) => {
            if value.is_null() {
                return Ok(0u64.to_le_bytes().to_vec());
            }
            let Some(object) = value.as_object() else {
                return Err(type_mismatch(value, ty));
            };
            let member_bytes = members
                .iter()
                .map(|(name, member)| {
                    let Some(field) = object.get(name) else {
                        return Err(RuleError::Input(format!("missing field '{}'", name)));
                    };
                    marshal_value(heap, field, member)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let identity = identity_for(ty);
            let record = ruleslang_runtime::lookup(identity);
            let address = heap.allocate(identity, record.data_size);
            let data = heap.data_offset(address);
            for (index, bytes) in member_bytes.iter().enumerate() {
                heap.write(data + record.member_offsets[index], bytes);
            }
            Ok(address.to_le_bytes().to_vec())
        }
        Type::Any => {
            if value.is_null() {
                Ok(0u64.to_le_bytes().to_vec())
            } else {
                Err(RuleError::Input(
                    "only null can be marshalled into 'any'".to_string(),
                ))
            }
        }
        other => Err(RuleError::Input(format!(
            "cannot marshal into type {}",
            other
        ))),
    }
}

fn marshal_string(
    heap: &mut Heap,
    text: &str,
    component: &Type,
    size: Option<u64>,
) -> Result<Vec<u8>, RuleError> {
    let encoding = match component {
        Type::Uint8 => StringEncoding::Utf8,
        Type::Uint16 => StringEncoding::Utf16,
        Type::Uint32 => StringEncoding::Utf32,
        other => {
            return Err(RuleError::Input(format!(
                "a string cannot fill an array of {}",
                other
            )));
        }
    };
    let chars: Vec<char> = text.chars().collect();
    let units = crate::types::string_unit_length(encoding, &chars) as u64;
    if let Some(size) = size {
        if units != size {
            return Err(RuleError::Input(format!(
                "expected {} code units, found {}",
                size, units
            )));
        }
    }
    let unit_size = encoding.unit_size();
    let identity = ruleslang_runtime::intern(ruleslang_runtime::TypeIdentity::string(unit_size));
    let bytes = encode_string(encoding, &chars);
    let address = heap.allocate(identity, 8 + bytes.len());
    let data = heap.data_offset(address);
    heap.write_u64(data, units);
    heap.write(data + 8, &bytes);
    Ok(address.to_le_bytes().to_vec())
}

fn encode_string(encoding: StringEncoding, chars: &[char]) -> Vec<u8> {
    match encoding {
        StringEncoding::Utf8 => chars.iter().collect::<String>().into_bytes(),
        StringEncoding::Utf16 => {
            let mut buffer = [0u16; 2];
            let mut out = Vec::new();
            for c in chars {
                for unit in c.encode_utf16(&mut buffer) {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            out
        }
        StringEncoding::Utf32 => chars.iter().flat_map(|c| (*c as u32).to_le_bytes()).collect(),
    }
}

/// Marshal an evaluated value back to JSON.
pub(crate) fn unmarshal_value(heap: &Heap, bytes: &[u8], ty: &Type) -> Value {
    match ty {
        Type::Bool | Type::BoolLiteral(_) => json!(bytes[0] != 0),
        Type::Sint8
        | Type::Sint16
        | Type::Sint32
        | Type::Sint64
        | Type::SintLiteral(_) => json!(int_from_bytes(ty, bytes) as i64),
        Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64 | Type::UintLiteral(_) => {
            json!(int_from_bytes(ty, bytes) as u64)
        }
        Type::Fp32 | Type::Fp64 | Type::FloatLiteral(_) => {
            json!(float_from_bytes(ty, bytes))
        }
        Type::StringLiteral(..)
        | Type::Array { .. }
        | Type::Tuple(_)
        | Type::Structure(_)
        | Type::NullLiteral
        | Type::Any => {
            let address = Address::from_le_bytes(bytes.try_into().unwrap());
            unmarshal_reference(heap, address, ty)
        }
    }
}

fn unmarshal_reference(heap: &Heap, address: Address, ty: &Type) -> Value {
    if address == 0 {
        return Value::Null;
    }
    let identity = heap.identity(address);
    if identity.kind == IdentityKind::String {
        return json!(decode_string(heap, address, identity.component_size));
    }
    match ty {
        Type::Array { component, .. } => {
            let length = heap.length(address);
            let size = value_size(component);
            let data = heap.data_offset(address) + 8;
            let elements: Vec<Value> = (0..length as usize)
                .map(|index| {
                    unmarshal_value(heap, heap.read(data + size * index, size), component)
                })
                .collect();
            json!(elements)
        }
        Type::Tuple(members) => {
            let data = heap.data_offset(address);
            let elements: Vec<Value> = members
                .iter()
                .enumerate()
                .map(|(index, member)| {
                    unmarshal_value(
                        heap,
                        heap.read(
                            data + identity.member_offsets[index],
                            identity.member_sizes[index],
                        ),
                        member,
                    )
                })
                .collect();
            json!(elements)
        }
        Type::Structure(members) => {
            let data = heap.data_offset(address);
            let mut object = Map::new();
            for (name, member) in members {
                let (offset, size) = identity
                    .member_offset_by_name(name)
                    .expect("member present in identity");
                object.insert(
                    name.clone(),
                    unmarshal_value(heap, heap.read(data + offset, size), member),
                );
            }
            Value::Object(object)
        }
        // A value statically typed `any` has no member types to decode.
        _ => Value::Null,
    }
}

pub(crate) fn decode_string(heap: &Heap, address: Address, unit_size: usize) -> String {
    let length = heap.length(address) as usize;
    let data = heap.data_offset(address) + 8;
    match unit_size {
        1 => String::from_utf8_lossy(heap.read(data, length)).into_owned(),
        2 => {
            let units: Vec<u16> = (0..length)
                .map(|i| u16::from_le_bytes(heap.read(data + 2 * i, 2).try_into().unwrap()))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => (0..length)
            .map(|i| {
                let unit =
                    u32::from_le_bytes(heap.read(data + 4 * i, 4).try_into().unwrap());
                char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect(),
    }
}

fn type_mismatch(value: &Value, ty: &Type) -> RuleError {
    RuleError::Input(format!("cannot marshal {} into {}", value, ty))
}
