//! The interactive shell.
//!
//! A persistent session: scopes, the root frame, and the heap survive
//! across submissions. A line beginning with `\u{0001}` toggles between
//! statement mode (prompt `> `, prints the stack used-size) and
//! expression mode (prompt `>>> `, additionally prints the value and its
//! type). In statement mode a line ending with `:` keeps reading
//! continuation lines until a blank one.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use ruleslang_parser::{expand_operators, Parser, SourceError};
use ruleslang_runtime::{Address, Heap, IdentityKind};

use crate::eval::{float_from_bytes, int_from_bytes, Evaluator};
use crate::rule::decode_string;
use crate::sem::Analyzer;
use crate::types::{lift_literal, value_size, Type};

/// The control character that toggles expression mode.
pub const MODE_TOGGLE: char = '\u{0001}';

pub struct ShellSession {
    analyzer: Analyzer,
    evaluator: Evaluator,
    expression_mode: bool,
}

impl Default for ShellSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellSession {
    pub fn new() -> Self {
        Self {
            analyzer: Analyzer::new_shell(),
            evaluator: Evaluator::new(),
            expression_mode: false,
        }
    }

    pub fn expression_mode(&self) -> bool {
        self.expression_mode
    }

    pub fn toggle_mode(&mut self) {
        self.expression_mode = !self.expression_mode;
    }

    /// Process one submission: parse, operator-expand, interpret,
    /// evaluate. Returns the text to print, or the formatted error.
    pub fn submit(&mut self, input: &str) -> Result<String, String> {
        if self.expression_mode {
            self.submit_expression(input)
        } else {
            self.submit_statements(input)
        }
    }

    fn submit_statements(&mut self, input: &str) -> Result<String, String> {
        let mut parser = Parser::new(input);
        let source = parser.source().to_string();
        let run: Result<(), SourceError> = (|| {
            let mut statements = parser.parse_program()?;
            expand_operators(&mut statements);
            let statements = self.analyzer.analyze_statements(&statements)?;
            self.evaluator
                .ensure_root_frame(self.analyzer.root_frame_size());
            self.evaluator
                .execute(&statements, self.analyzer.functions())?;
            Ok(())
        })();
        match run {
            Ok(()) => Ok(format!("stack: {}", self.evaluator.stack.used_size())),
            Err(error) => Err(error.format_with_source(&source)),
        }
    }

    fn submit_expression(&mut self, input: &str) -> Result<String, String> {
        let mut parser = Parser::new(input);
        let source = parser.source().to_string();
        let run = (|| {
            let expression = parser.parse_single_expression()?;
            let expression = self.analyzer.analyze_entry_expression(&expression)?;
            self.evaluator
                .ensure_root_frame(self.analyzer.root_frame_size());
            self.evaluator
                .eval_value(&expression, self.analyzer.functions())
        })();
        match run {
            Ok((variant, ty)) => {
                let rendered = format_value(&self.evaluator.heap, variant.bytes(), &ty);
                Ok(format!(
                    "stack: {}\ntype: {}\nvalue: {}",
                    self.evaluator.stack.used_size(),
                    lift_literal(&ty),
                    rendered
                ))
            }
            Err(error) => Err(error.format_with_source(&source)),
        }
    }
}

/// Render an evaluated value for the shell.
pub fn format_value(heap: &Heap, bytes: &[u8], ty: &Type) -> String {
    match ty {
        Type::Bool | Type::BoolLiteral(_) => {
            if bytes[0] != 0 {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        Type::Sint8 | Type::Sint16 | Type::Sint32 | Type::Sint64 | Type::SintLiteral(_) => {
            format!("{}", int_from_bytes(ty, bytes) as i64)
        }
        Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64 | Type::UintLiteral(_) => {
            format!("{}", int_from_bytes(ty, bytes) as u64)
        }
        Type::Fp32 | Type::Fp64 | Type::FloatLiteral(_) => {
            format!("{}", float_from_bytes(ty, bytes))
        }
        _ => {
            let address = Address::from_le_bytes(bytes.try_into().unwrap());
            format_reference(heap, address, ty)
        }
    }
}

fn format_reference(heap: &Heap, address: Address, ty: &Type) -> String {
    if address == 0 {
        return "null".to_string();
    }
    let identity = heap.identity(address);
    if identity.kind == IdentityKind::String {
        return format!("{:?}", decode_string(heap, address, identity.component_size));
    }
    match ty {
        Type::Array { component, .. } => {
            let length = heap.length(address);
            let size = value_size(component);
            let data = heap.data_offset(address) + 8;
            let parts: Vec<String> = (0..length as usize)
                .map(|index| format_value(heap, heap.read(data + size * index, size), component))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Type::Tuple(members) => {
            let data = heap.data_offset(address);
            let parts: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(index, member)| {
                    format_value(
                        heap,
                        heap.read(
                            data + identity.member_offsets[index],
                            identity.member_sizes[index],
                        ),
                        member,
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Type::Structure(members) => {
            let data = heap.data_offset(address);
            let parts: Vec<String> = members
                .iter()
                .map(|(name, member)| {
                    let (offset, size) = identity
                        .member_offset_by_name(name)
                        .expect("member present in identity");
                    format!(
                        "{}: {}",
                        name,
                        format_value(heap, heap.read(data + offset, size), member)
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        _ => format!("<{}>", ty),
    }
}

/// The interactive loop. Returns the process exit code.
pub fn run_shell() -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Error: failed to start the shell: {}", error);
            return 1;
        }
    };
    let mut session = ShellSession::new();
    loop {
        let prompt = if session.expression_mode() {
            ">>> "
        } else {
            "> "
        };
        match editor.readline(prompt) {
            Ok(line) => {
                if line.starts_with(MODE_TOGGLE) {
                    session.toggle_mode();
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                let mut input = line;
                if !session.expression_mode() && input.trim_end().ends_with(':') {
                    // Block headers keep reading until a blank line.
                    loop {
                        match editor.readline("  ") {
                            Ok(continuation) => {
                                if continuation.trim().is_empty() {
                                    break;
                                }
                                input.push('\n');
                                input.push_str(&continuation);
                            }
                            Err(_) => break,
                        }
                    }
                }
                match session.submit(&input) {
                    Ok(output) => println!("{}", output),
                    Err(error) => eprintln!("{}", error),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => return 0,
            Err(error) => {
                eprintln!("Error: {}", error);
                return 1;
            }
        }
    }
}
