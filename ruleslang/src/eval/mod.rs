//! The tree-walking evaluator.
//!
//! Executes a typed semantic tree over a value stack and a heap. Atomic
//! values travel on the stack; composite values are identity-headed heap
//! objects addressed by `u64` offsets (0 is null). Runtime failures carry
//! the offending node's source span.

mod flow;

pub use flow::Flow;

use ruleslang_parser::{SourceError, SourceResult, Span};
use ruleslang_runtime::{Address, Heap, RuntimeError, ValueStack, Variant};

use crate::sem::{
    BinaryOp, CompareOp, FieldSelector, LogicalOp, SemExpr, SemExprKind, SemFunction, SemProgram,
    SemStmt, SemStmtKind, CONTEXT_SLOT,
};
use crate::types::{identity_for, value_size, StringEncoding, Type};

pub struct Evaluator {
    pub stack: ValueStack,
    pub heap: Heap,
    frame_base: usize,
    call_depth: usize,
    return_value: Option<(Variant, Type)>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            stack: ValueStack::new(),
            heap: Heap::new(),
            frame_base: 0,
            call_depth: 0,
            return_value: None,
        }
    }

    /// Run a whole rule program against an input object (0 for none).
    /// Returns the value of the first executed top-level `return`, or
    /// `None` when the rule is not applicable.
    pub fn run_program(
        &mut self,
        program: &SemProgram,
        input: Address,
    ) -> SourceResult<Option<(Variant, Type)>> {
        let base = self.stack.reserve(program.frame_size);
        self.frame_base = base;
        self.stack
            .write_at(base + CONTEXT_SLOT, &input.to_le_bytes());
        self.return_value = None;
        for statement in &program.statements {
            match self.exec_statement(statement, &program.functions)? {
                Flow::Return => break,
                Flow::Proceed | Flow::Rerun => {}
                Flow::Break(_) | Flow::Continue(_) => {
                    unreachable!("break/continue escaped analysis")
                }
            }
        }
        Ok(self.return_value.take())
    }

    /// Grow the persistent root frame (the shell path).
    pub fn ensure_root_frame(&mut self, size: usize) {
        self.stack.grow_to(size);
    }

    /// Execute statements against the current root frame.
    pub fn execute(
        &mut self,
        statements: &[SemStmt],
        functions: &[SemFunction],
    ) -> SourceResult<Flow> {
        let mut index = 0;
        while index < statements.len() {
            match self.exec_statement(&statements[index], functions)? {
                Flow::Proceed => index += 1,
                Flow::Rerun => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Proceed)
    }

    /// Evaluate an expression and capture its value (the shell's
    /// expression mode).
    pub fn eval_value(
        &mut self,
        expression: &SemExpr,
        functions: &[SemFunction],
    ) -> SourceResult<(Variant, Type)> {
        self.eval(expression, functions)?;
        let variant = Variant::capture(&mut self.stack, value_size(&expression.ty));
        Ok((variant, expression.ty.clone()))
    }

    /// Take the value of the last executed top-level `return`.
    pub fn take_return_value(&mut self) -> Option<(Variant, Type)> {
        self.return_value.take()
    }

    // ==================== Statements ====================

    fn exec_statement(
        &mut self,
        statement: &SemStmt,
        functions: &[SemFunction],
    ) -> SourceResult<Flow> {
        let span = statement.span;
        match &statement.kind {
            SemStmtKind::Declare { offset, ty, value } => {
                if let Some(value) = value {
                    self.eval(value, functions)?;
                    self.pop_to_slot(*offset, value_size(ty));
                }
                Ok(Flow::Proceed)
            }
            SemStmtKind::AssignSlot { offset, ty, value } => {
                self.eval(value, functions)?;
                self.pop_to_slot(*offset, value_size(ty));
                Ok(Flow::Proceed)
            }
            SemStmtKind::AssignField {
                object,
                selector,
                value,
            } => {
                self.eval(object, functions)?;
                let address = self.stack.pop::<u64>();
                self.check_null(address, object.span)?;
                let (offset, size) = self.member_location(address, selector);
                self.eval(value, functions)?;
                let mut bytes = vec![0u8; size];
                self.stack.pop_bytes(size, &mut bytes);
                self.heap.write(offset, &bytes);
                Ok(Flow::Proceed)
            }
            SemStmtKind::AssignIndex {
                object,
                index,
                value,
            } => {
                self.eval(object, functions)?;
                let address = self.stack.pop::<u64>();
                self.check_null(address, object.span)?;
                self.eval(index, functions)?;
                let position = self.pop_int(&index.ty) as i64;
                let size = value_size(&value.ty);
                let offset = self
                    .heap
                    .component_offset(address, size, position)
                    .map_err(|e| runtime(e, span))?;
                self.eval(value, functions)?;
                let mut bytes = vec![0u8; size];
                self.stack.pop_bytes(size, &mut bytes);
                self.heap.write(offset, &bytes);
                Ok(Flow::Proceed)
            }
            SemStmtKind::Call {
                function,
                arguments,
            } => {
                for argument in arguments.iter().rev() {
                    self.eval(argument, functions)?;
                }
                self.call_function(*function, functions)?;
                if let Some(return_type) = &functions[*function].return_type {
                    self.stack.drop_value(value_size(return_type));
                }
                Ok(Flow::Proceed)
            }
            SemStmtKind::If {
                blocks,
                else_statements,
            } => {
                for (condition, block) in blocks {
                    self.eval(condition, functions)?;
                    if self.stack.pop::<bool>() {
                        return self.execute(block, functions);
                    }
                }
                self.execute(else_statements, functions)
            }
            SemStmtKind::While {
                label,
                condition,
                body,
            } => loop {
                self.eval(condition, functions)?;
                if !self.stack.pop::<bool>() {
                    return Ok(Flow::Proceed);
                }
                match self.execute(body, functions)? {
                    Flow::Proceed => {}
                    Flow::Continue(target) if Flow::matches_loop(&target, label) => {}
                    Flow::Break(target) if Flow::matches_loop(&target, label) => {
                        return Ok(Flow::Proceed);
                    }
                    other => return Ok(other),
                }
            },
            SemStmtKind::Return(value) => {
                match value {
                    Some(value) => {
                        self.eval(value, functions)?;
                        if self.call_depth == 0 {
                            let variant =
                                Variant::capture(&mut self.stack, value_size(&value.ty));
                            self.return_value = Some((variant, value.ty.clone()));
                        }
                        // Inside a function the value stays on top for
                        // the call protocol to collect.
                    }
                    None => {
                        if self.call_depth == 0 {
                            self.return_value = None;
                        }
                    }
                }
                Ok(Flow::Return)
            }
            SemStmtKind::Break(label) => Ok(Flow::Break(label.clone())),
            SemStmtKind::Continue(label) => Ok(Flow::Continue(label.clone())),
        }
    }

    // ==================== Expressions ====================

    fn eval(&mut self, expression: &SemExpr, functions: &[SemFunction]) -> SourceResult<()> {
        let span = expression.span;
        let ty = &expression.ty;
        match &expression.kind {
            SemExprKind::BoolValue(value) => {
                self.stack.push(*value);
                Ok(())
            }
            SemExprKind::SintValue(value) => {
                self.push_numeric(ty, *value as i128);
                Ok(())
            }
            SemExprKind::UintValue(value) => {
                self.push_numeric(ty, *value as i128);
                Ok(())
            }
            SemExprKind::FloatValue(value) => {
                self.push_float(ty, *value);
                Ok(())
            }
            SemExprKind::StringValue(encoding, value) => {
                let address = self.allocate_string(ty, *encoding, value);
                self.stack.push(address);
                Ok(())
            }
            SemExprKind::NullValue => {
                self.stack.push(0u64);
                Ok(())
            }
            SemExprKind::SlotGet { offset } => {
                let size = value_size(ty);
                let bytes = self.stack.read_at(self.frame_base + offset, size).to_vec();
                self.stack.push_bytes(&bytes);
                Ok(())
            }
            SemExprKind::TupleLiteral(values) => {
                let identity = identity_for(ty);
                let record = ruleslang_runtime::lookup(identity);
                let address = self.heap.allocate(identity, record.data_size);
                let data = self.heap.data_offset(address);
                for (index, value) in values.iter().enumerate() {
                    self.eval(value, functions)?;
                    self.pop_to_heap(data + record.member_offsets[index], record.member_sizes[index]);
                }
                self.stack.push(address);
                Ok(())
            }
            SemExprKind::StructLiteral(values) => {
                let identity = identity_for(ty);
                let record = ruleslang_runtime::lookup(identity);
                let address = self.heap.allocate(identity, record.data_size);
                let data = self.heap.data_offset(address);
                for (index, value) in values.iter().enumerate() {
                    if let Some(value) = value {
                        self.eval(value, functions)?;
                        self.pop_to_heap(
                            data + record.member_offsets[index],
                            record.member_sizes[index],
                        );
                    }
                }
                self.stack.push(address);
                Ok(())
            }
            SemExprKind::ArrayLiteral {
                length,
                values,
                other,
            } => {
                let Type::Array { component, .. } = ty else {
                    unreachable!("array literal with non-array type")
                };
                let component_size = value_size(component);
                let identity = identity_for(ty);
                let address = self
                    .heap
                    .allocate(identity, 8 + component_size * *length as usize);
                let data = self.heap.data_offset(address);
                self.heap.write_u64(data, *length);
                for (index, value) in values {
                    self.eval(value, functions)?;
                    self.pop_to_heap(data + 8 + component_size * *index as usize, component_size);
                }
                if let Some(other) = other {
                    // The catch-all value is evaluated exactly once and
                    // fanned out from a snapshot.
                    self.eval(other, functions)?;
                    let variant = Variant::capture(&mut self.stack, component_size);
                    for index in 0..*length {
                        if !values.iter().any(|(i, _)| *i == index) {
                            self.heap.write(
                                data + 8 + component_size * index as usize,
                                variant.bytes(),
                            );
                        }
                    }
                }
                self.stack.push(address);
                Ok(())
            }
            SemExprKind::FieldAccess { object, selector } => {
                self.eval(object, functions)?;
                let address = self.stack.pop::<u64>();
                self.check_null(address, span)?;
                let (offset, size) = self.member_location(address, selector);
                let bytes = self.heap.read(offset, size).to_vec();
                self.stack.push_bytes(&bytes);
                Ok(())
            }
            SemExprKind::IndexAccess { object, index } => {
                self.eval(object, functions)?;
                let address = self.stack.pop::<u64>();
                self.check_null(address, span)?;
                self.eval(index, functions)?;
                let position = self.pop_int(&index.ty) as i64;
                let size = value_size(ty);
                let offset = self
                    .heap
                    .component_offset(address, size, position)
                    .map_err(|e| runtime(e, span))?;
                let bytes = self.heap.read(offset, size).to_vec();
                self.stack.push_bytes(&bytes);
                Ok(())
            }
            SemExprKind::Call {
                function,
                arguments,
            } => {
                // Reverse declaration order leaves the first argument on
                // top of the stack.
                for argument in arguments.iter().rev() {
                    self.eval(argument, functions)?;
                }
                self.call_function(*function, functions)
            }
            SemExprKind::Convert { value } => {
                self.eval(value, functions)?;
                self.apply_conversion(&value.ty, ty, span)
            }
            SemExprKind::Negate(value) => {
                self.eval(value, functions)?;
                if ty.is_float() {
                    let v = self.pop_float(&value.ty);
                    self.push_float(ty, -v);
                } else {
                    let v = self.pop_int(&value.ty);
                    self.push_numeric(ty, (v as i64).wrapping_neg() as i128);
                }
                Ok(())
            }
            SemExprKind::LogicalNot(value) => {
                self.eval(value, functions)?;
                let v = self.stack.pop::<bool>();
                self.stack.push(!v);
                Ok(())
            }
            SemExprKind::BitwiseNot(value) => {
                self.eval(value, functions)?;
                let v = self.pop_int(&value.ty);
                self.push_numeric(ty, !(v as i64) as i128);
                Ok(())
            }
            SemExprKind::Binary { op, left, right } => {
                self.eval(left, functions)?;
                self.eval(right, functions)?;
                if ty.is_float() {
                    let b = self.pop_float(&right.ty);
                    let a = self.pop_float(&left.ty);
                    let value = float_binary(*op, a, b);
                    self.push_float(ty, value);
                } else {
                    let b = self.pop_int(&right.ty);
                    let a = self.pop_int(&left.ty);
                    let value = int_binary(*op, a, b, ty).map_err(|e| runtime(e, span))?;
                    self.push_numeric(ty, value);
                }
                Ok(())
            }
            SemExprKind::CompareChain {
                operands,
                operators,
            } => {
                self.eval(&operands[0], functions)?;
                let mut previous =
                    Variant::capture(&mut self.stack, value_size(&operands[0].ty));
                let mut result = true;
                for (i, op) in operators.iter().enumerate() {
                    let operand = &operands[i + 1];
                    self.eval(operand, functions)?;
                    let current = Variant::capture(&mut self.stack, value_size(&operand.ty));
                    if !self.compare(*op, &operands[i].ty, &previous, &current) {
                        result = false;
                        break;
                    }
                    previous = current;
                }
                self.stack.push(result);
                Ok(())
            }
            SemExprKind::TypeCheck { value, result } => {
                self.eval(value, functions)?;
                self.stack.drop_value(value_size(&value.ty));
                self.stack.push(*result);
                Ok(())
            }
            SemExprKind::Logical { op, left, right } => {
                self.eval(left, functions)?;
                let a = self.stack.pop::<bool>();
                match op {
                    LogicalOp::And => {
                        if !a {
                            self.stack.push(false);
                        } else {
                            self.eval(right, functions)?;
                        }
                    }
                    LogicalOp::Or => {
                        if a {
                            self.stack.push(true);
                        } else {
                            self.eval(right, functions)?;
                        }
                    }
                    LogicalOp::Xor => {
                        self.eval(right, functions)?;
                        let b = self.stack.pop::<bool>();
                        self.stack.push(a != b);
                    }
                }
                Ok(())
            }
            SemExprKind::Conditional {
                condition,
                true_value,
                false_value,
            } => {
                self.eval(condition, functions)?;
                if self.stack.pop::<bool>() {
                    self.eval(true_value, functions)
                } else {
                    self.eval(false_value, functions)
                }
            }
            SemExprKind::Concatenate { left, right } => {
                self.eval(left, functions)?;
                let left_address = self.stack.pop::<u64>();
                self.check_null(left_address, left.span)?;
                self.eval(right, functions)?;
                let right_address = self.stack.pop::<u64>();
                self.check_null(right_address, right.span)?;
                let Type::Array { component, .. } = ty else {
                    unreachable!("concatenation with non-array type")
                };
                let component_size = value_size(component);
                let left_length = self.heap.length(left_address);
                let right_length = self.heap.length(right_address);
                let length = left_length + right_length;
                let left_bytes = self
                    .heap
                    .read(
                        self.heap.data_offset(left_address) + 8,
                        component_size * left_length as usize,
                    )
                    .to_vec();
                let right_bytes = self
                    .heap
                    .read(
                        self.heap.data_offset(right_address) + 8,
                        component_size * right_length as usize,
                    )
                    .to_vec();
                let identity = identity_for(ty);
                let address = self
                    .heap
                    .allocate(identity, 8 + component_size * length as usize);
                let data = self.heap.data_offset(address);
                self.heap.write_u64(data, length);
                self.heap.write(data + 8, &left_bytes);
                self.heap
                    .write(data + 8 + left_bytes.len(), &right_bytes);
                self.stack.push(address);
                Ok(())
            }
            SemExprKind::StaticFieldAccess { type_name, member } => Err(runtime(
                RuntimeError::NotImplemented(format!(
                    "static field access {}.{}",
                    type_name, member
                )),
                span,
            )),
        }
    }

    // ==================== Calls ====================

    fn call_function(&mut self, id: usize, functions: &[SemFunction]) -> SourceResult<()> {
        let function = &functions[id];
        // Arguments arrive with the first parameter on top; pop them in
        // declaration order.
        let mut parameter_values = Vec::with_capacity(function.parameters.len());
        for (_, parameter_type) in &function.parameters {
            parameter_values.push(Variant::capture(
                &mut self.stack,
                value_size(parameter_type),
            ));
        }
        let caller_used = self.stack.used_size();
        let caller_base = self.frame_base;

        let base = self.stack.reserve(function.frame_size);
        for (variant, offset) in parameter_values.iter().zip(&function.parameter_offsets) {
            self.stack.write_at(base + offset, variant.bytes());
        }
        self.frame_base = base;
        self.call_depth += 1;
        let flow = self.execute(&function.body, functions);
        self.call_depth -= 1;
        self.frame_base = caller_base;
        let flow = flow?;

        match (&function.return_type, flow) {
            (Some(return_type), Flow::Return) => {
                let result = Variant::capture(&mut self.stack, value_size(return_type));
                self.stack.truncate(caller_used);
                result.push_onto(&mut self.stack);
            }
            _ => {
                self.stack.truncate(caller_used);
            }
        }
        Ok(())
    }

    // ==================== Conversion ====================

    fn apply_conversion(&mut self, from: &Type, to: &Type, span: Span) -> SourceResult<()> {
        if from.is_atomic() && to.is_atomic() {
            if from.is_float() || to.is_float() {
                let v = self.pop_float(from);
                self.push_float(to, v);
            } else {
                let v = self.pop_int(from);
                self.push_numeric(to, v);
            }
            return Ok(());
        }
        let address = self.stack.pop::<u64>();
        let converted = self.convert_heap_value(from, to, address, span)?;
        self.stack.push(converted);
        Ok(())
    }

    /// Convert a heap value between reference types. Reorder-only
    /// structure widening, `any`, and size-erasing array conversions are
    /// no-ops; representation changes allocate.
    fn convert_heap_value(
        &mut self,
        from: &Type,
        to: &Type,
        address: Address,
        span: Span,
    ) -> SourceResult<Address> {
        if address == 0 || from == to {
            return Ok(address);
        }
        match (from, to) {
            (_, Type::Any) => Ok(address),
            (Type::StringLiteral(..), Type::Array { .. }) => Ok(address),
            (
                Type::Array {
                    component: from_component,
                    ..
                },
                Type::Array {
                    component: to_component,
                    ..
                },
            ) => {
                if from_component == to_component {
                    return Ok(address);
                }
                let length = self.heap.length(address);
                let from_size = value_size(from_component);
                let to_size = value_size(to_component);
                let identity = identity_for(to);
                let target = self.heap.allocate(identity, 8 + to_size * length as usize);
                let target_data = self.heap.data_offset(target);
                self.heap.write_u64(target_data, length);
                for index in 0..length as usize {
                    let bytes = self
                        .heap
                        .read(self.heap.data_offset(address) + 8 + from_size * index, from_size)
                        .to_vec();
                    let converted =
                        self.convert_member_bytes(from_component, to_component, &bytes, span)?;
                    self.heap.write(target_data + 8 + to_size * index, &converted);
                }
                Ok(target)
            }
            (Type::Tuple(from_members), Type::Tuple(to_members)) => {
                if from_members == to_members {
                    return Ok(address);
                }
                let source = self.heap.identity(address);
                let identity = identity_for(to);
                let record = ruleslang_runtime::lookup(identity);
                let target = self.heap.allocate(identity, record.data_size);
                let target_data = self.heap.data_offset(target);
                let source_data = self.heap.data_offset(address);
                for (index, (from_member, to_member)) in
                    from_members.iter().zip(to_members).enumerate()
                {
                    let bytes = self
                        .heap
                        .read(
                            source_data + source.member_offsets[index],
                            source.member_sizes[index],
                        )
                        .to_vec();
                    let converted =
                        self.convert_member_bytes(from_member, to_member, &bytes, span)?;
                    self.heap
                        .write(target_data + record.member_offsets[index], &converted);
                }
                Ok(target)
            }
            (Type::Structure(from_members), Type::Structure(to_members)) => {
                let exact = to_members.iter().all(|(name, to_member)| {
                    from_members
                        .iter()
                        .any(|(from_name, from_member)| from_name == name && from_member == to_member)
                });
                if exact {
                    // Dropped or reordered members need no new layout:
                    // access goes through the identity's name table.
                    return Ok(address);
                }
                let source = self.heap.identity(address);
                let identity = identity_for(to);
                let record = ruleslang_runtime::lookup(identity);
                let target = self.heap.allocate(identity, record.data_size);
                let target_data = self.heap.data_offset(target);
                let source_data = self.heap.data_offset(address);
                for (index, (name, to_member)) in to_members.iter().enumerate() {
                    let (source_offset, source_size) = source
                        .member_offset_by_name(name)
                        .expect("widened member present in source layout");
                    let from_member = &from_members
                        .iter()
                        .find(|(n, _)| n == name)
                        .expect("widened member present in source type")
                        .1;
                    let bytes = self
                        .heap
                        .read(source_data + source_offset, source_size)
                        .to_vec();
                    let converted =
                        self.convert_member_bytes(from_member, to_member, &bytes, span)?;
                    self.heap
                        .write(target_data + record.member_offsets[index], &converted);
                }
                Ok(target)
            }
            _ => Ok(address),
        }
    }

    fn convert_member_bytes(
        &mut self,
        from: &Type,
        to: &Type,
        bytes: &[u8],
        span: Span,
    ) -> SourceResult<Vec<u8>> {
        if from == to {
            return Ok(bytes.to_vec());
        }
        if from.is_reference() && to.is_reference() {
            let address = u64::from_le_bytes(bytes.try_into().unwrap());
            let converted = self.convert_heap_value(from, to, address, span)?;
            return Ok(converted.to_le_bytes().to_vec());
        }
        if from.is_float() || to.is_float() {
            let v = float_from_bytes(from, bytes);
            return Ok(float_to_bytes(to, v));
        }
        let v = int_from_bytes(from, bytes);
        Ok(int_to_bytes(to, v))
    }

    // ==================== Comparison ====================

    fn compare(&self, op: CompareOp, ty: &Type, a: &Variant, b: &Variant) -> bool {
        if ty.is_reference() {
            let a = u64::from_le_bytes(a.bytes().try_into().unwrap());
            let b = u64::from_le_bytes(b.bytes().try_into().unwrap());
            return match op {
                CompareOp::Identical => a == b,
                CompareOp::NotIdentical => a != b,
                CompareOp::Equal => self.deep_equals(ty, a, b),
                CompareOp::NotEqual => !self.deep_equals(ty, a, b),
                _ => unreachable!("ordering on references rejected in analysis"),
            };
        }
        if ty.is_float() {
            let a = float_from_bytes(ty, a.bytes());
            let b = float_from_bytes(ty, b.bytes());
            return match op {
                CompareOp::Equal | CompareOp::Identical => a == b,
                CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
                CompareOp::Less => a < b,
                CompareOp::LessEqual => a <= b,
                CompareOp::Greater => a > b,
                CompareOp::GreaterEqual => a >= b,
            };
        }
        if matches!(ty, Type::Bool | Type::BoolLiteral(_)) {
            let a = a.bytes()[0] != 0;
            let b = b.bytes()[0] != 0;
            return match op {
                CompareOp::Equal | CompareOp::Identical => a == b,
                CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
                _ => unreachable!("ordering on bool rejected in analysis"),
            };
        }
        let a = int_from_bytes(ty, a.bytes());
        let b = int_from_bytes(ty, b.bytes());
        match op {
            CompareOp::Equal | CompareOp::Identical => a == b,
            CompareOp::NotEqual | CompareOp::NotIdentical => a != b,
            CompareOp::Less => a < b,
            CompareOp::LessEqual => a <= b,
            CompareOp::Greater => a > b,
            CompareOp::GreaterEqual => a >= b,
        }
    }

    /// Structural equality of two heap values of one static type.
    fn deep_equals(&self, ty: &Type, a: Address, b: Address) -> bool {
        if a == 0 || b == 0 {
            return a == b;
        }
        match ty {
            Type::Any => a == b,
            Type::StringLiteral(encoding, _) => {
                let unit = encoding.unit_size();
                let (la, lb) = (self.heap.length(a), self.heap.length(b));
                la == lb
                    && self.heap.read(
                        self.heap.data_offset(a) + 8,
                        unit * la as usize,
                    ) == self.heap.read(self.heap.data_offset(b) + 8, unit * lb as usize)
            }
            Type::Array { component, .. } => {
                let (la, lb) = (self.heap.length(a), self.heap.length(b));
                if la != lb {
                    return false;
                }
                let size = value_size(component);
                if component.is_reference() {
                    for index in 0..la as usize {
                        let read = |address: Address| {
                            u64::from_le_bytes(
                                self.heap
                                    .read(self.heap.data_offset(address) + 8 + size * index, 8)
                                    .try_into()
                                    .unwrap(),
                            )
                        };
                        if !self.deep_equals(component, read(a), read(b)) {
                            return false;
                        }
                    }
                    true
                } else {
                    self.heap
                        .read(self.heap.data_offset(a) + 8, size * la as usize)
                        == self.heap.read(self.heap.data_offset(b) + 8, size * lb as usize)
                }
            }
            Type::Tuple(members) => {
                let (ia, ib) = (self.heap.identity(a), self.heap.identity(b));
                members.iter().enumerate().all(|(index, member)| {
                    self.members_equal(
                        member,
                        (a, ia.member_offsets[index], ia.member_sizes[index]),
                        (b, ib.member_offsets[index], ib.member_sizes[index]),
                    )
                })
            }
            Type::Structure(members) => {
                let (ia, ib) = (self.heap.identity(a), self.heap.identity(b));
                members.iter().all(|(name, member)| {
                    let (oa, sa) = ia.member_offset_by_name(name).expect("member present");
                    let (ob, sb) = ib.member_offset_by_name(name).expect("member present");
                    self.members_equal(member, (a, oa, sa), (b, ob, sb))
                })
            }
            _ => false,
        }
    }

    fn members_equal(
        &self,
        member: &Type,
        (a, a_offset, a_size): (Address, usize, usize),
        (b, b_offset, b_size): (Address, usize, usize),
    ) -> bool {
        let a_bytes = self.heap.read(self.heap.data_offset(a) + a_offset, a_size);
        let b_bytes = self.heap.read(self.heap.data_offset(b) + b_offset, b_size);
        if member.is_reference() {
            let a = u64::from_le_bytes(a_bytes.try_into().unwrap());
            let b = u64::from_le_bytes(b_bytes.try_into().unwrap());
            self.deep_equals(member, a, b)
        } else {
            a_bytes == b_bytes
        }
    }

    // ==================== Value helpers ====================

    fn member_location(&self, address: Address, selector: &FieldSelector) -> (usize, usize) {
        let identity = self.heap.identity(address);
        let data = self.heap.data_offset(address);
        match selector {
            FieldSelector::Position(index) => (
                data + identity.member_offsets[*index],
                identity.member_sizes[*index],
            ),
            FieldSelector::Name(name) => {
                let (offset, size) = identity
                    .member_offset_by_name(name)
                    .expect("member present in identity");
                (data + offset, size)
            }
        }
    }

    fn allocate_string(
        &mut self,
        ty: &Type,
        kind_encoding: StringEncoding,
        value: &[char],
    ) -> Address {
        let encoding = match ty {
            Type::StringLiteral(encoding, _) => *encoding,
            Type::Array { component, .. } => match component.as_ref() {
                Type::Uint16 => StringEncoding::Utf16,
                Type::Uint32 => StringEncoding::Utf32,
                _ => StringEncoding::Utf8,
            },
            _ => kind_encoding,
        };
        let units = encode_units(encoding, value);
        let identity = match ty {
            Type::Array { .. } => identity_for(ty),
            _ => ruleslang_runtime::intern(ruleslang_runtime::TypeIdentity::string(
                encoding.unit_size(),
            )),
        };
        let address = self.heap.allocate(identity, 8 + units.len());
        let data = self.heap.data_offset(address);
        self.heap
            .write_u64(data, (units.len() / encoding.unit_size()) as u64);
        self.heap.write(data + 8, &units);
        address
    }

    fn pop_to_slot(&mut self, offset: usize, size: usize) {
        let mut bytes = vec![0u8; size];
        self.stack.pop_bytes(size, &mut bytes);
        self.stack.write_at(self.frame_base + offset, &bytes);
    }

    fn pop_to_heap(&mut self, offset: usize, size: usize) {
        let mut bytes = vec![0u8; size];
        self.stack.pop_bytes(size, &mut bytes);
        self.heap.write(offset, &bytes);
    }

    fn push_numeric(&mut self, ty: &Type, value: i128) {
        match ty {
            Type::Sint8 => self.stack.push(value as i8),
            Type::Sint16 => self.stack.push(value as i16),
            Type::Sint32 => self.stack.push(value as i32),
            Type::Sint64 | Type::SintLiteral(_) => self.stack.push(value as i64),
            Type::Uint8 => self.stack.push(value as u8),
            Type::Uint16 => self.stack.push(value as u16),
            Type::Uint32 => self.stack.push(value as u32),
            Type::Uint64 | Type::UintLiteral(_) => self.stack.push(value as u64),
            Type::Fp32 => self.stack.push(value as f32),
            Type::Fp64 | Type::FloatLiteral(_) => self.stack.push(value as f64),
            other => unreachable!("numeric push of {}", other),
        }
    }

    fn push_float(&mut self, ty: &Type, value: f64) {
        match ty {
            Type::Fp32 => self.stack.push(value as f32),
            Type::Fp64 | Type::FloatLiteral(_) => self.stack.push(value),
            other => unreachable!("float push of {}", other),
        }
    }

    fn pop_int(&mut self, ty: &Type) -> i128 {
        match ty {
            Type::Sint8 => self.stack.pop::<i8>() as i128,
            Type::Sint16 => self.stack.pop::<i16>() as i128,
            Type::Sint32 => self.stack.pop::<i32>() as i128,
            Type::Sint64 | Type::SintLiteral(_) => self.stack.pop::<i64>() as i128,
            Type::Uint8 => self.stack.pop::<u8>() as i128,
            Type::Uint16 => self.stack.pop::<u16>() as i128,
            Type::Uint32 => self.stack.pop::<u32>() as i128,
            Type::Uint64 | Type::UintLiteral(_) => self.stack.pop::<u64>() as i128,
            other => unreachable!("integer pop of {}", other),
        }
    }

    fn pop_float(&mut self, ty: &Type) -> f64 {
        match ty {
            Type::Fp32 => self.stack.pop::<f32>() as f64,
            Type::Fp64 | Type::FloatLiteral(_) => self.stack.pop::<f64>(),
            other => self.pop_int(other) as f64,
        }
    }

    fn check_null(&self, address: Address, span: Span) -> SourceResult<()> {
        self.heap.check_null(address).map_err(|e| runtime(e, span))
    }
}

fn runtime(error: RuntimeError, span: Span) -> SourceError {
    SourceError::new(error.to_string(), span)
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Remainder => a % b,
        BinaryOp::Power => a.powf(b),
        _ => unreachable!("bit operation on floats"),
    }
}

/// Two's-complement integer operation; results wrap at the target width
/// when pushed.
fn int_binary(op: BinaryOp, a: i128, b: i128, ty: &Type) -> Result<i128, RuntimeError> {
    Ok(match op {
        BinaryOp::Add => (a as i64).wrapping_add(b as i64) as i128,
        BinaryOp::Subtract => (a as i64).wrapping_sub(b as i64) as i128,
        BinaryOp::Multiply => (a as i64).wrapping_mul(b as i64) as i128,
        BinaryOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Remainder => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a % b
        }
        BinaryOp::Power => {
            if b < 0 {
                match a {
                    1 => 1,
                    -1 => {
                        if b % 2 == 0 {
                            1
                        } else {
                            -1
                        }
                    }
                    _ => 0,
                }
            } else {
                let exponent = b.min(u32::MAX as i128) as u32;
                (a as i64).wrapping_pow(exponent) as i128
            }
        }
        BinaryOp::ShiftLeft => {
            let amount = shift_amount(b, ty);
            ((a as i64) << amount) as i128
        }
        BinaryOp::ShiftRight => {
            let amount = shift_amount(b, ty);
            let signed = matches!(ty.integer_width(), Some((true, _)));
            if signed {
                ((a as i64) >> amount) as i128
            } else {
                ((a as i64 as u64) >> amount) as i128
            }
        }
        BinaryOp::ShiftRightLogical => {
            let amount = shift_amount(b, ty);
            let (_, bits) = ty.integer_width().unwrap_or((true, 64));
            let mask = if bits == 64 {
                u64::MAX
            } else {
                (1u64 << bits) - 1
            };
            (((a as i64 as u64) & mask) >> amount) as i128
        }
        BinaryOp::BitAnd => ((a as i64 as u64) & (b as i64 as u64)) as i128,
        BinaryOp::BitOr => ((a as i64 as u64) | (b as i64 as u64)) as i128,
        BinaryOp::BitXor => ((a as i64 as u64) ^ (b as i64 as u64)) as i128,
    })
}

fn shift_amount(b: i128, ty: &Type) -> u32 {
    let (_, bits) = ty.integer_width().unwrap_or((true, 64));
    (b.rem_euclid(bits as i128)) as u32
}

fn encode_units(encoding: StringEncoding, value: &[char]) -> Vec<u8> {
    match encoding {
        StringEncoding::Utf8 => value.iter().collect::<String>().into_bytes(),
        StringEncoding::Utf16 => {
            let mut out = Vec::new();
            let mut buffer = [0u16; 2];
            for c in value {
                for unit in c.encode_utf16(&mut buffer) {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            out
        }
        StringEncoding::Utf32 => value
            .iter()
            .flat_map(|c| (*c as u32).to_le_bytes())
            .collect(),
    }
}

pub(crate) fn int_from_bytes(ty: &Type, bytes: &[u8]) -> i128 {
    match ty {
        Type::Sint8 => i8::from_le_bytes(bytes.try_into().unwrap()) as i128,
        Type::Sint16 => i16::from_le_bytes(bytes.try_into().unwrap()) as i128,
        Type::Sint32 => i32::from_le_bytes(bytes.try_into().unwrap()) as i128,
        Type::Sint64 | Type::SintLiteral(_) => {
            i64::from_le_bytes(bytes.try_into().unwrap()) as i128
        }
        Type::Uint8 => bytes[0] as i128,
        Type::Uint16 => u16::from_le_bytes(bytes.try_into().unwrap()) as i128,
        Type::Uint32 => u32::from_le_bytes(bytes.try_into().unwrap()) as i128,
        Type::Uint64 | Type::UintLiteral(_) => {
            u64::from_le_bytes(bytes.try_into().unwrap()) as i128
        }
        Type::Bool | Type::BoolLiteral(_) => (bytes[0] != 0) as i128,
        other => unreachable!("integer read of {}", other),
    }
}

pub(crate) fn int_to_bytes(ty: &Type, value: i128) -> Vec<u8> {
    match ty {
        Type::Sint8 => (value as i8).to_le_bytes().to_vec(),
        Type::Sint16 => (value as i16).to_le_bytes().to_vec(),
        Type::Sint32 => (value as i32).to_le_bytes().to_vec(),
        Type::Sint64 => (value as i64).to_le_bytes().to_vec(),
        Type::Uint8 => (value as u8).to_le_bytes().to_vec(),
        Type::Uint16 => (value as u16).to_le_bytes().to_vec(),
        Type::Uint32 => (value as u32).to_le_bytes().to_vec(),
        Type::Uint64 => (value as u64).to_le_bytes().to_vec(),
        Type::Bool => vec![(value != 0) as u8],
        other => unreachable!("integer write of {}", other),
    }
}

pub(crate) fn float_from_bytes(ty: &Type, bytes: &[u8]) -> f64 {
    match ty {
        Type::Fp32 => f32::from_le_bytes(bytes.try_into().unwrap()) as f64,
        Type::Fp64 | Type::FloatLiteral(_) => f64::from_le_bytes(bytes.try_into().unwrap()),
        other => int_from_bytes(other, bytes) as f64,
    }
}

fn float_to_bytes(ty: &Type, value: f64) -> Vec<u8> {
    match ty {
        Type::Fp32 => (value as f32).to_le_bytes().to_vec(),
        Type::Fp64 => value.to_le_bytes().to_vec(),
        other => unreachable!("float write of {}", other),
    }
}
