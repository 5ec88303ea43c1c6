//! The semantic analyzer.
//!
//! A single pass over the syntactic tree with a [`Context`] of nested
//! scopes: resolves names, infers and checks types, inserts implicit
//! conversions, folds literal subtrees, allocates frame slots, and
//! validates control flow. Produces a [`SemProgram`].

mod expr;

use std::collections::{HashMap, HashSet};

use ruleslang_parser::ast::{
    DeclarationKind, Expression, ExpressionKind, NamedType, Statement, StatementKind,
    TypeExpression, TypeExpressionKind,
};
use ruleslang_parser::{SourceError, SourceResult, Span, Token};

use crate::types::{join, lift_literal, value_size, Type};

use super::context::{BlockKind, Context, Variable};
use super::tree::{FieldSelector, SemExpr, SemFunction, SemProgram, SemStmt, SemStmtKind};

/// Byte offset of the reserved slot holding the rule-input address.
pub const CONTEXT_SLOT: usize = 0;

/// Allocates size-aligned slots within one function frame.
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    size: usize,
}

impl FrameAllocator {
    fn new() -> Self {
        Self { size: 0 }
    }

    fn allocate(&mut self, value_size: usize) -> usize {
        let align = value_size.max(1);
        let offset = self.size.div_ceil(align) * align;
        self.size = offset + value_size;
        offset
    }
}

pub struct Analyzer {
    pub(crate) context: Context,
    functions: Vec<SemFunction>,
    frames: Vec<FrameAllocator>,
    input_type: Type,
    output_type: Option<Type>,
    /// Names each defined type refers to, for the cycle check.
    type_references: HashMap<String, HashSet<String>>,
}

impl Analyzer {
    /// Analyzer for a rule program (top-level scope).
    pub fn new_program() -> Self {
        Self::new(BlockKind::TopLevel)
    }

    /// Analyzer for an interactive shell session; state persists across
    /// submissions.
    pub fn new_shell() -> Self {
        Self::new(BlockKind::Shell)
    }

    fn new(root: BlockKind) -> Self {
        let mut frame = FrameAllocator::new();
        // Slot 0 carries the input address (null in the shell).
        let reserved = frame.allocate(8);
        debug_assert_eq!(reserved, CONTEXT_SLOT);
        Self {
            context: Context::new(root),
            functions: Vec::new(),
            frames: vec![frame],
            input_type: Type::Structure(Vec::new()),
            output_type: None,
            type_references: HashMap::new(),
        }
    }

    /// Analyze a whole rule program.
    pub fn analyze_program(mut self, statements: &[Statement]) -> SourceResult<SemProgram> {
        let statements = self.analyze_statements(statements)?;
        Ok(SemProgram {
            statements,
            functions: self.functions,
            input_type: self.input_type,
            output_type: self.output_type,
            frame_size: self.frames[0].size,
        })
    }

    /// Analyze statements incrementally, keeping scope and frame state
    /// (the shell path).
    pub fn analyze_statements(&mut self, statements: &[Statement]) -> SourceResult<Vec<SemStmt>> {
        let mut out = Vec::new();
        for statement in statements {
            if let Some(sem) = self.analyze_statement(statement)? {
                out.push(sem);
            }
        }
        Ok(out)
    }

    /// Analyze a standalone expression against the current scopes (the
    /// shell's expression mode).
    pub fn analyze_entry_expression(&mut self, expression: &Expression) -> SourceResult<SemExpr> {
        self.analyze_expression(expression, None)
    }

    pub fn functions(&self) -> &[SemFunction] {
        &self.functions
    }

    pub fn input_type(&self) -> &Type {
        &self.input_type
    }

    pub fn output_type(&self) -> Option<&Type> {
        self.output_type.as_ref()
    }

    /// Current size of the root frame (the shell grows it per submission).
    pub fn root_frame_size(&self) -> usize {
        self.frames[0].size
    }

    // ==================== Statements ====================

    fn analyze_statement(&mut self, statement: &Statement) -> SourceResult<Option<SemStmt>> {
        let span = statement.span;
        match &statement.kind {
            StatementKind::TypeDefinition {
                name,
                type_expression,
            } => {
                self.define_type(name, type_expression)?;
                Ok(None)
            }
            StatementKind::VariableDeclaration {
                kind,
                declared_type,
                name,
                value,
            } => self
                .analyze_declaration(*kind, declared_type.as_ref(), name, value.as_ref(), span)
                .map(Some),
            StatementKind::Assignment {
                target,
                operator,
                value,
            } => {
                debug_assert!(operator.is("="), "compound assignment not expanded");
                self.analyze_assignment(target, value, span).map(Some)
            }
            StatementKind::FunctionCallStatement(call) => {
                let ExpressionKind::FunctionCall(callee, arguments) = &call.kind else {
                    return Err(SourceError::new("Expected a call", call.span));
                };
                let (function, arguments) = self.resolve_call(callee, arguments, call.span)?;
                Ok(Some(SemStmt::new(
                    SemStmtKind::Call {
                        function,
                        arguments,
                    },
                    span,
                )))
            }
            StatementKind::ConditionalStatement {
                blocks,
                false_statements,
            } => {
                let mut sem_blocks = Vec::new();
                for (condition, statements) in blocks {
                    let condition = self.analyze_condition(condition)?;
                    self.context.push(BlockKind::Conditional);
                    let statements = self.analyze_statements(statements);
                    self.context.pop();
                    sem_blocks.push((condition, statements?));
                }
                self.context.push(BlockKind::Conditional);
                let else_statements = self.analyze_statements(false_statements);
                self.context.pop();
                Ok(Some(SemStmt::new(
                    SemStmtKind::If {
                        blocks: sem_blocks,
                        else_statements: else_statements?,
                    },
                    span,
                )))
            }
            StatementKind::LoopStatement {
                label,
                condition,
                body,
            } => {
                let condition = self.analyze_condition(condition)?;
                let label = label.as_ref().map(|l| l.source.clone());
                self.context.push(BlockKind::Loop(label.clone()));
                let body = self.analyze_statements(body);
                self.context.pop();
                Ok(Some(SemStmt::new(
                    SemStmtKind::While {
                        label,
                        condition,
                        body: body?,
                    },
                    span,
                )))
            }
            StatementKind::FunctionDefinition {
                name,
                parameters,
                return_type,
                body,
            } => {
                self.define_function(name, parameters, return_type.as_ref(), body, span)?;
                Ok(None)
            }
            StatementKind::ReturnStatement(value) => {
                self.analyze_return(value.as_ref(), span).map(Some)
            }
            StatementKind::BreakStatement(label) => {
                let label = self.check_jump_label(label.as_ref(), "break", span)?;
                Ok(Some(SemStmt::new(SemStmtKind::Break(label), span)))
            }
            StatementKind::ContinueStatement(label) => {
                let label = self.check_jump_label(label.as_ref(), "continue", span)?;
                Ok(Some(SemStmt::new(SemStmtKind::Continue(label), span)))
            }
        }
    }

    fn analyze_declaration(
        &mut self,
        kind: DeclarationKind,
        declared_type: Option<&NamedType>,
        name: &Token,
        value: Option<&Expression>,
        span: Span,
    ) -> SourceResult<SemStmt> {
        let declared = declared_type.map(|t| self.resolve_named_type(t)).transpose()?;
        let value = value
            .map(|v| self.analyze_expression(v, declared.as_ref()))
            .transpose()?;

        let (ty, value) = match (declared, value) {
            (Some(declared), Some(value)) => {
                let value = self.convert(value, &declared)?;
                (declared, Some(value))
            }
            (Some(declared), None) => (declared, None),
            (None, Some(value)) => {
                let ty = match kind {
                    DeclarationKind::Let => value.ty.clone(),
                    DeclarationKind::Var => lift_literal(&value.ty),
                };
                if matches!(ty, Type::NullLiteral) {
                    return Err(SourceError::new(
                        "Cannot infer a type from null; declare one",
                        span,
                    ));
                }
                (ty, Some(value))
            }
            (None, None) => {
                return Err(SourceError::new(
                    "A declaration needs a type or a value",
                    span,
                ));
            }
        };

        let offset = self.frame().allocate(value_size(&ty));
        self.context.declare_variable(
            &name.source,
            Variable {
                offset,
                ty: ty.clone(),
                mutable: kind == DeclarationKind::Var,
            },
            name.span,
        )?;
        Ok(SemStmt::new(SemStmtKind::Declare { offset, ty, value }, span))
    }

    fn analyze_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> SourceResult<SemStmt> {
        match &target.kind {
            ExpressionKind::Name(parts) if parts.len() == 1 => {
                let name = &parts[0];
                let Some(variable) = self.context.lookup_variable(&name.source) else {
                    return Err(SourceError::with_offender(
                        "Unknown name",
                        &name.source,
                        name.span,
                    ));
                };
                if !variable.mutable {
                    return Err(SourceError::with_offender(
                        "Cannot assign to an immutable variable",
                        &name.source,
                        name.span,
                    ));
                }
                let (offset, ty) = (variable.offset, variable.ty.clone());
                let value = self.analyze_expression(value, Some(&ty))?;
                let value = self.convert(value, &ty)?;
                Ok(SemStmt::new(
                    SemStmtKind::AssignSlot { offset, ty, value },
                    span,
                ))
            }
            ExpressionKind::Name(parts) if parts.len() > 1 => {
                let object = self.resolve_name(&parts[..parts.len() - 1], target.span)?;
                let field = parts.last().unwrap();
                self.analyze_member_assignment(object, field, value, span)
            }
            ExpressionKind::FieldAccess(object, field) => {
                let object = self.analyze_expression(object, None)?;
                self.analyze_member_assignment(object, field, value, span)
            }
            ExpressionKind::IndexAccess(object, index) => {
                let object = self.analyze_expression(object, None)?;
                match object.ty.clone() {
                    Type::Array { component, .. } => {
                        let index = self.analyze_index(index)?;
                        let value = self.analyze_expression(value, Some(&component))?;
                        let value = self.convert(value, &component)?;
                        Ok(SemStmt::new(
                            SemStmtKind::AssignIndex {
                                object,
                                index,
                                value,
                            },
                            span,
                        ))
                    }
                    Type::Tuple(members) => {
                        let position = self.constant_index(index, members.len())?;
                        let member = members[position].clone();
                        let value = self.analyze_expression(value, Some(&member))?;
                        let value = self.convert(value, &member)?;
                        Ok(SemStmt::new(
                            SemStmtKind::AssignField {
                                object,
                                selector: FieldSelector::Position(position),
                                value,
                            },
                            span,
                        ))
                    }
                    Type::Structure(members) => {
                        let position = self.constant_index(index, members.len())?;
                        let (member_name, member) = members[position].clone();
                        let value = self.analyze_expression(value, Some(&member))?;
                        let value = self.convert(value, &member)?;
                        Ok(SemStmt::new(
                            SemStmtKind::AssignField {
                                object,
                                selector: FieldSelector::Name(member_name),
                                value,
                            },
                            span,
                        ))
                    }
                    other => Err(SourceError::new(
                        format!("Cannot index a value of type {}", other),
                        target.span,
                    )),
                }
            }
            ExpressionKind::ContextFieldAccess(_) => Err(SourceError::new(
                "Cannot assign to the rule input",
                target.span,
            )),
            _ => Err(SourceError::new(
                "Not an assignable expression",
                target.span,
            )),
        }
    }

    fn analyze_member_assignment(
        &mut self,
        object: SemExpr,
        field: &Token,
        value: &Expression,
        span: Span,
    ) -> SourceResult<SemStmt> {
        let Type::Structure(members) = object.ty.clone() else {
            return Err(SourceError::with_offender(
                format!("No field '{}' on type {}", field.source, object.ty),
                &field.source,
                field.span,
            ));
        };
        let Some((_, member)) = members.iter().find(|(n, _)| *n == field.source) else {
            return Err(SourceError::with_offender(
                "Unknown field",
                &field.source,
                field.span,
            ));
        };
        let value = self.analyze_expression(value, Some(member))?;
        let value = self.convert(value, member)?;
        Ok(SemStmt::new(
            SemStmtKind::AssignField {
                object,
                selector: FieldSelector::Name(field.source.clone()),
                value,
            },
            span,
        ))
    }

    fn analyze_condition(&mut self, condition: &Expression) -> SourceResult<SemExpr> {
        let condition = self.analyze_expression(condition, Some(&Type::Bool))?;
        if !matches!(condition.ty, Type::Bool | Type::BoolLiteral(_)) {
            return Err(SourceError::new(
                format!("Condition must be bool, found {}", condition.ty),
                condition.span,
            ));
        }
        Ok(condition)
    }

    fn analyze_return(
        &mut self,
        value: Option<&Expression>,
        span: Span,
    ) -> SourceResult<SemStmt> {
        match self.context.enclosing_function().cloned() {
            Some(Some(return_type)) => {
                let Some(value) = value else {
                    return Err(SourceError::new(
                        format!("This function must return a {}", return_type),
                        span,
                    ));
                };
                let value = self.analyze_expression(value, Some(&return_type))?;
                let value = self.convert(value, &return_type)?;
                Ok(SemStmt::new(SemStmtKind::Return(Some(value)), span))
            }
            Some(None) => {
                if value.is_some() {
                    return Err(SourceError::new(
                        "This function does not return a value",
                        span,
                    ));
                }
                Ok(SemStmt::new(SemStmtKind::Return(None), span))
            }
            None => {
                // Top level: the rule's result.
                let value = value
                    .map(|v| self.analyze_expression(v, None))
                    .transpose()?;
                if let Some(value) = &value {
                    let lifted = lift_literal(&value.ty);
                    self.output_type = match self.output_type.take() {
                        None => Some(lifted),
                        Some(previous) => Some(join(&previous, &lifted).ok_or_else(|| {
                            SourceError::new(
                                format!(
                                    "Rule returns incompatible types {} and {}",
                                    previous, lifted
                                ),
                                span,
                            )
                        })?),
                    };
                }
                Ok(SemStmt::new(SemStmtKind::Return(value), span))
            }
        }
    }

    fn check_jump_label(
        &self,
        label: Option<&Token>,
        keyword: &str,
        span: Span,
    ) -> SourceResult<Option<String>> {
        let label_name = label.map(|l| l.source.clone());
        if !self.context.has_enclosing_loop(label_name.as_deref()) {
            return match label {
                Some(label) => Err(SourceError::with_offender(
                    "Unknown loop label",
                    &label.source,
                    label.span,
                )),
                None => Err(SourceError::new(
                    format!("'{}' outside of a loop", keyword),
                    span,
                )),
            };
        }
        Ok(label_name)
    }

    fn define_function(
        &mut self,
        name: &Token,
        parameters: &[ruleslang_parser::ast::Parameter],
        return_type: Option<&NamedType>,
        body: &[Statement],
        span: Span,
    ) -> SourceResult<()> {
        let mut parameter_types = Vec::new();
        for parameter in parameters {
            let ty = self.resolve_named_type(&parameter.parameter_type)?;
            parameter_types.push((parameter.name.source.clone(), ty));
        }
        let return_type = return_type.map(|t| self.resolve_named_type(t)).transpose()?;

        // A same-signature overload in scope is a duplicate.
        for id in self.context.lookup_functions(&name.source) {
            let existing = &self.functions[id];
            if existing.parameters.len() == parameter_types.len()
                && existing
                    .parameters
                    .iter()
                    .zip(&parameter_types)
                    .all(|((_, a), (_, b))| a == b)
            {
                return Err(SourceError::with_offender(
                    "A function with this signature is already defined",
                    &name.source,
                    name.span,
                ));
            }
        }

        let id = self.functions.len();
        self.functions.push(SemFunction {
            name: name.source.clone(),
            parameters: parameter_types.clone(),
            parameter_offsets: Vec::new(),
            return_type: return_type.clone(),
            body: Vec::new(),
            frame_size: 0,
        });
        self.context.declare_function(&name.source, id, name.span)?;

        self.context.push(BlockKind::Function(return_type.clone()));
        self.frames.push(FrameAllocator::new());
        let mut parameter_offsets = Vec::new();
        let analysis = (|| {
            for (parameter_name, parameter_type) in &parameter_types {
                let offset = self.frame().allocate(value_size(parameter_type));
                parameter_offsets.push(offset);
                self.context.declare_variable(
                    parameter_name,
                    Variable {
                        offset,
                        ty: parameter_type.clone(),
                        mutable: true,
                    },
                    span,
                )?;
            }
            self.analyze_statements(body)
        })();
        let frame = self.frames.pop().unwrap();
        self.context.pop();
        let body = analysis?;

        if return_type.is_some() && !always_returns(&body) {
            return Err(SourceError::with_offender(
                "Not every path through this function returns a value",
                &name.source,
                name.span,
            ));
        }

        let function = &mut self.functions[id];
        function.parameter_offsets = parameter_offsets;
        function.body = body;
        function.frame_size = frame.size;
        Ok(())
    }

    // ==================== Types ====================

    fn define_type(&mut self, name: &Token, type_expression: &TypeExpression) -> SourceResult<()> {
        let references = collect_type_references(type_expression);
        // Transitive closure over the name-reference graph; a cycle
        // through named types is rejected before insertion.
        let mut closure: HashSet<String> = references.clone();
        let mut pending: Vec<String> = references.iter().cloned().collect();
        while let Some(next) = pending.pop() {
            if let Some(referenced) = self.type_references.get(&next) {
                for reference in referenced {
                    if closure.insert(reference.clone()) {
                        pending.push(reference.clone());
                    }
                }
            }
        }
        if closure.contains(&name.source) {
            return Err(SourceError::with_offender(
                "Cyclic type definition",
                &name.source,
                name.span,
            ));
        }

        let ty = self.resolve_type_expression(type_expression)?;
        if name.source == "Input" && self.context.depth() == 1 {
            let Type::Structure(_) = &ty else {
                return Err(SourceError::new(
                    "The Input type must be a structure",
                    type_expression.span,
                ));
            };
            self.input_type = ty.clone();
        }
        self.type_references.insert(name.source.clone(), references);
        self.context.declare_type(&name.source, ty, name.span)
    }

    pub(crate) fn resolve_type_expression(
        &mut self,
        type_expression: &TypeExpression,
    ) -> SourceResult<Type> {
        match &type_expression.kind {
            TypeExpressionKind::Named(named) => self.resolve_named_type(named),
            TypeExpressionKind::Composite { members } => {
                if members.is_empty() {
                    // The empty-open structure is the any type.
                    return Ok(Type::Any);
                }
                let labeled = members.iter().filter(|(label, _)| label.is_some()).count();
                if labeled == members.len() {
                    let mut out = Vec::new();
                    for (label, member) in members {
                        let label = label.as_ref().unwrap();
                        if out.iter().any(|(n, _)| n == &label.source) {
                            return Err(SourceError::with_offender(
                                "Duplicate member name",
                                &label.source,
                                label.span,
                            ));
                        }
                        out.push((label.source.clone(), self.resolve_type_expression(member)?));
                    }
                    Ok(Type::Structure(out))
                } else if labeled == 0 {
                    let members = members
                        .iter()
                        .map(|(_, member)| self.resolve_type_expression(member))
                        .collect::<SourceResult<Vec<_>>>()?;
                    Ok(Type::Tuple(members))
                } else {
                    Err(SourceError::new(
                        "Either all members or none must be labeled",
                        type_expression.span,
                    ))
                }
            }
        }
    }

    pub(crate) fn resolve_named_type(&mut self, named: &NamedType) -> SourceResult<Type> {
        if named.name.len() > 1 {
            return Err(SourceError::with_offender(
                "Unknown type name",
                named.dotted_name(),
                named.span,
            ));
        }
        let base_name = &named.name[0].source;
        let mut ty = match Type::atomic_by_name(base_name) {
            Some(atomic) => atomic,
            None => match self.context.lookup_type(base_name) {
                Some(ty) => ty.clone(),
                None => {
                    return Err(SourceError::with_offender(
                        "Unknown type name",
                        base_name,
                        named.name[0].span,
                    ));
                }
            },
        };
        for dimension in &named.dimensions {
            let size = match dimension {
                None => None,
                Some(expression) => {
                    let size = self.analyze_expression(expression, None)?;
                    match size.ty {
                        Type::SintLiteral(v) if v >= 0 => Some(v as u64),
                        Type::UintLiteral(v) => Some(v),
                        _ => {
                            return Err(SourceError::new(
                                "Array sizes must be constant integers",
                                expression.span,
                            ));
                        }
                    }
                }
            };
            ty = Type::Array {
                component: Box::new(ty),
                size,
            };
        }
        Ok(ty)
    }

    pub(crate) fn frame(&mut self) -> &mut FrameAllocator {
        self.frames.last_mut().unwrap()
    }
}

/// Whether every path through the statements reaches a `return`.
fn always_returns(statements: &[SemStmt]) -> bool {
    statements.iter().any(|statement| match &statement.kind {
        SemStmtKind::Return(_) => true,
        SemStmtKind::If {
            blocks,
            else_statements,
        } => {
            !else_statements.is_empty()
                && always_returns(else_statements)
                && blocks.iter().all(|(_, block)| always_returns(block))
        }
        _ => false,
    })
}

fn collect_type_references(type_expression: &TypeExpression) -> HashSet<String> {
    fn walk(type_expression: &TypeExpression, out: &mut HashSet<String>) {
        match &type_expression.kind {
            TypeExpressionKind::Named(named) => {
                if named.name.len() == 1 {
                    let base = &named.name[0].source;
                    if Type::atomic_by_name(base).is_none() {
                        out.insert(base.clone());
                    }
                }
            }
            TypeExpressionKind::Composite { members } => {
                for (_, member) in members {
                    walk(member, out);
                }
            }
        }
    }
    let mut out = HashSet::new();
    walk(type_expression, &mut out);
    out
}
