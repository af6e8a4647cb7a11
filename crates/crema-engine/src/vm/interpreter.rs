// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tree-walking execution of module bodies.

use rustc_hash::FxHashMap;

use super::builtins::ErrorKind;
use super::linker;
use super::operations::Hint;
use super::{Completion, Throw};
use crate::ast::{
    self, AssignmentExpression, BinaryExpression, BinaryOperator, CallExpression, ExportDeclaration, Expression,
    Literal, LogicalOperator, ModuleItem, PropertyName, Statement, UnaryOperator, VariableDeclaration, VariableKind,
};
use crate::runtime::module::Binding;
use crate::runtime::{ContextId, JsObject, ModuleId, ObjectKind, PropertyFlags, PropertyKey, RuntimeState, Value};

/// Runs the body of a linked module.
pub fn run_module(state: &mut RuntimeState, context: ContextId, module: ModuleId) -> Completion<()> {
    let Some(body) = state.module(module).ast.clone() else {
        return Ok(());
    };

    let mut interpreter = Interpreter {
        state,
        context,
        module,
        scopes: Vec::new(),
    };

    for item in &body.body {
        match item {
            ModuleItem::Import(_) | ModuleItem::Export(ExportDeclaration::Named(_)) => {}
            ModuleItem::Export(ExportDeclaration::Default(expression)) => {
                let value = interpreter.evaluate(expression)?;
                interpreter.initialize(ast::DEFAULT_EXPORT_BINDING, value);
            }
            ModuleItem::Export(ExportDeclaration::Variable(decl)) => interpreter.declare(decl)?,
            ModuleItem::Statement(statement) => interpreter.execute(statement)?,
        }
    }
    Ok(())
}

/// Result of looking a name up in block and module scopes.
enum Resolution {
    Block(usize),
    Module,
    Import,
    Global,
    Unresolvable,
}

struct Interpreter<'a> {
    state: &'a mut RuntimeState,
    context: ContextId,
    module: ModuleId,
    scopes: Vec<FxHashMap<String, Binding>>,
}

impl Interpreter<'_> {
    fn throw(&mut self, kind: ErrorKind, message: &str) -> Throw {
        self.state.throw_error(self.context, kind, message)
    }

    fn global(&self) -> Value {
        Value::Object(self.state.context(self.context).realm.global)
    }

    fn resolve(&self, name: &str) -> Resolution {
        if let Some(index) = self.scopes.iter().rposition(|scope| scope.contains_key(name)) {
            return Resolution::Block(index);
        }
        let module = self.state.module(self.module);
        if module.environment.contains_key(name) {
            return Resolution::Module;
        }
        if module.imports.contains_key(name) {
            return Resolution::Import;
        }
        let global = self.state.context(self.context).realm.global;
        if self.state.lookup(global, &PropertyKey::name(name)).is_some() {
            return Resolution::Global;
        }
        Resolution::Unresolvable
    }

    fn binding_mut(&mut self, resolution: &Resolution, name: &str) -> Option<&mut Binding> {
        match resolution {
            Resolution::Block(index) => self.scopes[*index].get_mut(name),
            Resolution::Module => self.state.module_mut(self.module).environment.get_mut(name),
            _ => None,
        }
    }

    fn read(&mut self, name: &str) -> Completion<Value> {
        match self.resolve(name) {
            Resolution::Block(index) => match self.scopes[index].get(name).and_then(|b| b.value.clone()) {
                Some(value) => Ok(value),
                None => {
                    let message = format!("Cannot access '{}' before initialization", name);
                    Err(self.throw(ErrorKind::ReferenceError, &message))
                }
            },
            Resolution::Module | Resolution::Import => {
                linker::read_binding(self.state, self.context, self.module, name)
            }
            Resolution::Global => {
                let global = self.global();
                self.state.get_property(self.context, &global, &PropertyKey::name(name))
            }
            Resolution::Unresolvable => {
                let message = format!("{} is not defined", name);
                Err(self.throw(ErrorKind::ReferenceError, &message))
            }
        }
    }

    fn write(&mut self, name: &str, value: Value) -> Completion<()> {
        let resolution = self.resolve(name);
        match resolution {
            Resolution::Block(_) | Resolution::Module => {
                let (initialized, mutable) = match self.binding_mut(&resolution, name) {
                    Some(binding) => (binding.value.is_some(), binding.mutable),
                    None => (false, true),
                };
                if !initialized {
                    let message = format!("Cannot access '{}' before initialization", name);
                    return Err(self.throw(ErrorKind::ReferenceError, &message));
                }
                if !mutable {
                    return Err(self.throw(ErrorKind::TypeError, "Assignment to constant variable."));
                }
                if let Some(binding) = self.binding_mut(&resolution, name) {
                    binding.value = Some(value);
                }
                Ok(())
            }
            Resolution::Import => Err(self.throw(ErrorKind::TypeError, "Assignment to constant variable.")),
            Resolution::Global => {
                let global = self.global();
                self.state
                    .set_property(self.context, &global, PropertyKey::name(name), value, true)
            }
            Resolution::Unresolvable => {
                let message = format!("{} is not defined", name);
                Err(self.throw(ErrorKind::ReferenceError, &message))
            }
        }
    }

    /// Initializes a lexical binding in the innermost scope.
    fn initialize(&mut self, name: &str, value: Value) {
        let environment = match self.scopes.last_mut() {
            Some(scope) => scope,
            None => &mut self.state.module_mut(self.module).environment,
        };
        if let Some(binding) = environment.get_mut(name) {
            binding.value = Some(value);
        }
    }

    fn declare(&mut self, decl: &VariableDeclaration) -> Completion<()> {
        for declarator in &decl.declarations {
            let name = declarator.id.name.as_str();
            match (decl.kind, &declarator.init) {
                (VariableKind::Var, None) => {}
                (VariableKind::Var, Some(init)) => {
                    let value = self.evaluate(init)?;
                    let environment = &mut self.state.module_mut(self.module).environment;
                    if let Some(binding) = environment.get_mut(name) {
                        binding.value = Some(value);
                    }
                }
                (_, init) => {
                    let value = match init {
                        Some(init) => self.evaluate(init)?,
                        None => Value::Undefined,
                    };
                    self.initialize(name, value);
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Completion<()> {
        match statement {
            Statement::VariableDeclaration(decl) => self.declare(decl),
            Statement::Expression(expression) => self.evaluate(expression).map(|_| ()),
            Statement::Block(body) => {
                let mut scope = FxHashMap::default();
                for statement in body {
                    if let Statement::VariableDeclaration(decl) = statement {
                        if decl.kind != VariableKind::Var {
                            for declarator in &decl.declarations {
                                scope.insert(
                                    declarator.id.name.clone(),
                                    Binding {
                                        value: None,
                                        mutable: decl.kind == VariableKind::Let,
                                    },
                                );
                            }
                        }
                    }
                }
                self.scopes.push(scope);
                let result = body.iter().try_for_each(|statement| self.execute(statement));
                self.scopes.pop();
                result
            }
            Statement::If(stmt) => {
                if self.evaluate(&stmt.test)?.to_boolean() {
                    self.execute(&stmt.consequent)
                } else if let Some(alternate) = &stmt.alternate {
                    self.execute(alternate)
                } else {
                    Ok(())
                }
            }
            Statement::Throw(expression) => {
                let value = self.evaluate(expression)?;
                Err(Throw(value))
            }
            Statement::Empty => Ok(()),
        }
    }

    fn evaluate(&mut self, expression: &Expression) -> Completion<Value> {
        match expression {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::string(s.as_str()),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Null => Value::Null,
            }),
            Expression::Identifier(identifier) => self.read(&identifier.name),
            Expression::Object(properties) => {
                let mut object = JsObject::new(ObjectKind::Ordinary, None);
                for property in properties {
                    let key = self.property_key(&property.key)?;
                    let value = self.evaluate(&property.value)?;
                    object.put(key, value, PropertyFlags::DEFAULT);
                }
                Ok(Value::Object(self.state.heap.alloc(object)))
            }
            Expression::Member(member) => {
                let object = self.evaluate(&member.object)?;
                let key = self.property_key(&member.property)?;
                self.state.get_property(self.context, &object, &key)
            }
            Expression::Call(call) => self.call(call, false),
            Expression::New(call) => self.call(call, true),
            Expression::Unary(operator, operand) => self.unary(*operator, operand),
            Expression::Binary(binary) => self.binary(binary),
            Expression::Logical(logical) => {
                let left = self.evaluate(&logical.left)?;
                let short_circuit = match logical.operator {
                    LogicalOperator::And => !left.to_boolean(),
                    LogicalOperator::Or => left.to_boolean(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(&logical.right)
                }
            }
            Expression::Conditional(conditional) => {
                if self.evaluate(&conditional.test)?.to_boolean() {
                    self.evaluate(&conditional.consequent)
                } else {
                    self.evaluate(&conditional.alternate)
                }
            }
            Expression::Assignment(assignment) => self.assign(assignment),
        }
    }

    fn property_key(&mut self, name: &PropertyName) -> Completion<PropertyKey> {
        match name {
            PropertyName::Static(name) => Ok(PropertyKey::name(name)),
            PropertyName::Computed(expression) => {
                let value = self.evaluate(expression)?;
                self.state.to_property_key(self.context, &value)
            }
        }
    }

    fn call(&mut self, call: &CallExpression, construct: bool) -> Completion<Value> {
        let callee = self.evaluate(&call.callee)?;
        let mut args = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            args.push(self.evaluate(argument)?);
        }
        let text = describe(&call.callee);
        self.state.call(self.context, &callee, &args, construct, &text)
    }

    fn unary(&mut self, operator: UnaryOperator, operand: &Expression) -> Completion<Value> {
        if operator == UnaryOperator::Typeof {
            if let Expression::Identifier(identifier) = operand {
                if matches!(self.resolve(&identifier.name), Resolution::Unresolvable) {
                    return Ok(Value::string("undefined"));
                }
            }
            let value = self.evaluate(operand)?;
            return Ok(Value::string(self.state.type_of(&value)));
        }

        let value = self.evaluate(operand)?;
        match operator {
            UnaryOperator::Minus => Ok(Value::Number(-self.state.to_number(self.context, &value)?)),
            UnaryOperator::Plus => Ok(Value::Number(self.state.to_number(self.context, &value)?)),
            UnaryOperator::Not => Ok(Value::Boolean(!value.to_boolean())),
            UnaryOperator::Void | UnaryOperator::Typeof => Ok(Value::Undefined),
        }
    }

    fn binary(&mut self, binary: &BinaryExpression) -> Completion<Value> {
        let left = self.evaluate(&binary.left)?;
        let right = self.evaluate(&binary.right)?;
        let ctx = self.context;

        let number = |this: &mut Self, value: &Value| this.state.to_number(ctx, value);

        Ok(match binary.operator {
            BinaryOperator::Add => {
                let left = self.state.to_primitive(ctx, &left, Hint::Default)?;
                let right = self.state.to_primitive(ctx, &right, Hint::Default)?;
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    let mut text = self.state.to_string(ctx, &left)?.to_string();
                    text.push_str(&self.state.to_string(ctx, &right)?);
                    Value::string(text)
                } else {
                    Value::Number(number(self, &left)? + number(self, &right)?)
                }
            }
            BinaryOperator::Subtract => Value::Number(number(self, &left)? - number(self, &right)?),
            BinaryOperator::Multiply => Value::Number(number(self, &left)? * number(self, &right)?),
            BinaryOperator::Divide => Value::Number(number(self, &left)? / number(self, &right)?),
            BinaryOperator::Modulo => Value::Number(number(self, &left)? % number(self, &right)?),
            BinaryOperator::Exponent => Value::Number(power(number(self, &left)?, number(self, &right)?)),
            BinaryOperator::Equal => Value::Boolean(self.state.loose_equals(ctx, &left, &right)?),
            BinaryOperator::NotEqual => Value::Boolean(!self.state.loose_equals(ctx, &left, &right)?),
            BinaryOperator::StrictEqual => Value::Boolean(left == right),
            BinaryOperator::StrictNotEqual => Value::Boolean(left != right),
            BinaryOperator::LessThan
            | BinaryOperator::LessThanEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanEqual => {
                let left = self.state.to_primitive(ctx, &left, Hint::Number)?;
                let right = self.state.to_primitive(ctx, &right, Hint::Number)?;
                let ordering = match (&left, &right) {
                    (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
                    _ => number(self, &left)?.partial_cmp(&number(self, &right)?),
                };
                Value::Boolean(match (binary.operator, ordering) {
                    (_, None) => false,
                    (BinaryOperator::LessThan, Some(o)) => o.is_lt(),
                    (BinaryOperator::LessThanEqual, Some(o)) => o.is_le(),
                    (BinaryOperator::GreaterThan, Some(o)) => o.is_gt(),
                    (_, Some(o)) => o.is_ge(),
                })
            }
        })
    }

    fn assign(&mut self, assignment: &AssignmentExpression) -> Completion<Value> {
        match &*assignment.target {
            Expression::Identifier(identifier) => {
                let value = self.evaluate(&assignment.value)?;
                self.write(&identifier.name, value.clone())?;
                Ok(value)
            }
            Expression::Member(member) => {
                let object = self.evaluate(&member.object)?;
                let key = self.property_key(&member.property)?;
                let value = self.evaluate(&assignment.value)?;
                self.state
                    .set_property(self.context, &object, key, value.clone(), true)?;
                Ok(value)
            }
            _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }
}

/// `**` with the IEEE cases JavaScript defines differently from `powf`.
fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Source-like rendering of a callee for error messages.
fn describe(expression: &Expression) -> String {
    match expression {
        Expression::Identifier(identifier) => identifier.name.clone(),
        Expression::Member(member) => match &member.property {
            PropertyName::Static(name) => format!("{}.{}", describe(&member.object), name),
            PropertyName::Computed(_) => format!("{}[...]", describe(&member.object)),
        },
        Expression::Call(call) => format!("{}(...)", describe(&call.callee)),
        Expression::Literal(Literal::String(s)) => format!("\"{}\"", s),
        Expression::Literal(Literal::Number(n)) => crate::runtime::conversions::number_to_string(*n),
        Expression::Literal(Literal::Boolean(b)) => b.to_string(),
        Expression::Literal(Literal::Null) => "null".to_string(),
        _ => "expression".to_string(),
    }
}
