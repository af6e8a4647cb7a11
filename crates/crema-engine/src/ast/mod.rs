// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree definitions for ES modules.
//!
//! These structures follow ESTree naming where possible.

/// Local binding name used for `export default <expression>`.
pub const DEFAULT_EXPORT_BINDING: &str = "*default*";

/// A parsed module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Top-level items in source order
    pub body: Vec<ModuleItem>,
}

impl Module {
    /// Returns the distinct import specifiers in the order they first appear.
    pub fn requested_modules(&self) -> Vec<String> {
        let mut requested: Vec<String> = Vec::new();
        for item in &self.body {
            if let ModuleItem::Import(import) = item {
                if !requested.contains(&import.source) {
                    requested.push(import.source.clone());
                }
            }
        }
        requested
    }

    /// Returns `(exported name, local binding)` pairs declared by this module.
    pub fn export_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        for item in &self.body {
            let ModuleItem::Export(export) = item else {
                continue;
            };
            match export {
                ExportDeclaration::Default(_) => {
                    entries.push(("default".to_string(), DEFAULT_EXPORT_BINDING.to_string()));
                }
                ExportDeclaration::Variable(decl) => {
                    for declarator in &decl.declarations {
                        entries.push((declarator.id.name.clone(), declarator.id.name.clone()));
                    }
                }
                ExportDeclaration::Named(specifiers) => {
                    for spec in specifiers {
                        entries.push((spec.exported.clone(), spec.local.clone()));
                    }
                }
            }
        }
        entries
    }
}

/// An item at the top level of a module.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleItem {
    /// `import ... from '...'`
    Import(ImportDeclaration),
    /// `export ...`
    Export(ExportDeclaration),
    /// Any other statement
    Statement(Statement),
}

/// An import declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDeclaration {
    /// Bindings introduced by the import (empty for side-effect imports)
    pub specifiers: Vec<ImportSpecifier>,
    /// The module specifier string
    pub source: String,
}

/// A single binding introduced by an import.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSpecifier {
    /// `import x from`
    Default(Identifier),
    /// `import { a as b } from`
    Named {
        /// Export name in the target module
        imported: String,
        /// Local binding
        local: Identifier,
    },
    /// `import * as ns from`
    Namespace(Identifier),
}

impl ImportSpecifier {
    /// The local binding this specifier introduces.
    pub fn local(&self) -> &Identifier {
        match self {
            ImportSpecifier::Default(local)
            | ImportSpecifier::Named { local, .. }
            | ImportSpecifier::Namespace(local) => local,
        }
    }
}

/// An export declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportDeclaration {
    /// `export default <expression>`
    Default(Expression),
    /// `export const|let|var ...`
    Variable(VariableDeclaration),
    /// `export { a, b as c }`
    Named(Vec<ExportSpecifier>),
}

/// One entry in an `export { ... }` list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpecifier {
    /// Local binding being exported
    pub local: String,
    /// Name visible to importers
    pub exported: String,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Variable declaration (var, let, const)
    VariableDeclaration(VariableDeclaration),
    /// Expression statement
    Expression(Expression),
    /// Block statement { ... }
    Block(Vec<Statement>),
    /// If statement
    If(IfStatement),
    /// Throw statement
    Throw(Expression),
    /// Empty statement (;)
    Empty,
}

/// Variable declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// var
    Var,
    /// let
    Let,
    /// const
    Const,
}

/// A variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    /// Declaration keyword
    pub kind: VariableKind,
    /// Declared bindings
    pub declarations: Vec<VariableDeclarator>,
}

/// A single binding in a variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    /// Binding name
    pub id: Identifier,
    /// Initializer
    pub init: Option<Expression>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// Condition
    pub test: Expression,
    /// Taken branch
    pub consequent: Box<Statement>,
    /// Else branch
    pub alternate: Option<Box<Statement>>,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Literal(Literal),
    /// Identifier reference
    Identifier(Identifier),
    /// Object literal
    Object(Vec<Property>),
    /// Member access
    Member(MemberExpression),
    /// Function call
    Call(CallExpression),
    /// `new` expression
    New(CallExpression),
    /// Unary operation
    Unary(UnaryOperator, Box<Expression>),
    /// Binary operation
    Binary(BinaryExpression),
    /// Short-circuiting logical operation
    Logical(LogicalExpression),
    /// Conditional `test ? a : b`
    Conditional(ConditionalExpression),
    /// Assignment
    Assignment(AssignmentExpression),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Boolean
    Boolean(bool),
    /// null
    Null,
}

/// A property in an object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property key
    pub key: PropertyName,
    /// Property value
    pub value: Expression,
}

/// A property name, either static or computed.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    /// `a` / `'a'` / `1`
    Static(String),
    /// `[expr]`
    Computed(Box<Expression>),
}

/// A member access expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    /// Object being accessed
    pub object: Box<Expression>,
    /// Property being accessed
    pub property: PropertyName,
}

/// A call or `new` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    /// Function being called
    pub callee: Box<Expression>,
    /// Arguments
    pub arguments: Vec<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// -
    Minus,
    /// +
    Plus,
    /// !
    Not,
    /// typeof
    Typeof,
    /// void
    Void,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    /// Operator
    pub operator: BinaryOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand
    pub right: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// +
    Add,
    /// -
    Subtract,
    /// *
    Multiply,
    /// /
    Divide,
    /// %
    Modulo,
    /// **
    Exponent,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// ===
    StrictEqual,
    /// !==
    StrictNotEqual,
    /// <
    LessThan,
    /// <=
    LessThanEqual,
    /// >
    GreaterThan,
    /// >=
    GreaterThanEqual,
}

/// A logical expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    /// Operator
    pub operator: LogicalOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand, evaluated only when needed
    pub right: Box<Expression>,
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// &&
    And,
    /// ||
    Or,
    /// ??
    Coalesce,
}

/// A conditional expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpression {
    /// Condition
    pub test: Box<Expression>,
    /// Value when truthy
    pub consequent: Box<Expression>,
    /// Value when falsy
    pub alternate: Box<Expression>,
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    /// Assignment target (identifier or member expression)
    pub target: Box<Expression>,
    /// Assigned value
    pub value: Box<Expression>,
}
