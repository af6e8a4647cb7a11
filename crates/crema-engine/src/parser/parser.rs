// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module items and statements.

use super::ParseError;
use crate::ast::*;
use crate::lexer::{Scanner, Token, TokenKind};

/// A recursive descent parser for ES modules.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    pub(super) current: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    pub fn new(source: &'a str) -> Self {
        let mut scanner = Scanner::new(source);
        let current = scanner.next_token();
        Self { scanner, current }
    }

    /// Parses the source code into a module.
    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut body = Vec::new();

        while !self.is_at_end() {
            let item = match self.current.kind {
                TokenKind::Import => ModuleItem::Import(self.parse_import()?),
                TokenKind::Export => ModuleItem::Export(self.parse_export()?),
                _ => ModuleItem::Statement(self.parse_statement()?),
            };
            body.push(item);
        }

        let module = Module { body };
        let mut seen: Vec<String> = Vec::new();
        for (exported, _) in module.export_entries() {
            if seen.contains(&exported) {
                return Err(ParseError {
                    message: format!("Duplicate export of '{}'", exported),
                    offset: 0,
                });
            }
            seen.push(exported);
        }

        Ok(module)
    }

    fn parse_import(&mut self) -> Result<ImportDeclaration, ParseError> {
        self.advance(); // consume 'import'

        if let TokenKind::String(source) = &self.current.kind {
            let source = source.clone();
            self.advance();
            self.consume_semicolon()?;
            return Ok(ImportDeclaration {
                specifiers: Vec::new(),
                source,
            });
        }

        let mut specifiers = Vec::new();

        if matches!(self.current.kind, TokenKind::Identifier(_)) {
            specifiers.push(ImportSpecifier::Default(self.expect_identifier()?));
            if !self.check(&TokenKind::Comma) {
                return self.finish_import(specifiers);
            }
            self.advance();
        }

        match self.current.kind {
            TokenKind::Star => {
                self.advance();
                self.expect_contextual("as")?;
                specifiers.push(ImportSpecifier::Namespace(self.expect_identifier()?));
            }
            TokenKind::LeftBrace => {
                self.advance();
                while !self.check(&TokenKind::RightBrace) {
                    let imported = self.expect_module_export_name()?;
                    let local = if self.check_contextual("as") {
                        self.advance();
                        self.expect_identifier()?
                    } else if TokenKind::from_word(&imported).is_some() {
                        return Err(self.error(format!("Unexpected reserved word '{}'", imported)));
                    } else {
                        Identifier { name: imported.clone() }
                    };
                    specifiers.push(ImportSpecifier::Named { imported, local });

                    if !self.check(&TokenKind::RightBrace) {
                        self.expect(&TokenKind::Comma)?;
                    }
                }
                self.advance(); // consume '}'
            }
            _ => return Err(self.unexpected()),
        }

        self.finish_import(specifiers)
    }

    fn finish_import(
        &mut self,
        specifiers: Vec<ImportSpecifier>,
    ) -> Result<ImportDeclaration, ParseError> {
        self.expect_contextual("from")?;
        let source = self.expect_string()?;
        self.consume_semicolon()?;
        Ok(ImportDeclaration { specifiers, source })
    }

    fn parse_export(&mut self) -> Result<ExportDeclaration, ParseError> {
        self.advance(); // consume 'export'

        match self.current.kind {
            TokenKind::Default => {
                self.advance();
                let expression = self.parse_assignment()?;
                self.consume_semicolon()?;
                Ok(ExportDeclaration::Default(expression))
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let declaration = self.parse_variable_declaration()?;
                Ok(ExportDeclaration::Variable(declaration))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut specifiers = Vec::new();
                while !self.check(&TokenKind::RightBrace) {
                    let local = self.expect_identifier()?.name;
                    let exported = if self.check_contextual("as") {
                        self.advance();
                        self.expect_module_export_name()?
                    } else {
                        local.clone()
                    };
                    specifiers.push(ExportSpecifier { local, exported });

                    if !self.check(&TokenKind::RightBrace) {
                        self.expect(&TokenKind::Comma)?;
                    }
                }
                self.advance(); // consume '}'
                self.consume_semicolon()?;
                Ok(ExportDeclaration::Named(specifiers))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parses a single statement.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.current.kind {
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                Ok(Statement::VariableDeclaration(self.parse_variable_declaration()?))
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::LeftBrace => self.parse_block_statement(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty)
            }
            TokenKind::Import | TokenKind::Export => {
                Err(self.error("Import and export declarations may only appear at top level of a module"))
            }
            _ => {
                let expression = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<VariableDeclaration, ParseError> {
        let kind = match self.current.kind {
            TokenKind::Var => VariableKind::Var,
            TokenKind::Let => VariableKind::Let,
            TokenKind::Const => VariableKind::Const,
            _ => return Err(self.error("Expected variable keyword")),
        };
        self.advance();

        let mut declarations = Vec::new();

        loop {
            let id = self.expect_identifier()?;
            let init = if self.check(&TokenKind::Equal) {
                self.advance();
                Some(self.parse_assignment()?)
            } else if kind == VariableKind::Const {
                return Err(self.error("Missing initializer in const declaration"));
            } else {
                None
            };

            declarations.push(VariableDeclarator { id, init });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        self.consume_semicolon()?;
        Ok(VariableDeclaration { kind, declarations })
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'if'
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;

        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.check(&TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Statement::If(IfStatement {
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_throw_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'throw'
        if self.current.newline_before {
            return Err(self.error("Illegal newline after throw"));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Statement::Throw(argument))
    }

    fn parse_block_statement(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume '{'
        let mut body = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.parse_statement()?);
        }

        self.expect(&TokenKind::RightBrace)?;
        Ok(Statement::Block(body))
    }

    // Helper methods

    pub(super) fn advance(&mut self) {
        self.current = self.scanner.next_token();
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn check_contextual(&self, word: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Identifier(name) if name == word)
    }

    pub(super) fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_contextual(&mut self, word: &str) -> Result<(), ParseError> {
        if self.check_contextual(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    pub(super) fn expect_identifier(&mut self) -> Result<Identifier, ParseError> {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let id = Identifier { name: name.clone() };
            self.advance();
            Ok(id)
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        if let TokenKind::String(value) = &self.current.kind {
            let value = value.clone();
            self.advance();
            Ok(value)
        } else {
            Err(self.unexpected())
        }
    }

    /// Identifier, reserved word or string naming an export.
    fn expect_module_export_name(&mut self) -> Result<String, ParseError> {
        match &self.current.kind {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => self.expect_property_name(),
        }
    }

    /// Identifier or reserved word in property position.
    pub(super) fn expect_property_name(&mut self) -> Result<String, ParseError> {
        let name = match &self.current.kind {
            TokenKind::Identifier(name) => name.clone(),
            other => match other.keyword_text() {
                Some(text) => text.to_string(),
                None => return Err(self.unexpected()),
            },
        };
        self.advance();
        Ok(name)
    }

    /// Automatic semicolon insertion.
    pub(super) fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        match self.current.kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ if self.current.newline_before => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    pub(super) fn is_at_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    pub(super) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            offset: self.current.span.start,
        }
    }

    pub(super) fn unexpected(&self) -> ParseError {
        let message = match &self.current.kind {
            TokenKind::Eof => "Unexpected end of input".to_string(),
            TokenKind::Invalid => "Invalid or unexpected token".to_string(),
            TokenKind::Identifier(name) => format!("Unexpected identifier '{}'", name),
            TokenKind::String(_) => "Unexpected string".to_string(),
            TokenKind::Number(_) => "Unexpected number".to_string(),
            other => match other.keyword_text() {
                Some(text) => format!("Unexpected token '{}'", text),
                None => format!("Unexpected token {:?}", other),
            },
        };
        ParseError {
            message,
            offset: self.current.span.start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Module {
        Parser::new(src).parse_module().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        Parser::new(src).parse_module().unwrap_err()
    }

    #[test]
    fn test_parse_default_import() {
        let module = parse_ok("import a from 'answer'; export default a;");
        assert_eq!(module.body.len(), 2);
        assert_eq!(module.requested_modules(), vec!["answer".to_string()]);
        assert_eq!(
            module.export_entries(),
            vec![("default".to_string(), DEFAULT_EXPORT_BINDING.to_string())]
        );
    }

    #[test]
    fn test_parse_import_forms() {
        let module = parse_ok(
            "import def, { a, b as c, default as d } from 'x'\nimport * as ns from 'y'\nimport 'z'",
        );
        let ModuleItem::Import(first) = &module.body[0] else {
            panic!("expected import");
        };
        assert_eq!(first.specifiers.len(), 4);
        assert_eq!(first.specifiers[3].local().name, "d");
        assert!(matches!(
            &first.specifiers[2],
            ImportSpecifier::Named { imported, local } if imported == "b" && local.name == "c"
        ));
        assert_eq!(module.requested_modules(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_requested_modules_are_distinct() {
        let module = parse_ok("import a from 'shared'; import { b } from 'shared'; import c from 'other';");
        assert_eq!(module.requested_modules(), vec!["shared", "other"]);
    }

    #[test]
    fn test_parse_export_forms() {
        let module = parse_ok("export const a = 1, b = 2; let c = 3; export { c as default2, a as alias };");
        let names: Vec<String> = module.export_entries().into_iter().map(|(e, _)| e).collect();
        assert_eq!(names, vec!["a", "b", "default2", "alias"]);
    }

    #[test]
    fn test_duplicate_export_is_error() {
        let err = parse_err("export const a = 1; export { a };");
        assert!(err.message.contains("Duplicate export"));
    }

    #[test]
    fn test_automatic_semicolons() {
        let module = parse_ok("const a = 1\nconst b = 2\nexport default a + b");
        assert_eq!(module.body.len(), 3);
        assert!(parse_err("const a = 1 const b = 2").message.contains("Unexpected token 'const'"));
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse_err("const a;").message.contains("Missing initializer"));
    }

    #[test]
    fn test_nested_import_rejected() {
        assert!(parse_err("{ import a from 'b' }").message.contains("top level"));
    }

    #[test]
    fn test_throw_statement() {
        let module = parse_ok("throw new Error('foo'); export default 'foo'");
        assert!(matches!(
            &module.body[0],
            ModuleItem::Statement(Statement::Throw(Expression::New(_)))
        ));
    }

    #[test]
    fn test_if_else() {
        let module = parse_ok("let x; if (1 < 2) { x = 'a' } else x = 'b';");
        assert!(matches!(&module.body[1], ModuleItem::Statement(Statement::If(s)) if s.alternate.is_some()));
    }

    #[test]
    fn test_error_reports_offset() {
        let err = parse_err("let x = ;");
        assert_eq!(err.offset, 8);
    }
}
