// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression parsing, lowest precedence first.

use super::{ParseError, Parser};
use crate::ast::*;
use crate::lexer::TokenKind;
use crate::runtime::conversions::number_to_string;

impl<'a> Parser<'a> {
    /// Parses an expression.
    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_assignment()
    }

    pub(super) fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_conditional()?;

        if self.check(&TokenKind::Equal) {
            if !matches!(expr, Expression::Identifier(_) | Expression::Member(_)) {
                return Err(self.error("Invalid left-hand side in assignment"));
            }
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expression::Assignment(AssignmentExpression {
                target: Box::new(expr),
                value: Box::new(value),
            }));
        }

        Ok(expr)
    }

    fn parse_conditional(&mut self) -> Result<Expression, ParseError> {
        let test = self.parse_coalesce()?;

        if self.check(&TokenKind::Question) {
            self.advance();
            let consequent = self.parse_assignment()?;
            self.expect(&TokenKind::Colon)?;
            let alternate = self.parse_assignment()?;

            return Ok(Expression::Conditional(ConditionalExpression {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            }));
        }

        Ok(test)
    }

    fn parse_coalesce(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_or()?;

        while self.check(&TokenKind::QuestionQuestion) {
            self.advance();
            let right = self.parse_logical_or()?;
            left = logical(LogicalOperator::Coalesce, left, right);
        }

        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;

        while self.check(&TokenKind::PipePipe) {
            self.advance();
            let right = self.parse_logical_and()?;
            left = logical(LogicalOperator::Or, left, right);
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;

        while self.check(&TokenKind::AmpersandAmpersand) {
            self.advance();
            let right = self.parse_equality()?;
            left = logical(LogicalOperator::And, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;

        loop {
            let operator = match self.current.kind {
                TokenKind::EqualEqual => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::StrictEqual => BinaryOperator::StrictEqual,
                TokenKind::StrictNotEqual => BinaryOperator::StrictNotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(operator, left, right);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let operator = match self.current.kind {
                TokenKind::LessThan => BinaryOperator::LessThan,
                TokenKind::LessThanEqual => BinaryOperator::LessThanEqual,
                TokenKind::GreaterThan => BinaryOperator::GreaterThan,
                TokenKind::GreaterThanEqual => BinaryOperator::GreaterThanEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(operator, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let operator = match self.current.kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(operator, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_exponent()?;

        loop {
            let operator = match self.current.kind {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                TokenKind::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = binary(operator, left, right);
        }

        Ok(left)
    }

    /// `**` is right associative and may not follow a bare unary operator.
    fn parse_exponent(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_unary()?;

        if self.check(&TokenKind::StarStar) {
            if matches!(left, Expression::Unary(..)) {
                return Err(self.error(
                    "Unary operator used immediately before exponentiation expression",
                ));
            }
            self.advance();
            let right = self.parse_exponent()?;
            return Ok(binary(BinaryOperator::Exponent, left, right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let operator = match self.current.kind {
            TokenKind::Bang => UnaryOperator::Not,
            TokenKind::Minus => UnaryOperator::Minus,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Typeof => UnaryOperator::Typeof,
            TokenKind::Void => UnaryOperator::Void,
            _ => return self.parse_call(),
        };

        self.advance();
        let argument = self.parse_unary()?;
        Ok(Expression::Unary(operator, Box::new(argument)))
    }

    fn parse_call(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary()?
        };

        loop {
            if self.check(&TokenKind::LeftParen) {
                let arguments = self.parse_arguments()?;
                expr = Expression::Call(CallExpression {
                    callee: Box::new(expr),
                    arguments,
                });
            } else if let Some(member) = self.parse_member_suffix(&mut expr)? {
                expr = member;
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_new_expression(&mut self) -> Result<Expression, ParseError> {
        self.advance(); // consume 'new'

        let mut callee = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary()?
        };
        while let Some(member) = self.parse_member_suffix(&mut callee)? {
            callee = member;
        }

        // Arguments are optional with 'new'
        let arguments = if self.check(&TokenKind::LeftParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        Ok(Expression::New(CallExpression {
            callee: Box::new(callee),
            arguments,
        }))
    }

    /// Parses `.name` or `[expr]` applied to `object`, if present.
    fn parse_member_suffix(
        &mut self,
        object: &mut Expression,
    ) -> Result<Option<Expression>, ParseError> {
        let property = if self.check(&TokenKind::Dot) {
            self.advance();
            PropertyName::Static(self.expect_property_name()?)
        } else if self.check(&TokenKind::LeftBracket) {
            self.advance();
            let property = self.parse_expression()?;
            self.expect(&TokenKind::RightBracket)?;
            PropertyName::Computed(Box::new(property))
        } else {
            return Ok(None);
        };

        let object = std::mem::replace(object, Expression::Literal(Literal::Null));
        Ok(Some(Expression::Member(MemberExpression {
            object: Box::new(object),
            property,
        })))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            args.push(self.parse_assignment()?);
            if !self.check(&TokenKind::RightParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }

        self.advance(); // consume ')'
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let expr = match &self.current.kind {
            TokenKind::Number(n) => Expression::Literal(Literal::Number(*n)),
            TokenKind::String(s) => Expression::Literal(Literal::String(s.clone())),
            TokenKind::True => Expression::Literal(Literal::Boolean(true)),
            TokenKind::False => Expression::Literal(Literal::Boolean(false)),
            TokenKind::Null => Expression::Literal(Literal::Null),
            TokenKind::Identifier(name) => Expression::Identifier(Identifier { name: name.clone() }),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            TokenKind::LeftBrace => return self.parse_object_literal(),
            _ => return Err(self.unexpected()),
        };

        self.advance();
        Ok(expr)
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        self.advance(); // consume '{'
        let mut properties = Vec::new();

        while !self.check(&TokenKind::RightBrace) {
            let shorthand = match &self.current.kind {
                TokenKind::Identifier(name) => Some(name.clone()),
                _ => None,
            };

            let key = match &self.current.kind {
                TokenKind::String(s) => {
                    let key = s.clone();
                    self.advance();
                    PropertyName::Static(key)
                }
                TokenKind::Number(n) => {
                    let key = number_to_string(*n);
                    self.advance();
                    PropertyName::Static(key)
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.parse_assignment()?;
                    self.expect(&TokenKind::RightBracket)?;
                    PropertyName::Computed(Box::new(key))
                }
                _ => PropertyName::Static(self.expect_property_name()?),
            };

            let value = match shorthand {
                Some(name) if matches!(self.current.kind, TokenKind::Comma | TokenKind::RightBrace) => {
                    Expression::Identifier(Identifier { name })
                }
                _ => {
                    self.expect(&TokenKind::Colon)?;
                    self.parse_assignment()?
                }
            };

            properties.push(Property { key, value });

            if !self.check(&TokenKind::RightBrace) {
                self.expect(&TokenKind::Comma)?;
            }
        }

        self.advance(); // consume '}'
        Ok(Expression::Object(properties))
    }
}

fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::Logical(LogicalExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expression {
        Parser::new(src).parse_expression().unwrap()
    }

    #[test]
    fn test_precedence() {
        let Expression::Binary(add) = expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(add.operator, BinaryOperator::Add);
        assert!(matches!(*add.right, Expression::Binary(ref m) if m.operator == BinaryOperator::Multiply));
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let Expression::Binary(outer) = expr("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert!(matches!(*outer.left, Expression::Literal(Literal::Number(n)) if n == 2.0));
        assert!(matches!(*outer.right, Expression::Binary(_)));
    }

    #[test]
    fn test_unary_before_exponent_is_error() {
        assert!(Parser::new("-2 ** 2").parse_expression().is_err());
    }

    #[test]
    fn test_keyword_member_and_computed_access() {
        let Expression::Member(outer) = expr("globalThis[Symbol.for('k')]") else {
            panic!("expected member");
        };
        let PropertyName::Computed(inner) = outer.property else {
            panic!("expected computed property");
        };
        let Expression::Call(call) = *inner else {
            panic!("expected call");
        };
        assert!(matches!(
            *call.callee,
            Expression::Member(MemberExpression { property: PropertyName::Static(ref p), .. }) if p == "for"
        ));
    }

    #[test]
    fn test_new_with_member_callee() {
        let Expression::New(call) = expr("new ns.Error('x')") else {
            panic!("expected new");
        };
        assert!(matches!(*call.callee, Expression::Member(_)));
        assert_eq!(call.arguments.len(), 1);
    }

    #[test]
    fn test_object_literal_forms() {
        let Expression::Object(props) = expr("{ a: 1, b, 'c': 2, 3: 4, [k]: 5, default: 6, }") else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 6);
        assert_eq!(props[1].value, Expression::Identifier(Identifier { name: "b".into() }));
        assert_eq!(props[3].key, PropertyName::Static("3".into()));
        assert!(matches!(props[4].key, PropertyName::Computed(_)));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(Parser::new("1 = 2").parse_expression().is_err());
    }

    #[test]
    fn test_logical_and_conditional() {
        assert!(matches!(expr("a ?? b || c"), Expression::Logical(ref l) if l.operator == LogicalOperator::Coalesce));
        assert!(matches!(expr("a ? b : c"), Expression::Conditional(_)));
    }
}
