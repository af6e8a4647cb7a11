// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Recursive descent parser for module source text.
//!
//! Statements and module items live in `parser.rs`; the expression
//! precedence chain lives in `expressions.rs`.

mod expressions;
#[allow(clippy::module_inception)]
mod parser;

pub use parser::Parser;

use thiserror::Error;

/// A syntax error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// Human readable description
    pub message: String,
    /// Byte offset into the source
    pub offset: usize,
}

/// Parses module source text.
pub fn parse_module(source: &str) -> Result<crate::ast::Module, ParseError> {
    Parser::new(source).parse_module()
}
