// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lexical analysis for module source text.
//!
//! ## Structure
//!
//! - `scanner.rs` - `Scanner`, which produces tokens on demand
//! - `token.rs` - `Token` and `TokenKind` definitions
//!
//! Tokens record whether a line terminator preceded them so the parser can
//! apply automatic semicolon insertion.

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Span, Token, TokenKind};
