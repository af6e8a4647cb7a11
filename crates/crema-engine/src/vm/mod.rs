// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module linking and evaluation.
//!
//! - `builtins.rs` - global object setup and built-in functions
//! - `operations.rs` - abstract operations (conversions, property access)
//! - `linker.rs` - binding instantiation, export resolution, namespaces
//! - `interpreter.rs` - tree-walking execution of module bodies

pub mod builtins;
pub mod interpreter;
pub mod linker;
pub mod operations;

use crate::runtime::Value;

/// A thrown script value.
#[derive(Debug, Clone, PartialEq)]
pub struct Throw(pub Value);

/// Result of running script: a value or a thrown exception.
pub type Completion<T> = Result<T, Throw>;
