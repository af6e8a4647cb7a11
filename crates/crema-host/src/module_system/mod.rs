// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-driven ES module loading.
//!
//! The engine parses module source and asks the host, through callbacks on
//! the root module record, to resolve each import specifier. Resolution
//! goes through a [`ModuleLoader`]:
//!
//! - Script modules hand back source text, parsed into a new record
//! - Value modules hand back any value, wrapped in a generated module whose
//!   default export it becomes
//! - Loaded modules are cached per root, so each specifier loads once per graph

mod aggregate;
mod factory;
mod fs;
mod loader;
mod memory;
mod module;
mod record;
mod synthesis;

pub use aggregate::AggregateModuleLoader;
pub use factory::ModuleRecordFactory;
pub use fs::FsModuleLoader;
pub use loader::ModuleLoader;
pub use memory::InMemoryModuleLoader;
pub use module::{JsonModule, Module, ModuleKind, NativeModule, ScriptModule, TextModule};
pub use record::ModuleRecord;
