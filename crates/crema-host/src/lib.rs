// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # crema-host
//!
//! The embedding layer over `crema-engine`. It owns engine handles for the
//! host and drives ES module loading:
//!
//! - Runtimes and contexts with scoped activation
//! - Reference-counted values tied to their context
//! - Module records whose imports are resolved by host loaders
//! - Stock loaders for in-memory, prefixed and file system modules
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use crema_host::{InMemoryModuleLoader, Runtime, RuntimeConfig, TextModule};
//!
//! let runtime = Runtime::new(RuntimeConfig::default())?;
//! let context = runtime.create_context()?;
//! let loader = InMemoryModuleLoader::new().with_module(TextModule::new("greeting", "hello"));
//!
//! let value = context.evaluate_module(
//!     "import greeting from 'greeting'; export default greeting + ' world';",
//!     Some(Rc::new(loader)),
//! )?;
//! assert_eq!(value.to_js_string()?, "hello world");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod module_system;
pub mod runtime;
pub mod value;

pub use crema_engine::{JsErrorCode, JsRef, JsRuntimeAttributes, JsValueType, PropertyFlags};
pub use config::{CremaConfig, LoaderConfig, RuntimeConfig};
pub use context::{Context, ContextScope};
pub use error::{HostError, LoaderError, Result};
pub use module_system::{
    AggregateModuleLoader, FsModuleLoader, InMemoryModuleLoader, JsonModule, Module, ModuleKind, ModuleLoader,
    ModuleRecord, ModuleRecordFactory, NativeModule, ScriptModule, TextModule,
};
pub use runtime::Runtime;
pub use value::JsValue;
