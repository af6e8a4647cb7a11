// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # crema-engine
//!
//! A small module-capable JavaScript engine with a JSRT-style host API.
//!
//! ## Overview
//!
//! The engine is driven entirely through the free functions in [`jsrt`]:
//! - Runtimes, contexts and a per-thread current context
//! - Reference-counted [`JsRef`] handles with before-collect callbacks
//! - A pending-exception slot per context
//! - Module records whose imports are resolved by host callbacks invoked
//!   synchronously while the module is parsed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crema_engine::*;
//!
//! let runtime = js_create_runtime(JsRuntimeAttributes::empty())?;
//! let context = js_create_context(runtime)?;
//! js_set_current_context(context)?;
//!
//! let module = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID)?;
//! js_parse_module_source(module, 0, b"export default 6 * 7;", ParseModuleSourceFlags::DataIsUtf8)?;
//! js_module_evaluation(module)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod error;
pub mod gc;
pub mod jsrt;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod vm;

pub use error::{JsErrorCode, JsResult};
pub use gc::{BeforeCollectCallback, JsRef};
pub use jsrt::*;
pub use runtime::module::{
    FetchImportedModuleCallback, JsModuleRecord, JsSourceContext, JsValueRef, ModuleHostInfo, ModuleHostInfoKind,
    NotifyModuleReadyCallback,
};
pub use runtime::{JsRuntimeAttributes, JsValueType, PropertyFlags};
