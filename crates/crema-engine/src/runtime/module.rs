// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Engine-side module records.

use std::ffi::c_void;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::value::{ObjectId, Value};
use super::ContextId;
use crate::ast;
use crate::error::JsErrorCode;
use crate::gc::JsRef;

/// Handle to a module record.
pub type JsModuleRecord = JsRef;

/// Handle to a value.
pub type JsValueRef = JsRef;

/// Host-chosen cookie identifying a source text.
pub type JsSourceContext = u64;

/// Called once per distinct import specifier while a module is parsed.
///
/// The host stores the resolved module in `dependent_module` and returns
/// [`JsErrorCode::NoError`], or sets a pending exception and returns any
/// other code.
pub type FetchImportedModuleCallback = unsafe extern "C" fn(
    host_defined: *mut c_void,
    referencing_module: JsModuleRecord,
    specifier: JsValueRef,
    dependent_module: *mut JsModuleRecord,
) -> JsErrorCode;

/// Called once when a root module and its dependency graph finished loading.
///
/// `exception` is [`JsRef::INVALID`] on success.
pub type NotifyModuleReadyCallback = unsafe extern "C" fn(
    host_defined: *mut c_void,
    referencing_module: JsModuleRecord,
    exception: JsValueRef,
) -> JsErrorCode;

/// Selector for `js_get_module_host_info`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleHostInfoKind {
    /// Error the module failed with
    Exception = 1,
    /// Opaque host pointer passed to callbacks
    HostDefined = 2,
    /// Ready notification callback
    NotifyModuleReadyCallback = 3,
    /// Static import fetch callback
    FetchImportedModuleCallback = 4,
    /// Fetch callback for imports issued from script
    FetchImportedModuleFromScriptCallback = 5,
    /// Module URL, informational
    Url = 6,
}

/// A host info slot together with its value.
#[derive(Debug, Clone, Copy)]
pub enum ModuleHostInfo {
    /// Marks the module as failed with the given error value
    Exception(JsValueRef),
    /// Opaque host pointer
    HostDefined(*mut c_void),
    /// Ready notification callback, `None` to clear
    NotifyModuleReadyCallback(Option<NotifyModuleReadyCallback>),
    /// Static import fetch callback, `None` to clear
    FetchImportedModuleCallback(Option<FetchImportedModuleCallback>),
    /// Script import fetch callback, `None` to clear
    FetchImportedModuleFromScriptCallback(Option<FetchImportedModuleCallback>),
    /// Module URL
    Url(JsValueRef),
}

impl ModuleHostInfo {
    /// The slot this info targets.
    pub fn kind(&self) -> ModuleHostInfoKind {
        match self {
            ModuleHostInfo::Exception(_) => ModuleHostInfoKind::Exception,
            ModuleHostInfo::HostDefined(_) => ModuleHostInfoKind::HostDefined,
            ModuleHostInfo::NotifyModuleReadyCallback(_) => ModuleHostInfoKind::NotifyModuleReadyCallback,
            ModuleHostInfo::FetchImportedModuleCallback(_) => ModuleHostInfoKind::FetchImportedModuleCallback,
            ModuleHostInfo::FetchImportedModuleFromScriptCallback(_) => {
                ModuleHostInfoKind::FetchImportedModuleFromScriptCallback
            }
            ModuleHostInfo::Url(_) => ModuleHostInfoKind::Url,
        }
    }
}

/// Index of a module record within its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub(crate) u32);

/// Module lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Created, no source yet
    Initialized,
    /// Source parsed, imports still being fetched
    Parsing,
    /// Source parsed and all imports fetched
    Parsed,
    /// Bindings instantiated
    Linked,
    /// Body running
    Evaluating,
    /// Body finished
    Evaluated,
    /// Failed; `error` holds the reason
    Errored,
}

/// A module-scope binding. `None` means uninitialized (temporal dead zone).
#[derive(Debug, Clone)]
pub struct Binding {
    /// Current value
    pub value: Option<Value>,
    /// `let`/`var` bindings are mutable, `const` ones are not
    pub mutable: bool,
}

/// Where an imported name reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportBinding {
    /// A named export of another module
    Export {
        /// Module that exports the name
        module: ModuleId,
        /// Export name
        name: String,
    },
    /// The namespace object of another module
    Namespace(ModuleId),
}

/// The engine's view of a module record.
pub struct ModuleState {
    /// Canonical handle
    pub handle: JsRef,
    /// Context the record was created in
    pub context: ContextId,
    /// Module whose import created this record
    pub referencing: Option<ModuleId>,
    /// Specifier the record was created for
    pub specifier: Option<Rc<str>>,
    /// Host pointer passed to callbacks
    pub host_defined: *mut c_void,
    /// Static import fetch callback
    pub fetch: Option<FetchImportedModuleCallback>,
    /// Script import fetch callback
    pub fetch_from_script: Option<FetchImportedModuleCallback>,
    /// Ready callback
    pub notify: Option<NotifyModuleReadyCallback>,
    /// URL host info
    pub url: Option<Value>,
    /// Lifecycle state
    pub status: ModuleStatus,
    /// Failure reason once `Errored`
    pub error: Option<Value>,
    /// Parsed source
    pub ast: Option<Rc<ast::Module>>,
    /// Source context cookie supplied at parse time
    pub source_context: JsSourceContext,
    /// Resolved imports in source order
    pub requested: Vec<(String, ModuleId)>,
    /// Module scope
    pub environment: FxHashMap<String, Binding>,
    /// Imported bindings
    pub imports: FxHashMap<String, ImportBinding>,
    /// Export name to local binding
    pub exports: FxHashMap<String, String>,
    /// Namespace object, created on first request
    pub namespace: Option<ObjectId>,
    /// Whether the ready callback already fired for this root
    pub notified: bool,
}

impl ModuleState {
    /// Creates a record in the `Initialized` state.
    pub fn new(
        handle: JsRef,
        context: ContextId,
        referencing: Option<ModuleId>,
        specifier: Option<Rc<str>>,
    ) -> Self {
        Self {
            handle,
            context,
            referencing,
            specifier,
            host_defined: std::ptr::null_mut(),
            fetch: None,
            fetch_from_script: None,
            notify: None,
            url: None,
            status: ModuleStatus::Initialized,
            error: None,
            ast: None,
            source_context: 0,
            requested: Vec::new(),
            environment: FxHashMap::default(),
            imports: FxHashMap::default(),
            exports: FxHashMap::default(),
            namespace: None,
            notified: false,
        }
    }

    /// Records a failure.
    pub fn fail(&mut self, error: Value) {
        self.status = ModuleStatus::Errored;
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Module that a specifier resolved to, if fetched.
    pub fn requested_module(&self, specifier: &str) -> Option<ModuleId> {
        self.requested
            .iter()
            .find(|(name, _)| name == specifier)
            .map(|(_, id)| *id)
    }
}
