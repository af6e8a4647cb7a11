// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime state: heap, handles, contexts and module records.

pub mod conversions;
pub mod module;
pub mod object;
pub mod value;

use std::ffi::c_void;

use bitflags::bitflags;
use rustc_hash::FxHashSet;

pub use module::{ModuleId, ModuleState, ModuleStatus};
pub use object::{Heap, JsObject, ObjectKind, PropertyFlags, PropertyKey, SymbolTable};
pub use value::{JsValueType, ObjectId, SymbolId, Value};

use crate::error::{JsErrorCode, JsResult};
use crate::gc::{HandleTable, HandleTarget, JsRef};
use crate::vm::builtins::{self, ErrorKind, Realm};

bitflags! {
    /// Runtime creation attributes.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct JsRuntimeAttributes: u32 {
        /// Run collection on the calling thread only
        const DISABLE_BACKGROUND_WORK = 0x0000_0001;
        /// Allow the host to interrupt running script
        const ALLOW_SCRIPT_INTERRUPT = 0x0000_0002;
        /// Host drives idle-time work
        const ENABLE_IDLE_PROCESSING = 0x0000_0004;
        /// Interpret only
        const DISABLE_NATIVE_CODE_GENERATION = 0x0000_0008;
        /// Reject `eval` and `Function`
        const DISABLE_EVAL = 0x0000_0010;
        /// Enable experimental language features
        const ENABLE_EXPERIMENTAL_FEATURES = 0x0000_0020;
        /// Report `js_set_exception` to an attached debugger
        const DISPATCH_SET_EXCEPTIONS_TO_DEBUGGER = 0x0000_0040;
        /// Report out-of-memory as an error instead of aborting
        const DISABLE_FATAL_ON_OOM = 0x0000_0080;
    }
}

/// Index of a context within its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u32);

/// Per-context state.
pub struct ContextState {
    /// Canonical handle
    pub handle: JsRef,
    /// Global object and intrinsics
    pub realm: Realm,
    /// Pending exception
    pub exception: Option<Value>,
}

/// Everything a runtime owns.
pub struct RuntimeState {
    /// Runtime id encoded into every ref
    pub id: u16,
    /// Attributes the runtime was created with
    pub attributes: JsRuntimeAttributes,
    /// Handle table
    pub handles: HandleTable,
    /// Object heap
    pub heap: Heap,
    /// Symbol table
    pub symbols: SymbolTable,
    /// Contexts, by id
    pub contexts: Vec<ContextState>,
    /// Module records, by id
    pub modules: Vec<ModuleState>,
}

impl RuntimeState {
    /// Creates an empty runtime.
    pub fn new(id: u16, attributes: JsRuntimeAttributes) -> Self {
        Self {
            id,
            attributes,
            handles: HandleTable::new(id),
            heap: Heap::default(),
            symbols: SymbolTable::default(),
            contexts: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Creates a context with a fresh realm.
    pub fn create_context(&mut self) -> ContextId {
        let id = ContextId(self.contexts.len() as u32);
        let realm = builtins::create_realm(&mut self.heap);
        let handle = self.handles.insert(HandleTarget::Context(id));
        self.contexts.push(ContextState {
            handle,
            realm,
            exception: None,
        });
        id
    }

    /// Returns the context with the given id.
    pub fn context(&self, id: ContextId) -> &ContextState {
        &self.contexts[id.0 as usize]
    }

    /// Returns the context with the given id mutably.
    pub fn context_mut(&mut self, id: ContextId) -> &mut ContextState {
        &mut self.contexts[id.0 as usize]
    }

    /// Returns the module with the given id.
    pub fn module(&self, id: ModuleId) -> &ModuleState {
        &self.modules[id.0 as usize]
    }

    /// Returns the module with the given id mutably.
    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleState {
        &mut self.modules[id.0 as usize]
    }

    /// Allocates a module record in `context`.
    pub fn create_module(
        &mut self,
        context: ContextId,
        referencing: Option<ModuleId>,
        specifier: Option<std::rc::Rc<str>>,
    ) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        let handle = self.handles.insert(HandleTarget::Module(id));
        self.modules
            .push(ModuleState::new(handle, context, referencing, specifier));
        id
    }

    /// Hands a value to the host as a fresh, unreferenced handle.
    pub fn new_ref(&mut self, value: Value) -> JsRef {
        self.handles.insert(HandleTarget::Value(value))
    }

    /// Resolves a value handle.
    pub fn value(&self, reference: JsRef) -> JsResult<Value> {
        match self.handles.get(reference) {
            Some(entry) => match &entry.target {
                HandleTarget::Value(value) => Ok(value.clone()),
                _ => Err(JsErrorCode::InvalidArgument),
            },
            None if reference.is_valid() => Err(JsErrorCode::InvalidArgument),
            None => Err(JsErrorCode::NullArgument),
        }
    }

    /// Resolves a context handle.
    pub fn context_id(&self, reference: JsRef) -> JsResult<ContextId> {
        match self.handles.get(reference).map(|entry| &entry.target) {
            Some(HandleTarget::Context(id)) => Ok(*id),
            _ => Err(JsErrorCode::InvalidArgument),
        }
    }

    /// Resolves a module handle.
    pub fn module_id(&self, reference: JsRef) -> JsResult<ModuleId> {
        match self.handles.get(reference).map(|entry| &entry.target) {
            Some(HandleTarget::Module(id)) => Ok(*id),
            _ => Err(JsErrorCode::InvalidArgument),
        }
    }

    /// Creates an error object in `context`'s realm.
    pub fn create_error(&mut self, context: ContextId, kind: ErrorKind, message: &str) -> Value {
        let prototype = self.context(context).realm.error_prototype(kind);
        builtins::create_error_object(&mut self.heap, prototype, message)
    }

    /// Walks `referencing` links up to the parentless module.
    pub fn root_of(&self, mut id: ModuleId) -> ModuleId {
        let mut hops = 0;
        while let Some(parent) = self.module(id).referencing {
            id = parent;
            hops += 1;
            if hops > self.modules.len() {
                break;
            }
        }
        id
    }

    /// Modules reachable from `root` through resolved imports, root first.
    pub fn graph(&self, root: ModuleId) -> Vec<ModuleId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            for (_, dep) in self.module(id).requested.iter().rev() {
                stack.push(*dep);
            }
        }
        order
    }

    /// True once no module in the graph is still waiting for source or imports.
    pub fn graph_settled(&self, root: ModuleId) -> bool {
        self.graph(root).into_iter().all(|id| {
            !matches!(
                self.module(id).status,
                ModuleStatus::Initialized | ModuleStatus::Parsing
            )
        })
    }

    /// First failure found in the graph.
    pub fn graph_error(&self, root: ModuleId) -> Option<Value> {
        self.graph(root)
            .into_iter()
            .find_map(|id| self.module(id).error.clone())
    }

    /// Finds the nearest module on the referencing chain that carries a
    /// callback, returning the callback with that module's host pointer.
    pub fn find_callback<T: Copy>(
        &self,
        mut id: ModuleId,
        select: impl Fn(&ModuleState) -> Option<T>,
    ) -> Option<(T, *mut c_void)> {
        let mut hops = 0;
        loop {
            let module = self.module(id);
            if let Some(callback) = select(module) {
                return Some((callback, module.host_defined));
            }
            id = module.referencing?;
            hops += 1;
            if hops > self.modules.len() {
                return None;
            }
        }
    }
}
