// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Execution contexts and scopes.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

use crema_engine::{
    js_bool_to_value, js_call_function, js_convert_value_to_string, js_create_context, js_create_error,
    js_create_object, js_create_property_id, js_create_string, js_define_property, js_double_to_number,
    js_get_and_clear_exception, js_get_global_object, js_get_module_namespace, js_get_null_value,
    js_get_property, js_get_property_id_from_symbol, js_get_undefined_value, js_has_exception,
    js_module_evaluation, js_set_current_context, js_set_exception, js_set_property, js_string_to_pointer,
    JsErrorCode, JsPropertyId, JsRef, JsResult, PropertyFlags,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{HostError, Result};
use crate::handle::{PinnedCallbacks, SafeHandle};
use crate::module_system::{ModuleLoader, ModuleRecord, ModuleRecordFactory};
use crate::runtime::Runtime;
use crate::value::JsValue;

thread_local! {
    static ACTIVE_SCOPE: Cell<Option<JsRef>> = const { Cell::new(None) };
}

pub(crate) struct ContextInner {
    handle: SafeHandle,
    disposed: Cell<bool>,
    undefined: OnceCell<JsValue>,
    null: OnceCell<JsValue>,
    modules: RefCell<Vec<ModuleRecord>>,
    factory: ModuleRecordFactory,
    hooks: Box<PinnedCallbacks>,
    // Dropped last: every handle above belongs to this runtime.
    runtime: Runtime,
}

impl ContextInner {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let modules = std::mem::take(&mut *self.modules.borrow_mut());
        for module in modules.iter().rev() {
            module.dispose();
        }
        self.hooks.unregister_all();
        self.handle.release();
        debug!(context = self.handle.get().bits(), modules = modules.len(), "context disposed");
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// An execution context: a global object, a pending-exception slot and the
/// module records evaluated in it.
///
/// Engine calls need the context to be current on the thread. Public
/// methods make it current on their own; [`Context::scope`] keeps it
/// current across a block of calls.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

/// Keeps a context current until dropped.
pub struct ContextScope<'a> {
    context: &'a Context,
    owned: bool,
}

impl ContextScope<'_> {
    /// The context this scope entered.
    pub fn context(&self) -> &Context {
        self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        ACTIVE_SCOPE.with(|active| active.set(None));
        if let Err(code) = js_set_current_context(JsRef::INVALID) {
            debug!(?code, "failed to leave context");
        }
    }
}

impl Context {
    pub(crate) fn new(runtime: Runtime) -> Result<Self> {
        let reference = js_create_context(runtime.handle())?;
        let context = Self {
            inner: Rc::new(ContextInner {
                handle: SafeHandle::new(reference)?,
                disposed: Cell::new(false),
                undefined: OnceCell::new(),
                null: OnceCell::new(),
                modules: RefCell::new(Vec::new()),
                factory: ModuleRecordFactory::default(),
                hooks: PinnedCallbacks::new(),
                runtime,
            }),
        };
        debug!(context = reference.bits(), "context created");
        Ok(context)
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<ContextInner> {
        Rc::downgrade(&self.inner)
    }

    /// The engine context ref.
    pub fn handle(&self) -> JsRef {
        self.inner.handle.get()
    }

    /// The owning runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Records created for this context, by engine ref.
    pub fn module_record_factory(&self) -> &ModuleRecordFactory {
        &self.inner.factory
    }

    /// Root module records created by [`evaluate_module`](Self::evaluate_module).
    pub fn module_records(&self) -> Vec<ModuleRecord> {
        self.inner.modules.borrow().clone()
    }

    /// True after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn check(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(HostError::Disposed("context"));
        }
        Ok(())
    }

    /// Makes this context current until the returned scope is dropped.
    ///
    /// Only one scope may be open per thread; opening a second one fails
    /// with [`HostError::ScopeActive`].
    pub fn scope(&self) -> Result<ContextScope<'_>> {
        self.check()?;
        if ACTIVE_SCOPE.with(Cell::get).is_some() {
            return Err(HostError::ScopeActive);
        }
        self.open_scope()
    }

    /// Makes this context current unless it already is.
    pub(crate) fn enter(&self) -> Result<ContextScope<'_>> {
        self.check()?;
        match ACTIVE_SCOPE.with(Cell::get) {
            Some(active) if active == self.handle() => Ok(ContextScope {
                context: self,
                owned: false,
            }),
            Some(_) => Err(HostError::ScopeActive),
            None => self.open_scope(),
        }
    }

    fn open_scope(&self) -> Result<ContextScope<'_>> {
        js_set_current_context(self.handle())?;
        ACTIVE_SCOPE.with(|active| active.set(Some(self.handle())));
        Ok(ContextScope {
            context: self,
            owned: true,
        })
    }

    /// True if a scope is open on this thread for this context.
    pub fn has_current_scope(&self) -> bool {
        ACTIVE_SCOPE.with(Cell::get) == Some(self.handle())
    }

    pub(crate) fn wrap(&self, reference: JsRef) -> Result<JsValue> {
        JsValue::wrap(&self.inner, reference)
    }

    /// Maps a failed engine call, turning a thrown script error into
    /// [`HostError::Script`]. Expects the context to be current.
    pub(crate) fn check_script<T>(&self, result: JsResult<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(JsErrorCode::ScriptException | JsErrorCode::ScriptCompile) => Err(self.script_error()),
            Err(code) => Err(HostError::Engine(code)),
        }
    }

    /// Describes the pending exception, leaving it pending.
    pub(crate) fn script_error(&self) -> HostError {
        let exception = match js_get_and_clear_exception() {
            Ok(exception) => exception,
            Err(code) => return HostError::Engine(code),
        };
        let message = js_convert_value_to_string(exception)
            .and_then(js_string_to_pointer)
            .unwrap_or_else(|_| "<exception could not be converted to a string>".to_string());
        if let Err(code) = js_set_exception(exception) {
            return HostError::Engine(code);
        }
        HostError::Script { message }
    }

    /// Sets a new `Error` with `message` as the pending exception.
    pub(crate) fn raise(&self, message: &str) -> Result<()> {
        let error = self.create_error(message)?;
        self.set_exception(&error)
    }

    /// `undefined`
    pub fn undefined(&self) -> Result<JsValue> {
        if let Some(value) = self.inner.undefined.get() {
            self.check()?;
            return Ok(value.clone());
        }
        let _scope = self.enter()?;
        let value = self.wrap(js_get_undefined_value()?)?;
        Ok(self.inner.undefined.get_or_init(|| value).clone())
    }

    /// `null`
    pub fn null(&self) -> Result<JsValue> {
        if let Some(value) = self.inner.null.get() {
            self.check()?;
            return Ok(value.clone());
        }
        let _scope = self.enter()?;
        let value = self.wrap(js_get_null_value()?)?;
        Ok(self.inner.null.get_or_init(|| value).clone())
    }

    /// The global object.
    pub fn global_object(&self) -> Result<JsValue> {
        let _scope = self.enter()?;
        self.wrap(js_get_global_object()?)
    }

    /// Creates a string.
    pub fn create_string(&self, content: &str) -> Result<JsValue> {
        let _scope = self.enter()?;
        self.wrap(js_create_string(content)?)
    }

    /// Creates a number.
    pub fn create_number(&self, value: f64) -> Result<JsValue> {
        let _scope = self.enter()?;
        self.wrap(js_double_to_number(value)?)
    }

    /// Creates a boolean.
    pub fn create_bool(&self, value: bool) -> Result<JsValue> {
        let _scope = self.enter()?;
        self.wrap(js_bool_to_value(value)?)
    }

    /// Creates an empty object.
    pub fn create_object(&self) -> Result<JsValue> {
        let _scope = self.enter()?;
        self.wrap(js_create_object()?)
    }

    /// Creates an `Error` with the given message.
    pub fn create_error(&self, message: &str) -> Result<JsValue> {
        let _scope = self.enter()?;
        let message = js_create_string(message)?;
        self.wrap(js_create_error(message)?)
    }

    /// `Symbol.for(key)`
    pub fn symbol_for(&self, key: &str) -> Result<JsValue> {
        let _scope = self.enter()?;
        let global = self.global_object()?;
        let symbol = self.get_property(&global, "Symbol")?;
        let symbol_for = self.get_property(&symbol, "for")?;
        let key = self.create_string(key)?;
        let result = js_call_function(symbol_for.handle(), &[symbol.handle(), key.handle()]);
        let result = self.check_script(result)?;
        self.wrap(result)
    }

    /// Reads `object[name]`.
    pub fn get_property(&self, object: &JsValue, name: &str) -> Result<JsValue> {
        let _scope = self.enter()?;
        let id = js_create_property_id(name);
        let result = self.check_script(js_get_property(object.handle(), &id))?;
        self.wrap(result)
    }

    /// Reads `object[symbol]`.
    pub fn get_symbol_property(&self, object: &JsValue, symbol: &JsValue) -> Result<JsValue> {
        let _scope = self.enter()?;
        let id = js_get_property_id_from_symbol(symbol.handle())?;
        let result = self.check_script(js_get_property(object.handle(), &id))?;
        self.wrap(result)
    }

    /// Assigns `object[name] = value` with strict-mode rules.
    pub fn set_property(&self, object: &JsValue, name: &str, value: &JsValue) -> Result<()> {
        let _scope = self.enter()?;
        let id = js_create_property_id(name);
        self.check_script(js_set_property(object.handle(), &id, value.handle(), true))
    }

    /// Defines a data property. Returns false when an existing property
    /// cannot be redefined.
    pub fn define_property(&self, object: &JsValue, name: &str, value: &JsValue, flags: PropertyFlags) -> Result<bool> {
        let _scope = self.enter()?;
        let id = js_create_property_id(name);
        self.define(object, &id, value, flags)
    }

    /// Defines a symbol-keyed data property.
    pub fn define_symbol_property(
        &self,
        object: &JsValue,
        symbol: &JsValue,
        value: &JsValue,
        flags: PropertyFlags,
    ) -> Result<bool> {
        let _scope = self.enter()?;
        let id = js_get_property_id_from_symbol(symbol.handle())?;
        self.define(object, &id, value, flags)
    }

    fn define(&self, object: &JsValue, id: &JsPropertyId, value: &JsValue, flags: PropertyFlags) -> Result<bool> {
        Ok(js_define_property(object.handle(), id, value.handle(), flags)?)
    }

    /// True if an exception is pending.
    pub fn has_exception(&self) -> Result<bool> {
        let _scope = self.enter()?;
        Ok(js_has_exception()?)
    }

    /// Takes the pending exception, if any.
    pub fn get_and_clear_exception(&self) -> Result<Option<JsValue>> {
        let _scope = self.enter()?;
        if !js_has_exception()? {
            return Ok(None);
        }
        let exception = js_get_and_clear_exception()?;
        self.wrap(exception).map(Some)
    }

    /// Makes `exception` the pending exception.
    pub fn set_exception(&self, exception: &JsValue) -> Result<()> {
        let _scope = self.enter()?;
        Ok(js_set_exception(exception.handle())?)
    }

    /// Runs `hook` right before the engine collects `value`.
    pub fn on_before_collect(&self, value: &JsValue, hook: impl FnOnce() + 'static) -> Result<()> {
        self.check()?;
        self.inner.hooks.register(value.handle(), hook)
    }

    /// Parses `script` as a root module, loads its imports through
    /// `loader`, evaluates the graph and returns the root's default export.
    ///
    /// A script error comes back as [`HostError::Script`] and stays pending
    /// on the context. A graph that never finished loading without raising
    /// an error is [`HostError::ModuleNotReady`].
    #[instrument(level = "debug", skip_all)]
    pub fn evaluate_module(&self, script: &str, loader: Option<Rc<dyn ModuleLoader>>) -> Result<JsValue> {
        let _scope = self.enter()?;

        let name = Uuid::new_v4().to_string();
        let specifier = self.create_string(&name)?;
        let root = self.inner.factory.create_module_record(self, &specifier, None, loader)?;
        self.inner.modules.borrow_mut().push(root.clone());

        root.parse_module_source(script)?;
        if !root.is_ready() {
            if js_has_exception()? {
                return Err(self.script_error());
            }
            return Err(HostError::ModuleNotReady(name));
        }

        self.check_script(js_module_evaluation(root.handle()))?;
        let namespace = self.check_script(js_get_module_namespace(root.handle()))?;
        let namespace = self.wrap(namespace)?;
        debug!(module = %name, imports = root.imported_module_names().len(), "module evaluated");
        self.get_property(&namespace, "default")
    }

    /// Releases every module record, hook and engine reference the context
    /// holds. Calling it again does nothing.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("handle", &self.handle())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
