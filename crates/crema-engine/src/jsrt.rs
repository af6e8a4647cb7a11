// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The host API.
//!
//! Runtimes live in a thread-local registry and every other resource is
//! addressed through a [`JsRef`]. Functions that need script state operate
//! on the thread's current context, set with [`js_set_current_context`].
//!
//! Host callbacks (module fetch, ready notification, before-collect) are
//! always invoked with the runtime unlocked, so they may call back into
//! this API.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{JsErrorCode, JsResult};
use crate::gc::{BeforeCollectCallback, Collected, JsRef};
use crate::parser;
use crate::runtime::module::{JsModuleRecord, JsSourceContext, JsValueRef, ModuleHostInfo, ModuleHostInfoKind};
use crate::runtime::{
    ContextId, JsObject, JsRuntimeAttributes, JsValueType, ModuleId, ModuleStatus, ObjectKind, PropertyFlags,
    PropertyKey, RuntimeState, Value,
};
use crate::vm::builtins::ErrorKind;
use crate::vm::{linker, Completion, Throw};

/// Handle to a context.
pub type JsContextRef = JsRef;

/// Handle to a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsRuntimeHandle(u16);

impl JsRuntimeHandle {
    /// The invalid runtime handle.
    pub const INVALID: JsRuntimeHandle = JsRuntimeHandle(0);

    /// Returns true unless this is [`JsRuntimeHandle::INVALID`].
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Encoding of the bytes handed to [`js_parse_module_source`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseModuleSourceFlags {
    /// UTF-16, little endian
    DataIsUtf16Le = 0,
    /// UTF-8
    DataIsUtf8 = 1,
}

/// A property key as passed across the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsPropertyId {
    /// String-named property
    Name(String),
    /// Symbol-keyed property; the ref must name a symbol value
    Symbol(JsValueRef),
}

type SharedRuntime = Rc<RefCell<RuntimeState>>;

thread_local! {
    static RUNTIMES: RefCell<FxHashMap<u16, SharedRuntime>> = RefCell::new(FxHashMap::default());
    static NEXT_RUNTIME: Cell<u16> = const { Cell::new(1) };
    static CURRENT: Cell<Option<(u16, ContextId)>> = const { Cell::new(None) };
}

fn runtime_by_id(id: u16) -> JsResult<SharedRuntime> {
    RUNTIMES
        .with(|runtimes| runtimes.borrow().get(&id).cloned())
        .ok_or(JsErrorCode::InvalidArgument)
}

fn runtime_of(reference: JsRef) -> JsResult<SharedRuntime> {
    if !reference.is_valid() {
        return Err(JsErrorCode::NullArgument);
    }
    runtime_by_id(reference.runtime())
}

fn current() -> JsResult<(SharedRuntime, ContextId)> {
    let (runtime, context) = CURRENT.get().ok_or(JsErrorCode::NoCurrentContext)?;
    Ok((runtime_by_id(runtime)?, context))
}

/// Runs `f` against the current context with the runtime borrowed.
fn with_current<T>(f: impl FnOnce(&mut RuntimeState, ContextId) -> JsResult<T>) -> JsResult<T> {
    let (runtime, context) = current()?;
    let mut state = runtime.borrow_mut();
    f(&mut state, context)
}

/// Like [`with_current`], for calls that may run script.
fn with_script<T>(f: impl FnOnce(&mut RuntimeState, ContextId) -> JsResult<T>) -> JsResult<T> {
    with_current(|state, context| {
        if state.context(context).exception.is_some() {
            return Err(JsErrorCode::InExceptionState);
        }
        f(state, context)
    })
}

/// Moves a script throw into the pending exception slot.
fn complete<T>(state: &mut RuntimeState, context: ContextId, completion: Completion<T>) -> JsResult<T> {
    completion.map_err(|Throw(value)| {
        state.context_mut(context).exception = Some(value);
        JsErrorCode::ScriptException
    })
}

fn notify_collected(collected: Vec<Collected>) {
    for item in collected {
        if let Some((callback, callback_state)) = item.before_collect {
            // SAFETY: the host registered this callback for this ref and
            // keeps `callback_state` valid until the callback runs.
            unsafe { callback(item.reference, callback_state) };
        }
    }
}

fn property_key(state: &RuntimeState, id: &JsPropertyId) -> JsResult<PropertyKey> {
    match id {
        JsPropertyId::Name(name) => Ok(PropertyKey::name(name)),
        JsPropertyId::Symbol(symbol) => match state.value(*symbol)? {
            Value::Symbol(symbol) => Ok(PropertyKey::Symbol(symbol)),
            _ => Err(JsErrorCode::PropertyNotString),
        },
    }
}

// ---------------------------------------------------------------------------
// Runtimes and contexts
// ---------------------------------------------------------------------------

/// Creates a runtime.
///
/// At most `u16::MAX` runtimes can be alive on one thread; ids of disposed
/// runtimes are handed out again.
pub fn js_create_runtime(attributes: JsRuntimeAttributes) -> JsResult<JsRuntimeHandle> {
    let id = RUNTIMES.with(|runtimes| {
        let runtimes = runtimes.borrow();
        let start = NEXT_RUNTIME.get();
        // Ids wrap around, skipping 0 and runtimes that are still alive.
        let mut id = start;
        loop {
            if id != 0 && !runtimes.contains_key(&id) {
                break Ok(id);
            }
            id = id.wrapping_add(1);
            if id == start {
                break Err(JsErrorCode::InvalidArgument);
            }
        }
    })?;
    NEXT_RUNTIME.set(id.wrapping_add(1));

    let state = RuntimeState::new(id, attributes);
    RUNTIMES.with(|runtimes| runtimes.borrow_mut().insert(id, Rc::new(RefCell::new(state))));
    debug!(runtime = id, ?attributes, "created runtime");
    Ok(JsRuntimeHandle(id))
}

/// Disposes a runtime, releasing every handle it issued.
///
/// Fails with [`JsErrorCode::RuntimeInUse`] while one of its contexts is
/// current on this thread.
pub fn js_dispose_runtime(runtime: JsRuntimeHandle) -> JsResult<()> {
    if matches!(CURRENT.get(), Some((id, _)) if id == runtime.0) {
        return Err(JsErrorCode::RuntimeInUse);
    }
    let state = RUNTIMES
        .with(|runtimes| runtimes.borrow_mut().remove(&runtime.0))
        .ok_or(JsErrorCode::InvalidArgument)?;

    let collected = state.borrow_mut().handles.drain();
    debug!(runtime = runtime.0, handles = collected.len(), "disposing runtime");
    notify_collected(collected);
    Ok(())
}

/// Releases every handle whose reference count is zero.
pub fn js_collect_garbage(runtime: JsRuntimeHandle) -> JsResult<()> {
    let state = runtime_by_id(runtime.0)?;
    let collected = state.borrow_mut().handles.sweep();
    trace!(runtime = runtime.0, handles = collected.len(), "collected garbage");
    notify_collected(collected);
    Ok(())
}

/// Returns the attributes a runtime was created with.
pub fn js_get_runtime_attributes(runtime: JsRuntimeHandle) -> JsResult<JsRuntimeAttributes> {
    Ok(runtime_by_id(runtime.0)?.borrow().attributes)
}

/// Creates a context with its own global object.
pub fn js_create_context(runtime: JsRuntimeHandle) -> JsResult<JsContextRef> {
    let state = runtime_by_id(runtime.0)?;
    let mut state = state.borrow_mut();
    let context = state.create_context();
    Ok(state.context(context).handle)
}

/// Makes `context` current on this thread, or clears the current context
/// when passed [`JsRef::INVALID`].
pub fn js_set_current_context(context: JsContextRef) -> JsResult<()> {
    if !context.is_valid() {
        CURRENT.set(None);
        return Ok(());
    }
    let state = runtime_of(context)?;
    let id = state.borrow().context_id(context)?;
    CURRENT.set(Some((context.runtime(), id)));
    Ok(())
}

/// Returns the current context, or [`JsRef::INVALID`].
pub fn js_get_current_context() -> JsResult<JsContextRef> {
    match current() {
        Ok((state, context)) => Ok(state.borrow().context(context).handle),
        Err(JsErrorCode::NoCurrentContext) => Ok(JsRef::INVALID),
        Err(err) => Err(err),
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Increments the reference count of a handle.
pub fn js_add_ref(reference: JsRef) -> JsResult<u32> {
    let state = runtime_of(reference)?;
    let mut state = state.borrow_mut();
    let entry = state.handles.get_mut(reference).ok_or(JsErrorCode::InvalidArgument)?;
    entry.refcount += 1;
    Ok(entry.refcount)
}

/// Decrements the reference count of a handle.
pub fn js_release(reference: JsRef) -> JsResult<u32> {
    let state = runtime_of(reference)?;
    let mut state = state.borrow_mut();
    let entry = state.handles.get_mut(reference).ok_or(JsErrorCode::InvalidArgument)?;
    if entry.refcount == 0 {
        return Err(JsErrorCode::InvalidArgument);
    }
    entry.refcount -= 1;
    Ok(entry.refcount)
}

/// Registers (or clears, with `None`) the callback invoked right before
/// `reference` is collected.
pub fn js_set_object_before_collect_callback(
    reference: JsRef,
    callback_state: *mut c_void,
    callback: Option<BeforeCollectCallback>,
) -> JsResult<()> {
    let state = runtime_of(reference)?;
    let mut state = state.borrow_mut();
    let entry = state.handles.get_mut(reference).ok_or(JsErrorCode::InvalidArgument)?;
    entry.before_collect = callback.map(|callback| (callback, callback_state));
    Ok(())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Returns `undefined`.
pub fn js_get_undefined_value() -> JsResult<JsValueRef> {
    with_current(|state, _| Ok(state.new_ref(Value::Undefined)))
}

/// Returns `null`.
pub fn js_get_null_value() -> JsResult<JsValueRef> {
    with_current(|state, _| Ok(state.new_ref(Value::Null)))
}

/// Returns `true`.
pub fn js_get_true_value() -> JsResult<JsValueRef> {
    js_bool_to_value(true)
}

/// Returns `false`.
pub fn js_get_false_value() -> JsResult<JsValueRef> {
    js_bool_to_value(false)
}

/// Creates a boolean value.
pub fn js_bool_to_value(value: bool) -> JsResult<JsValueRef> {
    with_current(|state, _| Ok(state.new_ref(Value::Boolean(value))))
}

/// Reads a boolean value.
pub fn js_bool_to_boolean(value: JsValueRef) -> JsResult<bool> {
    with_current(|state, _| match state.value(value)? {
        Value::Boolean(b) => Ok(b),
        _ => Err(JsErrorCode::InvalidArgument),
    })
}

/// Creates a number value.
pub fn js_double_to_number(value: f64) -> JsResult<JsValueRef> {
    with_current(|state, _| Ok(state.new_ref(Value::Number(value))))
}

/// Reads a number value.
pub fn js_number_to_double(value: JsValueRef) -> JsResult<f64> {
    with_current(|state, _| match state.value(value)? {
        Value::Number(n) => Ok(n),
        _ => Err(JsErrorCode::InvalidArgument),
    })
}

/// Creates a string value.
pub fn js_create_string(content: &str) -> JsResult<JsValueRef> {
    with_current(|state, _| Ok(state.new_ref(Value::string(content))))
}

/// Converts any value to a string value (ToString).
pub fn js_convert_value_to_string(value: JsValueRef) -> JsResult<JsValueRef> {
    with_script(|state, context| {
        let value = state.value(value)?;
        let converted = state.to_string(context, &value);
        let converted = complete(state, context, converted)?;
        Ok(state.new_ref(Value::String(converted)))
    })
}

/// Copies the contents of a string value out.
pub fn js_string_to_pointer(value: JsValueRef) -> JsResult<String> {
    with_current(|state, _| match state.value(value)? {
        Value::String(s) => Ok(s.to_string()),
        _ => Err(JsErrorCode::InvalidArgument),
    })
}

/// Creates a unique symbol. `description` may be [`JsRef::INVALID`].
pub fn js_create_symbol(description: JsValueRef) -> JsResult<JsValueRef> {
    with_current(|state, _| {
        let description = if description.is_valid() {
            match state.value(description)? {
                Value::String(s) => Some(s),
                _ => return Err(JsErrorCode::InvalidArgument),
            }
        } else {
            None
        };
        let symbol = state.symbols.create(description);
        Ok(state.new_ref(Value::Symbol(symbol)))
    })
}

/// Creates an empty object.
pub fn js_create_object() -> JsResult<JsValueRef> {
    with_current(|state, _| {
        let object = state.heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        Ok(state.new_ref(Value::Object(object)))
    })
}

/// Creates an `Error` whose message is the given string value.
pub fn js_create_error(message: JsValueRef) -> JsResult<JsValueRef> {
    with_current(|state, context| {
        let message = match state.value(message)? {
            Value::String(s) => s,
            _ => return Err(JsErrorCode::InvalidArgument),
        };
        let error = state.create_error(context, ErrorKind::Error, &message);
        Ok(state.new_ref(error))
    })
}

/// Returns the global object of the current context.
pub fn js_get_global_object() -> JsResult<JsValueRef> {
    with_current(|state, context| {
        let global = state.context(context).realm.global;
        Ok(state.new_ref(Value::Object(global)))
    })
}

/// Creates a property id from a name.
pub fn js_create_property_id(name: &str) -> JsPropertyId {
    JsPropertyId::Name(name.to_string())
}

/// Creates a property id from a symbol value.
pub fn js_get_property_id_from_symbol(symbol: JsValueRef) -> JsResult<JsPropertyId> {
    with_current(|state, _| match state.value(symbol)? {
        Value::Symbol(_) => Ok(JsPropertyId::Symbol(symbol)),
        _ => Err(JsErrorCode::PropertyNotString),
    })
}

/// Reads a property.
pub fn js_get_property(object: JsValueRef, property: &JsPropertyId) -> JsResult<JsValueRef> {
    with_script(|state, context| {
        let target = state.value(object)?;
        let key = property_key(state, property)?;
        let value = state.get_property(context, &target, &key);
        let value = complete(state, context, value)?;
        Ok(state.new_ref(value))
    })
}

/// Assigns a property. With `use_strict_rules`, a rejected assignment
/// throws instead of being ignored.
pub fn js_set_property(
    object: JsValueRef,
    property: &JsPropertyId,
    value: JsValueRef,
    use_strict_rules: bool,
) -> JsResult<()> {
    with_script(|state, context| {
        let target = state.value(object)?;
        let key = property_key(state, property)?;
        let value = state.value(value)?;
        let result = state.set_property(context, &target, key, value, use_strict_rules);
        complete(state, context, result)
    })
}

/// Defines a data property. Returns false when an existing property
/// cannot be redefined.
pub fn js_define_property(
    object: JsValueRef,
    property: &JsPropertyId,
    value: JsValueRef,
    descriptor: PropertyFlags,
) -> JsResult<bool> {
    with_current(|state, _| {
        let object = state.value(object)?.as_object().ok_or(JsErrorCode::ObjectNotInspectable)?;
        let key = property_key(state, property)?;
        let value = state.value(value)?;
        Ok(state.define_property(object, key, value, descriptor))
    })
}

/// Reports the type of a value.
pub fn js_get_value_type(value: JsValueRef) -> JsResult<JsValueType> {
    with_current(|state, _| {
        let value = state.value(value)?;
        Ok(state.value_type(&value))
    })
}

/// Strict equality (`===`).
pub fn js_strict_equals(left: JsValueRef, right: JsValueRef) -> JsResult<bool> {
    with_current(|state, _| Ok(state.value(left)? == state.value(right)?))
}

/// Calls a function. `arguments[0]` is the `this` value.
pub fn js_call_function(function: JsValueRef, arguments: &[JsValueRef]) -> JsResult<JsValueRef> {
    with_script(|state, context| {
        if arguments.is_empty() {
            return Err(JsErrorCode::InvalidArgument);
        }
        let callee = state.value(function)?;
        let args = arguments[1..]
            .iter()
            .map(|arg| state.value(*arg))
            .collect::<JsResult<Vec<_>>>()?;
        let result = state.call(context, &callee, &args, false, "function");
        let result = complete(state, context, result)?;
        Ok(state.new_ref(result))
    })
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

/// Returns true if the current context has a pending exception.
pub fn js_has_exception() -> JsResult<bool> {
    with_current(|state, context| Ok(state.context(context).exception.is_some()))
}

/// Sets the pending exception, replacing any existing one.
pub fn js_set_exception(exception: JsValueRef) -> JsResult<()> {
    with_current(|state, context| {
        let exception = state.value(exception)?;
        state.context_mut(context).exception = Some(exception);
        Ok(())
    })
}

/// Takes the pending exception. Fails with
/// [`JsErrorCode::InvalidArgument`] when none is pending.
pub fn js_get_and_clear_exception() -> JsResult<JsValueRef> {
    with_current(|state, context| {
        let exception = state
            .context_mut(context)
            .exception
            .take()
            .ok_or(JsErrorCode::InvalidArgument)?;
        Ok(state.new_ref(exception))
    })
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// Creates a module record in the current context.
///
/// `referencing` is the module whose import asked for this record, or
/// [`JsRef::INVALID`] for a root module. `specifier` is a string value or
/// [`JsRef::INVALID`].
pub fn js_initialize_module_record(referencing: JsModuleRecord, specifier: JsValueRef) -> JsResult<JsModuleRecord> {
    with_current(|state, context| {
        let referencing = if referencing.is_valid() {
            Some(state.module_id(referencing)?)
        } else {
            None
        };
        let specifier = if specifier.is_valid() {
            match state.value(specifier)? {
                Value::String(s) => Some(s),
                _ => return Err(JsErrorCode::InvalidArgument),
            }
        } else {
            None
        };
        let id = state.create_module(context, referencing, specifier.clone());
        trace!(module = id.0, specifier = specifier.as_deref(), "initialized module record");
        Ok(state.module(id).handle)
    })
}

/// Sets a host info slot on a module record.
pub fn js_set_module_host_info(module: JsModuleRecord, info: ModuleHostInfo) -> JsResult<()> {
    let state = runtime_of(module)?;
    let id = {
        let mut state = state.borrow_mut();
        let id = state.module_id(module)?;
        match info {
            ModuleHostInfo::Exception(exception) => {
                let error = state.value(exception)?;
                state.module_mut(id).fail(error);
            }
            ModuleHostInfo::HostDefined(pointer) => state.module_mut(id).host_defined = pointer,
            ModuleHostInfo::NotifyModuleReadyCallback(callback) => state.module_mut(id).notify = callback,
            ModuleHostInfo::FetchImportedModuleCallback(callback) => state.module_mut(id).fetch = callback,
            ModuleHostInfo::FetchImportedModuleFromScriptCallback(callback) => {
                state.module_mut(id).fetch_from_script = callback
            }
            ModuleHostInfo::Url(url) => {
                let url = state.value(url)?;
                state.module_mut(id).url = Some(url);
            }
        }
        id
    };

    if info.kind() == ModuleHostInfoKind::Exception {
        notify_if_settled(&state, id);
    }
    Ok(())
}

/// Reads a host info slot of a module record.
pub fn js_get_module_host_info(module: JsModuleRecord, kind: ModuleHostInfoKind) -> JsResult<ModuleHostInfo> {
    let state = runtime_of(module)?;
    let mut state = state.borrow_mut();
    let id = state.module_id(module)?;
    let record = state.module(id);
    Ok(match kind {
        ModuleHostInfoKind::Exception => {
            let error = record.error.clone();
            ModuleHostInfo::Exception(error.map(|e| state.new_ref(e)).unwrap_or(JsRef::INVALID))
        }
        ModuleHostInfoKind::HostDefined => ModuleHostInfo::HostDefined(record.host_defined),
        ModuleHostInfoKind::NotifyModuleReadyCallback => ModuleHostInfo::NotifyModuleReadyCallback(record.notify),
        ModuleHostInfoKind::FetchImportedModuleCallback => ModuleHostInfo::FetchImportedModuleCallback(record.fetch),
        ModuleHostInfoKind::FetchImportedModuleFromScriptCallback => {
            ModuleHostInfo::FetchImportedModuleFromScriptCallback(record.fetch_from_script)
        }
        ModuleHostInfoKind::Url => {
            let url = record.url.clone();
            ModuleHostInfo::Url(url.map(|u| state.new_ref(u)).unwrap_or(JsRef::INVALID))
        }
    })
}

fn decode(source: &[u8], flags: ParseModuleSourceFlags) -> JsResult<String> {
    match flags {
        ParseModuleSourceFlags::DataIsUtf8 => std::str::from_utf8(source)
            .map(str::to_string)
            .map_err(|_| JsErrorCode::InvalidArgument),
        ParseModuleSourceFlags::DataIsUtf16Le => {
            if source.len() % 2 != 0 {
                return Err(JsErrorCode::InvalidArgument);
            }
            let units: Vec<u16> = source
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|_| JsErrorCode::InvalidArgument)
        }
    }
}

/// Parses module source into a record and fetches its imports.
///
/// Each distinct import specifier is passed, in source order, to the fetch
/// callback found on the record's referencing chain. The call returns once
/// every fetch has returned. When the whole graph under the root module is
/// parsed, the root's ready callback runs before this function returns.
///
/// A syntax error fails with [`JsErrorCode::ScriptCompile`]. A failed fetch
/// does not fail the call; the module is marked errored and the error is
/// reported through the ready callback.
pub fn js_parse_module_source(
    module: JsModuleRecord,
    source_context: JsSourceContext,
    script: &[u8],
    flags: ParseModuleSourceFlags,
) -> JsResult<()> {
    let (runtime, _) = current()?;

    let (id, requested) = {
        let mut state = runtime.borrow_mut();
        let id = state.module_id(module)?;
        let context = state.module(id).context;
        if state.module(id).status != ModuleStatus::Initialized {
            return Err(JsErrorCode::InvalidArgument);
        }
        if state.context(context).exception.is_some() {
            return Err(JsErrorCode::InExceptionState);
        }

        let source = decode(script, flags)?;
        match parser::parse_module(&source) {
            Ok(ast) => {
                let requested = ast.requested_modules();
                let record = state.module_mut(id);
                record.ast = Some(Rc::new(ast));
                record.source_context = source_context;
                record.status = ModuleStatus::Parsing;
                (id, requested)
            }
            Err(err) => {
                debug!(module = id.0, offset = err.offset, "module failed to parse: {}", err.message);
                let error = state.create_error(context, ErrorKind::SyntaxError, &err.message);
                state.module_mut(id).fail(error.clone());
                state.context_mut(context).exception = Some(error);
                drop(state);
                notify_if_settled(&runtime, id);
                return Err(JsErrorCode::ScriptCompile);
            }
        }
    };

    for specifier in requested {
        let (fetch, referencing, specifier_ref) = {
            let mut state = runtime.borrow_mut();
            let fetch = state.find_callback(id, |record| record.fetch);
            let specifier_ref = state.new_ref(Value::string(specifier.as_str()));
            (fetch, state.module(id).handle, specifier_ref)
        };

        let resolved = match fetch {
            Some((callback, host_defined)) => {
                let mut dependent = JsRef::INVALID;
                // SAFETY: the host installed this callback and keeps
                // `host_defined` valid while the record can call it.
                let code = unsafe { callback(host_defined, referencing, specifier_ref, &mut dependent) };
                let state = runtime.borrow();
                match code {
                    JsErrorCode::NoError => state.module_id(dependent).ok(),
                    _ => None,
                }
            }
            None => None,
        };

        let mut state = runtime.borrow_mut();
        match resolved {
            Some(dependent) => {
                trace!(module = id.0, specifier = specifier.as_str(), dependent = dependent.0, "import resolved");
                state.module_mut(id).requested.push((specifier, dependent));
            }
            None => {
                let context = state.module(id).context;
                let error = match state.context_mut(context).exception.take() {
                    Some(error) => error,
                    None => {
                        let message = format!("Cannot find module '{}'", specifier);
                        state.create_error(context, ErrorKind::Error, &message)
                    }
                };
                debug!(module = id.0, specifier = specifier.as_str(), "import failed");
                state.module_mut(id).fail(error);
                break;
            }
        }
    }

    {
        let mut state = runtime.borrow_mut();
        if state.module(id).status == ModuleStatus::Parsing {
            state.module_mut(id).status = ModuleStatus::Parsed;
        }
    }
    notify_if_settled(&runtime, id);
    Ok(())
}

/// Fires the root's ready callback once its graph has no unparsed members.
fn notify_if_settled(runtime: &SharedRuntime, id: ModuleId) {
    let (callback, host_defined, root_handle, exception) = {
        let mut state = runtime.borrow_mut();
        let root = state.root_of(id);
        if state.module(root).notified || !state.graph_settled(root) {
            return;
        }
        state.module_mut(root).notified = true;

        let Some((callback, host_defined)) = state.find_callback(root, |record| record.notify) else {
            return;
        };

        let error = state.graph_error(root);
        let context = state.module(root).context;
        if error.is_some() && state.context(context).exception == error {
            state.context_mut(context).exception = None;
        }
        let exception = match error {
            Some(error) => state.new_ref(error),
            None => JsRef::INVALID,
        };
        (callback, host_defined, state.module(root).handle, exception)
    };

    debug!(module = id.0, failed = exception.is_valid(), "module graph ready");
    // SAFETY: see `js_parse_module_source`.
    let code = unsafe { callback(host_defined, root_handle, exception) };
    if !code.is_ok() {
        debug!(?code, "ready callback reported an error");
    }
}

/// Links and evaluates a parsed module graph.
///
/// Fails with [`JsErrorCode::ModuleNotReady`] while any module in the graph
/// is still unparsed. A module that failed to load, or whose body throws,
/// leaves its error pending and fails with
/// [`JsErrorCode::ScriptException`].
pub fn js_module_evaluation(module: JsModuleRecord) -> JsResult<JsValueRef> {
    with_script(|state, _| {
        let id = state.module_id(module)?;
        let context = state.module(id).context;

        if !state.graph_settled(id) {
            return Err(JsErrorCode::ModuleNotReady);
        }
        if let Some(error) = state.graph_error(id) {
            state.context_mut(context).exception = Some(error);
            return Err(JsErrorCode::ScriptException);
        }

        let linked = linker::link_graph(state, context, id);
        complete(state, context, linked)?;
        let evaluated = linker::evaluate_graph(state, context, id);
        complete(state, context, evaluated)?;
        Ok(state.new_ref(Value::Undefined))
    })
}

/// Returns the namespace object of an evaluated module.
pub fn js_get_module_namespace(module: JsModuleRecord) -> JsResult<JsValueRef> {
    with_current(|state, _| {
        let id = state.module_id(module)?;
        if state.module(id).status != ModuleStatus::Evaluated {
            return Err(JsErrorCode::ModuleNotReady);
        }
        let namespace = linker::namespace_object(state, id);
        Ok(state.new_ref(Value::Object(namespace)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static SOURCES: RefCell<Vec<(String, String)>> = const { RefCell::new(Vec::new()) };
        static FETCHED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
        static READY: RefCell<Vec<(JsRef, bool)>> = const { RefCell::new(Vec::new()) };
        static COLLECTED: Cell<usize> = const { Cell::new(0) };
    }

    /// Resolves specifiers against `SOURCES`, parsing each into a fresh
    /// record. Unknown names fail without setting an exception.
    unsafe extern "C" fn fetch(
        _: *mut c_void,
        referencing: JsModuleRecord,
        specifier: JsValueRef,
        dependent: *mut JsModuleRecord,
    ) -> JsErrorCode {
        let name = js_string_to_pointer(specifier).unwrap();
        FETCHED.with(|f| f.borrow_mut().push(name.clone()));
        let source = SOURCES.with(|s| s.borrow().iter().find(|(n, _)| *n == name).map(|(_, s)| s.clone()));
        let Some(source) = source else {
            return JsErrorCode::InvalidArgument;
        };
        let record = js_initialize_module_record(referencing, specifier).unwrap();
        unsafe { *dependent = record };
        match js_parse_module_source(record, 0, source.as_bytes(), ParseModuleSourceFlags::DataIsUtf8) {
            Ok(()) => JsErrorCode::NoError,
            Err(code) => code,
        }
    }

    unsafe extern "C" fn ready(_: *mut c_void, module: JsModuleRecord, exception: JsValueRef) -> JsErrorCode {
        READY.with(|r| r.borrow_mut().push((module, exception.is_valid())));
        JsErrorCode::NoError
    }

    unsafe extern "C" fn collected(_: JsRef, _: *mut c_void) {
        COLLECTED.set(COLLECTED.get() + 1);
    }

    struct Fixture {
        runtime: JsRuntimeHandle,
    }

    impl Fixture {
        fn new(sources: &[(&str, &str)]) -> Self {
            SOURCES.with(|s| {
                *s.borrow_mut() = sources.iter().map(|(n, s)| (n.to_string(), s.to_string())).collect();
            });
            FETCHED.with(|f| f.borrow_mut().clear());
            READY.with(|r| r.borrow_mut().clear());
            let runtime = js_create_runtime(JsRuntimeAttributes::empty()).unwrap();
            let context = js_create_context(runtime).unwrap();
            js_set_current_context(context).unwrap();
            Fixture { runtime }
        }

        fn root(&self) -> JsModuleRecord {
            let root = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID).unwrap();
            js_set_module_host_info(root, ModuleHostInfo::FetchImportedModuleCallback(Some(fetch))).unwrap();
            js_set_module_host_info(root, ModuleHostInfo::NotifyModuleReadyCallback(Some(ready))).unwrap();
            root
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = js_set_current_context(JsRef::INVALID);
            let _ = js_dispose_runtime(self.runtime);
        }
    }

    fn parse(module: JsModuleRecord, source: &str) -> JsResult<()> {
        js_parse_module_source(module, 0, source.as_bytes(), ParseModuleSourceFlags::DataIsUtf8)
    }

    fn default_export(module: JsModuleRecord) -> JsValueRef {
        let namespace = js_get_module_namespace(module).unwrap();
        js_get_property(namespace, &js_create_property_id("default")).unwrap()
    }

    fn pending_message() -> String {
        let exception = js_get_and_clear_exception().unwrap();
        js_string_to_pointer(js_convert_value_to_string(exception).unwrap()).unwrap()
    }

    #[test]
    fn test_fetch_resolves_imports_in_source_order() {
        let _f = Fixture::new(&[("a", "export default 1;"), ("b", "export default 2;")]);
        let root = _f.root();
        parse(root, "import b from 'b'; import a from 'a'; import again from 'b'; export default a + b;").unwrap();

        assert_eq!(FETCHED.with(|f| f.borrow().clone()), vec!["b", "a"]);
        assert_eq!(READY.with(|r| r.borrow().clone()), vec![(root, false)]);

        js_module_evaluation(root).unwrap();
        assert_eq!(js_number_to_double(default_export(root)).unwrap(), 3.0);
    }

    #[test]
    fn test_ready_fires_once_after_nested_parses() {
        let f = Fixture::new(&[("mid", "import leaf from 'leaf'; export default leaf;"), ("leaf", "export default 'x';")]);
        let root = f.root();
        parse(root, "import mid from 'mid'; export default mid;").unwrap();
        assert_eq!(READY.with(|r| r.borrow().len()), 1);

        js_module_evaluation(root).unwrap();
        assert_eq!(js_string_to_pointer(default_export(root)).unwrap(), "x");
    }

    #[test]
    fn test_failed_fetch_reports_error_through_ready() {
        let f = Fixture::new(&[]);
        let root = f.root();
        parse(root, "import x from 'nowhere';").unwrap();

        assert_eq!(READY.with(|r| r.borrow().clone()), vec![(root, true)]);
        assert!(!js_has_exception().unwrap());
        match js_get_module_host_info(root, ModuleHostInfoKind::Exception).unwrap() {
            ModuleHostInfo::Exception(error) => assert!(error.is_valid()),
            other => panic!("unexpected host info {:?}", other),
        }

        assert_eq!(js_module_evaluation(root), Err(JsErrorCode::ScriptException));
        assert_eq!(pending_message(), "Error: Cannot find module 'nowhere'");
    }

    #[test]
    fn test_syntax_error_is_pending_without_a_ready_callback() {
        let _f = Fixture::new(&[]);
        let root = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID).unwrap();
        assert_eq!(parse(root, "export default ;"), Err(JsErrorCode::ScriptCompile));
        assert!(js_has_exception().unwrap());
        assert!(pending_message().starts_with("SyntaxError"));
    }

    #[test]
    fn test_evaluation_before_ready_is_rejected() {
        let _f = Fixture::new(&[]);
        let root = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID).unwrap();
        assert_eq!(js_module_evaluation(root), Err(JsErrorCode::ModuleNotReady));
        assert_eq!(js_get_module_namespace(root), Err(JsErrorCode::ModuleNotReady));
    }

    #[test]
    fn test_pending_exception_blocks_script_calls() {
        let _f = Fixture::new(&[]);
        let message = js_create_string("boom").unwrap();
        let error = js_create_error(message).unwrap();
        js_set_exception(error).unwrap();

        let root = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID).unwrap();
        assert_eq!(parse(root, "export default 1;"), Err(JsErrorCode::InExceptionState));
        assert_eq!(js_convert_value_to_string(message), Err(JsErrorCode::InExceptionState));
        assert_eq!(pending_message(), "Error: boom");
    }

    #[test]
    fn test_collection_invalidates_unreferenced_handles() {
        let f = Fixture::new(&[]);
        COLLECTED.set(0);
        let kept = js_create_object().unwrap();
        let dropped = js_create_object().unwrap();
        js_add_ref(kept).unwrap();
        js_set_object_before_collect_callback(dropped, std::ptr::null_mut(), Some(collected)).unwrap();

        js_collect_garbage(f.runtime).unwrap();
        assert_eq!(COLLECTED.get(), 1);
        assert_eq!(js_get_value_type(kept), Ok(JsValueType::Object));
        assert_eq!(js_get_value_type(dropped), Err(JsErrorCode::InvalidArgument));
        assert_eq!(js_release(kept), Ok(0));
    }

    #[test]
    fn test_runtime_in_use_cannot_be_disposed() {
        let f = Fixture::new(&[]);
        assert_eq!(js_dispose_runtime(f.runtime), Err(JsErrorCode::RuntimeInUse));
        assert!(js_get_current_context().unwrap().is_valid());
    }

    #[test]
    fn test_frozen_symbol_property_on_global() {
        let _f = Fixture::new(&[]);
        let global = js_get_global_object().unwrap();
        let symbol = js_create_symbol(JsRef::INVALID).unwrap();
        let id = js_get_property_id_from_symbol(symbol).unwrap();
        let value = js_double_to_number(42.0).unwrap();
        assert!(js_define_property(global, &id, value, PropertyFlags::FROZEN).unwrap());

        let other = js_double_to_number(1.0).unwrap();
        assert_eq!(js_set_property(global, &id, other, true), Err(JsErrorCode::ScriptException));
        js_get_and_clear_exception().unwrap();

        let read = js_get_property(global, &id).unwrap();
        assert!(js_strict_equals(read, value).unwrap());
    }

    #[test]
    fn test_calling_symbol_for_returns_registered_symbol() {
        let _f = Fixture::new(&[]);
        let global = js_get_global_object().unwrap();
        let symbol = js_get_property(global, &js_create_property_id("Symbol")).unwrap();
        let symbol_for = js_get_property(symbol, &js_create_property_id("for")).unwrap();
        let this = js_get_undefined_value().unwrap();
        let key = js_create_string("k").unwrap();

        let a = js_call_function(symbol_for, &[this, key]).unwrap();
        let b = js_call_function(symbol_for, &[this, key]).unwrap();
        assert!(js_strict_equals(a, b).unwrap());
        assert_eq!(js_get_value_type(a), Ok(JsValueType::Symbol));
    }

    #[test]
    fn test_utf16_source() {
        let _f = Fixture::new(&[]);
        let root = js_initialize_module_record(JsRef::INVALID, JsRef::INVALID).unwrap();
        let bytes: Vec<u8> = "export default 'é';"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        js_parse_module_source(root, 7, &bytes, ParseModuleSourceFlags::DataIsUtf16Le).unwrap();
        js_module_evaluation(root).unwrap();
        assert_eq!(js_string_to_pointer(default_export(root)).unwrap(), "é");
    }

    #[test]
    fn test_runtime_ids_wrap_around_to_free_slots() {
        NEXT_RUNTIME.set(u16::MAX);
        let last = js_create_runtime(JsRuntimeAttributes::empty()).unwrap();
        assert_eq!(last.0, u16::MAX);

        let first = js_create_runtime(JsRuntimeAttributes::empty()).unwrap();
        assert_eq!(first.0, 1);

        NEXT_RUNTIME.set(1);
        let next = js_create_runtime(JsRuntimeAttributes::empty()).unwrap();
        assert_eq!(next.0, 2);

        js_dispose_runtime(first).unwrap();
        NEXT_RUNTIME.set(u16::MAX);
        let reused = js_create_runtime(JsRuntimeAttributes::empty()).unwrap();
        assert_eq!(reused.0, 1);

        for runtime in [last, next, reused] {
            js_dispose_runtime(runtime).unwrap();
        }
    }
}
