// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-side module records and the engine callbacks that drive them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crema_engine::{
    js_has_exception, js_initialize_module_record, js_parse_module_source, js_set_exception,
    js_set_module_host_info, js_set_object_before_collect_callback, js_string_to_pointer, JsErrorCode,
    JsModuleRecord, JsRef, JsValueRef, ModuleHostInfo, ParseModuleSourceFlags,
};
use tracing::{debug, trace, warn};

use super::loader::ModuleLoader;
use super::module::ModuleKind;
use super::synthesis;
use crate::context::{Context, ContextInner};
use crate::error::{HostError, Result};
use crate::handle::{next_source_context, SafeHandle};
use crate::value::JsValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    Disposing,
    Disposed,
}

/// Why an import could not be resolved.
enum FetchFailure {
    /// The loader has no such module
    NotFound,
    /// A script exception describing the failure is pending
    Raised,
    /// Host failure with no exception raised yet
    Host(HostError),
}

impl From<HostError> for FetchFailure {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Script { .. } => FetchFailure::Raised,
            other => FetchFailure::Host(other),
        }
    }
}

pub(crate) struct RecordInner {
    name: String,
    specifier: JsValue,
    handle: SafeHandle,
    context: Weak<ContextInner>,
    parent: Option<Weak<RecordInner>>,
    loader: Option<Rc<dyn ModuleLoader>>,
    imported: RefCell<HashMap<String, ModuleRecord>>,
    ready: Cell<bool>,
    lifecycle: Cell<Lifecycle>,
    // Roots only. The engine holds a raw pointer to the boxed weak until
    // the callbacks are unregistered.
    host_defined: RefCell<Option<Box<Weak<RecordInner>>>>,
}

impl RecordInner {
    fn dispose(&self) {
        if self.lifecycle.get() != Lifecycle::Live {
            return;
        }
        self.lifecycle.set(Lifecycle::Disposing);

        let children: Vec<ModuleRecord> = self.imported.borrow_mut().drain().map(|(_, child)| child).collect();
        for child in &children {
            child.dispose();
        }

        let handle = self.handle.get();
        if self.parent.is_none() {
            let slots = [
                ModuleHostInfo::FetchImportedModuleFromScriptCallback(None),
                ModuleHostInfo::FetchImportedModuleCallback(None),
                ModuleHostInfo::NotifyModuleReadyCallback(None),
            ];
            for slot in slots {
                if let Err(code) = js_set_module_host_info(handle, slot) {
                    warn!(module = %self.name, ?code, kind = ?slot.kind(), "failed to unregister module callback");
                }
            }
            self.host_defined.borrow_mut().take();
        }
        if let Err(code) = js_set_object_before_collect_callback(handle, std::ptr::null_mut(), None) {
            trace!(module = %self.name, ?code, "record already collected");
        }

        if let Some(context) = self.context.upgrade() {
            Context::from_inner(context).module_record_factory().forget(handle);
        }
        self.handle.release();
        self.lifecycle.set(Lifecycle::Disposed);
        trace!(module = %self.name, children = children.len(), "module record disposed");
    }
}

impl Drop for RecordInner {
    fn drop(&mut self) {
        // The engine may still hold a pointer to `host_defined`.
        self.dispose();
    }
}

/// A module record as seen by the host.
///
/// A root record is created per evaluated script and owns the state of
/// its import graph: the loader, and every module imported anywhere in the
/// graph keyed by specifier. Imported records hang off the root.
#[derive(Clone)]
pub struct ModuleRecord {
    pub(crate) inner: Rc<RecordInner>,
}

impl ModuleRecord {
    pub(crate) fn create(
        context: &Context,
        name: String,
        specifier: JsValue,
        parent: Option<&ModuleRecord>,
        loader: Option<Rc<dyn ModuleLoader>>,
    ) -> Result<Self> {
        let _scope = context.enter()?;
        let referencing = parent.map_or(JsRef::INVALID, ModuleRecord::handle);
        let reference = js_initialize_module_record(referencing, specifier.handle())?;

        let record = ModuleRecord {
            inner: Rc::new(RecordInner {
                name,
                specifier,
                handle: SafeHandle::new(reference)?,
                context: context.downgrade(),
                parent: parent.map(|parent| Rc::downgrade(&parent.inner)),
                loader,
                imported: RefCell::new(HashMap::new()),
                ready: Cell::new(false),
                lifecycle: Cell::new(Lifecycle::Live),
                host_defined: RefCell::new(None),
            }),
        };

        js_set_object_before_collect_callback(reference, std::ptr::null_mut(), Some(record_collected))?;
        if parent.is_none() {
            record.install_callbacks()?;
        }
        Ok(record)
    }

    fn install_callbacks(&self) -> Result<()> {
        let state = Box::new(Rc::downgrade(&self.inner));
        let pointer = &*state as *const Weak<RecordInner> as *mut c_void;
        *self.inner.host_defined.borrow_mut() = Some(state);

        let handle = self.handle();
        js_set_module_host_info(handle, ModuleHostInfo::HostDefined(pointer))?;
        js_set_module_host_info(handle, ModuleHostInfo::FetchImportedModuleCallback(Some(fetch_imported_module)))?;
        js_set_module_host_info(
            handle,
            ModuleHostInfo::FetchImportedModuleFromScriptCallback(Some(fetch_imported_module)),
        )?;
        js_set_module_host_info(handle, ModuleHostInfo::NotifyModuleReadyCallback(Some(notify_module_ready)))?;
        Ok(())
    }

    /// The module's name: its specifier as a string.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The specifier the record was created for.
    pub fn specifier(&self) -> &JsValue {
        &self.inner.specifier
    }

    /// The engine ref.
    pub fn handle(&self) -> JsRef {
        self.inner.handle.get()
    }

    /// True for records created without a parent.
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// The root this record was imported under.
    pub fn parent(&self) -> Option<ModuleRecord> {
        let inner = self.inner.parent.as_ref()?.upgrade()?;
        Some(ModuleRecord { inner })
    }

    /// True once the engine reported the whole graph loaded without error.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.get()
    }

    /// True after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.get() != Lifecycle::Live
    }

    /// Specifiers imported into this record's graph, sorted.
    pub fn imported_module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.imported.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// The record imported under `name`.
    pub fn imported_module(&self, name: &str) -> Option<ModuleRecord> {
        self.inner.imported.borrow().get(name).cloned()
    }

    fn context(&self) -> Result<Context> {
        self.inner
            .context
            .upgrade()
            .map(Context::from_inner)
            .ok_or(HostError::Disposed("context"))
    }

    /// Parses `script` as this record's source.
    ///
    /// Imports are resolved before this returns. A syntax error is
    /// [`HostError::Script`] with the error left pending.
    pub fn parse_module_source(&self, script: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(HostError::Disposed("module record"));
        }
        let context = self.context()?;
        let _scope = context.enter()?;
        let parsed = js_parse_module_source(
            self.handle(),
            next_source_context(),
            script.as_bytes(),
            ParseModuleSourceFlags::DataIsUtf8,
        );
        context.check_script(parsed)
    }

    /// Resolves `specifier`, imported by `referencing`, within this root's graph.
    fn fetch(&self, referencing: JsModuleRecord, specifier: JsValueRef) -> std::result::Result<JsModuleRecord, FetchFailure> {
        let context = self.context()?;
        let name = js_string_to_pointer(specifier).map_err(HostError::from)?;
        let referencing_record = context.module_record_factory().get_module_record(referencing);

        // A graph member importing the root, or a module importing itself.
        if name == self.name() || referencing_record.as_ref().is_some_and(|record| record.name() == name) {
            trace!(name = %name, "import refers back into the graph");
            return Ok(referencing);
        }
        if let Some(cached) = self.imported_module(&name) {
            trace!(name = %name, "import served from graph cache");
            return Ok(cached.handle());
        }
        let Some(loader) = self.inner.loader.clone() else {
            return Err(FetchFailure::NotFound);
        };

        let loaded = panic::catch_unwind(AssertUnwindSafe(|| context.runtime().block_on(loader.get_module(&name))))
            .unwrap_or_else(|payload| Err(format!("module loader panicked: {}", panic_message(&*payload)).into()));
        let module = match loaded {
            Ok(Some(module)) => module,
            Ok(None) => return Err(FetchFailure::NotFound),
            Err(err) => {
                context.raise(&format!(
                    "An error occurred while attempting to load a module named {name}: {err}"
                ))?;
                return Err(FetchFailure::Raised);
            }
        };

        let specifier = context.wrap(specifier)?;
        let child = context
            .module_record_factory()
            .create_module_record(&context, &specifier, Some(self), None)?;
        self.inner.imported.borrow_mut().insert(name.clone(), child.clone());
        debug!(name = %name, kind = ?module.kind(), "module loaded");

        match module.kind() {
            ModuleKind::Script => {
                let source = module
                    .export_default(&context, Some(&child))
                    .map_err(|err| HostError::loader(&name, err))?;
                let Some(source) = source.as_str()? else {
                    context.raise(&format!(
                        "The module {name} implements a script module and is expected to return a string based module that exports a default value."
                    ))?;
                    return Err(FetchFailure::Raised);
                };
                child.parse_module_source(&source)?;
            }
            ModuleKind::Value => {
                let value = match module.export_default(&context, referencing_record.as_ref()) {
                    Ok(value) => value,
                    Err(err) => {
                        context.raise(&format!(
                            "An error occurred while obtaining the default export of the native module named {}: {err}",
                            child.name()
                        ))?;
                        return Err(FetchFailure::Raised);
                    }
                };
                synthesis::create_single_value_module(&context, &child, &value)?;
            }
        }
        Ok(child.handle())
    }

    /// Reports a failed fetch to the engine. Leaves an existing pending
    /// exception alone.
    fn fail_fetch(&self, failure: FetchFailure) -> JsErrorCode {
        let message = match failure {
            FetchFailure::NotFound => return JsErrorCode::InvalidArgument,
            FetchFailure::Raised => return JsErrorCode::ScriptException,
            FetchFailure::Host(err) => err.to_string(),
        };
        debug!(module = %self.name(), error = %message, "import failed");
        match js_has_exception() {
            Ok(false) => {
                if let Ok(context) = self.context() {
                    if let Err(err) = context.raise(&message) {
                        warn!(%err, "failed to raise import error");
                    }
                }
            }
            Ok(true) => {}
            Err(code) => warn!(?code, "no current context while reporting an import failure"),
        }
        JsErrorCode::ScriptException
    }

    fn module_ready(&self, exception: JsValueRef) -> JsErrorCode {
        if !exception.is_valid() {
            self.inner.ready.set(true);
            debug!(module = %self.name(), "module graph ready");
            return JsErrorCode::NoError;
        }
        debug!(module = %self.name(), "module graph failed to load");
        match js_has_exception() {
            Ok(false) => {
                if let Err(code) = js_set_exception(exception) {
                    warn!(?code, "failed to raise module load error");
                }
            }
            Ok(true) => {}
            Err(code) => warn!(?code, "no current context while reporting a load error"),
        }
        JsErrorCode::ScriptException
    }

    /// Releases the record and everything imported into it, children first.
    /// Calling it again does nothing.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.inner.name)
            .field("handle", &self.handle())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Recovers the root record from the engine's host-defined pointer.
///
/// # Safety
///
/// `host_defined` must be null or the pointer set by `install_callbacks`,
/// which stays valid until `dispose` unregisters the callbacks.
unsafe fn root_from(host_defined: *mut c_void) -> Option<ModuleRecord> {
    if host_defined.is_null() {
        return None;
    }
    let weak = unsafe { &*(host_defined as *const Weak<RecordInner>) };
    weak.upgrade().map(|inner| ModuleRecord { inner })
}

unsafe extern "C" fn fetch_imported_module(
    host_defined: *mut c_void,
    referencing: JsModuleRecord,
    specifier: JsValueRef,
    dependent: *mut JsModuleRecord,
) -> JsErrorCode {
    if dependent.is_null() {
        return JsErrorCode::NullArgument;
    }
    // SAFETY: installed together with the pointer by `install_callbacks`.
    let Some(root) = (unsafe { root_from(host_defined) }) else {
        return JsErrorCode::InvalidArgument;
    };

    let fetched = panic::catch_unwind(AssertUnwindSafe(|| root.fetch(referencing, specifier)));
    let (code, module) = match fetched {
        Ok(Ok(module)) => (JsErrorCode::NoError, module),
        Ok(Err(failure)) => (root.fail_fetch(failure), referencing),
        Err(payload) => {
            let name = js_string_to_pointer(specifier).unwrap_or_default();
            let failure = FetchFailure::Host(HostError::loader(
                name,
                format!("import panicked: {}", panic_message(&*payload)),
            ));
            (root.fail_fetch(failure), referencing)
        }
    };
    // SAFETY: checked non-null above; the engine passes a writable slot.
    unsafe { *dependent = module };
    code
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

unsafe extern "C" fn notify_module_ready(
    host_defined: *mut c_void,
    _referencing: JsModuleRecord,
    exception: JsValueRef,
) -> JsErrorCode {
    // SAFETY: installed together with the pointer by `install_callbacks`.
    let Some(root) = (unsafe { root_from(host_defined) }) else {
        return JsErrorCode::InvalidArgument;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| root.module_ready(exception))) {
        Ok(code) => code,
        Err(_) => {
            warn!(module = %root.name(), "ready notification panicked");
            JsErrorCode::InvalidArgument
        }
    }
}

unsafe extern "C" fn record_collected(reference: JsRef, _state: *mut c_void) {
    trace!(reference = reference.bits(), "module record collected");
}
