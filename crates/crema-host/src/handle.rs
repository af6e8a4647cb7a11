// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Ownership of engine handles and of state the engine calls back into.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use crema_engine::{js_add_ref, js_release, js_set_object_before_collect_callback, JsRef};
use tracing::{trace, warn};

use crate::error::Result;

static NEXT_SOURCE_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Returns a process-unique source context cookie.
pub fn next_source_context() -> u64 {
    NEXT_SOURCE_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

/// An owned reference to an engine resource.
///
/// Holds one engine reference count from creation until [`release`] or
/// drop, whichever comes first. Releasing twice is a no-op.
///
/// [`release`]: SafeHandle::release
#[derive(Debug)]
pub struct SafeHandle {
    reference: JsRef,
    released: Cell<bool>,
}

impl SafeHandle {
    /// Takes a reference on `reference`.
    pub fn new(reference: JsRef) -> Result<Self> {
        js_add_ref(reference)?;
        Ok(Self {
            reference,
            released: Cell::new(false),
        })
    }

    /// The underlying ref.
    pub fn get(&self) -> JsRef {
        self.reference
    }

    /// True once the reference count has been given back.
    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Gives the reference count back to the engine.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        // The runtime may already be gone, which releases everything.
        if let Err(code) = js_release(self.reference) {
            trace!(reference = self.reference.bits(), ?code, "release after runtime teardown");
        }
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

type Hook = Box<dyn FnOnce()>;

/// Before-collect hooks registered with the engine, keyed by the ref they
/// watch.
///
/// The engine is handed a pointer to this table, so the table must stay at
/// a fixed address (it is always boxed) and every registration must be
/// withdrawn from the engine before the table is dropped; see
/// [`unregister_all`](PinnedCallbacks::unregister_all).
#[derive(Default)]
pub struct PinnedCallbacks {
    hooks: RefCell<HashMap<JsRef, Hook>>,
}

impl PinnedCallbacks {
    /// Creates an empty, boxed table.
    pub fn new() -> Box<Self> {
        Box::default()
    }

    /// Runs `hook` right before the engine collects `reference`.
    pub fn register(&self, reference: JsRef, hook: impl FnOnce() + 'static) -> Result<()> {
        let state = self as *const Self as *mut c_void;
        js_set_object_before_collect_callback(reference, state, Some(before_collect))?;
        self.hooks.borrow_mut().insert(reference, Box::new(hook));
        Ok(())
    }

    /// Number of hooks still waiting for collection.
    pub fn pending(&self) -> usize {
        self.hooks.borrow().len()
    }

    fn take(&self, reference: JsRef) -> Option<Hook> {
        self.hooks.borrow_mut().remove(&reference)
    }

    /// Withdraws every registration from the engine.
    pub fn unregister_all(&self) {
        let hooks: Vec<JsRef> = self.hooks.borrow_mut().drain().map(|(reference, _)| reference).collect();
        for reference in hooks {
            if let Err(code) = js_set_object_before_collect_callback(reference, std::ptr::null_mut(), None) {
                // Already collected or runtime gone; nothing left to call us.
                trace!(reference = reference.bits(), ?code, "before-collect hook already gone");
            }
        }
    }
}

impl Drop for PinnedCallbacks {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

unsafe extern "C" fn before_collect(reference: JsRef, state: *mut c_void) {
    if state.is_null() {
        return;
    }
    // SAFETY: `state` was produced by `PinnedCallbacks::register` and the
    // table withdraws every registration before it is dropped.
    let table = unsafe { &*(state as *const PinnedCallbacks) };
    if let Some(hook) = table.take(reference) {
        if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
            warn!(reference = reference.bits(), "before-collect hook panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_contexts_are_unique() {
        let a = next_source_context();
        let b = next_source_context();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_refs_cannot_be_wrapped() {
        assert!(SafeHandle::new(JsRef::INVALID).is_err());
    }
}
