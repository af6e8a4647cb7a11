// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Reference-counted handles exposed across the host boundary.
//!
//! Every value, context and module record the host sees is addressed by a
//! [`JsRef`]. A ref names a slot in its runtime's handle table together with
//! the slot generation, so a ref that outlives its slot is detected instead
//! of aliasing whatever reuses the slot.
//!
//! ```text
//!  63        48 47        32 31                     0
//! ┌────────────┬────────────┬────────────────────────┐
//! │ runtime id │ generation │       slot index       │
//! └────────────┴────────────┴────────────────────────┘
//! ```

use std::ffi::c_void;

use crate::runtime::module::ModuleId;
use crate::runtime::{ContextId, Value};

/// Callback invoked right before the collector reclaims a handle.
pub type BeforeCollectCallback = unsafe extern "C" fn(reference: JsRef, callback_state: *mut c_void);

/// An opaque reference to an engine resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsRef(u64);

impl JsRef {
    /// The invalid reference.
    pub const INVALID: JsRef = JsRef(0);

    pub(crate) fn new(runtime: u16, generation: u16, index: u32) -> Self {
        JsRef(((runtime as u64) << 48) | ((generation as u64) << 32) | index as u64)
    }

    /// Returns true unless this is [`JsRef::INVALID`].
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Raw bits, for logging.
    pub fn bits(self) -> u64 {
        self.0
    }

    pub(crate) fn runtime(self) -> u16 {
        (self.0 >> 48) as u16
    }

    fn generation(self) -> u16 {
        (self.0 >> 32) as u16
    }

    fn index(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }
}

/// What a handle points at.
#[derive(Debug, Clone)]
pub enum HandleTarget {
    /// A script value
    Value(Value),
    /// An execution context
    Context(ContextId),
    /// A module record
    Module(ModuleId),
}

/// A live handle.
#[derive(Debug)]
pub struct HandleEntry {
    /// Resource the handle keeps reachable
    pub target: HandleTarget,
    /// External reference count
    pub refcount: u32,
    /// Registered before-collect callback and its state
    pub before_collect: Option<(BeforeCollectCallback, *mut c_void)>,
}

#[derive(Debug)]
struct HandleSlot {
    generation: u16,
    entry: Option<HandleEntry>,
}

/// A handle the collector reclaimed.
pub struct Collected {
    /// The ref that used to name the handle
    pub reference: JsRef,
    /// What it pointed at
    pub target: HandleTarget,
    /// Callback to notify, if one was registered
    pub before_collect: Option<(BeforeCollectCallback, *mut c_void)>,
}

/// The per-runtime handle table.
#[derive(Debug)]
pub struct HandleTable {
    runtime: u16,
    slots: Vec<HandleSlot>,
    free: Vec<u32>,
}

impl HandleTable {
    /// Creates an empty table for the given runtime id.
    pub fn new(runtime: u16) -> Self {
        Self {
            runtime,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Allocates a handle with a reference count of zero.
    pub fn insert(&mut self, target: HandleTarget) -> JsRef {
        let entry = HandleEntry {
            target,
            refcount: 0,
            before_collect: None,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return JsRef::new(self.runtime, slot.generation, index);
        }

        let index = self.slots.len() as u32;
        self.slots.push(HandleSlot {
            generation: 0,
            entry: Some(entry),
        });
        JsRef::new(self.runtime, 0, index)
    }

    /// Resolves a ref to its live entry.
    pub fn get(&self, reference: JsRef) -> Option<&HandleEntry> {
        if reference.runtime() != self.runtime {
            return None;
        }
        let slot = self.slots.get(reference.index())?;
        if slot.generation != reference.generation() {
            return None;
        }
        slot.entry.as_ref()
    }

    /// Resolves a ref to its live entry mutably.
    pub fn get_mut(&mut self, reference: JsRef) -> Option<&mut HandleEntry> {
        if reference.runtime() != self.runtime {
            return None;
        }
        let slot = self.slots.get_mut(reference.index())?;
        if slot.generation != reference.generation() {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Removes every handle whose reference count is zero.
    pub fn sweep(&mut self) -> Vec<Collected> {
        let mut collected = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unreferenced = matches!(&slot.entry, Some(entry) if entry.refcount == 0);
            if !unreferenced {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                collected.push(Collected {
                    reference: JsRef::new(self.runtime, slot.generation, index as u32),
                    target: entry.target,
                    before_collect: entry.before_collect,
                });
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }

        collected
    }

    /// Removes every handle regardless of reference count.
    pub fn drain(&mut self) -> Vec<Collected> {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot.entry.as_mut() {
                entry.refcount = 0;
            }
        }
        self.sweep()
    }

    /// Number of live handles.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_resolve() {
        let mut table = HandleTable::new(3);
        let r = table.insert(HandleTarget::Value(Value::Number(1.0)));
        assert!(r.is_valid());
        assert_eq!(r.runtime(), 3);
        assert!(table.get(r).is_some());
        assert!(table.get(JsRef::INVALID).is_none());
    }

    #[test]
    fn test_sweep_keeps_referenced_handles() {
        let mut table = HandleTable::new(1);
        let kept = table.insert(HandleTarget::Value(Value::Null));
        let dropped = table.insert(HandleTarget::Value(Value::Undefined));
        table.get_mut(kept).unwrap().refcount = 1;

        let collected = table.sweep();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].reference, dropped);
        assert!(table.get(kept).is_some());
        assert!(table.get(dropped).is_none());
    }

    #[test]
    fn test_stale_ref_does_not_alias_reused_slot() {
        let mut table = HandleTable::new(1);
        let first = table.insert(HandleTarget::Value(Value::Null));
        table.sweep();
        let second = table.insert(HandleTarget::Value(Value::Boolean(true)));
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert!(table.get(second).is_some());
    }

    #[test]
    fn test_refs_from_other_runtimes_are_rejected() {
        let mut a = HandleTable::new(1);
        let b = HandleTable::new(2);
        let r = a.insert(HandleTarget::Value(Value::Null));
        assert!(b.get(r).is_none());
    }
}
