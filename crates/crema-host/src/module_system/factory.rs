// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crema_engine::JsRef;
use tracing::trace;

use super::loader::ModuleLoader;
use super::record::{ModuleRecord, RecordInner};
use crate::context::Context;
use crate::error::Result;
use crate::value::JsValue;

/// Creates module records and maps engine refs back to them.
///
/// The engine's callbacks only carry refs; this is how the host finds the
/// record that issued an import. Entries are weak and are removed when the
/// record is disposed.
#[derive(Default)]
pub struct ModuleRecordFactory {
    records: RefCell<HashMap<JsRef, Weak<RecordInner>>>,
}

impl ModuleRecordFactory {
    /// Creates a record named after `specifier`.
    ///
    /// With no `parent` the record is a root: it owns the fetch state of its
    /// graph and uses `loader` to resolve imports. Records with a parent
    /// share their root's loader.
    pub fn create_module_record(
        &self,
        context: &Context,
        specifier: &JsValue,
        parent: Option<&ModuleRecord>,
        loader: Option<Rc<dyn ModuleLoader>>,
    ) -> Result<ModuleRecord> {
        let name = specifier.to_js_string()?;
        let record = ModuleRecord::create(context, name, specifier.clone(), parent, loader)?;
        self.records
            .borrow_mut()
            .insert(record.handle(), Rc::downgrade(&record.inner));
        trace!(name = record.name(), root = parent.is_none(), "module record created");
        Ok(record)
    }

    /// The live record behind `reference`.
    pub fn get_module_record(&self, reference: JsRef) -> Option<ModuleRecord> {
        let inner = self.records.borrow().get(&reference)?.upgrade()?;
        Some(ModuleRecord { inner })
    }

    /// Number of records created and not yet disposed.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// True if no records are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn forget(&self, reference: JsRef) {
        self.records.borrow_mut().remove(&reference);
    }
}
