// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Modules whose only export is a host value.

use crema_engine::PropertyFlags;
use uuid::Uuid;

use super::record::ModuleRecord;
use crate::context::Context;
use crate::error::{HostError, Result};
use crate::value::JsValue;

/// Global symbol key under which `id`'s value is stashed.
pub(crate) fn export_key(id: &Uuid) -> String {
    format!("$DEFAULTEXPORT_{id}")
}

/// Source of a module that re-exports the value stashed under `key`.
pub(crate) fn export_source(key: &str) -> String {
    format!("const defaultExport = globalThis[Symbol.for('{key}')];\nexport default defaultExport;\n")
}

/// Makes `record` a module whose default export is `value`.
///
/// The value is stored on the global object under a fresh registered
/// symbol (frozen, non-enumerable) and `record` is parsed from a two-line
/// module that reads it back.
pub(crate) fn create_single_value_module(context: &Context, record: &ModuleRecord, value: &JsValue) -> Result<()> {
    install_export(context, record, &export_key(&Uuid::new_v4()), value)
}

fn install_export(context: &Context, record: &ModuleRecord, key: &str, value: &JsValue) -> Result<()> {
    let symbol = context.symbol_for(key)?;
    let global = context.global_object()?;
    if !context.define_symbol_property(&global, &symbol, value, PropertyFlags::FROZEN)? {
        return Err(HostError::loader(
            record.name(),
            format!("the global object rejected the default export slot {key}"),
        ));
    }
    record.parse_module_source(&export_source(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::Runtime;

    #[test]
    fn test_export_source_shape() {
        let id = Uuid::nil();
        let key = export_key(&id);
        assert_eq!(key, "$DEFAULTEXPORT_00000000-0000-0000-0000-000000000000");
        assert_eq!(
            export_source(&key),
            "const defaultExport = globalThis[Symbol.for('$DEFAULTEXPORT_00000000-0000-0000-0000-000000000000')];\nexport default defaultExport;\n"
        );
    }

    #[test]
    fn test_rejected_export_slot_is_an_error() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let context = runtime.create_context().unwrap();
        let specifier = context.create_string("taken").unwrap();
        let record = context
            .module_record_factory()
            .create_module_record(&context, &specifier, None, None)
            .unwrap();

        let key = export_key(&Uuid::nil());
        let symbol = context.symbol_for(&key).unwrap();
        let global = context.global_object().unwrap();
        let first = context.create_number(1.0).unwrap();
        assert!(context.define_symbol_property(&global, &symbol, &first, PropertyFlags::FROZEN).unwrap());

        let second = context.create_number(2.0).unwrap();
        match install_export(&context, &record, &key, &second) {
            Err(HostError::Loader { module, reason }) => {
                assert_eq!(module, "taken");
                assert!(reason.contains(&key), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!record.is_ready());
    }
}
