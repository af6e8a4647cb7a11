// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-provided modules.

use serde_json::Value as Json;

use super::record::ModuleRecord;
use crate::context::Context;
use crate::error::LoaderError;
use crate::value::JsValue;

/// How a loaded module becomes a module record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// The default export is module source text, parsed as the record
    Script,
    /// The default export is the value importers receive
    Value,
}

/// A module a [`ModuleLoader`](super::ModuleLoader) can hand out.
pub trait Module {
    /// Name the module is imported by.
    fn name(&self) -> &str;

    /// Human-readable summary.
    fn description(&self) -> &str {
        ""
    }

    /// Defaults to [`ModuleKind::Value`].
    fn kind(&self) -> ModuleKind {
        ModuleKind::Value
    }

    /// Produces the default export.
    ///
    /// For [`ModuleKind::Script`] modules `record` is the record the source
    /// will be parsed into and the result must be a string. For value
    /// modules `record` is the importing module, when the host knows it.
    fn export_default(&self, context: &Context, record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError>;
}

/// A module written in script.
#[derive(Debug, Clone)]
pub struct ScriptModule {
    name: String,
    source: String,
}

impl ScriptModule {
    /// Module `name` with the given source text.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// The module source text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Module for ScriptModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Script
    }

    fn export_default(&self, context: &Context, _record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        Ok(context.create_string(&self.source)?)
    }
}

type Export = dyn Fn(&Context, Option<&ModuleRecord>) -> Result<JsValue, LoaderError>;

/// A module whose default export is produced by host code.
pub struct NativeModule {
    name: String,
    description: String,
    export: Box<Export>,
}

impl NativeModule {
    /// Module `name` exporting whatever `export` returns.
    pub fn new(
        name: impl Into<String>,
        export: impl Fn(&Context, Option<&ModuleRecord>) -> Result<JsValue, LoaderError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            export: Box::new(export),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Module for NativeModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn export_default(&self, context: &Context, record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        (self.export)(context, record)
    }
}

/// A module exporting parsed JSON.
///
/// Objects and arrays become plain objects; arrays carry index keys and a
/// `length`.
#[derive(Debug, Clone)]
pub struct JsonModule {
    name: String,
    value: Json,
}

impl JsonModule {
    /// Module `name` exporting `value`.
    pub fn new(name: impl Into<String>, value: Json) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Parses `source` as JSON.
    pub fn parse(name: impl Into<String>, source: &str) -> crate::error::Result<Self> {
        Ok(Self::new(name, serde_json::from_str(source)?))
    }
}

impl Module for JsonModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn export_default(&self, context: &Context, _record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        Ok(json_to_value(context, &self.value)?)
    }
}

fn json_to_value(context: &Context, json: &Json) -> crate::error::Result<JsValue> {
    match json {
        Json::Null => context.null(),
        Json::Bool(value) => context.create_bool(*value),
        Json::Number(number) => context.create_number(number.as_f64().unwrap_or(f64::NAN)),
        Json::String(value) => context.create_string(value),
        Json::Array(items) => {
            let object = context.create_object()?;
            for (index, item) in items.iter().enumerate() {
                object.set(&index.to_string(), &json_to_value(context, item)?)?;
            }
            object.set("length", &context.create_number(items.len() as f64)?)?;
            Ok(object)
        }
        Json::Object(entries) => {
            let object = context.create_object()?;
            for (key, value) in entries {
                object.set(key, &json_to_value(context, value)?)?;
            }
            Ok(object)
        }
    }
}

/// A module exporting a string.
#[derive(Debug, Clone)]
pub struct TextModule {
    name: String,
    text: String,
}

impl TextModule {
    /// Module `name` exporting `text`.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

impl Module for TextModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn export_default(&self, context: &Context, _record: Option<&ModuleRecord>) -> Result<JsValue, LoaderError> {
        Ok(context.create_string(&self.text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::runtime::Runtime;

    #[test]
    fn test_json_array_becomes_indexed_object() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let context = runtime.create_context().unwrap();
        let module = JsonModule::parse("data", r#"{"tags": ["a", "b"], "count": 2, "ok": true}"#).unwrap();

        let value = module.export_default(&context, None).unwrap();
        let tags = value.get("tags").unwrap();
        assert_eq!(tags.get("length").unwrap().as_number().unwrap(), Some(2.0));
        assert_eq!(tags.get("1").unwrap().as_str().unwrap().as_deref(), Some("b"));
        assert_eq!(value.get("count").unwrap().as_number().unwrap(), Some(2.0));
        assert_eq!(value.get("ok").unwrap().as_bool().unwrap(), Some(true));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(JsonModule::parse("data", "{").is_err());
    }

    #[test]
    fn test_module_kinds() {
        assert_eq!(ScriptModule::new("a", "export default 1;").kind(), ModuleKind::Script);
        assert_eq!(TextModule::new("b", "hi").kind(), ModuleKind::Value);
    }
}
