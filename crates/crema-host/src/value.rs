// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script values owned by the host.

use std::fmt;
use std::rc::{Rc, Weak};

use crema_engine::{
    js_bool_to_boolean, js_convert_value_to_string, js_get_value_type, js_number_to_double, js_strict_equals,
    js_string_to_pointer, JsRef, JsValueType,
};

use crate::context::{Context, ContextInner};
use crate::error::{HostError, Result};
use crate::handle::SafeHandle;

/// A value that lives in a [`Context`].
///
/// Holds an engine reference for as long as any clone is alive. Every
/// operation enters the owning context, so values can be used without an
/// explicit scope; they fail with [`HostError::Disposed`] once the context
/// is gone.
#[derive(Clone)]
pub struct JsValue {
    handle: Rc<SafeHandle>,
    context: Weak<ContextInner>,
}

impl JsValue {
    pub(crate) fn wrap(context: &Rc<ContextInner>, reference: JsRef) -> Result<Self> {
        Ok(Self {
            handle: Rc::new(SafeHandle::new(reference)?),
            context: Rc::downgrade(context),
        })
    }

    /// The engine ref.
    pub fn handle(&self) -> JsRef {
        self.handle.get()
    }

    /// The context this value belongs to.
    pub fn context(&self) -> Result<Context> {
        self.context
            .upgrade()
            .map(Context::from_inner)
            .ok_or(HostError::Disposed("context"))
    }

    /// Engine type tag.
    pub fn value_type(&self) -> Result<JsValueType> {
        let context = self.context()?;
        let _scope = context.enter()?;
        Ok(js_get_value_type(self.handle())?)
    }

    /// `ToString(value)`. Script errors (a symbol, a throwing `toString`)
    /// come back as [`HostError::Script`].
    pub fn to_js_string(&self) -> Result<String> {
        let context = self.context()?;
        let _scope = context.enter()?;
        let converted = context.check_script(js_convert_value_to_string(self.handle()))?;
        Ok(js_string_to_pointer(converted)?)
    }

    /// The string content, if this is a string.
    pub fn as_str(&self) -> Result<Option<String>> {
        if self.value_type()? != JsValueType::String {
            return Ok(None);
        }
        let context = self.context()?;
        let _scope = context.enter()?;
        Ok(Some(js_string_to_pointer(self.handle())?))
    }

    /// The number, if this is a number.
    pub fn as_number(&self) -> Result<Option<f64>> {
        if self.value_type()? != JsValueType::Number {
            return Ok(None);
        }
        let context = self.context()?;
        let _scope = context.enter()?;
        Ok(Some(js_number_to_double(self.handle())?))
    }

    /// The boolean, if this is a boolean.
    pub fn as_bool(&self) -> Result<Option<bool>> {
        if self.value_type()? != JsValueType::Boolean {
            return Ok(None);
        }
        let context = self.context()?;
        let _scope = context.enter()?;
        Ok(Some(js_bool_to_boolean(self.handle())?))
    }

    /// `self === other`.
    pub fn strict_equals(&self, other: &JsValue) -> Result<bool> {
        let context = self.context()?;
        let _scope = context.enter()?;
        Ok(js_strict_equals(self.handle(), other.handle())?)
    }

    /// Reads a string-named property.
    pub fn get(&self, name: &str) -> Result<JsValue> {
        self.context()?.get_property(self, name)
    }

    /// Assigns a string-named property.
    pub fn set(&self, name: &str, value: &JsValue) -> Result<()> {
        self.context()?.set_property(self, name, value)
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsValue").field("handle", &self.handle()).finish()
    }
}
