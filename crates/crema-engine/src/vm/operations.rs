// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract operations: type conversion, equality and property access.

use std::rc::Rc;

use super::builtins::{self, ErrorKind};
use super::{linker, Completion, Throw};
use crate::runtime::conversions::{number_to_string, string_to_number};
use crate::runtime::{
    ContextId, JsValueType, ObjectId, ObjectKind, PropertyFlags, PropertyKey, RuntimeState, Value,
};

/// Preferred type for ToPrimitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    /// No preference (`+`, `==`)
    Default,
    /// Number preferred
    Number,
    /// String preferred
    String,
}

impl RuntimeState {
    /// Creates an error in `context` and wraps it for propagation.
    pub fn throw_error(&mut self, context: ContextId, kind: ErrorKind, message: &str) -> Throw {
        Throw(self.create_error(context, kind, message))
    }

    /// Renders a key for use in error messages.
    pub fn describe_key(&self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::String(name) => name.to_string(),
            PropertyKey::Symbol(id) => match self.symbols.description(*id) {
                Some(description) => format!("Symbol({})", description),
                None => "Symbol()".to_string(),
            },
        }
    }

    /// Finds a property on an object or its prototype chain.
    pub fn lookup(&self, object: ObjectId, key: &PropertyKey) -> Option<(ObjectId, PropertyFlags, Value)> {
        let mut current = Some(object);
        while let Some(id) = current {
            let object = self.heap.get(id);
            if let Some(slot) = object.own(key) {
                return Some((id, slot.flags, slot.value.clone()));
            }
            current = object.prototype;
        }
        None
    }

    /// `[[Get]]` on any value.
    pub fn get_property(&mut self, context: ContextId, target: &Value, key: &PropertyKey) -> Completion<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot read properties of {} (reading '{}')",
                    target,
                    self.describe_key(key)
                );
                Err(self.throw_error(context, ErrorKind::TypeError, &message))
            }
            Value::String(s) => match key {
                PropertyKey::String(name) if &**name == "length" => {
                    Ok(Value::Number(s.encode_utf16().count() as f64))
                }
                _ => Ok(Value::Undefined),
            },
            Value::Boolean(_) | Value::Number(_) | Value::Symbol(_) => Ok(Value::Undefined),
            Value::Object(id) => {
                if let ObjectKind::Namespace(module) = self.heap.get(*id).kind {
                    return match key {
                        PropertyKey::String(name) => linker::namespace_get(self, context, module, name),
                        PropertyKey::Symbol(_) => Ok(Value::Undefined),
                    };
                }
                Ok(self
                    .lookup(*id, key)
                    .map(|(_, _, value)| value)
                    .unwrap_or(Value::Undefined))
            }
        }
    }

    /// `[[Set]]` on any value.
    ///
    /// With `strict` set, a rejected assignment throws a `TypeError`;
    /// otherwise it is silently ignored.
    pub fn set_property(
        &mut self,
        context: ContextId,
        target: &Value,
        key: PropertyKey,
        value: Value,
        strict: bool,
    ) -> Completion<()> {
        let object = match target {
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot set properties of {} (setting '{}')",
                    target,
                    self.describe_key(&key)
                );
                return Err(self.throw_error(context, ErrorKind::TypeError, &message));
            }
            Value::Object(id) => *id,
            primitive => {
                if !strict {
                    return Ok(());
                }
                let message = format!(
                    "Cannot create property '{}' on {} '{}'",
                    self.describe_key(&key),
                    self.type_of(primitive),
                    primitive
                );
                return Err(self.throw_error(context, ErrorKind::TypeError, &message));
            }
        };

        let namespace = matches!(self.heap.get(object).kind, ObjectKind::Namespace(_));
        let writable = !namespace
            && self
                .lookup(object, &key)
                .map(|(_, flags, _)| flags.writable)
                .unwrap_or(true);

        if !writable {
            if !strict {
                return Ok(());
            }
            let described = self.to_display_string(context, target);
            let message = format!(
                "Cannot assign to read only property '{}' of object '{}'",
                self.describe_key(&key),
                described
            );
            return Err(self.throw_error(context, ErrorKind::TypeError, &message));
        }

        let own = self.heap.get_mut(object);
        match own.own_mut(&key) {
            Some(slot) => slot.value = value,
            None => own.put(key, value, PropertyFlags::DEFAULT),
        }
        Ok(())
    }

    /// `[[DefineOwnProperty]]` for a data property. Returns false when the
    /// existing property cannot be redefined.
    pub fn define_property(&mut self, object: ObjectId, key: PropertyKey, value: Value, flags: PropertyFlags) -> bool {
        let target = self.heap.get_mut(object);
        if matches!(target.kind, ObjectKind::Namespace(_)) {
            return false;
        }
        if let Some(existing) = target.own(&key) {
            if !existing.flags.configurable {
                return existing.flags == flags && existing.value == value;
            }
        }
        target.put(key, value, flags);
        true
    }

    /// ToPropertyKey.
    pub fn to_property_key(&mut self, context: ContextId, value: &Value) -> Completion<PropertyKey> {
        match value {
            Value::Symbol(id) => Ok(PropertyKey::Symbol(*id)),
            other => Ok(PropertyKey::String(self.to_string(context, other)?)),
        }
    }

    /// ToPrimitive. Objects have no user-visible `valueOf`/`toString`, so the
    /// result depends only on the object kind.
    pub fn to_primitive(&mut self, context: ContextId, value: &Value, _hint: Hint) -> Completion<Value> {
        let Value::Object(id) = value else {
            return Ok(value.clone());
        };
        let text = match self.heap.get(*id).kind {
            ObjectKind::Error => self.error_to_string(context, value)?,
            ObjectKind::Function(builtin) => format!("function {}() {{ [native code] }}", builtin.name()),
            ObjectKind::Namespace(_) => "[object Module]".to_string(),
            ObjectKind::Ordinary => "[object Object]".to_string(),
        };
        Ok(Value::string(text))
    }

    fn error_to_string(&mut self, context: ContextId, error: &Value) -> Completion<String> {
        let name = self.get_property(context, error, &PropertyKey::name("name"))?;
        let name = if name.is_undefined() {
            Rc::from("Error")
        } else {
            self.to_string(context, &name)?
        };
        let message = self.get_property(context, error, &PropertyKey::name("message"))?;
        let message = if message.is_undefined() {
            Rc::from("")
        } else {
            self.to_string(context, &message)?
        };

        Ok(match (name.is_empty(), message.is_empty()) {
            (true, _) => message.to_string(),
            (false, true) => name.to_string(),
            (false, false) => format!("{}: {}", name, message),
        })
    }

    /// ToString.
    pub fn to_string(&mut self, context: ContextId, value: &Value) -> Completion<Rc<str>> {
        match value {
            Value::Undefined => Ok(Rc::from("undefined")),
            Value::Null => Ok(Rc::from("null")),
            Value::Boolean(b) => Ok(Rc::from(if *b { "true" } else { "false" })),
            Value::Number(n) => Ok(Rc::from(number_to_string(*n))),
            Value::String(s) => Ok(s.clone()),
            Value::Symbol(_) => Err(self.throw_error(
                context,
                ErrorKind::TypeError,
                "Cannot convert a Symbol value to a string",
            )),
            Value::Object(_) => {
                let primitive = self.to_primitive(context, value, Hint::String)?;
                self.to_string(context, &primitive)
            }
        }
    }

    /// ToString that never throws; symbols render as `Symbol(desc)`.
    pub fn to_display_string(&mut self, context: ContextId, value: &Value) -> String {
        if let Value::Symbol(id) = value {
            return self.describe_key(&PropertyKey::Symbol(*id));
        }
        match self.to_string(context, value) {
            Ok(text) => text.to_string(),
            Err(_) => value.to_string(),
        }
    }

    /// ToNumber.
    pub fn to_number(&mut self, context: ContextId, value: &Value) -> Completion<f64> {
        match value {
            Value::Undefined => Ok(f64::NAN),
            Value::Null => Ok(0.0),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(string_to_number(s)),
            Value::Symbol(_) => Err(self.throw_error(
                context,
                ErrorKind::TypeError,
                "Cannot convert a Symbol value to a number",
            )),
            Value::Object(_) => {
                let primitive = self.to_primitive(context, value, Hint::Number)?;
                self.to_number(context, &primitive)
            }
        }
    }

    /// Abstract equality (`==`).
    pub fn loose_equals(&mut self, context: ContextId, left: &Value, right: &Value) -> Completion<bool> {
        match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => Ok(false),
            (Value::Number(_), Value::String(s)) => Ok(*left == Value::Number(string_to_number(s))),
            (Value::String(s), Value::Number(_)) => Ok(Value::Number(string_to_number(s)) == *right),
            (Value::Boolean(b), _) => {
                let left = Value::Number(if *b { 1.0 } else { 0.0 });
                self.loose_equals(context, &left, right)
            }
            (_, Value::Boolean(b)) => {
                let right = Value::Number(if *b { 1.0 } else { 0.0 });
                self.loose_equals(context, left, &right)
            }
            (Value::Object(_), Value::Object(_)) => Ok(left == right),
            (Value::Object(_), _) => {
                let left = self.to_primitive(context, left, Hint::Default)?;
                self.loose_equals(context, &left, right)
            }
            (_, Value::Object(_)) => {
                let right = self.to_primitive(context, right, Hint::Default)?;
                self.loose_equals(context, left, &right)
            }
            _ => Ok(left == right),
        }
    }

    /// The `typeof` operator.
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(id) => match self.heap.get(*id).kind {
                ObjectKind::Function(_) => "function",
                _ => "object",
            },
        }
    }

    /// Type tag reported to the host.
    pub fn value_type(&self, value: &Value) -> JsValueType {
        match value {
            Value::Undefined => JsValueType::Undefined,
            Value::Null => JsValueType::Null,
            Value::Boolean(_) => JsValueType::Boolean,
            Value::Number(_) => JsValueType::Number,
            Value::String(_) => JsValueType::String,
            Value::Symbol(_) => JsValueType::Symbol,
            Value::Object(id) => match self.heap.get(*id).kind {
                ObjectKind::Function(_) => JsValueType::Function,
                ObjectKind::Error => JsValueType::Error,
                ObjectKind::Ordinary | ObjectKind::Namespace(_) => JsValueType::Object,
            },
        }
    }

    /// Calls (or constructs) a function value. `callee_text` names the callee
    /// in the error raised for non-callable values.
    pub fn call(
        &mut self,
        context: ContextId,
        callee: &Value,
        args: &[Value],
        construct: bool,
        callee_text: &str,
    ) -> Completion<Value> {
        let builtin = match callee.as_object().map(|id| self.heap.get(id).kind) {
            Some(ObjectKind::Function(builtin)) => builtin,
            _ => {
                let message = if construct {
                    format!("{} is not a constructor", callee_text)
                } else {
                    format!("{} is not a function", callee_text)
                };
                return Err(self.throw_error(context, ErrorKind::TypeError, &message));
            }
        };
        builtins::call_builtin(self, context, builtin, args, construct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::JsRuntimeAttributes;

    fn state() -> (RuntimeState, ContextId) {
        let mut state = RuntimeState::new(1, JsRuntimeAttributes::empty());
        let ctx = state.create_context();
        (state, ctx)
    }

    fn message_of(state: &mut RuntimeState, ctx: ContextId, thrown: Throw) -> String {
        state.to_display_string(ctx, &thrown.0)
    }

    #[test]
    fn test_error_to_string() {
        let (mut state, ctx) = state();
        let error = state.create_error(ctx, ErrorKind::TypeError, "boom");
        assert_eq!(&*state.to_string(ctx, &error).unwrap(), "TypeError: boom");

        let bare = state.create_error(ctx, ErrorKind::Error, "");
        assert_eq!(&*state.to_string(ctx, &bare).unwrap(), "Error");
    }

    #[test]
    fn test_reading_property_of_undefined_throws() {
        let (mut state, ctx) = state();
        let thrown = state
            .get_property(ctx, &Value::Undefined, &PropertyKey::name("x"))
            .unwrap_err();
        assert_eq!(
            message_of(&mut state, ctx, thrown),
            "TypeError: Cannot read properties of undefined (reading 'x')"
        );
    }

    #[test]
    fn test_frozen_property_rejects_strict_writes() {
        let (mut state, ctx) = state();
        let global = state.context(ctx).realm.global;
        let key = PropertyKey::name("locked");
        assert!(state.define_property(global, key.clone(), Value::Number(1.0), PropertyFlags::FROZEN));
        assert!(!state.define_property(global, key.clone(), Value::Number(2.0), PropertyFlags::DEFAULT));

        let target = Value::Object(global);
        assert!(state
            .set_property(ctx, &target, key.clone(), Value::Number(3.0), false)
            .is_ok());
        assert!(state
            .set_property(ctx, &target, key.clone(), Value::Number(3.0), true)
            .is_err());
        assert_eq!(state.get_property(ctx, &target, &key).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_loose_equality() {
        let (mut state, ctx) = state();
        assert!(state.loose_equals(ctx, &Value::Null, &Value::Undefined).unwrap());
        assert!(state.loose_equals(ctx, &Value::string("1"), &Value::Number(1.0)).unwrap());
        assert!(state.loose_equals(ctx, &Value::Boolean(true), &Value::string("1")).unwrap());
        assert!(!state.loose_equals(ctx, &Value::Null, &Value::Number(0.0)).unwrap());
    }

    #[test]
    fn test_symbols_do_not_convert_to_strings() {
        let (mut state, ctx) = state();
        let symbol = Value::Symbol(state.symbols.create(None));
        assert!(state.to_string(ctx, &symbol).is_err());
        assert_eq!(state.to_display_string(ctx, &symbol), "Symbol()");
    }

    #[test]
    fn test_calling_a_non_function() {
        let (mut state, ctx) = state();
        let thrown = state
            .call(ctx, &Value::Number(1.0), &[], false, "foo")
            .unwrap_err();
        assert_eq!(message_of(&mut state, ctx, thrown), "TypeError: foo is not a function");
    }

    #[test]
    fn test_value_types() {
        let (mut state, ctx) = state();
        let error = state.create_error(ctx, ErrorKind::Error, "x");
        assert_eq!(state.value_type(&error), JsValueType::Error);
        let symbol_ctor = builtins::global_value(&state, ctx, "Symbol").unwrap();
        assert_eq!(state.value_type(&symbol_ctor), JsValueType::Function);
        assert_eq!(state.type_of(&symbol_ctor), "function");
    }
}
