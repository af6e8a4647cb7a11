// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Global object setup and built-in functions.

use std::rc::Rc;

use super::Completion;
use crate::runtime::{
    ContextId, Heap, JsObject, ObjectId, ObjectKind, PropertyFlags, PropertyKey, RuntimeState,
    Value,
};

/// The native error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error
    Error,
    /// TypeError
    TypeError,
    /// ReferenceError
    ReferenceError,
    /// SyntaxError
    SyntaxError,
    /// RangeError
    RangeError,
}

impl ErrorKind {
    const ALL: [ErrorKind; 5] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::RangeError,
    ];

    /// Constructor name.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

/// Functions implemented by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// An error constructor
    Error(ErrorKind),
    /// Symbol()
    Symbol,
    /// Symbol.for()
    SymbolFor,
    /// String()
    String,
    /// Number()
    Number,
    /// Boolean()
    Boolean,
}

impl Builtin {
    /// Function name as seen by script.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Error(kind) => kind.name(),
            Builtin::Symbol => "Symbol",
            Builtin::SymbolFor => "for",
            Builtin::String => "String",
            Builtin::Number => "Number",
            Builtin::Boolean => "Boolean",
        }
    }
}

/// A context's global object and the intrinsics the engine needs by id.
#[derive(Debug, Clone)]
pub struct Realm {
    /// The global object
    pub global: ObjectId,
    error_prototypes: [ObjectId; 5],
}

impl Realm {
    /// Prototype for errors of the given kind.
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectId {
        let index = ErrorKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        self.error_prototypes[index]
    }
}

fn function(heap: &mut Heap, builtin: Builtin) -> ObjectId {
    let mut object = JsObject::new(ObjectKind::Function(builtin), None);
    object.put(
        PropertyKey::name("name"),
        Value::string(builtin.name()),
        PropertyFlags {
            writable: false,
            enumerable: false,
            configurable: true,
        },
    );
    heap.alloc(object)
}

/// Builds a global object populated with the supported built-ins.
pub fn create_realm(heap: &mut Heap) -> Realm {
    let global = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
    let mut globals: Vec<(&str, Value, PropertyFlags)> = vec![
        ("globalThis", Value::Object(global), PropertyFlags::HIDDEN),
        ("undefined", Value::Undefined, PropertyFlags::FROZEN),
        ("NaN", Value::Number(f64::NAN), PropertyFlags::FROZEN),
        ("Infinity", Value::Number(f64::INFINITY), PropertyFlags::FROZEN),
    ];

    let mut error_prototypes = [global; 5];
    let mut base_prototype = None;
    for (index, kind) in ErrorKind::ALL.into_iter().enumerate() {
        let mut prototype = JsObject::new(ObjectKind::Ordinary, base_prototype);
        prototype.put(PropertyKey::name("name"), Value::string(kind.name()), PropertyFlags::HIDDEN);
        prototype.put(PropertyKey::name("message"), Value::string(""), PropertyFlags::HIDDEN);
        let prototype = heap.alloc(prototype);
        let constructor = function(heap, Builtin::Error(kind));

        heap.get_mut(constructor).put(
            PropertyKey::name("prototype"),
            Value::Object(prototype),
            PropertyFlags::FROZEN,
        );
        heap.get_mut(prototype).put(
            PropertyKey::name("constructor"),
            Value::Object(constructor),
            PropertyFlags::HIDDEN,
        );

        if kind == ErrorKind::Error {
            base_prototype = Some(prototype);
        }
        error_prototypes[index] = prototype;
        globals.push((kind.name(), Value::Object(constructor), PropertyFlags::HIDDEN));
    }

    let symbol = function(heap, Builtin::Symbol);
    let symbol_for = function(heap, Builtin::SymbolFor);
    heap.get_mut(symbol).put(
        PropertyKey::name("for"),
        Value::Object(symbol_for),
        PropertyFlags::HIDDEN,
    );
    globals.push(("Symbol", Value::Object(symbol), PropertyFlags::HIDDEN));

    for builtin in [Builtin::String, Builtin::Number, Builtin::Boolean] {
        let object = function(heap, builtin);
        globals.push((builtin.name(), Value::Object(object), PropertyFlags::HIDDEN));
    }

    let global_object = heap.get_mut(global);
    for (name, value, flags) in globals {
        global_object.put(PropertyKey::name(name), value, flags);
    }

    Realm {
        global,
        error_prototypes,
    }
}

/// Allocates an error instance with an own, non-enumerable `message`.
pub fn create_error_object(heap: &mut Heap, prototype: ObjectId, message: &str) -> Value {
    let mut error = JsObject::new(ObjectKind::Error, Some(prototype));
    error.put(PropertyKey::name("message"), Value::string(message), PropertyFlags::HIDDEN);
    Value::Object(heap.alloc(error))
}

/// Invokes a built-in function.
pub fn call_builtin(
    state: &mut RuntimeState,
    context: ContextId,
    builtin: Builtin,
    args: &[Value],
    construct: bool,
) -> Completion<Value> {
    let arg = args.first().cloned().unwrap_or(Value::Undefined);

    match builtin {
        Builtin::Error(kind) => {
            let message = if arg.is_undefined() {
                None
            } else {
                Some(state.to_string(context, &arg)?)
            };
            let prototype = state.context(context).realm.error_prototype(kind);
            let mut error = JsObject::new(ObjectKind::Error, Some(prototype));
            if let Some(message) = message {
                error.put(PropertyKey::name("message"), Value::String(message), PropertyFlags::HIDDEN);
            }
            Ok(Value::Object(state.heap.alloc(error)))
        }
        Builtin::Symbol | Builtin::SymbolFor if construct => Err(state.throw_error(
            context,
            ErrorKind::TypeError,
            &format!("{} is not a constructor", builtin_path(builtin)),
        )),
        Builtin::Symbol => {
            let description = if arg.is_undefined() {
                None
            } else {
                Some(state.to_string(context, &arg)?)
            };
            Ok(Value::Symbol(state.symbols.create(description)))
        }
        Builtin::SymbolFor => {
            let key = state.to_string(context, &arg)?;
            Ok(Value::Symbol(state.symbols.for_key(&key)))
        }
        Builtin::String | Builtin::Number | Builtin::Boolean if construct => Err(state.throw_error(
            context,
            ErrorKind::TypeError,
            &format!("{} wrapper objects are not supported", builtin.name()),
        )),
        Builtin::String => {
            if args.is_empty() {
                return Ok(Value::string(""));
            }
            if let Value::Symbol(id) = arg {
                let description = state.symbols.description(id).unwrap_or_else(|| Rc::from(""));
                return Ok(Value::string(format!("Symbol({})", description)));
            }
            Ok(Value::String(state.to_string(context, &arg)?))
        }
        Builtin::Number => {
            if args.is_empty() {
                return Ok(Value::Number(0.0));
            }
            Ok(Value::Number(state.to_number(context, &arg)?))
        }
        Builtin::Boolean => Ok(Value::Boolean(arg.to_boolean())),
    }
}

fn builtin_path(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::SymbolFor => "Symbol.for",
        other => other.name(),
    }
}

/// Looks up `name` on the global object of `context`.
pub fn global_value(state: &RuntimeState, context: ContextId, name: &str) -> Option<Value> {
    let global = state.context(context).realm.global;
    state
        .heap
        .get(global)
        .own(&PropertyKey::name(name))
        .map(|slot| slot.value.clone())
}
