// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript value representation.

use std::fmt;
use std::rc::Rc;

/// Index of an object on the runtime heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u32);

/// Index of a symbol in the runtime symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub(crate) u32);

/// A JavaScript value.
///
/// Equality is strict equality (`===`): `NaN` is unequal to itself, `+0`
/// equals `-0`, strings compare by content and objects by identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(Rc<str>),
    /// Symbol
    Symbol(SymbolId),
    /// Object reference
    Object(ObjectId),
}

impl Value {
    /// Creates a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns the object id if this value is an object.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Converts the value to a boolean (ToBoolean).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", super::conversions::number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Symbol(id) => write!(f, "Symbol(#{})", id.0),
            Value::Object(id) => write!(f, "[object #{}]", id.0),
        }
    }
}

/// Type tag reported by `js_get_value_type`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsValueType {
    /// undefined
    Undefined = 0,
    /// null
    Null = 1,
    /// number
    Number = 2,
    /// string
    String = 3,
    /// boolean
    Boolean = 4,
    /// Ordinary object, including module namespaces
    Object = 5,
    /// Callable object
    Function = 6,
    /// Error instance
    Error = 7,
    /// symbol
    Symbol = 9,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_equality_semantics() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(Value::string("a"), Value::string(String::from("a")));
        assert_ne!(Value::Object(ObjectId(1)), Value::Object(ObjectId(2)));
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn test_to_boolean() {
        assert!(!Value::string("").to_boolean());
        assert!(Value::string("0").to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(Value::Object(ObjectId(0)).to_boolean());
    }
}
