// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Heap objects and their property storage.

use std::rc::Rc;

use super::module::ModuleId;
use super::value::{ObjectId, SymbolId, Value};
use crate::vm::builtins::Builtin;

/// A property key: a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-named property
    String(Rc<str>),
    /// Symbol-keyed property
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Creates a string key.
    pub fn name(name: &str) -> Self {
        PropertyKey::String(Rc::from(name))
    }
}

/// Attributes controlling how a data property may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    /// Value may be reassigned
    pub writable: bool,
    /// Shows up in enumeration
    pub enumerable: bool,
    /// May be deleted or redefined
    pub configurable: bool,
}

impl PropertyFlags {
    /// Flags of a property created by plain assignment.
    pub const DEFAULT: PropertyFlags = PropertyFlags {
        writable: true,
        enumerable: true,
        configurable: true,
    };

    /// Flags used for built-in methods and error messages.
    pub const HIDDEN: PropertyFlags = PropertyFlags {
        writable: true,
        enumerable: false,
        configurable: true,
    };

    /// Fully locked.
    pub const FROZEN: PropertyFlags = PropertyFlags {
        writable: false,
        enumerable: false,
        configurable: false,
    };
}

/// A data property.
#[derive(Debug, Clone)]
pub struct PropertySlot {
    /// Stored value
    pub value: Value,
    /// Attributes
    pub flags: PropertyFlags,
}

/// What kind of object this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Error instance
    Error,
    /// Built-in function
    Function(Builtin),
    /// Module namespace exotic object
    Namespace(ModuleId),
}

/// A heap-allocated object.
#[derive(Debug, Clone)]
pub struct JsObject {
    /// Object kind
    pub kind: ObjectKind,
    /// Prototype link
    pub prototype: Option<ObjectId>,
    /// Own properties in insertion order
    pub properties: Vec<(PropertyKey, PropertySlot)>,
}

impl JsObject {
    /// Creates an empty object of the given kind.
    pub fn new(kind: ObjectKind, prototype: Option<ObjectId>) -> Self {
        Self {
            kind,
            prototype,
            properties: Vec::new(),
        }
    }

    /// Looks up an own property.
    pub fn own(&self, key: &PropertyKey) -> Option<&PropertySlot> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, slot)| slot)
    }

    /// Looks up an own property mutably.
    pub fn own_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertySlot> {
        self.properties
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, slot)| slot)
    }

    /// Inserts or replaces an own property without checking attributes.
    pub fn put(&mut self, key: PropertyKey, value: Value, flags: PropertyFlags) {
        match self.own_mut(&key) {
            Some(slot) => *slot = PropertySlot { value, flags },
            None => self.properties.push((key, PropertySlot { value, flags })),
        }
    }
}

/// Storage for every object allocated by a runtime.
///
/// Objects live for as long as the runtime does; handles are what the
/// collector reclaims.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    /// Allocates an object and returns its id.
    pub fn alloc(&mut self, object: JsObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Returns the object with the given id.
    pub fn get(&self, id: ObjectId) -> &JsObject {
        &self.objects[id.0 as usize]
    }

    /// Returns the object with the given id mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> &mut JsObject {
        &mut self.objects[id.0 as usize]
    }

    /// Number of allocated objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Symbol descriptions plus the `Symbol.for` registry.
#[derive(Debug, Default)]
pub struct SymbolTable {
    descriptions: Vec<Option<Rc<str>>>,
    registry: rustc_hash::FxHashMap<Rc<str>, SymbolId>,
}

impl SymbolTable {
    /// Creates a fresh, unregistered symbol.
    pub fn create(&mut self, description: Option<Rc<str>>) -> SymbolId {
        let id = SymbolId(self.descriptions.len() as u32);
        self.descriptions.push(description);
        id
    }

    /// Returns the registered symbol for `key`, creating it on first use.
    pub fn for_key(&mut self, key: &str) -> SymbolId {
        if let Some(id) = self.registry.get(key) {
            return *id;
        }
        let key: Rc<str> = Rc::from(key);
        let id = self.create(Some(key.clone()));
        self.registry.insert(key, id);
        id
    }

    /// Returns the description a symbol was created with.
    pub fn description(&self, id: SymbolId) -> Option<Rc<str>> {
        self.descriptions.get(id.0 as usize).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_in_place() {
        let mut object = JsObject::new(ObjectKind::Ordinary, None);
        object.put(PropertyKey::name("a"), Value::Number(1.0), PropertyFlags::DEFAULT);
        object.put(PropertyKey::name("b"), Value::Number(2.0), PropertyFlags::DEFAULT);
        object.put(PropertyKey::name("a"), Value::Number(3.0), PropertyFlags::FROZEN);
        assert_eq!(object.properties.len(), 2);
        let slot = object.own(&PropertyKey::name("a")).unwrap();
        assert_eq!(slot.value, Value::Number(3.0));
        assert!(!slot.flags.writable);
    }

    #[test]
    fn test_symbol_registry_is_shared() {
        let mut symbols = SymbolTable::default();
        let a = symbols.for_key("$DEFAULTEXPORT_x");
        let b = symbols.for_key("$DEFAULTEXPORT_x");
        let c = symbols.create(Some(Rc::from("$DEFAULTEXPORT_x")));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(symbols.description(c).as_deref(), Some("$DEFAULTEXPORT_x"));
    }
}
