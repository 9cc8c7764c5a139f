//! Entity storage for IMO.
//!
//! An entity owns one slot per field of its schema. Slots are addressed by the
//! slot name the field was bound to; a missing slot means "unset". Value slots
//! and collection slots live in separate maps, and writing one kind of slot
//! drops a slot of the same name of the other kind.

use crate::{EntityId, KeyedMap, MapKind, TypeId, Value};
use std::collections::HashMap;

/// An entity resident in a graph.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Stable handle of this entity.
    pub id: EntityId,
    /// Type of this entity (reference to registry).
    pub type_id: TypeId,
    /// Scalar values and references (`Value::Ref` / `Value::Null`).
    values: HashMap<String, Value>,
    /// Backing maps of collection fields.
    collections: HashMap<String, KeyedMap>,
}

impl Entity {
    /// Create an entity with no slots set.
    pub fn new(id: EntityId, type_id: TypeId) -> Self {
        Self {
            id,
            type_id,
            values: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    /// Whether the slot has been written.
    pub fn has_slot(&self, slot: &str) -> bool {
        self.values.contains_key(slot) || self.collections.contains_key(slot)
    }

    /// Get the stored value of a scalar or reference slot.
    pub fn value(&self, slot: &str) -> Option<&Value> {
        self.values.get(slot)
    }

    /// Write a scalar or reference slot.
    pub fn set_value(&mut self, slot: &str, value: Value) {
        self.collections.remove(slot);
        self.values.insert(slot.to_string(), value);
    }

    /// Forget a scalar or reference slot, leaving it unset.
    pub fn unset_value(&mut self, slot: &str) -> Option<Value> {
        self.values.remove(slot)
    }

    /// Get the backing map of a collection slot, if it has been created.
    pub fn collection(&self, slot: &str) -> Option<&KeyedMap> {
        self.collections.get(slot)
    }

    /// Get the backing map of a collection slot, creating it on first access.
    pub fn collection_mut(&mut self, slot: &str, kind: MapKind) -> &mut KeyedMap {
        self.values.remove(slot);
        self.collections
            .entry(slot.to_string())
            .or_insert_with(|| kind.new_map())
    }
}
