//! Keyed maps backing collection fields.

use crate::{EntityId, Key};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};

/// Which map implementation backs a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapKind {
    /// Hash map, no iteration order (default).
    #[default]
    Unordered,
    /// Sorted by key.
    Ordered,
    /// Iterates in insertion order.
    Insertion,
}

impl MapKind {
    /// Create an empty map of this kind.
    pub fn new_map(self) -> KeyedMap {
        match self {
            MapKind::Unordered => KeyedMap::Unordered(HashMap::new()),
            MapKind::Ordered => KeyedMap::Ordered(BTreeMap::new()),
            MapKind::Insertion => KeyedMap::Insertion(IndexMap::new()),
        }
    }
}

/// Mapping `key -> entity` stored in a collection slot.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyedMap {
    Unordered(HashMap<Key, EntityId>),
    Ordered(BTreeMap<Key, EntityId>),
    Insertion(IndexMap<Key, EntityId>),
}

impl Default for KeyedMap {
    fn default() -> Self {
        MapKind::default().new_map()
    }
}

impl KeyedMap {
    pub fn kind(&self) -> MapKind {
        match self {
            KeyedMap::Unordered(_) => MapKind::Unordered,
            KeyedMap::Ordered(_) => MapKind::Ordered,
            KeyedMap::Insertion(_) => MapKind::Insertion,
        }
    }

    pub fn get(&self, key: &Key) -> Option<EntityId> {
        match self {
            KeyedMap::Unordered(m) => m.get(key).copied(),
            KeyedMap::Ordered(m) => m.get(key).copied(),
            KeyedMap::Insertion(m) => m.get(key).copied(),
        }
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Insert an entry, returning the entity previously stored under `key`.
    pub fn insert(&mut self, key: Key, entity: EntityId) -> Option<EntityId> {
        match self {
            KeyedMap::Unordered(m) => m.insert(key, entity),
            KeyedMap::Ordered(m) => m.insert(key, entity),
            KeyedMap::Insertion(m) => m.insert(key, entity),
        }
    }

    /// Remove the entry under `key`, returning its entity.
    pub fn remove(&mut self, key: &Key) -> Option<EntityId> {
        match self {
            KeyedMap::Unordered(m) => m.remove(key),
            KeyedMap::Ordered(m) => m.remove(key),
            KeyedMap::Insertion(m) => m.shift_remove(key),
        }
    }

    /// Index of `key` in iteration order. Only insertion-ordered maps track
    /// positions.
    pub fn position(&self, key: &Key) -> Option<usize> {
        match self {
            KeyedMap::Insertion(m) => m.get_index_of(key),
            _ => None,
        }
    }

    /// Put `key` back to an earlier state: absent when `entity` is `None`,
    /// otherwise mapped to `entity` at `position` if one was recorded.
    pub fn restore(&mut self, key: Key, entity: Option<EntityId>, position: Option<usize>) {
        let Some(entity) = entity else {
            self.remove(&key);
            return;
        };
        match (self, position) {
            (KeyedMap::Insertion(m), Some(index)) => {
                m.shift_remove(&key);
                let index = index.min(m.len());
                m.shift_insert(index, key, entity);
            }
            (map, _) => {
                map.insert(key, entity);
            }
        }
    }

    /// Find the key under which `entity` is stored.
    pub fn key_of(&self, entity: EntityId) -> Option<Key> {
        self.iter()
            .find(|(_, candidate)| *candidate == entity)
            .map(|(key, _)| key.clone())
    }

    pub fn len(&self) -> usize {
        match self {
            KeyedMap::Unordered(m) => m.len(),
            KeyedMap::Ordered(m) => m.len(),
            KeyedMap::Insertion(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over entries in the map's own order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&Key, EntityId)> + '_> {
        match self {
            KeyedMap::Unordered(m) => Box::new(m.iter().map(|(k, v)| (k, *v))),
            KeyedMap::Ordered(m) => Box::new(m.iter().map(|(k, v)| (k, *v))),
            KeyedMap::Insertion(m) => Box::new(m.iter().map(|(k, v)| (k, *v))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(_, v)| v)
    }
}
