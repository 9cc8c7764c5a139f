//! Views over collection fields.

use crate::{Graph, GraphResult};
use imo_core::{EntityId, Key, KeyedMap};
use imo_registry::Field;

/// Read-only view of a collection. A collection that was never written reads
/// as empty.
#[derive(Debug, Clone, Copy)]
pub struct Collection<'g> {
    map: Option<&'g KeyedMap>,
}

impl<'g> Collection<'g> {
    pub(crate) fn new(map: Option<&'g KeyedMap>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<EntityId> {
        self.map.and_then(|map| map.get(&key.into()))
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.get(key).is_some()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.map.is_some_and(|map| map.key_of(entity).is_some())
    }

    pub fn len(&self) -> usize {
        self.map.map_or(0, KeyedMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in the iteration order of the backing map.
    pub fn iter(&self) -> impl Iterator<Item = (&'g Key, EntityId)> + 'g {
        self.map.into_iter().flat_map(|map| map.iter())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'g Key> + 'g {
        self.iter().map(|(key, _)| key)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + 'g {
        self.iter().map(|(_, entity)| entity)
    }
}

/// Mutable view of a collection. Every write keeps the members' reverse
/// references in step, and a write that fails leaves the graph unchanged.
pub struct CollectionMut<'g, 'r> {
    graph: &'g mut Graph<'r>,
    owner: EntityId,
    field: &'r Field,
}

impl<'g, 'r> CollectionMut<'g, 'r> {
    pub(crate) fn new(graph: &'g mut Graph<'r>, owner: EntityId, field: &'r Field) -> Self {
        Self { graph, owner, field }
    }

    pub fn view(&self) -> GraphResult<Collection<'_>> {
        let entity = self.graph.entity(self.owner)?;
        Ok(Collection::new(entity.collection(&self.field.slot)))
    }

    pub fn get(&self, key: impl Into<Key>) -> GraphResult<Option<EntityId>> {
        self.graph.collection_entry(self.owner, self.field, &key.into())
    }

    pub fn len(&self) -> GraphResult<usize> {
        Ok(self.view()?.len())
    }

    /// Store `child` under an explicit key.
    ///
    /// When the collection is keyed, the key must equal the child's current
    /// key value. An entity already stored under the key is evicted.
    pub fn insert(&mut self, key: impl Into<Key>, child: EntityId) -> GraphResult<()> {
        let (owner, field, key) = (self.owner, self.field, key.into());
        self.graph
            .atomically(|graph| graph.collection_insert(owner, field, key, child))
    }

    /// Remove the entry under `key`, returning the evicted entity.
    pub fn remove_key(&mut self, key: impl Into<Key>) -> GraphResult<Option<EntityId>> {
        let (owner, field, key) = (self.owner, self.field, key.into());
        self.graph
            .atomically(|graph| graph.collection_delete(owner, field, &key))
    }

    /// Insert `child` under its own key.
    pub fn add(&mut self, child: EntityId) -> GraphResult<()> {
        let (owner, field) = (self.owner, self.field);
        self.graph
            .atomically(|graph| graph.collection_add(owner, field, child))
    }

    /// Remove `child` if it is stored under its current key. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, child: EntityId) -> GraphResult<bool> {
        let (owner, field) = (self.owner, self.field);
        self.graph
            .atomically(|graph| graph.collection_remove(owner, field, child))
    }

    pub fn clear(&mut self) -> GraphResult<()> {
        let (owner, field) = (self.owner, self.field);
        self.graph
            .atomically(|graph| graph.clear_collection(owner, field))
    }
}
