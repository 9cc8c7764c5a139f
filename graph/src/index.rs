//! Index for finding entities by type.

use imo_core::{EntityId, TypeId};
use std::collections::{BTreeSet, HashMap};

/// Type index: TypeId -> Set<EntityId>
///
/// Sets are ordered so lookups come back in creation order.
#[derive(Debug, Default)]
pub struct TypeIndex {
    index: HashMap<TypeId, BTreeSet<EntityId>>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_id: TypeId, entity: EntityId) {
        self.index.entry(type_id).or_default().insert(entity);
    }

    pub fn remove(&mut self, type_id: TypeId, entity: EntityId) {
        if let Some(set) = self.index.get_mut(&type_id) {
            set.remove(&entity);
            if set.is_empty() {
                self.index.remove(&type_id);
            }
        }
    }

    pub fn get(&self, type_id: TypeId) -> impl Iterator<Item = EntityId> + '_ {
        self.index
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}
