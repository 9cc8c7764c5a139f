//! Undo log for graph operations.
//!
//! While an operation runs under [`Graph::atomically`], every slot write and
//! every collection entry write records what it replaced. If the operation
//! fails, the log is replayed backwards so entities it touched on the way
//! (displaced collection members, stolen one-to-one partners, re-keyed
//! entries) end up exactly as they were.

use crate::{Graph, GraphResult};
use imo_core::{EntityId, Key, MapKind, Value};
use imo_registry::Field;
use log::debug;

/// A single recorded write.
#[derive(Debug)]
enum Change {
    /// A scalar or reference slot and its previous value.
    Value {
        entity: EntityId,
        slot: String,
        old: Option<Value>,
    },
    /// A collection entry and what the key held before.
    Entry {
        owner: EntityId,
        slot: String,
        kind: MapKind,
        key: Key,
        old: Option<EntityId>,
        position: Option<usize>,
    },
}

/// Writes made by the running operation, oldest first.
#[derive(Debug, Default)]
pub(crate) struct UndoLog {
    changes: Vec<Change>,
}

impl UndoLog {
    fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }
}

impl<'r> Graph<'r> {
    /// Run `op` so that it either applies completely or not at all.
    ///
    /// Nested calls join the outermost operation.
    pub(crate) fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> GraphResult<T>,
    ) -> GraphResult<T> {
        if self.undo.is_some() {
            return op(self);
        }
        self.undo = Some(UndoLog::default());
        let result = op(self);
        let log = self.undo.take().unwrap_or_default();
        if result.is_err() {
            self.roll_back(log);
        }
        result
    }

    fn roll_back(&mut self, log: UndoLog) {
        debug!("rolling back {} writes", log.len());
        for change in log.changes.into_iter().rev() {
            match change {
                Change::Value { entity, slot, old } => {
                    if let Ok(entity) = self.entity_mut(entity) {
                        match old {
                            Some(value) => entity.set_value(&slot, value),
                            None => {
                                entity.unset_value(&slot);
                            }
                        }
                    }
                }
                Change::Entry {
                    owner,
                    slot,
                    kind,
                    key,
                    old,
                    position,
                } => {
                    if let Ok(owner) = self.entity_mut(owner) {
                        owner.collection_mut(&slot, kind).restore(key, old, position);
                    }
                }
            }
        }
    }

    /// Write a scalar or reference slot.
    pub(crate) fn write_value(&mut self, id: EntityId, field: &Field, value: Value) -> GraphResult<()> {
        let entity = self.entity_mut(id)?;
        let old = entity.value(&field.slot).cloned();
        entity.set_value(&field.slot, value);
        if let Some(log) = self.undo.as_mut() {
            log.record(Change::Value {
                entity: id,
                slot: field.slot.clone(),
                old,
            });
        }
        Ok(())
    }

    /// Map `key` to `child` in a collection, or drop the key when `child` is
    /// `None`. Returns the entity the key held before.
    pub(crate) fn write_entry(
        &mut self,
        owner: EntityId,
        collection: &Field,
        key: &Key,
        child: Option<EntityId>,
    ) -> GraphResult<Option<EntityId>> {
        let kind = collection.map_kind();
        let map = self
            .entity_mut(owner)?
            .collection_mut(&collection.slot, kind);
        let position = map.position(key);
        let old = match child {
            Some(child) => map.insert(key.clone(), child),
            None => map.remove(key),
        };
        if let Some(log) = self.undo.as_mut() {
            log.record(Change::Entry {
                owner,
                slot: collection.slot.clone(),
                kind,
                key: key.clone(),
                old,
                position,
            });
        }
        Ok(old)
    }
}
