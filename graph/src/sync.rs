//! Reference integrity.
//!
//! Every write to a field is routed by the field's kind:
//! - scalars store the value, re-keying collections the entity sits in when
//!   the value keys one of them
//! - references detach from the old target's reverse field and attach to the
//!   new target's
//! - collection entries set the child's reference back to the owner
//!
//! Validation happens before the first mutation, so a rejected write leaves
//! the graph unchanged.

use crate::{Graph, GraphError, GraphResult};
use imo_core::{EntityId, Key, Value};
use imo_registry::{Field, FieldKind};
use log::trace;

/// A collection entry that has to follow a key change.
struct Rekey<'r> {
    owner: EntityId,
    collection: &'r Field,
    back: Option<&'r Field>,
    old: Key,
    new: Key,
}

impl<'r> Graph<'r> {
    /// Route a write by field kind.
    pub(crate) fn assign(&mut self, id: EntityId, field: &'r Field, value: Value) -> GraphResult<()> {
        match &field.kind {
            FieldKind::Scalar => self.store_value(id, field, value),
            FieldKind::Reference(_) => {
                let target = self.reference_target(id, field, value)?;
                self.set_reference(id, field, target)
            }
            FieldKind::Collection(_) => self.replace_collection(id, field, value),
        }
    }

    fn reference_target(
        &self,
        id: EntityId,
        field: &Field,
        value: Value,
    ) -> GraphResult<Option<EntityId>> {
        match value {
            Value::Null => Ok(None),
            Value::Ref(target) => Ok(Some(target)),
            other => Err(self.mismatch(id, field, other.type_name())?),
        }
    }

    fn mismatch(&self, id: EntityId, field: &Field, actual: &str) -> GraphResult<GraphError> {
        let registry = self.registry();
        let expected = registry.target_type(field)?;
        Ok(GraphError::type_mismatch(
            registry.type_name(self.type_of(id)?),
            &field.name,
            registry.type_name(expected),
            actual,
        ))
    }

    // ==================== Scalars ====================

    /// Stored value of a non-collection slot.
    ///
    /// Defaults are written at construction, so only a slot whose initial
    /// value has not been applied yet reads as unset (null).
    pub(crate) fn read_value(&self, id: EntityId, field: &Field) -> GraphResult<Value> {
        let entity = self.entity(id)?;
        Ok(entity.value(&field.slot).cloned().unwrap_or_default())
    }

    pub(crate) fn read_ref(&self, id: EntityId, field: &Field) -> GraphResult<Option<EntityId>> {
        Ok(self.read_value(id, field)?.as_entity())
    }

    /// Write a slot without touching the reverse side.
    ///
    /// If the field keys a collection this entity is a member of, the entry
    /// moves from the old key to the new one.
    pub(crate) fn store_value(&mut self, id: EntityId, field: &'r Field, value: Value) -> GraphResult<()> {
        let old = self.read_value(id, field)?;
        let moves = if field.sync_reverse && old != value {
            self.plan_rekey(id, field, &old, &value)?
        } else {
            Vec::new()
        };

        self.write_value(id, field, value)?;

        for rekey in moves {
            self.apply_rekey(id, rekey)?;
        }
        Ok(())
    }

    fn plan_rekey(
        &self,
        id: EntityId,
        field: &'r Field,
        old: &Value,
        new: &Value,
    ) -> GraphResult<Vec<Rekey<'r>>> {
        let registry = self.registry();
        let mut moves = Vec::new();
        for reference in self.schema_of(id)?.fields().filter(|f| f.is_reference()) {
            let Some(collection) = registry.reverse_field(reference)? else {
                continue;
            };
            if !collection.is_collection() {
                continue;
            }
            let keyed_by = registry.collection_key_field(collection)?;
            if keyed_by.map(|k| k.name.as_str()) != Some(field.name.as_str()) {
                continue;
            }
            let Some(owner) = self.read_ref(id, reference)? else {
                continue;
            };
            moves.push(Rekey {
                owner,
                collection,
                back: registry.reverse_field(collection)?,
                old: key_from(field, old)?,
                new: key_from(field, new)?,
            });
        }
        Ok(moves)
    }

    fn apply_rekey(&mut self, id: EntityId, rekey: Rekey<'r>) -> GraphResult<()> {
        let collection = rekey.collection;
        if self.collection_entry(rekey.owner, collection, &rekey.old)? != Some(id) {
            return Ok(());
        }
        self.write_entry(rekey.owner, collection, &rekey.old, None)?;
        let displaced = self.write_entry(rekey.owner, collection, &rekey.new, Some(id))?;
        trace!(
            "re-keyed {} in {} of {}: {} -> {}",
            id,
            collection.qualified_name(),
            rekey.owner,
            rekey.old,
            rekey.new
        );
        match displaced {
            Some(other) if other != id => self.clear_back_ref(other, rekey.back, rekey.owner),
            _ => Ok(()),
        }
    }

    /// Null `entity`'s reverse field if it still points at `owner`.
    fn clear_back_ref(
        &mut self,
        entity: EntityId,
        back: Option<&'r Field>,
        owner: EntityId,
    ) -> GraphResult<()> {
        let Some(back) = back else {
            return Ok(());
        };
        if self.read_ref(entity, back)? == Some(owner) {
            trace!("cleared {} of {}", back.qualified_name(), entity);
            self.store_value(entity, back, Value::Null)?;
        }
        Ok(())
    }

    // ==================== References ====================

    fn check_instance(&self, id: EntityId, field: &Field, candidate: EntityId) -> GraphResult<()> {
        let registry = self.registry();
        let expected = registry.target_type(field)?;
        let actual = self.type_of(candidate)?;
        if registry.is_subtype(actual, expected) {
            return Ok(());
        }
        Err(self.mismatch(id, field, registry.type_name(actual))?)
    }

    /// The child's own binding of a collection key field. A subtype may have
    /// redeclared it.
    fn key_field_of(&self, child: EntityId, key_field: &'r Field) -> GraphResult<&'r Field> {
        Ok(self.schema_of(child)?.field(&key_field.name).unwrap_or(key_field))
    }

    /// Key under which `child` belongs in `collection`.
    fn entry_key(&self, child: EntityId, collection: &'r Field) -> GraphResult<Key> {
        let key_field = self.key_field_of(child, self.registry().collection_key(collection)?)?;
        let value = self.read_value(child, key_field)?;
        key_from(key_field, &value)
    }

    /// Point a reference at `target`, moving the reverse side along.
    pub(crate) fn set_reference(
        &mut self,
        id: EntityId,
        field: &'r Field,
        target: Option<EntityId>,
    ) -> GraphResult<()> {
        let current = self.read_ref(id, field)?;
        if current == target {
            return Ok(());
        }

        let registry = self.registry();
        let reverse = registry.reverse_field(field)?;
        let mut attach_key = None;
        let mut back = None;
        if let Some(target) = target {
            self.check_instance(id, field, target)?;
            match reverse {
                Some(rev) if rev.is_collection() => {
                    attach_key = Some(self.entry_key(id, rev)?);
                    back = registry.reverse_field(rev)?;
                }
                Some(rev) if rev.is_reference() => {
                    self.check_instance(target, rev, id)?;
                    registry.reverse_field(rev)?;
                }
                _ => {}
            }
        }

        self.store_value(id, field, Value::from(target))?;

        if let (Some(rev), Some(old)) = (reverse, current) {
            self.detach(id, rev, old)?;
        }
        if let (Some(rev), Some(new)) = (reverse, target) {
            match &rev.kind {
                FieldKind::Collection(_) => {
                    if let Some(key) = attach_key {
                        self.insert_entry(new, rev, key, id, back)?;
                    }
                }
                FieldKind::Reference(_) => self.set_reference(new, rev, Some(id))?,
                FieldKind::Scalar => self.store_value(new, rev, Value::Ref(id))?,
            }
            trace!("attached {} to {} of {}", id, rev.qualified_name(), new);
        }
        Ok(())
    }

    /// Take `id` out of `old`'s reverse field.
    fn detach(&mut self, id: EntityId, reverse: &'r Field, old: EntityId) -> GraphResult<()> {
        if !self.contains(old) {
            return Ok(());
        }
        if reverse.is_collection() {
            let key = match self.entry_key(id, reverse) {
                Ok(key) if self.collection_entry(old, reverse, &key)? == Some(id) => Some(key),
                _ => self
                    .entity(old)?
                    .collection(&reverse.slot)
                    .and_then(|map| map.key_of(id)),
            };
            if let Some(key) = key {
                self.write_entry(old, reverse, &key, None)?;
            }
            trace!("detached {} from {} of {}", id, reverse.qualified_name(), old);
        } else if self.read_ref(old, reverse)? == Some(id) {
            self.store_value(old, reverse, Value::Null)?;
            trace!("detached {} from {} of {}", id, reverse.qualified_name(), old);
        }
        Ok(())
    }

    fn insert_entry(
        &mut self,
        owner: EntityId,
        collection: &'r Field,
        key: Key,
        child: EntityId,
        back: Option<&'r Field>,
    ) -> GraphResult<()> {
        let displaced = self.write_entry(owner, collection, &key, Some(child))?;
        match displaced {
            Some(other) if other != child => self.clear_back_ref(other, back, owner),
            _ => Ok(()),
        }
    }

    // ==================== Collections ====================

    pub(crate) fn collection_entry(
        &self,
        owner: EntityId,
        collection: &Field,
        key: &Key,
    ) -> GraphResult<Option<EntityId>> {
        Ok(self
            .entity(owner)?
            .collection(&collection.slot)
            .and_then(|map| map.get(key)))
    }

    /// Store `child` under `key`, pointing the child's reverse field at the
    /// owner. An entity displaced from the key loses its reverse link.
    pub(crate) fn collection_insert(
        &mut self,
        owner: EntityId,
        collection: &'r Field,
        key: Key,
        child: EntityId,
    ) -> GraphResult<()> {
        if self.collection_entry(owner, collection, &key)? == Some(child) {
            return Ok(());
        }

        let registry = self.registry();
        self.check_instance(owner, collection, child)?;
        let back = registry.reverse_field(collection)?;
        match registry.collection_key_field(collection)? {
            Some(key_field) => {
                let key_field = self.key_field_of(child, key_field)?;
                let actual = key_from(key_field, &self.read_value(child, key_field)?)?;
                if actual != key {
                    return Err(GraphError::KeyMismatch {
                        field: collection.qualified_name(),
                        entity: child,
                        expected: key.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
            None if back.is_some() => {
                registry.collection_key(collection)?;
            }
            None => {}
        }
        if let Some(back) = back.filter(|b| b.is_reference()) {
            self.check_instance(child, back, owner)?;
            registry.reverse_field(back)?;
        }

        let displaced = self.write_entry(owner, collection, &key, Some(child))?;
        trace!("attached {} to {} of {}", child, collection.qualified_name(), owner);

        match back {
            Some(back) if back.is_reference() => self.set_reference(child, back, Some(owner))?,
            Some(back) => self.store_value(child, back, Value::Ref(owner))?,
            None => {}
        }
        if let Some(other) = displaced.filter(|other| *other != child) {
            self.clear_back_ref(other, back, owner)?;
        }
        Ok(())
    }

    /// Remove the entry under `key`, clearing the removed child's reverse link.
    pub(crate) fn collection_delete(
        &mut self,
        owner: EntityId,
        collection: &'r Field,
        key: &Key,
    ) -> GraphResult<Option<EntityId>> {
        let back = self.registry().reverse_field(collection)?;
        let removed = self.write_entry(owner, collection, key, None)?;
        if let Some(child) = removed {
            trace!("detached {} from {} of {}", child, collection.qualified_name(), owner);
            self.clear_back_ref(child, back, owner)?;
        }
        Ok(removed)
    }

    /// Insert `child` under its own key.
    pub(crate) fn collection_add(
        &mut self,
        owner: EntityId,
        collection: &'r Field,
        child: EntityId,
    ) -> GraphResult<()> {
        self.check_instance(owner, collection, child)?;
        let key = self.entry_key(child, collection)?;
        self.collection_insert(owner, collection, key, child)
    }

    /// Remove `child` if it is the entry under its current key.
    pub(crate) fn collection_remove(
        &mut self,
        owner: EntityId,
        collection: &'r Field,
        child: EntityId,
    ) -> GraphResult<bool> {
        let key = self.entry_key(child, collection)?;
        if self.collection_entry(owner, collection, &key)? != Some(child) {
            return Ok(false);
        }
        self.collection_delete(owner, collection, &key)?;
        Ok(true)
    }

    pub(crate) fn clear_collection(&mut self, owner: EntityId, collection: &'r Field) -> GraphResult<()> {
        let keys: Vec<Key> = self
            .entity(owner)?
            .collection(&collection.slot)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            self.collection_delete(owner, collection, &key)?;
        }
        Ok(())
    }

    /// Make a collection hold exactly the listed entities.
    fn replace_collection(&mut self, owner: EntityId, collection: &'r Field, value: Value) -> GraphResult<()> {
        let members = match value {
            Value::Null => Vec::new(),
            Value::List(items) => {
                let mut members = Vec::with_capacity(items.len());
                for item in &items {
                    match item.as_entity() {
                        Some(child) => members.push(child),
                        None => return Err(self.mismatch(owner, collection, item.type_name())?),
                    }
                }
                members
            }
            other => return Err(self.mismatch(owner, collection, other.type_name())?),
        };
        for &child in &members {
            self.check_instance(owner, collection, child)?;
            self.entry_key(child, collection)?;
        }

        let stale: Vec<Key> = self
            .entity(owner)?
            .collection(&collection.slot)
            .map(|map| {
                map.iter()
                    .filter(|(_, child)| !members.contains(child))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        for key in stale {
            self.collection_delete(owner, collection, &key)?;
        }
        for child in members {
            self.collection_add(owner, collection, child)?;
        }
        Ok(())
    }
}

fn key_from(field: &Field, value: &Value) -> GraphResult<Key> {
    Key::from_value(value).ok_or_else(|| GraphError::unkeyable_value(field.qualified_name(), value))
}
