//! Core graph storage implementation.

use crate::index::TypeIndex;
use crate::undo::UndoLog;
use crate::{Collection, CollectionMut, GraphError, GraphResult};
use imo_core::{Attributes, Entity, EntityId, TypeId, Value};
use imo_registry::{Field, FieldKind, Registry, Schema};
use log::debug;
use std::collections::HashMap;

/// ID allocator for entities.
#[derive(Debug)]
struct IdAllocator {
    next_entity_id: u64,
}

impl IdAllocator {
    fn new() -> Self {
        Self { next_entity_id: 1 }
    }

    fn alloc_entity_id(&mut self) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id += 1;
        id
    }
}

/// The in-memory entity graph.
///
/// Entities are owned by the graph and addressed by [`EntityId`]. Every write
/// goes through the field's schema so both sides of a relation stay in sync.
#[derive(Debug)]
pub struct Graph<'r> {
    /// Schemas of every entity type
    registry: &'r Registry,
    /// Entity storage
    entities: HashMap<EntityId, Entity>,
    /// ID allocator
    id_alloc: IdAllocator,
    /// Type index
    type_index: TypeIndex,
    /// Writes of the running operation, for rollback
    pub(crate) undo: Option<UndoLog>,
}

impl<'r> Graph<'r> {
    /// Create a new empty graph over a registry.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            entities: HashMap::new(),
            id_alloc: IdAllocator::new(),
            type_index: TypeIndex::new(),
            undo: None,
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the raw storage of an entity.
    pub fn entity(&self, id: EntityId) -> GraphResult<&Entity> {
        self.entities.get(&id).ok_or(GraphError::EntityNotFound(id))
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> GraphResult<&mut Entity> {
        self.entities
            .get_mut(&id)
            .ok_or(GraphError::EntityNotFound(id))
    }

    pub fn type_of(&self, id: EntityId) -> GraphResult<TypeId> {
        Ok(self.entity(id)?.type_id)
    }

    /// Get the schema an entity was created from.
    pub fn schema_of(&self, id: EntityId) -> GraphResult<&'r Schema> {
        let type_id = self.type_of(id)?;
        self.registry
            .get_type(type_id)
            .ok_or_else(|| GraphError::unknown_type(type_id.to_string()))
    }

    /// Check whether an entity is of the named type or one of its subtypes.
    pub fn is_instance(&self, id: EntityId, type_name: &str) -> GraphResult<bool> {
        let expected = self
            .registry
            .get_type_id(type_name)
            .ok_or_else(|| GraphError::unknown_type(type_name))?;
        Ok(self.registry.is_subtype(self.type_of(id)?, expected))
    }

    pub(crate) fn field_of(&self, id: EntityId, name: &str) -> GraphResult<&'r Field> {
        let schema = self.schema_of(id)?;
        schema
            .field(name)
            .ok_or_else(|| GraphError::unknown_field(&schema.name, name))
    }

    /// Find all entities of a type, including those of its subtypes.
    pub fn entities_of_type(&self, type_name: &str) -> GraphResult<Vec<EntityId>> {
        let type_id = self
            .registry
            .get_type_id(type_name)
            .ok_or_else(|| GraphError::unknown_type(type_name))?;
        let mut found: Vec<EntityId> = self.type_index.get(type_id).collect();
        for sub in self.registry.get_subtypes(type_id) {
            found.extend(self.type_index.get(sub));
        }
        found.sort();
        Ok(found)
    }

    // ==================== Construction ====================

    /// Create an entity from ordered initial values.
    ///
    /// Fields left out receive their default first, each default produced
    /// once. The given values are then applied in order through the same
    /// setters as [`Graph::set`], so relations given at construction are
    /// synchronized. If any value is rejected, every write made so far is
    /// undone, the new entity is dropped and the error is returned.
    pub fn create(&mut self, type_name: &str, attributes: Attributes) -> GraphResult<EntityId> {
        let registry = self.registry;
        let schema = registry
            .get_type_by_name(type_name)
            .ok_or_else(|| GraphError::unknown_type(type_name))?;

        let mut assignments = Vec::with_capacity(attributes.len());
        for (name, value) in attributes {
            let field = schema
                .field(&name)
                .ok_or_else(|| GraphError::unknown_field(&schema.name, &name))?;
            assignments.push((field, value));
        }

        let id = self.id_alloc.alloc_entity_id();
        let mut entity = Entity::new(id, schema.id);
        for field in schema.fields() {
            if assignments.iter().any(|(given, _)| given.slot == field.slot) {
                continue;
            }
            if field.is_collection() {
                entity.collection_mut(&field.slot, field.map_kind());
            } else {
                entity.set_value(&field.slot, field.default.produce());
            }
        }
        self.entities.insert(id, entity);
        self.type_index.insert(schema.id, id);

        let applied = self.atomically(|graph| {
            for (field, value) in assignments {
                graph.assign(id, field, value)?;
            }
            Ok(())
        });
        if let Err(err) = applied {
            debug!("dropping {} {}: {}", schema.name, id, err);
            self.entities.remove(&id);
            self.type_index.remove(schema.id, id);
            return Err(err);
        }

        debug!("created {} {}", schema.name, id);
        Ok(id)
    }

    // ==================== Field Access ====================

    /// Read a field. Collections read as a list of refs.
    pub fn get(&self, id: EntityId, name: &str) -> GraphResult<Value> {
        let field = self.field_of(id, name)?;
        self.read_field(id, field)
    }

    /// Read a reference field as an entity handle.
    pub fn get_ref(&self, id: EntityId, name: &str) -> GraphResult<Option<EntityId>> {
        Ok(self.get(id, name)?.as_entity())
    }

    /// Write a field, keeping both sides of any relation consistent.
    ///
    /// A rejected write leaves the graph unchanged.
    pub fn set(&mut self, id: EntityId, name: &str, value: impl Into<Value>) -> GraphResult<()> {
        let field = self.field_of(id, name)?;
        let value = value.into();
        self.atomically(|graph| graph.assign(id, field, value))
    }

    /// Read-only view of a collection field.
    pub fn collection(&self, id: EntityId, name: &str) -> GraphResult<Collection<'_>> {
        let field = self.field_of(id, name)?;
        if !field.is_collection() {
            return Err(GraphError::NotACollection {
                field: field.qualified_name(),
            });
        }
        Ok(Collection::new(self.entity(id)?.collection(&field.slot)))
    }

    /// Mutable view of a collection field. Writes through it are synchronized.
    pub fn collection_mut(&mut self, id: EntityId, name: &str) -> GraphResult<CollectionMut<'_, 'r>> {
        let field = self.field_of(id, name)?;
        if !field.is_collection() {
            return Err(GraphError::NotACollection {
                field: field.qualified_name(),
            });
        }
        Ok(CollectionMut::new(self, id, field))
    }

    pub(crate) fn read_field(&self, id: EntityId, field: &Field) -> GraphResult<Value> {
        if !field.is_collection() {
            return self.read_value(id, field);
        }
        let members = self
            .entity(id)?
            .collection(&field.slot)
            .map(|map| map.entities().map(Value::Ref).collect())
            .unwrap_or_default();
        Ok(Value::List(members))
    }

    // ==================== Bulk Operations ====================

    /// Copy every updatable field from `source` onto `id`.
    ///
    /// Fields are copied in schema order. Fields the source's type does not
    /// carry are skipped. If any copy fails, none of them take effect.
    pub fn update(&mut self, id: EntityId, source: EntityId) -> GraphResult<()> {
        let schema = self.schema_of(id)?;
        let source_schema = self.schema_of(source)?;
        self.atomically(|graph| {
            for field in schema.fields().filter(|f| f.updatable) {
                if !source_schema.carries(field.id) {
                    continue;
                }
                let value = graph.read_field(source, field)?;
                graph.assign(id, field, value)?;
            }
            Ok(())
        })?;
        debug!("updated {} from {}", id, source);
        Ok(())
    }

    /// Remove an entity, unlinking it from every relation first.
    ///
    /// Partners reached through a reverse field are cleaned up. One-way
    /// references held by other entities are left as they are.
    pub fn remove(&mut self, id: EntityId) -> GraphResult<()> {
        let schema = self.schema_of(id)?;
        self.atomically(|graph| {
            for field in schema.fields() {
                match &field.kind {
                    FieldKind::Reference(_) => graph.set_reference(id, field, None)?,
                    FieldKind::Collection(_) => graph.clear_collection(id, field)?,
                    FieldKind::Scalar => {}
                }
            }
            Ok(())
        })?;

        let entity = self
            .entities
            .remove(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        self.type_index.remove(entity.type_id, id);
        debug!("removed {} {}", schema.name, id);
        Ok(())
    }
}
