//! RegistryBuilder for declaring entity types and assembling their schemas.

use crate::{Field, FieldDef, Registry, Schema, SubtypeIndex};
use imo_core::{FieldId, TypeId};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while declaring types.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate type name: {0}")]
    DuplicateTypeName(String),

    #[error("Unknown parent type: {0}")]
    UnknownParentType(String),

    #[error("At most one key field is allowed: type {type_name} has {first} and {second}")]
    MultipleKeyFields {
        type_name: String,
        first: String,
        second: String,
    },

    #[error("Field {field} declared twice on type {type_name}")]
    DuplicateField { type_name: String, field: String },

    #[error("Key field {field} on type {type_name} must be a scalar field")]
    InvalidKeyField { type_name: String, field: String },

    #[error("Fields {first} and {second} of type {type_name} share storage slot {slot}")]
    SlotConflict {
        type_name: String,
        slot: String,
        first: String,
        second: String,
    },
}

impl RegistryError {
    pub fn multiple_key_fields(
        type_name: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::MultipleKeyFields {
            type_name: type_name.into(),
            first: first.into(),
            second: second.into(),
        }
    }
}

/// Builder for constructing an immutable Registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    /// Next type ID to allocate.
    next_type_id: u32,
    /// Next field ID to allocate.
    next_field_id: u32,
    /// Schemas assembled so far.
    types: HashMap<TypeId, Schema>,
    /// Type name to ID mapping.
    type_names: HashMap<String, TypeId>,
}

impl RegistryBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring an entity type.
    pub fn add_type(&mut self, name: impl Into<String>) -> TypeBuilder<'_> {
        TypeBuilder {
            builder: self,
            name: name.into(),
            parent_names: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Get the ID of an already declared type.
    pub fn get_type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Build the immutable Registry.
    ///
    /// Relation targets are not checked here; they resolve on first use.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let subtype_index = SubtypeIndex::build(&self.types);

        let mut fields = HashMap::new();
        for schema in self.types.values() {
            for (_, field) in schema.shared_fields() {
                fields.entry(field.id).or_insert_with(|| field.clone());
            }
        }

        debug!(
            "registry built: {} types, {} fields",
            self.types.len(),
            fields.len()
        );

        Ok(Registry::new(
            self.types,
            self.type_names,
            fields,
            subtype_index,
        ))
    }

    fn alloc_type_id(&mut self) -> TypeId {
        let id = TypeId::new(self.next_type_id);
        self.next_type_id += 1;
        id
    }

    fn alloc_field_id(&mut self) -> FieldId {
        let id = FieldId::new(self.next_field_id);
        self.next_field_id += 1;
        id
    }
}

/// Builder for one entity type.
pub struct TypeBuilder<'a> {
    builder: &'a mut RegistryBuilder,
    name: String,
    parent_names: Vec<String>,
    fields: Vec<FieldDef>,
}

impl<'a> TypeBuilder<'a> {
    /// Add a parent type by name. Parents must already be declared.
    pub fn extends(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_names.push(parent_name.into());
        self
    }

    /// Declare a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Assemble the schema and register the type.
    pub fn done(self) -> Result<TypeId, RegistryError> {
        if self.builder.type_names.contains_key(&self.name) {
            return Err(RegistryError::DuplicateTypeName(self.name));
        }

        let mut parent_ids = Vec::new();
        for parent_name in &self.parent_names {
            match self.builder.type_names.get(parent_name) {
                Some(&parent_id) => parent_ids.push(parent_id),
                None => return Err(RegistryError::UnknownParentType(parent_name.clone())),
            }
        }

        let mut ancestors = HashSet::new();
        let mut fields: IndexMap<String, Arc<Field>> = IndexMap::new();
        let mut key: Option<Arc<Field>> = None;

        // Inherited fields are shared, never rebound.
        for parent_id in &parent_ids {
            let Some(parent) = self.builder.types.get(parent_id) else {
                continue;
            };
            ancestors.insert(*parent_id);
            ancestors.extend(parent.ancestors.iter().copied());
            for (name, field) in parent.shared_fields() {
                fields.insert(name.clone(), field.clone());
            }
            if let Some(parent_key) = parent.shared_key() {
                match &key {
                    Some(existing) if existing.id != parent_key.id => {
                        return Err(RegistryError::multiple_key_fields(
                            &self.name,
                            existing.qualified_name(),
                            parent_key.qualified_name(),
                        ));
                    }
                    _ => key = Some(parent_key.clone()),
                }
            }
        }

        let mut declared = HashSet::new();
        let mut declared_key: Option<&str> = None;
        for def in &self.fields {
            if !declared.insert(def.name.as_str()) {
                return Err(RegistryError::DuplicateField {
                    type_name: self.name.clone(),
                    field: def.name.clone(),
                });
            }
            if def.is_key && !matches!(def.kind, crate::FieldKind::Scalar) {
                return Err(RegistryError::InvalidKeyField {
                    type_name: self.name.clone(),
                    field: def.name.clone(),
                });
            }
            if def.is_key {
                if let Some(first) = declared_key {
                    return Err(RegistryError::multiple_key_fields(
                        &self.name,
                        format!("{}.{}", self.name, first),
                        format!("{}.{}", self.name, def.name),
                    ));
                }
                // Redeclaring the inherited key as a key replaces it.
                if let Some(existing) = key.as_ref().filter(|k| k.name != def.name) {
                    return Err(RegistryError::multiple_key_fields(
                        &self.name,
                        existing.qualified_name(),
                        format!("{}.{}", self.name, def.name),
                    ));
                }
                declared_key = Some(def.name.as_str());
            }
        }

        let type_id = self.builder.alloc_type_id();
        for def in self.fields {
            let field_id = self.builder.alloc_field_id();
            let field = Arc::new(Field::bind(def, field_id, type_id, &self.name));
            if field.is_key {
                key = Some(field.clone());
            } else if key.as_ref().is_some_and(|k| k.name == field.name) {
                // A non-key override hides the inherited key field.
                key = None;
            }
            fields.insert(field.name.clone(), field);
        }

        let mut slots: HashMap<&str, &Field> = HashMap::new();
        for field in fields.values() {
            if let Some(other) = slots.insert(field.slot.as_str(), field.as_ref()) {
                return Err(RegistryError::SlotConflict {
                    type_name: self.name.clone(),
                    slot: field.slot.clone(),
                    first: other.qualified_name(),
                    second: field.qualified_name(),
                });
            }
        }

        debug!(
            "declared type {} ({}) with {} fields, key {:?}",
            self.name,
            type_id,
            fields.len(),
            key.as_ref().map(|k| k.name.as_str())
        );

        let schema = Schema::new(
            type_id,
            self.name.clone(),
            parent_ids,
            ancestors,
            fields,
            key,
        );
        self.builder.type_names.insert(self.name, type_id);
        self.builder.types.insert(type_id, schema);

        Ok(type_id)
    }
}
