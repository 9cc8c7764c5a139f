//! The Registry - immutable schema lookup and lazy relation resolution.

use crate::{Field, Schema, SubtypeIndex};
use imo_core::{FieldId, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when a relation cannot be resolved at use time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Field {field} targets unknown type {target}")]
    UnknownTargetType { field: String, target: String },

    #[error("Field {field} names reverse field {reverse} missing on type {target}")]
    UnknownReverseField {
        field: String,
        target: String,
        reverse: String,
    },

    #[error("Collection {field} is keyed by {key}, missing on type {target}")]
    UnknownKeyField {
        field: String,
        target: String,
        key: String,
    },

    #[error("Key field not defined: collection {field} cannot key entities of type {target}")]
    NoKeyField { field: String, target: String },

    #[error("Collection {field} cannot have collection {reverse} as its reverse")]
    UnsupportedReverse { field: String, reverse: String },

    #[error("Field {field} is not a reference or collection")]
    NotRelational { field: String },
}

/// The Registry provides runtime lookup of schemas.
/// It is immutable after construction, apart from memoized relation lookups.
#[derive(Debug, Default)]
pub struct Registry {
    /// Schemas by type ID.
    types: HashMap<TypeId, Schema>,
    /// Type ID lookup by name.
    type_names: HashMap<String, TypeId>,
    /// Every bound field by ID.
    fields: HashMap<FieldId, Arc<Field>>,
    /// Precomputed subtype relationships.
    subtype_index: SubtypeIndex,
}

impl Registry {
    pub(crate) fn new(
        types: HashMap<TypeId, Schema>,
        type_names: HashMap<String, TypeId>,
        fields: HashMap<FieldId, Arc<Field>>,
        subtype_index: SubtypeIndex,
    ) -> Self {
        Self {
            types,
            type_names,
            fields,
            subtype_index,
        }
    }

    // ==================== Type Lookups ====================

    /// Get a schema by type name.
    pub fn get_type_by_name(&self, name: &str) -> Option<&Schema> {
        self.type_names.get(name).and_then(|id| self.types.get(id))
    }

    /// Get a schema by type ID.
    pub fn get_type(&self, id: TypeId) -> Option<&Schema> {
        self.types.get(&id)
    }

    /// Get a type ID by name.
    pub fn get_type_id(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Get all schemas.
    pub fn all_types(&self) -> impl Iterator<Item = &Schema> {
        self.types.values()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Name of a type, or `"unknown"`.
    pub fn type_name(&self, id: TypeId) -> &str {
        self.types.get(&id).map(|s| s.name.as_str()).unwrap_or("unknown")
    }

    /// Get a bound field by ID.
    pub fn get_field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id).map(|f| f.as_ref())
    }

    // ==================== Subtype Queries ====================

    /// Check if `sub` is a subtype of `super_type`.
    pub fn is_subtype(&self, sub: TypeId, super_type: TypeId) -> bool {
        self.subtype_index.is_subtype(sub, super_type)
    }

    /// Get all subtypes of a type (not including the type itself).
    pub fn get_subtypes(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtype_index.get_subtypes(type_id)
    }

    /// Get all supertypes of a type (not including the type itself).
    pub fn get_supertypes(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtype_index.get_supertypes(type_id)
    }

    // ==================== Relation Resolution ====================

    /// Resolve the target type of a reference or collection.
    pub fn target_type(&self, field: &Field) -> Result<TypeId, ConfigError> {
        let relation = field.relation().ok_or_else(|| ConfigError::NotRelational {
            field: field.qualified_name(),
        })?;
        field
            .target
            .get_or_try_init(|| {
                self.get_type_id(&relation.target)
                    .ok_or_else(|| ConfigError::UnknownTargetType {
                        field: field.qualified_name(),
                        target: relation.target.clone(),
                    })
            })
            .copied()
    }

    /// Resolve the reciprocal field, if the relation names one.
    pub fn reverse_field(&self, field: &Field) -> Result<Option<&Field>, ConfigError> {
        let target = self.target_type(field)?;
        let reverse = field.reverse.get_or_try_init(|| {
            let Some(name) = field.relation().and_then(|r| r.reverse.as_ref()) else {
                return Ok(None);
            };
            let reverse = self
                .types
                .get(&target)
                .and_then(|schema| schema.field(name))
                .ok_or_else(|| ConfigError::UnknownReverseField {
                    field: field.qualified_name(),
                    target: self.type_name(target).to_string(),
                    reverse: name.clone(),
                })?;
            if field.is_collection() && reverse.is_collection() {
                return Err(ConfigError::UnsupportedReverse {
                    field: field.qualified_name(),
                    reverse: reverse.qualified_name(),
                });
            }
            Ok(Some(reverse.id))
        })?;
        Ok(reverse.and_then(|id| self.get_field(id)))
    }

    /// Resolve the field keying a collection: the explicit `keyed_by` field,
    /// else the target type's key field. `Ok(None)` if neither exists.
    pub fn collection_key_field(&self, field: &Field) -> Result<Option<&Field>, ConfigError> {
        if !field.is_collection() {
            return Err(ConfigError::NotRelational {
                field: field.qualified_name(),
            });
        }
        let target = self.target_type(field)?;
        let key = field.key.get_or_try_init(|| {
            let schema = self.types.get(&target);
            match field.relation().and_then(|r| r.key.as_ref()) {
                Some(name) => schema
                    .and_then(|s| s.field(name))
                    .map(|f| Some(f.id))
                    .ok_or_else(|| ConfigError::UnknownKeyField {
                        field: field.qualified_name(),
                        target: self.type_name(target).to_string(),
                        key: name.clone(),
                    }),
                None => Ok(schema.and_then(|s| s.key_field()).map(|f| f.id)),
            }
        })?;
        Ok(key.and_then(|id| self.get_field(id)))
    }

    /// Like [`Registry::collection_key_field`], but a missing key field is an error.
    pub fn collection_key(&self, field: &Field) -> Result<&Field, ConfigError> {
        self.collection_key_field(field)?
            .ok_or_else(|| ConfigError::NoKeyField {
                field: field.qualified_name(),
                target: field
                    .relation()
                    .map(|r| r.target.clone())
                    .unwrap_or_default(),
            })
    }
}
