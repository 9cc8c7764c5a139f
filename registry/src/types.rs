//! Schema definition types.

use imo_core::{FieldId, MapKind, TypeId, Value};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default of a field, materialized per entity at construction.
#[derive(Clone, Default)]
pub enum DefaultValue {
    /// Unset fields read as null.
    #[default]
    None,
    /// A fixed value, cloned into every entity.
    Value(Value),
    /// A zero-argument factory, invoked once per entity.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produce the default value. Factories are invoked on every call.
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::None => Value::Null,
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => write!(f, "None"),
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// Link from a reference or collection field to its target type.
///
/// Names are resolved lazily against the registry, so a relation may name a
/// type that is declared later.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Name of the target entity type.
    pub target: String,
    /// Name of the reciprocal field on the target type.
    pub reverse: Option<String>,
    /// Name of the target field keying a collection (collections only).
    pub key: Option<String>,
    /// Backing map of a collection (collections only).
    pub map_kind: MapKind,
}

impl Relation {
    fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reverse: None,
            key: None,
            map_kind: MapKind::default(),
        }
    }
}

/// What a field stores.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Plain value.
    Scalar,
    /// Single-valued link to another entity.
    Reference(Relation),
    /// Keyed multi-valued reciprocal of a reference.
    Collection(Relation),
}

/// Field declaration, before it is bound to a schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// What the field stores.
    pub kind: FieldKind,
    /// Whether this field is the type's unique key.
    pub is_key: bool,
    /// Default if the field is not supplied at construction.
    pub default: DefaultValue,
    /// Whether bulk update copies this field.
    pub updatable: bool,
    /// Whether changing the value re-keys collections indexing this field.
    pub sync_reverse: bool,
    /// Storage slot override; defaults to the field name.
    pub slot: Option<String>,
}

impl FieldDef {
    fn new(name: impl Into<String>, kind: FieldKind, updatable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            is_key: false,
            default: DefaultValue::None,
            updatable,
            sync_reverse: true,
            slot: None,
        }
    }

    /// Declare a scalar field. Scalars are updatable by default.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar, true)
    }

    /// Declare a reference to an entity of type `target`.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reference(Relation::new(target)), false)
    }

    /// Declare a keyed collection of entities of type `target`.
    pub fn collection(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Collection(Relation::new(target)), false)
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Value(value.into());
        self
    }

    pub fn with_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = DefaultValue::Factory(Arc::new(factory));
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn sync_reverse(mut self, sync: bool) -> Self {
        self.sync_reverse = sync;
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Name the reciprocal field on the target type. Ignored on scalars.
    pub fn reverse(mut self, name: impl Into<String>) -> Self {
        if let Some(relation) = self.relation_mut() {
            relation.reverse = Some(name.into());
        }
        self
    }

    /// Key a collection by the named field of the target type instead of the
    /// target's key field. Ignored unless this is a collection.
    pub fn keyed_by(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::Collection(relation) = &mut self.kind {
            relation.key = Some(name.into());
        }
        self
    }

    /// Choose the backing map of a collection. Ignored unless this is a collection.
    pub fn map_kind(mut self, kind: MapKind) -> Self {
        if let FieldKind::Collection(relation) = &mut self.kind {
            relation.map_kind = kind;
        }
        self
    }

    fn relation_mut(&mut self) -> Option<&mut Relation> {
        match &mut self.kind {
            FieldKind::Scalar => None,
            FieldKind::Reference(relation) | FieldKind::Collection(relation) => Some(relation),
        }
    }
}

/// A field bound to the schema that declared it.
///
/// Subtypes share the bound field of their parent; the lazily resolved
/// relation targets are cached here on first use.
#[derive(Debug)]
pub struct Field {
    /// Identifier assigned at binding.
    pub id: FieldId,
    /// Field name.
    pub name: String,
    /// Type that declared the field.
    pub declared_in: TypeId,
    /// Name of the declaring type, for diagnostics.
    pub declared_by: String,
    /// Storage slot in each entity.
    pub slot: String,
    pub kind: FieldKind,
    pub is_key: bool,
    pub default: DefaultValue,
    pub updatable: bool,
    pub sync_reverse: bool,
    pub(crate) target: OnceCell<TypeId>,
    pub(crate) reverse: OnceCell<Option<FieldId>>,
    pub(crate) key: OnceCell<Option<FieldId>>,
}

impl Field {
    pub(crate) fn bind(def: FieldDef, id: FieldId, declared_in: TypeId, declared_by: &str) -> Self {
        Self {
            id,
            slot: def.slot.unwrap_or_else(|| def.name.clone()),
            name: def.name,
            declared_in,
            declared_by: declared_by.to_string(),
            kind: def.kind,
            is_key: def.is_key,
            default: def.default,
            updatable: def.updatable,
            sync_reverse: def.sync_reverse,
            target: OnceCell::new(),
            reverse: OnceCell::new(),
            key: OnceCell::new(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference(_))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, FieldKind::Collection(_))
    }

    /// The relation of a reference or collection field.
    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Scalar => None,
            FieldKind::Reference(relation) | FieldKind::Collection(relation) => Some(relation),
        }
    }

    /// Backing map kind; `Unordered` for anything but collections.
    pub fn map_kind(&self) -> MapKind {
        match &self.kind {
            FieldKind::Collection(relation) => relation.map_kind,
            _ => MapKind::default(),
        }
    }

    /// `Type.field`, for diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declared_by, self.name)
    }
}

/// Assembled schema of one entity type: own and inherited fields.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Unique identifier.
    pub id: TypeId,
    /// Type name.
    pub name: String,
    /// Direct parent type IDs.
    pub parent_ids: Vec<TypeId>,
    /// All ancestors, transitively.
    pub(crate) ancestors: HashSet<TypeId>,
    fields: IndexMap<String, Arc<Field>>,
    key: Option<Arc<Field>>,
}

impl Schema {
    pub(crate) fn new(
        id: TypeId,
        name: String,
        parent_ids: Vec<TypeId>,
        ancestors: HashSet<TypeId>,
        fields: IndexMap<String, Arc<Field>>,
        key: Option<Arc<Field>>,
    ) -> Self {
        Self {
            id,
            name,
            parent_ids,
            ancestors,
            fields,
            key,
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name).map(|f| f.as_ref())
    }

    /// Check if this type has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether this schema carries the bound field `id` (own or inherited).
    pub fn carries(&self, id: FieldId) -> bool {
        self.fields.values().any(|f| f.id == id)
    }

    /// All fields, inherited ones first, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().map(|f| f.as_ref())
    }

    /// Get all field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// The designated key field, own or inherited.
    pub fn key_field(&self) -> Option<&Field> {
        self.key.as_deref()
    }

    pub(crate) fn shared_fields(&self) -> impl Iterator<Item = (&String, &Arc<Field>)> {
        self.fields.iter()
    }

    pub(crate) fn shared_key(&self) -> Option<&Arc<Field>> {
        self.key.as_ref()
    }
}

/// Precomputed subtype relationships.
#[derive(Debug, Default)]
pub struct SubtypeIndex {
    /// For each type, the set of all its subtypes (transitive).
    subtypes: HashMap<TypeId, HashSet<TypeId>>,
    /// For each type, the set of all its supertypes (transitive).
    supertypes: HashMap<TypeId, HashSet<TypeId>>,
}

impl SubtypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from assembled schemas.
    ///
    /// Schemas already carry their transitive ancestors (parents are declared
    /// first), so a single pass inverts them into subtype sets.
    pub fn build(schemas: &HashMap<TypeId, Schema>) -> Self {
        let mut index = Self::new();

        for &type_id in schemas.keys() {
            index.subtypes.entry(type_id).or_default();
        }
        for (&type_id, schema) in schemas {
            index.supertypes.insert(type_id, schema.ancestors.clone());
            for &ancestor in &schema.ancestors {
                index.subtypes.entry(ancestor).or_default().insert(type_id);
            }
        }

        index
    }

    /// Check if `sub` is a subtype of `super_type` (or the same type).
    pub fn is_subtype(&self, sub: TypeId, super_type: TypeId) -> bool {
        if sub == super_type {
            return true;
        }
        self.supertypes
            .get(&sub)
            .map(|set| set.contains(&super_type))
            .unwrap_or(false)
    }

    /// Get all subtypes of a type (not including the type itself).
    pub fn get_subtypes(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.subtypes
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Get all supertypes of a type (not including the type itself).
    pub fn get_supertypes(&self, type_id: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.supertypes
            .get(&type_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}
