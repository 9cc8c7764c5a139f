//! IMO Core Types
//!
//! This crate provides the foundational types used throughout IMO:
//! - Identity types (EntityId, TypeId, FieldId)
//! - Value types (the Value enum and the hashable Key derived from it)
//! - Keyed maps backing collection fields (KeyedMap, MapKind)
//! - Entity storage (Entity)

mod entity;
mod id;
mod keyed;
mod value;

pub use entity::*;
pub use id::*;
pub use keyed::*;
pub use value::*;
