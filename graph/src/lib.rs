//! IMO Graph Storage
//!
//! This crate holds entity instances and keeps their links consistent:
//! - Entity arena: create, read, write, update and remove entities
//! - Reference sync: setting one side of a relation updates the other
//! - Keyed collections: children keyed by a field, re-keyed when it changes
//! - Type index: find entities by type, including subtypes

mod collection;
mod error;
mod graph;
mod index;
mod sync;
mod undo;


pub use collection::{Collection, CollectionMut};
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
