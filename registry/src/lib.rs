//! IMO Registry
//!
//! Declaration and lookup of entity types. Each type's schema is assembled once
//! by [`RegistryBuilder`]; the resulting [`Registry`] is immutable and resolves
//! relation targets (types, reverse fields, collection keys) lazily by name.

mod builder;
mod registry;
mod types;

pub use builder::{RegistryBuilder, RegistryError, TypeBuilder};
pub use registry::{ConfigError, Registry};
pub use types::*;
