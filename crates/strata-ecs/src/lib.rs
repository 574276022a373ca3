//! Strata - archetype-based ECS storage engine.
//!
//! Entities are grouped into *archetypes*: fixed sets of component types.
//! Each archetype stores every component in its own contiguous column and
//! tracks entity identity through a generational slot allocator, so handles
//! held past a removal stop validating instead of aliasing reused storage.
//!
//! # Key concepts
//!
//! - **Component**: a value type with a single-bit mask, declared via the
//!   [`Component`] trait
//! - **Archetype**: a fixed component set plus columnar storage for all
//!   entities that have exactly that set
//! - **Entity**: a generational handle to one row of one archetype
//! - **Query**: a bitmask intersection over all archetypes, visiting live
//!   slots in registration + slot order
//! - **Registry** ([`Ecs`]): owns the archetypes and drives cross-archetype
//!   dispatch, maintenance, and serialization
//!
//! # No hidden reallocation
//!
//! Creating an entity never reallocates columns. Callers either reserve
//! capacity explicitly (growable storage) or pick a fixed bound, and a full
//! archetype answers `create` with an empty handle. Cell addresses are
//! therefore stable for the duration of any query pass.
//!
//! # Example
//!
//! ```
//! use strata_ecs::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Position {
//!     x: f32,
//! }
//!
//! impl Component for Position {
//!     const NAME: &'static str = "Position";
//!     const MASK: u64 = 1 << 0;
//!
//!     fn default_value() -> Self {
//!         Self { x: 0.0 }
//!     }
//! }
//!
//! let mut ecs = Ecs::new("demo");
//! ecs.register(
//!     ArchetypeSpec::new("points", ArchetypeId::new(1))
//!         .bounded(16)
//!         .component::<Position>(),
//! )
//! .unwrap();
//!
//! let archetype = ecs.find_archetype_mut(Position::MASK).unwrap();
//! let entity = archetype.create_entity();
//! assert!(entity.fully_validate(&ecs));
//!
//! ecs.for_each::<(Position,), _>(|(position,)| {
//!     position.x += 1.0;
//! });
//! assert_eq!(ecs.component::<Position>(&entity), Some(&Position { x: 1.0 }));
//! ```

mod archetype;
mod component;
mod ecs;
mod entity;
mod error;
mod iter;
mod listener;
mod query;
mod serialize;
mod storage;
mod stream;
mod tracking;

pub use archetype::{archetype_flags, Archetype, ArchetypeId, ArchetypeSpec};
pub use component::{component_flags, Component, ComponentSpec};
pub use ecs::Ecs;
pub use entity::{Entity, EntityId, EntityState};
pub use error::{EcsError, EcsResult};
pub use iter::ComponentIterator;
pub use listener::{EcsListener, SerializationEvent, SerializationEventKind};
pub use query::Query;
pub use serialize::STREAM_VERSION;
pub use storage::{Column, StorageKind};
pub use stream::{MemoryStream, Stream, StreamExt};
pub use tracking::{Change, ChangeType};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        archetype_flags, component_flags, Archetype, ArchetypeId, ArchetypeSpec, Component,
        ComponentIterator, Ecs, EcsError, EcsListener, EcsResult, Entity, EntityId, MemoryStream,
        Stream, StreamExt,
    };
}
