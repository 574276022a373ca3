//! Registry lifecycle and serialization event listener.

use crate::archetype::{Archetype, ArchetypeId};

/// What a [`SerializationEvent`] announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializationEventKind {
    LoadStart,
    LoadFinished,
    SaveStart,
    SaveFinished,
    ArchetypeStart,
    ArchetypeFinished,
    SaveComponent,
    LoadComponent,
}

/// A progress event emitted while streaming registry state.
///
/// Fields that do not apply to a given kind are left at their zero values,
/// mirroring how the events are consumed: progress displays and validators
/// read only what the kind implies.
#[derive(Clone, Copy, Debug)]
pub struct SerializationEvent<'a> {
    pub kind: SerializationEventKind,
    pub archetype: ArchetypeId,
    /// Stream or component version, depending on the kind.
    pub version: u32,
    pub component_count: u32,
    pub component_mask: u64,
    /// Registry or component name, depending on the kind.
    pub name: Option<&'a str>,
}

impl<'a> SerializationEvent<'a> {
    pub(crate) fn new(kind: SerializationEventKind) -> Self {
        Self {
            kind,
            archetype: ArchetypeId::new(0),
            version: 0,
            component_count: 0,
            component_mask: 0,
            name: None,
        }
    }
}

/// Observer for registry lifecycle and serialization progress.
///
/// Events are delivered synchronously, in the order they occur. Listener
/// methods take `&self`; implementations that accumulate state use interior
/// mutability.
pub trait EcsListener: Send + Sync {
    /// A new archetype was registered.
    fn registered_archetype(&self, _archetype: &Archetype) {}

    /// Save/load progress.
    fn serialization_event(&self, _event: &SerializationEvent<'_>) {}
}
