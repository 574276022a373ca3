//! The registry: owns archetypes, dispatches cross-archetype operations.
//!
//! All mutable engine state lives in an [`Ecs`] instance; there are no
//! globals. Archetypes are keyed twice: by their combined component mask
//! (unique, looked up with an ordered scan) and by their numeric 8-bit id
//! (unique, looked up through a fixed table).

use core::fmt;
use std::sync::Arc;

use crate::archetype::{Archetype, ArchetypeId, ArchetypeSpec};
use crate::component::Component;
use crate::entity::Entity;
use crate::error::{EcsError, EcsResult};
use crate::listener::EcsListener;

/// Registry of archetypes, the ownership domain for all entity storage.
pub struct Ecs {
    name: String,
    /// Registration order; queries visit archetypes in this order.
    archetypes: Vec<Archetype>,
    /// Archetype id to position in `archetypes`.
    by_id: [Option<usize>; 256],
    listener: Option<Arc<dyn EcsListener>>,
}

impl Ecs {
    /// An empty registry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archetypes: Vec::new(),
            by_id: [None; 256],
            listener: None,
        }
    }

    /// The registry's name; carried through serialization events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the registry.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Attach a listener, propagating it to every registered archetype.
    pub fn set_listener(&mut self, listener: Option<Arc<dyn EcsListener>>) {
        for archetype in &mut self.archetypes {
            archetype.set_listener(listener.clone());
        }
        self.listener = listener;
    }

    pub(crate) fn listener(&self) -> Option<&Arc<dyn EcsListener>> {
        self.listener.as_ref()
    }

    // ==================== Registration and lookup ====================

    /// Register an archetype described by `spec`.
    ///
    /// The component set's combined mask and the numeric id must both be
    /// unused; the component metadata is validated here. Returns a mutable
    /// reference to the freshly registered archetype.
    pub fn register(&mut self, spec: ArchetypeSpec) -> EcsResult<&mut Archetype> {
        let mask = spec.mask();
        if self.find_archetype(mask).is_some() {
            return Err(EcsError::DuplicateArchetype);
        }

        let mut archetype = Archetype::new(spec)?;
        let id = archetype.id();
        if self.by_id[id.as_raw() as usize].is_some() {
            return Err(EcsError::DoubleId(id));
        }

        archetype.set_listener(self.listener.clone());
        let position = self.archetypes.len();
        self.archetypes.push(archetype);
        self.by_id[id.as_raw() as usize] = Some(position);

        if let Some(listener) = &self.listener {
            listener.registered_archetype(&self.archetypes[position]);
        }
        Ok(&mut self.archetypes[position])
    }

    /// Look up an archetype by its combined component mask. An ordered scan
    /// over all registered archetypes.
    #[must_use]
    pub fn find_archetype(&self, mask: u64) -> Option<&Archetype> {
        self.archetypes.iter().find(|a| a.mask() == mask)
    }

    /// Mutable lookup by combined component mask.
    #[must_use]
    pub fn find_archetype_mut(&mut self, mask: u64) -> Option<&mut Archetype> {
        self.archetypes.iter_mut().find(|a| a.mask() == mask)
    }

    /// Lookup by mask that treats absence as an error.
    pub fn require_archetype(&mut self, mask: u64) -> EcsResult<&mut Archetype> {
        self.find_archetype_mut(mask)
            .ok_or(EcsError::UnregisteredArchetype(mask))
    }

    /// Constant-time lookup by numeric id.
    #[must_use]
    pub fn archetype_by_id(&self, id: ArchetypeId) -> Option<&Archetype> {
        let position = self.by_id[id.as_raw() as usize]?;
        self.archetypes.get(position)
    }

    /// Constant-time mutable lookup by numeric id.
    #[must_use]
    pub fn archetype_by_id_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        let position = self.by_id[id.as_raw() as usize]?;
        self.archetypes.get_mut(position)
    }

    /// All archetypes in registration order.
    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// All archetypes in registration order, mutably.
    pub fn archetypes_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }

    /// Number of registered archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // ==================== Entity access ====================

    /// Resolve a component of the entity a handle points at.
    #[must_use]
    pub fn component<C: Component>(&self, entity: &Entity) -> Option<&C> {
        let archetype = self.archetype_by_id(entity.archetype_id()?)?;
        archetype.cell::<C>(entity.id())
    }

    /// Mutably resolve a component of the entity a handle points at.
    #[must_use]
    pub fn component_mut<C: Component>(&mut self, entity: &Entity) -> Option<&mut C> {
        let archetype = self.archetype_by_id_mut(entity.archetype_id()?)?;
        archetype.cell_mut::<C>(entity.id())
    }

    /// Remove the entity a handle points at and clear the handle. Stale or
    /// empty handles are ignored.
    pub fn remove_entity(&mut self, entity: &mut Entity) {
        let Some(archetype_id) = entity.archetype_id() else {
            return;
        };
        if let Some(archetype) = self.archetype_by_id_mut(archetype_id) {
            archetype.remove(entity.id());
        }
        entity.clear();
    }

    /// Total live entities over all archetypes. Scans every archetype;
    /// not meant for hot paths.
    #[must_use]
    pub fn count_entities(&self) -> u64 {
        self.archetypes.iter().map(|a| a.len() as u64).sum()
    }

    // ==================== Maintenance and reset ====================

    /// Run every archetype's flag-gated maintenance policies. Never fails;
    /// call as often as desired.
    pub fn perform_maintenance(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.perform_maintenance();
        }
    }

    /// Drop all archetypes and their entities. Every outstanding handle
    /// becomes invalid.
    pub fn reset(&mut self) {
        self.archetypes.clear();
        self.by_id = [None; 256];
    }
}

impl fmt::Debug for Ecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ecs")
            .field("name", &self.name)
            .field("archetypes", &self.archetypes.len())
            .field("entities", &self.count_entities())
            .finish()
    }
}
