//! Precomputed component iteration.
//!
//! [`ComponentIterator`] resolves the set of matching archetypes once, at
//! initialization, and every subsequent pass walks that stored list without
//! re-filtering masks. Worth it only for iterators that are permanently
//! stored; initialize after all archetypes are registered.

use core::marker::PhantomData;

use crate::ecs::Ecs;
use crate::entity::Entity;
use crate::query::Query;
use crate::archetype::ArchetypeId;

/// A query with its matching archetypes resolved up front.
///
/// `MAX` bounds the fanout and should be set as low as possible, preferably
/// to the exact number of matching archetypes.
pub struct ComponentIterator<Q: Query, const MAX: usize> {
    archetypes: [Option<ArchetypeId>; MAX],
    _query: PhantomData<fn() -> Q>,
}

impl<Q: Query, const MAX: usize> ComponentIterator<Q, MAX> {
    /// An uninitialized iterator matching nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            archetypes: [None; MAX],
            _query: PhantomData,
        }
    }

    /// Scan the registry and record every matching archetype.
    ///
    /// # Panics
    /// Panics if more than `MAX` archetypes match; the fanout bound is a
    /// configuration error, not a runtime condition.
    pub fn initialize(&mut self, ecs: &Ecs) {
        let mask = Q::mask();
        self.archetypes = [None; MAX];
        let mut count = 0;
        for archetype in ecs.archetypes() {
            if archetype.mask() & mask == mask {
                assert!(
                    count < MAX,
                    "component iterator matched more archetypes than its fanout bound {MAX}"
                );
                self.archetypes[count] = Some(archetype.id());
                count += 1;
            }
        }
    }

    /// Number of archetypes recorded at initialization.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.iter().take_while(|a| a.is_some()).count()
    }

    /// Visit every live slot of the recorded archetypes.
    pub fn iterate(&self, ecs: &mut Ecs, mut each: impl FnMut(Q::Item<'_>)) {
        for slot in &self.archetypes {
            let Some(id) = *slot else {
                return;
            };
            if let Some(archetype) = ecs.archetype_by_id_mut(id) {
                archetype.for_each::<Q, _>(&mut each);
            }
        }
    }

    /// Visit every live slot of the recorded archetypes, passing the entity
    /// handle first.
    pub fn iterate_entity(&self, ecs: &mut Ecs, mut each: impl FnMut(Entity, Q::Item<'_>)) {
        for slot in &self.archetypes {
            let Some(id) = *slot else {
                return;
            };
            if let Some(archetype) = ecs.archetype_by_id_mut(id) {
                archetype.for_each_with_entity::<Q, _>(&mut each);
            }
        }
    }
}

impl<Q: Query, const MAX: usize> Default for ComponentIterator<Q, MAX> {
    fn default() -> Self {
        Self::new()
    }
}
