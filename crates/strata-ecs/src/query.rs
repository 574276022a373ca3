//! Mask-based component queries.
//!
//! A query is a tuple of component types, e.g. `(Position,)` or
//! `(Position, Velocity)`. Dispatch is a bitmask intersection: an archetype
//! matches when its combined mask contains every requested component's bit.
//! Iteration visits archetypes in registration order and live slots in
//! ascending slot order, checking the tombstone flag before yielding.
//!
//! Query receivers are `&mut`, so structural changes (create/remove) cannot
//! happen mid-pass; the column pointers a pass walks are stable for its
//! whole duration.

use crate::archetype::Archetype;
use crate::component::Component;
use crate::ecs::Ecs;
use crate::entity::{Entity, EntityId, EntityState};

/// A set of component types fetched together.
///
/// Implemented for tuples of [`Component`] types up to arity 8. The same
/// component may not appear twice in one query.
///
/// # Safety
///
/// Implementations must return cursors and slices that address distinct
/// columns, so the mutable references handed out never alias. The provided
/// tuple impls guarantee this by rejecting duplicate masks.
pub unsafe trait Query {
    /// Raw column base pointers within one archetype.
    type Cursor: Copy;

    /// Mutable references to one slot's cells.
    type Item<'a>;

    /// Whole-column mutable slices.
    type Slices<'a>;

    /// Combined mask of all requested components.
    fn mask() -> u64;

    /// Resolve column base pointers, or `None` if a component is missing.
    fn cursor(archetype: &mut Archetype) -> Option<Self::Cursor>;

    /// Dereference one slot.
    ///
    /// # Safety
    /// `index` must be below the archetype's slot count, the cursor must
    /// come from the same archetype, and the caller must hold the archetype
    /// mutably for `'a`.
    unsafe fn item<'a>(cursor: Self::Cursor, index: usize) -> Self::Item<'a>;

    /// Borrow all requested columns as slices.
    fn slices(archetype: &mut Archetype) -> Option<Self::Slices<'_>>;
}

macro_rules! impl_query_tuple {
    ($count:literal; $($ty:ident => $idx:tt),+) => {
        // SAFETY: the duplicate-mask assert in cursor() guarantees the
        // addressed columns are pairwise distinct
        unsafe impl<$($ty: Component),+> Query for ($($ty,)+) {
            type Cursor = ($(*mut $ty,)+);
            type Item<'a> = ($(&'a mut $ty,)+);
            type Slices<'a> = ($(&'a mut [$ty],)+);

            fn mask() -> u64 {
                $($ty::MASK)|+
            }

            fn cursor(archetype: &mut Archetype) -> Option<Self::Cursor> {
                assert_eq!(
                    Self::mask().count_ones() as usize,
                    $count,
                    "query lists the same component more than once"
                );
                Some(($(archetype.column_ptr::<$ty>()?,)+))
            }

            unsafe fn item<'a>(cursor: Self::Cursor, index: usize) -> Self::Item<'a> {
                // SAFETY: caller keeps index in range and the borrow exclusive
                unsafe { ($(&mut *cursor.$idx.add(index),)+) }
            }

            fn slices(archetype: &mut Archetype) -> Option<Self::Slices<'_>> {
                let len = archetype.slot_count();
                let cursor = Self::cursor(archetype)?;
                // SAFETY: cursors address len initialized cells per column,
                // and the columns are pairwise distinct
                Some(($(unsafe { core::slice::from_raw_parts_mut(cursor.$idx, len) },)+))
            }
        }
    };
}

impl_query_tuple!(1; A => 0);
impl_query_tuple!(2; A => 0, B => 1);
impl_query_tuple!(3; A => 0, B => 1, C => 2);
impl_query_tuple!(4; A => 0, B => 1, C => 2, D => 3);
impl_query_tuple!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_query_tuple!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_query_tuple!(7; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_query_tuple!(8; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);

// ============================================================================
// Per-archetype iteration
// ============================================================================

impl Archetype {
    /// Visit every live slot, passing mutable component references.
    ///
    /// The callback type is inferred; call as `for_each::<(A, B), _>(...)`.
    ///
    /// # Panics
    /// Panics if the query requests components this archetype lacks.
    pub fn for_each<Q, F>(&mut self, mut each: F)
    where
        Q: Query,
        F: FnMut(Q::Item<'_>),
    {
        self.assert_query_subset(Q::mask());
        let Some(cursor) = Q::cursor(self) else {
            return;
        };
        for index in 0..self.slot_count() {
            if self.state[index].is_tombstone() {
                continue;
            }
            // SAFETY: index is a live slot, and &mut self is held for the pass
            each(unsafe { Q::item(cursor, index) });
        }
    }

    /// Visit every live slot, passing the entity handle first. Handles from
    /// archetypes that forbid entities are non-copyable.
    pub fn for_each_with_entity<Q, F>(&mut self, mut each: F)
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'_>),
    {
        self.assert_query_subset(Q::mask());
        let Some(cursor) = Q::cursor(self) else {
            return;
        };
        let copyable = self.allows_entities();
        let archetype_id = self.id();
        for index in 0..self.slot_count() {
            let state = self.state[index];
            if state.is_tombstone() {
                continue;
            }
            let entity = Entity::handle(
                archetype_id,
                EntityId::from_parts(index as u32, state.version()),
                copyable,
            );
            // SAFETY: index is a live slot, and &mut self is held for the pass
            each(entity, unsafe { Q::item(cursor, index) });
        }
    }

    /// Borrow the state table and all requested columns at once, the raw
    /// bulk hook for systems that drive their own loop.
    pub fn bulk<'a, Q: Query>(&'a mut self) -> Option<(&'a [EntityState], Q::Slices<'a>)> {
        let state_ptr = self.state.as_ptr();
        let len = self.state.len();
        let slices = Q::slices(self)?;
        // SAFETY: the state table and the component columns are disjoint
        // allocations, so the shared and mutable borrows cannot overlap
        let state = unsafe { core::slice::from_raw_parts(state_ptr, len) };
        Some((state, slices))
    }

    fn assert_query_subset(&self, query_mask: u64) {
        assert!(
            self.mask() & query_mask == query_mask,
            "query requests components absent from archetype `{}`",
            self.name()
        );
    }
}

// ============================================================================
// Cross-archetype dispatch
// ============================================================================

impl Ecs {
    /// Visit every live slot of every archetype containing the queried
    /// components. Archetypes are visited in registration order, slots in
    /// ascending order.
    ///
    /// The callback type is inferred; call as `for_each::<(A, B), _>(...)`.
    pub fn for_each<Q, F>(&mut self, mut each: F)
    where
        Q: Query,
        F: FnMut(Q::Item<'_>),
    {
        let mask = Q::mask();
        for archetype in self.archetypes_mut() {
            if archetype.mask() & mask == mask {
                archetype.for_each::<Q, _>(&mut each);
            }
        }
    }

    /// As [`Self::for_each`], passing the entity handle first.
    pub fn for_each_with_entity<Q, F>(&mut self, mut each: F)
    where
        Q: Query,
        F: FnMut(Entity, Q::Item<'_>),
    {
        let mask = Q::mask();
        for archetype in self.archetypes_mut() {
            if archetype.mask() & mask == mask {
                archetype.for_each_with_entity::<Q, _>(&mut each);
            }
        }
    }

    /// Hand each matching archetype's slot count, state table, and column
    /// slices to the callback. Archetypes with no slots are skipped.
    pub fn iterators<Q, F>(&mut self, mut each: F)
    where
        Q: Query,
        F: FnMut(u32, &[EntityState], Q::Slices<'_>),
    {
        let mask = Q::mask();
        for archetype in self.archetypes_mut() {
            if archetype.mask() & mask != mask {
                continue;
            }
            let Some((state, slices)) = archetype.bulk::<Q>() else {
                continue;
            };
            if state.is_empty() {
                continue;
            }
            each(state.len() as u32, state, slices);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{ArchetypeId, ArchetypeSpec};

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
    }

    impl Component for Position {
        const NAME: &'static str = "Position";
        const MASK: u64 = 1 << 0;

        fn default_value() -> Self {
            Self { x: 0.0 }
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Velocity {
        x: f32,
    }

    impl Component for Velocity {
        const NAME: &'static str = "Velocity";
        const MASK: u64 = 1 << 1;

        fn default_value() -> Self {
            Self { x: 1.0 }
        }
    }

    fn archetype() -> Archetype {
        let mut archetype = Archetype::new(
            ArchetypeSpec::new("test", ArchetypeId::new(1))
                .bounded(4)
                .component::<Position>()
                .component::<Velocity>(),
        )
        .unwrap();
        for _ in 0..4 {
            archetype.create(None).unwrap();
        }
        archetype
    }

    #[test]
    fn test_for_each_visits_live_slots_in_order() {
        let mut archetype = archetype();
        let ids: Vec<EntityId> = {
            let mut ids = Vec::new();
            archetype.for_each_entity(|entity| ids.push(entity.id()));
            ids
        };
        archetype.remove(ids[2]);

        let mut indices = Vec::new();
        archetype.for_each_with_entity::<(Position, Velocity), _>(|entity, (position, velocity)| {
            position.x += velocity.x;
            indices.push(entity.id().index());
        });
        assert_eq!(indices, vec![0, 1, 3]);

        let cells = archetype
            .column_by_mask(Position::MASK)
            .unwrap()
            .typed_slice::<Position>();
        assert_eq!(cells[0], Position { x: 1.0 });
        // the removed slot was re-seated and never visited
        assert_eq!(cells[2], Position { x: 0.0 });
    }

    #[test]
    fn test_bulk_exposes_state_and_columns() {
        let mut archetype = archetype();
        let (state, (positions, velocities)) =
            archetype.bulk::<(Position, Velocity)>().unwrap();
        assert_eq!(state.len(), 4);
        assert_eq!(positions.len(), 4);
        assert_eq!(velocities.len(), 4);
        positions[3].x = 9.0;
        assert_eq!(velocities[0], Velocity { x: 1.0 });
    }

    #[test]
    #[should_panic(expected = "absent from archetype")]
    fn test_for_each_rejects_missing_component() {
        #[derive(Clone)]
        struct Absent;
        impl Component for Absent {
            const NAME: &'static str = "Absent";
            const MASK: u64 = 1 << 5;
            fn default_value() -> Self {
                Self
            }
        }

        archetype().for_each::<(Absent,), _>(|_| {});
    }
}
