//! Cross-archetype query dispatch and precomputed iteration.

mod common;

use common::{Position, Timer};
use strata_ecs::prelude::*;

fn register_world(ecs: &mut Ecs) {
    ecs.register(
        ArchetypeSpec::new("points", ArchetypeId::new(1))
            .bounded(8)
            .component::<Position>(),
    )
    .unwrap();
    ecs.register(
        ArchetypeSpec::new("timed", ArchetypeId::new(2))
            .bounded(8)
            .component::<Position>()
            .component::<Timer>(),
    )
    .unwrap();
}

fn populate(ecs: &mut Ecs) {
    for _ in 0..3 {
        ecs.archetype_by_id_mut(ArchetypeId::new(1))
            .unwrap()
            .create_entity();
    }
    for _ in 0..2 {
        ecs.archetype_by_id_mut(ArchetypeId::new(2))
            .unwrap()
            .create_entity();
    }
}

#[test]
fn queries_visit_matching_archetypes_in_registration_order() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);
    populate(&mut ecs);

    let mut visited = Vec::new();
    ecs.for_each_with_entity::<(Position,), _>(|entity, (_position,)| {
        visited.push((entity.archetype_id().unwrap().as_raw(), entity.id().index()));
    });
    assert_eq!(
        visited,
        vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)]
    );

    // the narrower query only reaches the timed archetype
    let mut timed = 0;
    ecs.for_each::<(Position, Timer), _>(|(_position, _timer)| timed += 1);
    assert_eq!(timed, 2);
}

#[test]
fn query_mutations_are_observed_by_later_passes() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);
    populate(&mut ecs);

    ecs.for_each::<(Position,), _>(|(position,)| {
        position.position += 2.0;
    });

    let mut total = 0.0;
    ecs.for_each::<(Position,), _>(|(position,)| total += position.position);
    assert_eq!(total, 10.0);
}

#[test]
fn tombstoned_slots_are_skipped_mid_table() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);
    populate(&mut ecs);

    let mut handles = Vec::new();
    ecs.archetype_by_id(ArchetypeId::new(1))
        .unwrap()
        .for_each_entity(|entity| handles.push(entity));
    let mut middle = handles.swap_remove(1);
    ecs.remove_entity(&mut middle);

    let mut count = 0;
    ecs.for_each::<(Position,), _>(|_| count += 1);
    assert_eq!(count, 4);
}

#[test]
fn iterators_hand_out_whole_columns() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);
    populate(&mut ecs);

    let mut seen_archetypes = 0;
    let mut seen_slots = 0;
    ecs.iterators::<(Position,), _>(|count, state, (positions,)| {
        seen_archetypes += 1;
        assert_eq!(count as usize, state.len());
        assert_eq!(positions.len(), state.len());
        for (slot_state, position) in state.iter().zip(positions.iter_mut()) {
            if slot_state.is_live() {
                position.speed = 1.0;
                seen_slots += 1;
            }
        }
    });
    assert_eq!(seen_archetypes, 2);
    assert_eq!(seen_slots, 5);
}

#[test]
fn precomputed_iterator_matches_once() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);
    populate(&mut ecs);

    let mut iterator: ComponentIterator<(Position,), 4> = ComponentIterator::new();
    iterator.initialize(&ecs);
    assert_eq!(iterator.archetype_count(), 2);

    let mut count = 0;
    iterator.iterate(&mut ecs, |(_position,)| count += 1);
    assert_eq!(count, 5);

    let mut with_entity = 0;
    iterator.iterate_entity(&mut ecs, |entity, (_position,)| {
        assert!(!entity.is_empty());
        assert!(!entity.id().is_invalid());
        with_entity += 1;
    });
    assert_eq!(with_entity, 5);
}

#[test]
#[should_panic(expected = "fanout bound")]
fn precomputed_iterator_asserts_on_overflow() {
    let mut ecs = Ecs::new("queries");
    register_world(&mut ecs);

    let mut iterator: ComponentIterator<(Position,), 1> = ComponentIterator::new();
    iterator.initialize(&ecs);
}
