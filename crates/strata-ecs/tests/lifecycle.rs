//! Entity lifecycle: creation, slot reuse, generational versioning,
//! storage discipline, and compression.

mod common;

use common::{Doomed, Position, Timer, PRE_DESTROY_CALLS};
use std::sync::atomic::Ordering;
use strata_ecs::prelude::*;
use strata_ecs::EntityId;

fn register_bounded(ecs: &mut Ecs, capacity: usize) -> ArchetypeId {
    let id = ArchetypeId::new(1);
    ecs.register(
        ArchetypeSpec::new("units", id)
            .bounded(capacity)
            .component::<Position>()
            .component::<Timer>(),
    )
    .unwrap();
    id
}

#[test]
fn basic_lifecycle() {
    let mut ecs = Ecs::new("lifecycle");
    let id = register_bounded(&mut ecs, 4);
    let archetype = ecs.archetype_by_id_mut(id).unwrap();

    let mut entities = Vec::new();
    for _ in 0..4 {
        let entity = archetype.create_entity();
        assert!(!entity.is_empty());
        entities.push(entity);
    }

    // the archetype is full; the fifth create returns the empty handle
    assert!(archetype.create_entity().is_empty());
    assert_eq!(archetype.len(), 4);

    let removed = entities.remove(1);
    let removed_id = removed.id();
    let mut removed = removed;
    archetype.remove_entity(&mut removed).unwrap();
    assert!(removed.is_empty());
    assert_eq!(archetype.len(), 3);

    // the vacated slot is reused with a bumped version
    let replacement = archetype.create_entity();
    assert_eq!(replacement.id().index(), 1);
    assert_eq!(replacement.id().version(), 2);
    assert!(archetype.validate_id(replacement.id()));
    assert!(!archetype.validate_id(removed_id));
}

#[test]
fn self_handles_are_seated_on_create_and_duplicate() {
    let mut ecs = Ecs::new("lifecycle");
    let id = register_bounded(&mut ecs, 4);
    let archetype = ecs.archetype_by_id_mut(id).unwrap();

    let entity = archetype.create_entity();
    assert_eq!(
        archetype.cell::<Timer>(entity.id()).unwrap().self_entity,
        entity
    );

    archetype.cell_mut::<Timer>(entity.id()).unwrap().time_left = 8.0;
    let copy = archetype.duplicate_entity(&entity);
    assert!(!copy.is_empty());
    let timer = archetype.cell::<Timer>(copy.id()).unwrap();
    assert_eq!(timer.time_left, 8.0);
    // the copied cell points at the copy, not the source
    assert_eq!(timer.self_entity, copy);
}

#[test]
fn generational_versions_wrap_past_127() {
    let mut ecs = Ecs::new("lifecycle");
    let id = register_bounded(&mut ecs, 1);
    let archetype = ecs.archetype_by_id_mut(id).unwrap();

    let mut entity_id = archetype.create(None).unwrap();
    assert_eq!(entity_id.version(), 1);

    for _ in 0..126 {
        archetype.remove(entity_id);
        entity_id = archetype.create(None).unwrap();
    }
    assert_eq!(entity_id.version(), 127);

    // the next cycle wraps, skipping the forbidden version zero
    archetype.remove(entity_id);
    entity_id = archetype.create(None).unwrap();
    assert_eq!(entity_id.version(), 1);
    assert!(!entity_id.is_invalid());
    assert!(archetype.validate_id(entity_id));
}

#[test]
fn growable_storage_never_reallocates_implicitly() {
    let mut ecs = Ecs::new("lifecycle");
    ecs.register(
        ArchetypeSpec::new("growable", ArchetypeId::new(2))
            .component::<Position>(),
    )
    .unwrap();
    let archetype = ecs.find_archetype_mut(Position::MASK).unwrap();

    // no reserve yet: creates refuse rather than reallocate
    assert!(archetype.create_entity().is_empty());

    archetype.reserve(4);
    for _ in 0..4 {
        assert!(!archetype.create_entity().is_empty());
    }
    assert!(archetype.create_entity().is_empty());
    assert_eq!(archetype.len(), 4);
}

#[test]
fn slot_reuse_churn_yields_fresh_ids() {
    let mut ecs = Ecs::new("lifecycle");
    let id = register_bounded(&mut ecs, 4);
    let archetype = ecs.archetype_by_id_mut(id).unwrap();

    let mut live: Vec<Entity> = Vec::new();
    let mut seen: std::collections::BTreeSet<EntityId> = std::collections::BTreeSet::new();

    // deterministic create/remove churn within the four slots
    for step in 0..1000u32 {
        let create = live.len() < 4 && (live.is_empty() || step % 3 != 0);
        if create {
            let entity = archetype.create_entity();
            assert!(!entity.is_empty());
            assert!(archetype.validate_id(entity.id()));
            live.push(entity);
        } else {
            let index = (step as usize * 7) % live.len();
            let mut entity = live.swap_remove(index);
            assert!(archetype.validate_id(entity.id()));
            seen.insert(entity.id());
            archetype.remove_entity(&mut entity).unwrap();
        }
    }
    // no removed id was ever handed out again
    for entity in &live {
        assert!(!seen.contains(&entity.id()));
    }
}

#[test]
fn pre_destroy_runs_for_flagged_components() {
    let mut ecs = Ecs::new("lifecycle");
    ecs.register(
        ArchetypeSpec::new("doomed", ArchetypeId::new(3))
            .bounded(2)
            .component::<Doomed>(),
    )
    .unwrap();
    let archetype = ecs.find_archetype_mut(Doomed::MASK).unwrap();

    PRE_DESTROY_CALLS.store(0, Ordering::SeqCst);
    let id = archetype.create(None).unwrap();
    archetype.remove(id);
    assert_eq!(PRE_DESTROY_CALLS.load(Ordering::SeqCst), 1);

    // idempotent removal must not re-run the hook
    archetype.remove(id);
    assert_eq!(PRE_DESTROY_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn compression_packs_survivors() {
    let mut ecs = Ecs::new("lifecycle");
    ecs.register(
        ArchetypeSpec::new("pool", ArchetypeId::new(4))
            .bounded(8)
            .flags(archetype_flags::COMPRESSABLE_NO_ENTITIES)
            .component::<Position>(),
    )
    .unwrap();
    let archetype = ecs.find_archetype_mut(Position::MASK).unwrap();

    let mut ids = Vec::new();
    for i in 0..8 {
        let id = archetype.create(None).unwrap();
        archetype.cell_mut::<Position>(id).unwrap().position = i as f32;
        ids.push(id);
    }
    for &slot in &[1usize, 3, 5] {
        archetype.remove(ids[slot]);
    }
    assert_eq!(archetype.len(), 5);

    archetype.compress();

    assert_eq!(archetype.slot_count(), 5);
    assert!(archetype.free_list().is_empty());
    assert_eq!(archetype.len(), 5);

    // every surviving payload appears exactly once
    let mut survivors: Vec<f32> = archetype
        .column_by_mask(Position::MASK)
        .unwrap()
        .typed_slice::<Position>()
        .iter()
        .map(|p| p.position)
        .collect();
    survivors.sort_by(f32::total_cmp);
    assert_eq!(survivors, vec![0.0, 2.0, 4.0, 6.0, 7.0]);
}

#[test]
fn compression_is_gated_and_idempotent() {
    let mut ecs = Ecs::new("lifecycle");
    let id = register_bounded(&mut ecs, 4);
    let archetype = ecs.archetype_by_id_mut(id).unwrap();

    let first = archetype.create_entity();
    let mut second = archetype.create_entity();
    archetype.remove_entity(&mut second).unwrap();

    // not flagged compressable: slots stay put while anything is live
    archetype.compress();
    assert_eq!(archetype.slot_count(), 2);
    assert!(archetype.validate_id(first.id()));

    // with nothing live the storage may be dropped wholesale
    let mut first = first;
    archetype.remove_entity(&mut first).unwrap();
    archetype.compress();
    assert_eq!(archetype.slot_count(), 0);
    assert!(archetype.free_list().is_empty());
}

#[test]
fn change_tracking_records_create_and_delete() {
    let mut ecs = Ecs::new("lifecycle");
    ecs.register(
        ArchetypeSpec::new("tracked", ArchetypeId::new(5))
            .bounded(4)
            .flags(archetype_flags::WITH_CREATE_DELETE_TRACKING)
            .component::<Position>(),
    )
    .unwrap();
    let archetype = ecs.find_archetype_mut(Position::MASK).unwrap();

    let id = archetype.create(None).unwrap();
    archetype.remove(id);
    let second = archetype.create(None).unwrap();

    let changes = archetype.tracked_changes();
    assert_eq!(changes.len(), 3);
    assert_eq!(
        (changes[0].id, changes[0].kind),
        (id, strata_ecs::ChangeType::Create)
    );
    assert_eq!(
        (changes[1].id, changes[1].kind),
        (id, strata_ecs::ChangeType::Delete)
    );
    assert_eq!(
        (changes[2].id, changes[2].kind),
        (second, strata_ecs::ChangeType::Create)
    );

    archetype.reset_tracked_entities();
    assert!(archetype.tracked_changes().is_empty());
}
