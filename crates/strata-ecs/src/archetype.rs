//! Archetypes: fixed component sets with columnar storage and a
//! generational slot allocator.
//!
//! An archetype owns one [`Column`] per component type plus two parallel
//! tables: per-slot state bytes (version + tombstone) and the free list of
//! reusable slot indices. Entities never migrate between archetypes; a slot
//! lives in exactly one archetype for its whole lifetime.

use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::component::{validate_specs, Component, ComponentSpec};
use crate::entity::{Entity, EntityId, EntityState, VERSION_START};
use crate::error::{EcsError, EcsResult};
use crate::listener::EcsListener;
use crate::storage::{Column, StorageKind};
use crate::tracking::{Change, ChangeTracker};

/// Archetype behavior flags, combined bitwise into [`ArchetypeSpec::flags`].
pub mod archetype_flags {
    /// No flags.
    pub const DEFAULTS: u64 = 0x00;
    /// Slots may be compacted in place. Compression rewrites slot indices,
    /// which breaks outstanding handles, so archetypes with this flag never
    /// hand out entities.
    pub const COMPRESSABLE_NO_ENTITIES: u64 = 0x01;
    /// Auto-compress after every N maintenance calls (requires
    /// `COMPRESSABLE_NO_ENTITIES`).
    pub const AUTO_COMPRESS_N_CALLS: u64 = 0x02;
    /// Auto-compress once the free-slot ratio reaches a threshold (requires
    /// `COMPRESSABLE_NO_ENTITIES`).
    pub const AUTO_COMPRESS_FREE_THRESHOLD: u64 = 0x04;
    /// Auto-reserve once fewer than N slots remain (growable storage only).
    pub const AUTO_RESERVE_N_LEFT: u64 = 0x08;
    /// Auto-reserve once the fill ratio reaches a threshold (growable
    /// storage only).
    pub const AUTO_RESERVE_FULL_THRESHOLD: u64 = 0x10;
    /// Never serialize this archetype; save writes an empty record for it.
    pub const NEVER_SERIALIZE: u64 = 0x20;
    /// Record every create and remove in the change log.
    pub const WITH_CREATE_DELETE_TRACKING: u64 = 0x40;
    /// First bit available for application-defined flags.
    pub const FIRST_FREE: u64 = 0x80;
}

/// Numeric archetype identity, user-assigned at registration and unique
/// within a registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u8);

impl ArchetypeId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// The raw id value.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of an archetype to register: name, id, flags, storage
/// discipline, and the component set in declaration order.
pub struct ArchetypeSpec {
    pub(crate) name: String,
    pub(crate) id: ArchetypeId,
    pub(crate) flags: u64,
    pub(crate) storage: StorageKind,
    pub(crate) components: SmallVec<[ComponentSpec; 8]>,
}

impl ArchetypeSpec {
    /// Start describing an archetype. Storage defaults to growable.
    #[must_use]
    pub fn new(name: impl Into<String>, id: ArchetypeId) -> Self {
        Self {
            name: name.into(),
            id,
            flags: archetype_flags::DEFAULTS,
            storage: StorageKind::Growable,
            components: SmallVec::new(),
        }
    }

    /// Use fixed-capacity storage.
    #[must_use]
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.storage = StorageKind::Bounded(capacity);
        self
    }

    /// Set behavior flags.
    #[must_use]
    pub fn flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    /// Add a component type. Declaration order is also column and
    /// serialization order.
    #[must_use]
    pub fn component<C: Component>(mut self) -> Self {
        self.components.push(ComponentSpec::of::<C>());
        self
    }

    /// The combined mask of all declared components.
    #[must_use]
    pub fn mask(&self) -> u64 {
        self.components.iter().fold(0, |mask, c| mask | c.mask())
    }
}

/// Tunable thresholds for the flag-gated maintenance policies. The defaults
/// are placeholders; applications should set what fits their frame budget.
struct AutoPolicies {
    compress_calls: u32,
    calls_since_compress: u32,
    compress_free_threshold: f32,
    reserve_n_left: u32,
    reserve_full_threshold: f32,
}

impl Default for AutoPolicies {
    fn default() -> Self {
        Self {
            compress_calls: 10_000,
            calls_since_compress: 0,
            compress_free_threshold: 0.25,
            reserve_n_left: 1,
            reserve_full_threshold: 0.75,
        }
    }
}

/// One archetype: its columns, slot table, free list, and policies.
pub struct Archetype {
    pub(crate) name: String,
    pub(crate) id: ArchetypeId,
    pub(crate) mask: u64,
    pub(crate) flags: u64,
    pub(crate) storage: StorageKind,
    /// Slot capacity all columns and tables are held to. For bounded storage
    /// this is the fixed bound; for growable storage it only moves on
    /// explicit reserve/enlarge.
    pub(crate) cap: usize,
    pub(crate) columns: SmallVec<[Column; 8]>,
    pub(crate) state: Vec<EntityState>,
    pub(crate) free: Vec<u32>,
    policies: AutoPolicies,
    tracker: ChangeTracker,
    pub(crate) listener: Option<Arc<dyn EcsListener>>,
}

impl Archetype {
    pub(crate) fn new(spec: ArchetypeSpec) -> EcsResult<Self> {
        validate_specs(&spec.components)?;

        let mask = spec.mask();
        let (cap, state, free) = match spec.storage {
            StorageKind::Bounded(capacity) => (
                capacity,
                Vec::with_capacity(capacity),
                Vec::with_capacity(capacity),
            ),
            StorageKind::Growable => (0, Vec::new(), Vec::new()),
        };
        let columns = spec
            .components
            .iter()
            .map(|component| Column::new(component.clone(), spec.storage))
            .collect();
        let tracker = ChangeTracker::new(
            spec.flags & archetype_flags::WITH_CREATE_DELETE_TRACKING != 0,
        );

        Ok(Self {
            name: spec.name,
            id: spec.id,
            mask,
            flags: spec.flags,
            storage: spec.storage,
            cap,
            columns,
            state,
            free,
            policies: AutoPolicies::default(),
            tracker,
            listener: None,
        })
    }

    // ==================== Identity and metadata ====================

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Combined mask of all component types, the archetype's identity within
    /// a registry.
    #[must_use]
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.flags
    }

    #[must_use]
    pub const fn storage_kind(&self) -> StorageKind {
        self.storage
    }

    /// Short storage tag for diagnostics (`"vec"` / `"arr"`).
    #[must_use]
    pub const fn storage_description(&self) -> &'static str {
        self.storage.description()
    }

    /// Whether entity handles may be created for this archetype. False for
    /// compression-eligible archetypes, whose slot indices are unstable.
    #[must_use]
    pub const fn allows_entities(&self) -> bool {
        self.flags & archetype_flags::COMPRESSABLE_NO_ENTITIES == 0
    }

    #[must_use]
    pub const fn is_compressable(&self) -> bool {
        self.flags & archetype_flags::COMPRESSABLE_NO_ENTITIES != 0
    }

    #[must_use]
    pub const fn is_serialized(&self) -> bool {
        self.flags & archetype_flags::NEVER_SERIALIZE == 0
    }

    /// Live entity count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, live and tombstoned.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.state.len()
    }

    /// Slot capacity before creates start failing.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        match self.storage {
            StorageKind::Bounded(capacity) => capacity,
            StorageKind::Growable => self.cap,
        }
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.columns.len()
    }

    /// Component descriptor by declaration position.
    #[must_use]
    pub fn component_at(&self, index: usize) -> Option<&ComponentSpec> {
        self.columns.get(index).map(Column::spec)
    }

    /// Component descriptor by mask.
    #[must_use]
    pub fn component_info(&self, mask: u64) -> Option<&ComponentSpec> {
        self.columns
            .iter()
            .map(Column::spec)
            .find(|spec| spec.mask() == mask)
    }

    /// Sum of all component sizes; one slot costs this many bytes.
    #[must_use]
    pub fn single_entity_size(&self) -> usize {
        self.columns.iter().map(|column| column.spec().size()).sum()
    }

    /// The per-slot state table.
    #[must_use]
    pub fn state(&self) -> &[EntityState] {
        &self.state
    }

    /// Tombstoned slot indices queued for reuse.
    #[must_use]
    pub fn free_list(&self) -> &[u32] {
        &self.free
    }

    #[must_use]
    pub fn column_by_mask(&self, mask: u64) -> Option<&Column> {
        self.columns.iter().find(|column| column.spec().mask() == mask)
    }

    #[must_use]
    pub fn column_by_mask_mut(&mut self, mask: u64) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|column| column.spec().mask() == mask)
    }

    /// Base pointer of a component column, for query cursors.
    pub(crate) fn column_ptr<C: Component>(&mut self) -> Option<*mut C> {
        let column = self.column_by_mask_mut(C::MASK)?;
        assert!(
            column.spec().is::<C>(),
            "component mask {:#x} bound to a different type in archetype `{}`",
            C::MASK,
            self.name
        );
        Some(column.as_mut_ptr().cast())
    }

    pub(crate) fn set_listener(&mut self, listener: Option<Arc<dyn EcsListener>>) {
        self.listener = listener;
    }

    // ==================== Slot allocator ====================

    /// Allocate a slot and return its packed id.
    ///
    /// With no `requested` index, a free slot is reused if one exists,
    /// otherwise the slot table grows by one — unless that would exceed
    /// capacity, in which case [`EntityId::INVALID`] is returned. Appending
    /// never reallocates; callers make room with [`Self::reserve`] up front.
    ///
    /// A `requested` index must be the current tail or a member of the free
    /// list; anything else is [`EcsError::InvalidRequestedIndex`].
    pub fn create(&mut self, requested: Option<u32>) -> EcsResult<EntityId> {
        let index = if let Some(requested) = requested {
            if requested as usize == self.state.len() {
                match self.grow_one() {
                    Some(index) => index,
                    None => return Ok(EntityId::INVALID),
                }
            } else {
                let position = self
                    .free
                    .iter()
                    .rposition(|&free| free == requested)
                    .ok_or(EcsError::InvalidRequestedIndex(requested))?;
                self.free.swap_remove(position);
                self.revive(requested);
                requested
            }
        } else if let Some(index) = self.free.pop() {
            self.revive(index);
            index
        } else {
            match self.grow_one() {
                Some(index) => index,
                None => return Ok(EntityId::INVALID),
            }
        };

        let state = self.state[index as usize];
        debug_assert!(state.is_live());
        let id = EntityId::from_parts(index, state.version());
        debug_assert!(!id.is_invalid());
        self.tracker.record_created(id);
        Ok(id)
    }

    /// Append a fresh slot, or refuse at capacity.
    fn grow_one(&mut self) -> Option<u32> {
        if self.state.len() >= self.capacity() {
            return None;
        }
        let index = self.state.len() as u32;
        for column in &mut self.columns {
            let pushed = column.push_default();
            debug_assert!(pushed, "column capacity out of sync with slot table");
        }
        self.state.push(EntityState::from_parts(VERSION_START, false));
        Some(index)
    }

    /// Clear the tombstone bit of a reused slot. The version was already
    /// bumped at removal time.
    fn revive(&mut self, index: u32) {
        let state = self.state[index as usize];
        debug_assert!(state.is_tombstone());
        self.state[index as usize] = EntityState::from_parts(state.version(), false);
    }

    /// Remove the entity with the given id. Idempotent: ids that no longer
    /// validate (wrong version, tombstoned, out of range) are ignored.
    pub fn remove(&mut self, id: EntityId) {
        // the version bump below is what makes a second call a no-op
        let Some(index) = self.extract_index(id) else {
            return;
        };
        let slot = index as usize;
        self.tracker.record_deleted(id);

        let mut version = (self.state[slot].version() + 1) & 0x7f;
        if version == 0 {
            version = 1;
        }
        self.state[slot] = EntityState::from_parts(version, true);
        self.free.push(index);

        for column in &mut self.columns {
            if column.spec().calls_pre_destroy() {
                column.pre_destroy_at(slot);
            }
        }
        for column in &mut self.columns {
            if !column.spec().skips_clean() {
                column.reseat_default(slot);
            }
        }
    }

    /// Create an entity handle. Seats the self-handle hook on every
    /// component. Returns the empty handle when the archetype is full or
    /// forbids entities.
    pub fn create_entity(&mut self) -> Entity {
        if !self.allows_entities() {
            return Entity::empty();
        }
        let id = match self.create(None) {
            Ok(id) => id,
            Err(_) => return Entity::empty(),
        };
        if id.is_invalid() {
            return Entity::empty();
        }

        let entity = Entity::handle(self.id, id, true);
        let slot = id.index() as usize;
        for column in &mut self.columns {
            column.set_entity_at(slot, &entity);
        }
        entity
    }

    /// Allocate a new slot and copy every component cell from `source`.
    /// Returns the empty handle on any failure.
    pub fn duplicate_entity(&mut self, source: &Entity) -> Entity {
        if !self.allows_entities()
            || source.is_empty()
            || source.archetype_id() != Some(self.id)
        {
            return Entity::empty();
        }
        let Some(source_index) = self.extract_index(source.id()) else {
            return Entity::empty();
        };
        let id = match self.create(None) {
            Ok(id) if !id.is_invalid() => id,
            _ => return Entity::empty(),
        };

        let slot = id.index() as usize;
        for column in &mut self.columns {
            column.clone_cell(slot, source_index as usize);
        }

        let entity = Entity::handle(self.id, id, true);
        for column in &mut self.columns {
            column.set_entity_at(slot, &entity);
        }
        entity
    }

    /// Remove through a handle, clearing it. The handle must belong to this
    /// archetype.
    pub fn remove_entity(&mut self, entity: &mut Entity) -> EcsResult<()> {
        if entity.is_empty() {
            return Ok(());
        }
        if entity.archetype_id() != Some(self.id) {
            return Err(EcsError::InvalidEntity);
        }
        self.remove(entity.id());
        entity.clear();
        Ok(())
    }

    /// Whether the id refers to a live slot with a matching version.
    #[must_use]
    pub fn validate_id(&self, id: EntityId) -> bool {
        self.extract_index(id).is_some()
    }

    /// Resolve an id to its slot index, or `None` if it no longer validates.
    #[must_use]
    pub fn extract_index(&self, id: EntityId) -> Option<u32> {
        let index = id.index();
        let state = *self.state.get(index as usize)?;
        if state.is_tombstone() || state.version() != id.version() {
            return None;
        }
        Some(index)
    }

    /// Typed access to one component cell of a live entity.
    #[must_use]
    pub fn cell<C: Component>(&self, id: EntityId) -> Option<&C> {
        let index = self.extract_index(id)?;
        let column = self.column_by_mask(C::MASK)?;
        column.typed_slice::<C>().get(index as usize)
    }

    /// Mutable typed access to one component cell of a live entity.
    #[must_use]
    pub fn cell_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        let index = self.extract_index(id)?;
        let column = self.column_by_mask_mut(C::MASK)?;
        column.typed_slice_mut::<C>().get_mut(index as usize)
    }

    /// Replace the default value vacated slots are re-seated with.
    pub fn set_component_default<C: Component>(&mut self, value: C) {
        self.column_by_mask_mut(C::MASK)
            .expect("component not in archetype")
            .set_default(value);
    }

    /// The default value vacated slots are re-seated with.
    #[must_use]
    pub fn component_default<C: Component>(&self) -> &C {
        self.column_by_mask(C::MASK)
            .expect("component not in archetype")
            .default_ref()
    }

    // ==================== Capacity management ====================

    /// Pre-allocate room for `capacity` slots across all columns and tables.
    /// No-op under bounded storage and for capacities already reached.
    pub fn reserve(&mut self, capacity: usize) {
        if !self.storage.can_reallocate() || capacity <= self.cap {
            return;
        }
        for column in &mut self.columns {
            column.reserve(capacity);
        }
        self.state.reserve(capacity.saturating_sub(self.state.len()));
        self.free.reserve(capacity.saturating_sub(self.free.len()));
        self.cap = capacity;
    }

    /// Double the slot capacity. Only meaningful for growable storage; a
    /// zero capacity stays zero.
    pub fn enlarge(&mut self) {
        let doubled = self.cap * 2;
        self.reserve(doubled);
    }

    /// Compact tombstoned slots away.
    ///
    /// Only archetypes flagged `COMPRESSABLE_NO_ENTITIES` compact; handles
    /// encode slot indices, so compaction would silently invalidate them.
    /// For other archetypes the only permitted shortcut is dropping storage
    /// once nothing is live.
    ///
    /// The algorithm first pops trailing tombstones, then fills each lowest
    /// hole with the tail cell, re-seating moved components' self-handles.
    pub fn compress(&mut self) {
        let live = self.len();

        if !self.is_compressable() {
            if live == 0 {
                self.clear_storage();
            }
            return;
        }

        if self.free.is_empty() {
            return;
        }
        if live == 0 {
            self.clear_storage();
            return;
        }

        self.free.sort_unstable();
        let mut begin = 0usize;
        let mut end = self.free.len();

        'outer: while begin < end {
            // pop the run of tombstones sitting at the tail
            loop {
                let last_free = self.free[end - 1] as usize;
                if last_free != self.state.len() - 1 {
                    break;
                }
                end -= 1;
                self.state.pop();
                for column in &mut self.columns {
                    column.pop();
                }
                if begin == end {
                    break 'outer;
                }
            }

            // the tail is live here: move it into the lowest hole so each
            // surviving cell moves at most once
            let target = self.free[begin] as usize;
            for column in &mut self.columns {
                column.replace_from_last(target);
            }

            // re-seat self-handles on the moved slot; the handle is built
            // from the bare index and must not escape user code
            let seat = Entity::handle(
                self.id,
                EntityId::from_parts(target as u32, 0),
                true,
            );
            for column in &mut self.columns {
                column.set_entity_at(target, &seat);
            }
            // moved slots restart at a zeroed state byte
            self.state[target] = EntityState::from_raw(0);
            begin += 1;
            self.state.pop();
        }

        self.free.clear();
        debug_assert_eq!(live, self.len());
    }

    /// Run the flag-gated auto policies: compress every N calls or past a
    /// free-slot ratio, reserve when slots run low or past a fill ratio.
    /// Never fails.
    pub fn perform_maintenance(&mut self) {
        if self.auto_compress_calls_due() || self.auto_compress_ratio_due() {
            self.compress();
        }
        if self.auto_reserve_left_due() || self.auto_reserve_ratio_due() {
            self.enlarge();
        }
    }

    fn auto_compress_calls_due(&mut self) -> bool {
        const NEEDED: u64 = archetype_flags::COMPRESSABLE_NO_ENTITIES
            | archetype_flags::AUTO_COMPRESS_N_CALLS;
        if self.flags & NEEDED != NEEDED {
            return false;
        }
        if self.policies.calls_since_compress < self.policies.compress_calls {
            self.policies.calls_since_compress += 1;
            return false;
        }
        self.policies.calls_since_compress = 0;
        true
    }

    fn auto_compress_ratio_due(&self) -> bool {
        const NEEDED: u64 = archetype_flags::COMPRESSABLE_NO_ENTITIES
            | archetype_flags::AUTO_COMPRESS_FREE_THRESHOLD;
        if self.flags & NEEDED != NEEDED {
            return false;
        }
        // NaN on zero capacity compares false
        let ratio = self.free.len() as f32 / self.capacity() as f32;
        ratio >= self.policies.compress_free_threshold
    }

    fn auto_reserve_left_due(&self) -> bool {
        if self.flags & archetype_flags::AUTO_RESERVE_N_LEFT == 0
            || !self.storage.can_reallocate()
        {
            return false;
        }
        (self.capacity() - self.len()) as u32 <= self.policies.reserve_n_left
    }

    fn auto_reserve_ratio_due(&self) -> bool {
        if self.flags & archetype_flags::AUTO_RESERVE_FULL_THRESHOLD == 0
            || !self.storage.can_reallocate()
        {
            return false;
        }
        let ratio = self.state.len() as f32 / self.capacity() as f32;
        ratio >= self.policies.reserve_full_threshold
    }

    /// Set how many maintenance calls pass between auto compressions.
    pub fn set_auto_compress_calls(&mut self, calls: u32) {
        self.policies.compress_calls = calls;
    }

    /// Set the free-slot ratio that triggers auto compression.
    pub fn set_auto_compress_threshold(&mut self, threshold: f32) {
        self.policies.compress_free_threshold = threshold;
    }

    /// Set how few remaining slots trigger an auto reserve.
    pub fn set_auto_reserve_n_left(&mut self, n_left: u32) {
        self.policies.reserve_n_left = n_left;
    }

    /// Set the fill ratio that triggers an auto reserve.
    pub fn set_auto_reserve_full_threshold(&mut self, threshold: f32) {
        self.policies.reserve_full_threshold = threshold;
    }

    /// Drop all entities and tracked changes. Capacity is retained.
    pub fn reset(&mut self) {
        self.clear_storage();
        self.tracker.reset();
    }

    pub(crate) fn clear_storage(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.state.clear();
        self.free.clear();
    }

    // ==================== Iteration ====================

    /// Visit every live entity handle in slot order. Handles from archetypes
    /// that forbid entities are non-copyable.
    pub fn for_each_entity(&self, mut each: impl FnMut(Entity)) {
        let copyable = self.allows_entities();
        for (index, state) in self.state.iter().enumerate() {
            if state.is_tombstone() {
                continue;
            }
            each(Entity::handle(
                self.id,
                EntityId::from_parts(index as u32, state.version()),
                copyable,
            ));
        }
    }

    // ==================== Change tracking ====================

    /// The tracked create/delete log, oldest first.
    #[must_use]
    pub fn tracked_changes(&self) -> &[Change] {
        self.tracker.changes()
    }

    /// Empty the tracked change log.
    pub fn reset_tracked_entities(&mut self) {
        self.tracker.reset();
    }

    /// Pause or resume change recording.
    pub fn enable_entity_tracking(&mut self, enabled: bool) {
        self.tracker.set_enabled(enabled);
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("mask", &format_args!("{:#x}", self.mask))
            .field("storage", &self.storage_description())
            .field("live", &self.len())
            .field("slots", &self.state.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
