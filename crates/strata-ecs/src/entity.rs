//! Entity identifiers with generational slot versions.
//!
//! An entity id packs a slot index and a 7-bit version counter into a single
//! `u32`. The version is bumped whenever a slot is vacated, so ids held past
//! a removal stop validating instead of silently pointing at reused storage.

use core::fmt;

use bytemuck::{Pod, Zeroable};

use crate::archetype::ArchetypeId;
use crate::ecs::Ecs;

/// How far the version bits are shifted inside an [`EntityId`].
pub const VERSION_SHIFT: u32 = 24;
/// Bits of an [`EntityId`] holding the slot index.
pub const INDEX_MASK: u32 = 0x00ff_ffff;
/// Bits of an [`EntityId`] holding the version.
pub const VERSION_MASK: u32 = 0x7f00_0000;
/// First version a fresh slot starts at. Versions wrap 127 back to 1;
/// version 0 never exists, which is what makes id 0 the invalid id.
pub const VERSION_START: u8 = 1;

/// Packed entity identifier: low 24 bits slot index, next 7 bits version.
///
/// The all-zero value is the invalid id, because no live slot ever carries
/// version 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u32);

impl EntityId {
    /// The invalid id.
    pub const INVALID: Self = Self(0);

    /// Pack a slot index and version. No validity checks; callers that hand
    /// ids to users guarantee a non-zero version themselves.
    #[must_use]
    pub const fn from_parts(index: u32, version: u8) -> Self {
        Self((index & INDEX_MASK) | ((version as u32) << VERSION_SHIFT))
    }

    /// Rebuild an id from its raw packed value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw packed value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// The slot index part.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// The version part.
    #[must_use]
    pub const fn version(self) -> u8 {
        ((self.0 & VERSION_MASK) >> VERSION_SHIFT) as u8
    }

    /// Whether this is the invalid id.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.version())
    }
}

/// Per-slot state byte: low 7 bits current version, bit 7 the tombstone flag.
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct EntityState(u8);

impl EntityState {
    const TOMBSTONE_BIT: u8 = 0x80;

    /// Build a state byte from a version and the tombstone flag.
    #[must_use]
    pub const fn from_parts(version: u8, tombstone: bool) -> Self {
        Self((version & 0x7f) | if tombstone { Self::TOMBSTONE_BIT } else { 0 })
    }

    /// Reinterpret a raw byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw byte.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    /// The slot's current version.
    #[must_use]
    pub const fn version(self) -> u8 {
        self.0 & 0x7f
    }

    /// Whether the slot is empty and queued for reuse.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE_BIT != 0
    }

    /// Whether the slot holds a live entity.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !self.is_tombstone()
    }
}

impl fmt::Debug for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tombstone() {
            write!(f, "v{}+tomb", self.version())
        } else {
            write!(f, "v{}", self.version())
        }
    }
}

/// A handle identifying one row of one archetype.
///
/// The handle is a plain value: archetype id plus packed entity id. It does
/// not keep the entity alive and does not borrow the registry; all checked
/// access goes through [`Ecs`] or [`crate::Archetype`].
///
/// Handles are `Clone` but deliberately not `Copy`: handles yielded while
/// iterating archetypes that forbid entities point at slots compression may
/// invalidate, and cloning such a handle trips a debug assertion.
pub struct Entity {
    archetype: Option<ArchetypeId>,
    id: EntityId,
    copyable: bool,
}

impl Entity {
    /// The empty handle: no archetype, invalid id.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            archetype: None,
            id: EntityId::INVALID,
            copyable: true,
        }
    }

    pub(crate) const fn handle(archetype: ArchetypeId, id: EntityId, copyable: bool) -> Self {
        Self {
            archetype: Some(archetype),
            id,
            copyable,
        }
    }

    /// Whether this handle points at nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.archetype.is_none()
    }

    /// The packed entity id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// The owning archetype's id, if any.
    #[must_use]
    pub const fn archetype_id(&self) -> Option<ArchetypeId> {
        self.archetype
    }

    /// Full validation: the archetype resolves, the slot index is in range,
    /// the slot is live, and the handle's version matches the slot's.
    #[must_use]
    pub fn fully_validate(&self, ecs: &Ecs) -> bool {
        let Some(archetype_id) = self.archetype else {
            return false;
        };
        ecs.archetype_by_id(archetype_id)
            .is_some_and(|archetype| archetype.validate_id(self.id))
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::empty();
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::empty()
    }
}

impl Clone for Entity {
    fn clone(&self) -> Self {
        debug_assert!(
            self.copyable,
            "cloning an entity handle from a compression-eligible archetype"
        );
        Self {
            archetype: self.archetype,
            id: self.id,
            copyable: self.copyable,
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.archetype == other.archetype && self.id == other.id
    }
}

impl Eq for Entity {}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.archetype, self.id).cmp(&(other.archetype, other.id))
    }
}

impl core::hash::Hash for Entity {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.archetype.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archetype {
            Some(archetype) => write!(f, "Entity(a{}:{:?})", archetype.as_raw(), self.id),
            None => write!(f, "Entity(empty)"),
        }
    }
}
