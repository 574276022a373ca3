//! Create/delete change tracking.
//!
//! Archetypes flagged with `WITH_CREATE_DELETE_TRACKING` append every create
//! and remove to an internal log, so external systems (replication, undo,
//! dirty-set builders) can consume deltas instead of scanning slots.

use crate::entity::EntityId;

/// What happened to an entity slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Delete,
}

/// One tracked lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Change {
    /// The full packed id of the affected entity.
    pub id: EntityId,
    pub kind: ChangeType,
}

/// Append-only lifecycle log for one archetype.
///
/// Inactive trackers (archetype registered without the tracking flag) record
/// nothing and hold no storage.
pub(crate) struct ChangeTracker {
    changes: Vec<Change>,
    active: bool,
    enabled: bool,
}

impl ChangeTracker {
    pub(crate) fn new(active: bool) -> Self {
        Self {
            changes: if active {
                Vec::with_capacity(16)
            } else {
                Vec::new()
            },
            active,
            enabled: true,
        }
    }

    pub(crate) fn record_created(&mut self, id: EntityId) {
        if self.active && self.enabled {
            self.changes.push(Change {
                id,
                kind: ChangeType::Create,
            });
        }
    }

    pub(crate) fn record_deleted(&mut self, id: EntityId) {
        if self.active && self.enabled {
            self.changes.push(Change {
                id,
                kind: ChangeType::Delete,
            });
        }
    }

    pub(crate) fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub(crate) fn reset(&mut self) {
        self.changes.clear();
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
