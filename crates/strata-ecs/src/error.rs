//! Engine error types.

use thiserror::Error;

use crate::archetype::ArchetypeId;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EcsError {
    /// An archetype with the same component mask is already registered.
    #[error("archetype with the same component mask already registered")]
    DuplicateArchetype,

    /// The numeric archetype id is already taken.
    #[error("archetype id {0} already in use")]
    DoubleId(ArchetypeId),

    /// No archetype registered for the requested component mask.
    #[error("no archetype registered for mask {0:#x}")]
    UnregisteredArchetype(u64),

    /// An entity handle was used against an archetype it does not belong to.
    #[error("entity does not belong to this archetype")]
    InvalidEntity,

    /// `create` was asked for a slot index that is neither free nor the tail.
    #[error("requested slot index {0} is not free")]
    InvalidRequestedIndex(u32),

    /// The data stream is structurally inconsistent (cursor anomaly,
    /// duplicate column, impossible counts).
    #[error("malformed data stream")]
    InvalidDataStream,

    /// The stream was written by a newer engine version.
    #[error("stream version {found} is newer than supported version {supported}")]
    BadStreamVersion { found: u32, supported: u32 },

    /// A bulk-serialized column was stored with a different component version.
    #[error("POD column '{name}' stored as version {found}, current version is {current}")]
    InvalidPodDataVersion {
        name: &'static str,
        found: u8,
        current: u8,
    },

    /// Component metadata failed validation at registration.
    #[error("invalid component configuration: {0}")]
    InvalidComponentConfiguration(&'static str),

    /// A component's required co-components are not part of the archetype.
    #[error("component '{0}' requires components missing from the archetype")]
    MissingRequiredComponents(&'static str),

    /// A single serialized column exceeded the 4 GiB length field.
    #[error("component column payload exceeds 4 GiB")]
    TooLargeComponent,

    /// A version 1 stream contains a column the receiver does not know;
    /// version 1 carries no per-column length, so it cannot be skipped.
    #[error("cannot skip unknown component '{0}' in a version 1 stream")]
    CannotSkipComponent(String),

    /// The underlying stream failed.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EcsResult<T> = Result<T, EcsError>;
