//! Versioned binary serialization of registry state.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! u32 stream version            currently 2; loaders reject newer streams
//! u32 archetype count
//! per archetype:
//!   u8  archetype id
//!   u32 body length             not counting this field
//!   body:
//!     u32 state count, state bytes
//!     u32 free count,  free indices (u32 each)
//!     per non-empty column:
//!       u8  name length (1..=255)
//!       name bytes
//!       u8  component version
//!       u32 payload length      including this field's own 4 bytes
//!       payload
//!     u8 0                      column list terminator
//! ```
//!
//! Per-column payloads come in two encodings. POD columns are one raw write
//! covering every slot, tombstoned cells included (the state table
//! disambiguates on load). Structured columns invoke the component's
//! `save`/`load` hooks per live slot, passing the stored version so old
//! layouts can be upconverted.
//!
//! Unknown columns are skipped via their length field (stream version 2+);
//! unknown archetype ids are skipped whole, with a warning.

use std::any::Any;

use tracing::{debug, warn};

use crate::archetype::{Archetype, ArchetypeId};
use crate::ecs::Ecs;
use crate::entity::{Entity, EntityId, EntityState};
use crate::error::{EcsError, EcsResult};
use crate::listener::{SerializationEvent, SerializationEventKind};
use crate::stream::{Stream, StreamExt};

/// Version written into every stream; loaders accept this and older.
pub const STREAM_VERSION: u32 = 2;

impl Ecs {
    /// Write the whole registry to a stream. `userdata` is passed through to
    /// every component hook untouched; use it for serialization context.
    pub fn save(&self, stream: &mut dyn Stream, userdata: &mut dyn Any) -> EcsResult<()> {
        debug!(registry = %self.name(), "saving registry");
        if let Some(listener) = self.listener() {
            listener.serialization_event(&SerializationEvent {
                version: STREAM_VERSION,
                name: Some(self.name()),
                ..SerializationEvent::new(SerializationEventKind::SaveStart)
            });
        }

        stream.write_u32(STREAM_VERSION)?;
        stream.write_u32(self.archetype_count() as u32)?;

        for archetype in self.archetypes() {
            stream.write_u8(archetype.id().as_raw())?;

            let length_position = stream.position();
            stream.write_u32(0)?;
            archetype.save_body(stream, userdata)?;

            let end_position = stream.position();
            let body_length = end_position - length_position - 4;
            debug_assert!(body_length <= u64::from(u32::MAX));
            stream.set_position(length_position)?;
            stream.write_u32(body_length as u32)?;
            stream.set_position(end_position)?;
            debug!(
                archetype = %archetype.id(),
                name = archetype.name(),
                bytes = body_length,
                "archetype saved"
            );
        }

        if let Some(listener) = self.listener() {
            listener.serialization_event(&SerializationEvent::new(
                SerializationEventKind::SaveFinished,
            ));
        }
        Ok(())
    }

    /// Replace all archetype contents with the stream's. Every registered
    /// archetype is reset first; archetype records with unknown ids are
    /// skipped with a warning. Ends with a maintenance pass so auto-reserve
    /// policies are satisfied before the next frame.
    pub fn load(&mut self, stream: &mut dyn Stream, userdata: &mut dyn Any) -> EcsResult<()> {
        let listener = self.listener().cloned();

        let found = stream.read_u32()?;
        debug!(registry = %self.name(), version = found, "loading registry");
        if found > STREAM_VERSION {
            return Err(EcsError::BadStreamVersion {
                found,
                supported: STREAM_VERSION,
            });
        }
        if let Some(listener) = &listener {
            listener.serialization_event(&SerializationEvent {
                version: found,
                name: Some(self.name()),
                ..SerializationEvent::new(SerializationEventKind::LoadStart)
            });
        }

        for archetype in self.archetypes_mut() {
            archetype.reset();
        }

        let archetype_count = stream.read_u32()?;
        for _ in 0..archetype_count {
            let id = ArchetypeId::new(stream.read_u8()?);
            let body_length = stream.read_u32()?;

            let Some(archetype) = self.archetype_by_id_mut(id) else {
                warn!(archetype = %id, "unrecognized archetype in stream, skipping");
                stream.skip(u64::from(body_length))?;
                continue;
            };

            if let Some(listener) = &listener {
                listener.serialization_event(&SerializationEvent {
                    archetype: id,
                    ..SerializationEvent::new(SerializationEventKind::ArchetypeStart)
                });
            }
            archetype.load_body(stream, userdata, found)?;
            if let Some(listener) = &listener {
                listener.serialization_event(&SerializationEvent {
                    archetype: id,
                    ..SerializationEvent::new(SerializationEventKind::ArchetypeFinished)
                });
            }
        }

        for archetype in self.archetypes_mut() {
            archetype.perform_maintenance();
        }

        if let Some(listener) = &listener {
            listener.serialization_event(&SerializationEvent::new(
                SerializationEventKind::LoadFinished,
            ));
        }
        Ok(())
    }
}

impl Archetype {
    /// Write this archetype's slot table and columns. `NEVER_SERIALIZE`
    /// archetypes write an empty body.
    pub(crate) fn save_body(&self, stream: &mut dyn Stream, userdata: &mut dyn Any) -> EcsResult<()> {
        if !self.is_serialized() {
            return Ok(());
        }

        stream.write_u32(self.state.len() as u32)?;
        stream.write(bytemuck::cast_slice(&self.state))?;

        stream.write_u32(self.free.len() as u32)?;
        for &index in &self.free {
            stream.write_u32(index)?;
        }

        let state_count = self.state.len();
        for column in &self.columns {
            if column.is_empty() {
                continue;
            }
            debug_assert_eq!(column.len(), state_count);
            let spec = column.spec();
            let name = spec.name();

            stream.write_u8(name.len() as u8)?;
            stream.write(name.as_bytes())?;
            stream.write_u8(spec.version())?;

            let length_position = stream.position();
            stream.write_u32(0)?;

            if let Some(listener) = &self.listener {
                listener.serialization_event(&SerializationEvent {
                    archetype: self.id,
                    version: u32::from(spec.version()),
                    component_count: column.len() as u32,
                    component_mask: spec.mask(),
                    name: Some(name),
                    ..SerializationEvent::new(SerializationEventKind::SaveComponent)
                });
            }

            if spec.never_serialized() {
                // header only; the loader finds nothing to read and skips
            } else if spec.is_pod_serialized() {
                column.save_pod(stream)?;
            } else {
                for (index, state) in self.state.iter().enumerate() {
                    if state.is_live() {
                        column.save_cell_at(index, stream, userdata)?;
                    }
                }
            }

            let end_position = stream.position();
            let total = end_position - length_position;
            if total > u64::from(u32::MAX) {
                return Err(EcsError::TooLargeComponent);
            }
            stream.set_position(length_position)?;
            stream.write_u32(total as u32)?;
            stream.set_position(end_position)?;
        }

        stream.write_u8(0)?;
        Ok(())
    }

    /// Read this archetype's slot table and columns, written by
    /// [`Self::save_body`].
    pub(crate) fn load_body(
        &mut self,
        stream: &mut dyn Stream,
        userdata: &mut dyn Any,
        stream_version: u32,
    ) -> EcsResult<()> {
        if !self.is_serialized() {
            return Ok(());
        }

        let state_count = stream.read_u32()? as usize;
        if !self.storage.can_reallocate() && state_count > self.capacity() {
            return Err(EcsError::InvalidDataStream);
        }
        let mut state_bytes = vec![0u8; state_count];
        stream.read(&mut state_bytes)?;
        self.state.clear();
        self.state.reserve(state_count);
        self.state
            .extend(state_bytes.iter().map(|&byte| EntityState::from_raw(byte)));

        let free_count = stream.read_u32()? as usize;
        if free_count > state_count {
            return Err(EcsError::InvalidDataStream);
        }
        self.free.clear();
        self.free.reserve(free_count);
        for _ in 0..free_count {
            self.free.push(stream.read_u32()?);
        }

        if self.storage.can_reallocate() && state_count > self.cap {
            self.cap = state_count;
        }

        // every column gets fresh defaults at the loaded size, so columns a
        // stream does not carry are still consistent with the slot table
        for column in &mut self.columns {
            column.resize_to(state_count);
        }

        // seat self-handles on live slots before any column data arrives
        for (index, state) in self.state.iter().enumerate() {
            if state.is_tombstone() {
                continue;
            }
            let entity = Entity::handle(
                self.id,
                EntityId::from_parts(index as u32, state.version()),
                true,
            );
            for column in &mut self.columns {
                column.set_entity_at(index, &entity);
            }
        }

        let can_skip = stream_version >= 2;
        let mut loaded = vec![false; self.columns.len()];
        loop {
            let name_length = stream.read_u8()?;
            if name_length == 0 {
                break;
            }
            let mut name_bytes = vec![0u8; name_length as usize];
            stream.read(&mut name_bytes)?;
            let stored_version = stream.read_u8()?;

            let mut payload_length = 0u64;
            if can_skip {
                let total = stream.read_u32()?;
                if total < 4 {
                    return Err(EcsError::InvalidDataStream);
                }
                payload_length = u64::from(total - 4);
            }
            let start_position = stream.position();

            let position = self
                .columns
                .iter()
                .position(|column| column.spec().name().as_bytes() == name_bytes.as_slice());

            let Some(position) = position else {
                if !can_skip {
                    return Err(EcsError::CannotSkipComponent(
                        String::from_utf8_lossy(&name_bytes).into_owned(),
                    ));
                }
                stream.skip(payload_length)?;
                continue;
            };

            if loaded[position] {
                return Err(EcsError::InvalidDataStream);
            }
            loaded[position] = true;

            {
                let column = &self.columns[position];
                let spec = column.spec();
                if let Some(listener) = &self.listener {
                    listener.serialization_event(&SerializationEvent {
                        archetype: self.id,
                        version: u32::from(stored_version),
                        component_count: column.len() as u32,
                        component_mask: spec.mask(),
                        name: Some(spec.name()),
                        ..SerializationEvent::new(SerializationEventKind::LoadComponent)
                    });
                }
            }

            let spec = self.columns[position].spec();
            if spec.never_serialized() {
                // nothing was streamed
            } else if spec.is_pod_serialized() {
                let current = spec.version();
                if stored_version != current {
                    return Err(EcsError::InvalidPodDataVersion {
                        name: spec.name(),
                        found: stored_version,
                        current,
                    });
                }
                self.columns[position].load_pod(stream)?;
            } else {
                let column = &mut self.columns[position];
                for (index, state) in self.state.iter().enumerate() {
                    if state.is_live() {
                        column.load_cell_at(index, stream, userdata, stored_version)?;
                    }
                }
            }

            if can_skip {
                let read = stream.position() - start_position;
                if read < payload_length {
                    // under-reading loaders lose data but not the stream
                    stream.skip(payload_length - read)?;
                } else if read > payload_length {
                    return Err(EcsError::InvalidDataStream);
                }
            }
        }

        Ok(())
    }

    /// Stream one live entity's components: bare payloads, no slot-table
    /// header, no column headers. A stale id writes nothing.
    pub fn save_single(
        &self,
        stream: &mut dyn Stream,
        userdata: &mut dyn Any,
        id: EntityId,
    ) -> EcsResult<()> {
        if !self.is_serialized() {
            return Ok(());
        }
        let Some(index) = self.extract_index(id) else {
            return Ok(());
        };
        let slot = index as usize;

        for column in &self.columns {
            let spec = column.spec();
            if let Some(listener) = &self.listener {
                listener.serialization_event(&SerializationEvent {
                    archetype: self.id,
                    version: u32::from(spec.version()),
                    component_count: 1,
                    component_mask: spec.mask(),
                    name: Some(spec.name()),
                    ..SerializationEvent::new(SerializationEventKind::SaveComponent)
                });
            }
            if spec.never_serialized() {
                continue;
            }
            if spec.is_pod_serialized() {
                column.save_pod_at(slot, stream)?;
            } else {
                column.save_cell_at(slot, stream, userdata)?;
            }
        }
        Ok(())
    }

    /// Counterpart of [`Self::save_single`]: stream component payloads into
    /// one live slot. Components load at their current version.
    pub fn load_single(
        &mut self,
        stream: &mut dyn Stream,
        userdata: &mut dyn Any,
        id: EntityId,
    ) -> EcsResult<()> {
        if !self.is_serialized() {
            return Ok(());
        }
        let Some(index) = self.extract_index(id) else {
            return Ok(());
        };
        let slot = index as usize;

        for position in 0..self.columns.len() {
            let spec = self.columns[position].spec();
            let version = spec.version();
            if let Some(listener) = &self.listener {
                listener.serialization_event(&SerializationEvent {
                    archetype: self.id,
                    version: u32::from(version),
                    component_count: 1,
                    component_mask: spec.mask(),
                    name: Some(spec.name()),
                    ..SerializationEvent::new(SerializationEventKind::LoadComponent)
                });
            }
            if spec.never_serialized() {
                continue;
            }
            if spec.is_pod_serialized() {
                self.columns[position].load_pod_at(slot, stream)?;
            } else {
                self.columns[position].load_cell_at(slot, stream, userdata, version)?;
            }
        }
        Ok(())
    }
}
