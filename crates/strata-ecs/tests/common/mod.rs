#![allow(dead_code)]

//! Components shared by the integration suites.

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};

use strata_ecs::{component_flags, Component, EcsResult, Entity, Stream, StreamExt};

/// Structured component with a full save/load pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub position: f32,
    pub acceleration: f32,
    pub speed: f32,
}

impl Component for Position {
    const NAME: &'static str = "Position";
    const MASK: u64 = 1 << 0;

    fn default_value() -> Self {
        Self {
            position: 0.0,
            acceleration: 0.0,
            speed: 0.0,
        }
    }

    fn save(&self, stream: &mut dyn Stream, _userdata: &mut dyn Any) -> EcsResult<()> {
        stream.write_f32(self.position)?;
        stream.write_f32(self.acceleration)?;
        stream.write_f32(self.speed)?;
        Ok(())
    }

    fn load(
        &mut self,
        stream: &mut dyn Stream,
        _userdata: &mut dyn Any,
        _version: u8,
    ) -> EcsResult<()> {
        self.position = stream.read_f32()?;
        self.acceleration = stream.read_f32()?;
        self.speed = stream.read_f32()?;
        Ok(())
    }
}

/// Component keeping a self-handle through the seat hook. Only the timer
/// value is streamed; the handle is re-seated by the loader.
#[derive(Clone, Debug)]
pub struct Timer {
    pub time_left: f32,
    pub self_entity: Entity,
}

impl Component for Timer {
    const NAME: &'static str = "Timer";
    const MASK: u64 = 1 << 1;

    fn default_value() -> Self {
        Self {
            time_left: 0.0,
            self_entity: Entity::empty(),
        }
    }

    fn save(&self, stream: &mut dyn Stream, _userdata: &mut dyn Any) -> EcsResult<()> {
        stream.write_f32(self.time_left)?;
        Ok(())
    }

    fn load(
        &mut self,
        stream: &mut dyn Stream,
        _userdata: &mut dyn Any,
        _version: u8,
    ) -> EcsResult<()> {
        self.time_left = stream.read_f32()?;
        Ok(())
    }

    fn set_entity(&mut self, entity: &Entity) {
        self.self_entity = entity.clone();
    }
}

/// Bulk-serialized plain-data component.
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub ttl: u32,
}

impl Component for Particle {
    const NAME: &'static str = "Particle";
    const MASK: u64 = 1 << 2;
    const FLAGS: u64 = component_flags::SERIALIZE_AS_POD;

    fn default_value() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            ttl: 0,
        }
    }

    fn pod_bytes(cells: &[Self]) -> Option<&[u8]> {
        Some(bytemuck::cast_slice(cells))
    }

    fn pod_bytes_mut(cells: &mut [Self]) -> Option<&mut [u8]> {
        Some(bytemuck::cast_slice_mut(cells))
    }
}

/// Component excluded from every stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Scratch {
    pub value: u32,
}

impl Component for Scratch {
    const NAME: &'static str = "Scratch";
    const MASK: u64 = 1 << 3;
    const FLAGS: u64 = component_flags::NEVER_SERIALIZE;

    fn default_value() -> Self {
        Self { value: 0 }
    }
}

pub static PRE_DESTROY_CALLS: AtomicU32 = AtomicU32::new(0);

/// Component counting pre-destroy invocations.
#[derive(Clone, Debug)]
pub struct Doomed;

impl Component for Doomed {
    const NAME: &'static str = "Doomed";
    const MASK: u64 = 1 << 4;
    const FLAGS: u64 = component_flags::CALL_PRE_DESTROY;

    fn default_value() -> Self {
        Self
    }

    fn pre_destroy(&mut self) {
        PRE_DESTROY_CALLS.fetch_add(1, Ordering::SeqCst);
    }
}
