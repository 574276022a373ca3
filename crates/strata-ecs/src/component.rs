//! Component metadata and the per-type descriptor.
//!
//! A component declares compile-time metadata (a single-bit mask, a
//! serialization version, flags, required co-components) plus optional hooks
//! for serialization, self-handle seating, and pre-destroy work. At archetype
//! registration the metadata is erased into a [`ComponentSpec`] descriptor so
//! columns and the serializer can operate without knowing concrete types.

use std::{alloc::Layout, any::Any, any::TypeId, fmt, mem, ptr};

use crate::entity::Entity;
use crate::error::{EcsError, EcsResult};
use crate::stream::Stream;

/// Component behavior flags, combined bitwise into [`Component::FLAGS`].
pub mod component_flags {
    /// No flags.
    pub const DEFAULTS: u64 = 0x00;
    /// Skip the default re-seat when the owning entity is removed; the cell
    /// keeps its last value until the slot is reused.
    pub const NO_CLEAN: u64 = 0x01;
    /// Invoke [`super::Component::pre_destroy`] before a removal re-seats the
    /// cell.
    pub const CALL_PRE_DESTROY: u64 = 0x02;
    /// Serialize the whole column as one raw little-endian write. Components
    /// setting this must override [`super::Component::pod_bytes`] and
    /// [`super::Component::pod_bytes_mut`], typically with
    /// `bytemuck::cast_slice`.
    pub const SERIALIZE_AS_POD: u64 = 0x04;
    /// Never stream this component; its cells survive only in memory.
    pub const NEVER_SERIALIZE: u64 = 0x08;
    /// First bit available for application-defined flags.
    pub const FIRST_FREE: u64 = 0x10;
}

/// A value type attached to entities of an archetype.
///
/// Every component carries static metadata and may opt into hooks by
/// overriding the default no-op methods. `Clone` is required because
/// duplication and the removal re-seat copy cells wholesale.
pub trait Component: Clone + Send + Sync + 'static {
    /// Non-empty name, unique within any archetype. Serialized and used to
    /// match columns on load, so renaming breaks stream compatibility.
    const NAME: &'static str;

    /// Single-bit identity mask, unique within any archetype.
    const MASK: u64;

    /// Serialization version, 1..=255. Bump when the stored layout changes.
    const VERSION: u8 = 1;

    /// Combination of [`component_flags`] bits.
    const FLAGS: u64 = component_flags::DEFAULTS;

    /// Mask of components that must accompany this one in an archetype.
    const REQUIRES: u64 = 0;

    /// The value a fresh or vacated cell is seated with.
    fn default_value() -> Self;

    /// Structured serialization of one cell. Only called for live slots.
    fn save(&self, _stream: &mut dyn Stream, _userdata: &mut dyn Any) -> EcsResult<()> {
        Ok(())
    }

    /// Structured deserialization of one cell. `version` is the version the
    /// cell was stored with, so old layouts can be upconverted.
    fn load(
        &mut self,
        _stream: &mut dyn Stream,
        _userdata: &mut dyn Any,
        _version: u8,
    ) -> EcsResult<()> {
        Ok(())
    }

    /// Self-handle seat hook. Called after create, duplicate, a compression
    /// move, and for every live slot on load. Overriding is the opt-in.
    fn set_entity(&mut self, _entity: &Entity) {}

    /// Called before a removal re-seats the cell, when
    /// [`component_flags::CALL_PRE_DESTROY`] is set.
    fn pre_destroy(&mut self) {}

    /// Raw little-endian image of a column, for
    /// [`component_flags::SERIALIZE_AS_POD`] components.
    fn pod_bytes(_cells: &[Self]) -> Option<&[u8]> {
        None
    }

    /// Mutable raw image of a column, for bulk deserialization.
    fn pod_bytes_mut(_cells: &mut [Self]) -> Option<&mut [u8]> {
        None
    }
}

// ============================================================================
// Type-erased hook thunks
// ============================================================================

unsafe fn default_in_place<C: Component>(ptr: *mut u8) {
    unsafe { ptr.cast::<C>().write(C::default_value()) }
}

unsafe fn clone_new<C: Component>(dst: *mut u8, src: *const u8) {
    unsafe { dst.cast::<C>().write((*src.cast::<C>()).clone()) }
}

unsafe fn clone_assign<C: Component>(dst: *mut u8, src: *const u8) {
    unsafe { *dst.cast::<C>() = (*src.cast::<C>()).clone() }
}

unsafe fn set_entity<C: Component>(ptr: *mut u8, entity: &Entity) {
    unsafe { (*ptr.cast::<C>()).set_entity(entity) }
}

unsafe fn pre_destroy<C: Component>(ptr: *mut u8) {
    unsafe { (*ptr.cast::<C>()).pre_destroy() }
}

unsafe fn save_cell<C: Component>(
    ptr: *const u8,
    stream: &mut dyn Stream,
    userdata: &mut dyn Any,
) -> EcsResult<()> {
    unsafe { (*ptr.cast::<C>()).save(stream, userdata) }
}

unsafe fn load_cell<C: Component>(
    ptr: *mut u8,
    stream: &mut dyn Stream,
    userdata: &mut dyn Any,
    version: u8,
) -> EcsResult<()> {
    unsafe { (*ptr.cast::<C>()).load(stream, userdata, version) }
}

unsafe fn pod_save<C: Component>(
    ptr: *const u8,
    len: usize,
    stream: &mut dyn Stream,
) -> EcsResult<()> {
    let cells = unsafe { core::slice::from_raw_parts(ptr.cast::<C>(), len) };
    match C::pod_bytes(cells) {
        Some(bytes) => {
            stream.write(bytes)?;
            Ok(())
        }
        None => Err(EcsError::InvalidComponentConfiguration(
            "SERIALIZE_AS_POD component exposes no raw bytes",
        )),
    }
}

unsafe fn pod_load<C: Component>(
    ptr: *mut u8,
    len: usize,
    stream: &mut dyn Stream,
) -> EcsResult<()> {
    let cells = unsafe { core::slice::from_raw_parts_mut(ptr.cast::<C>(), len) };
    match C::pod_bytes_mut(cells) {
        Some(bytes) => {
            stream.read(bytes)?;
            Ok(())
        }
        None => Err(EcsError::InvalidComponentConfiguration(
            "SERIALIZE_AS_POD component exposes no raw bytes",
        )),
    }
}

// ============================================================================
// ComponentSpec
// ============================================================================

/// Runtime descriptor of a component type: its static metadata plus the
/// type-erased hook table columns dispatch through.
#[derive(Clone)]
pub struct ComponentSpec {
    name: &'static str,
    mask: u64,
    version: u8,
    flags: u64,
    requires: u64,
    layout: Layout,
    type_id: TypeId,
    pod_supported: bool,
    drop_fn: Option<unsafe fn(*mut u8)>,
    default_in_place: unsafe fn(*mut u8),
    clone_new: unsafe fn(*mut u8, *const u8),
    clone_assign: unsafe fn(*mut u8, *const u8),
    set_entity: unsafe fn(*mut u8, &Entity),
    pre_destroy: unsafe fn(*mut u8),
    save_cell: unsafe fn(*const u8, &mut dyn Stream, &mut dyn Any) -> EcsResult<()>,
    load_cell: unsafe fn(*mut u8, &mut dyn Stream, &mut dyn Any, u8) -> EcsResult<()>,
    pod_save: unsafe fn(*const u8, usize, &mut dyn Stream) -> EcsResult<()>,
    pod_load: unsafe fn(*mut u8, usize, &mut dyn Stream) -> EcsResult<()>,
}

impl ComponentSpec {
    /// Build the descriptor for a concrete component type.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            name: C::NAME,
            mask: C::MASK,
            version: C::VERSION,
            flags: C::FLAGS,
            requires: C::REQUIRES,
            layout: Layout::new::<C>(),
            type_id: TypeId::of::<C>(),
            // An overridden pod_bytes returns Some even for an empty slice.
            pod_supported: C::pod_bytes(&[]).is_some(),
            drop_fn: if mem::needs_drop::<C>() {
                Some(|ptr| unsafe { ptr::drop_in_place(ptr.cast::<C>()) })
            } else {
                None
            },
            default_in_place: default_in_place::<C>,
            clone_new: clone_new::<C>,
            clone_assign: clone_assign::<C>,
            set_entity: set_entity::<C>,
            pre_destroy: pre_destroy::<C>,
            save_cell: save_cell::<C>,
            load_cell: load_cell::<C>,
            pod_save: pod_save::<C>,
            pod_load: pod_load::<C>,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.flags
    }

    #[must_use]
    pub const fn requires(&self) -> u64 {
        self.requires
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    #[must_use]
    pub const fn align(&self) -> usize {
        self.layout.align()
    }

    /// Whether this spec describes the given type.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    #[must_use]
    pub const fn needs_drop(&self) -> bool {
        self.drop_fn.is_some()
    }

    #[must_use]
    pub const fn is_pod_serialized(&self) -> bool {
        self.flags & component_flags::SERIALIZE_AS_POD != 0
    }

    #[must_use]
    pub const fn never_serialized(&self) -> bool {
        self.flags & component_flags::NEVER_SERIALIZE != 0
    }

    #[must_use]
    pub const fn calls_pre_destroy(&self) -> bool {
        self.flags & component_flags::CALL_PRE_DESTROY != 0
    }

    #[must_use]
    pub const fn skips_clean(&self) -> bool {
        self.flags & component_flags::NO_CLEAN != 0
    }

    pub(crate) const fn pod_supported(&self) -> bool {
        self.pod_supported
    }

    /// # Safety
    /// `ptr` must point to a valid, initialized cell of this spec's type;
    /// the cell must not be used afterwards.
    pub(crate) unsafe fn drop_in_place(&self, ptr: *mut u8) {
        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(ptr) };
        }
    }

    /// # Safety
    /// `ptr` must be valid, aligned, uninitialized cell storage.
    pub(crate) unsafe fn default_in_place(&self, ptr: *mut u8) {
        unsafe { (self.default_in_place)(ptr) }
    }

    /// # Safety
    /// `dst` must be uninitialized cell storage; `src` a valid cell.
    pub(crate) unsafe fn clone_new(&self, dst: *mut u8, src: *const u8) {
        unsafe { (self.clone_new)(dst, src) }
    }

    /// # Safety
    /// `dst` and `src` must both be valid, initialized, non-overlapping
    /// cells.
    pub(crate) unsafe fn clone_assign(&self, dst: *mut u8, src: *const u8) {
        unsafe { (self.clone_assign)(dst, src) }
    }

    /// # Safety
    /// `ptr` must be a valid, initialized cell.
    pub(crate) unsafe fn set_entity(&self, ptr: *mut u8, entity: &Entity) {
        unsafe { (self.set_entity)(ptr, entity) }
    }

    /// # Safety
    /// `ptr` must be a valid, initialized cell.
    pub(crate) unsafe fn pre_destroy(&self, ptr: *mut u8) {
        unsafe { (self.pre_destroy)(ptr) }
    }

    /// # Safety
    /// `ptr` must be a valid, initialized cell.
    pub(crate) unsafe fn save_cell(
        &self,
        ptr: *const u8,
        stream: &mut dyn Stream,
        userdata: &mut dyn Any,
    ) -> EcsResult<()> {
        unsafe { (self.save_cell)(ptr, stream, userdata) }
    }

    /// # Safety
    /// `ptr` must be a valid, initialized cell.
    pub(crate) unsafe fn load_cell(
        &self,
        ptr: *mut u8,
        stream: &mut dyn Stream,
        userdata: &mut dyn Any,
        version: u8,
    ) -> EcsResult<()> {
        unsafe { (self.load_cell)(ptr, stream, userdata, version) }
    }

    /// # Safety
    /// `ptr` must point to `len` contiguous initialized cells.
    pub(crate) unsafe fn pod_save(
        &self,
        ptr: *const u8,
        len: usize,
        stream: &mut dyn Stream,
    ) -> EcsResult<()> {
        unsafe { (self.pod_save)(ptr, len, stream) }
    }

    /// # Safety
    /// `ptr` must point to `len` contiguous initialized cells.
    pub(crate) unsafe fn pod_load(
        &self,
        ptr: *mut u8,
        len: usize,
        stream: &mut dyn Stream,
    ) -> EcsResult<()> {
        unsafe { (self.pod_load)(ptr, len, stream) }
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("name", &self.name)
            .field("mask", &format_args!("{:#x}", self.mask))
            .field("version", &self.version)
            .field("flags", &format_args!("{:#x}", self.flags))
            .field("size", &self.layout.size())
            .finish()
    }
}

/// Validate one archetype's component set: non-empty, single-bit pairwise
/// disjoint masks, non-empty pairwise distinct names, POD flag consistency,
/// and every `REQUIRES` mask covered by the archetype.
pub(crate) fn validate_specs(specs: &[ComponentSpec]) -> EcsResult<()> {
    if specs.is_empty() {
        return Err(EcsError::InvalidComponentConfiguration(
            "archetype declares no components",
        ));
    }

    let mut combined = 0u64;
    for (i, spec) in specs.iter().enumerate() {
        let mask = spec.mask;
        if mask == 0 || mask & (mask - 1) != 0 {
            return Err(EcsError::InvalidComponentConfiguration(
                "component mask is not a single bit",
            ));
        }
        if combined & mask != 0 {
            return Err(EcsError::InvalidComponentConfiguration(
                "component masks overlap",
            ));
        }
        combined |= mask;

        if spec.name.is_empty() {
            return Err(EcsError::InvalidComponentConfiguration(
                "component name is empty",
            ));
        }
        if spec.name.len() > 255 {
            return Err(EcsError::InvalidComponentConfiguration(
                "component name longer than 255 bytes",
            ));
        }
        if specs[i + 1..].iter().any(|other| other.name == spec.name) {
            return Err(EcsError::InvalidComponentConfiguration(
                "duplicate component name",
            ));
        }

        if spec.is_pod_serialized() && !spec.pod_supported {
            return Err(EcsError::InvalidComponentConfiguration(
                "SERIALIZE_AS_POD set but pod_bytes is not implemented",
            ));
        }
    }

    for spec in specs {
        if spec.requires & combined != spec.requires {
            return Err(EcsError::MissingRequiredComponents(spec.name));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Health {
        current: u32,
    }

    impl Component for Health {
        const NAME: &'static str = "Health";
        const MASK: u64 = 1 << 0;

        fn default_value() -> Self {
            Self { current: 100 }
        }
    }

    #[derive(Clone)]
    struct Label {
        text: String,
    }

    impl Component for Label {
        const NAME: &'static str = "Label";
        const MASK: u64 = 1 << 1;

        fn default_value() -> Self {
            Self {
                text: String::new(),
            }
        }
    }

    #[derive(Clone)]
    struct NeedsHealth;

    impl Component for NeedsHealth {
        const NAME: &'static str = "NeedsHealth";
        const MASK: u64 = 1 << 2;
        const REQUIRES: u64 = Health::MASK;

        fn default_value() -> Self {
            Self
        }
    }

    #[test]
    fn test_spec_metadata() {
        let spec = ComponentSpec::of::<Health>();
        assert_eq!(spec.name(), "Health");
        assert_eq!(spec.mask(), 1);
        assert_eq!(spec.version(), 1);
        assert!(spec.is::<Health>());
        assert!(!spec.is::<Label>());
        assert!(!spec.needs_drop());
        assert!(ComponentSpec::of::<Label>().needs_drop());
    }

    #[test]
    fn test_default_hook_roundtrip() {
        let spec = ComponentSpec::of::<Health>();
        let mut cell = core::mem::MaybeUninit::<Health>::uninit();
        // SAFETY: writing a fresh default into uninitialized storage
        unsafe { spec.default_in_place(cell.as_mut_ptr().cast()) };
        let cell = unsafe { cell.assume_init() };
        assert_eq!(cell.current, 100);
    }

    #[test]
    fn test_validate_accepts_good_set() {
        let specs = [
            ComponentSpec::of::<Health>(),
            ComponentSpec::of::<Label>(),
            ComponentSpec::of::<NeedsHealth>(),
        ];
        assert!(validate_specs(&specs).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_set() {
        assert!(matches!(
            validate_specs(&[]),
            Err(EcsError::InvalidComponentConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlapping_masks() {
        #[derive(Clone)]
        struct AlsoBitZero;
        impl Component for AlsoBitZero {
            const NAME: &'static str = "AlsoBitZero";
            const MASK: u64 = 1 << 0;
            fn default_value() -> Self {
                Self
            }
        }

        let specs = [ComponentSpec::of::<Health>(), ComponentSpec::of::<AlsoBitZero>()];
        assert!(matches!(
            validate_specs(&specs),
            Err(EcsError::InvalidComponentConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_multi_bit_mask() {
        #[derive(Clone)]
        struct TwoBits;
        impl Component for TwoBits {
            const NAME: &'static str = "TwoBits";
            const MASK: u64 = 0b11;
            fn default_value() -> Self {
                Self
            }
        }

        assert!(matches!(
            validate_specs(&[ComponentSpec::of::<TwoBits>()]),
            Err(EcsError::InvalidComponentConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_requirement() {
        let specs = [ComponentSpec::of::<NeedsHealth>()];
        assert!(matches!(
            validate_specs(&specs),
            Err(EcsError::MissingRequiredComponents("NeedsHealth"))
        ));
    }

    #[test]
    fn test_validate_rejects_pod_flag_without_bytes() {
        #[derive(Clone)]
        struct ClaimsPod;
        impl Component for ClaimsPod {
            const NAME: &'static str = "ClaimsPod";
            const MASK: u64 = 1 << 3;
            const FLAGS: u64 = component_flags::SERIALIZE_AS_POD;
            fn default_value() -> Self {
                Self
            }
        }

        assert!(matches!(
            validate_specs(&[ComponentSpec::of::<ClaimsPod>()]),
            Err(EcsError::InvalidComponentConfiguration(_))
        ));
    }
}
