//! Type-erased callback registry for entity-bound and object-bound
//! listeners.
//!
//! A [`CallList`] holds callbacks invoked with a registry handle and a
//! shared argument value. Two shapes are supported:
//!
//! - [`EntityCall`]: bound to one component of one entity. When the entity
//!   stops validating, the stored handle is cleared and the call becomes a
//!   permanent no-op; dead listeners never fire again.
//! - [`FnCall`]: any closure; the closure owns whatever object state it
//!   needs.
//!
//! ```
//! use strata_call::CallList;
//! use strata_ecs::prelude::*;
//!
//! #[derive(Clone)]
//! struct Counter {
//!     hits: u32,
//! }
//!
//! impl Component for Counter {
//!     const NAME: &'static str = "Counter";
//!     const MASK: u64 = 1 << 0;
//!
//!     fn default_value() -> Self {
//!         Self { hits: 0 }
//!     }
//! }
//!
//! let mut ecs = Ecs::new("demo");
//! ecs.register(
//!     ArchetypeSpec::new("counters", ArchetypeId::new(1))
//!         .bounded(4)
//!         .component::<Counter>(),
//! )
//! .unwrap();
//! let entity = ecs.find_archetype_mut(Counter::MASK).unwrap().create_entity();
//!
//! let mut on_tick: CallList<u32> = CallList::new();
//! on_tick.add_entity::<Counter>(entity.clone(), |counter, amount| {
//!     counter.hits += amount;
//! });
//! on_tick.execute(&mut ecs, &2);
//! assert_eq!(ecs.component::<Counter>(&entity).unwrap().hits, 2);
//! ```

use core::marker::PhantomData;

use strata_ecs::{Component, Ecs, Entity};

/// A callback invocable with registry access and a shared argument.
pub trait Call<Args>: Send + Sync {
    /// Run the callback. Implementations decide what a dead target means.
    fn execute(&mut self, ecs: &mut Ecs, args: &Args);
}

/// A callback bound to one component of one entity.
///
/// The component is resolved through the registry at every invocation, so
/// the call observes removals: once the entity stops validating, the handle
/// is cleared and later invocations do nothing.
pub struct EntityCall<C: Component, Args> {
    entity: Entity,
    method: fn(&mut C, &Args),
    _args: PhantomData<fn(&Args)>,
}

impl<C: Component, Args> EntityCall<C, Args> {
    /// Bind `method` to a component of `entity`.
    #[must_use]
    pub fn new(entity: Entity, method: fn(&mut C, &Args)) -> Self {
        Self {
            entity,
            method,
            _args: PhantomData,
        }
    }

    /// Whether the bound entity has been observed dead.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.entity.is_empty()
    }
}

impl<C: Component, Args> Call<Args> for EntityCall<C, Args> {
    fn execute(&mut self, ecs: &mut Ecs, args: &Args) {
        if self.entity.is_empty() {
            return;
        }
        match ecs.component_mut::<C>(&self.entity) {
            Some(component) => (self.method)(component, args),
            // failed once: clear the handle so a recycled slot is never hit
            None => self.entity = Entity::empty(),
        }
    }
}

/// A callback wrapping an arbitrary closure; the closure owns its object.
pub struct FnCall<F>(pub F);

impl<Args, F> Call<Args> for FnCall<F>
where
    F: FnMut(&mut Ecs, &Args) + Send + Sync,
{
    fn execute(&mut self, ecs: &mut Ecs, args: &Args) {
        (self.0)(ecs, args)
    }
}

/// Identifies a registered call for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallId(u32);

/// An ordered list of callbacks sharing one argument type.
pub struct CallList<Args> {
    calls: Vec<(CallId, Box<dyn Call<Args>>)>,
    next_id: u32,
}

impl<Args> CallList<Args> {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_id: 0,
        }
    }

    /// Append any [`Call`] implementation.
    pub fn add(&mut self, call: impl Call<Args> + 'static) -> CallId {
        let id = CallId(self.next_id);
        self.next_id += 1;
        self.calls.push((id, Box::new(call)));
        id
    }

    /// Append an entity-bound component method.
    pub fn add_entity<C: Component>(
        &mut self,
        entity: Entity,
        method: fn(&mut C, &Args),
    ) -> CallId
    where
        Args: 'static,
    {
        self.add(EntityCall::new(entity, method))
    }

    /// Append a plain closure.
    pub fn add_fn<F>(&mut self, callback: F) -> CallId
    where
        F: FnMut(&mut Ecs, &Args) + Send + Sync + 'static,
        Args: 'static,
    {
        self.add(FnCall(callback))
    }

    /// Remove a callback by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: CallId) {
        self.calls.retain(|(call_id, _)| *call_id != id);
    }

    /// Invoke every callback in insertion order.
    pub fn execute(&mut self, ecs: &mut Ecs, args: &Args) {
        for (_, call) in &mut self.calls {
            call.execute(ecs, args);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drop all callbacks.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl<Args> Default for CallList<Args> {
    fn default() -> Self {
        Self::new()
    }
}
