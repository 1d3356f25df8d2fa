//! Output Binder
//!
//! Outputs are bound (write access acquired, entity type resolved) before
//! any statement runs, and filled only after the unit of work finalized.

use std::any::{type_name, TypeId};
use std::cell::RefCell;
use std::ops::DerefMut;
use std::rc::Rc;
use std::sync::{Arc, Mutex, TryLockError};

use tracing::debug;

use super::error::{HydrateError, Result};
use super::registry::EntitySet;
use super::relation::Handle;

/// A location that receives finalized entities of one type.
///
/// `Vec<E>` and `Vec<Arc<E>>` receive every entity in arrival order;
/// `Option<E>` and `Option<Arc<E>>` receive the first one.
pub trait Destination {
    type Element: Handle;

    fn receive(&mut self, items: &[Arc<<Self::Element as Handle>::Entity>]);
}

impl<H: Handle> Destination for Vec<H> {
    type Element = H;

    fn receive(&mut self, items: &[Arc<H::Entity>]) {
        self.extend(items.iter().map(H::from_shared));
    }
}

impl<H: Handle> Destination for Option<H> {
    type Element = H;

    fn receive(&mut self, items: &[Arc<H::Entity>]) {
        if let Some(first) = items.first() {
            *self = Some(H::from_shared(first));
        }
    }
}

/// An output destination with write access already acquired
pub trait Bound {
    /// Entity type the destination accepts
    fn entity_type(&self) -> TypeId;

    fn destination(&self) -> &'static str;

    /// Copy matching entities in. `false` when `set` has no entities of the
    /// destination's type, in which case the destination is not touched.
    fn fill(&mut self, set: &EntitySet) -> bool;
}

/// Anything `Query::run` can write results into
pub trait Output {
    fn bind(&mut self) -> Result<Box<dyn Bound + '_>>;
}

struct Binding<G> {
    guard: G,
}

impl<G> Bound for Binding<G>
where
    G: DerefMut,
    G::Target: Destination,
{
    fn entity_type(&self) -> TypeId {
        TypeId::of::<<<G::Target as Destination>::Element as Handle>::Entity>()
    }

    fn destination(&self) -> &'static str {
        type_name::<G::Target>()
    }

    fn fill(&mut self, set: &EntitySet) -> bool {
        match set.get::<<<G::Target as Destination>::Element as Handle>::Entity>() {
            Some(items) => {
                self.guard.receive(items);
                true
            }
            None => false,
        }
    }
}

impl<D: Destination> Output for D {
    fn bind(&mut self) -> Result<Box<dyn Bound + '_>> {
        Ok(Box::new(Binding { guard: self }))
    }
}

impl<D: Destination> Output for Rc<RefCell<D>> {
    fn bind(&mut self) -> Result<Box<dyn Bound + '_>> {
        let guard = self.try_borrow_mut().map_err(|_| HydrateError::Binding {
            destination: type_name::<D>(),
            reason: "already borrowed".to_string(),
        })?;
        Ok(Box::new(Binding { guard }))
    }
}

impl<D: Destination> Output for Arc<Mutex<D>> {
    fn bind(&mut self) -> Result<Box<dyn Bound + '_>> {
        let guard = self.try_lock().map_err(|err| HydrateError::Binding {
            destination: type_name::<D>(),
            reason: match err {
                TryLockError::Poisoned(_) => "lock poisoned".to_string(),
                TryLockError::WouldBlock => "already locked".to_string(),
            },
        })?;
        Ok(Box::new(Binding { guard }))
    }
}

/// Bind every output, failing on the first one that can not be written.
pub(crate) fn bind_all<'a>(outputs: &'a mut [&mut dyn Output]) -> Result<Vec<Box<dyn Bound + 'a>>> {
    outputs.iter_mut().map(|output| output.bind()).collect()
}

pub(crate) fn fill_all(bindings: &mut [Box<dyn Bound + '_>], set: &EntitySet) {
    for binding in bindings.iter_mut() {
        if !binding.fill(set) {
            debug!(
                destination = binding.destination(),
                entity_type = ?binding.entity_type(),
                "no entities of this type were loaded, output left untouched"
            );
        }
    }
}
