//! Relationship slots and foreign-key resolution
//!
//! A relationship slot is a field on the owning entity whose type says both
//! how many targets it holds (`Vec` vs `Option`) and in which form (an owned
//! clone vs a shared `Arc`). Resolution happens once per unit of work, after
//! every row has been scanned, by joining the owner's foreign-key values
//! against the target collection's associated-key values.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::descriptor::{Cardinality, Entity, EntityDescriptor, Representation};
use super::error::Result;
use super::registry::EntitySet;
use super::value::CompositeKey;

/// Element form of a relationship slot or output container: `E` or `Arc<E>`
pub trait Handle: Sized {
    type Entity: Entity;
    const REPRESENTATION: Representation;

    fn from_shared(shared: &Arc<Self::Entity>) -> Self;
}

impl<E: Entity> Handle for E {
    type Entity = E;
    const REPRESENTATION: Representation = Representation::Value;

    fn from_shared(shared: &Arc<E>) -> Self {
        E::clone(shared)
    }
}

impl<E: Entity> Handle for Arc<E> {
    type Entity = E;
    const REPRESENTATION: Representation = Representation::Shared;

    fn from_shared(shared: &Arc<E>) -> Self {
        Arc::clone(shared)
    }
}

/// A field on an owning entity that receives related targets
pub trait RelationSlot {
    type Target: Entity;
    const CARDINALITY: Cardinality;
    const REPRESENTATION: Representation;

    fn attach(&mut self, target: &Arc<Self::Target>);
}

impl<H: Handle> RelationSlot for Vec<H> {
    type Target = H::Entity;
    const CARDINALITY: Cardinality = Cardinality::Many;
    const REPRESENTATION: Representation = H::REPRESENTATION;

    fn attach(&mut self, target: &Arc<Self::Target>) {
        self.push(H::from_shared(target));
    }
}

impl<H: Handle> RelationSlot for Option<H> {
    type Target = H::Entity;
    const CARDINALITY: Cardinality = Cardinality::Single;
    const REPRESENTATION: Representation = H::REPRESENTATION;

    fn attach(&mut self, target: &Arc<Self::Target>) {
        *self = Some(H::from_shared(target));
    }
}

/// Field positions a relationship joins on, resolved once per loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyPlan {
    /// Owner-side field positions
    pub(crate) foreign: Vec<usize>,
    /// Target-side field positions
    pub(crate) associated: Vec<usize>,
}

/// Type-erased relationship wiring for owner type `E`
pub(crate) trait Link<E> {
    fn target_type(&self) -> TypeId;

    /// Resolve target-side column names against the target's registration
    fn target_indices(&self, names: &[&'static str]) -> Result<Vec<usize>>;

    /// Wire every owner; returns how many owners received at least one target.
    /// A target type missing from `set` leaves every slot untouched.
    fn resolve(
        &self,
        owners: &mut [E],
        owner: &EntityDescriptor<E>,
        plan: &KeyPlan,
        set: &EntitySet,
    ) -> usize;
}

pub(crate) struct SlotLink<E, S> {
    slot: fn(&mut E) -> &mut S,
}

impl<E, S> SlotLink<E, S> {
    pub(crate) fn new(slot: fn(&mut E) -> &mut S) -> Self {
        Self { slot }
    }
}

impl<E: Entity, S: RelationSlot> Link<E> for SlotLink<E, S> {
    fn target_type(&self) -> TypeId {
        TypeId::of::<S::Target>()
    }

    fn target_indices(&self, names: &[&'static str]) -> Result<Vec<usize>> {
        S::Target::describe().field_indices(names)
    }

    fn resolve(
        &self,
        owners: &mut [E],
        owner: &EntityDescriptor<E>,
        plan: &KeyPlan,
        set: &EntitySet,
    ) -> usize {
        let Some(targets) = set.collection::<S::Target>() else {
            return 0;
        };

        let mut lookup: HashMap<CompositeKey, Vec<usize>> = HashMap::new();
        for (i, target) in targets.items().iter().enumerate() {
            if let Some(key) = targets.descriptor().key_of(target, &plan.associated) {
                lookup.entry(key).or_default().push(i);
            }
        }

        let mut linked = 0;
        for item in owners.iter_mut() {
            let Some(key) = owner.key_of(item, &plan.foreign) else {
                continue;
            };
            let Some(matches) = lookup.get(&key) else {
                continue;
            };

            trace!(owner = owner.name(), key = %key, matches = matches.len(), "linking");
            let slot = (self.slot)(item);
            match S::CARDINALITY {
                Cardinality::Many => {
                    for &i in matches {
                        slot.attach(&targets.items()[i]);
                    }
                }
                Cardinality::Single => {
                    if let Some(&first) = matches.first() {
                        slot.attach(&targets.items()[first]);
                    }
                }
            }
            linked += 1;
        }

        linked
    }
}
