//! Loader registry and finalized entity sets
//!
//! A [`LoaderRegistry`] owns one loader per entity type for a unit of work.
//! A single query gets a fresh one; a multi query threads one registry
//! through every step so identities accumulate. [`LoaderRegistry::finalize`]
//! wires relationships once and hands back an [`EntitySet`].

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use super::descriptor::{Entity, EntityDescriptor};
use super::error::{HydrateError, Result};
use super::loader::{self, Loader};

/// One `(entity type, alias)` registration on a query
#[derive(Clone)]
pub(crate) struct Model {
    pub(crate) entity: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) alias: String,
    create: fn() -> Result<Box<dyn Loader>>,
}

impl Model {
    pub(crate) fn of<E: Entity>(alias: &str) -> Self {
        Self {
            entity: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            alias: alias.to_string(),
            create: loader::boxed::<E>,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.type_name)
            .field("alias", &self.alias)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Entity type to loader map shared by the steps of a unit of work
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn Loader>>,
    by_type: HashMap<TypeId, usize>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader positions for `models`, creating loaders for types seen for
    /// the first time. A type listed twice in one model list is an error.
    pub(crate) fn resolve(&mut self, models: &[Model]) -> Result<Vec<usize>> {
        let mut seen = HashSet::with_capacity(models.len());
        let mut indices = Vec::with_capacity(models.len());

        for model in models {
            if !seen.insert(model.entity) {
                return Err(HydrateError::Descriptor {
                    entity: model.type_name,
                    reason: "registered more than once in one query".to_string(),
                });
            }

            let index = match self.by_type.get(&model.entity) {
                Some(&index) => index,
                None => {
                    let loader = (model.create)()?;
                    self.loaders.push(loader);
                    let index = self.loaders.len() - 1;
                    self.by_type.insert(model.entity, index);
                    index
                }
            };
            indices.push(index);
        }

        Ok(indices)
    }

    pub(crate) fn loader(&self, index: usize) -> &dyn Loader {
        self.loaders[index].as_ref()
    }

    pub(crate) fn loader_mut(&mut self, index: usize) -> &mut dyn Loader {
        self.loaders[index].as_mut()
    }

    /// Number of entity types with a loader
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Entities materialized so far, summed over every loader
    pub fn entity_count(&self) -> usize {
        self.loaders.iter().map(|l| l.len()).sum()
    }

    /// Resolve every loader's relationships exactly once and collect the
    /// results.
    ///
    /// Loaders are finalized targets first, so an owner always receives its
    /// targets fully wired. Where relationships form a cycle, the edge that
    /// closes it sees the target as it was scanned.
    pub fn finalize(mut self) -> EntitySet {
        let order = self.finalize_order();
        let mut published = vec![false; self.loaders.len()];
        let mut set = EntitySet::default();

        for index in order {
            for target in self.loaders[index].targets() {
                if let Some(&t) = self.by_type.get(&target) {
                    if !published[t] {
                        self.loaders[t].snapshot(&mut set);
                    }
                }
            }

            let loader = &mut self.loaders[index];
            let linked = loader.finalize(&set);
            debug!(
                entity = loader.name(),
                entities = loader.len(),
                linked,
                "loader finalized"
            );
            loader.publish(&mut set);
            published[index] = true;
        }

        set
    }

    fn finalize_order(&self) -> Vec<usize> {
        let mut state = vec![Visit::New; self.loaders.len()];
        let mut order = Vec::with_capacity(self.loaders.len());
        for index in 0..self.loaders.len() {
            self.visit(index, &mut state, &mut order);
        }
        order
    }

    fn visit(&self, index: usize, state: &mut [Visit], order: &mut Vec<usize>) {
        if state[index] != Visit::New {
            return;
        }
        state[index] = Visit::Active;
        for target in self.loaders[index].targets() {
            if let Some(&t) = self.by_type.get(&target) {
                self.visit(t, state, order);
            }
        }
        state[index] = Visit::Done;
        order.push(index);
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.loaders.iter().map(|l| (l.name(), l.len())))
            .finish()
    }
}

/// Finalized entities of one type, in first-arrival order
pub(crate) struct Collection<E> {
    items: Vec<Arc<E>>,
    descriptor: Rc<EntityDescriptor<E>>,
}

impl<E> Collection<E> {
    pub(crate) fn new(items: Vec<Arc<E>>, descriptor: Rc<EntityDescriptor<E>>) -> Self {
        Self { items, descriptor }
    }

    pub(crate) fn items(&self) -> &[Arc<E>] {
        &self.items
    }

    pub(crate) fn descriptor(&self) -> &EntityDescriptor<E> {
        &self.descriptor
    }
}

/// Finalized entity collections keyed by entity type
#[derive(Default)]
pub struct EntitySet {
    collections: HashMap<TypeId, Box<dyn Any>>,
}

impl EntitySet {
    pub(crate) fn insert<E: Entity>(&mut self, collection: Collection<E>) {
        self.collections
            .insert(TypeId::of::<E>(), Box::new(collection));
    }

    pub(crate) fn collection<E: Entity>(&self) -> Option<&Collection<E>> {
        self.collections
            .get(&TypeId::of::<E>())
            .and_then(|c| c.downcast_ref::<Collection<E>>())
    }

    /// Every loaded `E`, or `None` when no loader produced the type
    pub fn get<E: Entity>(&self) -> Option<&[Arc<E>]> {
        self.collection::<E>().map(Collection::items)
    }

    /// First `E` in arrival order
    pub fn first<E: Entity>(&self) -> Option<&Arc<E>> {
        self.get::<E>().and_then(|items| items.first())
    }

    /// Owned clones of every loaded `E`
    pub fn to_vec<E: Entity>(&self) -> Vec<E> {
        self.get::<E>()
            .map(|items| items.iter().map(|e| E::clone(e)).collect())
            .unwrap_or_default()
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.contains_type(TypeId::of::<E>())
    }

    pub fn contains_type(&self, entity: TypeId) -> bool {
        self.collections.contains_key(&entity)
    }

    /// Number of entity types present
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySet")
            .field("types", &self.collections.len())
            .finish()
    }
}
