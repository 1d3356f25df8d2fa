//! Entity registration metadata
//!
//! Every hydratable type registers once through [`Entity::describe`]: the
//! scanned columns in projection order (with accessor pairs), which of them
//! form the primary key, and the relationships to other entity types.

use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::fmt;

use super::adapter::SqlValue;
use super::error::{ConversionError, HydrateError, Result};
use super::field::SqlField;
use super::relation::{Link, RelationSlot, SlotLink};
use super::value::{CompositeKey, StorageType};

/// A type that can be materialized from query rows
pub trait Entity: Default + Clone + 'static {
    fn describe() -> EntityDescriptor<Self>;

    /// Empty registration for `Self`, named after its table. Start
    /// `describe` here so the accessor closures know their entity type:
    ///
    /// ```ignore
    /// fn describe() -> EntityDescriptor<Self> {
    ///     Self::descriptor("authors")
    ///         .key("id", |a| &a.id, |a| &mut a.id)
    ///         .field("name", |a| &a.name, |a| &mut a.name)
    /// }
    /// ```
    fn descriptor(name: &'static str) -> EntityDescriptor<Self> {
        EntityDescriptor::new(name)
    }
}

/// Relationship cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one target (`Option<_>` slot), first arrival wins
    Single,
    /// Every matching target in arrival order (`Vec<_>` slot)
    Many,
}

/// How a target is stored in the owning slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// An owned clone of the target
    Value,
    /// An `Arc` shared with every other holder of the same target
    Shared,
}

/// One scanned column and the accessors that move it in and out of `E`
pub struct ScanField<E> {
    name: &'static str,
    storage: StorageType,
    primary_key: bool,
    nullable: bool,
    read: Box<dyn Fn(&E) -> SqlValue>,
    write: Box<dyn Fn(&mut E, SqlValue) -> std::result::Result<(), ConversionError>>,
}

impl<E> ScanField<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn read(&self, entity: &E) -> SqlValue {
        (self.read)(entity)
    }

    pub fn write(
        &self,
        entity: &mut E,
        value: SqlValue,
    ) -> std::result::Result<(), ConversionError> {
        (self.write)(entity, value)
    }
}

impl<E> fmt::Debug for ScanField<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanField")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("primary_key", &self.primary_key)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// Static shape of a relationship, independent of the owning type
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipDescriptor {
    /// Name of the relationship field on the owner
    pub name: &'static str,

    /// Rust type name of the target entity
    pub target: &'static str,

    #[serde(skip)]
    pub target_type: TypeId,

    pub cardinality: Cardinality,

    pub representation: Representation,

    /// Owner-side fields, compared in order with `associated_key`
    pub foreign_key: Vec<&'static str>,

    /// Target-side fields
    pub associated_key: Vec<&'static str>,
}

pub(crate) struct Relation<E> {
    pub(crate) descriptor: RelationshipDescriptor,
    pub(crate) link: Box<dyn Link<E>>,
}

/// Registration of an entity type
pub struct EntityDescriptor<E> {
    name: &'static str,
    fields: Vec<ScanField<E>>,
    relations: Vec<Relation<E>>,
}

impl<E: Entity> EntityDescriptor<E> {
    /// `name` is the table name, used as the column qualifier when a query
    /// registers the entity without an alias.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a primary-key column. Composite keys are formed from every `key`
    /// call, in registration order.
    pub fn key<T: SqlField + 'static>(
        self,
        column: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.push_field(column, true, get, get_mut)
    }

    /// Add a plain column
    pub fn field<T: SqlField + 'static>(
        self,
        column: &'static str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.push_field(column, false, get, get_mut)
    }

    fn push_field<T: SqlField + 'static>(
        mut self,
        column: &'static str,
        primary_key: bool,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.fields.push(ScanField {
            name: column,
            storage: T::STORAGE,
            primary_key,
            nullable: T::NULLABLE,
            read: Box::new(move |entity: &E| get(entity).to_value()),
            write: Box::new(move |entity: &mut E, value: SqlValue| {
                *get_mut(entity) = T::from_value(value)?;
                Ok(())
            }),
        });
        self
    }

    /// Add a relationship whose slot is `Vec<T>`, `Vec<Arc<T>>`, `Option<T>`
    /// or `Option<Arc<T>>`.
    ///
    /// The owner's `foreign_key` columns are matched, in order, against the
    /// target's `associated_key` columns. For a parent holding its children
    /// that is the parent id on the owner side and the child's parent id on
    /// the target side.
    pub fn relation<S: RelationSlot + 'static>(
        mut self,
        name: &'static str,
        foreign_key: &[&'static str],
        associated_key: &[&'static str],
        slot: fn(&mut E) -> &mut S,
    ) -> Self {
        self.relations.push(Relation {
            descriptor: RelationshipDescriptor {
                name,
                target: type_name::<S::Target>(),
                target_type: TypeId::of::<S::Target>(),
                cardinality: S::CARDINALITY,
                representation: S::REPRESENTATION,
                foreign_key: foreign_key.to_vec(),
                associated_key: associated_key.to_vec(),
            },
            link: Box::new(SlotLink::new(slot)),
        });
        self
    }
}

impl<E> EntityDescriptor<E> {
    /// Default display name (the table name)
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[ScanField<E>] {
        &self.fields
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDescriptor> {
        self.relations.iter().map(|r| &r.descriptor)
    }

    pub(crate) fn relations(&self) -> &[Relation<E>] {
        &self.relations
    }

    /// Positions of the primary-key fields
    pub fn key_indices(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve column names to field positions
    pub fn field_indices(&self, names: &[&'static str]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.fields
                    .iter()
                    .position(|f| f.name == *name)
                    .ok_or_else(|| HydrateError::Descriptor {
                        entity: self.name,
                        reason: format!("no scanned field named {:?}", name),
                    })
            })
            .collect()
    }

    /// Key built from the fields at `indices`; `None` if any of them is NULL
    pub fn key_of(&self, entity: &E, indices: &[usize]) -> Option<CompositeKey> {
        CompositeKey::from_values(indices.iter().map(|&i| self.fields[i].read(entity)).collect())
    }

    /// Check the registration is usable: at least one primary key column and
    /// no column registered twice.
    pub fn validate(&self) -> Result<()> {
        if !self.fields.iter().any(|f| f.primary_key) {
            return Err(HydrateError::Descriptor {
                entity: self.name,
                reason: "no primary key field registered".to_string(),
            });
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(HydrateError::Descriptor {
                    entity: self.name,
                    reason: format!("field {:?} registered more than once", field.name),
                });
            }
        }

        Ok(())
    }
}

impl<E> fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field(
                "relations",
                &self.relations.iter().map(|r| &r.descriptor).collect::<Vec<_>>(),
            )
            .finish()
    }
}
