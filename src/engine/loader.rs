//! Entity Loader
//!
//! Per-type runtime state for one unit of work: the scan cells a row is
//! read into, the deduplicated entities in first-arrival order, and the
//! identities already materialized.

use std::any::TypeId;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace};

use super::adapter::{SqlDialect, SqlValue};
use super::descriptor::{Entity, EntityDescriptor};
use super::error::{HydrateError, Result};
use super::registry::{Collection, EntitySet};
use super::relation::KeyPlan;
use super::value::{CompositeKey, StorageType};

/// Nullable landing spot for one projected column.
///
/// Every cell accepts NULL, whatever the destination field type, so outer
/// join misses never fail the scan.
#[derive(Debug, Clone)]
pub struct ScanCell {
    entity: &'static str,
    column: &'static str,
    storage: StorageType,
    value: SqlValue,
}

impl ScanCell {
    pub fn new(entity: &'static str, column: &'static str, storage: StorageType) -> Self {
        Self {
            entity,
            column,
            storage,
            value: SqlValue::Null,
        }
    }

    /// Store a raw driver value, coerced to the cell's storage type
    pub fn fill(&mut self, raw: SqlValue) -> Result<()> {
        self.value = self
            .storage
            .coerce(raw)
            .map_err(|source| HydrateError::Scan {
                entity: self.entity,
                column: self.column,
                source,
            })?;
        Ok(())
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn storage(&self) -> StorageType {
        self.storage
    }
}

/// Scan buffer, identity map and relationship wiring for entity type `E`
pub struct EntityLoader<E> {
    descriptor: Rc<EntityDescriptor<E>>,
    cells: Vec<ScanCell>,
    items: Vec<E>,
    identities: HashSet<CompositeKey>,
    key_indices: Vec<usize>,
    plans: Vec<KeyPlan>,
}

impl<E: Entity> EntityLoader<E> {
    /// Build a loader from `E`'s registration. Relationship key names are
    /// resolved on both sides here, so a bad registration fails before any
    /// statement runs.
    pub fn new() -> Result<Self> {
        let descriptor = E::describe();
        descriptor.validate()?;

        let cells = descriptor
            .fields()
            .iter()
            .map(|f| ScanCell::new(descriptor.name(), f.name(), f.storage()))
            .collect();

        let mut plans = Vec::with_capacity(descriptor.relations().len());
        for relation in descriptor.relations() {
            let rel = &relation.descriptor;
            if rel.foreign_key.is_empty() || rel.foreign_key.len() != rel.associated_key.len() {
                return Err(HydrateError::Descriptor {
                    entity: descriptor.name(),
                    reason: format!(
                        "relationship {:?} pairs {} foreign key field(s) with {} associated key field(s)",
                        rel.name,
                        rel.foreign_key.len(),
                        rel.associated_key.len()
                    ),
                });
            }
            plans.push(KeyPlan {
                foreign: descriptor.field_indices(&rel.foreign_key)?,
                associated: relation.link.target_indices(&rel.associated_key)?,
            });
        }

        Ok(Self {
            key_indices: descriptor.key_indices(),
            descriptor: Rc::new(descriptor),
            cells,
            items: Vec::new(),
            identities: HashSet::new(),
            plans,
        })
    }

    pub fn descriptor(&self) -> &EntityDescriptor<E> {
        &self.descriptor
    }

    /// Qualified column list in cell order. An empty alias falls back to
    /// the descriptor name.
    pub fn projection(&self, alias: &str, dialect: SqlDialect, quote: bool) -> Vec<String> {
        let qualifier = if alias.is_empty() {
            self.descriptor.name()
        } else {
            alias
        };
        self.descriptor
            .fields()
            .iter()
            .map(|f| dialect.qualify(qualifier, f.name(), quote))
            .collect()
    }

    pub fn cells_mut(&mut self) -> &mut [ScanCell] {
        &mut self.cells
    }

    /// Materialize the entity held in the scan cells, if there is a new one.
    /// Returns `true` when an entity was added.
    pub fn process_row(&mut self) -> Result<bool> {
        let key = self
            .key_indices
            .iter()
            .map(|&i| self.cells[i].value().clone())
            .collect();
        let Some(identity) = CompositeKey::from_values(key) else {
            return Ok(false);
        };

        if self.identities.contains(&identity) {
            trace!(entity = self.descriptor.name(), key = %identity, "already materialized");
            return Ok(false);
        }

        let mut entity = E::default();
        for (field, cell) in self.descriptor.fields().iter().zip(&self.cells) {
            if cell.is_null() {
                continue;
            }
            field
                .write(&mut entity, cell.value().clone())
                .map_err(|source| HydrateError::Scan {
                    entity: self.descriptor.name(),
                    column: field.name(),
                    source,
                })?;
        }

        self.items.push(entity);
        self.identities.insert(identity);
        Ok(true)
    }

    /// Wire every relationship against `set`. Returns the number of
    /// owner/relationship pairs that received at least one target.
    pub fn finalize(&mut self, set: &EntitySet) -> usize {
        let mut linked = 0;
        for (relation, plan) in self.descriptor.relations().iter().zip(&self.plans) {
            if !set.contains_type(relation.link.target_type()) {
                debug!(
                    entity = self.descriptor.name(),
                    relationship = relation.descriptor.name,
                    "target not loaded, relationship left empty"
                );
                continue;
            }
            linked += relation
                .link
                .resolve(&mut self.items, &self.descriptor, plan, set);
        }
        linked
    }

    /// Entities in first-arrival order
    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn into_items(self) -> Vec<E> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn collection(&self, items: Vec<Arc<E>>) -> Collection<E> {
        Collection::new(items, Rc::clone(&self.descriptor))
    }
}

/// Object-safe view of an [`EntityLoader`] used by the registry
pub(crate) trait Loader {
    fn entity_type(&self) -> TypeId;
    fn name(&self) -> &'static str;
    fn projection(&self, alias: &str, dialect: SqlDialect, quote: bool) -> Vec<String>;
    fn cells_mut(&mut self) -> &mut [ScanCell];
    fn width(&self) -> usize;
    fn process_row(&mut self) -> Result<bool>;
    /// Types this loader's relationships point at
    fn targets(&self) -> Vec<TypeId>;
    fn finalize(&mut self, set: &EntitySet) -> usize;
    /// Insert a copy of the current, possibly unwired, entities into `set`
    fn snapshot(&self, set: &mut EntitySet);
    /// Move the entities into `set`, replacing any snapshot
    fn publish(&mut self, set: &mut EntitySet);
    fn len(&self) -> usize;
}

impl<E: Entity> Loader for EntityLoader<E> {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    fn projection(&self, alias: &str, dialect: SqlDialect, quote: bool) -> Vec<String> {
        EntityLoader::projection(self, alias, dialect, quote)
    }

    fn cells_mut(&mut self) -> &mut [ScanCell] {
        EntityLoader::cells_mut(self)
    }

    fn width(&self) -> usize {
        self.cells.len()
    }

    fn process_row(&mut self) -> Result<bool> {
        EntityLoader::process_row(self)
    }

    fn targets(&self) -> Vec<TypeId> {
        self.descriptor
            .relations()
            .iter()
            .map(|r| r.link.target_type())
            .collect()
    }

    fn finalize(&mut self, set: &EntitySet) -> usize {
        EntityLoader::finalize(self, set)
    }

    fn snapshot(&self, set: &mut EntitySet) {
        let items = self.items.iter().cloned().map(Arc::new).collect();
        set.insert(self.collection(items));
    }

    fn publish(&mut self, set: &mut EntitySet) {
        let items = std::mem::take(&mut self.items)
            .into_iter()
            .map(Arc::new)
            .collect();
        set.insert(self.collection(items));
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Constructor stored in a query's model list
pub(crate) fn boxed<E: Entity>() -> Result<Box<dyn Loader>> {
    Ok(Box::new(EntityLoader::<E>::new()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::scan_row;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Child {
        id: i64,
        parent_id: i64,
        name: String,
    }

    #[derive(Debug, Clone, Default)]
    struct Parent {
        id: i64,
        name: String,
        children: Vec<Child>,
    }

    impl Entity for Child {
        fn describe() -> EntityDescriptor<Self> {
            Self::descriptor("children")
                .key("id", |c| &c.id, |c| &mut c.id)
                .field("parent_id", |c| &c.parent_id, |c| &mut c.parent_id)
                .field("name", |c| &c.name, |c| &mut c.name)
        }
    }

    impl Entity for Parent {
        fn describe() -> EntityDescriptor<Self> {
            Self::descriptor("parents")
                .key("id", |p| &p.id, |p| &mut p.id)
                .field("name", |p| &p.name, |p| &mut p.name)
                .relation("children", &["id"], &["parent_id"], |p| &mut p.children)
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Mismatched {
        id: i64,
        others: Vec<Child>,
    }

    impl Entity for Mismatched {
        fn describe() -> EntityDescriptor<Self> {
            Self::descriptor("mismatched")
                .key("id", |m| &m.id, |m| &mut m.id)
                .relation("others", &["id"], &["parent_id", "name"], |m| &mut m.others)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Grade {
        id: i64,
        school_id: i64,
        student_id: i64,
        score: i64,
    }

    #[derive(Debug, Clone, Default)]
    struct Enrollment {
        school_id: i64,
        student_id: i64,
        grades: Vec<Grade>,
        best: Option<Arc<Grade>>,
    }

    impl Entity for Grade {
        fn describe() -> EntityDescriptor<Self> {
            Self::descriptor("grades")
                .key("id", |g| &g.id, |g| &mut g.id)
                .field("school_id", |g| &g.school_id, |g| &mut g.school_id)
                .field("student_id", |g| &g.student_id, |g| &mut g.student_id)
                .field("score", |g| &g.score, |g| &mut g.score)
        }
    }

    impl Entity for Enrollment {
        fn describe() -> EntityDescriptor<Self> {
            const PAIR: &[&str] = &["school_id", "student_id"];
            Self::descriptor("enrollments")
                .key("school_id", |e| &e.school_id, |e| &mut e.school_id)
                .key("student_id", |e| &e.student_id, |e| &mut e.student_id)
                .relation("grades", PAIR, PAIR, |e| &mut e.grades)
                .relation("best", PAIR, PAIR, |e| &mut e.best)
        }
    }

    fn feed(
        parents: &mut EntityLoader<Parent>,
        children: &mut EntityLoader<Child>,
        rows: &[Vec<SqlValue>],
    ) {
        for row in rows {
            scan_row(row, 0, parents.cells_mut()).unwrap();
            scan_row(row, 2, children.cells_mut()).unwrap();
            parents.process_row().unwrap();
            children.process_row().unwrap();
        }
    }

    fn row(parent: (i64, &str), child: Option<(i64, i64, &str)>) -> Vec<SqlValue> {
        let mut row = vec![SqlValue::Integer(parent.0), SqlValue::Text(parent.1.into())];
        match child {
            Some((id, parent_id, name)) => row.extend([
                SqlValue::Integer(id),
                SqlValue::Integer(parent_id),
                SqlValue::Text(name.into()),
            ]),
            None => row.extend([SqlValue::Null, SqlValue::Null, SqlValue::Null]),
        }
        row
    }

    #[test]
    fn test_projection_uses_alias_or_table_name() {
        let loader = EntityLoader::<Child>::new().unwrap();
        assert_eq!(
            loader.projection("c", SqlDialect::Sqlite, false),
            vec!["c.id", "c.parent_id", "c.name"]
        );
        assert_eq!(
            loader.projection("", SqlDialect::Sqlite, true)[0],
            "\"children\".\"id\""
        );
    }

    #[test]
    fn test_left_join_fan_out() {
        let mut parents = EntityLoader::<Parent>::new().unwrap();
        let mut children = EntityLoader::<Child>::new().unwrap();
        feed(
            &mut parents,
            &mut children,
            &[
                row((1, "P1"), Some((1, 1, "C1"))),
                row((1, "P1"), Some((2, 1, "C2"))),
                row((1, "P1"), None),
            ],
        );

        assert_eq!(parents.len(), 1);
        assert_eq!(children.len(), 2);

        let mut set = EntitySet::default();
        Loader::publish(&mut children, &mut set);
        assert_eq!(parents.finalize(&set), 1);

        let parent = &parents.items()[0];
        assert_eq!(parent.name, "P1");
        let names: Vec<_> = parent.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C1", "C2"]);
    }

    #[test]
    fn test_dedup_counts_distinct_keys() {
        let mut children = EntityLoader::<Child>::new().unwrap();
        for id in [3, 1, 3, 2, 1, 3] {
            let row = vec![SqlValue::Integer(id), SqlValue::Integer(9), SqlValue::Text("x".into())];
            scan_row(&row, 0, children.cells_mut()).unwrap();
            children.process_row().unwrap();
        }
        let ids: Vec<_> = children.items().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_null_key_materializes_nothing() {
        let mut children = EntityLoader::<Child>::new().unwrap();
        let row = vec![SqlValue::Null, SqlValue::Integer(1), SqlValue::Text("ghost".into())];
        scan_row(&row, 0, children.cells_mut()).unwrap();
        assert!(!children.process_row().unwrap());
        assert!(children.is_empty());
    }

    #[test]
    fn test_null_non_key_field_stays_default() {
        let mut children = EntityLoader::<Child>::new().unwrap();
        let row = vec![SqlValue::Integer(4), SqlValue::Null, SqlValue::Null];
        scan_row(&row, 0, children.cells_mut()).unwrap();
        assert!(children.process_row().unwrap());
        assert_eq!(
            children.into_items(),
            vec![Child {
                id: 4,
                ..Child::default()
            }]
        );
    }

    #[test]
    fn test_missing_target_leaves_relationship_empty() {
        let mut parents = EntityLoader::<Parent>::new().unwrap();
        let row = vec![SqlValue::Integer(1), SqlValue::Text("P1".into())];
        scan_row(&row, 0, parents.cells_mut()).unwrap();
        parents.process_row().unwrap();

        assert_eq!(parents.finalize(&EntitySet::default()), 0);
        assert!(parents.items()[0].children.is_empty());
    }

    #[test]
    fn test_composite_key_dedup_and_join() {
        let mut enrollments = EntityLoader::<Enrollment>::new().unwrap();
        for (school, student) in [(1, 1), (1, 1), (1, 2), (2, 1), (1, 2)] {
            let row = [SqlValue::Integer(school), SqlValue::Integer(student)];
            scan_row(&row, 0, enrollments.cells_mut()).unwrap();
            enrollments.process_row().unwrap();
        }
        assert_eq!(enrollments.len(), 3);

        let mut grades = EntityLoader::<Grade>::new().unwrap();
        // (2, 2) shares a component with two enrollments but matches neither
        let scores = [(10, 1, 1, 90), (11, 1, 1, 80), (12, 2, 1, 70), (13, 2, 2, 60)];
        for (id, school, student, score) in scores {
            let row = [
                SqlValue::Integer(id),
                SqlValue::Integer(school),
                SqlValue::Integer(student),
                SqlValue::Integer(score),
            ];
            scan_row(&row, 0, grades.cells_mut()).unwrap();
            grades.process_row().unwrap();
        }

        let mut set = EntitySet::default();
        Loader::publish(&mut grades, &mut set);
        enrollments.finalize(&set);

        let items = enrollments.items();
        let keys: Vec<_> = items.iter().map(|e| (e.school_id, e.student_id)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);

        let grade_ids = |e: &Enrollment| e.grades.iter().map(|g| g.id).collect::<Vec<_>>();
        assert_eq!(grade_ids(&items[0]), vec![10, 11]);
        assert!(items[1].grades.is_empty());
        assert_eq!(grade_ids(&items[2]), vec![12]);

        // Single slot keeps the first arrival among several matches
        let best = items[0].best.as_ref().unwrap();
        assert_eq!(best.id, 10);
        assert!(Arc::ptr_eq(best, &set.get::<Grade>().unwrap()[0]));
        assert!(items[1].best.is_none());
        assert_eq!(items[2].best.as_ref().map(|g| g.score), Some(70));
    }

    #[test]
    fn test_key_arity_mismatch_is_rejected() {
        let err = EntityLoader::<Mismatched>::new().err().unwrap();
        assert!(matches!(err, HydrateError::Descriptor { entity: "mismatched", .. }));
    }
}
