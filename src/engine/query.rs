//! Query Orchestrator
//!
//! A [`Query`] pairs a caller-written fragment (everything from `FROM` on)
//! with the entity types it should hydrate. The projection is computed
//! from the registrations and prepended, so the caller never writes a
//! column list.

use std::fmt;

use tracing::{debug, debug_span};

use super::adapter::{RowCursor, RowExecutor, SqlValue};
use super::context::RunContext;
use super::descriptor::Entity;
use super::error::Result;
use super::output::{self, Output};
use super::registry::{EntitySet, LoaderRegistry, Model};

#[derive(Clone)]
pub struct Query<'e> {
    executor: &'e dyn RowExecutor,
    fragment: String,
    args: Vec<SqlValue>,
    models: Vec<Model>,
}

impl<'e> Query<'e> {
    /// `fragment` starts at `FROM`; joins, filters and a deterministic
    /// `ORDER BY` are the caller's.
    pub fn new(executor: &'e dyn RowExecutor, fragment: impl Into<String>) -> Self {
        Self {
            executor,
            fragment: fragment.into(),
            args: Vec::new(),
            models: Vec::new(),
        }
    }

    /// Append one positional parameter
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Hydrate `E` from the columns qualified by `alias`. An empty alias
    /// means the entity's table name.
    pub fn model<E: Entity>(mut self, alias: &str) -> Self {
        self.models.push(Model::of::<E>(alias));
        self
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    pub(crate) fn models(&self) -> &[Model] {
        &self.models
    }

    /// The full statement this query runs
    pub fn to_sql(&self) -> Result<String> {
        let mut registry = LoaderRegistry::new();
        let indices = registry.resolve(&self.models)?;
        Ok(self.select(&registry, &indices))
    }

    /// Run the query and write the results into `outputs`.
    ///
    /// Outputs are bound before the statement executes; an output that can
    /// not be written fails the run without touching the database. On any
    /// error no output is modified.
    pub fn run(&self, ctx: &RunContext, outputs: &mut [&mut dyn Output]) -> Result<()> {
        let mut bindings = output::bind_all(outputs)?;
        let set = self.load(ctx)?;
        output::fill_all(&mut bindings, &set);
        Ok(())
    }

    /// Run the query and return every hydrated collection
    pub fn load(&self, ctx: &RunContext) -> Result<EntitySet> {
        let mut registry = LoaderRegistry::new();
        self.execute(ctx, &mut registry)?;
        Ok(registry.finalize())
    }

    /// Scan this query's rows into `registry` without finalizing.
    /// Returns the number of rows read.
    pub fn execute(&self, ctx: &RunContext, registry: &mut LoaderRegistry) -> Result<usize> {
        let indices = registry.resolve(&self.models)?;
        self.execute_resolved(ctx, registry, &indices)
    }

    pub(crate) fn execute_resolved(
        &self,
        ctx: &RunContext,
        registry: &mut LoaderRegistry,
        indices: &[usize],
    ) -> Result<usize> {
        let sql = self.select(registry, indices);
        let span = debug_span!(
            "query",
            entities = indices.len(),
            params = self.args.len()
        );
        let _enter = span.enter();
        debug!(sql = %sql, "executing");

        let mut rows = 0usize;
        let mut visit = |cursor: &mut dyn RowCursor| -> Result<()> {
            while cursor.next()? {
                let mut offset = 0;
                for &index in indices {
                    let loader = registry.loader_mut(index);
                    cursor.scan_into(offset, loader.cells_mut())?;
                    offset += loader.width();
                }
                for &index in indices {
                    registry.loader_mut(index).process_row()?;
                }
                rows += 1;
            }
            Ok(())
        };
        self.executor.query(ctx, &sql, &self.args, &mut visit)?;

        debug!(rows, entities = registry.entity_count(), "rows scanned");
        Ok(rows)
    }

    fn select(&self, registry: &LoaderRegistry, indices: &[usize]) -> String {
        let dialect = self.executor.dialect();
        let quote = self.executor.quote_identifiers();
        let columns: Vec<String> = self
            .models
            .iter()
            .zip(indices)
            .flat_map(|(model, &index)| {
                registry
                    .loader(index)
                    .projection(&model.alias, dialect, quote)
            })
            .collect();
        format!("SELECT {} {}", columns.join(", "), self.fragment.trim())
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("fragment", &self.fragment)
            .field("args", &self.args)
            .field("models", &self.models)
            .finish()
    }
}
