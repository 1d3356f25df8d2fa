//! Multi-step unit of work
//!
//! Runs several queries one after another against one loader registry, so
//! entities and identities accumulate across round trips, then resolves
//! relationships once over everything that was loaded.

use tracing::{debug, info_span, warn};

use super::context::RunContext;
use super::error::Result;
use super::output::{self, Output};
use super::query::Query;
use super::registry::{EntitySet, LoaderRegistry};

#[derive(Debug, Clone, Default)]
pub struct MultiQuery<'e> {
    steps: Vec<Query<'e>>,
}

impl<'e> MultiQuery<'e> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step
    pub fn step(mut self, query: Query<'e>) -> Self {
        self.steps.push(query);
        self
    }

    pub fn push(&mut self, query: Query<'e>) {
        self.steps.push(query);
    }

    pub fn steps(&self) -> &[Query<'e>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step and write the merged results into `outputs`.
    ///
    /// Binding happens before the first step. If any step fails the
    /// remaining steps are skipped and no output is modified.
    pub fn run(&self, ctx: &RunContext, outputs: &mut [&mut dyn Output]) -> Result<()> {
        let mut bindings = output::bind_all(outputs)?;
        let set = self.load(ctx)?;
        output::fill_all(&mut bindings, &set);
        Ok(())
    }

    /// Run every step and return the merged, finalized collections
    pub fn load(&self, ctx: &RunContext) -> Result<EntitySet> {
        let span = info_span!("multi_query", steps = self.steps.len());
        let _enter = span.enter();

        let mut registry = LoaderRegistry::new();
        // Loaders for every step exist before the first statement runs
        let plans = self
            .steps
            .iter()
            .map(|step| registry.resolve(step.models()))
            .collect::<Result<Vec<_>>>()?;

        for (number, (step, indices)) in self.steps.iter().zip(&plans).enumerate() {
            match step.execute_resolved(ctx, &mut registry, indices) {
                Ok(rows) => debug!(step = number, rows, "step complete"),
                Err(err) => {
                    warn!(step = number, error = %err, "step failed, aborting remaining steps");
                    return Err(err);
                }
            }
        }

        Ok(registry.finalize())
    }
}

impl<'e> From<Vec<Query<'e>>> for MultiQuery<'e> {
    fn from(steps: Vec<Query<'e>>) -> Self {
        Self { steps }
    }
}

impl<'e> FromIterator<Query<'e>> for MultiQuery<'e> {
    fn from_iter<I: IntoIterator<Item = Query<'e>>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::SqlValue;
    use crate::engine::error::HydrateError;
    use crate::engine::query::tests::{Child, Parent, RecordingExecutor};

    fn parent_rows(rows: &[(i64, &str)]) -> RecordingExecutor {
        RecordingExecutor {
            rows: rows
                .iter()
                .map(|(id, name)| vec![SqlValue::Integer(*id), SqlValue::Text(name.to_string())])
                .collect(),
            ..RecordingExecutor::default()
        }
    }

    #[test]
    fn test_steps_accumulate_identities() {
        let first = parent_rows(&[(1, "P1"), (2, "P2")]);
        let second = parent_rows(&[(2, "P2"), (3, "P3")]);

        let mut parents: Vec<Parent> = Vec::new();
        MultiQuery::new()
            .step(Query::new(&first, "FROM parents p WHERE p.id < 3").model::<Parent>("p"))
            .step(Query::new(&second, "FROM parents x WHERE x.id > 1").model::<Parent>("x"))
            .run(&RunContext::background(), &mut [&mut parents])
            .unwrap();

        let ids: Vec<_> = parents.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_relationships_span_steps() {
        let parents = parent_rows(&[(1, "P1")]);
        let children = RecordingExecutor {
            rows: vec![vec![
                SqlValue::Integer(5),
                SqlValue::Integer(1),
                SqlValue::Text("C5".into()),
            ]],
            ..RecordingExecutor::default()
        };

        let set = MultiQuery::from(vec![
            Query::new(&parents, "FROM parents p").model::<Parent>("p"),
            Query::new(&children, "FROM children c").model::<Child>("c"),
        ])
        .load(&RunContext::background())
        .unwrap();

        let parent = set.first::<Parent>().unwrap();
        assert_eq!(parent.children.len(), 1);
        assert_eq!(parent.children[0].name, "C5");
    }

    #[test]
    fn test_failed_step_aborts_the_rest() {
        let first = parent_rows(&[(1, "P1")]);
        let broken = RecordingExecutor {
            fail: true,
            ..RecordingExecutor::default()
        };
        let never = parent_rows(&[(9, "P9")]);

        let mut parents: Vec<Parent> = Vec::new();
        let err = [
            Query::new(&first, "FROM parents p").model::<Parent>("p"),
            Query::new(&broken, "FROM missing m").model::<Parent>("m"),
            Query::new(&never, "FROM parents p").model::<Parent>("p"),
        ]
        .into_iter()
        .collect::<MultiQuery>()
        .run(&RunContext::background(), &mut [&mut parents])
        .unwrap_err();

        assert!(err.is_execution());
        assert!(parents.is_empty());
        assert_eq!(first.executed.borrow().len(), 1);
        assert!(never.executed.borrow().is_empty());
    }

    #[test]
    fn test_bad_registration_in_later_step_runs_no_sql() {
        let first = parent_rows(&[(1, "P1")]);
        let second = parent_rows(&[]);

        let err = MultiQuery::new()
            .step(Query::new(&first, "FROM parents p").model::<Parent>("p"))
            .step(
                Query::new(&second, "FROM parents p")
                    .model::<Parent>("p")
                    .model::<Parent>("q"),
            )
            .load(&RunContext::background())
            .unwrap_err();

        assert!(matches!(err, HydrateError::Descriptor { .. }));
        assert!(first.executed.borrow().is_empty());
    }
}
