//! Hydrate - flat SQL join results into linked in-memory object graphs
//!
//! Callers write the part of a statement from `FROM` on, register the
//! entity types the rows carry, and get back deduplicated entities with
//! their relationships wired:
//!
//! ```ignore
//! impl Entity for Author {
//!     fn describe() -> EntityDescriptor<Self> {
//!         Self::descriptor("authors")
//!             .key("id", |a| &a.id, |a| &mut a.id)
//!             .field("name", |a| &a.name, |a| &mut a.name)
//!             .relation("books", &["id"], &["author_id"], |a| &mut a.books)
//!     }
//! }
//!
//! let mut authors: Vec<Author> = Vec::new();
//! let from = "FROM authors a LEFT JOIN books b ON b.author_id = a.id ORDER BY a.id, b.id";
//! Query::new(&executor, from)
//!     .model::<Author>("a")
//!     .model::<Book>("b")
//!     .run(&RunContext::background(), &mut [&mut authors])?;
//! ```

pub mod engine;

pub use engine::{
    Cardinality, Config, Entity, EntityDescriptor, EntitySet, HydrateError, LoaderRegistry,
    MultiQuery, Output, Query, Representation, Result, RowCursor, RowExecutor, RunContext,
    SqlDialect, SqlValue, SqliteExecutor,
};
