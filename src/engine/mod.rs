// Hydrate Engine - Core module structure
pub mod adapter;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod loader;
pub mod logging;
pub mod multi;
pub mod output;
pub mod query;
pub mod registry;
pub mod relation;
pub mod value;

pub use adapter::{RowCursor, RowExecutor, SqlDialect, SqlValue, SqliteExecutor};
pub use config::Config;
pub use context::RunContext;
pub use descriptor::{Cardinality, Entity, EntityDescriptor, Representation};
pub use error::{HydrateError, Result};
pub use multi::MultiQuery;
pub use output::Output;
pub use query::Query;
pub use registry::{EntitySet, LoaderRegistry};
