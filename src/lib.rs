//! # Lifequery
//!
//! Query builder and execution engine for CMS data on PostgreSQL, built on
//! `sea-query` and the `may` coroutine runtime.
//!
//! Queries accumulate settings through a fluent API, compile to
//! parameterized SQL deterministically, and execute against a pluggable
//! [`DataSource`](source::DataSource) with per-instance caching of the text,
//! the result and the total record count.
//!
//! ```rust
//! use lifequery::prelude::*;
//!
//! let query = DataQuery::for_object(QueryContext::new(), "cms.article")
//!     .where_condition("ArticleSiteID = 1")
//!     .top_n(5);
//! assert_eq!(
//!     query.text().unwrap(),
//!     "SELECT * FROM cms.article WHERE ArticleSiteID = 1 LIMIT 5"
//! );
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod executor;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod normalize;
pub mod query;
pub mod source;
pub mod value;
mod value_conversion;

pub use catalog::{
    InMemoryQueryCatalog, InMemorySchemaCatalog, ObjectSchema, QueryCatalog, SchemaCatalog,
};
pub use config::LifequeryConfig;
pub use data::{DataRow, DataSet};
pub use error::QueryError;
pub use executor::{PostgresExecutor, QueryExecutor};
pub use query::{
    DataQuery, ExecutableQuery, FromDataRow, MaterializedList, NestedQuery, NestingPolicy,
    ObjectQuery, QueryBuilder, QueryContext, QueryEntity, QueryParameters, QuerySource,
};
pub use source::{CallbackSource, DataPage, DataReader, DataSource, DirectSource, StaticSource};
pub use value::FromValue;

/// Everything needed to build and run queries.
pub mod prelude {
    pub use crate::data::{DataRow, DataSet};
    pub use crate::error::QueryError;
    pub use crate::query::{
        DataQuery, ExecutableQuery, FromDataRow, MaterializedList, NestedQuery, NestingPolicy,
        ObjectQuery, QueryBuilder, QueryContext, QueryEntity, QuerySource,
    };
    pub use crate::value::FromValue;
}
