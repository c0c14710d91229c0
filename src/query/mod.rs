//! Query building, generation and execution.
//!
//! # Architecture
//!
//! - **Builder**: fluent settings shared by every query type (`QueryBuilder`)
//! - **Generator**: settings to parameterized statement text (`generate`)
//! - **Execution**: cached execution, counting and paged iteration (`ExecutableQuery`)
//! - **Nested**: nesting, set operations and materialized lists (`NestedQuery`)
//! - **Cache**: per-instance derived state (`CacheState`)
//!
//! # Examples
//!
//! ```no_run
//! use lifequery::prelude::*;
//!
//! # fn run(executor: lifequery::executor::PostgresExecutor) -> Result<(), QueryError> {
//! let context = QueryContext::new().with_executor(executor);
//!
//! let latest = DataQuery::for_object(context, "cms.article")
//!     .columns(["ArticleID", "ArticleTitle"])
//!     .where_equals("ArticleSiteID", 1)
//!     .order_by_descending(["ArticlePublishedWhen"])
//!     .paged_by(20);
//!
//! println!("{} of {}", latest.count()?, latest.total_records()?);
//! for row in latest.result()?.rows() {
//!     println!("{}", row.get::<String>("ArticleTitle")?);
//! }
//! # Ok(())
//! # }
//! ```

// Fluent settings builder
pub mod builder;
#[doc(inline)]
pub use builder::QueryBuilder;

// Per-instance cache
pub mod cache;
#[doc(inline)]
pub use cache::{CacheState, QueryCache};

// Column lists
pub mod columns;
#[doc(inline)]
pub use columns::ColumnList;

// Conditions and parameters
pub mod condition;
#[doc(inline)]
pub use condition::{ConditionPart, Conjunction, QueryDataParameters, WhereCondition};

// Concrete query types
pub mod data_query;
#[doc(inline)]
pub use data_query::{DataQuery, FromDataRow, ObjectQuery, QueryContext, QueryCore, QueryEntity};

// Execution
pub mod execution;
#[doc(inline)]
pub use execution::ExecutableQuery;

// Text generation
pub mod generator;
#[doc(inline)]
pub use generator::{generate, GenerationPurpose};

// Composition
pub mod nested;
#[doc(inline)]
pub use nested::{MaterializedList, NestedQuery, NestingPolicy};

// Generated statements
pub mod parameters;
#[doc(inline)]
pub use parameters::{QueryKind, QueryParameters};

// Settings and sources
pub mod settings;
#[doc(inline)]
pub use settings::{CombinedOperand, QueryDefinition, QuerySettings, QuerySource, SetOperator};
