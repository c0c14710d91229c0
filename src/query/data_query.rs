//! Concrete query types and their shared context.

use crate::catalog::{InMemoryQueryCatalog, InMemorySchemaCatalog, QueryCatalog, SchemaCatalog};
use crate::config::{LifequeryConfig, QueryConfig};
use crate::data::DataRow;
use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::query::builder::QueryBuilder;
use crate::query::cache::QueryCache;
use crate::query::execution::ExecutableQuery;
use crate::query::settings::{QueryDefinition, QuerySettings};
use crate::source::{DataSource, DirectSource};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Collaborators and options shared by every query built from it.
#[derive(Clone, Default)]
pub struct QueryContext {
    data_source: Option<Arc<dyn DataSource>>,
    schema_catalog: Option<Arc<dyn SchemaCatalog>>,
    query_catalog: Option<Arc<dyn QueryCatalog>>,
    options: QueryConfig,
    reader_batch_size: Option<usize>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with in-memory catalogs and options from configuration.
    pub fn from_config(config: &LifequeryConfig) -> Self {
        Self {
            data_source: None,
            schema_catalog: Some(Arc::new(InMemorySchemaCatalog::from(config.schema.clone()))),
            query_catalog: Some(Arc::new(InMemoryQueryCatalog::from(config.queries.clone()))),
            options: config.query.clone(),
            reader_batch_size: Some(config.database.reader_batch_size),
        }
    }

    pub fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Execute directly over `executor`.
    pub fn with_executor<E: QueryExecutor + 'static>(self, executor: E) -> Self {
        let mut source = DirectSource::new(executor);
        if let Some(batch_size) = self.reader_batch_size {
            source = source.with_batch_size(batch_size);
        }
        self.with_data_source(Arc::new(source))
    }

    pub fn without_data_source(mut self) -> Self {
        self.data_source = None;
        self
    }

    pub fn with_schema_catalog(mut self, catalog: Arc<dyn SchemaCatalog>) -> Self {
        self.schema_catalog = Some(catalog);
        self
    }

    pub fn with_query_catalog(mut self, catalog: Arc<dyn QueryCatalog>) -> Self {
        self.query_catalog = Some(catalog);
        self
    }

    pub fn with_options(mut self, options: QueryConfig) -> Self {
        self.options = options;
        self
    }

    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.data_source.as_ref()
    }

    pub fn schema_catalog(&self) -> Option<&dyn SchemaCatalog> {
        self.schema_catalog.as_deref()
    }

    pub fn query_catalog(&self) -> Option<&dyn QueryCatalog> {
        self.query_catalog.as_deref()
    }

    pub fn options(&self) -> &QueryConfig {
        &self.options
    }

    /// The data source, or a configuration error naming what is missing.
    pub(crate) fn require_data_source(&self) -> Result<&Arc<dyn DataSource>, QueryError> {
        self.data_source
            .as_ref()
            .ok_or_else(|| QueryError::configuration("Query has no data source to execute against"))
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("data_source", &self.data_source.is_some())
            .field("schema_catalog", &self.schema_catalog.is_some())
            .field("query_catalog", &self.query_catalog.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Settings plus cached derived state, owned by every concrete query.
#[derive(Debug, Clone, Default)]
pub struct QueryCore {
    definition: QueryDefinition,
    cache: QueryCache,
}

impl QueryCore {
    pub fn new(context: QueryContext) -> Self {
        Self {
            definition: QueryDefinition::new(context),
            cache: QueryCache::new(),
        }
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.definition.settings
    }

    pub fn context(&self) -> &QueryContext {
        &self.definition.context
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Settings for mutation; every cached value is dropped first.
    pub fn settings_mut(&mut self) -> &mut QuerySettings {
        self.cache.invalidate();
        &mut self.definition.settings
    }

    pub fn context_mut(&mut self) -> &mut QueryContext {
        self.cache.invalidate();
        &mut self.definition.context
    }

    /// Replace settings and context with `definition`.
    pub fn set_definition(&mut self, definition: QueryDefinition) {
        self.cache.invalidate();
        self.definition = definition;
    }
}

/// Query over any source, returning untyped rows.
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    core: QueryCore,
}

impl DataQuery {
    pub fn new(context: QueryContext) -> Self {
        Self {
            core: QueryCore::new(context),
        }
    }

    /// Query over the default source of `object_type`.
    pub fn for_object(context: QueryContext, object_type: &str) -> Self {
        let mut query = Self::new(context);
        query.core.settings_mut().object_type = Some(object_type.to_string());
        query
    }
}

impl QueryBuilder for DataQuery {
    fn core(&self) -> &QueryCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QueryCore {
        &mut self.core
    }

    fn create(context: QueryContext) -> Self {
        Self::new(context)
    }
}

/// Build a typed model from a result row.
pub trait FromDataRow: Sized {
    fn from_row(row: &DataRow<'_>) -> Result<Self, QueryError>;
}

/// Object type with a known name and model.
pub trait QueryEntity: Send + Sync + 'static {
    /// Object type name as known to the schema catalog (`cms.article`)
    const OBJECT_TYPE: &'static str;

    type Model: FromDataRow;
}

/// Query over the objects of one type.
pub struct ObjectQuery<E: QueryEntity> {
    core: QueryCore,
    _entity: PhantomData<fn() -> E>,
}

impl<E: QueryEntity> ObjectQuery<E> {
    pub fn new(context: QueryContext) -> Self {
        let mut core = QueryCore::new(context);
        core.settings_mut().object_type = Some(E::OBJECT_TYPE.to_string());
        Self {
            core,
            _entity: PhantomData,
        }
    }

    /// Execute and convert every row to `E::Model`.
    pub fn models(&self) -> Result<Vec<E::Model>, QueryError> {
        let result = self.result()?;
        result.rows().map(|row| E::Model::from_row(&row)).collect()
    }

    /// First model of the result, if any.
    pub fn first_model(&self) -> Result<Option<E::Model>, QueryError> {
        let result = self.result()?;
        result.row(0).map(|row| E::Model::from_row(&row)).transpose()
    }
}

impl<E: QueryEntity> Clone for ObjectQuery<E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: QueryEntity> fmt::Debug for ObjectQuery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectQuery")
            .field("object_type", &E::OBJECT_TYPE)
            .field("core", &self.core)
            .finish()
    }
}

impl<E: QueryEntity> QueryBuilder for ObjectQuery<E> {
    fn core(&self) -> &QueryCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut QueryCore {
        &mut self.core
    }

    fn create(context: QueryContext) -> Self {
        Self::new(context)
    }
}
