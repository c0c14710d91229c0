//! Execution engine: generation, execution and counting with per-instance
//! caching, plus paged iteration drivers.

use crate::data::{DataRow, DataSet};
use crate::error::QueryError;
use crate::query::builder::QueryBuilder;
use crate::query::cache::CacheState;
use crate::query::generator::{generate, GenerationPurpose};
use crate::query::parameters::QueryParameters;
use crate::query::settings::QueryDefinition;
use crate::source::{DataPage, DataReader};
use std::sync::{Arc, MutexGuard};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Follow pass-through nesting down to the query that actually runs.
pub(crate) fn executing_definition(definition: &QueryDefinition) -> &QueryDefinition {
    let mut current = definition;
    while let Some(inner) = current.pass_through_target() {
        current = inner;
    }
    current
}

/// Text for the executing query, generated once per cache state.
fn cached_parameters(
    state: &mut MutexGuard<'_, CacheState>,
    definition: &QueryDefinition,
) -> Result<Arc<QueryParameters>, QueryError> {
    if let Some(parameters) = state.parameters() {
        return Ok(Arc::clone(parameters));
    }
    let parameters = Arc::new(generate(
        executing_definition(definition),
        GenerationPurpose::Execute,
    )?);
    **state = CacheState::TextCached {
        parameters: Arc::clone(&parameters),
        total: None,
    };
    Ok(parameters)
}

/// Run `parameters` against the data source of `definition`.
fn execute_definition(
    definition: &QueryDefinition,
    parameters: &QueryParameters,
) -> Result<DataPage, QueryError> {
    let definition = executing_definition(definition);
    if definition.settings.no_results {
        log::debug!("Query cannot return rows, skipping execution");
        let columns = definition
            .settings
            .columns
            .output_names()
            .into_iter()
            .flatten()
            .collect();
        return Ok(DataPage::new(DataSet::empty(columns), Some(0)));
    }

    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("lifequery.result", kind = ?parameters.kind()).entered();

    let source = definition.context.require_data_source()?;
    let start = Instant::now();
    let result = source.get_data(parameters);
    let duration = start.elapsed();
    let mut page = result?;
    log::debug!(
        "Query returned {} rows in {:?}",
        page.data.len(),
        duration
    );
    page.data = page.data.without_columns(parameters.excluded_columns());
    Ok(page)
}

/// Total records matched by `definition`, ignoring paging.
fn count_definition(definition: &QueryDefinition) -> Result<u64, QueryError> {
    let definition = executing_definition(definition);
    if definition.settings.no_results {
        return Ok(0);
    }
    let parameters = generate(definition, GenerationPurpose::Count)?;
    let source = definition.context.require_data_source()?;
    let start = Instant::now();
    let result = source.get_count(&parameters);
    log::debug!("Counted records in {:?}", start.elapsed());
    result
}

/// Rows in the current page given the total: `min(max(total - offset, 0), max)`.
pub(crate) fn page_count(total: u64, offset: u64, max_records: u64) -> u64 {
    total.saturating_sub(offset).min(max_records)
}

/// Execution methods available on every query type.
///
/// Results, text and totals are cached per instance until the settings
/// change. Concurrent callers on a shared instance execute once.
pub trait ExecutableQuery: QueryBuilder {
    /// Generated parameters of the executing statement.
    fn parameters(&self) -> Result<Arc<QueryParameters>, QueryError> {
        let mut state = self.core().cache().lock();
        cached_parameters(&mut state, self.definition())
    }

    /// Statement text with `@name` placeholders.
    fn text(&self) -> Result<String, QueryError> {
        Ok(self.parameters()?.text().to_string())
    }

    /// Statement text, with parameter values inlined as literals when
    /// `expand` is set.
    fn to_string_expanded(&self, expand: bool) -> Result<String, QueryError> {
        let parameters = self.parameters()?;
        Ok(if expand {
            parameters.expanded_text()
        } else {
            parameters.text().to_string()
        })
    }

    /// Execute, or return the cached result.
    ///
    /// Columns used only for ordering or filtering are removed from the rows.
    fn result(&self) -> Result<Arc<DataSet>, QueryError> {
        let mut state = self.core().cache().lock();
        if let Some(result) = state.result() {
            #[cfg(feature = "metrics")]
            METRICS.record_cache(true);
            log::debug!("Returning cached result");
            return Ok(Arc::clone(result));
        }
        #[cfg(feature = "metrics")]
        METRICS.record_cache(false);

        let parameters = cached_parameters(&mut state, self.definition())?;
        let page = execute_definition(self.definition(), &parameters)?;
        let result = Arc::new(page.data);
        let total = page.total.or_else(|| state.total());
        *state = CacheState::Executed {
            parameters,
            result: Arc::clone(&result),
            total,
        };
        Ok(result)
    }

    /// Drop the cached result and execute again.
    fn execute(&self) -> Result<Arc<DataSet>, QueryError> {
        self.reset();
        self.result()
    }

    /// Forget result and total; the generated text is kept.
    fn reset(&self) {
        self.core().cache().reset();
    }

    /// Records matched by the query, ignoring paging.
    fn total_records(&self) -> Result<u64, QueryError> {
        let mut state = self.core().cache().lock();
        if let Some(total) = state.total() {
            return Ok(total);
        }
        let parameters = cached_parameters(&mut state, self.definition())?;
        let total = match state.result() {
            Some(result) if !parameters.is_paged() && parameters.top_n() == 0 => {
                result.len() as u64
            }
            _ => count_definition(self.definition())?,
        };
        state.set_total(total);
        Ok(total)
    }

    /// Rows this query returns: the cached result length, or the page size
    /// derived from the total.
    fn count(&self) -> Result<u64, QueryError> {
        if let Some(result) = self.core().cache().lock().result() {
            return Ok(result.len() as u64);
        }
        let settings = &executing_definition(self.definition()).settings;
        let total = self.total_records()?;
        Ok(if settings.is_paged() {
            page_count(total, settings.offset, settings.max_records)
        } else {
            total
        })
    }

    /// Whether [`open_reader`](Self::open_reader) is available.
    fn supports_streaming(&self) -> bool {
        let definition = executing_definition(self.definition());
        !definition.settings.no_results
            && definition
                .context
                .data_source()
                .map(|source| source.supports_streaming())
                .unwrap_or(false)
    }

    /// Open a forward-only reader; the caller closes it.
    fn open_reader(&self) -> Result<Box<dyn DataReader>, QueryError> {
        let parameters = self.parameters()?;
        let definition = executing_definition(self.definition());
        definition
            .context
            .require_data_source()?
            .open_reader(&parameters)
    }

    /// Execute page by page, calling `f` for each non-empty page.
    ///
    /// `page_size` 0 uses the configured max records, then the default page
    /// size. Offset and max records are restored afterwards, also on error.
    /// Returning [`QueryError::ActionCancelled`] from `f` stops quietly.
    fn for_each_page<F>(&mut self, page_size: u64, mut f: F) -> Result<(), QueryError>
    where
        F: FnMut(&DataSet) -> Result<(), QueryError>,
    {
        let (offset, max_records) = {
            let settings = self.settings();
            (settings.offset, settings.max_records)
        };
        let size = match (page_size, max_records) {
            (0, 0) => self.context().options().default_page_size.max(1),
            (0, max) => max,
            (size, _) => size,
        };

        let outcome = drive_pages(self, offset, size, &mut f);

        {
            let settings = self.core_mut().settings_mut();
            settings.offset = offset;
            settings.max_records = max_records;
        }

        match outcome {
            Err(e) if e.is_cancellation() => {
                log::info!("Paged iteration cancelled");
                Ok(())
            }
            other => other,
        }
    }

    /// Execute page by page, calling `f` for every row.
    fn for_each_row<F>(&mut self, page_size: u64, mut f: F) -> Result<(), QueryError>
    where
        F: FnMut(&DataRow<'_>) -> Result<(), QueryError>,
    {
        self.for_each_page(page_size, |page| {
            for row in page.rows() {
                f(&row)?;
            }
            Ok(())
        })
    }
}

impl<Q: QueryBuilder> ExecutableQuery for Q {}

fn drive_pages<Q, F>(query: &mut Q, start: u64, size: u64, f: &mut F) -> Result<(), QueryError>
where
    Q: ExecutableQuery,
    F: FnMut(&DataSet) -> Result<(), QueryError>,
{
    let mut offset = start;
    let mut pages = 0usize;
    loop {
        {
            let settings = query.core_mut().settings_mut();
            settings.offset = offset;
            settings.max_records = size;
        }
        let page = query.result()?;
        if page.is_empty() {
            break;
        }
        f(&page)?;
        pages += 1;
        if (page.len() as u64) < size {
            break;
        }
        offset = match offset.checked_add(size) {
            Some(next) => next,
            None => break,
        };
    }
    log::info!("Processed {} pages of {} rows", pages, size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemorySchemaCatalog, ObjectSchema};
    use crate::executor::QueryExecutor;
    use crate::query::data_query::{DataQuery, QueryContext};
    use crate::query::settings::QuerySource;
    use sea_query::Value;
    use std::sync::Mutex;

    /// Serves `ids` honoring LIMIT/OFFSET and answers counts with the row count.
    struct MockExecutor {
        ids: Vec<i32>,
        queries: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn new(count: i32) -> Self {
            Self {
                ids: (1..=count).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    fn clause(query: &str, keyword: &str) -> Option<usize> {
        let words: Vec<&str> = query.split_whitespace().collect();
        words
            .iter()
            .rposition(|w| *w == keyword)
            .and_then(|i| words.get(i + 1))
            .and_then(|n| n.parse().ok())
    }

    impl QueryExecutor for MockExecutor {
        fn execute(&self, query: &str, _params: &[Value]) -> Result<u64, QueryError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(0)
        }

        fn query_all(&self, query: &str, _params: &[Value]) -> Result<DataSet, QueryError> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.starts_with("SELECT COUNT(*)") {
                return DataSet::new(
                    vec!["count".to_string()],
                    vec![vec![Value::BigInt(Some(self.ids.len() as i64))]],
                );
            }
            let offset = clause(query, "OFFSET").unwrap_or(0);
            let limit = clause(query, "LIMIT").unwrap_or(usize::MAX);
            let rows = self
                .ids
                .iter()
                .skip(offset)
                .take(limit)
                .map(|id| vec![Value::Int(Some(*id))])
                .collect();
            DataSet::new(vec!["ArticleID".to_string()], rows)
        }
    }

    fn query(executor: Arc<MockExecutor>) -> DataQuery {
        let schemas = InMemorySchemaCatalog::new().with_object(
            "cms.article",
            ObjectSchema::new("CMS_Article").with_identity("ArticleID"),
        );
        let context = QueryContext::new()
            .with_schema_catalog(Arc::new(schemas))
            .with_executor(executor);
        DataQuery::for_object(context, "cms.article")
    }

    #[test]
    fn test_result_is_cached() {
        let executor = Arc::new(MockExecutor::new(3));
        let query = query(Arc::clone(&executor));
        let first = query.result().unwrap();
        let second = query.result().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(executor.queries.lock().unwrap().len(), 1);
        assert_eq!(query.total_records().unwrap(), 3);
        assert_eq!(executor.queries.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_count_law_for_paged_query() {
        let executor = Arc::new(MockExecutor::new(25));
        let query = query(Arc::clone(&executor)).page(2, 10);
        assert_eq!(query.total_records().unwrap(), 25);
        assert_eq!(query.count().unwrap(), 5);
        assert_eq!(page_count(25, 30, 10), 0);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_round_trips_are_left_to_the_executor() {
        let executor = Arc::new(MockExecutor::new(25));
        let query = query(Arc::clone(&executor)).page(0, 10);
        let before = METRICS.round_trips();
        query.result().unwrap();
        query.reset();
        query.total_records().unwrap();
        assert_eq!(executor.queries.lock().unwrap().len(), 2);
        assert_eq!(METRICS.round_trips(), before);
    }

    #[test]
    fn test_no_results_skips_execution() {
        let executor = Arc::new(MockExecutor::new(3));
        let query = query(Arc::clone(&executor)).no_results();
        assert!(query.result().unwrap().is_empty());
        assert_eq!(query.total_records().unwrap(), 0);
        assert!(executor.queries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_execute_without_source_fails() {
        let query = DataQuery::for_object(QueryContext::new(), "cms.article");
        assert!(matches!(query.result(), Err(QueryError::Configuration(_))));
    }

    #[test]
    fn test_for_each_page_restores_paging() {
        let executor = Arc::new(MockExecutor::new(25));
        let mut query = query(Arc::clone(&executor)).offset(5).paged_by(7);
        let mut seen = Vec::new();
        query
            .for_each_row(10, |row| {
                seen.push(row.get::<i32>("ArticleID")?);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, (6..=25).collect::<Vec<_>>());
        assert_eq!(query.settings().offset, 5);
        assert_eq!(query.settings().max_records, 7);
    }

    #[test]
    fn test_cancellation_stops_iteration() {
        let executor = Arc::new(MockExecutor::new(25));
        let mut query = query(Arc::clone(&executor));
        let mut pages = 0;
        let outcome = query.for_each_page(10, |_| {
            pages += 1;
            Err(QueryError::cancel())
        });
        assert!(outcome.is_ok());
        assert_eq!(pages, 1);
        assert!(!query.settings().is_paged());
    }

    #[test]
    fn test_callback_error_propagates_and_restores() {
        let executor = Arc::new(MockExecutor::new(25));
        let mut query = query(Arc::clone(&executor)).offset(3);
        let outcome = query.for_each_page(0, |_| Err(QueryError::Execution("boom".into())));
        assert!(matches!(outcome, Err(QueryError::Execution(_))));
        assert_eq!(query.settings().offset, 3);
    }

    #[test]
    fn test_pass_through_executes_inner() {
        let executor = Arc::new(MockExecutor::new(25));
        let inner = query(Arc::clone(&executor)).page(1, 10);
        let mut outer = DataQuery::new(inner.context().clone());
        outer = outer.source(QuerySource::SubQuery(Box::new(inner.definition().clone())));
        let text = outer.text().unwrap();
        assert_eq!(
            text,
            "SELECT * FROM CMS_Article ORDER BY ArticleID LIMIT 10 OFFSET 10"
        );
        assert_eq!(outer.count().unwrap(), 10);
    }

    #[test]
    fn test_streaming_capability() {
        let executor = Arc::new(MockExecutor::new(1));
        assert!(query(executor).supports_streaming());
        assert!(!DataQuery::new(QueryContext::new()).supports_streaming());
    }
}
