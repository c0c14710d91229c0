use super::{DataPage, DataReader, DataSource};
use crate::data::DataSet;
use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::query::parameters::QueryParameters;
use crate::value::FromValue;
use sea_query::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DEFAULT_BATCH_SIZE: usize = 1000;

static CURSOR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Data source over a relational connection.
pub struct DirectSource<E: QueryExecutor> {
    executor: Arc<E>,
    batch_size: usize,
}

impl<E: QueryExecutor> DirectSource<E> {
    pub fn new(executor: E) -> Self {
        Self::from_shared(Arc::new(executor))
    }

    pub fn from_shared(executor: Arc<E>) -> Self {
        Self {
            executor,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Rows fetched per round-trip by streaming readers.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<E: QueryExecutor + 'static> DataSource for DirectSource<E> {
    fn get_data(&self, parameters: &QueryParameters) -> Result<DataPage, QueryError> {
        let (sql, values) = parameters.positional();
        let data = self.executor.query_all(&sql, &values)?;
        let total = if parameters.is_paged() {
            None
        } else {
            Some(data.len() as u64)
        };
        Ok(DataPage::new(data, total))
    }

    fn get_count(&self, parameters: &QueryParameters) -> Result<u64, QueryError> {
        let (sql, values) = parameters.positional();
        let value = self.executor.query_scalar(&sql, &values)?;
        Ok(u64::from_value(&value)?)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn open_reader(&self, parameters: &QueryParameters) -> Result<Box<dyn DataReader>, QueryError> {
        let reader = CursorReader::open(Arc::clone(&self.executor), parameters, self.batch_size)?;
        Ok(Box::new(reader))
    }
}

/// Server-side cursor inside its own transaction.
///
/// Statements: `BEGIN`, `DECLARE .. NO SCROLL CURSOR FOR ..`, then
/// `FETCH FORWARD n` per batch, and `CLOSE` + `COMMIT` when closed.
pub struct CursorReader<E: QueryExecutor> {
    executor: Arc<E>,
    name: String,
    batch_size: usize,
    columns: Vec<String>,
    excluded: Vec<String>,
    open: bool,
    exhausted: bool,
}

impl<E: QueryExecutor> CursorReader<E> {
    pub fn open(
        executor: Arc<E>,
        parameters: &QueryParameters,
        batch_size: usize,
    ) -> Result<Self, QueryError> {
        let name = format!(
            "lifequery_cursor_{}",
            CURSOR_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let (sql, values) = parameters.positional();

        executor.execute("BEGIN", &[])?;
        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", name, sql);
        if let Err(e) = executor.execute(&declare, &values) {
            if let Err(rollback) = executor.execute("ROLLBACK", &[]) {
                log::warn!("Failed to roll back cursor {}: {}", name, rollback);
            }
            return Err(e);
        }
        log::info!("Opened reader {}", name);

        Ok(Self {
            executor,
            name,
            batch_size: batch_size.max(1),
            columns: Vec::new(),
            excluded: parameters.excluded_columns().to_vec(),
            open: true,
            exhausted: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl<E: QueryExecutor> DataReader for CursorReader<E> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<DataSet>, QueryError> {
        if !self.open {
            return Err(QueryError::configuration(format!(
                "Reader {} is closed",
                self.name
            )));
        }
        if self.exhausted {
            return Ok(None);
        }
        let fetch = format!("FETCH FORWARD {} FROM {}", self.batch_size, self.name);
        let batch = self
            .executor
            .query_all(&fetch, &[] as &[Value])?
            .without_columns(&self.excluded);
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if self.columns.is_empty() {
            self.columns = batch.columns().to_vec();
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn close(&mut self) -> Result<(), QueryError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let closed = self
            .executor
            .execute(&format!("CLOSE {}", self.name), &[]);
        let committed = self.executor.execute("COMMIT", &[]);
        log::info!("Closed reader {}", self.name);
        closed?;
        committed?;
        Ok(())
    }
}

impl<E: QueryExecutor> Drop for CursorReader<E> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.close() {
                log::warn!("Failed to close reader {} on drop: {}", self.name, e);
            }
        }
    }
}
