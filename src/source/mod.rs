//! Data sources: where generated queries are executed.
//!
//! - [`DirectSource`]: a relational connection through a [`QueryExecutor`](crate::executor::QueryExecutor);
//!   the only source that can stream
//! - [`CallbackSource`]: an external provider supplied as closures
//! - [`StaticSource`]: an in-memory [`DataSet`], independent of any connection

mod direct;
mod external;

pub use direct::{CursorReader, DirectSource};
pub use external::{CallbackSource, StaticSource};

use crate::data::DataSet;
use crate::error::QueryError;
use crate::query::parameters::QueryParameters;

/// One executed page plus the total record count, when the source knows it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPage {
    pub data: DataSet,
    pub total: Option<u64>,
}

impl DataPage {
    pub fn new(data: DataSet, total: Option<u64>) -> Self {
        Self { data, total }
    }
}

/// Provider that executes generated query parameters.
pub trait DataSource: Send + Sync {
    /// Execute and return the rows (and the total, if known).
    fn get_data(&self, parameters: &QueryParameters) -> Result<DataPage, QueryError>;

    /// Execute a count variant and return the total record count.
    fn get_count(&self, parameters: &QueryParameters) -> Result<u64, QueryError>;

    /// Whether [`open_reader`](Self::open_reader) is available.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Open a streaming reader over the rows.
    ///
    /// # Errors
    ///
    /// The default implementation fails with `QueryError::Configuration`.
    fn open_reader(&self, parameters: &QueryParameters) -> Result<Box<dyn DataReader>, QueryError> {
        let _ = parameters;
        Err(QueryError::configuration(
            "This data source does not support streaming readers",
        ))
    }
}

/// Forward-only batch reader owning a live connection session.
///
/// The caller closes it; dropping an open reader closes it too.
pub trait DataReader: Send {
    /// Column names, known after the first batch
    fn columns(&self) -> &[String];

    /// Next batch of rows, or `None` when the reader is exhausted.
    fn next_batch(&mut self) -> Result<Option<DataSet>, QueryError>;

    /// Release the session. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), QueryError>;
}
