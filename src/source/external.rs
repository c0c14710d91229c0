use super::{DataPage, DataSource};
use crate::data::DataSet;
use crate::error::QueryError;
use crate::query::parameters::QueryParameters;
use std::sync::Arc;

type DataCallback = dyn Fn(&QueryParameters) -> Result<DataPage, QueryError> + Send + Sync;
type CountCallback = dyn Fn(&QueryParameters) -> Result<u64, QueryError> + Send + Sync;

/// External provider given as closures.
///
/// The provider receives the generated parameters (text, named values,
/// paging bounds) and decides how to satisfy them. It never streams.
#[derive(Clone)]
pub struct CallbackSource {
    data: Arc<DataCallback>,
    count: Arc<CountCallback>,
}

impl CallbackSource {
    pub fn new<D, C>(data: D, count: C) -> Self
    where
        D: Fn(&QueryParameters) -> Result<DataPage, QueryError> + Send + Sync + 'static,
        C: Fn(&QueryParameters) -> Result<u64, QueryError> + Send + Sync + 'static,
    {
        Self {
            data: Arc::new(data),
            count: Arc::new(count),
        }
    }
}

impl std::fmt::Debug for CallbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSource").finish_non_exhaustive()
    }
}

impl DataSource for CallbackSource {
    fn get_data(&self, parameters: &QueryParameters) -> Result<DataPage, QueryError> {
        (self.data)(parameters)
    }

    fn get_count(&self, parameters: &QueryParameters) -> Result<u64, QueryError> {
        (self.count)(parameters)
    }
}

/// In-memory rows served without any connection.
///
/// The query text is ignored; only TopN and paging bounds are applied.
#[derive(Debug, Clone)]
pub struct StaticSource {
    data: Arc<DataSet>,
}

impl StaticSource {
    pub fn new(data: DataSet) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn from_shared(data: Arc<DataSet>) -> Self {
        Self { data }
    }

    fn total(&self, parameters: &QueryParameters) -> u64 {
        let len = self.data.len() as u64;
        match parameters.top_n() {
            0 => len,
            top_n => len.min(top_n),
        }
    }
}

impl DataSource for StaticSource {
    fn get_data(&self, parameters: &QueryParameters) -> Result<DataPage, QueryError> {
        let total = self.total(parameters);
        let offset = if parameters.is_paged() {
            parameters.offset().min(total)
        } else {
            0
        };
        let available = total - offset;
        let limit = if parameters.is_paged() {
            available.min(parameters.max_records())
        } else {
            available
        };
        let data = self
            .data
            .window(offset as usize, Some(limit as usize));
        Ok(DataPage::new(data, Some(total)))
    }

    fn get_count(&self, parameters: &QueryParameters) -> Result<u64, QueryError> {
        Ok(self.total(parameters))
    }
}
