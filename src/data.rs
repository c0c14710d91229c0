//! Connection-independent tabular results.

use crate::error::QueryError;
use crate::normalize::identifiers_equal;
use crate::value::FromValue;
use sea_query::Value;

/// Tabular result of an executed query.
///
/// Cells are `sea_query::Value`s; rows keep the column order reported by the
/// data source. A `DataSet` holds no connection state and can be cached,
/// shared across threads and served again by a [`StaticSource`](crate::source::StaticSource).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a data set from column names and rows.
    ///
    /// Rows shorter than the column list are padded with `Value::String(None)`;
    /// longer rows are an error.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, QueryError> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(QueryError::Parse(format!(
                    "row {} has {} values but the data set has {} columns",
                    index,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Value::String(None));
            padded.push(row);
        }
        Ok(Self {
            columns,
            rows: padded,
        })
    }

    /// One column holding `values`, one row per value.
    pub fn from_column(column: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            columns: vec![column.into()],
            rows: values.into_iter().map(|value| vec![value]).collect(),
        }
    }

    /// An empty data set with the given columns.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| identifiers_equal(c, name))
    }

    /// Row at `index`, if any.
    pub fn row(&self, index: usize) -> Option<DataRow<'_>> {
        self.rows.get(index).map(|values| DataRow {
            columns: &self.columns,
            values,
        })
    }

    /// Iterate over the rows.
    pub fn rows(&self) -> impl Iterator<Item = DataRow<'_>> + '_ {
        self.rows.iter().map(move |values| DataRow {
            columns: &self.columns,
            values,
        })
    }

    /// Values of a single column.
    pub fn column_values(&self, index: usize) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).cloned())
            .collect()
    }

    /// Append a row; its width must match the column list.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), QueryError> {
        if row.len() != self.columns.len() {
            return Err(QueryError::Parse(format!(
                "row has {} values but the data set has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove the given columns (internal filter columns) from the result.
    pub(crate) fn without_columns(mut self, excluded: &[String]) -> Self {
        if excluded.is_empty() {
            return self;
        }
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !excluded.iter().any(|e| identifiers_equal(c, e)))
            .collect();
        if keep.iter().all(|k| *k) {
            return self;
        }
        let mut index = 0;
        self.columns.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
        for row in &mut self.rows {
            let mut index = 0;
            row.retain(|_| {
                let kept = keep.get(index).copied().unwrap_or(true);
                index += 1;
                kept
            });
        }
        self
    }

    /// Rows `offset..offset + limit` (all remaining rows when `limit` is `None`).
    pub(crate) fn window(&self, offset: usize, limit: Option<usize>) -> Self {
        let rows = self
            .rows
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Borrowed view of one result row.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> DataRow<'a> {
    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Raw cell by column name (case-insensitive).
    pub fn value(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| identifiers_equal(c, column))
            .and_then(|index| self.values.get(index))
    }

    /// Raw cell by position.
    pub fn value_at(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// Typed cell by column name.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Parse` if the column is missing or the value
    /// cannot be converted to `T`.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, QueryError> {
        let value = self.value(column).ok_or_else(|| {
            QueryError::Parse(format!("column '{}' is not part of the result", column))
        })?;
        T::from_value(value).map_err(|e| QueryError::Parse(format!("column '{}': {}", column, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataSet {
        DataSet::new(
            vec!["ArticleID".to_string(), "ArticleTitle".to_string(), "OrderBy0".to_string()],
            vec![
                vec![Value::Int(Some(1)), Value::from("First"), Value::Int(Some(9))],
                vec![Value::Int(Some(2)), Value::from("Second"), Value::Int(Some(8))],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_row_access_is_case_insensitive() {
        let data = sample();
        let row = data.row(1).unwrap();
        assert_eq!(row.get::<i32>("articleid").unwrap(), 2);
        assert_eq!(row.get::<String>("ARTICLETITLE").unwrap(), "Second");
        assert!(row.get::<i32>("Missing").is_err());
    }

    #[test]
    fn test_without_columns_strips_filter_columns() {
        let data = sample().without_columns(&["orderby0".to_string()]);
        assert_eq!(data.columns(), &["ArticleID".to_string(), "ArticleTitle".to_string()]);
        assert!(data.rows().all(|r| r.values().len() == 2));
    }

    #[test]
    fn test_window() {
        let data = sample();
        assert_eq!(data.window(1, Some(5)).len(), 1);
        assert_eq!(data.window(0, None).len(), 2);
        assert!(data.window(3, Some(1)).is_empty());
    }

    #[test]
    fn test_new_rejects_wide_rows() {
        let err = DataSet::new(vec!["A".to_string()], vec![vec![Value::Int(Some(1)), Value::Int(Some(2))]]);
        assert!(err.is_err());
    }
}
