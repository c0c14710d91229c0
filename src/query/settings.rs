//! Accumulated query settings and the immutable definition snapshot.

use crate::catalog::ObjectSchema;
use crate::query::columns::ColumnList;
use crate::query::condition::{QueryDataParameters, WhereCondition};
use crate::query::data_query::QueryContext;

/// Set operator joining combined query operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

/// One operand of a combined query. The first operand has no operator.
#[derive(Debug, Clone)]
pub struct CombinedOperand {
    pub operator: Option<SetOperator>,
    pub query: QueryDefinition,
}

/// Where the rows of a query come from.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Table or view name
    Table(String),
    /// Named query resolved through the query catalog (`class.name.query`)
    Named(String),
    /// Another query, generated as `(text) AS SubData`
    SubQuery(Box<QueryDefinition>),
    /// Set composition of two or more queries
    Combined(Vec<CombinedOperand>),
}

/// Everything a caller configured on a query.
#[derive(Debug, Clone, Default)]
pub struct QuerySettings {
    pub object_type: Option<String>,
    pub columns: ColumnList,
    /// `expr AS alias` columns needed internally and hidden from results
    pub filter_columns: ColumnList,
    pub where_condition: WhereCondition,
    pub parameters: QueryDataParameters,
    /// Order-by items, each with an optional direction suffix
    pub order_by: ColumnList,
    pub group_by: ColumnList,
    pub having: WhereCondition,
    pub top_n: u64,
    pub offset: u64,
    pub max_records: u64,
    pub distinct: bool,
    pub source: Option<QuerySource>,
    pub default_source: Option<QuerySource>,
    pub total_expression: Option<String>,
    pub is_sub_query: bool,
    pub is_nested: bool,
    pub force_order_by: bool,
    pub include_binary_columns: bool,
    pub no_results: bool,
    pub comment: Option<String>,
}

impl QuerySettings {
    pub fn is_paged(&self) -> bool {
        self.max_records > 0
    }

    /// Nothing beyond the source is configured.
    pub(crate) fn has_no_clauses(&self) -> bool {
        self.columns.returns_all_columns()
            && self.filter_columns.is_empty()
            && self.where_condition.is_empty()
            && self.order_by.is_empty()
            && self.group_by.is_empty()
            && self.having.is_empty()
            && self.top_n == 0
            && self.max_records == 0
            && self.offset == 0
            && !self.distinct
            && self.total_expression.is_none()
            && !self.no_results
    }
}

/// Snapshot of a query: its collaborators plus its settings.
#[derive(Debug, Clone, Default)]
pub struct QueryDefinition {
    pub context: QueryContext,
    pub settings: QuerySettings,
}

impl QueryDefinition {
    pub fn new(context: QueryContext) -> Self {
        let settings = QuerySettings {
            include_binary_columns: context.options().include_binary_columns,
            force_order_by: context.options().force_order_by,
            ..QuerySettings::default()
        };
        Self { context, settings }
    }

    /// Schema of the object type, when both are known.
    pub fn schema(&self) -> Option<ObjectSchema> {
        let object_type = self.settings.object_type.as_deref()?;
        self.context.schema_catalog()?.describe(object_type)
    }

    /// The single nested query this one forwards to unchanged, if any.
    ///
    /// Such an outer query executes, counts and pages as its inner query.
    pub fn pass_through_target(&self) -> Option<&QueryDefinition> {
        match &self.settings.source {
            Some(QuerySource::SubQuery(inner))
                if self.settings.has_no_clauses()
                    && self.settings.comment.is_none()
                    && !self.settings.is_sub_query =>
            {
                Some(inner)
            }
            _ => None,
        }
    }

    /// Combined query with nothing applied on top of the set operation.
    pub fn is_plain_combined(&self) -> bool {
        matches!(self.settings.source, Some(QuerySource::Combined(_)))
            && self.settings.has_no_clauses()
    }

    /// Full named-query name: qualified with the object type unless it
    /// already contains a dot.
    pub(crate) fn qualify_query_name(&self, name: &str) -> String {
        match &self.settings.object_type {
            Some(object_type) if !name.contains('.') => format!("{}.{}", object_type, name),
            _ => name.to_string(),
        }
    }
}
