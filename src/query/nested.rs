//! Query composition: nesting, sub-queries, set operations and
//! materialized value lists.

use crate::data::DataSet;
use crate::error::QueryError;
use crate::query::builder::QueryBuilder;
use crate::query::columns::{
    column_expression, ordering_aggregate, output_name, split_direction, ColumnList,
};
use crate::query::execution::ExecutableQuery;
use crate::query::generator::single_column;
use crate::query::settings::{CombinedOperand, QueryDefinition, QuerySource, SetOperator};
use crate::source::StaticSource;
use sea_query::Value;
use std::sync::Arc;

/// How [`NestedQuery::as_nested`] splits settings between the two layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestingPolicy {
    /// Order the outer query by the inner query's output names
    pub translate_order_by: bool,
    /// Move offset and max records to the outer query
    pub move_paging: bool,
    /// Give the outer query the inner query's data source
    pub share_source: bool,
}

impl Default for NestingPolicy {
    fn default() -> Self {
        Self {
            translate_order_by: true,
            move_paging: true,
            share_source: true,
        }
    }
}

/// Immutable snapshot of one column's values, taken when the list was
/// materialized. Clones share the values.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedList {
    column: String,
    values: Arc<[Value]>,
}

impl MaterializedList {
    pub fn new(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            values: values.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values as a single-column data set.
    pub fn to_data_set(&self) -> DataSet {
        DataSet::from_column(self.column.clone(), self.values.iter().cloned())
    }

    /// Serve the values as an in-memory source, independent of any
    /// connection.
    pub fn into_source(self) -> StaticSource {
        StaticSource::new(self.to_data_set())
    }
}

/// Move order-by to the outer layer, exposing expressions that are not
/// inner outputs as `OrderBy{n}` filter columns.
///
/// A distinct inner query is regrouped by its columns so the exposed keys
/// stay out of the distinctness. Returns `None`, leaving `inner` untouched,
/// when that is impossible (all columns or an existing group-by).
fn translate_order(inner: &mut QueryDefinition) -> Option<Vec<String>> {
    let settings = &inner.settings;
    let regroup = settings.distinct;
    let mut outer = Vec::with_capacity(settings.order_by.len());
    let mut hidden = Vec::new();
    for (index, item) in settings.order_by.items().iter().enumerate() {
        let (expression, direction) = split_direction(item);
        let alias = match settings.columns.output_name_of(&expression) {
            Some(alias) => alias,
            None if settings.columns.returns_all_columns() && output_name(&expression).is_some() => {
                output_name(&expression).unwrap_or_default()
            }
            None => {
                let alias = format!("OrderBy{}", index);
                let key = if regroup {
                    ordering_aggregate(&expression, direction.as_deref())
                } else {
                    expression
                };
                hidden.push(format!("{} AS {}", key, alias));
                alias
            }
        };
        outer.push(match direction {
            Some(direction) => format!("{} {}", alias, direction),
            None => alias,
        });
    }

    if regroup && !hidden.is_empty() {
        if settings.columns.returns_all_columns() || !settings.group_by.is_empty() {
            return None;
        }
        let groups: Vec<String> = settings
            .columns
            .items()
            .iter()
            .chain(settings.filter_columns.items())
            .map(|c| column_expression(c))
            .collect();
        let settings = &mut inner.settings;
        settings.distinct = false;
        settings.group_by = ColumnList::from_items(groups);
        if settings.top_n > 0 {
            settings.order_by = ColumnList::from_items(outer.iter().cloned());
        }
    }
    inner.settings.filter_columns.extend(hidden);
    Some(outer)
}

/// Composition methods available on every query type.
pub trait NestedQuery: ExecutableQuery {
    /// Wrap a snapshot of this query as the source of a new `T`.
    ///
    /// With the default policy the outer query carries the order-by and
    /// paging, so it can be filtered on the inner query's outputs. An outer
    /// query that ends up adding nothing executes as the inner query.
    fn as_nested<T: QueryBuilder>(&self, policy: NestingPolicy) -> T {
        let mut inner = self.definition().clone();
        inner.settings.is_nested = true;
        inner.settings.is_sub_query = false;

        let context = if policy.share_source {
            inner.context.clone()
        } else {
            inner.context.clone().without_data_source()
        };
        let mut outer = T::create(context);

        // Paging stays wherever the ordering stays.
        let mut order_kept_inside = false;
        let order = if policy.translate_order_by && !inner.settings.order_by.is_empty() {
            match translate_order(&mut inner) {
                Some(order) => {
                    if inner.settings.top_n == 0 {
                        inner.settings.order_by.clear();
                    }
                    order
                }
                None => {
                    log::debug!("Order-by cannot leave the distinct inner query, keeping it there");
                    order_kept_inside = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let (offset, max_records) = if policy.move_paging && !order_kept_inside {
            let paging = (inner.settings.offset, inner.settings.max_records);
            inner.settings.offset = 0;
            inner.settings.max_records = 0;
            paging
        } else {
            (0, 0)
        };

        let settings = outer.core_mut().settings_mut();
        settings.object_type = inner.settings.object_type.clone();
        settings.comment = inner.settings.comment.take();
        settings.order_by = ColumnList::from_items(order);
        settings.offset = offset;
        settings.max_records = max_records;
        settings.source = Some(QuerySource::SubQuery(Box::new(inner)));
        outer
    }

    /// Use this query inside `IN (...)`: one column, no order-by unless TopN
    /// or paging is set, no comment.
    fn as_sub_query(self) -> Self {
        self.with_settings(|s| s.is_sub_query = true)
    }

    /// Reduce the select list to one column now.
    ///
    /// `force` replaces an already single column with `default_column`, or
    /// with the identity column when no default is given.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Configuration` when no column can be resolved.
    fn as_single_column(self, default_column: Option<&str>, force: bool) -> Result<Self, QueryError> {
        let columns = single_column(self.definition(), default_column, force)?;
        Ok(self.with_settings(|s| s.columns = columns))
    }

    fn union<Q: QueryBuilder>(self, other: &Q) -> Self {
        self.combine_with(SetOperator::Union, other)
    }

    fn union_all<Q: QueryBuilder>(self, other: &Q) -> Self {
        self.combine_with(SetOperator::UnionAll, other)
    }

    fn intersect<Q: QueryBuilder>(self, other: &Q) -> Self {
        self.combine_with(SetOperator::Intersect, other)
    }

    fn except<Q: QueryBuilder>(self, other: &Q) -> Self {
        self.combine_with(SetOperator::Except, other)
    }

    /// Combined query of this type; a plain combined query gains an operand.
    #[doc(hidden)]
    fn combine_with<Q: QueryBuilder>(self, operator: SetOperator, other: &Q) -> Self {
        let operand = CombinedOperand {
            operator: Some(operator),
            query: other.definition().clone(),
        };
        if self.definition().is_plain_combined() {
            return self.with_settings(|s| {
                if let Some(QuerySource::Combined(operands)) = &mut s.source {
                    operands.push(operand);
                }
            });
        }

        let first = self.definition().clone();
        let object_type = first.settings.object_type.clone();
        Self::create(self.context().clone()).with_settings(|s| {
            s.object_type = object_type;
            s.source = Some(QuerySource::Combined(vec![
                CombinedOperand {
                    operator: None,
                    query: first,
                },
                operand,
            ]));
        })
    }

    /// Execute a single-column variant now and keep its values.
    ///
    /// Later changes to the underlying data are not reflected in the list.
    fn as_materialized_list(&self, column: &str, distinct: bool) -> Result<MaterializedList, QueryError> {
        let mut definition = self.definition().clone();
        definition.settings.columns = if column.trim().is_empty() {
            single_column(&definition, None, false)?
        } else {
            ColumnList::from_items([column])
        };
        definition.settings.distinct |= distinct;
        let name = definition
            .settings
            .columns
            .items()
            .first()
            .and_then(|c| output_name(c))
            .unwrap_or_else(|| column.trim().to_string());

        let mut query = Self::create(definition.context.clone());
        query.core_mut().set_definition(definition);
        let result = query.result()?;
        log::debug!("Materialized {} values of {}", result.len(), name);
        Ok(MaterializedList::new(name, result.column_values(0)))
    }
}

impl<Q: ExecutableQuery> NestedQuery for Q {}
