//! Fluent settings builder shared by every concrete query type.
//!
//! Every method consumes the query and returns the same concrete type, so a
//! chain started on an `ObjectQuery<Article>` stays an `ObjectQuery<Article>`.
//! Operations that can be misused return `Result<Self, QueryError>`.
//!
//! ```rust
//! use lifequery::prelude::*;
//!
//! let query = DataQuery::for_object(QueryContext::new(), "cms.article")
//!     .columns(["ArticleID", "ArticleTitle"])
//!     .where_condition("ArticleSiteID = 1")
//!     .order_by(["ArticleTitle"])
//!     .paged_by(20);
//!
//! let text = query.text().unwrap();
//! assert!(text.contains("ORDER BY ArticleTitle LIMIT 20 OFFSET 0"));
//! ```

use crate::error::QueryError;
use crate::query::columns::{replace_whole_word, split_top_level, strip_distinct_prefix, ColumnList};
use crate::query::condition::{next_parameter_name, render_sea_condition, ConditionPart, Conjunction};
use crate::query::data_query::{QueryContext, QueryCore};
use crate::query::nested::MaterializedList;
use crate::query::settings::{QueryDefinition, QuerySettings, QuerySource};
use crate::source::DataSource;
use crate::value::is_null;
use sea_query::{IntoCondition, Order, Value};
use std::sync::Arc;

/// Split caller-supplied column items; a single item may be a comma-joined
/// list, optionally starting with `DISTINCT `.
fn parse_column_items<I, S>(items: I) -> (bool, ColumnList)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items: Vec<String> = items.into_iter().map(|c| c.as_ref().to_string()).collect();
    match items.as_slice() {
        [single] => match strip_distinct_prefix(single) {
            Some(rest) => (true, ColumnList::parse(&rest)),
            None => (false, ColumnList::parse(single)),
        },
        _ => (false, ColumnList::from_items(items)),
    }
}

fn parse_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .flat_map(|c| split_top_level(c.as_ref()))
        .collect()
}

pub trait QueryBuilder: Sized + Send + Sync {
    fn core(&self) -> &QueryCore;

    fn core_mut(&mut self) -> &mut QueryCore;

    /// New, unconfigured instance of the concrete type.
    fn create(context: QueryContext) -> Self;

    /// Copy settings and context into `target`, resetting its cache.
    fn copy_settings_into<T: QueryBuilder>(&self, target: &mut T) {
        target
            .core_mut()
            .set_definition(self.core().definition().clone());
    }

    /// Unexecuted copy with the same settings.
    fn derived(&self) -> Self {
        let mut query = Self::create(self.context().clone());
        self.copy_settings_into(&mut query);
        query
    }

    fn settings(&self) -> &QuerySettings {
        self.core().settings()
    }

    fn context(&self) -> &QueryContext {
        self.core().context()
    }

    fn definition(&self) -> &QueryDefinition {
        self.core().definition()
    }

    /// Apply `f` to the settings, invalidating cached state.
    fn with_settings(mut self, f: impl FnOnce(&mut QuerySettings)) -> Self {
        f(self.core_mut().settings_mut());
        self
    }

    fn with_data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        let context = self.context().clone().with_data_source(source);
        *self.core_mut().context_mut() = context;
        self
    }

    // Columns

    /// Replace the select list.
    fn columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (distinct, columns) = parse_column_items(columns);
        self.with_settings(|s| {
            if distinct {
                s.distinct = true;
            }
            s.columns = columns;
        })
    }

    /// Append to the select list.
    fn add_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (distinct, columns) = parse_column_items(columns);
        self.with_settings(|s| {
            if distinct {
                s.distinct = true;
            }
            s.columns.extend(columns.items().iter().cloned());
        })
    }

    /// Replace a column in the select list and every whole-word reference
    /// to it in the order-by.
    fn replace_column(self, old: &str, new: &str) -> Self {
        self.with_settings(|s| {
            s.columns.replace(old, new);
            s.order_by = ColumnList::from_items(
                s.order_by
                    .items()
                    .iter()
                    .map(|item| replace_whole_word(item, old, new)),
            );
        })
    }

    // Conditions

    fn where_condition(self, condition: &str) -> Self {
        let part = ConditionPart::Text(condition.to_string());
        self.with_settings(|s| s.where_condition.push(Conjunction::And, part))
    }

    fn or_where_condition(self, condition: &str) -> Self {
        let part = ConditionPart::Text(condition.to_string());
        self.with_settings(|s| s.where_condition.push(Conjunction::Or, part))
    }

    /// Condition text referencing `@name` parameters.
    fn where_params<I, N>(mut self, condition: &str, parameters: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: AsRef<str>,
    {
        let settings = self.core_mut().settings_mut();
        for (name, value) in parameters {
            settings.parameters.add(name.as_ref(), value)?;
        }
        settings
            .where_condition
            .push(Conjunction::And, ConditionPart::Text(condition.to_string()));
        Ok(self)
    }

    /// Bind a named parameter used by condition or named-query text.
    fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Result<Self, QueryError> {
        self.core_mut()
            .settings_mut()
            .parameters
            .add(name, value.into())?;
        Ok(self)
    }

    /// sea-query condition; its values become parameters.
    fn filter<C: IntoCondition>(self, condition: C) -> Self {
        let (text, values) = render_sea_condition(condition);
        self.with_settings(|s| {
            for (name, value) in values {
                s.parameters.push_generated(name, value);
            }
            s.where_condition
                .push(Conjunction::And, ConditionPart::Text(text));
        })
    }

    /// `column = value`, or `column IS NULL` for null values.
    fn where_equals(self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if is_null(&value) {
            return self.where_condition(&format!("{} IS NULL", column));
        }
        let name = next_parameter_name();
        let text = format!("{} = @{}", column, name);
        self.with_settings(|s| {
            s.parameters.push_generated(name, value);
            s.where_condition
                .push(Conjunction::And, ConditionPart::Text(text));
        })
    }

    /// `column IN (sub-query)`; the sub-query is snapshot now and generated
    /// with the outer text.
    fn where_in<Q: QueryBuilder>(self, column: &str, query: &Q) -> Self {
        self.push_in_query(column, query, false)
    }

    fn where_not_in<Q: QueryBuilder>(self, column: &str, query: &Q) -> Self {
        self.push_in_query(column, query, true)
    }

    #[doc(hidden)]
    fn push_in_query<Q: QueryBuilder>(self, column: &str, query: &Q, negate: bool) -> Self {
        let mut definition = query.definition().clone();
        definition.settings.is_sub_query = true;
        let part = ConditionPart::InQuery {
            column: column.to_string(),
            negate,
            query: Box::new(definition),
        };
        self.with_settings(|s| s.where_condition.push(Conjunction::And, part))
    }

    /// `column IN (values)` over a materialized list; an empty list matches
    /// nothing.
    fn where_in_list(self, column: &str, list: &MaterializedList) -> Self {
        if list.is_empty() {
            return self.where_condition("1 = 0");
        }
        let named: Vec<(String, Value)> = list
            .values()
            .iter()
            .map(|v| (next_parameter_name(), v.clone()))
            .collect();
        let placeholders: Vec<String> = named.iter().map(|(n, _)| format!("@{}", n)).collect();
        let text = format!("{} IN ({})", column, placeholders.join(", "));
        self.with_settings(|s| {
            for (name, value) in named {
                s.parameters.push_generated(name, value);
            }
            s.where_condition
                .push(Conjunction::And, ConditionPart::Text(text));
        })
    }

    // Ordering

    fn order_by<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items = parse_list(columns);
        self.with_settings(|s| s.order_by.extend(items))
    }

    fn order_by_ascending<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = parse_list(columns)
            .into_iter()
            .map(|c| format!("{} ASC", c))
            .collect();
        self.with_settings(|s| s.order_by.extend(items))
    }

    fn order_by_descending<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = parse_list(columns)
            .into_iter()
            .map(|c| format!("{} DESC", c))
            .collect();
        self.with_settings(|s| s.order_by.extend(items))
    }

    /// Order by a column with a sea-query direction.
    fn order_by_column(self, column: &str, order: Order) -> Self {
        let direction = match order {
            Order::Desc => "DESC",
            _ => "ASC",
        };
        let item = format!("{} {}", column, direction);
        self.with_settings(|s| s.order_by.push(item))
    }

    fn clear_order_by(self) -> Self {
        self.with_settings(|s| s.order_by.clear())
    }

    // Grouping

    /// Set the group-by.
    ///
    /// # Errors
    ///
    /// Fails with `QueryError::Configuration` if a group-by already exists;
    /// use [`new_group_by`](Self::new_group_by) to replace it.
    fn group_by<I, S>(self, columns: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.settings().group_by.is_empty() {
            return Err(QueryError::Configuration(format!(
                "Query is already grouped by '{}', call new_group_by to replace the group by",
                self.settings().group_by.to_sql()
            )));
        }
        let items = parse_list(columns);
        Ok(self.with_settings(|s| s.group_by = ColumnList::from_items(items)))
    }

    /// Replace the group-by; the having condition is cleared with it.
    fn new_group_by<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items = parse_list(columns);
        self.with_settings(|s| {
            s.group_by = ColumnList::from_items(items);
            s.having.clear();
        })
    }

    fn having(self, condition: &str) -> Self {
        let part = ConditionPart::Text(condition.to_string());
        self.with_settings(|s| s.having.push(Conjunction::And, part))
    }

    fn new_having(self, condition: &str) -> Self {
        let part = ConditionPart::Text(condition.to_string());
        self.with_settings(|s| {
            s.having.clear();
            s.having.push(Conjunction::And, part);
        })
    }

    // Row limits

    fn distinct(self) -> Self {
        self.with_settings(|s| s.distinct = true)
    }

    fn top_n(self, top_n: u64) -> Self {
        self.with_settings(|s| s.top_n = top_n)
    }

    /// Page `page_index` (zero-based) of `page_size` rows.
    fn page(self, page_index: u64, page_size: u64) -> Self {
        self.with_settings(|s| {
            s.offset = page_index.saturating_mul(page_size);
            s.max_records = page_size;
        })
    }

    fn paged_by(self, page_size: u64) -> Self {
        self.with_settings(|s| s.max_records = page_size)
    }

    fn offset(self, offset: u64) -> Self {
        self.with_settings(|s| s.offset = offset)
    }

    fn not_paged(self) -> Self {
        self.with_settings(|s| {
            s.offset = 0;
            s.max_records = 0;
        })
    }

    /// Advance the offset by one page.
    ///
    /// # Errors
    ///
    /// Fails with `QueryError::Configuration` if paging is not configured.
    fn next_page(self) -> Result<Self, QueryError> {
        if !self.settings().is_paged() {
            return Err(QueryError::configuration(
                "next_page requires paging, set max records with paged_by or page first",
            ));
        }
        Ok(self.with_settings(|s| s.offset = s.offset.saturating_add(s.max_records)))
    }

    // Source and options

    fn source(self, source: QuerySource) -> Self {
        self.with_settings(|s| s.source = Some(source))
    }

    fn from_table(self, table: &str) -> Self {
        self.source(QuerySource::Table(table.to_string()))
    }

    /// Read from a named query (`name` is qualified with the object type
    /// unless it contains a dot).
    fn from_named_query(self, name: &str) -> Self {
        self.source(QuerySource::Named(name.to_string()))
    }

    fn default_source(self, source: QuerySource) -> Self {
        self.with_settings(|s| s.default_source = Some(source))
    }

    /// Replace `COUNT(*)` in the count variant.
    fn total_expression(self, expression: &str) -> Self {
        let expression = expression.trim().to_string();
        self.with_settings(|s| {
            s.total_expression = (!expression.is_empty()).then_some(expression);
        })
    }

    fn force_order_by(self, force: bool) -> Self {
        self.with_settings(|s| s.force_order_by = force)
    }

    fn include_binary_columns(self, include: bool) -> Self {
        self.with_settings(|s| s.include_binary_columns = include)
    }

    /// Mark the query as unable to return rows; execution is skipped.
    fn no_results(self) -> Self {
        self.with_settings(|s| s.no_results = true)
    }

    fn with_comment(self, comment: &str) -> Self {
        let comment = comment.trim().to_string();
        self.with_settings(|s| s.comment = (!comment.is_empty()).then_some(comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::data_query::DataQuery;
    use sea_query::{Expr, ExprTrait};

    fn article() -> DataQuery {
        DataQuery::for_object(QueryContext::new(), "cms.article")
    }

    #[test]
    fn test_columns_single_string_is_parsed() {
        let query = article().columns(["ArticleID, COALESCE(ArticleTitle, '') AS Title"]);
        assert_eq!(
            query.settings().columns.items(),
            &["ArticleID".to_string(), "COALESCE(ArticleTitle, '') AS Title".to_string()]
        );
        assert!(!query.settings().distinct);
    }

    #[test]
    fn test_columns_distinct_prefix() {
        let query = article().columns(["DISTINCT ArticleSiteID, ArticleParentID"]);
        assert!(query.settings().distinct);
        assert_eq!(query.settings().columns.len(), 2);
    }

    #[test]
    fn test_add_columns_deduplicates() {
        let query = article().columns(["ArticleID"]).add_columns(["articleid", "ArticleTitle"]);
        assert_eq!(query.settings().columns.to_sql(), "ArticleID, ArticleTitle");
    }

    #[test]
    fn test_replace_column_updates_order_by() {
        let query = article()
            .columns(["ArticleID", "ArticleTitle"])
            .order_by(["articletitle DESC, ArticleTitleShort"])
            .replace_column("ArticleTitle", "DocumentName");
        assert_eq!(query.settings().columns.to_sql(), "ArticleID, DocumentName");
        assert_eq!(
            query.settings().order_by.to_sql(),
            "DocumentName DESC, ArticleTitleShort"
        );
    }

    #[test]
    fn test_group_by_twice_fails() {
        let result = article()
            .group_by(["ParentID"])
            .unwrap()
            .having("COUNT(*) > 1")
            .group_by(["OtherCol"]);
        match result {
            Err(QueryError::Configuration(message)) => assert!(message.contains("new_group_by")),
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_new_group_by_clears_having() {
        let query = article()
            .group_by(["ParentID"])
            .unwrap()
            .having("COUNT(*) > 1")
            .new_group_by(["OtherCol"]);
        assert_eq!(query.settings().group_by.to_sql(), "OtherCol");
        assert!(query.settings().having.is_empty());
    }

    #[test]
    fn test_next_page_requires_paging() {
        assert!(matches!(
            article().next_page(),
            Err(QueryError::Configuration(_))
        ));
        let query = article().paged_by(20).next_page().unwrap().next_page().unwrap();
        assert_eq!(query.settings().offset, 40);

        let last = article().offset(u64::MAX - 5).paged_by(20).next_page().unwrap();
        assert_eq!(last.settings().offset, u64::MAX);
    }

    #[test]
    fn test_replace_column_with_qualified_name() {
        let query = article()
            .columns(["ArticleID", "ArticleTitle"])
            .order_by(["ArticleTitle DESC"])
            .replace_column("ArticleTitle", "a.ArticleTitle");
        assert_eq!(query.settings().columns.to_sql(), "ArticleID, a.ArticleTitle");
        assert_eq!(query.settings().order_by.to_sql(), "a.ArticleTitle DESC");
    }

    #[test]
    fn test_page_and_not_paged() {
        let query = article().page(3, 10);
        assert_eq!(query.settings().offset, 30);
        assert_eq!(query.settings().max_records, 10);
        let query = query.not_paged();
        assert!(!query.settings().is_paged());
        assert_eq!(query.settings().offset, 0);
    }

    #[test]
    fn test_where_equals_binds_parameter() {
        let query = article()
            .where_equals("ArticleSiteID", 5)
            .where_equals("ArticleParentID", Value::Int(None));
        assert_eq!(query.settings().parameters.len(), 1);
        let (_, value) = query.settings().parameters.iter().next().unwrap();
        assert_eq!(*value, Value::Int(Some(5)));
        assert_eq!(query.settings().where_condition.parts().count(), 2);
    }

    #[test]
    fn test_where_params_conflict() {
        let result = article()
            .where_params("ArticleSiteID = @SiteID", [("SiteID", Value::Int(Some(1)))])
            .unwrap()
            .with_parameter("siteid", 2);
        assert!(matches!(result, Err(QueryError::Configuration(_))));
    }

    #[test]
    fn test_filter_with_sea_query_condition() {
        let query = article().filter(Expr::col("ArticleSiteID").eq(3));
        assert_eq!(query.settings().parameters.len(), 1);
    }

    #[test]
    fn test_derived_copies_settings_not_cache() {
        let query = article().columns(["ArticleID"]).top_n(5);
        let copy = query.derived();
        assert_eq!(copy.settings().top_n, 5);
        assert_eq!(copy.settings().columns.to_sql(), "ArticleID");
    }

    #[test]
    fn test_order_by_helpers() {
        let query = article()
            .order_by_ascending(["ArticleTitle"])
            .order_by_descending(["ArticleID"])
            .order_by_column("ArticleSiteID", Order::Desc);
        assert_eq!(
            query.settings().order_by.to_sql(),
            "ArticleTitle ASC, ArticleID DESC, ArticleSiteID DESC"
        );
        assert!(query.clear_order_by().settings().order_by.is_empty());
    }
}
