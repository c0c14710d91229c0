//! Query text generation.
//!
//! Compiles a [`QueryDefinition`] into [`QueryParameters`]. Generation never
//! mutates the definition, so identical settings always produce
//! byte-identical text; the cache layer relies on that.

use crate::error::QueryError;
use crate::query::columns::{
    column_expression, ordering_aggregate, output_name, split_direction, split_top_level,
    ColumnList,
};
use crate::query::condition::{QueryDataParameters, WhereCondition};
use crate::query::parameters::{QueryKind, QueryParameters};
use crate::query::settings::{CombinedOperand, QueryDefinition, QuerySource};

const SUB_DATA: &str = "SubData";

const COLUMNS_MACRO: &str = "##COLUMNS##";
const WHERE_MACRO: &str = "##WHERE##";
const ORDER_BY_MACRO: &str = "##ORDERBY##";
const TOP_N_MACRO: &str = "##TOPN##";
const DISTINCT_MACRO: &str = "##DISTINCT##";

/// What the generated text is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPurpose {
    /// Top-level statement returning the rows
    Execute,
    /// Total-record count over the same predicate, unpaged and unordered
    Count,
    /// Source or condition inside another statement
    Nested,
}

#[derive(Default)]
struct Generation {
    parameters: QueryDataParameters,
    excluded: Vec<String>,
}

impl Generation {
    fn exclude(&mut self, alias: String) {
        if !self.excluded.iter().any(|e| e.eq_ignore_ascii_case(&alias)) {
            self.excluded.push(alias);
        }
    }
}

/// Generate the statement for `definition`.
///
/// # Errors
///
/// - `QueryError::PagingRequiresOrderBy` when paging has no usable order-by
/// - `QueryError::QueryDefinitionNotFound` when a named query is unknown
/// - `QueryError::Configuration` for unresolvable sources, single-column
///   coercion failures, conflicting parameters or mismatched combined operands
pub fn generate(
    definition: &QueryDefinition,
    purpose: GenerationPurpose,
) -> Result<QueryParameters, QueryError> {
    let settings = &definition.settings;
    let mut generation = Generation::default();
    let (text, kind) = build_text(definition, purpose, &mut generation)?;

    let text = match (&settings.comment, purpose) {
        (Some(comment), GenerationPurpose::Execute)
            if !settings.is_sub_query && !settings.is_nested =>
        {
            format!("/* {} */ {}", comment.replace("*/", "* /"), text)
        }
        _ => text,
    };
    log::debug!("Generated {:?} query: {}", purpose, text);

    // Counts keep the TopN ceiling so sources that ignore the text agree
    // with the count statement.
    let mut parameters = QueryParameters::new(text, kind)
        .with_parameters(generation.parameters)
        .with_excluded_columns(generation.excluded)
        .with_top_n(settings.top_n);
    if purpose != GenerationPurpose::Count && settings.is_paged() {
        parameters = parameters.with_paging(settings.offset, settings.max_records);
    }
    Ok(parameters)
}

fn build_text(
    definition: &QueryDefinition,
    purpose: GenerationPurpose,
    generation: &mut Generation,
) -> Result<(String, QueryKind), QueryError> {
    let settings = &definition.settings;
    generation.parameters.merge(&settings.parameters)?;

    if purpose == GenerationPurpose::Count {
        return build_count(definition, generation);
    }
    let nested = purpose == GenerationPurpose::Nested || settings.is_sub_query;

    match &settings.source {
        Some(QuerySource::Combined(operands)) if definition.is_plain_combined() => {
            let text = combine(operands, generation)?;
            return Ok((text, QueryKind::Combined));
        }
        Some(QuerySource::Named(name)) => {
            let template = resolve_named(definition, name)?;
            if let Some(text) = expand_macros(definition, &template, nested, generation)? {
                return Ok((text, QueryKind::Named));
            }
        }
        _ => {}
    }

    let kind = match &settings.source {
        Some(QuerySource::Named(_)) => QueryKind::Named,
        Some(QuerySource::Combined(_)) => QueryKind::Combined,
        _ => QueryKind::Select,
    };
    let text = build_select(definition, nested, generation)?;
    Ok((text, kind))
}

fn build_select(
    definition: &QueryDefinition,
    nested: bool,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    let settings = &definition.settings;
    let source = render_source(definition, generation)?;
    let columns = resolve_columns(definition, true)?;
    let filter_columns = visible_filter_columns(definition, generation);
    let order = effective_order(definition, nested)?;
    let tail = render_filters(definition, generation)?;
    let window = window_clause(definition);

    if settings.distinct && settings.is_paged() {
        return distinct_paged(
            definition,
            &columns,
            &filter_columns,
            &order,
            &source,
            &tail,
            window.as_deref(),
            generation,
        );
    }

    let mut sql = String::from("SELECT ");
    if settings.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&select_list(&columns, &filter_columns));
    sql.push_str(" FROM ");
    sql.push_str(&source);
    sql.push_str(&tail);
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    if let Some(window) = window {
        sql.push(' ');
        sql.push_str(&window);
    }
    Ok(sql)
}

/// Distinct with paging: the distinct select becomes a nested source so
/// ordering and windowing happen on its output.
///
/// An order expression that is not an output must stay out of the
/// distinctness. The inner select then groups by its columns and exposes
/// the key as `MIN(expr)` or `MAX(expr)`.
#[allow(clippy::too_many_arguments)]
fn distinct_paged(
    definition: &QueryDefinition,
    columns: &ColumnList,
    filter_columns: &ColumnList,
    order: &[String],
    source: &str,
    tail: &str,
    window: Option<&str>,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    let mut inner_columns = filter_columns.clone();
    let mut outer_order = Vec::with_capacity(order.len());
    let mut hidden_key: Option<String> = None;

    for (index, item) in order.iter().enumerate() {
        let (expression, direction) = split_direction(item);
        let alias = match columns.output_name_of(&expression) {
            Some(alias) => alias,
            None if columns.returns_all_columns() && output_name(&expression).is_some() => {
                output_name(&expression).unwrap_or_default()
            }
            None => {
                let alias = format!("OrderBy{}", index);
                inner_columns.push(format!(
                    "{} AS {}",
                    ordering_aggregate(&expression, direction.as_deref()),
                    alias
                ));
                generation.exclude(alias.clone());
                hidden_key.get_or_insert(expression);
                alias
            }
        };
        outer_order.push(match direction {
            Some(direction) => format!("{} {}", alias, direction),
            None => alias,
        });
    }

    let inner = match hidden_key {
        None => format!(
            "SELECT DISTINCT {} FROM {}{}",
            select_list(columns, &inner_columns),
            source,
            tail
        ),
        Some(expression) => {
            if columns.returns_all_columns() || !definition.settings.group_by.is_empty() {
                return Err(QueryError::Configuration(format!(
                    "Distinct paged query orders by '{}', which is not one of its output columns; select it explicitly",
                    expression
                )));
            }
            let groups: Vec<String> = columns
                .items()
                .iter()
                .chain(filter_columns.items())
                .map(|c| column_expression(c))
                .collect();
            format!(
                "SELECT {} FROM {}{} GROUP BY {}",
                select_list(columns, &inner_columns),
                source,
                tail,
                groups.join(", ")
            )
        }
    };

    let names: Vec<Option<String>> = columns.output_names();
    let outer_columns = if columns.returns_all_columns() || names.iter().any(Option::is_none) {
        "*".to_string()
    } else {
        names.into_iter().flatten().collect::<Vec<_>>().join(", ")
    };

    let mut sql = format!("SELECT {} FROM ({}) AS {}", outer_columns, inner, SUB_DATA);
    if !outer_order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&outer_order.join(", "));
    }
    if let Some(window) = window {
        sql.push(' ');
        sql.push_str(window);
    }
    Ok(sql)
}

fn build_count(
    definition: &QueryDefinition,
    generation: &mut Generation,
) -> Result<(String, QueryKind), QueryError> {
    if let Some(inner) = definition.pass_through_target() {
        return build_text(inner, GenerationPurpose::Count, generation);
    }

    let settings = &definition.settings;
    let expression = settings
        .total_expression
        .clone()
        .unwrap_or_else(|| "COUNT(*)".to_string());
    let wrap = !settings.group_by.is_empty()
        || !settings.having.is_empty()
        || settings.distinct
        || settings.top_n > 0
        || matches!(
            settings.source,
            Some(QuerySource::Named(_)) | Some(QuerySource::Combined(_))
        );

    let text = if wrap {
        let mut unpaged = definition.clone();
        unpaged.settings.max_records = 0;
        unpaged.settings.offset = 0;
        unpaged.settings.comment = None;
        let (inner, _) = build_text(&unpaged, GenerationPurpose::Nested, generation)?;
        format!("SELECT {} FROM ({}) AS {}", expression, inner, SUB_DATA)
    } else {
        let source = render_source(definition, generation)?;
        let tail = render_filters(definition, generation)?;
        format!("SELECT {} FROM {}{}", expression, source, tail)
    };
    Ok((text, QueryKind::Count))
}

/// Explicit source, then default source, then the schema's table, then the
/// object type name.
fn render_source(
    definition: &QueryDefinition,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    let settings = &definition.settings;
    match settings.source.as_ref().or(settings.default_source.as_ref()) {
        Some(QuerySource::Table(name)) => Ok(name.clone()),
        Some(QuerySource::Named(name)) => {
            let text = resolve_named(definition, name)?;
            Ok(format!("({}) AS {}", text, SUB_DATA))
        }
        Some(QuerySource::SubQuery(inner)) => {
            let (text, _) = build_text(inner, GenerationPurpose::Nested, generation)?;
            Ok(format!("({}) AS {}", text, SUB_DATA))
        }
        Some(QuerySource::Combined(operands)) => {
            let text = combine(operands, generation)?;
            Ok(format!("({}) AS {}", text, SUB_DATA))
        }
        None => {
            if let Some(schema) = definition.schema() {
                if !schema.default_table_name.trim().is_empty() {
                    return Ok(schema.default_table_name);
                }
            }
            settings.object_type.clone().ok_or_else(|| {
                QueryError::configuration(
                    "Query has no source: set a source, a default source or an object type",
                )
            })
        }
    }
}

fn combine(operands: &[CombinedOperand], generation: &mut Generation) -> Result<String, QueryError> {
    let mut expected: Option<usize> = None;
    let mut text = String::new();

    for operand in operands {
        let columns = &operand.query.settings.columns;
        if !columns.returns_all_columns() {
            match expected {
                Some(count) if count != columns.len() => {
                    return Err(QueryError::Configuration(format!(
                        "Combined queries must return the same number of columns ({} vs {})",
                        count,
                        columns.len()
                    )));
                }
                _ => expected = Some(columns.len()),
            }
        }

        let inner = nested_condition_text(&operand.query, generation)?;
        if let Some(operator) = operand.operator {
            text.push(' ');
            text.push_str(operator.as_sql());
            text.push(' ');
        }
        text.push('(');
        text.push_str(&inner);
        text.push(')');
    }
    Ok(text)
}

/// Nested text whose internal columns never reach the outer result.
fn nested_condition_text(
    definition: &QueryDefinition,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    let mut inner = Generation {
        parameters: std::mem::take(&mut generation.parameters),
        excluded: Vec::new(),
    };
    let result = build_text(definition, GenerationPurpose::Nested, &mut inner);
    generation.parameters = inner.parameters;
    result.map(|(text, _)| text)
}

fn resolve_named(definition: &QueryDefinition, name: &str) -> Result<String, QueryError> {
    let full_name = definition.qualify_query_name(name);
    definition
        .context
        .query_catalog()
        .and_then(|catalog| catalog.resolve(&full_name))
        .ok_or(QueryError::QueryDefinitionNotFound(full_name))
}

/// Substitute clause macros in a named query.
///
/// Returns `None` when a configured clause has no macro to land in, in
/// which case the named text is used as a nested source instead.
fn expand_macros(
    definition: &QueryDefinition,
    template: &str,
    nested: bool,
    generation: &mut Generation,
) -> Result<Option<String>, QueryError> {
    let settings = &definition.settings;
    if !settings.group_by.is_empty()
        || !settings.having.is_empty()
        || (settings.distinct && settings.is_paged())
    {
        return Ok(None);
    }

    let order = effective_order(definition, nested)?;
    let required = [
        (
            !settings.columns.returns_all_columns() || !settings.filter_columns.is_empty(),
            COLUMNS_MACRO,
        ),
        (
            !settings.where_condition.is_empty() || settings.no_results,
            WHERE_MACRO,
        ),
        (!order.is_empty(), ORDER_BY_MACRO),
        (settings.top_n > 0, TOP_N_MACRO),
        (settings.distinct, DISTINCT_MACRO),
    ];
    if required
        .iter()
        .any(|(needed, token)| *needed && !template.contains(token))
    {
        log::debug!("Named query lacks a required macro, nesting it instead");
        return Ok(None);
    }

    let columns = resolve_columns(definition, false)?;
    let filter_columns = visible_filter_columns(definition, generation);
    let condition = render_where(definition, generation)?;
    let top_n = if settings.top_n > 0 && !settings.is_paged() {
        format!("LIMIT {}", settings.top_n)
    } else {
        String::new()
    };

    let mut sql = template
        .replace(COLUMNS_MACRO, &select_list(&columns, &filter_columns))
        .replace(WHERE_MACRO, condition.as_deref().unwrap_or("1 = 1"))
        .replace(
            ORDER_BY_MACRO,
            &if order.is_empty() {
                "(SELECT NULL)".to_string()
            } else {
                order.join(", ")
            },
        )
        .replace(TOP_N_MACRO, &top_n)
        .replace(DISTINCT_MACRO, if settings.distinct { "DISTINCT" } else { "" });

    if settings.is_paged() {
        if let Some(window) = window_clause(definition) {
            sql.push(' ');
            sql.push_str(&window);
        }
    }
    Ok(Some(sql))
}

/// Select list for the query, expanded or coerced as its context requires.
fn resolve_columns(definition: &QueryDefinition, expand: bool) -> Result<ColumnList, QueryError> {
    let settings = &definition.settings;
    if settings.is_sub_query {
        return single_column(definition, None, false);
    }

    let reads_schema_table = matches!(
        settings.source.as_ref().or(settings.default_source.as_ref()),
        None | Some(QuerySource::Table(_))
    );
    if expand
        && settings.columns.returns_all_columns()
        && !settings.include_binary_columns
        && reads_schema_table
    {
        if let Some(schema) = definition.schema() {
            if !schema.binary_columns.is_empty() && !schema.column_names.is_empty() {
                return Ok(ColumnList::from_items(schema.non_binary_columns()));
            }
        }
    }
    Ok(settings.columns.clone())
}

/// Coerce to a single column: the explicit single column (unless `force`),
/// `default_column`, or the schema's identity column.
pub(crate) fn single_column(
    definition: &QueryDefinition,
    default_column: Option<&str>,
    force: bool,
) -> Result<ColumnList, QueryError> {
    let columns = &definition.settings.columns;
    if !force && columns.is_single_column() {
        return Ok(columns.clone());
    }
    if let Some(column) = default_column.filter(|c| !c.trim().is_empty()) {
        return Ok(ColumnList::from_items([column]));
    }
    if let Some(identity) = definition.schema().and_then(|s| s.identity_column) {
        return Ok(ColumnList::from_items([identity]));
    }
    Err(QueryError::Configuration(format!(
        "Cannot reduce query on '{}' to a single column: specify the column explicitly, the object type has no identity column",
        definition.settings.object_type.as_deref().unwrap_or("<unknown>")
    )))
}

fn visible_filter_columns(definition: &QueryDefinition, generation: &mut Generation) -> ColumnList {
    let settings = &definition.settings;
    if settings.is_sub_query {
        return ColumnList::new();
    }
    for column in settings.filter_columns.items() {
        if let Some(alias) = output_name(column) {
            generation.exclude(alias);
        }
    }
    settings.filter_columns.clone()
}

fn select_list(columns: &ColumnList, filter_columns: &ColumnList) -> String {
    if filter_columns.is_empty() {
        columns.to_sql()
    } else {
        format!("{}, {}", columns.to_sql(), filter_columns.to_sql())
    }
}

/// Order-by items in effect, including the schema default for paging.
fn effective_order(definition: &QueryDefinition, nested: bool) -> Result<Vec<String>, QueryError> {
    let settings = &definition.settings;
    let paged = settings.is_paged();
    let mut order: Vec<String> = settings.order_by.items().to_vec();

    if order.is_empty() && (paged || settings.force_order_by) {
        match definition.schema().and_then(|s| s.default_order()) {
            Some(default) => order = split_top_level(&default),
            None if paged => {
                return Err(QueryError::PagingRequiresOrderBy(format!(
                    "query on '{}' is paged but has no order by and no default order",
                    settings.object_type.as_deref().unwrap_or("<unknown>")
                )));
            }
            None => {}
        }
    }

    if nested && settings.top_n == 0 && !paged {
        order.clear();
    }
    Ok(order)
}

fn render_condition(
    condition: &WhereCondition,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    condition.render(|inner| nested_condition_text(inner, generation))
}

fn render_where(
    definition: &QueryDefinition,
    generation: &mut Generation,
) -> Result<Option<String>, QueryError> {
    let settings = &definition.settings;
    let condition = render_condition(&settings.where_condition, generation)?;
    let condition = match (condition.is_empty(), settings.no_results) {
        (true, false) => None,
        (true, true) => Some("1 = 0".to_string()),
        (false, false) => Some(condition),
        (false, true) => Some(format!("({}) AND 1 = 0", condition)),
    };
    Ok(condition)
}

/// ` WHERE .. GROUP BY .. HAVING ..` part of a select.
fn render_filters(
    definition: &QueryDefinition,
    generation: &mut Generation,
) -> Result<String, QueryError> {
    let settings = &definition.settings;
    let mut tail = String::new();
    if let Some(condition) = render_where(definition, generation)? {
        tail.push_str(" WHERE ");
        tail.push_str(&condition);
    }
    if !settings.group_by.is_empty() {
        tail.push_str(" GROUP BY ");
        tail.push_str(&settings.group_by.to_sql());
        let having = render_condition(&settings.having, generation)?;
        if !having.is_empty() {
            tail.push_str(" HAVING ");
            tail.push_str(&having);
        }
    }
    Ok(tail)
}

/// `LIMIT/OFFSET` for paging, clipped to TopN; `LIMIT n` for TopN alone.
fn window_clause(definition: &QueryDefinition) -> Option<String> {
    let settings = &definition.settings;
    if settings.is_paged() {
        let limit = if settings.top_n > 0 {
            settings
                .max_records
                .min(settings.top_n.saturating_sub(settings.offset))
        } else {
            settings.max_records
        };
        Some(format!("LIMIT {} OFFSET {}", limit, settings.offset))
    } else if settings.top_n > 0 {
        Some(format!("LIMIT {}", settings.top_n))
    } else {
        None
    }
}
