//! Where/having conditions and named query parameters.

use crate::error::QueryError;
use crate::normalize::identifiers_equal;
use crate::query::settings::QueryDefinition;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::{IntoCondition, PostgresQueryBuilder, Query, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static PARAMETER_COUNTER: AtomicUsize = AtomicUsize::new(0);

static POSITIONAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

/// Generate a unique parameter name (`p0`, `p1`, ...).
pub(crate) fn next_parameter_name() -> String {
    format!("p{}", PARAMETER_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Ordered map of parameter name to value.
///
/// Names are referenced in query text as `@name` and compared
/// case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDataParameters {
    entries: Vec<(String, Value)>,
}

impl QueryDataParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.trim_start_matches('@');
        self.entries
            .iter()
            .find(|(n, _)| identifiers_equal(n, name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Add a parameter.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Configuration` if the name is already bound to a
    /// different value.
    pub fn add(&mut self, name: &str, value: Value) -> Result<(), QueryError> {
        let name = name.trim().trim_start_matches('@');
        if name.is_empty() {
            return Err(QueryError::configuration("Parameter name cannot be empty"));
        }
        match self.get(name) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(QueryError::Configuration(format!(
                "Parameter '@{}' is already bound to {:?}, cannot rebind it to {:?}",
                name, existing, value
            ))),
            None => {
                self.entries.push((name.to_string(), value));
                Ok(())
            }
        }
    }

    /// Add a parameter under a name from [`next_parameter_name`].
    pub(crate) fn push_generated(&mut self, name: String, value: Value) {
        self.entries.push((name, value));
    }

    /// Merge another parameter map into this one.
    pub fn merge(&mut self, other: &QueryDataParameters) -> Result<(), QueryError> {
        for (name, value) in &other.entries {
            self.add(name, value.clone())?;
        }
        Ok(())
    }
}

/// How a condition joins the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    fn as_sql(self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// One piece of a where or having condition.
#[derive(Debug, Clone)]
pub enum ConditionPart {
    /// Condition text, possibly referencing `@name` parameters
    Text(String),
    /// `column [NOT] IN (sub-query)`, generated together with the outer text
    InQuery {
        column: String,
        negate: bool,
        query: Box<QueryDefinition>,
    },
}

/// Condition built from parts joined by `AND`/`OR`, in call order.
///
/// `a.and(b).or(c).and(d)` means `((a AND b) OR c) AND d`.
#[derive(Debug, Clone, Default)]
pub struct WhereCondition {
    parts: Vec<(Conjunction, ConditionPart)>,
}

impl WhereCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> impl Iterator<Item = &ConditionPart> {
        self.parts.iter().map(|(_, p)| p)
    }

    pub fn push(&mut self, conjunction: Conjunction, part: ConditionPart) {
        if let ConditionPart::Text(text) = &part {
            if text.trim().is_empty() {
                return;
            }
        }
        self.parts.push((conjunction, part));
    }

    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Render the condition; sub-queries are generated through `nested`.
    pub(crate) fn render<F>(&self, mut nested: F) -> Result<String, QueryError>
    where
        F: FnMut(&QueryDefinition) -> Result<String, QueryError>,
    {
        let wrap = self.parts.len() > 1;
        let mut text = String::new();
        let mut has_or = false;

        for (index, (conjunction, part)) in self.parts.iter().enumerate() {
            let rendered = match part {
                ConditionPart::Text(t) => t.trim().to_string(),
                ConditionPart::InQuery {
                    column,
                    negate,
                    query,
                } => {
                    let inner = nested(query)?;
                    let op = if *negate { "NOT IN" } else { "IN" };
                    format!("{} {} ({})", column, op, inner)
                }
            };
            let rendered = if wrap {
                format!("({})", rendered)
            } else {
                rendered
            };

            if index == 0 {
                text = rendered;
                continue;
            }
            if *conjunction == Conjunction::And && has_or {
                text = format!("({})", text);
                has_or = false;
            }
            if *conjunction == Conjunction::Or {
                has_or = true;
            }
            text = format!("{} {} {}", text, conjunction.as_sql(), rendered);
        }

        Ok(text)
    }
}

/// Render a sea-query condition as `@name` text plus its parameters.
pub(crate) fn render_sea_condition<C: IntoCondition>(
    condition: C,
) -> (String, Vec<(String, Value)>) {
    let (sql, values) = Query::select()
        .cond_where(condition)
        .build(PostgresQueryBuilder);
    let text = match sql.find("WHERE ") {
        Some(index) => sql[index + "WHERE ".len()..].to_string(),
        None => String::new(),
    };

    let values: Vec<Value> = values.iter().cloned().collect();
    let names: Vec<String> = values.iter().map(|_| next_parameter_name()).collect();
    let text = POSITIONAL_RE
        .replace_all(&text, |c: &regex::Captures| {
            let position: usize = c[1].parse().unwrap_or(0);
            match position.checked_sub(1).and_then(|i| names.get(i)) {
                Some(name) => format!("@{}", name),
                None => c[0].to_string(),
            }
        })
        .into_owned();

    (text, names.into_iter().zip(values).collect())
}
