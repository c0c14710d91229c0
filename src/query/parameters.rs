//! Generated, immutable query text plus everything needed to run it.

use crate::query::condition::QueryDataParameters;
use crate::value::render_literal;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use std::fmt;

static PARAMETER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Shape of the generated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Named,
    Combined,
    Count,
}

/// Output of the text generator.
///
/// The text references parameters as `@name`. [`positional`](Self::positional)
/// produces the `$n` form bound by PostgreSQL and
/// [`expanded_text`](Self::expanded_text) inlines the values for display.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    text: String,
    parameters: QueryDataParameters,
    offset: u64,
    max_records: u64,
    top_n: u64,
    kind: QueryKind,
    excluded_columns: Vec<String>,
}

impl QueryParameters {
    pub fn new(text: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            text: text.into(),
            parameters: QueryDataParameters::new(),
            offset: 0,
            max_records: 0,
            top_n: 0,
            kind,
            excluded_columns: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: QueryDataParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_paging(mut self, offset: u64, max_records: u64) -> Self {
        self.offset = offset;
        self.max_records = max_records;
        self
    }

    pub fn with_top_n(mut self, top_n: u64) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_excluded_columns(mut self, excluded: Vec<String>) -> Self {
        self.excluded_columns = excluded;
        self
    }

    /// Parameterized text (`@name` placeholders).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &QueryDataParameters {
        &self.parameters
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn max_records(&self) -> u64 {
        self.max_records
    }

    pub fn top_n(&self) -> u64 {
        self.top_n
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Aliases of internal filter columns to strip from results.
    pub fn excluded_columns(&self) -> &[String] {
        &self.excluded_columns
    }

    pub fn is_paged(&self) -> bool {
        self.max_records > 0
    }

    /// Text with `$n` placeholders and the values in bind order.
    ///
    /// A name used twice binds once. `@tokens` that are not parameters of
    /// this query are left untouched.
    pub fn positional(&self) -> (String, Vec<Value>) {
        let mut order: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let text = replace_parameters(&self.text, |c: &regex::Captures| {
                let name = &c[1];
                let Some(value) = self.parameters.get(name) else {
                    return c[0].to_string();
                };
                let position = match order.iter().position(|n| n.eq_ignore_ascii_case(name)) {
                    Some(index) => index + 1,
                    None => {
                        order.push(name.to_string());
                        values.push(value.clone());
                        order.len()
                    }
                };
                format!("${}", position)
            });
        (text, values)
    }

    /// Text with every parameter inlined as a literal, for display.
    pub fn expanded_text(&self) -> String {
        replace_parameters(&self.text, |c: &regex::Captures| match self.parameters.get(&c[1]) {
            Some(value) => render_literal(value),
            None => c[0].to_string(),
        })
    }
}

/// Apply `replace` to `@name` tokens outside quoted literals and identifiers.
fn replace_parameters<F>(text: &str, mut replace: F) -> String
where
    F: FnMut(&regex::Captures<'_>) -> String,
{
    let mut result = String::with_capacity(text.len());
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (index, ch) in text.char_indices() {
        match quote {
            Some(q) if ch == q => {
                result.push_str(&text[start..=index]);
                start = index + 1;
                quote = None;
            }
            Some(_) => {}
            None if ch == '\'' || ch == '"' => {
                result.push_str(&PARAMETER_RE.replace_all(&text[start..index], &mut replace));
                start = index;
                quote = Some(ch);
            }
            None => {}
        }
    }
    match quote {
        Some(_) => result.push_str(&text[start..]),
        None => result.push_str(&PARAMETER_RE.replace_all(&text[start..], &mut replace)),
    }
    result
}

impl fmt::Display for QueryParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
