//! Column and order-by lists.
//!
//! Column expressions are kept as SQL text. Parsing only needs to understand
//! enough structure to split on top-level commas, find output aliases and
//! strip sort directions.

use crate::normalize::{identifiers_equal, unquote};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

static ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^(.*\S)\s+AS\s+("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)$"#).unwrap()
});

static IDENTIFIER_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:(?:"[^"]+"|[A-Za-z_][A-Za-z0-9_]*)\.)*("[^"]+"|[A-Za-z_][A-Za-z0-9_]*)$"#)
        .unwrap()
});

static DIRECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?\S)\s+((?:ASC|DESC)(?:\s+NULLS\s+(?:FIRST|LAST))?|NULLS\s+(?:FIRST|LAST))$")
        .unwrap()
});

static DISTINCT_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*DISTINCT\s+(.*)$").unwrap());

/// Split SQL text on commas that are not nested in parentheses, brackets or quotes.
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Detect a leading `DISTINCT ` token in a column string.
///
/// Returns the remaining column text when the token is present.
pub(crate) fn strip_distinct_prefix(text: &str) -> Option<String> {
    DISTINCT_PREFIX_RE
        .captures(text)
        .map(|c| c[1].trim().to_string())
}

/// Output name of a column expression: the alias, or the last part of a
/// (possibly qualified) identifier. Expressions without an alias have none.
pub fn output_name(expression: &str) -> Option<String> {
    let expression = expression.trim();
    if let Some(captures) = ALIAS_RE.captures(expression) {
        return Some(unquote(&captures[2]).to_string());
    }
    IDENTIFIER_PATH_RE
        .captures(expression)
        .map(|c| unquote(&c[1]).to_string())
}

/// Split an order-by item into its expression and direction suffix.
pub fn split_direction(item: &str) -> (String, Option<String>) {
    let item = item.trim();
    match DIRECTION_RE.captures(item) {
        Some(c) => (c[1].trim().to_string(), Some(c[2].to_uppercase())),
        None => (item.to_string(), None),
    }
}

/// Replace whole-word, case-insensitive occurrences of `old` in `text`.
///
/// One pass: `new` is inserted as-is and never rescanned.
pub fn replace_whole_word(text: &str, old: &str, new: &str) -> String {
    let old = old.trim();
    if old.is_empty() {
        return text.to_string();
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let leading = if old.starts_with(is_word) { r"\b" } else { "" };
    let trailing = if old.ends_with(is_word) { r"\b" } else { "" };
    let pattern = format!("(?i){}{}{}", leading, regex::escape(old), trailing);
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, NoExpand(new)).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Expression part of a column, without its `AS alias`.
pub fn column_expression(item: &str) -> String {
    let item = item.trim();
    match ALIAS_RE.captures(item) {
        Some(captures) => captures[1].trim().to_string(),
        None => item.to_string(),
    }
}

/// Aggregate that keeps an ordering key usable once rows are grouped:
/// `MAX` for descending order, `MIN` otherwise.
pub fn ordering_aggregate(expression: &str, direction: Option<&str>) -> String {
    let descending = direction.is_some_and(|d| d.trim_start().to_uppercase().starts_with("DESC"));
    if descending {
        format!("MAX({})", expression)
    } else {
        format!("MIN({})", expression)
    }
}

/// Ordered, de-duplicated list of column expressions.
///
/// An empty list, or one containing `*`, returns all columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnList {
    items: Vec<String>,
}

impl ColumnList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from expressions, dropping blanks and duplicates.
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        list.extend(items);
        list
    }

    /// Parse a comma-joined column string.
    pub fn parse(text: &str) -> Self {
        Self::from_items(split_top_level(text))
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn returns_all_columns(&self) -> bool {
        self.items.is_empty() || self.items.iter().any(|c| c.trim() == "*")
    }

    /// Exactly one explicit output column.
    pub fn is_single_column(&self) -> bool {
        self.items.len() == 1 && !self.returns_all_columns()
    }

    pub fn contains(&self, expression: &str) -> bool {
        self.items.iter().any(|c| identifiers_equal(c, expression))
    }

    pub fn push(&mut self, expression: impl Into<String>) {
        let expression = expression.into().trim().to_string();
        if !expression.is_empty() && !self.contains(&expression) {
            self.items.push(expression);
        }
    }

    pub fn extend<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for item in items {
            self.push(item);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Replace every column equal to `old` (or whose output name is `old`)
    /// with `new`. Returns `true` when something changed.
    pub fn replace(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for item in &mut self.items {
            let matches = identifiers_equal(item, old)
                || output_name(item).is_some_and(|n| identifiers_equal(&n, old) && !item.contains(' '));
            if matches {
                *item = new.trim().to_string();
                changed = true;
            }
        }
        if changed {
            let items = std::mem::take(&mut self.items);
            self.extend(items);
        }
        changed
    }

    /// Output names of the columns; `None` for unaliased expressions.
    pub fn output_names(&self) -> Vec<Option<String>> {
        self.items.iter().map(|c| output_name(c)).collect()
    }

    /// Find the output name under which `expression` is exposed, if any.
    pub fn output_name_of(&self, expression: &str) -> Option<String> {
        let expression = expression.trim();
        for item in &self.items {
            if let Some(captures) = ALIAS_RE.captures(item) {
                let alias = unquote(&captures[2]);
                if identifiers_equal(&captures[1], expression) || identifiers_equal(alias, expression) {
                    return Some(alias.to_string());
                }
            } else if identifiers_equal(item, expression) {
                return output_name(item);
            } else if let (Some(a), Some(b)) = (output_name(item), output_name(expression)) {
                if identifiers_equal(&a, &b) && IDENTIFIER_PATH_RE.is_match(expression) {
                    return Some(a);
                }
            }
        }
        None
    }

    /// Render as a select list; all columns render as `*`.
    pub fn to_sql(&self) -> String {
        if self.items.is_empty() {
            "*".to_string()
        } else {
            self.items.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_parentheses_and_quotes() {
        let parts = split_top_level("A, COALESCE(B, C) AS D, 'x,y' AS E, [F,G]");
        assert_eq!(parts, vec!["A", "COALESCE(B, C) AS D", "'x,y' AS E", "[F,G]"]);
    }

    #[test]
    fn test_parse_deduplicates_case_insensitively() {
        let list = ColumnList::parse("ArticleID, articleid, ArticleTitle");
        assert_eq!(list.items(), &["ArticleID".to_string(), "ArticleTitle".to_string()]);
    }

    #[test]
    fn test_returns_all_columns() {
        assert!(ColumnList::new().returns_all_columns());
        assert!(ColumnList::parse("*").returns_all_columns());
        assert!(!ColumnList::parse("A").returns_all_columns());
        assert!(ColumnList::parse("A").is_single_column());
        assert!(!ColumnList::parse("*").is_single_column());
    }

    #[test]
    fn test_strip_distinct_prefix() {
        assert_eq!(strip_distinct_prefix("DISTINCT A, B").as_deref(), Some("A, B"));
        assert_eq!(strip_distinct_prefix("distinct  A").as_deref(), Some("A"));
        assert_eq!(strip_distinct_prefix("DistinctName"), None);
    }

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("ArticleID").as_deref(), Some("ArticleID"));
        assert_eq!(output_name("a.ArticleID").as_deref(), Some("ArticleID"));
        assert_eq!(output_name("\"a\".\"Title\"").as_deref(), Some("Title"));
        assert_eq!(output_name("COUNT(*) AS Total").as_deref(), Some("Total"));
        assert_eq!(output_name("COUNT(*)"), None);
    }

    #[test]
    fn test_split_direction() {
        assert_eq!(split_direction("Title DESC"), ("Title".to_string(), Some("DESC".to_string())));
        assert_eq!(
            split_direction("Title asc nulls last"),
            ("Title".to_string(), Some("ASC NULLS LAST".to_string()))
        );
        assert_eq!(split_direction("Description"), ("Description".to_string(), None));
    }

    #[test]
    fn test_replace_whole_word() {
        assert_eq!(
            replace_whole_word("ArticleTitle DESC, ArticleTitleShort", "articletitle", "Name"),
            "Name DESC, ArticleTitleShort"
        );
        assert_eq!(replace_whole_word("A, A", "A", "B"), "B, B");
    }

    #[test]
    fn test_replace_whole_word_when_new_contains_old() {
        assert_eq!(
            replace_whole_word("ArticleTitle DESC", "ArticleTitle", "a.ArticleTitle"),
            "a.ArticleTitle DESC"
        );
        assert_eq!(
            replace_whole_word("ArticleTitle, ArticleID", "articletitle", "COALESCE(ArticleTitle, '')"),
            "COALESCE(ArticleTitle, ''), ArticleID"
        );
        assert_eq!(replace_whole_word("Price$", "Price$", "Cost"), "Cost");
    }

    #[test]
    fn test_column_expression_and_ordering_aggregate() {
        assert_eq!(column_expression("UPPER(Title) AS UpperTitle"), "UPPER(Title)");
        assert_eq!(column_expression("ArticleID"), "ArticleID");
        assert_eq!(ordering_aggregate("ArticleID", Some("DESC NULLS LAST")), "MAX(ArticleID)");
        assert_eq!(ordering_aggregate("LEN(Title)", None), "MIN(LEN(Title))");
    }

    #[test]
    fn test_output_name_of() {
        let list = ColumnList::parse("a.ArticleID, UPPER(Title) AS UpperTitle");
        assert_eq!(list.output_name_of("ArticleID").as_deref(), Some("ArticleID"));
        assert_eq!(list.output_name_of("UPPER(Title)").as_deref(), Some("UpperTitle"));
        assert_eq!(list.output_name_of("Missing"), None);
    }
}
