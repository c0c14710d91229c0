//! Collaborator contracts for schema metadata and named queries.
//!
//! The query engine only ever asks two questions of the outside world: "what
//! does object type X look like" and "what is the text of named query Y". Both
//! are traits so the surrounding system can plug in its own catalogs; the
//! in-memory implementations back configuration files and tests.

use crate::normalize::normalize_identifier;
use serde::Deserialize;
use std::collections::HashMap;

/// Schema description of one object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjectSchema {
    /// All column names of the default table, in declaration order
    #[serde(default)]
    pub column_names: Vec<String>,
    /// Identity (primary key) column
    #[serde(default)]
    pub identity_column: Option<String>,
    /// Columns holding binary data, excluded from "all columns" unless requested
    #[serde(default)]
    pub binary_columns: Vec<String>,
    /// Table or view queried when no explicit source is set
    pub default_table_name: String,
    /// Order used when paging without an explicit order-by
    #[serde(default)]
    pub default_order_by: Option<String>,
}

impl ObjectSchema {
    pub fn new(default_table_name: impl Into<String>) -> Self {
        Self {
            default_table_name: default_table_name.into(),
            ..Self::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identity(mut self, column: impl Into<String>) -> Self {
        self.identity_column = Some(column.into());
        self
    }

    pub fn with_binary_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binary_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.default_order_by = Some(order_by.into());
        self
    }

    /// Column names without the binary columns.
    pub fn non_binary_columns(&self) -> Vec<String> {
        self.column_names
            .iter()
            .filter(|c| {
                !self
                    .binary_columns
                    .iter()
                    .any(|b| crate::normalize::identifiers_equal(b, c))
            })
            .cloned()
            .collect()
    }

    /// Order-by used for paging: the explicit default, else the identity column.
    pub fn default_order(&self) -> Option<String> {
        self.default_order_by
            .clone()
            .filter(|o| !o.trim().is_empty())
            .or_else(|| self.identity_column.clone())
    }
}

/// Schema/metadata catalog.
pub trait SchemaCatalog: Send + Sync {
    /// Describe an object type, or `None` when it is unknown.
    fn describe(&self, object_type: &str) -> Option<ObjectSchema>;
}

/// Named-query catalog.
pub trait QueryCatalog: Send + Sync {
    /// Resolve the text of a fully qualified query name (`class.name.query`).
    fn resolve(&self, full_name: &str) -> Option<String>;
}

/// Schema catalog held in memory, keyed by normalized object type name.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaCatalog {
    objects: HashMap<String, ObjectSchema>,
}

impl InMemorySchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, object_type: &str, schema: ObjectSchema) -> Self {
        self.register(object_type, schema);
        self
    }

    pub fn register(&mut self, object_type: &str, schema: ObjectSchema) {
        self.objects
            .insert(normalize_identifier(object_type), schema);
    }
}

impl From<HashMap<String, ObjectSchema>> for InMemorySchemaCatalog {
    fn from(objects: HashMap<String, ObjectSchema>) -> Self {
        let mut catalog = Self::new();
        for (name, schema) in objects {
            catalog.register(&name, schema);
        }
        catalog
    }
}

impl SchemaCatalog for InMemorySchemaCatalog {
    fn describe(&self, object_type: &str) -> Option<ObjectSchema> {
        self.objects.get(&normalize_identifier(object_type)).cloned()
    }
}

/// Named-query catalog held in memory, keyed by normalized full name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueryCatalog {
    queries: HashMap<String, String>,
}

impl InMemoryQueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, full_name: &str, text: impl Into<String>) -> Self {
        self.register(full_name, text);
        self
    }

    pub fn register(&mut self, full_name: &str, text: impl Into<String>) {
        self.queries.insert(normalize_identifier(full_name), text.into());
    }
}

impl From<HashMap<String, String>> for InMemoryQueryCatalog {
    fn from(queries: HashMap<String, String>) -> Self {
        let mut catalog = Self::new();
        for (name, text) in queries {
            catalog.register(&name, text);
        }
        catalog
    }
}

impl QueryCatalog for InMemoryQueryCatalog {
    fn resolve(&self, full_name: &str) -> Option<String> {
        self.queries.get(&normalize_identifier(full_name)).cloned()
    }
}
