//! End-to-end query scenarios over mock and in-memory data sources.
//!
//! No database is needed: statements are captured by a mock executor that
//! serves a fixed article table honoring `LIMIT`/`OFFSET`.

use lifequery::prelude::*;
use lifequery::query::parameters::QueryKind;
use lifequery::{
    CallbackSource, DataPage, DataSource, InMemoryQueryCatalog, InMemorySchemaCatalog,
    ObjectSchema, QueryExecutor, StaticSource,
};
use sea_query::Value;
use std::sync::{Arc, Mutex};

struct MockExecutor {
    rows: usize,
    statements: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    fn new(rows: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
        let statements = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rows,
                statements: Arc::clone(&statements),
            },
            statements,
        )
    }
}

fn keyword_value(query: &str, keyword: &str) -> Option<usize> {
    let words: Vec<&str> = query.split_whitespace().collect();
    words
        .iter()
        .rposition(|w| *w == keyword)
        .and_then(|i| words.get(i + 1))
        .and_then(|n| n.parse().ok())
}

impl QueryExecutor for MockExecutor {
    fn execute(&self, query: &str, _params: &[Value]) -> Result<u64, QueryError> {
        self.statements.lock().unwrap().push(query.to_string());
        Ok(0)
    }

    fn query_all(&self, query: &str, _params: &[Value]) -> Result<DataSet, QueryError> {
        self.statements.lock().unwrap().push(query.to_string());
        if query.starts_with("SELECT COUNT(*)") {
            return DataSet::new(
                vec!["count".to_string()],
                vec![vec![Value::BigInt(Some(self.rows as i64))]],
            );
        }
        let offset = keyword_value(query, "OFFSET").unwrap_or(0);
        let limit = keyword_value(query, "LIMIT").unwrap_or(usize::MAX);
        let rows = (1..=self.rows)
            .skip(offset)
            .take(limit)
            .map(|id| {
                vec![
                    Value::Int(Some(id as i32)),
                    Value::String(Some(format!("Article {}", id))),
                ]
            })
            .collect();
        DataSet::new(
            vec!["ArticleID".to_string(), "ArticleTitle".to_string()],
            rows,
        )
    }
}

fn schemas() -> InMemorySchemaCatalog {
    InMemorySchemaCatalog::new()
        .with_object(
            "cms.article",
            ObjectSchema::new("CMS_Article")
                .with_columns(["ArticleID", "ArticleTitle", "ArticleTeaser"])
                .with_binary_columns(["ArticleTeaser"])
                .with_identity("ArticleID"),
        )
        .with_object("cms.category", ObjectSchema::new("CMS_Category"))
}

fn context(rows: usize) -> (QueryContext, Arc<Mutex<Vec<String>>>) {
    let (executor, statements) = MockExecutor::new(rows);
    let queries = InMemoryQueryCatalog::new().with_query(
        "cms.article.selectlatest",
        "SELECT ##TOPN## ##COLUMNS## FROM CMS_Article WHERE ##WHERE## ORDER BY ##ORDERBY##",
    );
    let context = QueryContext::new()
        .with_schema_catalog(Arc::new(schemas()))
        .with_query_catalog(Arc::new(queries))
        .with_executor(executor);
    (context, statements)
}

fn articles(context: QueryContext) -> DataQuery {
    DataQuery::for_object(context, "cms.article")
}

struct Article;

#[derive(Debug, PartialEq)]
struct ArticleModel {
    id: i32,
    title: String,
}

impl FromDataRow for ArticleModel {
    fn from_row(row: &DataRow<'_>) -> Result<Self, QueryError> {
        Ok(Self {
            id: row.get("ArticleID")?,
            title: row.get("ArticleTitle")?,
        })
    }
}

impl QueryEntity for Article {
    const OBJECT_TYPE: &'static str = "cms.article";
    type Model = ArticleModel;
}

#[test]
fn test_generation_is_idempotent() {
    let (context, _) = context(0);
    let query = articles(context)
        .columns(["ArticleID", "ArticleTitle"])
        .where_equals("ArticleSiteID", 1)
        .order_by(["ArticleTitle"])
        .paged_by(10);
    let first = query.text().unwrap();
    let second = query.text().unwrap();
    assert_eq!(first, second);

    let copy = query.derived();
    assert_eq!(copy.text().unwrap(), first);
}

#[test]
fn test_article_paging_scenario() {
    let (context, _) = context(50);
    let query = articles(context)
        .columns(["ArticleID", "ArticleTitle"])
        .where_condition("ArticleSiteID = 1")
        .order_by(["ArticleTitle"])
        .paged_by(20);
    assert_eq!(
        query.text().unwrap(),
        "SELECT ArticleID, ArticleTitle FROM CMS_Article WHERE ArticleSiteID = 1 ORDER BY ArticleTitle LIMIT 20 OFFSET 0"
    );

    let query = query.next_page().unwrap();
    assert_eq!(query.settings().offset, 20);
    assert_eq!(
        query.text().unwrap(),
        "SELECT ArticleID, ArticleTitle FROM CMS_Article WHERE ArticleSiteID = 1 ORDER BY ArticleTitle LIMIT 20 OFFSET 20"
    );
    let page = query.result().unwrap();
    assert_eq!(page.row(0).unwrap().get::<i32>("ArticleID").unwrap(), 21);
}

#[test]
fn test_double_group_by_scenario() {
    let (context, _) = context(0);
    let result = DataQuery::for_object(context, "cms.category")
        .group_by(["ParentID"])
        .and_then(|q| q.having("COUNT(*) > 1").group_by(["OtherCol"]));
    assert!(matches!(result, Err(QueryError::Configuration(_))));
}

#[test]
fn test_paging_requires_order_by() {
    let (context, _) = context(0);
    let query = DataQuery::for_object(context, "cms.category").paged_by(10);
    assert!(matches!(
        query.text(),
        Err(QueryError::PagingRequiresOrderBy(_))
    ));
}

#[test]
fn test_count_law() {
    let (context, statements) = context(25);
    let unpaged = articles(context.clone());
    assert_eq!(unpaged.count().unwrap(), unpaged.total_records().unwrap());

    for (offset, max, expected) in [(0, 10, 10), (20, 10, 5), (30, 10, 0)] {
        let paged = articles(context.clone()).offset(offset).paged_by(max);
        assert_eq!(paged.total_records().unwrap(), 25);
        assert_eq!(paged.count().unwrap(), expected);
    }
    assert!(statements
        .lock()
        .unwrap()
        .iter()
        .any(|s| s == "SELECT COUNT(*) FROM CMS_Article"));
}

#[test]
fn test_cache_reuse_and_invalidation() {
    let (context, statements) = context(5);
    let query = articles(context);
    let first = query.result().unwrap();
    let second = query.result().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(statements.lock().unwrap().len(), 1);

    let query = query.top_n(2);
    let third = query.result().unwrap();
    assert_eq!(third.len(), 2);
    assert_eq!(statements.lock().unwrap().len(), 2);

    query.reset();
    query.result().unwrap();
    assert_eq!(statements.lock().unwrap().len(), 3);
}

#[test]
fn test_binary_columns_are_excluded() {
    let (context, _) = context(0);
    assert_eq!(
        articles(context.clone()).text().unwrap(),
        "SELECT ArticleID, ArticleTitle FROM CMS_Article"
    );
    assert_eq!(
        articles(context).include_binary_columns(true).text().unwrap(),
        "SELECT * FROM CMS_Article"
    );
}

#[test]
fn test_combined_query_wrapping() {
    let (context, _) = context(0);
    let a = articles(context.clone())
        .columns(["ArticleID"])
        .where_condition("ArticleSiteID = 1");
    let b = articles(context.clone())
        .columns(["ArticleID"])
        .where_condition("ArticleSiteID = 2");

    let plain = a.derived().union(&b);
    assert_eq!(
        plain.text().unwrap(),
        "(SELECT ArticleID FROM CMS_Article WHERE ArticleSiteID = 1) UNION (SELECT ArticleID FROM CMS_Article WHERE ArticleSiteID = 2)"
    );

    let filtered = a.union(&b).where_condition("ArticleID > 10");
    assert_eq!(
        filtered.text().unwrap(),
        "SELECT * FROM ((SELECT ArticleID FROM CMS_Article WHERE ArticleSiteID = 1) UNION (SELECT ArticleID FROM CMS_Article WHERE ArticleSiteID = 2)) AS SubData WHERE ArticleID > 10"
    );
    assert_eq!(filtered.parameters().unwrap().kind(), QueryKind::Combined);
}

#[test]
fn test_single_column_failure() {
    let (context, _) = context(0);
    let result = DataQuery::for_object(context, "cms.category").as_single_column(None, false);
    assert!(matches!(result, Err(QueryError::Configuration(_))));
}

#[test]
fn test_where_in_sub_query() {
    let (context, _) = context(0);
    let latest = articles(context.clone())
        .where_condition("ArticleSiteID = 1")
        .order_by(["ArticleTitle"]);
    let query = DataQuery::for_object(context, "cms.category")
        .where_in("CategoryArticleID", &latest);
    assert_eq!(
        query.text().unwrap(),
        "SELECT * FROM CMS_Category WHERE CategoryArticleID IN (SELECT ArticleID FROM CMS_Article WHERE ArticleSiteID = 1)"
    );
}

#[test]
fn test_named_query_macros() {
    let (context, _) = context(0);
    let query = articles(context)
        .from_named_query("selectlatest")
        .columns(["ArticleID"])
        .where_condition("ArticleSiteID = 1")
        .order_by(["ArticleTitle DESC"]);
    assert_eq!(
        query.text().unwrap(),
        "SELECT  ArticleID FROM CMS_Article WHERE ArticleSiteID = 1 ORDER BY ArticleTitle DESC"
    );

    let (context, _) = context(0);
    let missing = articles(context).from_named_query("missing");
    match missing.text() {
        Err(QueryError::QueryDefinitionNotFound(name)) => assert_eq!(name, "cms.article.missing"),
        other => panic!("expected missing definition, got {:?}", other),
    }
}

#[test]
fn test_comment_prefix() {
    let (context, _) = context(0);
    let query = articles(context).top_n(1).with_comment("latest article");
    assert_eq!(
        query.text().unwrap(),
        "/* latest article */ SELECT ArticleID, ArticleTitle FROM CMS_Article LIMIT 1"
    );
}

#[test]
fn test_expanded_text_inlines_parameters() {
    let (context, _) = context(0);
    let query = articles(context)
        .columns(["ArticleID"])
        .where_equals("ArticleTitle", "News");
    assert_eq!(
        query.to_string_expanded(true).unwrap(),
        "SELECT ArticleID FROM CMS_Article WHERE ArticleTitle = 'News'"
    );
    assert!(query.to_string_expanded(false).unwrap().contains("ArticleTitle = @p"));
}

#[test]
fn test_typed_object_query() {
    let (context, _) = context(3);
    let query = ObjectQuery::<Article>::new(context).order_by(["ArticleID"]);
    let models = query.models().unwrap();
    assert_eq!(models.len(), 3);
    assert_eq!(
        query.first_model().unwrap(),
        Some(ArticleModel {
            id: 1,
            title: "Article 1".to_string()
        })
    );
}

#[test]
fn test_for_each_page_restores_settings() {
    let (context, statements) = context(45);
    let mut query = articles(context).offset(7);
    let mut ids = Vec::new();
    query
        .for_each_row(20, |row| {
            ids.push(row.get::<i32>("ArticleID")?);
            Ok(())
        })
        .unwrap();
    assert_eq!(ids.len(), 38);
    assert_eq!(ids[0], 8);
    assert_eq!(query.settings().offset, 7);
    assert!(!query.settings().is_paged());
    assert!(statements
        .lock()
        .unwrap()
        .iter()
        .all(|s| s.contains("ORDER BY ArticleID")));
}

#[test]
fn test_for_each_page_cancellation() {
    let (context, statements) = context(100);
    let mut query = articles(context);
    let mut seen = 0;
    query
        .for_each_row(10, |_| {
            seen += 1;
            if seen == 15 {
                return Err(QueryError::cancel());
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, 15);
    assert_eq!(statements.lock().unwrap().len(), 2);
}

#[test]
fn test_materialized_list_feeds_later_query() {
    let (context, statements) = context(3);
    let list = articles(context.clone())
        .where_condition("ArticleSiteID = 1")
        .as_materialized_list("ArticleID", true)
        .unwrap();
    assert_eq!(list.len(), 3);
    assert!(statements.lock().unwrap()[0].starts_with("SELECT DISTINCT ArticleID FROM CMS_Article"));

    let query = DataQuery::for_object(context, "cms.category").where_in_list("CategoryArticleID", &list);
    let parameters = query.parameters().unwrap();
    assert_eq!(parameters.parameters().len(), 3);
    let (sql, values) = parameters.positional();
    assert_eq!(
        sql,
        "SELECT * FROM CMS_Category WHERE CategoryArticleID IN ($1, $2, $3)"
    );
    assert_eq!(values[2], Value::Int(Some(3)));

    let offline = DataQuery::new(QueryContext::new()).with_data_source(Arc::new(list.into_source()));
    assert_eq!(offline.from_table("ignored").total_records().unwrap(), 3);
}

#[test]
fn test_external_sources() {
    let data = DataSet::new(
        vec!["ArticleID".to_string()],
        (1..=12).map(|i| vec![Value::Int(Some(i))]).collect(),
    )
    .unwrap();
    let source: Arc<dyn DataSource> = Arc::new(StaticSource::new(data));
    let query = DataQuery::new(QueryContext::new())
        .with_data_source(source)
        .from_table("Articles")
        .order_by(["ArticleID"])
        .page(1, 5);
    assert_eq!(query.result().unwrap().len(), 5);
    assert_eq!(query.total_records().unwrap(), 12);
    assert!(!query.supports_streaming());

    let texts = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&texts);
    let callback = CallbackSource::new(
        move |parameters| {
            captured.lock().unwrap().push(parameters.text().to_string());
            Ok(DataPage::new(DataSet::default(), None))
        },
        |_| Ok(42),
    );
    let query = DataQuery::new(QueryContext::new())
        .with_data_source(Arc::new(callback))
        .from_table("Articles");
    assert_eq!(query.total_records().unwrap(), 42);
    assert!(query.result().unwrap().is_empty());
    assert_eq!(query.total_records().unwrap(), 42);
    assert_eq!(texts.lock().unwrap().as_slice(), &["SELECT * FROM Articles".to_string()]);
}

#[test]
fn test_top_n_totals_agree_in_any_call_order() {
    let data = DataSet::new(
        vec!["ArticleID".to_string()],
        (1..=10).map(|i| vec![Value::Int(Some(i))]).collect(),
    )
    .unwrap();
    let source: Arc<dyn DataSource> = Arc::new(StaticSource::new(data));
    let latest = || {
        DataQuery::new(QueryContext::new())
            .with_data_source(Arc::clone(&source))
            .from_table("Articles")
            .top_n(3)
    };

    let counted_first = latest();
    assert_eq!(counted_first.total_records().unwrap(), 3);
    assert_eq!(counted_first.count().unwrap(), 3);
    assert_eq!(counted_first.result().unwrap().len(), 3);
    assert_eq!(counted_first.total_records().unwrap(), 3);

    let executed_first = latest();
    assert_eq!(executed_first.result().unwrap().len(), 3);
    assert_eq!(executed_first.total_records().unwrap(), 3);
    assert_eq!(executed_first.count().unwrap(), 3);
}

#[test]
fn test_streaming_reader() {
    let (context, statements) = context(0);
    let query = articles(context).where_condition("ArticleSiteID = 1");
    assert!(query.supports_streaming());

    let mut reader = query.open_reader().unwrap();
    assert!(reader.next_batch().unwrap().is_none());
    reader.close().unwrap();

    let statements = statements.lock().unwrap();
    assert_eq!(statements[0], "BEGIN");
    assert!(statements[1].ends_with("NO SCROLL CURSOR FOR SELECT ArticleID, ArticleTitle FROM CMS_Article WHERE ArticleSiteID = 1"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
}

#[test]
fn test_concurrent_readers_execute_once() {
    let (context, statements) = context(10);
    let query = Arc::new(articles(context).order_by(["ArticleTitle"]));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let query = Arc::clone(&query);
            may::go!(move || query.result().map(|data| data.len()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 10);
    }
    assert_eq!(statements.lock().unwrap().len(), 1);
}
