#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use serde_json::{json, Map, Value};
use trellis::builder::SelectParts;
use trellis::error::Error;
use trellis::execution::ReadClient;
use trellis::extension::{Extensions, ReadExtension};
use trellis::notation::{clause, Beacon, Bucket, Clause, Expression, Operator, Term};

use common::{database, library};

#[tokio::test]
async fn test_many_to_one_join_collapses_missing_parent() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("person").qualifier("editor").column("name"))
        .clause(clause("id", Operator::Asc));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"title": "Dune", "editor": {"name": "Ann"}},
            {"title": "Earthsea", "editor": null},
            {"title": "Lathe", "editor": null}
        ])
    );
    assert!(view.meta.is_none());

    let statements = conn.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("LEFT JOIN \"person\" AS \"book__editor\""));
}

#[tokio::test]
async fn test_collapse_can_be_disabled() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn).with_collapse_none(false);

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("person").qualifier("editor").column("name"))
        .clause(clause("title", Operator::eq("Earthsea")));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([{"title": "Earthsea", "editor": {"name": null}}])
    );
}

#[tokio::test]
async fn test_one_to_many_children_use_one_secondary_statement() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("author")
        .column("name")
        .bucket(
            Bucket::new("book")
                .column("title")
                .clause(clause("title", Operator::Asc)),
        )
        .clause(clause("id", Operator::Asc));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"name": "Le Guin", "book": [{"title": "Earthsea"}, {"title": "Lathe"}]},
            {"name": "Herbert", "book": [{"title": "Dune"}]},
            {"name": "Nobody", "book": []}
        ])
    );

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].contains("\"book\".\"author_id\" IN (1, 2, 3)"));
}

#[tokio::test]
async fn test_requested_key_columns_are_kept() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn);

    let bucket = Bucket::new("author")
        .columns(["id", "name"])
        .bucket(Bucket::new("book").columns(["title", "author_id"]))
        .clause(clause("id", Operator::eq(2)));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"id": 2, "name": "Herbert", "book": [{"title": "Dune", "author_id": 2}]}
        ])
    );
}

#[tokio::test]
async fn test_empty_parent_set_skips_secondary_fetch() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("author")
        .column("name")
        .bucket(Bucket::new("book").column("title"))
        .clause(clause("name", Operator::eq("Missing")));
    let view = client.read_one(&bucket).await.unwrap();

    assert!(view.data.is_empty());
    assert_eq!(conn.statements().len(), 1);
}

#[tokio::test]
async fn test_many_to_many_through_junction() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("tag").column("name"))
        .clause(clause("id", Operator::Asc));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"title": "Dune", "tag": [{"name": "scifi"}]},
            {"title": "Earthsea", "tag": [{"name": "fantasy"}]},
            {"title": "Lathe", "tag": [{"name": "scifi"}]}
        ])
    );

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].starts_with("SELECT"));
    assert!(statements[1].contains("FROM \"book_tag\""));
    assert!(statements[1].contains("\"book_tag\".\"book_id\" IN (1, 2, 3)"));
}

#[tokio::test]
async fn test_deferred_child_below_a_join() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("review")
        .column("body")
        .bucket(
            Bucket::new("book")
                .column("title")
                .bucket(Bucket::new("tag").column("name")),
        )
        .clause(clause("id", Operator::Asc));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"body": "Great", "book": {"title": "Dune", "tag": [{"name": "scifi"}]}},
            {"body": "Classic", "book": {"title": "Dune", "tag": [{"name": "scifi"}]}},
            {"body": "Quiet", "book": {"title": "Earthsea", "tag": [{"name": "fantasy"}]}}
        ])
    );
    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[1].contains("IN (1, 2)"));
}

#[tokio::test]
async fn test_total_counts_rows_before_pagination() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema.clone(), conn.clone());

    let bucket = Bucket::new("book")
        .column("title")
        .clause(clause("id", Operator::Asc))
        .limit(2)
        .total();
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(json!(view.data), json!([{"title": "Dune"}, {"title": "Earthsea"}]));
    assert_eq!(view.meta.unwrap()["total"], json!(3));

    let renamed = ReadClient::new(schema, conn).with_total_field("count");
    let empty = Bucket::new("book")
        .column("title")
        .clause(clause("title", Operator::eq("none")))
        .total();
    let view = renamed.read_one(&empty).await.unwrap();
    assert!(view.data.is_empty());
    assert_eq!(view.meta.unwrap()["count"], json!(0));
}

#[tokio::test]
async fn test_invoice_views_keep_bucket_order() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn);

    let invoice = vec![
        Bucket::new("tag")
            .column("name")
            .clause(clause("id", Operator::eq(3))),
        Bucket::new("author")
            .column("name")
            .clause(clause("id", Operator::eq(1))),
    ];
    let views = client.read(&invoice).await.unwrap();

    assert_eq!(views.len(), 2);
    assert_eq!(json!(views[0].data), json!([{"name": "unused"}]));
    assert_eq!(json!(views[1].data), json!([{"name": "Le Guin"}]));
}

#[tokio::test]
async fn test_malformed_expression_rolls_back_and_connection_recovers() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn);

    let dangling = Expression::from_terms(vec![
        Term::Clause(Clause::new("title", Operator::eq("Dune"))),
        Term::Clause(Clause::new("price", Operator::gt(1))),
    ]);
    let bucket = Bucket::new("book").column("title").clause(dangling);
    assert!(matches!(
        client.read_one(&bucket).await,
        Err(Error::MalformedExpression(_))
    ));

    let ok = Bucket::new("book")
        .column("title")
        .clause(clause("title", Operator::eq("Dune")));
    assert_eq!(client.read_one(&ok).await.unwrap().data.len(), 1);
}

#[tokio::test]
async fn test_unknown_column_is_a_schema_error() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("book").column("isbn");
    let err = client.read_one(&bucket).await.unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
    assert!(err.is_request_error());
    assert!(conn.statements().is_empty());
}

#[tokio::test]
async fn test_like_is_case_sensitive_and_ilike_is_not() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn);

    let titles = |operator: Operator| {
        Bucket::new("book")
            .column("title")
            .clause(clause("title", operator))
    };
    let view = client.read_one(&titles(Operator::like("dune"))).await.unwrap();
    assert!(view.data.is_empty());

    let view = client.read_one(&titles(Operator::like("Dune"))).await.unwrap();
    assert_eq!(json!(view.data), json!([{"title": "Dune"}]));

    let view = client.read_one(&titles(Operator::ilike("dune"))).await.unwrap();
    assert_eq!(json!(view.data), json!([{"title": "Dune"}]));
}

const SPARSE: &str = "
CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE award (
    id INTEGER PRIMARY KEY,
    label TEXT,
    author_id INTEGER REFERENCES author(id)
);
CREATE TABLE book (
    id INTEGER PRIMARY KEY,
    title TEXT,
    author_id INTEGER REFERENCES author(id)
);
CREATE TABLE tag (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE book_tag (
    book_id INTEGER NOT NULL REFERENCES book(id),
    tag_id INTEGER NOT NULL REFERENCES tag(id)
);

INSERT INTO author (id, name) VALUES (1, NULL);
INSERT INTO book (id, title, author_id) VALUES (1, 'Dune', 1), (2, 'Orphan', NULL);
INSERT INTO tag (id, name) VALUES (1, NULL), (2, 'kept');
INSERT INTO book_tag (book_id, tag_id) VALUES (1, 1), (1, 2);
";

#[tokio::test]
async fn test_joined_parent_with_no_children_keeps_empty_list() {
    let (schema, conn) = database(SPARSE).await;
    let client = ReadClient::new(schema, conn);

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(
            Bucket::new("author")
                .column("name")
                .bucket(Bucket::new("award").column("label")),
        )
        .clause(clause("id", Operator::Asc));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([
            {"title": "Dune", "author": {"name": null, "award": []}},
            {"title": "Orphan", "author": null}
        ])
    );
}

#[tokio::test]
async fn test_many_to_many_keeps_targets_with_null_columns() {
    let (schema, conn) = database(SPARSE).await;
    let client = ReadClient::new(schema, conn);

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("tag").column("name").clause(clause("id", Operator::Asc)))
        .clause(clause("id", Operator::eq(1)));
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(
        json!(view.data),
        json!([{"title": "Dune", "tag": [{"name": null}, {"name": "kept"}]}])
    );
}

#[tokio::test]
async fn test_failed_child_fetch_discards_the_read() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("author")
        .column("name")
        .bucket(Bucket::new("book").column("isbn"));
    let err = client.read_one(&bucket).await.unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
    assert_eq!(conn.statements().len(), 1);

    // rolled back, so a new transaction can start
    let ok = Bucket::new("author")
        .column("name")
        .clause(clause("id", Operator::eq(2)));
    let view = client.read_one(&ok).await.unwrap();
    assert_eq!(json!(view.data), json!([{"name": "Herbert"}]));
}

#[tokio::test]
async fn test_failed_child_fetch_cancels_its_siblings() {
    let (schema, conn) = library().await;
    let client = ReadClient::new(schema, conn.clone());

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("review").column("isbn"))
        .bucket(Bucket::new("tag").column("name"));
    assert!(matches!(
        client.read_one(&bucket).await,
        Err(Error::Schema(_))
    ));
    assert_eq!(conn.statements().len(), 1);
}

struct FirstRow;

impl ReadExtension for FirstRow {
    fn rewrite(&self, _beacon: &Beacon, mut parts: SelectParts) -> trellis::Result<SelectParts> {
        parts.limit = Some(1);
        Ok(parts)
    }

    fn meta(
        &self,
        beacon: &Beacon,
        records: &mut Vec<Map<String, Value>>,
    ) -> trellis::Result<Option<Map<String, Value>>> {
        let mut meta = Map::new();
        meta.insert(beacon.key().to_string(), json!(records.len()));
        Ok(Some(meta))
    }
}

#[tokio::test]
async fn test_read_extension_rewrites_and_adds_meta() {
    let (schema, conn) = library().await;
    let extensions = Arc::new(Extensions::default().with_read("first", FirstRow));
    let client = ReadClient::new(schema, conn.clone()).with_extensions(extensions);

    let bucket = Bucket::new("book")
        .column("title")
        .clause(clause("id", Operator::Desc))
        .beacon(Beacon::Custom {
            key: "first".into(),
            value: Value::Null,
        });
    let view = client.read_one(&bucket).await.unwrap();

    assert_eq!(json!(view.data), json!([{"title": "Lathe"}]));
    assert_eq!(view.meta.unwrap()["first"], json!(1));
    assert!(conn.statements()[0].ends_with("LIMIT 1"));
}
