#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use trellis::error::Error;
use trellis::execution::{ReadClient, WriteClient, WriteExecutor};
use trellis::extension::{Extensions, WriteExtension};
use trellis::notation::{clause, Beacon, Bucket, Operator};
use trellis::schema::Schema;

use common::{library, row, Recording};

async fn names(schema: &Arc<Schema>, conn: &Arc<Recording>, table: &str) -> Value {
    let bucket = Bucket::new(table)
        .column("name")
        .clause(clause("id", Operator::Asc));
    let view = ReadClient::new(schema.clone(), conn.clone())
        .read_one(&bucket)
        .await
        .unwrap();
    json!(view.data)
}

#[tokio::test]
async fn test_insert_rows() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema.clone(), conn.clone());

    let bucket = Bucket::new("tag").rows([row(json!({"name": "horror"})), row(json!({"name": "poetry"}))]);
    assert_eq!(client.write(&[bucket]).await.unwrap(), 2);
    assert_eq!(
        conn.statements(),
        vec!["INSERT INTO \"tag\" (\"name\") VALUES ('horror'), ('poetry')".to_string()]
    );

    assert_eq!(
        names(&schema, &conn, "tag").await,
        json!([
            {"name": "scifi"},
            {"name": "fantasy"},
            {"name": "unused"},
            {"name": "horror"},
            {"name": "poetry"}
        ])
    );
}

#[tokio::test]
async fn test_update_and_delete() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema.clone(), conn.clone());

    let rename = Bucket::new("author")
        .row(row(json!({"name": "Ursula K. Le Guin"})))
        .clause(clause("id", Operator::eq(1)));
    let remove = Bucket::new("author").clause(clause("name", Operator::eq("Nobody")));
    assert_eq!(client.write(&[rename, remove]).await.unwrap(), 2);

    assert_eq!(
        names(&schema, &conn, "author").await,
        json!([{"name": "Ursula K. Le Guin"}, {"name": "Herbert"}])
    );
}

#[tokio::test]
async fn test_several_rows_with_filter_update_one_at_a_time() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema.clone(), conn.clone());

    let bucket = Bucket::new("tag")
        .rows([row(json!({"name": "first"})), row(json!({"name": "second"}))])
        .clause(clause("id", Operator::eq(3)));
    assert_eq!(client.write(&[bucket]).await.unwrap(), 2);

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements.iter().all(|sql| sql.starts_with("UPDATE \"tag\"")));
    assert_eq!(
        names(&schema, &conn, "tag").await,
        json!([{"name": "scifi"}, {"name": "fantasy"}, {"name": "second"}])
    );
}

#[tokio::test]
async fn test_upsert_replaces_matching_rows() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema.clone(), conn.clone());

    let bucket = Bucket::new("book_tag")
        .upsert(clause("book_id", Operator::eq(1)))
        .rows([
            row(json!({"book_id": 1, "tag_id": 2})),
            row(json!({"book_id": 1, "tag_id": 3})),
        ]);
    assert_eq!(client.write(&[bucket]).await.unwrap(), 2);

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0],
        "DELETE FROM \"book_tag\" WHERE \"book_tag\".\"book_id\" = 1"
    );
    assert!(statements[1].starts_with("INSERT INTO \"book_tag\""));

    let read = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("tag").column("name").clause(clause("id", Operator::Asc)))
        .clause(clause("id", Operator::eq(1)));
    let view = ReadClient::new(schema, conn).read_one(&read).await.unwrap();
    assert_eq!(
        json!(view.data),
        json!([{"title": "Dune", "tag": [{"name": "fantasy"}, {"name": "unused"}]}])
    );
}

#[tokio::test]
async fn test_failed_bucket_rolls_back_the_invoice() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema.clone(), conn.clone());

    let invoice = vec![
        Bucket::new("tag").row(row(json!({"name": "doomed"}))),
        Bucket::new("review").row(row(json!({"body": "orphan", "book_id": 99}))),
    ];
    let err = client.write(&invoice).await.unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert!(!err.is_request_error());

    assert_eq!(
        names(&schema, &conn, "tag").await,
        json!([{"name": "scifi"}, {"name": "fantasy"}, {"name": "unused"}])
    );
}

#[tokio::test]
async fn test_ambiguous_buckets_are_rejected() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema, conn.clone());

    let empty = Bucket::new("tag");
    assert!(matches!(
        client.write(&[empty]).await,
        Err(Error::AmbiguousOperation { .. })
    ));

    let mixed = Bucket::new("tag").column("name").row(row(json!({"name": "x"})));
    assert!(matches!(
        client.write(&[mixed]).await,
        Err(Error::AmbiguousOperation { .. })
    ));

    let selecting = Bucket::new("tag").column("name");
    assert!(matches!(
        client.write(&[selecting]).await,
        Err(Error::AmbiguousOperation { .. })
    ));

    assert!(conn.statements().iter().all(|sql| sql.starts_with("SELECT")));
}

#[tokio::test]
async fn test_unregistered_beacon_is_ignored() {
    let (schema, conn) = library().await;
    let client = WriteClient::new(schema, conn.clone()).with_extensions(Arc::new(Extensions::empty()));

    let bucket = Bucket::new("tag")
        .row(row(json!({"name": "plain"})))
        .beacon(Beacon::Custom {
            key: "audit".into(),
            value: json!({"by": "test"}),
        });
    assert_eq!(client.write(&[bucket]).await.unwrap(), 1);
    assert_eq!(conn.statements().len(), 1);
}

/// Records every written tag name in `tag` before the bucket itself runs.
struct MirrorTags;

#[async_trait]
impl WriteExtension for MirrorTags {
    async fn apply(
        &self,
        _beacon: &Beacon,
        bucket: Bucket,
        executor: &WriteExecutor<'_>,
    ) -> trellis::Result<Bucket> {
        let rows = bucket
            .rows_iter()
            .map(|r| row(json!({"name": r["body"].clone()})))
            .collect();
        executor.insert("tag", rows).await?;
        Ok(bucket)
    }
}

#[tokio::test]
async fn test_write_extension_runs_its_own_statements() {
    let (schema, conn) = library().await;
    let extensions = Arc::new(Extensions::default().with_write("mirror", MirrorTags));
    let client = WriteClient::new(schema.clone(), conn.clone()).with_extensions(extensions);

    let bucket = Bucket::new("review")
        .row(row(json!({"body": "Loud", "book_id": 3})))
        .beacon(Beacon::Custom {
            key: "mirror".into(),
            value: Value::Null,
        });
    assert_eq!(client.write(&[bucket]).await.unwrap(), 1);

    let statements = conn.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("INSERT INTO \"tag\""));
    assert!(statements[1].starts_with("INSERT INTO \"review\""));
}

#[tokio::test]
async fn test_executor_helpers() {
    let (schema, conn) = library().await;
    let executor = WriteExecutor::new(conn.as_ref(), &schema);

    let affected = executor
        .update(
            "book",
            row(json!({"title": "Dune Messiah"})),
            &clause("id", Operator::eq(1)),
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let affected = executor
        .delete("book_tag", &clause("tag_id", Operator::eq(1)))
        .await
        .unwrap();
    assert_eq!(affected, 2);
}
