use serde_json::json;
use sqlparser::dialect::{
    DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use trellis::builder::QueryBuilder;
use trellis::config::Settings;
use trellis::error::Error;
use trellis::notation::{clause, Bucket, Invoice, Operator};
use trellis::schema::{LinkKind, Schema, SchemaBuilder, SchemaError, TableDef};
use trellis::space::{Space, TrackUnit};
use trellis::sql::{Dialect, StatementKind};

const DIALECTS: [Dialect; 5] = [
    Dialect::DuckDb,
    Dialect::Postgres,
    Dialect::MySql,
    Dialect::TSql,
    Dialect::Sqlite,
];

fn parses(sql: &str, dialect: Dialect) -> bool {
    let parser: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
    };
    Parser::parse_sql(&*parser, sql).is_ok()
}

fn catalogue() -> SchemaBuilder {
    Schema::builder()
        .table(TableDef::new("author").columns(["id", "name"]).primary_key("id"))
        .table(
            TableDef::new("book")
                .columns(["id", "title"])
                .primary_key("id")
                .foreign_key("author_id", "author", "id"),
        )
        .table(TableDef::new("tag").columns(["id", "name"]).primary_key("id"))
        .table(
            TableDef::new("book_tag")
                .foreign_key("book_id", "book", "id")
                .foreign_key("tag_id", "tag", "id"),
        )
        .table(
            TableDef::new("book_tag_archive")
                .foreign_key("book_id", "book", "id")
                .foreign_key("tag_id", "tag", "id"),
        )
}

fn root(name: &str) -> Space {
    Space::root(TrackUnit::new(name))
}

#[test]
fn test_invoice_from_json_plans_in_every_dialect() {
    let schema = catalogue().build().unwrap();
    let invoice: Invoice = serde_json::from_value(json!([
        {
            "name": "book",
            "elements": [
                {"item": {"column": "title"}},
                {"bucket": {"name": "author", "elements": [{"item": {"column": "name"}}]}},
                {"clause": [
                    {"clause": {"column": "title", "operator": {"like": {"pattern": "dune", "case_sensitive": false}}}},
                    {"clause": {"column": "id", "operator": {"gt": 1}}},
                    "and"
                ]}
            ]
        },
        {
            "name": "author",
            "elements": [
                {"item": {"row": {"name": "Le Guin"}}}
            ]
        }
    ]))
    .unwrap();

    let builder = QueryBuilder::new(&schema);
    let select = builder.build(&invoice[0]).unwrap();
    let insert = builder.build(&invoice[1]).unwrap();
    assert_eq!(select.kind(), StatementKind::Select);
    assert_eq!(insert.kind(), StatementKind::Insert);

    for dialect in DIALECTS {
        for statement in [&select, &insert] {
            let sql = statement.to_sql(dialect);
            assert!(parses(&sql, dialect), "{:?} rejected: {}", dialect, sql);
        }
    }

    assert!(select.to_sql(Dialect::Postgres).contains("ILIKE '%dune%'"));
    assert!(!select.to_sql(Dialect::Sqlite).contains("ILIKE"));
}

#[test]
fn test_two_junctions_need_configuration() {
    let schema = catalogue().build().unwrap();
    let err = schema.link(&root("book"), &root("tag")).unwrap_err();
    assert_eq!(
        err,
        SchemaError::AmbiguousJunction {
            from: "book".into(),
            to: "tag".into(),
            candidates: vec!["book_tag".into(), "book_tag_archive".into()],
        }
    );

    let bucket = Bucket::new("book")
        .column("title")
        .bucket(Bucket::new("tag").column("name"));
    assert!(matches!(
        QueryBuilder::new(&schema).build(&bucket),
        Err(Error::Schema(SchemaError::AmbiguousJunction { .. }))
    ));
}

#[test]
fn test_configured_junction_resolves_both_directions() {
    let settings = Settings::from_toml(
        r#"
[[junctions]]
source = "book"
target = "tag"
interim = "book_tag_archive"
"#,
    )
    .unwrap();
    let schema = settings.apply_junctions(catalogue()).build().unwrap();

    let forward = schema.link(&root("book"), &root("tag")).unwrap();
    assert_eq!(forward.kind(), LinkKind::ManyToMany);
    assert_eq!(forward.interim(), Some("book_tag_archive"));

    let backward = schema.link(&root("tag"), &root("book")).unwrap();
    assert_eq!(backward.interim(), Some("book_tag_archive"));
    assert_eq!(backward.source().name, "id");
}

#[test]
fn test_junction_must_reference_both_tables() {
    let schema = catalogue()
        .junction("book", "tag", "author")
        .build()
        .unwrap();
    assert!(matches!(
        schema.link(&root("book"), &root("tag")),
        Err(SchemaError::InvalidJunction { .. })
    ));
}

#[test]
fn test_write_buckets_plan_without_executing() {
    let schema = catalogue().build().unwrap();
    let builder = QueryBuilder::new(&schema);

    let delete = Bucket::new("book_tag").clause(
        clause("book_id", Operator::eq(1)) & clause("tag_id", Operator::set([2, 3])),
    );
    let sql = builder.build(&delete).unwrap().to_sql(Dialect::Postgres);
    assert_eq!(
        sql,
        "DELETE FROM \"book_tag\" WHERE \"book_tag\".\"book_id\" = 1 AND \"book_tag\".\"tag_id\" IN (2, 3)"
    );
    assert!(parses(&sql, Dialect::Postgres));
}
