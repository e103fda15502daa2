//! Tests against a running PostgreSQL.
//!
//! Set `PGBIND_TEST_DATABASE_URL` (a libpq connection string or URL) to run
//! them; without it every test returns early.

use std::sync::Arc;

use futures_util::TryStreamExt;
use pgbind::ast::{count_all, exists, select, Column, EnumType, Sequence, SqlType, Table, Value};
use pgbind::{Dialect, Error, ErrorCategory, SaConnection, Unsupported};
use tokio_postgres::{Client, NoTls};

fn get_db_url() -> Option<String> {
    std::env::var("PGBIND_TEST_DATABASE_URL").ok()
}

/// Skip test if database is not available
async fn get_conn() -> Option<SaConnection<Client>> {
    let url = get_db_url()?;
    match tokio_postgres::connect(&url, NoTls).await {
        Ok((client, connection)) => {
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    eprintln!("connection error: {e}");
                }
            });
            Some(SaConnection::new(client, Arc::new(Dialect::default())))
        }
        Err(e) => {
            eprintln!("Skipping live test: database not available ({e})");
            None
        }
    }
}

fn guinea_pigs() -> Arc<Table> {
    Table::new(
        "pgbind_guinea_pigs",
        vec![Column::new("value", SqlType::Varchar(None))],
    )
}

async fn recreate(conn: &SaConnection<Client>, table: &Arc<Table>) {
    conn.execute(table.drop_if_exists(), &[]).await.unwrap();
    conn.execute(table.create(), &[]).await.unwrap();
}

#[tokio::test]
async fn test_insert_applies_defaults() {
    let Some(conn) = get_conn().await else { return };

    let serial = Sequence::new("pgbind_live_serial_seq");
    let items = Table::new(
        "pgbind_live_items",
        vec![
            Column::new("id", SqlType::Uuid)
                .primary_key()
                .default_fn(|| Ok(uuid::Uuid::new_v4().into())),
            Column::new("serial", SqlType::Integer).default_sequence(serial.clone()),
            Column::new("name", SqlType::Varchar(Some(60)))
                .not_null()
                .default_value("default"),
            Column::new("tags", SqlType::array_of(SqlType::Varchar(Some(60))))
                .not_null()
                .default_value(vec!["foo", "bar"]),
            Column::new("flag", SqlType::Boolean).default_value(true),
        ],
    );
    conn.execute_script(
        "DROP TABLE IF EXISTS pgbind_live_items; DROP SEQUENCE IF EXISTS pgbind_live_serial_seq",
        &[],
    )
    .await
    .unwrap();
    conn.execute(serial.create(), &[]).await.unwrap();
    conn.execute(items.create(), &[]).await.unwrap();

    assert_eq!(conn.execute(items.insert(), &[]).await.unwrap(), 1);
    conn.execute(items.insert().values([("name", "given")]), &[])
        .await
        .unwrap();

    let rows = conn
        .fetch(items.select().order_by(items.c("serial")), &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<_, i32>("serial"), 1);
    assert_eq!(rows[0].get::<_, String>("name"), "default");
    assert_eq!(rows[0].get::<_, Vec<String>>("tags"), vec!["foo", "bar"]);
    assert!(rows[0].get::<_, bool>("flag"));
    assert_eq!(rows[1].get::<_, i32>("serial"), 2);
    assert_eq!(rows[1].get::<_, String>("name"), "given");
    assert_ne!(
        rows[0].get::<_, uuid::Uuid>("id"),
        rows[1].get::<_, uuid::Uuid>("id")
    );
}

#[tokio::test]
async fn test_onupdate_fires_on_update() {
    let Some(conn) = get_conn().await else { return };

    let docs = Table::new(
        "pgbind_live_docs",
        vec![
            Column::new("id", SqlType::Integer).primary_key(),
            Column::new("body", SqlType::Text),
            Column::new("version", SqlType::Uuid)
                .default_fn(|| Ok(uuid::Uuid::new_v4().into()))
                .onupdate_fn(|| Ok(uuid::Uuid::new_v4().into())),
        ],
    );
    recreate(&conn, &docs).await;

    conn.execute(
        docs.insert()
            .values([("id", Value::from(1i32)), ("body", Value::from("a"))]),
        &[],
    )
    .await
    .unwrap();
    let before: uuid::Uuid = conn
        .fetch_value(select([docs.c("version")]).select_from(&docs), &[])
        .await
        .unwrap();

    let updated = conn
        .execute(
            docs.update().set("body", "b").filter(docs.c("id").eq(1i32)),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let row = conn
        .fetch_one(docs.select().filter(docs.c("id").eq(1i32)), &[])
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>("body"), "b");
    assert_ne!(row.get::<_, uuid::Uuid>("version"), before);
}

#[tokio::test]
async fn test_rollback_upon_error() {
    let Some(mut conn) = get_conn().await else { return };

    let table = guinea_pigs();
    recreate(&conn, &table).await;
    conn.execute(table.insert().values([("value", "should exist")]), &[])
        .await
        .unwrap();

    {
        let tx = conn.transaction().await.unwrap();
        tx.execute(table.insert().values([("value", "should not exist")]), &[])
            .await
            .unwrap();
        let err = tx
            .execute("SELECT * FROM pgbind_no_such_table", &[])
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Semantic);
        assert_eq!(err.sqlstate(), Some("42P01"));
        // dropped without commit
    }

    let values: Vec<String> = conn
        .fetch("SELECT value FROM pgbind_guinea_pigs", &[])
        .await
        .unwrap()
        .iter()
        .map(|r| r.get(0))
        .collect();
    assert_eq!(values, vec!["should exist".to_string()]);
}

#[tokio::test]
async fn test_commit_and_explicit_rollback() {
    let Some(mut conn) = get_conn().await else { return };

    let table = Table::new(
        "pgbind_live_tx",
        vec![Column::new("value", SqlType::Text)],
    );
    recreate(&conn, &table).await;

    let tx = conn.transaction().await.unwrap();
    tx.execute(table.insert().values([("value", "kept")]), &[])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let tx = conn.transaction().await.unwrap();
    tx.execute(table.insert().values([("value", "dropped")]), &[])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let count: i64 = conn
        .fetch_value(select([count_all()]).select_from(&table), &[])
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_enum_labels_round_trip() {
    let Some(conn) = get_conn().await else { return };

    let mood = EnumType::with_labels("pgbind_live_mood", [("HAPPY", "happy"), ("SAD", "sad")]);
    let people = Table::new(
        "pgbind_live_people",
        vec![
            Column::new("name", SqlType::Text),
            Column::new("mood", SqlType::Enum(Arc::clone(&mood))).default_value("SAD"),
        ],
    );
    conn.execute_script(
        "DROP TABLE IF EXISTS pgbind_live_people; DROP TYPE IF EXISTS pgbind_live_mood",
        &[],
    )
    .await
    .unwrap();
    conn.execute(mood.create(), &[]).await.unwrap();
    conn.execute(people.create(), &[]).await.unwrap();

    conn.execute(
        people
            .insert()
            .values([("name", "ann"), ("mood", "HAPPY")]),
        &[],
    )
    .await
    .unwrap();
    conn.execute(people.insert().values([("name", "bob")]), &[])
        .await
        .unwrap();

    let labels: Vec<String> = conn
        .fetch("SELECT mood::text FROM pgbind_live_people ORDER BY name", &[])
        .await
        .unwrap()
        .iter()
        .map(|r| r.get(0))
        .collect();
    assert_eq!(labels, vec!["happy", "sad"]);

    let err = conn
        .execute(people.insert().values([("mood", "ANGRY")]), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Encode { .. }));
}

#[tokio::test]
async fn test_upsert_and_returning() {
    let Some(conn) = get_conn().await else { return };

    let counters = Table::new(
        "pgbind_live_counters",
        vec![
            Column::new("name", SqlType::Text).primary_key(),
            Column::new("hits", SqlType::Integer).not_null().default_value(1i32),
        ],
    );
    recreate(&conn, &counters).await;

    for _ in 0..3 {
        let upsert = counters
            .insert()
            .values([("name", "home")])
            .on_conflict_do_update(
                ["name"],
                [(
                    "hits",
                    counters.c("hits").op(
                        pgbind::ast::BinaryOperator::Plus,
                        counters.excluded("hits"),
                    ),
                )],
            )
            .returning([counters.c("hits")]);
        conn.fetch_one(upsert, &[]).await.unwrap();
    }
    let hits: i32 = conn
        .fetch_value(
            select([counters.c("hits")])
                .select_from(&counters)
                .filter(counters.c("name").eq("home")),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(hits, 3);

    let ignored = conn
        .execute(
            counters
                .insert()
                .values([("name", "home")])
                .on_conflict_do_nothing(["name"]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(ignored, 0);

    let found: bool = conn
        .fetch_value(
            select([exists(counters.select().filter(counters.c("name").eq("home")))]),
            &[],
        )
        .await
        .unwrap();
    assert!(found);

    let deleted = conn
        .fetch_optional(
            counters
                .delete()
                .filter(counters.c("name").eq("nowhere"))
                .returning([counters.c("name")]),
            &[],
        )
        .await
        .unwrap();
    assert!(deleted.is_none());
}

#[tokio::test]
async fn test_cursor_streams_rows() {
    let Some(conn) = get_conn().await else { return };

    let table = Table::new(
        "pgbind_live_numbers",
        vec![Column::new("n", SqlType::Integer)],
    );
    recreate(&conn, &table).await;
    conn.execute(
        table
            .insert()
            .multi_values((1..=5).map(|n| [("n", n as i32)])),
        &[],
    )
    .await
    .unwrap();

    let stream = conn
        .cursor(
            table
                .select()
                .filter(table.c("n").gt(2i32))
                .order_by(table.c("n")),
            &[],
        )
        .await
        .unwrap();
    let values: Vec<i32> = stream
        .map_ok(|row| row.get::<_, i32>(0))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(values, vec![3, 4, 5]);
}

#[tokio::test]
async fn test_raw_sql_keeps_caller_args() {
    let Some(conn) = get_conn().await else { return };

    let n: i32 = conn.fetch_value("SELECT $1::INT4 + 1", &[&41i32]).await.unwrap();
    assert_eq!(n, 42);
}

#[tokio::test]
async fn test_unsupported_fails_before_io() {
    let Some(conn) = get_conn().await else { return };

    let table = Table::new(
        "pgbind_never_created",
        vec![Column::new("created", SqlType::Timestamp)
            .default_clause(pgbind::ast::func("now", []))],
    );
    let err = conn.execute(table.insert(), &[]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Unsupported(Unsupported::ClauseDefault { .. })
    ));
}
