#![cfg(feature = "test-utils")]

use futures_util::StreamExt;
use pg_bridge::test_utils::setup_postgres_embedded;
use pg_bridge::{PoolSettings, RemoteTable, Value};

#[tokio::test]
async fn bulk_insert_then_filtered_selects() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("bridge_many").await?;
    let admin = pg.admin_client().await?;
    admin
        .batch_execute("CREATE TABLE test_many (a integer, b text, c integer)")
        .await?;

    let table = RemoteTable::attach(pg.table_args("test_many"), PoolSettings::default()).await?;

    let rows: Vec<Vec<Value>> = (0..10_000)
        .map(|i| {
            vec![
                Value::Int32(i),
                Value::Text(format!("name_{i}")),
                Value::Int32(3),
            ]
        })
        .collect();
    assert_eq!(table.insert(&rows).await?, 10_000);

    let mut count = 0u64;
    let mut sum_c = 0i64;
    let mut stream = table.select(None, None).await?;
    while let Some(row) = stream.next().await {
        let row = row?;
        count += 1;
        sum_c += row[2].as_i64().expect("c is an integer");
    }
    assert_eq!(count, 10_000);
    assert_eq!(sum_c, 30_000);

    let mut even = 0u64;
    let mut stream = table.select(Some(&["a"]), Some("a % 2 = 0")).await?;
    while let Some(row) = stream.next().await {
        let row = row?;
        assert_eq!(row.len(), 1);
        even += 1;
    }
    assert_eq!(even, 5_000);

    let mut named = 0u64;
    let mut stream = table.select(None, Some("b = 'name_1'")).await?;
    while let Some(row) = stream.next().await {
        row?;
        named += 1;
    }
    assert_eq!(named, 1);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn abandoned_stream_does_not_poison_later_reads() -> Result<(), Box<dyn std::error::Error>>
{
    let pg = setup_postgres_embedded("bridge_abort").await?;
    let admin = pg.admin_client().await?;
    admin
        .batch_execute(
            "CREATE TABLE test_abort (a integer);
             INSERT INTO test_abort SELECT i FROM generate_series(0, 9999) AS t(i)",
        )
        .await?;

    let table = RemoteTable::attach(pg.table_args("test_abort"), PoolSettings::default()).await?;

    // Abandon a read mid-protocol; the leased connection is discarded
    // rather than returned half-consumed.
    let mut stream = table.select(None, None).await?;
    let first = stream.next().await.expect("at least one row")?;
    assert_eq!(first.len(), 1);
    drop(stream);

    // A fresh lease must see a clean connection.
    let mut count = 0u64;
    let mut stream = table.select(None, None).await?;
    while let Some(row) = stream.next().await {
        row?;
        count += 1;
    }
    assert_eq!(count, 10_000);

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn unknown_projected_column_fails_before_streaming()
-> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("bridge_proj").await?;
    let admin = pg.admin_client().await?;
    admin
        .batch_execute("CREATE TABLE test_proj (a integer)")
        .await?;

    let table = RemoteTable::attach(pg.table_args("test_proj"), PoolSettings::default()).await?;
    let err = table.select(Some(&["missing"]), None).await.unwrap_err();
    assert!(matches!(
        err,
        pg_bridge::PgBridgeError::UnknownColumn(ref name) if name == "missing"
    ));

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn attach_fails_for_missing_table() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("bridge_missing").await?;

    let result = RemoteTable::attach(pg.table_args("no_such_table"), PoolSettings::default()).await;
    assert!(result.is_err(), "attach must fail before any row flows");

    pg.stop().await;
    Ok(())
}
