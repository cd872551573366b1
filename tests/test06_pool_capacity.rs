#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use pg_bridge::test_utils::setup_postgres_embedded;
use pg_bridge::{PoolSettings, RemoteTable};

const CAPACITY: usize = 4;
const WORKERS: usize = 24;
const QUERIES_PER_WORKER: usize = 5;

#[tokio::test]
async fn concurrent_load_never_exceeds_pool_capacity() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("bridge_pool_load").await?;
    let admin = pg.admin_client().await?;
    admin
        .batch_execute(
            "CREATE TABLE pool_load (v integer);
             INSERT INTO pool_load SELECT i FROM generate_series(0, 499) AS t(i)",
        )
        .await?;

    // The DDL connection would otherwise count against the sampled total.
    drop(admin);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let pool_settings = PoolSettings {
        capacity: CAPACITY,
        ..PoolSettings::default()
    };
    let table = Arc::new(RemoteTable::attach(pg.table_args("pool_load"), pool_settings).await?);

    // Sample backend count from outside the database under load; the
    // sampler connects to the maintenance database so it never counts
    // itself.
    let sampler_client = pg.client_for("postgres").await?;
    let stop = Arc::new(AtomicBool::new(false));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let sampler = {
        let stop = stop.clone();
        let max_seen = max_seen.clone();
        let database = pg.database.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                if let Ok(row) = sampler_client
                    .query_one(
                        "SELECT count(*) FROM pg_stat_activity WHERE datname = $1",
                        &[&database],
                    )
                    .await
                {
                    let current: i64 = row.get(0);
                    max_seen.fetch_max(current as usize, Ordering::Relaxed);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    let mut workers = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        let table = table.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..QUERIES_PER_WORKER {
                let mut rows = 0u64;
                let mut stream = table.select(None, None).await?;
                while let Some(row) = stream.next().await {
                    row?;
                    rows += 1;
                }
                assert_eq!(rows, 500);
            }
            Ok::<(), pg_bridge::PgBridgeError>(())
        }));
    }
    for worker in workers {
        worker.await??;
    }

    stop.store(true, Ordering::Relaxed);
    sampler.await?;

    let max_seen = max_seen.load(Ordering::Relaxed);
    assert!(max_seen > 0, "sampler saw no connections at all");
    assert!(
        max_seen <= CAPACITY,
        "saw {max_seen} concurrent connections, capacity is {CAPACITY}"
    );

    pg.stop().await;
    Ok(())
}
