//! End-to-end runs against a real Postgres.
//!
//! Skipped unless `SLUICE_TEST_DATABASE_URL` points at a disposable database.

mod support;

use std::sync::Arc;

use sqlx::{Connection as _, Executor as _, PgConnection};

use sluice_loader::store::{PgStore, PgStoreOptions, Store};
use sluice_loader::{Harness, ImportOptions, StrategyKind};

use support::*;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS customers (
    id BIGSERIAL PRIMARY KEY,
    custom_id TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    company TEXT NOT NULL,
    city TEXT NOT NULL,
    country TEXT NOT NULL,
    birthday DATE NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
)";

fn database_url() -> Option<String> {
    std::env::var("SLUICE_TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.is_empty())
}

async fn postgres_store(url: &str) -> Arc<dyn Store> {
    let mut conn = PgConnection::connect(url).await.unwrap();
    conn.execute(SCHEMA).await.unwrap();
    conn.close().await.unwrap();

    Arc::new(
        PgStore::new(PgStoreOptions {
            url: url.to_string(),
            connect_timeout_seconds: 10,
            statement_timeout_seconds: 60,
            lock_timeout_seconds: 10,
            local_file_load: true,
        })
        .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_strategy_loads_the_file_into_postgres() {
    let Some(url) = database_url() else {
        eprintln!("SLUICE_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let store = postgres_store(&url).await;
    let harness = Harness::new(Arc::clone(&store));
    let csv = customers_csv(2_500);
    let options = ImportOptions {
        batch_size: 1_000,
        workers: 4,
    };

    for kind in StrategyKind::ALL {
        store.connect().await.unwrap().truncate().await.unwrap();
        let importer = kind.build(&options).unwrap();
        let sample = harness.run(importer.as_ref(), csv.path()).await.unwrap();

        assert!(sample.succeeded(), "{kind}: {:?}", sample.failure);
        let expected = if kind == StrategyKind::StreamChunkedFiltered {
            valid_email_count(2_500)
        } else {
            2_500
        };
        assert_eq!(sample.row_delta(), Some(expected as i64), "{kind}");
        let statements = match kind {
            StrategyKind::StreamChunked
            | StrategyKind::StreamChunkedRaw
            | StrategyKind::PreparedChunked => Some(3),
            StrategyKind::StreamPerRecord | StrategyKind::PreparedPerRecord => Some(2_500),
            // 625 rows per worker: one remainder statement each.
            StrategyKind::Partitioned => Some(4),
            _ => None,
        };
        if let Some(statements) = statements {
            assert_eq!(sample.statement_count, Some(statements), "{kind}");
        }
    }

    // A statement prepared once is re-bound with text parameters on every execute.
    let mut conn = store.connect().await.unwrap();
    conn.truncate().await.unwrap();
    let records = sluice_loader::reader::read_all(csv.path()).await.unwrap();
    let stamp = sluice_loader::AuditStamp::now();
    let statement = conn.prepare(2).await.unwrap();
    for pair in records[..6].chunks(2) {
        assert_eq!(conn.execute(&statement, pair, &stamp).await.unwrap(), 2);
    }
    assert_eq!(conn.row_count().await.unwrap(), 6);

    conn.truncate().await.unwrap();
}
