#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::de::DeserializeOwned;
use serde::Serialize;
use streamstore::{EventStore, SqliteEventLog, StoreConfig};

pub const WAIT: Duration = Duration::from_secs(5);
pub const POLL: Duration = Duration::from_millis(5);

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = SqliteEventLog::open(&path).expect("initialize database");
    (dir, path)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn count_rows(path: &Path, stream: &str) -> i64 {
    open_read_only(path)
        .query_row(
            "SELECT COUNT(*) FROM events WHERE stream_id = ?1",
            [stream],
            |row| row.get(0),
        )
        .expect("count rows")
}

/// A JSON store on a fresh database file.
pub fn sqlite_store<E>() -> (tempfile::TempDir, PathBuf, EventStore<E>)
where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    let (dir, path) = create_temp_db_file("events.db");
    let store = EventStore::open(&path).expect("open store");
    (dir, path, store)
}

pub fn sqlite_store_with_config<E>(
    configure: impl FnOnce(StoreConfig) -> StoreConfig,
) -> (tempfile::TempDir, EventStore<E>)
where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let config = configure(StoreConfig::new(dir.path().join("events.db")));
    let store = EventStore::open_with_config(config).expect("open store");
    (dir, store)
}

/// A shared vector plus a consumer that appends to it.
pub fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static)
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: T| sink.lock().push(event))
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Waits until `seen` holds at least `count` items and returns a snapshot.
pub async fn wait_for_len<T: Clone>(seen: &Mutex<Vec<T>>, count: usize) -> Vec<T> {
    eventually(WAIT, POLL, || {
        let items = seen.lock();
        (items.len() >= count).then(|| items.clone())
    })
    .await
}
