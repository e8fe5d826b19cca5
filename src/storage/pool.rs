//! Read-only SQLite connections.
//!
//! SQLite connections are not `Sync`, so concurrent readers need separate
//! connections. In WAL mode each reader sees a consistent snapshot while the
//! writer keeps appending.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::schema;
use crate::{Error, Result};

/// Opens one read-only connection to `path`.
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    schema::configure_reader(&conn, busy_timeout)?;
    Ok(conn)
}

/// Fixed set of read-only connections shared by point reads and scans.
///
/// A caller takes the first idle connection. When all are busy it waits on
/// one chosen round-robin, so load spreads instead of piling onto slot 0.
pub struct ReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    path: PathBuf,
}

impl ReadPool {
    /// Opens `size` connections. The database must already exist.
    pub fn open(path: &Path, size: usize, busy_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("read pool needs at least one connection".into()));
        }

        let connections = (0..size)
            .map(|_| open_read_only(path, busy_timeout).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            path: path.to_path_buf(),
        })
    }

    /// Runs `f` on a pooled connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        for conn in &self.connections {
            if let Some(guard) = conn.try_lock() {
                return f(&guard);
            }
        }

        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let guard = self.connections[slot].lock();
        f(&guard)
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_db() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch("PRAGMA journal_mode = WAL").unwrap();
        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", [])
            .unwrap();
        conn.execute("INSERT INTO test (id, value) VALUES (1, 'hello')", [])
            .unwrap();
        drop(conn);

        (temp_dir, db_path)
    }

    #[test]
    fn test_pool_reads() {
        let (_dir, path) = create_test_db();
        let pool = ReadPool::open(&path, 2, Duration::from_secs(1)).unwrap();
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.path(), path.as_path());

        let value: String = pool
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT value FROM test WHERE id = 1", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    fn test_pool_connections_are_read_only() {
        let (_dir, path) = create_test_db();
        let pool = ReadPool::open(&path, 1, Duration::from_secs(1)).unwrap();

        let result = pool.with_connection(|conn| {
            Ok(conn.execute("INSERT INTO test (id, value) VALUES (2, 'x')", [])?)
        });
        assert!(matches!(result, Err(Error::Sqlite(_))));
    }

    #[test]
    fn test_pool_concurrent_readers() {
        let (_dir, path) = create_test_db();
        let pool = Arc::new(ReadPool::open(&path, 2, Duration::from_secs(1)).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    pool.with_connection(|conn| {
                        Ok(conn.query_row("SELECT COUNT(*) FROM test", [], |row| {
                            row.get::<_, i64>(0)
                        })?)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let (_dir, path) = create_test_db();
        assert!(matches!(
            ReadPool::open(&path, 0, Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
    }
}
