//! Bounded SQLite connection pool. Acquisition is FIFO (r2d2's internal
//! queue) with a cap timeout — the §5 shared-resource policy for C2.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{Result, StoreError};
use crate::schema;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ConnectionPool {
    pub fn open(path: &std::path::Path, pool_size: u32, acquire_timeout: Duration) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        Self::build(manager, pool_size, acquire_timeout)
    }

    pub fn open_in_memory(pool_size: u32) -> Result<Self> {
        // A file-backed shared-cache URI keeps every pooled connection pointing
        // at the same in-memory database instead of each getting its own.
        let manager = SqliteConnectionManager::file("file::memory:?cache=shared")
            .with_flags(rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX);
        Self::build(manager, pool_size, Duration::from_secs(5))
    }

    fn build(manager: SqliteConnectionManager, pool_size: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(acquire_timeout)
            .build(manager)
            .map_err(|e| StoreError::InvalidData(format!("pool build failed: {e}")))?;

        {
            let conn = pool
                .get()
                .map_err(|e| StoreError::PoolTimeout(e.to_string()))?;
            schema::initialize(&conn)?;
        }

        Ok(Self { pool })
    }

    pub fn get(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(|e| StoreError::PoolTimeout(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_pool() {
        let pool = ConnectionPool::open_in_memory(4).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch("SELECT 1").unwrap();
    }

    #[test]
    fn test_pool_shares_schema_across_connections() {
        let pool = ConnectionPool::open_in_memory(4).unwrap();
        let a = pool.get().unwrap();
        a.execute(
            "INSERT INTO conversations (id, project_id, started_at, last_activity_at) VALUES ('x','p',0,0)",
            [],
        )
        .unwrap();
        drop(a);

        let b = pool.get().unwrap();
        let count: i64 = b
            .query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
