pub mod repository;
pub mod store;

use std::sync::{Arc, Mutex};

use rusqlite_migration::{Migrations, M};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

pub use store::{SqliteStore, StoreRanking, TopKQuery};

/// Reader connections opened for an on-disk database.
pub const READER_POOL_SIZE: usize = 4;

/// Reader connections not currently running a closure, plus one permit per
/// connection so callers wait for a free reader instead of queueing on a
/// busy one.
struct ReaderPool {
    idle: Mutex<Vec<tokio_rusqlite::Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ReaderPool {
    fn new(conns: Vec<tokio_rusqlite::Connection>) -> Self {
        let size = conns.len();
        Self {
            idle: Mutex::new(conns),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }
}

/// A checked-out reader. It travels with the closure and goes back to the
/// idle list once the closure has run on the connection thread (or was
/// dropped unrun), even if the caller stopped waiting.
struct Lease {
    conn: Option<tokio_rusqlite::Connection>,
    pool: Arc<ReaderPool>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let (Some(conn), Ok(mut idle)) = (self.conn.take(), self.pool.idle.lock()) {
            idle.push(conn);
        }
    }
}

/// Database wraps a writer `tokio_rusqlite::Connection` and a small pool of
/// readers, using WAL mode so report queries never wait behind imports or
/// behind each other.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    readers: Arc<ReaderPool>,
}

impl Database {
    /// Open the database at the default path (`~/.marketpulse/marketpulse.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".marketpulse");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("marketpulse.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = tokio_rusqlite::Connection::open(&path).await?;
            Self::init_reader(&conn).await?;
            readers.push(conn);
        }

        Ok(Self {
            writer,
            readers: Arc::new(ReaderPool::new(readers)),
        })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory databases are per-connection, so every role shares one.
        Ok(Self {
            readers: Arc::new(ReaderPool::new(vec![writer.clone()])),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!(
                "migrations/001_initial.sql"
            ))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Run a read-only closure on a free reader connection, waiting for one
    /// if every reader is busy.
    pub async fn read<F, R, E>(&self, function: F) -> std::result::Result<R, tokio_rusqlite::Error<E>>
    where
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let permit = self
            .readers
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| tokio_rusqlite::Error::ConnectionClosed)?;
        let conn = self
            .readers
            .idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .ok_or(tokio_rusqlite::Error::ConnectionClosed)?;
        let lease = Lease {
            conn: Some(conn.clone()),
            pool: self.readers.clone(),
            _permit: permit,
        };
        conn.call(move |c| {
            let _lease = lease;
            function(c)
        })
        .await
    }

    /// Number of reader connections.
    pub fn reader_count(&self) -> usize {
        self.readers.size
    }
}
