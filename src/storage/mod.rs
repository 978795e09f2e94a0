pub mod repository;
pub mod schema;

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// The monitor's SQLite store: one connection for writes, one read-only
/// connection for report queries, both in WAL mode.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
     PRAGMA foreign_keys=ON;\
     PRAGMA busy_timeout=5000;";

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial.sql")),
        M::up(include_str!("migrations/002_monthly_goals.sql")),
    ])
}

impl Database {
    /// Open the database at the default path (`~/.advisor-monitor/monitor.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".advisor-monitor");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("monitor.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening database at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        let db = Self { writer, reader };
        db.ensure_dimensions().await?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        let db = Self {
            reader: writer.clone(),
            writer,
        };
        db.ensure_dimensions().await?;
        Ok(db)
    }

    /// Pragmas and schema for the connection that owns all writes.
    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            migrations().to_latest(conn)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    /// The reader never writes; `query_only` makes that a hard error.
    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            conn.pragma_update(None, "query_only", true)
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    async fn ensure_dimensions(&self) -> Result<()> {
        self.writer.call(|conn| schema::ensure_dim_month(conn)).await?;
        Ok(())
    }
}
