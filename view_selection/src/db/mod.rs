//! Persisting views in an SQL database and scoring them with SQL queries
//!
//! Note: Only available if the `view-sqlite` or the `view-duckdb` feature is enabled.

/// Database-backed [`PairwiseScorer`](crate::scoring::PairwiseScorer)
pub mod scorer;
/// Schema, ingestion and metadata of persisted views
pub mod store;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::view::{EdgeId, InstanceIndex, ViewError};

#[doc(inline)]
pub use scorer::DatabaseScorer;
#[doc(inline)]
pub use store::{
    count_distinct_edges, create_view_schema, load_view_meta, precompute_counts,
    store_staged_views, store_views, ViewMeta,
};

/// SQL Database Connection
///
/// Used to abstract away from actual implementation (currently SQLite or DuckDB)
#[derive(Debug, Clone, Copy)]
pub enum DatabaseConnection<'a> {
    #[cfg(feature = "view-sqlite")]
    /// SQLite Database Connection
    SQLITE(&'a rusqlite::Connection),
    #[cfg(feature = "view-duckdb")]
    /// DuckDB Database Connection
    DUCKDB(&'a ::duckdb::Connection),
}

#[cfg(feature = "view-sqlite")]
impl<'a> From<&'a rusqlite::Connection> for DatabaseConnection<'a> {
    fn from(value: &'a rusqlite::Connection) -> Self {
        Self::SQLITE(value)
    }
}
#[cfg(feature = "view-duckdb")]
impl<'a> From<&'a ::duckdb::Connection> for DatabaseConnection<'a> {
    fn from(value: &'a ::duckdb::Connection) -> Self {
        Self::DUCKDB(value)
    }
}
impl<'a> From<&DatabaseConnection<'a>> for DatabaseConnection<'a> {
    fn from(value: &DatabaseConnection<'a>) -> Self {
        *value
    }
}

/// SQL Database Error
///
/// Used to abstract away from actual implementation (currently SQLite or DuckDB)
#[derive(Debug)]
pub enum DatabaseError {
    #[cfg(feature = "view-sqlite")]
    /// SQLite Database Error
    SQLITE(rusqlite::Error),
    #[cfg(feature = "view-duckdb")]
    /// DuckDB Database Error
    DUCKDB(::duckdb::Error),
    /// Reading staged rows failed while ingesting a view
    View(ViewError),
    /// A view index without a stored view
    UnknownView {
        /// The requested view index
        view_index: usize,
        /// Number of stored views
        num_views: usize,
    },
    /// The view metadata is inconsistent with the stored views
    MissingMetadata(String),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseError::SQLITE(e) => write!(f, "SQLite Error: {}", e),
            #[cfg(feature = "view-duckdb")]
            DatabaseError::DUCKDB(e) => write!(f, "DuckDB Error: {}", e),
            DatabaseError::View(e) => write!(f, "{}", e),
            DatabaseError::UnknownView {
                view_index,
                num_views,
            } => write!(
                f,
                "Unknown view {} (only {} views are stored)",
                view_index, num_views
            ),
            DatabaseError::MissingMetadata(reason) => {
                write!(f, "Missing view metadata: {}", reason)
            }
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseError::SQLITE(e) => Some(e),
            #[cfg(feature = "view-duckdb")]
            DatabaseError::DUCKDB(e) => Some(e),
            DatabaseError::View(e) => Some(e),
            DatabaseError::UnknownView { .. } | DatabaseError::MissingMetadata(_) => None,
        }
    }
}

#[cfg(feature = "view-sqlite")]
impl From<rusqlite::Error> for DatabaseError {
    fn from(value: rusqlite::Error) -> Self {
        Self::SQLITE(value)
    }
}
#[cfg(feature = "view-duckdb")]
impl From<::duckdb::Error> for DatabaseError {
    fn from(value: ::duckdb::Error) -> Self {
        Self::DUCKDB(value)
    }
}
impl From<ViewError> for DatabaseError {
    fn from(value: ViewError) -> Self {
        Self::View(value)
    }
}

///
/// Options for connections to the view database
///
/// `memory_limit` and `threads` are passed to DuckDB; SQLite ignores them.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Keep per-instance edge-count tables from an earlier run instead of recomputing them
    ///
    /// Storing a view always drops its count table, so reused counts are never stale.
    pub reuse_counts: bool,
    /// Maximum memory of a DuckDB connection (e.g., `"4GB"`)
    pub memory_limit: Option<String>,
    /// Maximum number of threads of a DuckDB connection
    pub threads: Option<usize>,
}

/// Database engine holding the persisted views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseBackend {
    #[cfg(feature = "view-sqlite")]
    /// SQLite
    SQLite,
    #[cfg(feature = "view-duckdb")]
    /// DuckDB
    DuckDB,
}

impl DatabaseBackend {
    /// Pick the backend from the file extension of a database path
    ///
    /// `.duckdb` files use DuckDB (if enabled), everything else SQLite (if enabled).
    pub fn from_path(path: &Path) -> Self {
        #[cfg(feature = "view-duckdb")]
        if path.extension().and_then(|e| e.to_str()) == Some("duckdb") {
            return DatabaseBackend::DuckDB;
        }
        #[cfg(feature = "view-sqlite")]
        return DatabaseBackend::SQLite;
        #[cfg(not(feature = "view-sqlite"))]
        DatabaseBackend::DuckDB
    }

    /// Open a connection to the database at `path` with default [`DatabaseOptions`]
    pub fn open<P: AsRef<Path>>(
        &self,
        path: P,
        read_only: bool,
    ) -> Result<OwnedDatabaseConnection, DatabaseError> {
        self.open_with_options(path, read_only, &DatabaseOptions::default())
    }

    /// Open a connection to the database at `path`
    pub fn open_with_options<P: AsRef<Path>>(
        &self,
        path: P,
        read_only: bool,
        options: &DatabaseOptions,
    ) -> Result<OwnedDatabaseConnection, DatabaseError> {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseBackend::SQLite => {
                if options.memory_limit.is_some() || options.threads.is_some() {
                    log::debug!("SQLite ignores the memory limit and thread count options");
                }
                let con = if read_only {
                    rusqlite::Connection::open_with_flags(
                        path,
                        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
                    )?
                } else {
                    rusqlite::Connection::open(path)?
                };
                Ok(OwnedDatabaseConnection::SQLITE(con))
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseBackend::DuckDB => {
                let mut config = ::duckdb::Config::default();
                if read_only {
                    config = config.access_mode(::duckdb::AccessMode::ReadOnly)?;
                }
                if let Some(memory_limit) = &options.memory_limit {
                    config = config.max_memory(memory_limit)?;
                }
                if let Some(threads) = options.threads {
                    config = config.threads(threads as i64)?;
                }
                let con = ::duckdb::Connection::open_with_flags(path, config)?;
                Ok(OwnedDatabaseConnection::DUCKDB(con))
            }
        }
    }
}

/// An open connection owned by the caller (see [`DatabaseBackend::open`])
#[derive(Debug)]
pub enum OwnedDatabaseConnection {
    #[cfg(feature = "view-sqlite")]
    /// SQLite Database Connection
    SQLITE(rusqlite::Connection),
    #[cfg(feature = "view-duckdb")]
    /// DuckDB Database Connection
    DUCKDB(::duckdb::Connection),
}

impl<'a> From<&'a OwnedDatabaseConnection> for DatabaseConnection<'a> {
    fn from(value: &'a OwnedDatabaseConnection) -> Self {
        match value {
            #[cfg(feature = "view-sqlite")]
            OwnedDatabaseConnection::SQLITE(con) => DatabaseConnection::SQLITE(con),
            #[cfg(feature = "view-duckdb")]
            OwnedDatabaseConnection::DUCKDB(con) => DatabaseConnection::DUCKDB(con),
        }
    }
}

impl<'a> DatabaseConnection<'a> {
    /// Execute a SQL statement without any parameters
    pub fn execute_no_params(&self, query: &str) -> Result<usize, DatabaseError> {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => Ok(connection.execute(query, [])?),
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => Ok(connection.execute(query, [])?),
        }
    }

    ///
    /// Run `f` inside a transaction
    ///
    /// Commits if `f` succeeds; otherwise rolls back and returns the error of `f`,
    /// so the connection is usable again afterwards.
    ///
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce() -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        self.execute_no_params("BEGIN TRANSACTION")?;
        match f() {
            Ok(res) => {
                self.execute_no_params("COMMIT")?;
                Ok(res)
            }
            Err(e) => {
                if let Err(rollback_err) = self.execute_no_params("ROLLBACK") {
                    log::warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Checks if a table with the given name exists
    pub fn table_exists(&self, table: &str) -> Result<bool, DatabaseError> {
        let count = match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => connection.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, i64>(0),
            )?,
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => connection.query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                [table],
                |row| row.get::<_, i64>(0),
            )?,
        };
        Ok(count > 0)
    }

    /// Query a single integer value
    pub fn query_i64(&self, query: &str) -> Result<i64, DatabaseError> {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => {
                Ok(connection.query_row(query, [], |row| row.get::<_, i64>(0))?)
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => {
                Ok(connection.query_row(query, [], |row| row.get::<_, i64>(0))?)
            }
        }
    }

    /// Query a single (nullable) floating point value
    pub fn query_f64(&self, query: &str) -> Result<Option<f64>, DatabaseError> {
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => {
                Ok(connection.query_row(query, [], |row| row.get::<_, Option<f64>>(0))?)
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => {
                Ok(connection.query_row(query, [], |row| row.get::<_, Option<f64>>(0))?)
            }
        }
    }

    /// Insert `(edge, instance)` rows into a view table
    pub fn insert_edge_rows(
        &self,
        table: &str,
        rows: impl Iterator<Item = Result<(EdgeId, InstanceIndex), ViewError>>,
    ) -> Result<u64, DatabaseError> {
        let mut num_rows = 0;
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => {
                let mut s =
                    connection.prepare_cached(&format!(r#"INSERT INTO "{table}" VALUES (?1, ?2)"#))?;
                for row in rows {
                    let (edge, instance) = row?;
                    s.execute(rusqlite::params![edge.into_inner() as i64, instance as i64])?;
                    num_rows += 1;
                }
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => {
                let mut appender = connection.appender(table)?;
                for row in rows {
                    let (edge, instance) = row?;
                    appender.append_row(::duckdb::params![edge.into_inner() as i64, instance as i64])?;
                    num_rows += 1;
                }
                appender.flush()?;
            }
        }
        Ok(num_rows)
    }

    /// Insert the metadata row of a stored view
    pub fn insert_view_meta(&self, table: &str, meta: &ViewMeta) -> Result<(), DatabaseError> {
        let query = format!(r#"INSERT OR REPLACE INTO "{table}" VALUES (?, ?, ?, ?, ?)"#);
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => {
                connection.execute(
                    &query,
                    rusqlite::params![
                        meta.view_index as i64,
                        meta.label,
                        meta.num_process_executions as i64,
                        meta.num_events as i64,
                        meta.avg_events_per_trace
                    ],
                )?;
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => {
                connection.execute(
                    &query,
                    ::duckdb::params![
                        meta.view_index as i64,
                        meta.label,
                        meta.num_process_executions as i64,
                        meta.num_events as i64,
                        meta.avg_events_per_trace
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Query all metadata rows of a metadata table, ordered by view index
    pub fn query_view_meta(&self, table: &str) -> Result<Vec<ViewMeta>, DatabaseError> {
        let query = format!(
            r#"SELECT view_idx, label, num_process_executions, num_events, avg_events_per_trace FROM "{table}" ORDER BY view_idx"#
        );
        match self {
            #[cfg(feature = "view-sqlite")]
            DatabaseConnection::SQLITE(connection) => {
                let mut s = connection.prepare(&query)?;
                let rows = s.query_map([], |row| {
                    Ok(ViewMeta {
                        view_index: row.get::<_, i64>(0)? as usize,
                        label: row.get(1)?,
                        num_process_executions: row.get::<_, i64>(2)? as usize,
                        num_events: row.get::<_, i64>(3)? as usize,
                        avg_events_per_trace: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            }
            #[cfg(feature = "view-duckdb")]
            DatabaseConnection::DUCKDB(connection) => {
                let mut s = connection.prepare(&query)?;
                let rows = s.query_map([], |row| {
                    Ok(ViewMeta {
                        view_index: row.get::<_, i64>(0)? as usize,
                        label: row.get(1)?,
                        num_process_executions: row.get::<_, i64>(2)? as usize,
                        num_events: row.get::<_, i64>(3)? as usize,
                        avg_events_per_trace: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            }
        }
    }
}
