//! Instrumented SQLite connection used by the graph compiler.
//!
//! Every statement goes through [`Driver::exec`] or [`Driver::query`], which
//! check the [`Context`] for cancellation, log the SQL under the
//! `entgraph::sql` target and count the call in [`DriverMetrics`].

mod metrics;
mod tx;

use std::{cell::Cell, path::Path};

use rusqlite::{Connection, Row, params_from_iter};
use tracing::trace;

pub use metrics::{CacheObservation, DriverMetrics, DriverMetricsSnapshot, StatementTracker};
pub use tx::TxGuard;

use crate::{config::SqliteConfig, context::Context, errors::EntGraphError, sql::Statement};

const DEFAULT_STATEMENT_CACHE: usize = 128;

pub struct Driver {
    pub(crate) conn: Connection,
    metrics: DriverMetrics,
    tracker: StatementTracker,
    savepoints: Cell<u64>,
}

// In-memory databases report an empty file name.
fn is_in_memory_connection(conn: &Connection) -> bool {
    match conn.pragma_query_value(None, "database_list", |row| {
        let name: String = row.get(2)?;
        Ok(name)
    }) {
        Ok(name) => name.is_empty() || name == ":memory:",
        Err(_) => true,
    }
}

impl Driver {
    pub fn open<P: AsRef<Path>>(path: P, cfg: &SqliteConfig) -> Result<Self, EntGraphError> {
        let conn =
            Connection::open(path).map_err(|e| EntGraphError::connection(e.to_string()))?;
        Self::from_connection(conn, cfg)
    }

    pub fn open_in_memory(cfg: &SqliteConfig) -> Result<Self, EntGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EntGraphError::connection(e.to_string()))?;
        Self::from_connection(conn, cfg)
    }

    pub fn from_connection(conn: Connection, cfg: &SqliteConfig) -> Result<Self, EntGraphError> {
        conn.set_prepared_statement_cache_capacity(
            cfg.cache_size.unwrap_or(DEFAULT_STATEMENT_CACHE),
        );
        conn.pragma_update(None, "foreign_keys", cfg.foreign_keys)
            .map_err(|e| EntGraphError::connection(e.to_string()))?;

        if !is_in_memory_connection(&conn) {
            if conn.pragma_update(None, "journal_mode", "WAL").is_err() {
                // Some filesystems cannot host a WAL.
                let _ = conn.pragma_update(None, "journal_mode", "DELETE");
            }
            let _ = conn.pragma_update(None, "synchronous", "NORMAL");
            let _ = conn.pragma_update(None, "temp_store", "MEMORY");
        }

        for (key, value) in &cfg.pragma_settings {
            conn.pragma_update(None, key, value)
                .map_err(|e| EntGraphError::connection(format!("pragma {key}: {e}")))?;
        }

        Ok(Self {
            conn,
            metrics: DriverMetrics::default(),
            tracker: StatementTracker::default(),
            savepoints: Cell::new(0),
        })
    }

    /// Execute one write statement and return the rows it changed.
    pub fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<usize, EntGraphError> {
        ctx.check()?;
        trace!(target: "entgraph::sql", sql = %stmt.sql, args = stmt.args.len(), "exec");
        let mut prepared = self.prepare(&stmt.sql)?;
        self.metrics.record_execute(&stmt.sql);
        Ok(prepared.execute(params_from_iter(stmt.args.iter()))?)
    }

    /// Run a query and map every row through `f`.
    pub fn query<T, F>(&self, ctx: &Context, stmt: &Statement, mut f: F) -> Result<Vec<T>, EntGraphError>
    where
        F: FnMut(&Row<'_>) -> Result<T, EntGraphError>,
    {
        ctx.check()?;
        trace!(target: "entgraph::sql", sql = %stmt.sql, args = stmt.args.len(), "query");
        let mut prepared = self.prepare(&stmt.sql)?;
        self.metrics.record_execute(&stmt.sql);
        let mut rows = prepared.query(params_from_iter(stmt.args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(f(row)?);
        }
        Ok(out)
    }

    /// Single-integer query such as `COUNT(*)`. An empty result reads as zero.
    pub fn query_count(&self, ctx: &Context, stmt: &Statement) -> Result<usize, EntGraphError> {
        let counts = self.query(ctx, stmt, |row| Ok(row.get::<_, i64>(0)?))?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Run raw SQL (schema setup, fixtures). Not routed through the builder.
    pub fn execute_batch(&self, sql: &str) -> Result<(), EntGraphError> {
        self.raw_execute(sql)
    }

    /// Open a transaction, or a savepoint when one is already active.
    pub fn tx(&self, ctx: &Context) -> Result<TxGuard<'_>, EntGraphError> {
        ctx.check()?;
        TxGuard::begin(self)
    }

    /// Open a transaction only when the operation spans several statements.
    pub fn maybe_tx(
        &self,
        ctx: &Context,
        needed: bool,
    ) -> Result<Option<TxGuard<'_>>, EntGraphError> {
        if needed { self.tx(ctx).map(Some) } else { Ok(None) }
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn metrics(&self) -> &DriverMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> DriverMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn prepare(&self, sql: &str) -> Result<rusqlite::CachedStatement<'_>, EntGraphError> {
        self.metrics.record_prepare(self.tracker.observe(sql));
        Ok(self.conn.prepare_cached(sql)?)
    }

    pub(crate) fn raw_execute(&self, sql: &str) -> Result<(), EntGraphError> {
        trace!(target: "entgraph::sql", sql = %sql, "batch");
        self.metrics.record_execute(sql);
        Ok(self.conn.execute_batch(sql)?)
    }

    fn next_savepoint(&self) -> String {
        let n = self.savepoints.get() + 1;
        self.savepoints.set(n);
        format!("entgraph_{n}")
    }
}
