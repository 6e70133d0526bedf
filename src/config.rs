//! Configuration for opening a client and tuning the compiler.
//!
//! This module holds the connection options applied when the SQLite driver is
//! opened, the batching limits used by bulk creates, and the fallback decision
//! the privacy engine applies when no rule reaches a verdict.

use std::collections::HashMap;
use std::path::Path;

use crate::{client::Client, errors::EntGraphError};

/// Configuration for the SQLite connection.
///
/// # Default Configuration
///
/// ```rust
/// use entgraph::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(config.foreign_keys);
/// assert!(config.cache_size.is_none());
/// assert!(config.pragma_settings.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Enforce foreign keys on the connection
    ///
    /// **Default:** `true`
    ///
    /// Edges stored as foreign-key columns and `ON DELETE CASCADE` clauses
    /// declared in the schema are only honored while this pragma is on.
    /// Turning it off leaves dangling edge columns after deletes.
    pub foreign_keys: bool,

    /// Optional capacity of the prepared statement cache
    ///
    /// **Default:** `None` (128 statements)
    ///
    /// The compiler renders a small set of statement shapes per entity type,
    /// so the default is enough unless many entity types are used through
    /// one client.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use entgraph::ClientConfig;
    ///
    /// let mut cfg = ClientConfig::default();
    /// cfg.sqlite.cache_size = Some(512);
    /// assert_eq!(cfg.sqlite.cache_size, Some(512));
    /// ```
    pub cache_size: Option<usize>,

    /// Additional SQLite PRAGMA settings
    ///
    /// **Default:** `HashMap::new()` (empty)
    ///
    /// Applied after the connection is opened, after the built-in settings.
    /// File databases already run with `journal_mode = WAL` and
    /// `synchronous = NORMAL`; entries here override them.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use entgraph::ClientConfig;
    ///
    /// let mut cfg = ClientConfig::default();
    /// cfg.sqlite
    ///     .pragma_settings
    ///     .insert("busy_timeout".to_string(), "5000".to_string());
    /// ```
    pub pragma_settings: HashMap<String, String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            cache_size: None,
            pragma_settings: HashMap::new(),
        }
    }
}

/// Limits for bulk creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Most rows rendered into one multi-row `INSERT`
    ///
    /// **Default:** `1000`
    ///
    /// Chunks are shrunk further when rows x columns would exceed SQLite's
    /// bound-parameter limit.
    pub max_batch_size: usize,

    /// Split large batches into chunks
    ///
    /// **Default:** `true`
    ///
    /// With chunking off a batch is rendered as one statement and may fail
    /// with "too many SQL variables".
    pub enable_chunking: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            enable_chunking: true,
        }
    }
}

/// Decision applied when every rule of a policy returns `Skip`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyFallback {
    /// Allow the operation (ent's behavior)
    #[default]
    Allow,
    /// Deny the operation
    Deny,
}

/// Complete configuration for a [`Client`].
///
/// ```rust
/// use entgraph::{ClientConfig, PolicyFallback};
///
/// let cfg = ClientConfig::default().with_policy_fallback(PolicyFallback::Deny);
/// assert_eq!(cfg.policy_fallback, PolicyFallback::Deny);
/// assert_eq!(cfg.batch.max_batch_size, 1000);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Connection options
    ///
    /// **Default:** [`SqliteConfig::default()`]
    pub sqlite: SqliteConfig,

    /// Bulk create limits
    ///
    /// **Default:** [`BatchConfig::default()`]
    pub batch: BatchConfig,

    /// Exhausted-policy decision
    ///
    /// **Default:** [`PolicyFallback::Allow`]
    pub policy_fallback: PolicyFallback,
}

impl ClientConfig {
    pub fn with_policy_fallback(mut self, fallback: PolicyFallback) -> Self {
        self.policy_fallback = fallback;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }
}

/// Open a client on a database file with the specified configuration.
///
/// The schema is owned by the caller; no tables are created.
///
/// ```rust
/// use entgraph::{ClientConfig, open_client};
///
/// let dir = tempfile::tempdir().unwrap();
/// let client = open_client(dir.path().join("app.db"), &ClientConfig::default()).unwrap();
/// assert!(!client.driver().in_transaction());
/// ```
pub fn open_client<P: AsRef<Path>>(path: P, cfg: &ClientConfig) -> Result<Client, EntGraphError> {
    Client::open(path, cfg)
}

/// Chunk `items` by the batch limits and run `operation` on each chunk in order.
pub(crate) fn execute_batch<T, F, R>(
    items: &[T],
    max_per_chunk: usize,
    config: &BatchConfig,
    mut operation: F,
) -> Result<Vec<R>, EntGraphError>
where
    F: FnMut(usize, &[T]) -> Result<Vec<R>, EntGraphError>,
{
    let size = config.max_batch_size.min(max_per_chunk).max(1);
    if !config.enable_chunking || items.len() <= size {
        return operation(0, items);
    }

    let mut all_results = Vec::with_capacity(items.len());
    for (i, chunk) in items.chunks(size).enumerate() {
        all_results.extend(operation(i * size, chunk)?);
    }
    Ok(all_results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_client_config_default() {
        let cfg = ClientConfig::default();
        assert!(cfg.sqlite.foreign_keys);
        assert!(cfg.sqlite.cache_size.is_none());
        assert_eq!(cfg.batch, BatchConfig::default());
        assert_eq!(cfg.policy_fallback, PolicyFallback::Allow);
    }

    #[test]
    fn test_open_client_creates_file() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let result = open_client(&db_path, &ClientConfig::default());
        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_client_with_pragmas() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test_pragmas.db");
        let mut cfg = ClientConfig::default();
        cfg.sqlite
            .pragma_settings
            .insert("journal_mode".to_string(), "DELETE".to_string());
        assert!(open_client(&db_path, &cfg).is_ok());
    }

    #[test]
    fn test_execute_batch_chunks_in_order() {
        let items: Vec<u32> = (0..10).collect();
        let cfg = BatchConfig {
            max_batch_size: 4,
            enable_chunking: true,
        };
        let mut offsets = Vec::new();
        let out = execute_batch(&items, usize::MAX, &cfg, |offset, chunk| {
            offsets.push(offset);
            Ok(chunk.to_vec())
        })
        .unwrap();
        assert_eq!(out, items);
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[test]
    fn test_execute_batch_respects_parameter_limit() {
        let items: Vec<u32> = (0..6).collect();
        let mut calls = 0;
        execute_batch(&items, 2, &BatchConfig::default(), |_, chunk| {
            calls += 1;
            assert!(chunk.len() <= 2);
            Ok(Vec::<u32>::new())
        })
        .unwrap();
        assert_eq!(calls, 3);
    }
}
