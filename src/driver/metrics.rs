use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverMetricsSnapshot {
    pub prepare_count: u64,
    pub execute_count: u64,
    pub tx_begin_count: u64,
    pub tx_commit_count: u64,
    pub tx_rollback_count: u64,
    pub prepare_cache_hits: u64,
    pub prepare_cache_misses: u64,
}

/// Statement counters kept per driver. Savepoints count as transactions.
#[derive(Default)]
pub struct DriverMetrics {
    prepares: AtomicU64,
    executes: AtomicU64,
    tx_begin: AtomicU64,
    tx_commit: AtomicU64,
    tx_rollback: AtomicU64,
    prepare_cache_hits: AtomicU64,
    prepare_cache_misses: AtomicU64,
}

impl DriverMetrics {
    pub fn snapshot(&self) -> DriverMetricsSnapshot {
        DriverMetricsSnapshot {
            prepare_count: self.prepares.load(Ordering::Relaxed),
            execute_count: self.executes.load(Ordering::Relaxed),
            tx_begin_count: self.tx_begin.load(Ordering::Relaxed),
            tx_commit_count: self.tx_commit.load(Ordering::Relaxed),
            tx_rollback_count: self.tx_rollback.load(Ordering::Relaxed),
            prepare_cache_hits: self.prepare_cache_hits.load(Ordering::Relaxed),
            prepare_cache_misses: self.prepare_cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.prepares,
            &self.executes,
            &self.tx_begin,
            &self.tx_commit,
            &self.tx_rollback,
            &self.prepare_cache_hits,
            &self.prepare_cache_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_execute(&self, sql: &str) {
        self.executes.fetch_add(1, Ordering::Relaxed);
        let Some(keyword) = leading_keyword(sql) else {
            return;
        };
        if keyword.eq_ignore_ascii_case("BEGIN") || keyword.eq_ignore_ascii_case("SAVEPOINT") {
            self.tx_begin.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("COMMIT") || keyword.eq_ignore_ascii_case("RELEASE")
        {
            self.tx_commit.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("ROLLBACK") {
            self.tx_rollback.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_prepare(&self, observation: CacheObservation) {
        self.prepares.fetch_add(1, Ordering::Relaxed);
        match observation {
            CacheObservation::Hit => self.prepare_cache_hits.fetch_add(1, Ordering::Relaxed),
            CacheObservation::Miss => self.prepare_cache_misses.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Remembers which SQL texts were already handed to the statement cache.
#[derive(Default)]
pub struct StatementTracker {
    seen: Mutex<AHashSet<String>>,
}

impl StatementTracker {
    pub fn observe(&self, sql: &str) -> CacheObservation {
        if self.seen.lock().insert(sql.trim().to_string()) {
            CacheObservation::Miss
        } else {
            CacheObservation::Hit
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheObservation {
    Hit,
    Miss,
}

fn leading_keyword(sql: &str) -> Option<&str> {
    let trimmed = sql.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed
        .find(|c: char| c.is_ascii_whitespace() || c == ';')
        .unwrap_or(trimmed.len());
    Some(&trimmed[..end])
}
