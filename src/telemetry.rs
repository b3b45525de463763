//! Attempt telemetry — bounded in-memory ring plus a durable JSONL log.
//!
//! Every attempt outcome (including the exhaustion marker) is appended
//! exactly once. The ring keeps the most recent 200 records, newest
//! first; counters are cumulative for the process lifetime. Durable
//! persistence is best-effort: a write failure is logged and swallowed,
//! never surfaced to the request path.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Ring buffer capacity.
const RING_CAPACITY: usize = 200;

/// One acquisition attempt, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub query: String,
    pub attempt: u32,
    /// Proxy origin used, if any. A weak reference by origin string —
    /// telemetry never owns pool state.
    pub proxy: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: String,
}

impl AttemptRecord {
    pub fn new(
        query: &str,
        attempt: u32,
        proxy: Option<String>,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            query: query.to_string(),
            attempt,
            proxy,
            success,
            error,
            duration_ms,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Cumulative counters, never decremented or reset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Point-in-time view returned by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub stats: TelemetryStats,
    pub recent: Vec<AttemptRecord>,
}

struct Inner {
    ring: VecDeque<AttemptRecord>,
    stats: TelemetryStats,
    log: Option<File>,
}

/// Process-wide telemetry store. Initialized empty at startup; there is
/// deliberately no reset API.
pub struct TelemetryStore {
    inner: Mutex<Inner>,
    log_path: PathBuf,
}

impl TelemetryStore {
    /// Open the store, creating or appending to the JSONL log at `path`.
    ///
    /// Failure to open the log does not fail startup — it downgrades
    /// persistence to in-memory only, with a warning.
    pub fn open(path: &Path) -> Self {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                warn!("telemetry log unavailable at {}: {e}", path.display());
                e
            })
            .ok();

        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(RING_CAPACITY),
                stats: TelemetryStats::default(),
                log,
            }),
            log_path: path.to_path_buf(),
        }
    }

    /// In-memory-only store for tests.
    pub fn ephemeral() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: VecDeque::with_capacity(RING_CAPACITY),
                stats: TelemetryStats::default(),
                log: None,
            }),
            log_path: PathBuf::new(),
        }
    }

    /// Append a record: ring (newest first, bounded), counters, and the
    /// durable log.
    pub fn append(&self, record: AttemptRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        inner.stats.total += 1;
        if record.success {
            inner.stats.successes += 1;
        } else {
            inner.stats.failures += 1;
        }

        if let Some(file) = inner.log.as_mut() {
            match serde_json::to_string(&record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("telemetry log write failed ({}): {e}", self.log_path.display());
                    }
                }
                Err(e) => warn!("telemetry record serialization failed: {e}"),
            }
        }

        inner.ring.push_front(record);
        while inner.ring.len() > RING_CAPACITY {
            inner.ring.pop_back();
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        TelemetrySnapshot {
            stats: inner.stats,
            recent: inner.ring.iter().cloned().collect(),
        }
    }
}
