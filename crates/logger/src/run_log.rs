use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

/// Audit trail for a single check run.
///
/// Every line is kept in memory so the full reasoning of a run can be shown
/// alongside its verdict, and is mirrored to tracing at DEBUG level tagged
/// with the run id. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct RunLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: String,
    lines: Mutex<Vec<String>>,
}

impl RunLog {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                lines: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Id of the run this log belongs to
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Append a line
    pub fn record(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(run_id = %self.inner.id, "{line}");

        let stamped = format!("{} {}", Utc::now().format("%Y/%m/%d %H:%M:%S"), line);
        self.buffer().push(stamped);
    }

    /// Snapshot of all recorded lines
    pub fn lines(&self) -> Vec<String> {
        self.buffer().clone()
    }

    /// All recorded lines joined by newlines
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
