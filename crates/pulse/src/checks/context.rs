use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use logger::RunLog;
use rand::RngCore;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Per-run context handed to every check.
///
/// Carries the run's audit log, an optional deadline and a shutdown signal.
/// Work raced through [`RunContext::guard`] stops as soon as either fires.
#[derive(Debug, Clone)]
pub struct RunContext {
    log: RunLog,
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl RunContext {
    /// Context with a freshly generated run id and no limits
    pub fn new() -> Self {
        Self::with_log(RunLog::new(generate_run_id()))
    }

    pub fn with_log(log: RunLog) -> Self {
        Self {
            log,
            deadline: None,
            shutdown: None,
        }
    }

    /// Abort the run once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Abort the run when the watched value becomes `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn id(&self) -> &str {
        self.log.id()
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Resolves once shutdown is requested. Never resolves without a signal,
    /// or after every sender is gone.
    pub async fn cancelled(&self) {
        let Some(mut rx) = self.shutdown.clone() else {
            return std::future::pending().await;
        };

        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Drive `fut` to completion unless the run is cancelled or times out first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_elapsed| Error::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            out = bounded => out,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique id for a check run: UTC timestamp followed by 8 random bytes in hex
pub fn generate_run_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);

    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        hex::encode(bytes),
    )
}
