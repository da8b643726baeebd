//! The session orchestrator: one sync driver per worker, run concurrently.
//!
//! Each worker covers its own range of the source with its own agent. A
//! failing worker does not stop the others; the session reports every
//! worker's outcome and succeeds only if all of them did.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use blocksync_core::CoreError;
use blocksync_sync::{AgentConfig, Connector, MemoryConnector, SyncConfig, SyncDriver, SyncReport};

use crate::error::{BlocksyncError, Result};

/// Configuration for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Per-worker sync settings.
    pub sync: SyncConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            sync: SyncConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Check the settings before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CoreError::NoWorkers.into());
        }
        if self.sync.block_size == 0 {
            return Err(CoreError::ZeroBlockSize.into());
        }
        if usize::try_from(self.sync.block_size).is_err() {
            return Err(BlocksyncError::InvalidConfig(format!(
                "block size {} does not fit in memory",
                self.sync.block_size
            )));
        }
        Ok(())
    }
}

/// How one worker ended.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    /// Worker index.
    pub worker: usize,
    /// Counters, if the worker succeeded.
    pub report: Option<SyncReport>,
    /// Error message, if it failed.
    pub error: Option<String>,
    /// Error category, if it failed.
    pub error_kind: Option<String>,
}

impl WorkerOutcome {
    fn succeeded(report: SyncReport) -> Self {
        Self {
            worker: report.worker,
            report: Some(report),
            error: None,
            error_kind: None,
        }
    }

    fn failed(worker: usize, kind: &str, error: String) -> Self {
        Self {
            worker,
            report: None,
            error: Some(error),
            error_kind: Some(kind.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.report.is_some()
    }

    /// `(same, diff)` for this worker; zero if it failed.
    pub fn counts(&self) -> (u64, u64) {
        self.report
            .as_ref()
            .map(|r| (r.same_blocks, r.diff_blocks))
            .unwrap_or((0, 0))
    }
}

/// Result of a whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// One outcome per worker, in worker order.
    pub workers: Vec<WorkerOutcome>,
    /// Wall time of the session.
    pub elapsed: Duration,
}

impl SessionReport {
    /// Whether every worker succeeded.
    pub fn is_success(&self) -> bool {
        self.workers.iter().all(WorkerOutcome::is_success)
    }

    /// Workers that failed.
    pub fn failures(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.workers.iter().filter(|w| !w.is_success())
    }

    /// `(same, diff)` per worker.
    pub fn counts(&self) -> Vec<(u64, u64)> {
        self.workers.iter().map(WorkerOutcome::counts).collect()
    }

    pub fn same_blocks(&self) -> u64 {
        self.counts().iter().map(|(same, _)| same).sum()
    }

    pub fn diff_blocks(&self) -> u64 {
        self.counts().iter().map(|(_, diff)| diff).sum()
    }

    /// Source bytes compared by the successful workers.
    pub fn bytes_processed(&self) -> u64 {
        self.workers
            .iter()
            .filter_map(|w| w.report.as_ref())
            .map(|r| r.bytes_processed)
            .sum()
    }
}

/// Synchronizes a source extent into a destination with parallel workers.
pub struct Session<C: Connector + 'static> {
    source: PathBuf,
    dest: String,
    connector: Arc<C>,
    config: SessionConfig,
}

impl<C: Connector + 'static> Session<C> {
    /// Create a session.
    ///
    /// `dest` is the destination path as the agents will report it.
    pub fn new(
        source: impl Into<PathBuf>,
        dest: impl Into<String>,
        connector: C,
        config: SessionConfig,
    ) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            connector: Arc::new(connector),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run every worker to completion.
    ///
    /// Returns an error only if the session cannot start. Worker failures
    /// are reported in the [`SessionReport`].
    pub async fn run(&self) -> Result<SessionReport> {
        self.config.validate()?;
        if self.dest.contains(['\n', '\r']) {
            return Err(BlocksyncError::InvalidConfig(
                "destination path contains a line break".into(),
            ));
        }

        let started = Instant::now();
        let workers = self.config.workers;
        tracing::info!(
            workers,
            "syncing {} into {}",
            self.source.display(),
            self.dest
        );

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let driver = SyncDriver::new(
                    worker,
                    workers,
                    self.source.clone(),
                    self.dest.clone(),
                    Arc::clone(&self.connector),
                    self.config.sync.clone(),
                );
                tokio::spawn(async move { driver.run().await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(workers);
        for (worker, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(Ok(report)) => {
                    tracing::info!(worker, "worker #{} exited with success", worker);
                    WorkerOutcome::succeeded(report)
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        worker,
                        "worker #{} exited with {} error: {}",
                        worker,
                        e.kind(),
                        e
                    );
                    WorkerOutcome::failed(worker, e.kind(), e.to_string())
                }
                Err(e) => {
                    tracing::error!(worker, "worker #{} exited abnormally: {}", worker, e);
                    let message = format!("worker task failed: {e}");
                    WorkerOutcome::failed(worker, "internal", message)
                }
            };
            outcomes.push(outcome);
        }

        let report = SessionReport {
            workers: outcomes,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "same: {}, diff: {}, {} of {} workers succeeded",
            report.same_blocks(),
            report.diff_blocks(),
            workers - report.failures().count(),
            workers
        );
        Ok(report)
    }
}

impl Session<MemoryConnector> {
    /// A session whose agents run in this process against a local
    /// destination.
    pub fn local(source: impl Into<PathBuf>, dest: &Path, config: SessionConfig) -> Self {
        let agent = AgentConfig::new(dest, config.sync.block_size).with_hash(config.sync.hash);
        Session::new(
            source,
            dest.display().to_string(),
            MemoryConnector::new(agent),
            config,
        )
    }
}
