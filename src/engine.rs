//! # Partitioned Copy Engine
//!
//! Splits a work set across a fixed pool of workers and runs one Tokio task
//! per bucket:
//!
//! ```text
//! work set ──partition(i % pool)──► bucket 0 ──► worker 0 (source[0] → dest[0])
//!                                   bucket 1 ──► worker 1 (source[1] → dest[1])
//!                                   ...
//!                                   └──────── join ──► CopyReport
//! ```
//!
//! Each worker owns its store handles and walks its bucket in order. A failed
//! read or write is recorded for that key and the worker moves on; nothing is
//! retried and nothing aborts the other workers.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use crate::errors::{Error, Result};
use crate::namespace::SecretPayload;
use crate::planner::WorkItem;
use crate::store::{Dialect, SecretStore};

/// Result of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum KeyStatus {
    Copied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyOutcome {
    pub path: String,
    pub worker: usize,
    #[serde(flatten)]
    pub status: KeyStatus,
}

/// Per-key outcomes of one engine run, sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub outcomes: Vec<KeyOutcome>,
}

impl CopyReport {
    pub fn copied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == KeyStatus::Copied).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.copied()
    }

    pub fn failures(&self) -> impl Iterator<Item = &KeyOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.status, KeyStatus::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Distribute `items` over `pool_size` buckets; item `i` lands in bucket `i % pool_size`.
pub fn partition<T>(items: Vec<T>, pool_size: usize) -> Result<Vec<Vec<T>>> {
    if pool_size == 0 {
        return Err(Error::config("Pool size must be > 0"));
    }

    let mut buckets: Vec<Vec<T>> = (0..pool_size).map(|_| Vec::new()).collect();
    for (index, item) in items.into_iter().enumerate() {
        buckets[index % pool_size].push(item);
    }
    Ok(buckets)
}

/// Spawn one task per non-empty bucket and wait for all of them.
///
/// A task that panics loses its outcomes; every key of its bucket is then
/// reported as failed.
async fn run_pool<F, Fut>(role: &'static str, buckets: Vec<Vec<WorkItem>>, mut worker: F) -> CopyReport
where
    F: FnMut(usize, Vec<WorkItem>) -> Fut,
    Fut: Future<Output = Vec<KeyOutcome>> + Send + 'static,
{
    let mut tasks = Vec::with_capacity(buckets.len());
    for (worker_id, bucket) in buckets.into_iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        let paths: Vec<String> = bucket.iter().map(|item| item.path.clone()).collect();
        let span = crate::worker_span!(role, worker_id, keys = paths.len());
        let handle = tokio::spawn(worker(worker_id, bucket).instrument(span));
        tasks.push(async move { (worker_id, paths, handle.await) });
    }

    info!(role, workers = tasks.len(), "Workers spawned");

    let mut report = CopyReport::default();
    for (worker_id, paths, joined) in join_all(tasks).await {
        match joined {
            Ok(outcomes) => report.outcomes.extend(outcomes),
            Err(e) => {
                error!(role, worker_id, error = %e, "Worker task failed");
                let reason = format!("worker {} failed: {}", worker_id, e);
                report.outcomes.extend(paths.into_iter().map(|path| KeyOutcome {
                    path,
                    worker: worker_id,
                    status: KeyStatus::Failed(reason.clone()),
                }));
            }
        }
    }

    report.outcomes.sort_by(|a, b| a.path.cmp(&b.path));
    report
}

fn check_pool(sources: Option<&[Arc<dyn SecretStore>]>, pool_size: usize) -> Result<()> {
    if pool_size == 0 {
        return Err(Error::config("Pool size must be > 0"));
    }
    match sources {
        Some(sources) if sources.len() != pool_size => Err(Error::internal(format!(
            "{} source handles for a pool of {}",
            sources.len(),
            pool_size
        ))),
        _ => Ok(()),
    }
}

/// The pre-fetched payload, or a read from the worker's source handle.
async fn fetch(item: WorkItem, source: Option<&dyn SecretStore>) -> Result<(String, SecretPayload)> {
    match (item.payload, source) {
        (Some(payload), _) => Ok((item.path, payload)),
        (None, Some(source)) => {
            let payload = source.read(&item.path).await?;
            Ok((item.path, payload))
        }
        (None, None) => Err(Error::internal(format!("no payload and no source for '{}'", item.path))),
    }
}

fn outcome(worker: usize, path: String, result: Result<()>) -> KeyOutcome {
    let status = match result {
        Ok(()) => {
            debug!(%path, "Copied");
            KeyStatus::Copied
        }
        Err(e) if e.is_fatal() => {
            error!(%path, error = %e, "Key failed outside the store; continuing with the next one");
            KeyStatus::Failed(e.to_string())
        }
        Err(e) => {
            warn!(%path, error = %e, "Key failed; continuing with the next one");
            KeyStatus::Failed(e.to_string())
        }
    };
    KeyOutcome { path, worker, status }
}

/// Copies work items from source handles to destination handles.
#[derive(Debug, Clone, Copy)]
pub struct CopyEngine {
    dialect: Dialect,
}

impl CopyEngine {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Run the copy. The pool size is the number of destination handles;
    /// `sources`, when given, must have the same length. Items without a
    /// payload need a source handle.
    pub async fn execute(
        &self,
        work: Vec<WorkItem>,
        sources: Option<&[Arc<dyn SecretStore>]>,
        dests: &[Arc<dyn SecretStore>],
    ) -> Result<CopyReport> {
        check_pool(sources, dests.len())?;
        let buckets = partition(work, dests.len())?;
        let dialect = self.dialect;

        let report = run_pool("copy", buckets, |worker_id, bucket| {
            let source = sources.map(|sources| Arc::clone(&sources[worker_id]));
            let dest = Arc::clone(&dests[worker_id]);
            async move {
                let mut outcomes = Vec::with_capacity(bucket.len());
                for item in bucket {
                    let path = item.path.clone();
                    let result = match fetch(item, source.as_deref()).await {
                        Ok((path, payload)) => dest.write(&path, &dialect.write_body(&payload)).await,
                        Err(e) => Err(e),
                    };
                    outcomes.push(outcome(worker_id, path, result));
                }
                outcomes
            }
        })
        .await;

        info!(copied = report.copied(), failed = report.failed(), "Copy finished");
        Ok(report)
    }
}

/// Reads work items and streams them to a sink, for the list action.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpEngine;

impl DumpEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fetch every item through `sources` (one handle per worker) and send
    /// `(path, payload)` records to `sink`. The receiving side decides how
    /// records are persisted.
    pub async fn execute(
        &self,
        work: Vec<WorkItem>,
        sources: &[Arc<dyn SecretStore>],
        sink: mpsc::Sender<(String, SecretPayload)>,
    ) -> Result<CopyReport> {
        check_pool(Some(sources), sources.len())?;
        let buckets = partition(work, sources.len())?;

        let report = run_pool("dump", buckets, |worker_id, bucket| {
            let source = Arc::clone(&sources[worker_id]);
            let sink = sink.clone();
            async move {
                let mut outcomes = Vec::with_capacity(bucket.len());
                for item in bucket {
                    let path = item.path.clone();
                    let result = match fetch(item, Some(source.as_ref())).await {
                        Ok(record) => sink
                            .send(record)
                            .await
                            .map_err(|_| Error::internal("snapshot writer closed")),
                        Err(e) => Err(e),
                    };
                    outcomes.push(outcome(worker_id, path, result));
                }
                outcomes
            }
        })
        .await;

        info!(dumped = report.copied(), failed = report.failed(), "Dump finished");
        Ok(report)
    }
}
