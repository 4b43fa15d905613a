use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::task::JoinHandle;

use crate::metadata::ObjectMetadata;

/// Per-object metadata callback, called once for each file of a tree upload
pub type MetadataFn = Arc<dyn Fn(&Path) -> ObjectMetadata + Send + Sync>;

/// The blob-storage side of an upload
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Start uploading one file to `bucket/key`
    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
    ) -> Result<TransferHandle>;

    /// Start uploading the files under `root` to keys below `prefix`
    ///
    /// `metadata` is called for every discovered file before this returns.
    fn upload_tree(
        &self,
        bucket: &str,
        prefix: &str,
        root: &Path,
        recursive: bool,
        metadata: MetadataFn,
    ) -> Result<TransferHandle>;

    async fn presigned_get_url(&self, bucket: &str, key: &str, expires_at: SystemTime) -> Result<String>;
}

/// One file scheduled by a tree upload
#[derive(Debug, Clone)]
pub struct PlannedObject {
    pub path: PathBuf,
    pub key: String,
    pub size: u64,
    pub metadata: ObjectMetadata,
}

/// Snapshot of a transfer's byte counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub bytes_total: u64,
    pub bytes_done: u64,
}

/// Shared byte counters, updated by the upload task
#[derive(Debug, Default)]
pub struct ProgressCounter {
    bytes_total: AtomicU64,
    bytes_done: AtomicU64,
}

impl ProgressCounter {
    pub fn new(bytes_total: u64) -> Arc<Self> {
        Arc::new(Self {
            bytes_total: AtomicU64::new(bytes_total),
            bytes_done: AtomicU64::new(0),
        })
    }

    pub fn add(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
        }
    }
}

/// Objects written by a completed transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub keys: Vec<String>,
    pub bytes: u64,
}

/// How a transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Completed(TransferSummary),
    Interrupted,
    Failed(String),
}

/// A running transfer: one per submission, however many objects it covers
#[derive(Debug)]
pub struct TransferHandle {
    progress: Arc<ProgressCounter>,
    task: JoinHandle<Result<TransferSummary>>,
}

impl TransferHandle {
    pub fn new(progress: Arc<ProgressCounter>, task: JoinHandle<Result<TransferSummary>>) -> Self {
        Self { progress, task }
    }

    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    /// Stop the transfer; a pending `wait` then reports `Interrupted`
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Block until the transfer reaches a terminal state
    ///
    /// Cancel-safe: dropping the future leaves the task running, so callers
    /// may race it against a shutdown signal and `abort` afterwards.
    pub async fn wait(&mut self) -> TransferState {
        match (&mut self.task).await {
            Ok(Ok(summary)) => TransferState::Completed(summary),
            Ok(Err(e)) => TransferState::Failed(format!("{:#}", e)),
            Err(e) if e.is_cancelled() => TransferState::Interrupted,
            Err(e) => TransferState::Failed(format!("transfer task panicked: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handle_reports_completion_and_progress() {
        let progress = ProgressCounter::new(10);
        let counter = Arc::clone(&progress);
        let task = tokio::spawn(async move {
            counter.add(10);
            Ok(TransferSummary {
                keys: vec!["a.txt".to_string()],
                bytes: 10,
            })
        });

        let mut handle = TransferHandle::new(progress, task);
        let state = handle.wait().await;

        assert_eq!(
            state,
            TransferState::Completed(TransferSummary {
                keys: vec!["a.txt".to_string()],
                bytes: 10
            })
        );
        assert_eq!(
            handle.progress(),
            Progress {
                bytes_total: 10,
                bytes_done: 10
            }
        );
    }

    #[tokio::test]
    async fn test_handle_reports_failure() {
        let task = tokio::spawn(async { Err(anyhow::anyhow!("AccessDenied")) });
        let mut handle = TransferHandle::new(ProgressCounter::new(0), task);

        assert_eq!(handle.wait().await, TransferState::Failed("AccessDenied".to_string()));
    }

    #[tokio::test]
    async fn test_aborted_handle_is_interrupted() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(TransferSummary::default())
        });
        let mut handle = TransferHandle::new(ProgressCounter::new(0), task);
        handle.abort();

        assert_eq!(handle.wait().await, TransferState::Interrupted);
    }
}
