//! Runs one upload from validation to the optional pre-signed URL.
//!
//! Steps, in order: resolve the source, check the bucket, stop early on a
//! dry run, gzip into a temporary mirror when asked, submit to the transfer
//! engine, wait for it (or for an interrupt), then presign a single object.

use indicatif::ProgressBar;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compress::compress;
use crate::metadata::decorate;
use crate::request::UploadRequest;
use crate::s3::engine::{MetadataFn, TransferEngine, TransferHandle, TransferState};
use crate::s3::error::{Result, UploadError};
use crate::source::{FileNode, resolve_source};

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Dry run: the source and bucket were checked, nothing was sent
    WouldUpload {
        source: String,
        bucket: String,
        destination: String,
    },
    Completed {
        objects: usize,
        bytes: u64,
        compression_savings: Option<i64>,
        presigned_url: Option<String>,
    },
    /// Interrupted before or during the transfer; the caller decides whether to retry
    Incomplete { bytes_done: u64, bytes_total: u64 },
}

pub struct Uploader<'a, E: TransferEngine> {
    engine: &'a E,
    cancel: CancellationToken,
    progress_bar: ProgressBar,
}

impl<'a, E: TransferEngine> Uploader<'a, E> {
    pub fn new(engine: &'a E, cancel: CancellationToken) -> Self {
        Self {
            engine,
            cancel,
            progress_bar: ProgressBar::hidden(),
        }
    }

    /// Draw transfer progress on this bar while waiting
    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> Self {
        self.progress_bar = progress_bar;
        self
    }

    pub async fn run(&self, request: &UploadRequest) -> Result<RunOutcome> {
        let tree = resolve_source(&request.source)?;
        info!(
            "Source {} ({} files, {} bytes)",
            tree.absolute().display(),
            tree.file_count(),
            tree.total_size()
        );

        let exists = self
            .engine
            .bucket_exists(&request.bucket)
            .await
            .map_err(UploadError::transfer_service)?;
        if !exists {
            return Err(UploadError::BucketNotFound {
                bucket: request.bucket.clone(),
            });
        }

        let destination = if tree.is_file() {
            request.single_file_key(tree.relative())
        } else {
            request.tree_prefix()
        };

        if request.dry_run {
            info!(
                "File {} would have been uploaded to s3://{}/{} (dry run)",
                request.source_display(),
                request.bucket,
                destination
            );
            return Ok(RunOutcome::WouldUpload {
                source: request.source_display(),
                bucket: request.bucket.clone(),
                destination,
            });
        }

        let source_root = tree.absolute().to_path_buf();
        let mut working = tree;
        let mut savings = None;

        if self.cancel.is_cancelled() {
            return Ok(interrupted_before_submit(&working));
        }

        // Held until the run returns; dropping it removes the mirror on every path
        let _mirror: Option<TempDir> = if request.compress {
            debug!("Compressing with {} exclusion patterns", request.exclusions.len());
            let dir = tempfile::Builder::new()
                .prefix("s3upload-")
                .tempdir()
                .map_err(|e| UploadError::compression_io(std::env::temp_dir(), e))?;
            let (mirrored, saved) = compress_in_background(&working, request, dir.path()).await?;
            info!("Compression saved {} bytes", saved);
            working = mirrored;
            savings = Some(saved);
            Some(dir)
        } else {
            None
        };

        if self.cancel.is_cancelled() {
            return Ok(interrupted_before_submit(&working));
        }

        let mut handle = self.submit(&working, &source_root, &destination, request)?;

        let progress = handle.progress();
        debug!("Transferring {} bytes...", progress.bytes_total);

        let state = self.wait(&mut handle).await;
        let progress = handle.progress();

        let summary = match state {
            TransferState::Completed(summary) => summary,
            TransferState::Interrupted => {
                warn!(
                    "Transfer interrupted after {} of {} bytes",
                    progress.bytes_done, progress.bytes_total
                );
                return Ok(RunOutcome::Incomplete {
                    bytes_done: progress.bytes_done,
                    bytes_total: progress.bytes_total,
                });
            }
            TransferState::Failed(message) => return Err(UploadError::TransferService { message }),
        };
        let completed_at = SystemTime::now();

        info!("Transferred {} bytes.", progress.bytes_done);
        info!(
            "{} uploaded to s3://{}/{}",
            request.source_display(),
            request.bucket,
            destination
        );

        let presigned_url = match summary.keys.as_slice() {
            [key] if request.presign => {
                self.presign(&request.bucket, key, completed_at + request.presign_expiry)
                    .await
            }
            _ => None,
        };

        Ok(RunOutcome::Completed {
            objects: summary.keys.len(),
            bytes: summary.bytes,
            compression_savings: savings,
            presigned_url,
        })
    }

    /// Hand the working tree to the engine
    ///
    /// Metadata is always decorated from the original source path, so
    /// exclusion patterns see the same paths the compressor tested.
    fn submit(
        &self,
        working: &FileNode,
        source_root: &Path,
        destination: &str,
        request: &UploadRequest,
    ) -> Result<TransferHandle> {
        let handle = match working {
            FileNode::File { absolute, .. } => {
                let metadata = decorate(source_root, request);
                self.engine
                    .upload_object(&request.bucket, destination, absolute, metadata)
            }
            FileNode::Directory { absolute, .. } => {
                let working_root = absolute.clone();
                let source_root = source_root.to_path_buf();
                let request_for_callback = request.clone();
                let metadata: MetadataFn = Arc::new(move |path: &Path| {
                    let original = original_path(path, &working_root, &source_root);
                    decorate(&original, &request_for_callback)
                });
                self.engine.upload_tree(
                    &request.bucket,
                    destination,
                    absolute,
                    request.recursive,
                    metadata,
                )
            }
        };

        handle.map_err(UploadError::transfer_service)
    }

    /// Wait for the transfer, aborting it if the run is cancelled first
    async fn wait(&self, handle: &mut TransferHandle) -> TransferState {
        self.progress_bar.set_length(handle.progress().bytes_total);
        let mut ticker = tokio::time::interval(Duration::from_millis(200));

        let state = loop {
            tokio::select! {
                state = handle.wait() => break state,
                _ = self.cancel.cancelled() => {
                    handle.abort();
                    // A transfer that finished first still reports its real state
                    break handle.wait().await;
                }
                _ = ticker.tick() => {
                    self.progress_bar.set_position(handle.progress().bytes_done);
                }
            }
        };

        self.progress_bar.finish_and_clear();
        state
    }

    /// Presign failures are logged and never fail the run
    async fn presign(&self, bucket: &str, key: &str, expires_at: SystemTime) -> Option<String> {
        match self.engine.presigned_get_url(bucket, key, expires_at).await {
            Ok(url) => {
                info!(
                    "Pre-signed URL to download file (expires in {}s): {}",
                    expires_at
                        .duration_since(SystemTime::now())
                        .unwrap_or_default()
                        .as_secs(),
                    url
                );
                Some(url)
            }
            Err(e) => {
                let err = UploadError::Presign {
                    key: key.to_string(),
                    message: format!("{:#}", e),
                };
                warn!("{}", err);
                None
            }
        }
    }
}

/// Outcome for a run cancelled before anything was handed to the engine
fn interrupted_before_submit(working: &FileNode) -> RunOutcome {
    warn!("Interrupted before upload, nothing was sent");
    RunOutcome::Incomplete {
        bytes_done: 0,
        bytes_total: working.total_size(),
    }
}

async fn compress_in_background(
    tree: &FileNode,
    request: &UploadRequest,
    dest_root: &Path,
) -> Result<(FileNode, i64)> {
    let source = tree.absolute().to_path_buf();
    let tree = tree.clone();
    let exclusions = request.exclusions.clone();
    let dest_root = dest_root.to_path_buf();

    tokio::task::spawn_blocking(move || compress(&tree, &exclusions, &dest_root))
        .await
        .map_err(|e| UploadError::compression_io(source, std::io::Error::other(e)))?
}

/// Map a file under the compressed mirror back to where it came from
fn original_path(path: &Path, working_root: &Path, source_root: &Path) -> PathBuf {
    match path.strip_prefix(working_root) {
        Ok(relative) => source_root.join(relative),
        Err(_) => path.to_path_buf(),
    }
}
