use std::path::PathBuf;
use thiserror::Error;

/// Errors that can end an upload run
#[derive(Error, Debug)]
pub enum UploadError {
    /// Conflicting, missing or malformed parameters
    #[error("{0}")]
    Config(String),

    /// Source path does not exist on the local filesystem
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source is neither a regular file nor a directory, or not the kind requested
    #[error("source is not a {expected}: {}", path.display())]
    InvalidSourceType { path: PathBuf, expected: &'static str },

    /// Destination bucket does not exist
    #[error("bucket doesn't exist: {bucket}")]
    BucketNotFound { bucket: String },

    /// Reading or writing a file during the gzip pre-pass failed
    #[error("failed to compress {}: {source}", path.display())]
    CompressionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transfer was interrupted before it completed
    #[error("transfer interrupted after {bytes_done} of {bytes_total} bytes")]
    TransferInterrupted { bytes_done: u64, bytes_total: u64 },

    /// The transfer engine reported a service or permission error
    #[error("{message}")]
    TransferService { message: String },

    /// Generating a pre-signed URL failed
    #[error("could not generate pre-signed URL for {key}: {message}")]
    Presign { key: String, message: String },
}

impl UploadError {
    pub fn config(error: impl std::fmt::Display) -> Self {
        Self::Config(error.to_string())
    }

    /// Wrap an engine error, keeping its whole cause chain on one line
    pub fn transfer_service(error: anyhow::Error) -> Self {
        Self::TransferService {
            message: format!("{:#}", error),
        }
    }

    pub fn compression_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CompressionIo {
            path: path.into(),
            source,
        }
    }

    /// Short stable label used in the diagnostic line
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::SourceNotFound { .. } => "source-not-found",
            Self::InvalidSourceType { .. } => "invalid-source-type",
            Self::BucketNotFound { .. } => "bucket-not-found",
            Self::CompressionIo { .. } => "compression-io",
            Self::TransferInterrupted { .. } => "transfer-interrupted",
            Self::TransferService { .. } => "transfer-service",
            Self::Presign { .. } => "presign",
        }
    }

    /// Process exit status for this failure
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::TransferInterrupted { .. } => 130,
            _ => 1,
        }
    }

    /// The single line printed to stderr when a run fails
    pub fn diagnostic(&self) -> String {
        format!("error[{}]: {}", self.kind(), self)
    }
}

/// Result type for upload runs
pub type Result<T> = std::result::Result<T, UploadError>;
