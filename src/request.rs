use std::path::Path;
use std::time::Duration;

use crate::compress::ExclusionSet;
use crate::metadata::CannedAcl;
use crate::s3::helpers::join_key;
use crate::source::SourceSpec;

/// Default lifetime of a pre-signed URL (one hour)
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_millis(3_600_000);

/// Immutable configuration of a single upload run
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: SourceSpec,
    pub bucket: String,
    /// Object key for a single file, key prefix for a directory; empty is the bucket root
    pub destination: String,
    pub recursive: bool,
    pub compress: bool,
    pub exclusions: ExclusionSet,
    pub cache_control: Option<String>,
    pub acl: CannedAcl,
    pub dry_run: bool,
    pub presign: bool,
    pub presign_expiry: Duration,
}

impl UploadRequest {
    /// A request with every option at its default, uploading nothing yet
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            source: SourceSpec::default(),
            bucket: bucket.into(),
            destination: String::new(),
            recursive: false,
            compress: false,
            exclusions: ExclusionSet::default(),
            cache_control: None,
            acl: CannedAcl::default(),
            dry_run: false,
            presign: false,
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
        }
    }

    /// Key for a single-file upload
    ///
    /// An empty destination, or one ending in `/`, is a prefix and the file
    /// name is appended; anything else is used as the key itself.
    pub fn single_file_key(&self, relative: &Path) -> String {
        if self.destination.is_empty() || self.destination.ends_with('/') {
            join_key(&self.destination, relative)
        } else {
            self.destination.clone()
        }
    }

    /// Key prefix for a directory upload
    pub fn tree_prefix(&self) -> String {
        join_key(&self.destination, Path::new(""))
    }

    pub fn source_display(&self) -> String {
        self.source
            .file
            .as_ref()
            .or(self.source.dir.as_ref())
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}
