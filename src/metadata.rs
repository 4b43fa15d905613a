use clap::ValueEnum;
use std::path::Path;

use crate::request::UploadRequest;
use crate::s3::helpers::detect_content_type;

/// Canned ACL applied to every uploaded object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    AwsExecRead,
    BucketOwnerRead,
    #[default]
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// The `x-amz-acl` header value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::AwsExecRead => "aws-exec-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

/// Headers set on one uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
    pub content_type: String,
    pub acl: CannedAcl,
}

/// Compute the metadata for `file`
///
/// `file` is the original source path: exclusion patterns are tested against
/// it, not against the compressed mirror. Content-type follows the file name,
/// so a gzip-encoded `index.html` is still served as `text/html`.
pub fn decorate(file: &Path, request: &UploadRequest) -> ObjectMetadata {
    let content_encoding = (request.compress && !request.exclusions.is_excluded(file))
        .then(|| "gzip".to_string());

    let cache_control = request
        .cache_control
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);

    ObjectMetadata {
        content_encoding,
        cache_control,
        content_type: detect_content_type(file),
        acl: request.acl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::ExclusionSet;
    use std::path::PathBuf;

    fn request(compress: bool, exclusions: &[&str]) -> UploadRequest {
        UploadRequest {
            compress,
            exclusions: ExclusionSet::new(exclusions).unwrap(),
            ..UploadRequest::for_bucket("test-bucket")
        }
    }

    #[test]
    fn test_gzip_only_when_compressing_and_not_excluded() {
        let req = request(true, &[r"^.*\.log$"]);

        let text = decorate(&PathBuf::from("/site/a.txt"), &req);
        assert_eq!(text.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(text.content_type, "text/plain");

        let log = decorate(&PathBuf::from("/site/b.log"), &req);
        assert_eq!(log.content_encoding, None);

        let plain = decorate(&PathBuf::from("/site/a.txt"), &request(false, &[]));
        assert_eq!(plain.content_encoding, None);
    }

    #[test]
    fn test_cache_control_skips_empty() {
        let mut req = request(false, &[]);
        req.cache_control = Some("max-age=300".to_string());
        assert_eq!(
            decorate(Path::new("a.css"), &req).cache_control.as_deref(),
            Some("max-age=300")
        );

        req.cache_control = Some("  ".to_string());
        assert_eq!(decorate(Path::new("a.css"), &req).cache_control, None);

        req.cache_control = None;
        assert_eq!(decorate(Path::new("a.css"), &req).cache_control, None);
    }

    #[test]
    fn test_acl_defaults_to_bucket_owner_full_control() {
        let req = request(false, &[]);
        assert_eq!(decorate(Path::new("a"), &req).acl, CannedAcl::BucketOwnerFullControl);

        let mut public = request(false, &[]);
        public.acl = CannedAcl::PublicRead;
        assert_eq!(decorate(Path::new("a"), &public).acl.as_str(), "public-read");
    }

    #[test]
    fn test_acl_cli_names() {
        let acl = CannedAcl::from_str("bucket-owner-full-control", false).unwrap();
        assert_eq!(acl, CannedAcl::BucketOwnerFullControl);
        assert_eq!(
            CannedAcl::from_str("aws-exec-read", false).unwrap(),
            CannedAcl::AwsExecRead
        );
    }
}
