use anyhow::{Context, Result};
use aws_sdk_s3::{Client, primitives::ByteStream, types::ObjectCannedAcl};
use base64::{Engine, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::engine::{PlannedObject, ProgressCounter};
use super::helpers::join_key;
use super::multipart::{MULTIPART_THRESHOLD, upload_multipart};
use crate::metadata::ObjectMetadata;

/// List the files under `root` and compute each one's key and metadata
///
/// Without `recursive` only the files directly inside `root` are taken.
/// Directories never become objects, so empty ones upload nothing.
pub fn discover_objects(
    root: &Path,
    prefix: &str,
    recursive: bool,
    metadata: &(dyn Fn(&Path) -> ObjectMetadata + Send + Sync),
) -> Result<Vec<PlannedObject>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut objects = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .context("Failed to strip prefix")?;
        let size = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata of {}", entry.path().display()))?
            .len();

        objects.push(PlannedObject {
            path: entry.path().to_path_buf(),
            key: join_key(prefix, relative),
            size,
            metadata: metadata(entry.path()),
        });
    }

    Ok(objects)
}

/// Upload one planned object, using multipart upload above the threshold
pub async fn upload_object(
    client: &Client,
    bucket: &str,
    object: &PlannedObject,
    progress: &ProgressCounter,
) -> Result<()> {
    if object.size >= MULTIPART_THRESHOLD {
        return upload_multipart(client, bucket, object, progress).await;
    }

    let bytes = tokio::fs::read(&object.path)
        .await
        .with_context(|| format!("Failed to read {}", object.path.display()))?;
    let content_md5 = STANDARD.encode(Md5::digest(&bytes));
    let size = bytes.len() as u64;

    debug!(
        "PUT s3://{}/{} ({} bytes, encoding {:?})",
        bucket, object.key, size, object.metadata.content_encoding
    );

    let meta = &object.metadata;
    client
        .put_object()
        .bucket(bucket)
        .key(&object.key)
        .body(ByteStream::from(bytes))
        .content_length(size as i64)
        .content_md5(content_md5)
        .content_type(&meta.content_type)
        .set_content_encoding(meta.content_encoding.clone())
        .set_cache_control(meta.cache_control.clone())
        .acl(ObjectCannedAcl::from(meta.acl.as_str()))
        .send()
        .await
        .with_context(|| format!("Failed to upload {} to s3://{}/{}", object.path.display(), bucket, object.key))?;

    progress.add(size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CannedAcl;
    use std::fs;
    use tempfile::TempDir;

    fn fixed_metadata(path: &Path) -> ObjectMetadata {
        ObjectMetadata {
            content_encoding: None,
            cache_control: None,
            content_type: path.display().to_string(),
            acl: CannedAcl::BucketOwnerFullControl,
        }
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"<html/>").unwrap();
        fs::create_dir_all(dir.path().join("css/vendor")).unwrap();
        fs::write(dir.path().join("css/site.css"), b"body{}").unwrap();
        fs::write(dir.path().join("css/vendor/reset.css"), b"*{}").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_discover_recursive() {
        let dir = tree();
        let objects = discover_objects(dir.path(), "site", true, &fixed_metadata).unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();

        assert_eq!(
            keys,
            vec!["site/css/site.css", "site/css/vendor/reset.css", "site/index.html"]
        );
        // Metadata is computed for every object, not just the first
        for object in &objects {
            assert_eq!(object.metadata.content_type, object.path.display().to_string());
        }
    }

    #[test]
    fn test_discover_top_level_only() {
        let dir = tree();
        let objects = discover_objects(dir.path(), "", false, &fixed_metadata).unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();

        assert_eq!(keys, vec!["index.html"]);
        assert_eq!(objects[0].size, 7);
    }
}
