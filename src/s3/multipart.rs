use anyhow::{Context, Result};
use aws_sdk_s3::{
    Client,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl},
};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::engine::{PlannedObject, ProgressCounter};

// Threshold for using multipart upload (100MB)
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

// Size of each part (10MB) - AWS minimum is 5MB
const PART_SIZE: usize = 10 * 1024 * 1024;

/// Upload a large file using S3 multipart upload
///
/// ACL and headers are set when the upload is created, so the finished
/// object carries the same metadata as a single PUT would. If any part
/// fails the upload is aborted before the error is returned.
pub async fn upload_multipart(
    client: &Client,
    bucket: &str,
    object: &PlannedObject,
    progress: &ProgressCounter,
) -> Result<()> {
    let meta = &object.metadata;

    info!(
        "Starting multipart upload for {} ({} bytes, {} parts)",
        object.path.display(),
        object.size,
        (object.size as usize).div_ceil(PART_SIZE)
    );

    // Initiate multipart upload
    let multipart = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(&object.key)
        .content_type(&meta.content_type)
        .set_content_encoding(meta.content_encoding.clone())
        .set_cache_control(meta.cache_control.clone())
        .acl(ObjectCannedAcl::from(meta.acl.as_str()))
        .send()
        .await
        .context("Failed to initiate multipart upload")?;

    let upload_id = multipart
        .upload_id()
        .context("No upload ID returned from S3")?;

    debug!("Multipart upload initiated with ID: {}", upload_id);

    match upload_parts(client, bucket, &object.key, upload_id, &object.path, progress).await {
        Ok(parts) => {
            debug!(
                "All {} parts uploaded, completing multipart upload",
                parts.len()
            );

            let completed = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();

            client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(&object.key)
                .upload_id(upload_id)
                .multipart_upload(completed)
                .send()
                .await
                .context("Failed to complete multipart upload")?;

            info!(
                "Successfully completed multipart upload: {} -> s3://{}/{}",
                object.path.display(),
                bucket,
                object.key
            );
            Ok(())
        }
        Err(e) => {
            if let Err(abort_err) = abort_multipart_upload(client, bucket, &object.key, upload_id).await {
                warn!("{:#}", abort_err);
            }
            Err(e)
        }
    }
}

async fn upload_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    path: &Path,
    progress: &ProgressCounter,
) -> Result<Vec<CompletedPart>> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut parts = Vec::new();
    let mut part_number = 1i32;

    loop {
        let buffer = read_part(&mut file).await?;
        if buffer.is_empty() {
            break; // EOF
        }
        let len = buffer.len() as u64;

        debug!("Uploading part {} ({} bytes)", part_number, len);

        let part_result = client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buffer))
            .send()
            .await
            .with_context(|| format!("Failed to upload part {}", part_number))?;

        parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(part_result.e_tag().unwrap_or(""))
                .build(),
        );

        progress.add(len);
        part_number += 1;
    }

    Ok(parts)
}

/// Fill one part buffer, short only at end of file
async fn read_part(file: &mut tokio::fs::File) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; PART_SIZE];
    let mut filled = 0;

    while filled < PART_SIZE {
        let n = file.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    buffer.truncate(filled);
    Ok(buffer)
}

/// Abort a multipart upload so no orphaned parts are billed
async fn abort_multipart_upload(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<()> {
    client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
        .context("Failed to abort multipart upload")?;

    debug!("Aborted multipart upload {}", upload_id);

    Ok(())
}
