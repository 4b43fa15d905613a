use anyhow::{Context, Result};
use aws_sdk_s3::{Client, presigning::PresigningConfig};
use std::time::SystemTime;

/// Generate a pre-signed GET URL that stops working at `expires_at`
///
/// The signature starts now, so the embedded expiry is `expires_at` itself.
/// AWS rejects lifetimes longer than 7 days; that error is returned as is.
pub async fn generate_presigned_url(
    client: &Client,
    bucket: &str,
    s3_key: &str,
    expires_at: SystemTime,
) -> Result<String> {
    let now = SystemTime::now();
    let expires_in = expires_at
        .duration_since(now)
        .context("Pre-signed URL expiration is in the past")?;

    let presigning_config = PresigningConfig::builder()
        .start_time(now)
        .expires_in(expires_in)
        .build()?;

    let presigned_request = client
        .get_object()
        .bucket(bucket)
        .key(s3_key)
        .presigned(presigning_config)
        .await?;

    Ok(presigned_request.uri().to_string())
}
