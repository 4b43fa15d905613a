use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use futures::{StreamExt, TryStreamExt, stream};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use super::engine::{
    MetadataFn, PlannedObject, ProgressCounter, TransferEngine, TransferHandle, TransferSummary,
};
use super::presign::generate_presigned_url;
use super::upload::{discover_objects, upload_object};
use crate::config::Config;
use crate::metadata::ObjectMetadata;

/// S3-backed transfer engine
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    max_concurrent: usize,
}

impl S3Client {
    /// Build a client for one run from the connection settings
    ///
    /// A static key pair wins over the default credential chain. An endpoint
    /// override switches to path-style addressing for S3-compatible stores.
    pub async fn new(config: &Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            debug!("Using static credentials from configuration");
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "s3upload",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            max_concurrent: config.max_concurrent.max(1),
        })
    }

    /// Run the planned uploads on a background task
    fn spawn(&self, bucket: &str, objects: Vec<PlannedObject>) -> TransferHandle {
        let bytes_total: u64 = objects.iter().map(|o| o.size).sum();
        let progress = ProgressCounter::new(bytes_total);

        let client = self.client.clone();
        let bucket = bucket.to_string();
        let counter = Arc::clone(&progress);
        let limit = self.max_concurrent;

        let task = tokio::spawn(async move {
            let keys = stream::iter(objects)
                .map(|object| {
                    let client = client.clone();
                    let bucket = bucket.clone();
                    let counter = Arc::clone(&counter);
                    async move {
                        upload_object(&client, &bucket, &object, &counter).await?;
                        Ok::<_, anyhow::Error>(object.key)
                    }
                })
                .buffered(limit)
                .try_collect::<Vec<_>>()
                .await?;

            Ok(TransferSummary {
                keys,
                bytes: bytes_total,
            })
        });

        TransferHandle::new(progress, task)
    }
}

#[async_trait]
impl TransferEngine for S3Client {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to check bucket '{}'", bucket)),
        }
    }

    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        metadata: ObjectMetadata,
    ) -> Result<TransferHandle> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?
            .len();

        let object = PlannedObject {
            path: path.to_path_buf(),
            key: key.to_string(),
            size,
            metadata,
        };
        Ok(self.spawn(bucket, vec![object]))
    }

    fn upload_tree(
        &self,
        bucket: &str,
        prefix: &str,
        root: &Path,
        recursive: bool,
        metadata: MetadataFn,
    ) -> Result<TransferHandle> {
        let objects = discover_objects(root, prefix, recursive, &*metadata)?;
        debug!("Discovered {} objects under {}", objects.len(), root.display());
        Ok(self.spawn(bucket, objects))
    }

    async fn presigned_get_url(&self, bucket: &str, key: &str, expires_at: SystemTime) -> Result<String> {
        generate_presigned_url(&self.client, bucket, key, expires_at).await
    }
}
