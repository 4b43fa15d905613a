use anyhow::Result;
use std::env;

/// Connection settings for the blob store
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub target_path: String,
    pub max_concurrent: usize,
}

impl Config {
    /// Load configuration from environment variables and .env file
    ///
    /// Values are checked by [`Config::validate`] once command-line overrides
    /// have been applied.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self {
            region: non_empty(env::var("AWS_REGION").ok()),
            profile: non_empty(env::var("AWS_PROFILE").ok()),
            endpoint: non_empty(env::var("S3_ENDPOINT").ok()),
            access_key: non_empty(env::var("S3_ACCESS_KEY").ok()),
            secret_key: non_empty(env::var("S3_SECRET_KEY").ok()),
            bucket: non_empty(env::var("S3_BUCKET").ok()),
            target_path: env::var("S3_TARGET_PATH").unwrap_or_default(),
            max_concurrent: 4,
        }
    }

    /// Check every configured value
    pub fn validate(&self) -> Result<()> {
        if let Some(region) = &self.region {
            Self::validate_region(region)?;
        }
        if let Some(bucket) = &self.bucket {
            Self::validate_bucket_name(bucket)?;
        }
        Self::validate_target_path(&self.target_path)?;

        match (&self.access_key, &self.secret_key) {
            (Some(_), None) => anyhow::bail!("access key is set but secret key is missing"),
            (None, Some(_)) => anyhow::bail!("secret key is set but access key is missing"),
            _ => {}
        }

        if self.max_concurrent == 0 {
            anyhow::bail!("max concurrent uploads must be at least 1");
        }

        Ok(())
    }

    /// The bucket to upload into
    ///
    /// # Errors
    ///
    /// Returns an error when neither `--bucket` nor `S3_BUCKET` is set
    pub fn require_bucket(&self) -> Result<&str> {
        self.bucket
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("S3_BUCKET not found in environment. Set it in .env or pass --bucket"))
    }

    /// Validate AWS region format
    fn validate_region(region: &str) -> Result<()> {
        // Basic validation - ensure it looks like a region (contains a dash)
        if !region.contains('-') {
            anyhow::bail!(
                "AWS_REGION '{}' doesn't look like a valid region (e.g., us-west-2, eu-west-1)",
                region
            );
        }

        Ok(())
    }

    /// Validate S3 bucket name according to AWS rules
    pub fn validate_bucket_name(bucket: &str) -> Result<()> {
        if bucket.len() < 3 || bucket.len() > 63 {
            anyhow::bail!(
                "bucket '{}' must be between 3 and 63 characters (got {})",
                bucket,
                bucket.len()
            );
        }

        let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !edge_ok(bucket.chars().next()) || !edge_ok(bucket.chars().last()) {
            anyhow::bail!(
                "bucket '{}' must start and end with a lowercase letter or number",
                bucket
            );
        }

        if let Some(c) = bucket
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '.')
        {
            anyhow::bail!(
                "bucket '{}' contains invalid character '{}'. Only lowercase letters, numbers, hyphens, and periods are allowed",
                bucket,
                c
            );
        }

        if bucket.contains("..") {
            anyhow::bail!("bucket '{}' cannot contain consecutive periods", bucket);
        }

        if bucket.split('.').all(|part| part.parse::<u8>().is_ok()) {
            anyhow::bail!("bucket '{}' cannot be formatted as an IP address", bucket);
        }

        Ok(())
    }

    /// Validate a destination key or prefix
    pub fn validate_target_path(path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }

        if path.contains("//") {
            anyhow::bail!("destination '{}' contains consecutive slashes (not allowed)", path);
        }

        if path.split('/').any(|segment| segment == "..") {
            anyhow::bail!("destination '{}' contains '..' (not allowed for security)", path);
        }

        if path.starts_with('/') {
            anyhow::bail!("destination '{}' should not start with '/' (use relative path)", path);
        }

        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
