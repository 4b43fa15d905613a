mod compress;
mod config;
mod metadata;
mod orchestrator;
mod request;
mod s3;
mod source;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use compress::ExclusionSet;
use config::Config;
use metadata::CannedAcl;
use orchestrator::{RunOutcome, Uploader};
use request::UploadRequest;
use s3::{S3Client, UploadError};
use source::SourceSpec;

#[derive(Parser, Debug)]
#[command(
    name = "s3upload",
    version = env!("CARGO_PKG_VERSION"),
    author = "Tyr Chen <tyr.chen@gmail.com>",
    about = "Upload a file or directory to S3 from a build pipeline",
    long_about = "Uploads one file or a directory tree to an S3 bucket in a single run. \
                  Optionally gzip-compresses content first (with regex exclusions), sets ACL and \
                  Cache-Control on every object, and prints a time-limited download URL for single files.",
    after_help = "Examples:\n  \
                  s3upload -f target/app.jar -b artifacts --destination releases/          # Upload one file\n  \
                  s3upload -d dist -r -z -x '.*\\.png' --cache-control max-age=300           # Compressed site upload\n  \
                  s3upload -f report.pdf --presign --presign-expiry-ms 60000               # Print a 1-minute URL\n  \
                  s3upload -d dist -r --dry-run                                            # Check without uploading\n\n\
                  Configuration (.env):\n  \
                  AWS_REGION=us-west-2\n  \
                  S3_BUCKET=my-bucket\n  \
                  S3_TARGET_PATH=uploads\n  \
                  S3_ENDPOINT=http://localhost:9000   # optional, S3-compatible store\n  \
                  S3_ACCESS_KEY=... S3_SECRET_KEY=... # optional, else default AWS chain\n\n\
                  For more information: https://github.com/tyrchen/swiss-knife"
)]
struct Cli {
    /// Single file to upload
    #[arg(long, short = 'f', value_name = "PATH")]
    file: Option<PathBuf>,

    /// Directory to upload
    #[arg(long, short = 'd', value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Bucket to upload into (overrides S3_BUCKET)
    #[arg(long, short = 'b')]
    bucket: Option<String>,

    /// Object key for a file, key prefix for a directory (overrides S3_TARGET_PATH)
    #[arg(long)]
    destination: Option<String>,

    /// Upload subdirectories too when uploading a directory
    #[arg(long, short = 'r')]
    recursive: bool,

    /// Gzip-compress files before upload and set Content-Encoding: gzip
    #[arg(long, short = 'z')]
    compress: bool,

    /// Regex matched against the full local path; matching files are not compressed (repeat the flag for more)
    #[arg(long, short = 'x', value_name = "REGEX")]
    exclude: Vec<String>,

    /// Cache-Control header for every object
    #[arg(long)]
    cache_control: Option<String>,

    /// Canned ACL for every object
    #[arg(long, value_enum, default_value_t = CannedAcl::BucketOwnerFullControl)]
    acl: CannedAcl,

    /// Check source and bucket, log what would be uploaded, upload nothing
    #[arg(long)]
    dry_run: bool,

    /// Print a pre-signed download URL when exactly one object was uploaded
    #[arg(long)]
    presign: bool,

    /// Pre-signed URL lifetime in milliseconds, counted from upload completion
    #[arg(long, default_value = "3600000")]
    presign_expiry_ms: u64,

    /// Access key (needs --secret-key; overrides S3_ACCESS_KEY)
    #[arg(long)]
    access_key: Option<String>,

    /// Secret key (needs --access-key; overrides S3_SECRET_KEY)
    #[arg(long)]
    secret_key: Option<String>,

    /// Storage endpoint override (overrides S3_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Maximum number of concurrent object uploads for a directory
    #[arg(long, short = 'c', default_value = "4")]
    max_concurrent: usize,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration
    fn merge_config(&self, mut config: Config) -> s3::error::Result<Config> {
        if let Some(bucket) = &self.bucket {
            config.bucket = Some(bucket.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if self.access_key.is_some() || self.secret_key.is_some() {
            config.access_key = self.access_key.clone();
            config.secret_key = self.secret_key.clone();
        }
        if let Some(destination) = &self.destination {
            config.target_path = destination.clone();
        }
        config.max_concurrent = self.max_concurrent;

        config.validate().map_err(UploadError::config)?;
        Ok(config)
    }

    fn to_request(&self, config: &Config) -> s3::error::Result<UploadRequest> {
        let bucket = config.require_bucket().map_err(UploadError::config)?;

        Ok(UploadRequest {
            source: SourceSpec {
                file: self.file.clone(),
                dir: self.dir.clone(),
            },
            destination: config.target_path.clone(),
            recursive: self.recursive,
            compress: self.compress,
            exclusions: ExclusionSet::new(self.exclude.as_slice())?,
            cache_control: self.cache_control.clone(),
            acl: self.acl,
            dry_run: self.dry_run,
            presign: self.presign,
            presign_expiry: Duration::from_millis(self.presign_expiry_ms),
            ..UploadRequest::for_bucket(bucket)
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    // Initialize tracing/logging with support for LOG_LEVEL from .env
    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("S3 Upload Tool v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(outcome) => report(&outcome, cli.json),
        Err(e) => {
            eprintln!("{}", style(e.diagnostic()).red());
            ExitCode::from(e.exit_status())
        }
    }
}

async fn run(cli: &Cli) -> s3::error::Result<RunOutcome> {
    let config = cli.merge_config(Config::from_env())?;
    let request = cli.to_request(&config)?;

    let engine = S3Client::new(&config)
        .await
        .map_err(UploadError::transfer_service)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping transfer");
            trigger.cancel();
        }
    });

    let progress_bar = if cli.json {
        ProgressBar::hidden()
    } else {
        new_progress_bar()
    };

    Uploader::new(&engine, cancel)
        .with_progress_bar(progress_bar)
        .run(&request)
        .await
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_message("Uploading");
    pb
}

/// Print the outcome and pick the exit code
fn report(outcome: &RunOutcome, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("Failed to serialize summary: {}", e),
        }
    } else {
        print_outcome(outcome);
    }

    match outcome {
        RunOutcome::Incomplete {
            bytes_done,
            bytes_total,
        } => {
            let err = UploadError::TransferInterrupted {
                bytes_done: *bytes_done,
                bytes_total: *bytes_total,
            };
            eprintln!("{}", style(err.diagnostic()).yellow());
            ExitCode::from(err.exit_status())
        }
        _ => ExitCode::SUCCESS,
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::WouldUpload {
            source,
            bucket,
            destination,
        } => {
            println!(
                "  {} {} → s3://{}/{}",
                style("WOULD UPLOAD").green().bold(),
                source,
                bucket,
                destination
            );
        }
        RunOutcome::Completed {
            objects,
            bytes,
            compression_savings,
            presigned_url,
        } => {
            println!(
                "{} {} ({})",
                style("✓").green(),
                style(format!("Uploaded {} object(s)", objects)).green(),
                style(format_size(*bytes)).dim()
            );
            if let Some(saved) = compression_savings {
                println!(
                    "  {}",
                    style(format!("gzip saved {} bytes", saved)).dim()
                );
            }
            if let Some(url) = presigned_url {
                println!("  {} {}", style("🔗").blue(), style(url).dim());
            }
        }
        RunOutcome::Incomplete { .. } => {}
    }
}

/// Format file size for display
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("s3upload").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_request_from_cli() {
        let cli = parse(&[
            "--dir",
            "dist",
            "-b",
            "artifacts",
            "--destination",
            "site/",
            "-r",
            "-z",
            "-x",
            r".*\.png",
            "-x",
            r".*\.jpg",
            "--acl",
            "public-read",
            "--presign-expiry-ms",
            "60000",
        ]);
        let config = cli.merge_config(Config::default()).unwrap();
        let request = cli.to_request(&config).unwrap();

        assert_eq!(request.bucket, "artifacts");
        assert_eq!(request.destination, "site/");
        assert_eq!(request.source.dir, Some(PathBuf::from("dist")));
        assert!(request.recursive && request.compress);
        assert_eq!(request.exclusions.len(), 2);
        assert_eq!(request.acl, CannedAcl::PublicRead);
        assert_eq!(request.presign_expiry, Duration::from_secs(60));
        assert_eq!(config.max_concurrent, 4);
    }

    #[test]
    fn test_defaults_from_cli() {
        let cli = parse(&["-f", "a.txt", "-b", "artifacts"]);
        let request = cli.to_request(&cli.merge_config(Config::default()).unwrap()).unwrap();

        assert_eq!(request.acl, CannedAcl::BucketOwnerFullControl);
        assert_eq!(request.presign_expiry, Duration::from_millis(3_600_000));
        assert!(!request.compress && !request.dry_run && !request.presign);
    }

    #[test]
    fn test_missing_bucket_is_config_error() {
        let cli = parse(&["-f", "a.txt"]);
        let config = cli.merge_config(Config::default()).unwrap();
        assert!(matches!(cli.to_request(&config), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let cli = parse(&["-f", "a.txt", "-b", "artifacts", "--access-key", "AKIA"]);
        assert!(matches!(
            cli.merge_config(Config::default()),
            Err(UploadError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_exclusion_rejected() {
        let cli = parse(&["-f", "a.txt", "-b", "artifacts", "-x", "(oops"]);
        let config = cli.merge_config(Config::default()).unwrap();
        assert!(matches!(cli.to_request(&config), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_exclude_comma_stays_in_pattern() {
        let cli = parse(&["-f", "a.txt", "-b", "artifacts", "-x", r"v[0-9]{1,3}\.js", "-x", r".*\.png"]);
        assert_eq!(cli.exclude, vec![r"v[0-9]{1,3}\.js", r".*\.png"]);

        let config = cli.merge_config(Config::default()).unwrap();
        let request = cli.to_request(&config).unwrap();
        assert_eq!(request.exclusions.len(), 2);
        assert!(request.exclusions.is_excluded(std::path::Path::new("v12.js")));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_json_summary_shape() {
        let outcome = RunOutcome::Completed {
            objects: 1,
            bytes: 10,
            compression_savings: Some(-21),
            presigned_url: None,
        };
        let value: serde_json::Value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["compression_savings"], -21);
    }
}
