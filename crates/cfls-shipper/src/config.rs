//! Configuration management
//!
//! Every setting is a command line flag with an environment variable
//! fallback; a `.env` file in the working directory is loaded first.

use anyhow::{bail, Context};
use cfls_common::logging::LogFormat;
use cfls_common::parse_pairs;
use clap::Parser;
use std::{collections::BTreeMap, time::Duration};

use crate::{
    sink::LokiConfig,
    storage::{config::DEFAULT_REGION, StorageConfig},
};

// ============================================================================
// Defaults
// ============================================================================

/// Default seconds between bucket listings.
pub const DEFAULT_WAIT_INTERVAL_SECS: u64 = 60;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default port of the metrics endpoint.
pub const DEFAULT_PORT: u16 = 8080;

/// Queue slots per worker.
pub const QUEUE_SLOTS_PER_WORKER: usize = 10;

/// Command line / environment surface of the shipper
#[derive(Parser, Debug, Clone)]
#[command(name = "cfls-shipper")]
#[command(author, version, about = "Ship CloudFront access logs from S3 to Loki")]
pub struct Cli {
    /// Source bucket holding the gzip-compressed access logs
    #[arg(long, env = "CFLS_BUCKET")]
    pub bucket: String,

    /// Seconds to wait between bucket listings
    #[arg(long, env = "CFLS_WAIT_INTERVAL_SECS", default_value_t = DEFAULT_WAIT_INTERVAL_SECS)]
    pub wait_interval_secs: u64,

    /// Log output format of the shipper itself (text or json)
    #[arg(long, env = "CFLS_FORMAT", default_value = "text")]
    pub format: LogFormat,

    /// Base URL of the Loki endpoint
    #[arg(long, env = "CFLS_LOKI_URL")]
    pub loki_url: String,

    #[arg(long, env = "CFLS_LOKI_USER")]
    pub loki_user: Option<String>,

    #[arg(long, env = "CFLS_LOKI_PASSWORD", hide_env_values = true)]
    pub loki_password: Option<String>,

    /// Entries buffered per push request
    #[arg(long, env = "CFLS_LOKI_BATCH_SIZE", default_value_t = crate::sink::loki::DEFAULT_BATCH_SIZE)]
    pub loki_batch_size: usize,

    /// Cluster name, used for the `cluster` and `index` labels
    #[arg(long, env = "CFLS_CLUSTER")]
    pub cluster: String,

    /// Extra static labels as `key=value,key=value`; they override derived labels
    #[arg(long, env = "CFLS_LABELS", default_value = "")]
    pub labels: String,

    /// Number of concurrent workers
    #[arg(long, env = "CFLS_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Port of the metrics endpoint
    #[arg(long, env = "CFLS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "S3_REGION", default_value = DEFAULT_REGION)]
    pub s3_region: String,

    #[arg(long, env = "S3_PATH_STYLE", default_value_t = false)]
    pub s3_path_style: bool,

    #[arg(long, env = "S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,

    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
}

/// Settings consumed by the pipeline itself
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cluster: String,
    pub static_labels: BTreeMap<String, String>,
    pub workers: usize,
}

impl PipelineConfig {
    pub fn new(cluster: impl Into<String>, workers: usize) -> Self {
        Self {
            cluster: cluster.into(),
            static_labels: BTreeMap::new(),
            workers,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_labels.insert(name.into(), value.into());
        self
    }

    pub fn queue_capacity(&self) -> usize {
        QUEUE_SLOTS_PER_WORKER * self.workers
    }
}

/// Fully resolved shipper configuration
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub loki: LokiConfig,
    pub wait_interval: Duration,
    pub port: u16,
    pub format: LogFormat,
    pub log_level: String,
}

impl ShipperConfig {
    /// Parse the process arguments and environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let static_labels = parse_pairs(&cli.labels).context("Invalid --labels value")?;

        let config = ShipperConfig {
            pipeline: PipelineConfig {
                cluster: cli.cluster,
                static_labels,
                workers: cli.workers,
            },
            storage: StorageConfig {
                endpoint: cli.s3_endpoint,
                region: cli.s3_region,
                bucket: cli.bucket,
                access_key: cli.s3_access_key,
                secret_key: cli.s3_secret_key,
                path_style: cli.s3_path_style,
            },
            loki: LokiConfig {
                url: cli.loki_url,
                user: cli.loki_user,
                password: cli.loki_password,
                batch_size: cli.loki_batch_size,
            },
            wait_interval: Duration::from_secs(cli.wait_interval_secs),
            port: cli.port,
            format: cli.format,
            log_level: cli.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.bucket.trim().is_empty() {
            bail!("Bucket name cannot be empty");
        }

        if self.pipeline.cluster.trim().is_empty() {
            bail!("Cluster name cannot be empty");
        }

        if self.pipeline.workers == 0 {
            bail!("Worker count must be greater than 0");
        }

        if self.wait_interval.is_zero() {
            bail!("Wait interval must be greater than 0");
        }

        if !(self.loki.url.starts_with("http://") || self.loki.url.starts_with("https://")) {
            bail!("Loki URL must start with http:// or https://, got `{}`", self.loki.url);
        }

        if self.loki.batch_size == 0 {
            bail!("Loki batch size must be greater than 0");
        }

        if self.loki.password.is_some() && self.loki.user.is_none() {
            bail!("Loki password is set without a user");
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            bail!("S3 access key and secret key must be set together");
        }

        Ok(())
    }
}
