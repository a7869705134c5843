//! Configuration module
//!
//! Settings for the API binary, the merge pipeline, storage and the catalog
//! database. Everything is read from the environment (optionally via a `.env` file).

use std::env;

use crate::constants::{DEFAULT_ANONYMOUS_OWNER_ID, RECORDING_CREATED_CHANNEL};
use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Server-level settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub log_format: String,
    pub max_request_body_bytes: usize,
}

/// Merge service configuration
#[derive(Clone, Debug)]
pub struct MergeServiceConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Storage configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Extra hosts whose Firebase-style `/o/` URLs name our objects, e.g. an emulator.
    pub firebase_storage_hosts: Vec<String>,
    // Mux engine
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub mux_timeout_secs: u64,
    pub audio_bitrate_kbps: u32,
    pub scratch_dir: Option<String>,
    pub max_concurrent_merges: usize,
    // Publish / catalog retry policy
    pub publish_max_attempts: u32,
    pub catalog_max_attempts: u32,
    pub catalog_retry_base_ms: u64,
    // Catalog presentation
    pub short_url_base: Option<String>,
    pub anonymous_owner_id: String,
    // Store-event trigger
    pub recording_trigger_enabled: bool,
    pub recording_channel: String,
}

/// Application configuration handle shared by the binaries.
#[derive(Clone, Debug)]
pub struct Config(pub Box<MergeServiceConfig>);

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = MergeServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_merge().validate()
    }

    pub fn as_merge(&self) -> &MergeServiceConfig {
        &self.0
    }

    pub fn server_port(&self) -> u16 {
        self.as_merge().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_merge().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_merge().base.environment
    }

    pub fn is_production(&self) -> bool {
        is_production_env(&self.as_merge().base.environment)
    }

    pub fn allows_any_origin(&self) -> bool {
        let origins = self.cors_origins();
        origins.is_empty() || origins.iter().any(|o| o == "*")
    }

    pub fn log_format(&self) -> &str {
        &self.as_merge().base.log_format
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.as_merge().base.max_request_body_bytes
    }

    pub fn database_url(&self) -> &str {
        &self.as_merge().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_merge().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_merge().base.db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_merge()
            .storage_backend
            .unwrap_or(StorageBackend::Local)
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_merge().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_merge().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_merge().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_merge().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_merge().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_merge().local_storage_base_url.as_deref()
    }

    pub fn firebase_storage_hosts(&self) -> &[String] {
        &self.as_merge().firebase_storage_hosts
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.as_merge().ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.as_merge().ffprobe_path
    }

    pub fn mux_timeout_secs(&self) -> u64 {
        self.as_merge().mux_timeout_secs
    }

    pub fn audio_bitrate_kbps(&self) -> u32 {
        self.as_merge().audio_bitrate_kbps
    }

    pub fn scratch_dir(&self) -> Option<&str> {
        self.as_merge().scratch_dir.as_deref()
    }

    pub fn max_concurrent_merges(&self) -> usize {
        self.as_merge().max_concurrent_merges
    }

    pub fn publish_max_attempts(&self) -> u32 {
        self.as_merge().publish_max_attempts
    }

    pub fn catalog_max_attempts(&self) -> u32 {
        self.as_merge().catalog_max_attempts
    }

    pub fn catalog_retry_base_ms(&self) -> u64 {
        self.as_merge().catalog_retry_base_ms
    }

    pub fn short_url_base(&self) -> Option<&str> {
        self.as_merge().short_url_base.as_deref()
    }

    pub fn anonymous_owner_id(&self) -> &str {
        &self.as_merge().anonymous_owner_id
    }

    pub fn recording_trigger_enabled(&self) -> bool {
        self.as_merge().recording_trigger_enabled
    }

    pub fn recording_channel(&self) -> &str {
        &self.as_merge().recording_channel
    }
}

fn is_production_env(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

impl MergeServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_REQUEST_BODY_MB: usize = 200;
        const MUX_TIMEOUT_SECS: u64 = 300;
        const AUDIO_BITRATE_KBPS: u32 = 128;
        const MAX_CONCURRENT_MERGES: usize = 2;
        const PUBLISH_MAX_ATTEMPTS: u32 = 3;
        const CATALOG_MAX_ATTEMPTS: u32 = 3;
        const CATALOG_RETRY_BASE_MS: u64 = 200;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        // The merge endpoint is called straight from browsers, so '*' is allowed everywhere.
        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "text".to_string())
                .to_lowercase(),
            max_request_body_bytes: env::var("MAX_REQUEST_BODY_MB")
                .unwrap_or_else(|_| MAX_REQUEST_BODY_MB.to_string())
                .parse::<usize>()
                .unwrap_or(MAX_REQUEST_BODY_MB)
                * 1024
                * 1024,
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?;

        let config = MergeServiceConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            firebase_storage_hosts: env::var("FIREBASE_STORAGE_HOSTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            mux_timeout_secs: env::var("MUX_TIMEOUT_SECS")
                .unwrap_or_else(|_| MUX_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(MUX_TIMEOUT_SECS),
            audio_bitrate_kbps: env::var("AUDIO_BITRATE_KBPS")
                .unwrap_or_else(|_| AUDIO_BITRATE_KBPS.to_string())
                .parse()
                .unwrap_or(AUDIO_BITRATE_KBPS),
            scratch_dir: env::var("SCRATCH_DIR").ok(),
            max_concurrent_merges: env::var("MAX_CONCURRENT_MERGES")
                .unwrap_or_else(|_| MAX_CONCURRENT_MERGES.to_string())
                .parse()
                .unwrap_or(MAX_CONCURRENT_MERGES),
            publish_max_attempts: env::var("PUBLISH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| PUBLISH_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(PUBLISH_MAX_ATTEMPTS),
            catalog_max_attempts: env::var("CATALOG_MAX_ATTEMPTS")
                .unwrap_or_else(|_| CATALOG_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(CATALOG_MAX_ATTEMPTS),
            catalog_retry_base_ms: env::var("CATALOG_RETRY_BASE_MS")
                .unwrap_or_else(|_| CATALOG_RETRY_BASE_MS.to_string())
                .parse()
                .unwrap_or(CATALOG_RETRY_BASE_MS),
            short_url_base: env::var("SHORT_URL_BASE")
                .ok()
                .map(|s| s.trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            anonymous_owner_id: env::var("ANONYMOUS_OWNER_ID")
                .unwrap_or_else(|_| DEFAULT_ANONYMOUS_OWNER_ID.to_string()),
            recording_trigger_enabled: env::var("RECORDING_TRIGGER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            recording_channel: env::var("RECORDING_CHANNEL")
                .unwrap_or_else(|_| RECORDING_CREATED_CHANNEL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.mux_timeout_secs == 0 {
            return Err(anyhow::anyhow!("MUX_TIMEOUT_SECS must be greater than 0"));
        }

        if self.max_concurrent_merges == 0 {
            return Err(anyhow::anyhow!(
                "MAX_CONCURRENT_MERGES must be greater than 0"
            ));
        }

        if self.publish_max_attempts == 0 || self.catalog_max_attempts == 0 {
            return Err(anyhow::anyhow!(
                "PUBLISH_MAX_ATTEMPTS and CATALOG_MAX_ATTEMPTS must be at least 1"
            ));
        }

        if self.anonymous_owner_id.trim().is_empty() {
            return Err(anyhow::anyhow!("ANONYMOUS_OWNER_ID must not be empty"));
        }

        // Validate storage backend configuration
        match self.storage_backend.unwrap_or(StorageBackend::Local) {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
