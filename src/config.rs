use crate::{retry::RetryPolicy, services::blob_store::OperationTimeouts, storage::StorageBackend};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Base used to turn identifiers into URLs.
    pub gateway_base_url: String,
    pub storage_backend: StorageBackend,
    /// Blob directory for the `local` backend.
    pub storage_dir: String,
    pub database_url: String,
    pub object_store_endpoint: String,
    pub object_store_bucket: String,
    pub ipfs_api_url: String,
    pub retry_attempts: u8,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub op_timeout_secs: u64,
    pub op_timeout_per_mib_secs: u64,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "NFT entity upload and metadata gateway")]
pub struct Args {
    /// Host to bind to (overrides NFT_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides NFT_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Gateway base URL for resolved links (overrides NFT_GATEWAY_BASE_URL)
    #[arg(long)]
    pub gateway_base_url: Option<String>,

    /// Blob backend (overrides NFT_GATEWAY_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Directory for the local backend (overrides NFT_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides NFT_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object-store endpoint (overrides NFT_GATEWAY_OBJECT_STORE_ENDPOINT)
    #[arg(long)]
    pub object_store_endpoint: Option<String>,

    /// Object-store bucket (overrides NFT_GATEWAY_OBJECT_STORE_BUCKET)
    #[arg(long)]
    pub object_store_bucket: Option<String>,

    /// IPFS RPC API URL (overrides NFT_GATEWAY_IPFS_API_URL)
    #[arg(long)]
    pub ipfs_api_url: Option<String>,

    /// Attempts per storage operation (overrides NFT_GATEWAY_RETRY_ATTEMPTS)
    #[arg(long)]
    pub retry_attempts: Option<u8>,

    /// Maximum request body in bytes (overrides NFT_GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `key`, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already parsed CLI args over environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_port = env_or("NFT_GATEWAY_PORT", 3000u16)?;
        let env_backend = match env::var("NFT_GATEWAY_STORAGE_BACKEND") {
            Ok(value) => StorageBackend::from_str(&value, true).map_err(|err| {
                anyhow::anyhow!("parsing NFT_GATEWAY_STORAGE_BACKEND value `{}`: {}", value, err)
            })?,
            Err(_) => StorageBackend::Local,
        };
        let env_retry_attempts = env_or("NFT_GATEWAY_RETRY_ATTEMPTS", 4u8)?;
        let env_max_upload = env_or("NFT_GATEWAY_MAX_UPLOAD_BYTES", 64 * 1024 * 1024usize)?;

        // --- Merge ---
        Ok(Self {
            host: args
                .host
                .unwrap_or_else(|| env_string("NFT_GATEWAY_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            gateway_base_url: args.gateway_base_url.unwrap_or_else(|| {
                env_string("NFT_GATEWAY_BASE_URL", "http://127.0.0.1:3000/ipfs/")
            }),
            storage_backend: args.storage_backend.unwrap_or(env_backend),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_string("NFT_GATEWAY_STORAGE_DIR", "./data/blobs")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_string(
                    "NFT_GATEWAY_DATABASE_URL",
                    "sqlite://./data/meta/gateway.db",
                )
            }),
            object_store_endpoint: args.object_store_endpoint.unwrap_or_else(|| {
                env_string("NFT_GATEWAY_OBJECT_STORE_ENDPOINT", "http://127.0.0.1:9000")
            }),
            object_store_bucket: args.object_store_bucket.unwrap_or_else(|| {
                env_string("NFT_GATEWAY_OBJECT_STORE_BUCKET", "nft-entities")
            }),
            ipfs_api_url: args.ipfs_api_url.unwrap_or_else(|| {
                env_string("NFT_GATEWAY_IPFS_API_URL", "http://127.0.0.1:5001")
            }),
            retry_attempts: args.retry_attempts.unwrap_or(env_retry_attempts),
            retry_base_ms: env_or("NFT_GATEWAY_RETRY_BASE_MS", 100)?,
            retry_max_ms: env_or("NFT_GATEWAY_RETRY_MAX_MS", 5_000)?,
            op_timeout_secs: env_or("NFT_GATEWAY_OP_TIMEOUT_SECS", 10)?,
            op_timeout_per_mib_secs: env_or("NFT_GATEWAY_OP_TIMEOUT_PER_MIB_SECS", 2)?,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_base_ms, self.retry_max_ms)
    }

    pub fn operation_timeouts(&self) -> OperationTimeouts {
        OperationTimeouts {
            base: Duration::from_secs(self.op_timeout_secs),
            per_mib: Duration::from_secs(self.op_timeout_per_mib_secs),
            max_blob_bytes: self.max_upload_bytes,
        }
    }
}
