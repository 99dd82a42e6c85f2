use crate::storage::PublicUrlScheme;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once per process
/// and handed to every component that needs it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage: StorageConfig,
    pub sweep: SweepConfig,
    pub slugs: SlugConfig,
}

/// Credentials and limits for the S3-compatible bucket.
#[derive(Clone)]
pub struct StorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub public_base_url: String,
    pub sign_expires: Duration,
    pub max_file_size_bytes: u64,
    /// Leading key segment, e.g. `prod` or `dev`.
    pub environment: String,
}

/// Parameters of one orphan sweep invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub staged_ttl_hours: u64,
    pub batch_limit: u32,
}

/// Bounds for slug allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlugConfig {
    /// Candidates probed (`base`, `base-2`, ...) before giving up.
    pub scan_limit: u32,
    /// Extra write attempts after a slug uniqueness violation.
    pub save_retry_limit: u32,
}

pub const DEFAULT_STAGED_TTL_HOURS: u64 = 24;
pub const DEFAULT_SWEEP_BATCH: u32 = 200;
pub const DEFAULT_SIGN_EXPIRES_SECS: u64 = 60;
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 5;

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            staged_ttl_hours: DEFAULT_STAGED_TTL_HOURS,
            batch_limit: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            scan_limit: 5000,
            save_retry_limit: 3,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Upload asset lifecycle service")]
pub struct Args {
    /// Host to bind to (overrides ASSET_KEEPER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_KEEPER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides ASSET_KEEPER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Run one orphan sweep batch and exit
    #[arg(long, conflicts_with = "migrate")]
    pub sweep: bool,
}

/// What the binary should do after configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    Sweep,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        let args = Args::parse();
        Self::from_parts(args, |name| env::var(name).ok())
    }

    /// Merge CLI args over values produced by `lookup`.
    pub fn from_parts<F>(args: Args, lookup: F) -> Result<(Self, RunMode)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let env_host = var("ASSET_KEEPER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("ASSET_KEEPER_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ASSET_KEEPER_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_db = var("ASSET_KEEPER_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/asset_keeper.db".into());

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.sweep {
            RunMode::Sweep
        } else {
            RunMode::Serve
        };

        let storage = StorageConfig::from_lookup(&var)?;
        let sweep = SweepConfig {
            staged_ttl_hours: positive_or(
                var("ASSET_STAGED_TTL_HOURS").as_deref(),
                DEFAULT_STAGED_TTL_HOURS,
            ),
            batch_limit: positive_or(
                var("ASSET_SWEEP_BATCH").as_deref(),
                DEFAULT_SWEEP_BATCH as u64,
            )
            .min(u32::MAX as u64) as u32,
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            storage,
            sweep,
            slugs: SlugConfig::default(),
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StorageConfig {
    fn from_lookup<F>(var: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| match var(name) {
            Some(value) => Ok(value),
            None => bail!("missing required env var: {}", name),
        };

        let account_id = required("R2_ACCOUNT_ID")?;
        let access_key_id = required("R2_ACCESS_KEY_ID")?;
        let secret_access_key = required("R2_SECRET_ACCESS_KEY")?;
        let bucket = required("R2_BUCKET")?;
        let public_base_url = var("R2_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("https://{}.{}.r2.dev", bucket, account_id));
        let sign_expires = Duration::from_secs(positive_or(
            var("R2_SIGN_EXPIRES_SECONDS").as_deref(),
            DEFAULT_SIGN_EXPIRES_SECS,
        ));
        let max_file_size_mb = positive_or(
            var("R2_MAX_FILE_SIZE_MB").as_deref(),
            DEFAULT_MAX_FILE_SIZE_MB,
        );

        Ok(Self {
            account_id,
            access_key_id,
            secret_access_key,
            bucket,
            public_base_url,
            sign_expires,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            environment: environment_segment(var("APP_ENV").as_deref()),
        })
    }

    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }

    pub fn public_url_scheme(&self) -> PublicUrlScheme {
        PublicUrlScheme::new(&self.public_base_url)
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("public_base_url", &self.public_base_url)
            .field("sign_expires", &self.sign_expires)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("environment", &self.environment)
            .finish()
    }
}

/// Parse a positive integer, falling back on anything else.
pub fn positive_or(value: Option<&str>, fallback: u64) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(fallback)
}

/// Map the deployment environment name onto the key prefix segment.
pub fn environment_segment(raw: Option<&str>) -> String {
    let raw = raw.unwrap_or("development").trim().to_lowercase();
    match raw.as_str() {
        "production" => "prod".into(),
        "test" => "test".into(),
        "development" => "dev".into(),
        other => {
            let cleaned: String = other
                .chars()
                .filter(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
                .collect();
            if cleaned.is_empty() {
                "dev".into()
            } else {
                cleaned
            }
        }
    }
}
