use anyhow::{Context, Result, anyhow};
use bucket_iterator::S3Config;
use clap::{Parser, ValueEnum};
use std::{
    env::{self, VarError},
    str::FromStr,
};

const ENV_PREFIX: &str = "BUCKET_ITERATOR_";
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Storage backend the CLI lists from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// S3 or an S3-compatible endpoint such as MinIO.
    S3,
    /// SQLite metadata catalog of an on-disk object store.
    Catalog,
    /// Plain directory tree, one subdirectory per bucket.
    Directory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub page_size: usize,
    pub limit: Option<usize>,
    pub json: bool,
    pub s3: S3Config,
    pub database_url: String,
    pub storage_dir: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "List the blobs of a storage bucket, one page at a time")]
pub struct Args {
    /// Bucket to list (overrides BUCKET_ITERATOR_BUCKET)
    pub bucket: Option<String>,

    /// Storage backend (overrides BUCKET_ITERATOR_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Only list keys starting with this prefix (overrides BUCKET_ITERATOR_PREFIX)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Keys requested per listing page, 1-1000 (overrides BUCKET_ITERATOR_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Stop after this many blobs
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print one JSON object per blob
    #[arg(long)]
    pub json: bool,

    /// S3 region (overrides BUCKET_ITERATOR_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// S3 endpoint URL, e.g. http://127.0.0.1:9000 (overrides BUCKET_ITERATOR_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Use path-style bucket addressing (overrides BUCKET_ITERATOR_S3_FORCE_PATH_STYLE)
    #[arg(long)]
    pub s3_force_path_style: bool,

    /// Catalog database URL (overrides BUCKET_ITERATOR_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory holding one subdirectory per bucket (overrides BUCKET_ITERATOR_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Apply the catalog schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name))?;
        Ok((cfg, migrate))
    }

    /// Merge parsed arguments over values read through `lookup`, falling
    /// back to defaults. Credentials are only read from the environment.
    pub fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let var = |name: &str| -> Result<Option<String>> {
            let key = format!("{ENV_PREFIX}{name}");
            match lookup(&key) {
                Ok(value) => Ok(Some(value)),
                Err(VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {key}")),
            }
        };

        // --- Environment fallback ---
        let env_backend = match var("BACKEND")? {
            Some(value) => <Backend as ValueEnum>::from_str(&value, true)
                .map_err(|err| anyhow!(err))
                .with_context(|| format!("parsing {ENV_PREFIX}BACKEND value `{value}`"))?,
            None => Backend::S3,
        };
        let env_page_size = parse_var(var("PAGE_SIZE")?, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let env_path_style = parse_var(var("S3_FORCE_PATH_STYLE")?, "S3_FORCE_PATH_STYLE", false)?;
        let env_region = var("S3_REGION")?.unwrap_or_else(|| "us-east-1".into());
        let env_db = var("DATABASE_URL")?
            .unwrap_or_else(|| "sqlite://./data/meta/object_store.db".into());
        let env_storage = var("STORAGE_DIR")?.unwrap_or_else(|| "./data/objects".into());

        // --- Merge ---
        let page_size = args.page_size.unwrap_or(env_page_size);
        if page_size == 0 || page_size > DEFAULT_PAGE_SIZE {
            anyhow::bail!("page size must be between 1 and {DEFAULT_PAGE_SIZE}, got {page_size}");
        }

        Ok(Self {
            backend: args.backend.unwrap_or(env_backend),
            bucket: args.bucket.or(var("BUCKET")?),
            prefix: args.prefix.or(var("PREFIX")?),
            page_size,
            limit: args.limit,
            json: args.json,
            s3: S3Config {
                region: args.s3_region.unwrap_or(env_region),
                endpoint: args.s3_endpoint.or(var("S3_ENDPOINT")?),
                access_key_id: var("S3_ACCESS_KEY_ID")?,
                secret_access_key: var("S3_SECRET_ACCESS_KEY")?,
                session_token: var("S3_SESSION_TOKEN")?,
                force_path_style: args.s3_force_path_style || env_path_style,
            },
            database_url: args.database_url.unwrap_or(env_db),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
        })
    }
}

/// Parse an optional environment value, falling back to `default` when unset.
fn parse_var<T>(value: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {ENV_PREFIX}{name} value `{value}`")),
        None => Ok(default),
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .field("s3_region", &self.s3.region)
            .field("s3_endpoint", &self.s3.endpoint)
            .field("s3_static_credentials", &self.s3.access_key_id.is_some())
            .field("s3_force_path_style", &self.s3.force_path_style)
            .field("database_url", &self.database_url)
            .field("storage_dir", &self.storage_dir)
            .finish()
    }
}
