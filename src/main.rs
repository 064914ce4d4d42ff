use anyhow::{Context, Result};
use bucket_iterator::{
    Blobstore, BucketIterator, CatalogClient, DirectoryClient, S3StorageClient,
    services::catalog_client::run_migrations,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tracing_subscriber::EnvFilter;

mod config;

use config::{AppConfig, Backend};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup (stderr, stdout carries the listing) ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-iterator with config: {:?}", cfg);

    // --- Handle migration mode ---
    if migrate {
        let db = open_catalog(&cfg.database_url, true).await?;
        run_migrations(&db)
            .await
            .context("applying catalog schema")?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    let bucket = cfg
        .bucket
        .clone()
        .context("no bucket given (pass it as an argument or set BUCKET_ITERATOR_BUCKET)")?;

    // --- Initialize storage backend ---
    let mut store = build_blobstore(&cfg).await?.with_page_size(cfg.page_size);
    if let Some(prefix) = &cfg.prefix {
        store = store.with_prefix(prefix.clone());
    }

    // --- Iterate ---
    let mut iterator = store.new_bucket_iterator(&bucket).await?;
    let mut listed = 0usize;
    loop {
        if cfg.limit.is_some_and(|limit| listed >= limit) {
            iterator.done();
        }

        let blob = match iterator.next().await {
            Ok(blob) => blob,
            Err(err) if err.is_exhausted() => break,
            Err(err) => {
                return Err(err).with_context(|| format!("listing bucket {}", bucket));
            }
        };

        if cfg.json {
            println!("{}", serde_json::to_string(&blob)?);
        } else {
            println!("{}\t{}", blob.path, blob.checksum.as_deref().unwrap_or("-"));
        }
        listed += 1;
    }

    tracing::info!(
        "Listed {} blobs from bucket {} via {}",
        listed,
        bucket,
        store.name()
    );

    Ok(())
}

/// Construct the configured storage client behind a `Blobstore`.
async fn build_blobstore(cfg: &AppConfig) -> Result<Blobstore> {
    let store = match cfg.backend {
        Backend::S3 => Blobstore::new("s3", S3StorageClient::connect(&cfg.s3).await),
        Backend::Catalog => {
            let db = open_catalog(&cfg.database_url, false).await?;
            Blobstore::new("catalog", CatalogClient::new(Arc::new(db)))
        }
        Backend::Directory => {
            Blobstore::new("directory", DirectoryClient::new(&cfg.storage_dir))
        }
    };
    Ok(store)
}

/// Open the SQLite catalog. With `create`, a missing database file (and its
/// parent directory) is created.
async fn open_catalog(database_url: &str, create: bool) -> Result<SqlitePool> {
    tracing::debug!("Connecting using raw URL => {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database URL `{}`", database_url))?
        .create_if_missing(create);

    if create {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to catalog `{}`", database_url))
}
