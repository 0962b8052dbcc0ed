use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage_backend: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub distance_unit: String,
    pub targets: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cloud file attachment API")]
pub struct Args {
    /// Host to bind to (overrides ATTACHMENT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ATTACHMENT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides ATTACHMENT_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend kind (overrides ATTACHMENT_STORE_STORAGE_BACKEND)
    #[arg(long)]
    pub storage_backend: Option<String>,

    /// S3 bucket name (overrides ATTACHMENT_STORE_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 region (overrides ATTACHMENT_STORE_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint for compatible providers (overrides ATTACHMENT_STORE_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Unit of the `distance` query parameter: meter or mile
    /// (overrides ATTACHMENT_STORE_DISTANCE_UNIT)
    #[arg(long)]
    pub distance_unit: Option<String>,

    /// Registered upload targets, e.g. `app.post.attachments:many,app.profile.avatar:one`
    /// (overrides ATTACHMENT_STORE_TARGETS)
    #[arg(long)]
    pub targets: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("ATTACHMENT_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("ATTACHMENT_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ATTACHMENT_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading ATTACHMENT_STORE_PORT"),
        };
        let env_db = env::var("ATTACHMENT_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/attachment_store.db".into());
        let env_backend =
            env::var("ATTACHMENT_STORE_STORAGE_BACKEND").unwrap_or_else(|_| "s3".into());
        let env_bucket =
            env::var("ATTACHMENT_STORE_S3_BUCKET").unwrap_or_else(|_| "attachments".into());
        let env_region =
            env::var("ATTACHMENT_STORE_S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_endpoint = env::var("ATTACHMENT_STORE_S3_ENDPOINT").ok();
        let env_unit =
            env::var("ATTACHMENT_STORE_DISTANCE_UNIT").unwrap_or_else(|_| "meter".into());
        let env_targets = env::var("ATTACHMENT_STORE_TARGETS").unwrap_or_default();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            storage_backend: args.storage_backend.unwrap_or(env_backend),
            s3_bucket: args.s3_bucket.unwrap_or(env_bucket),
            s3_region: args.s3_region.unwrap_or(env_region),
            s3_endpoint: args.s3_endpoint.or(env_endpoint),
            distance_unit: args.distance_unit.unwrap_or(env_unit),
            targets: args.targets.unwrap_or(env_targets),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
