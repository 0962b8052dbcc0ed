use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod extract;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod storage;
mod views;

use services::cloud_file_service::{CloudFileService, TargetRegistry};
use services::lock::LockProvider;
use views::geo::DistanceUnit;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting attachment-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        services::apply_schema(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Storage backend ---
    if cfg.storage_backend != "s3" {
        anyhow::bail!(
            "unsupported storage backend `{}`; only `s3` is available",
            cfg.storage_backend
        );
    }
    let backend = storage::S3Backend::new(
        cfg.s3_bucket.clone(),
        cfg.s3_region.clone(),
        cfg.s3_endpoint.clone(),
    )
    .await;

    // --- Target registry + distance unit ---
    let targets = TargetRegistry::from_spec(&cfg.targets)
        .map_err(|e| anyhow::anyhow!("invalid ATTACHMENT_STORE_TARGETS: {e}"))?;
    let distance_unit = DistanceUnit::parse(&cfg.distance_unit).ok_or_else(|| {
        anyhow::anyhow!("invalid ATTACHMENT_STORE_DISTANCE_UNIT `{}`", cfg.distance_unit)
    })?;

    // --- Initialize core service ---
    let files = CloudFileService::new(db, Arc::new(backend), LockProvider::new(), targets);

    let state = state::AppState {
        files,
        views: Arc::new(views::default_views()),
        distance_unit,
    };

    // --- Build router ---
    let app = routes::routes()
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
