pub mod cloud_file_service;
pub mod lock;

use sqlx::SqlitePool;

/// Embedded schema, executed statement by statement.
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Apply the embedded schema. Used by `--migrate` and by tests against
/// in-memory databases.
pub async fn apply_schema(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
