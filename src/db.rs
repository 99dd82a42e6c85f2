//! SQLite pool setup, embedded schema and constraint-error helpers.

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr};

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open the pool, creating the database file and its parent directory.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.starts_with(':') {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
}

/// Single-connection in-memory pool with the schema applied.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = INIT_SQL
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

/// Return true if the error is a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation()
                || db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Column that tripped a unique constraint, e.g. `slug` for
/// `UNIQUE constraint failed: categories.slug`.
pub fn unique_violation_column(err: &sqlx::Error) -> Option<String> {
    if !is_unique_violation(err) {
        return None;
    }
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    let message = db_err.message();
    let columns = message.split_once("failed:").map(|(_, rest)| rest)?;
    columns
        .split(',')
        .next()
        .map(str::trim)
        .and_then(|qualified| qualified.rsplit('.').next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["categories", "products", "upload_assets"]);
    }

    #[tokio::test]
    async fn unique_violation_reports_column() {
        let pool = memory_pool().await.unwrap();
        let insert = "INSERT INTO categories (id, slug, name, card_image, created_at, updated_at)
                      VALUES (?, 'chains', 'Chains', '', '2026-01-01', '2026-01-01')";
        sqlx::query(insert)
            .bind(uuid::Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap();
        let err = sqlx::query(insert)
            .bind(uuid::Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert_eq!(unique_violation_column(&err).as_deref(), Some("slug"));
        assert_eq!(unique_violation_column(&sqlx::Error::RowNotFound), None);
    }
}
