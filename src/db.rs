//! Connection pool and table setup.
//!
//! Tables are created on startup when missing; there is no migration history.

use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        hashed_password TEXT NOT NULL
    );"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS ix_users_username ON users (username);",
    "CREATE UNIQUE INDEX IF NOT EXISTS ix_users_email ON users (email);",
    r#"CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        task TEXT NOT NULL,
        is_finished BOOLEAN NOT NULL DEFAULT 0,
        due_date TIMESTAMP NOT NULL,
        created_at TIMESTAMP NOT NULL
    );"#,
    "CREATE INDEX IF NOT EXISTS ix_todos_user_id ON todos (user_id);",
];

/// Open a pool, creating the database file if it does not exist yet.
///
/// Foreign keys are enforced on every connection.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Create both tables and their indexes if absent.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("schema ready");
    Ok(())
}

// A single long-lived connection, since every `:memory:` connection is its
// own empty database
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
