//! Minimal user and todo HTTP backend on Axum and SQLite.
//!
//! Three operations: register a user (`POST /users/`), add a todo for a user
//! (`POST /todos/`), and list a user's todos (`GET /todos/{user_id}`).

pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod handler;
pub mod model;
pub mod password;
pub mod route;
pub mod schema;
pub mod session;

use sqlx::SqlitePool;

// Struct representing the application state
pub struct AppState {
    pub db: SqlitePool,
}
