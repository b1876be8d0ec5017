//! Per-request database session.
//!
//! A handler that takes [`DbSession`] gets one pooled connection for the whole
//! request. The connection goes back to the pool when the session is dropped,
//! which happens once the handler returns, whether it succeeded, was rejected
//! by a later extractor, or failed. Nothing is rolled back explicitly: a
//! transaction that was never committed is discarded when it is dropped.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::{pool::PoolConnection, Connection, Sqlite, SqliteConnection, Transaction};

use crate::{error::AppError, AppState};

pub struct DbSession {
    conn: PoolConnection<Sqlite>,
}

impl DbSession {
    pub async fn acquire(state: &AppState) -> Result<Self, AppError> {
        let conn = state.db.acquire().await?;
        tracing::trace!("session opened");
        Ok(Self { conn })
    }

    /// Start a unit of work on this session's connection.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`) so concurrent
    /// writers queue on the busy timeout instead of failing when a read lock
    /// cannot be upgraded.
    pub async fn begin(&mut self) -> Result<Transaction<'_, Sqlite>, AppError> {
        Ok(Connection::begin_with(&mut *self.conn, "BEGIN IMMEDIATE").await?)
    }
}

impl Deref for DbSession {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for DbSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        tracing::trace!("session closed");
    }
}

impl FromRequestParts<Arc<AppState>> for DbSession {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Self::acquire(state).await
    }
}
