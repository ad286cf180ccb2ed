//! Connection lifecycle.
//!
//! The server keeps exactly one Postgres session. It is opened lazily on the
//! first statement, reused by every tool call, and closed once on shutdown.
//! Calls are serialized through an async mutex; a statement issued after the
//! session was lost or closed opens a fresh one.

use crate::config::ConnectionConfig;
use crate::db::executor::run_statement;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, RawQueryResult};
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use std::future::Future;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Anything that can run a statement and hand back its native result.
///
/// Tool handlers depend on this rather than on a live connection.
pub trait QueryRunner: Send + Sync {
    fn run_query(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = DbResult<RawQueryResult>> + Send;
}

pub struct ConnectionManager {
    options: PgConnectOptions,
    connection: Mutex<Option<PgConnection>>,
}

impl ConnectionManager {
    /// Create a manager for the given target. No connection is opened yet.
    pub fn new(config: &ConnectionConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        Self {
            options,
            connection: Mutex::new(None),
        }
    }

    /// Borrow the session, connecting first if there is none.
    pub async fn get_connection(&self) -> DbResult<MappedMutexGuard<'_, PgConnection>> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            info!(
                host = %self.options.get_host(),
                port = self.options.get_port(),
                database = ?self.options.get_database(),
                "Connecting to PostgreSQL"
            );
            let conn = PgConnection::connect_with(&self.options).await?;
            *guard = Some(conn);
        }

        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| DbError::Unknown)
    }

    /// Whether a session is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Close the session if one is open. Safe to call more than once.
    pub async fn shutdown(&self) -> DbResult<()> {
        let conn = self.connection.lock().await.take();
        match conn {
            Some(conn) => {
                info!("Closing PostgreSQL connection");
                conn.close().await?;
                Ok(())
            }
            None => {
                debug!("No PostgreSQL connection to close");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("database", &self.options.get_database())
            .finish()
    }
}

impl QueryRunner for ConnectionManager {
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> DbResult<RawQueryResult> {
        let mut conn = self.get_connection().await?;
        let result = run_statement(&mut conn, sql, params).await;

        if let Err(e) = &result {
            // A dead socket surfaces as a non-database error; drop it so the
            // next call reconnects.
            if e.sql_state().is_none() && conn.ping().await.is_err() {
                warn!("PostgreSQL connection lost, discarding session");
                drop(conn);
                self.connection.lock().await.take();
            }
        }

        result
    }
}
