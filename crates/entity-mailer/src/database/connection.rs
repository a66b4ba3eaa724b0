/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! SQLite connection management.
//!
//! Provides an async connection pool built on `deadpool-diesel`. SQLite has
//! limited concurrent write support even with WAL mode, so the pool is sized
//! to a single connection; WAL and a generous busy_timeout are configured
//! before migrations run.
//!
//! # Example
//!
//! ```rust,ignore
//! use entity_mailer::database::Database;
//!
//! let db = Database::new("path/to/emailer.db");
//! db.run_migrations().await?;
//! ```

use deadpool_diesel::sqlite::{Manager, Pool, Runtime};
use tracing::info;

use crate::error::EmailerError;

/// A pooled connection checked out from the [`Database`].
pub type PooledConnection = deadpool::managed::Object<Manager>;

/// Thread-safe handle to the SQLite connection pool.
///
/// `Database` is `Clone`; each clone references the same underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Database(sqlite)")
    }
}

impl Database {
    /// Creates a new connection pool.
    ///
    /// Accepts a file path, `:memory:`, a `file:` URI, or a `sqlite://`
    /// prefixed path.
    ///
    /// # Panics
    ///
    /// Panics if the connection pool cannot be created.
    pub fn new(connection_string: &str) -> Self {
        let connection_url = Self::build_sqlite_url(connection_string);
        let manager = Manager::new(connection_url, Runtime::Tokio1);
        // A single connection avoids "database is locked" errors under
        // concurrent writers.
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .expect("Failed to create SQLite connection pool");

        info!("SQLite connection pool initialized (size: 1)");

        Self { pool }
    }

    /// Checks a connection out of the pool.
    pub async fn get(&self) -> Result<PooledConnection, EmailerError> {
        self.pool
            .get()
            .await
            .map_err(|e| EmailerError::ConnectionPool(e.to_string()))
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Builds a SQLite connection URL.
    fn build_sqlite_url(connection_string: &str) -> String {
        // Strip sqlite:// prefix if present
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs pending database migrations.
    pub async fn run_migrations(&self) -> Result<(), EmailerError> {
        use diesel_migrations::MigrationHarness;

        let conn = self.get().await?;
        conn.interact(|conn| {
            use diesel::prelude::*;

            // WAL mode allows concurrent reads during writes
            diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
            // busy_timeout makes SQLite wait 30s instead of immediately failing on locks
            diesel::sql_query("PRAGMA busy_timeout=30000;").execute(conn)?;

            conn.run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                .map_err(|e| EmailerError::Configuration(format!("migrations failed: {}", e)))?;
            Ok::<_, EmailerError>(())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))??;

        info!("Database migrations complete");
        Ok(())
    }
}
