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

//! # Data Access Layer (DAL)
//!
//! This module provides the data access layer for the mailer's persistent
//! state: email records, their recipient lists, named templates, and the
//! advisory locks that serialize the batch operations.
//!
//! ## Architecture
//!
//! The DAL is organized around a central [`DAL`] struct that provides access
//! to entity-specific DAL instances:
//!
//! - [`EmailDAL`]: Email record lifecycle (create, due-selection, mark sent,
//!   record failures)
//! - [`TemplateDAL`]: Named email templates
//! - [`LockDAL`]: Named advisory locks for exclusive batch operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entity_mailer::dal::DAL;
//! use entity_mailer::database::Database;
//!
//! let database = Database::new("emails.db");
//! let dal = DAL::new(database);
//!
//! let due = dal.email().due(now, 3).await?;
//! ```

pub mod email;
pub mod lock;
pub mod models;
pub mod template;

pub use email::EmailDAL;
pub use lock::LockDAL;
pub use template::TemplateDAL;

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::sqlite::SqliteConnection;

use crate::database::Database;
use crate::error::EmailerError;

/// Central data access layer providing access to entity-specific DALs.
#[derive(Clone)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    /// Creates a new DAL instance with the given database.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Returns an EmailDAL instance for email record operations.
    pub fn email(&self) -> EmailDAL {
        EmailDAL { dal: self }
    }

    /// Returns a TemplateDAL instance for template operations.
    pub fn template(&self) -> TemplateDAL {
        TemplateDAL { dal: self }
    }

    /// Returns a LockDAL instance for advisory lock operations.
    pub fn lock(&self) -> LockDAL {
        LockDAL { dal: self }
    }
}

/// Fails if the connection is currently inside an explicit transaction.
///
/// Send processing commits each record's outcome independently so that a
/// crash mid-batch loses at most the record in flight. Running the batch
/// inside an outer transaction would silently void that guarantee, so it
/// is rejected up front.
pub fn ensure_durable(conn: &mut SqliteConnection) -> Result<(), EmailerError> {
    let status = AnsiTransactionManager::transaction_manager_status_mut(conn);
    match status.transaction_depth() {
        Ok(Some(_)) => Err(EmailerError::NestedTransaction),
        _ => Ok(()),
    }
}
