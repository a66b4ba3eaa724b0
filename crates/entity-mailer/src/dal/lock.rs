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

//! Named advisory locks.
//!
//! The two batch operations (event conversion and scheduled sending) must
//! each run at most once at a time across all processes sharing a database.
//! A lock is a row keyed by operation name; acquisition is a conditional
//! insert, so exactly one contender wins. Locks carry a TTL so a crashed
//! holder cannot wedge the operation forever.

use chrono::Duration;
use diesel::prelude::*;

use super::models::{uuid_to_blob, NewSqliteOperationLock};
use super::DAL;
use crate::database::schema::operation_locks;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::EmailerError;

/// Data access layer for named advisory locks.
pub struct LockDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> LockDAL<'a> {
    /// Attempts to acquire the named lock for `ttl_seconds`.
    ///
    /// Returns a holder token on success, `None` if another live holder
    /// has the lock. An expired lock is reaped in the same transaction as
    /// the acquisition attempt, so stale holders cannot block forever.
    pub async fn try_acquire(
        &self,
        name: &str,
        ttl_seconds: u64,
    ) -> Result<Option<UniversalUuid>, EmailerError> {
        let conn = self.dal.database.get().await?;
        let name = name.to_string();

        conn.interact(move |conn| {
            conn.immediate_transaction(|conn| {
                let now = UniversalTimestamp::now();
                let token = UniversalUuid::new_v4();

                // Reap an expired holder first so the insert below can win.
                diesel::delete(
                    operation_locks::table
                        .filter(operation_locks::name.eq(&name))
                        .filter(operation_locks::expires_at.le(now.to_rfc3339())),
                )
                .execute(conn)?;

                let row = NewSqliteOperationLock {
                    name: name.clone(),
                    locked_by: uuid_to_blob(&token.0),
                    locked_at: now.to_rfc3339(),
                    expires_at: UniversalTimestamp(
                        now.0 + Duration::seconds(ttl_seconds as i64),
                    )
                    .to_rfc3339(),
                };

                let inserted = diesel::insert_into(operation_locks::table)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(conn)?;

                Ok::<_, EmailerError>(if inserted == 1 { Some(token) } else { None })
            })
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Releases the named lock if the caller still holds it.
    ///
    /// Releasing a lock that has already expired and been taken over by
    /// another holder is a no-op.
    pub async fn release(&self, name: &str, token: UniversalUuid) -> Result<(), EmailerError> {
        let conn = self.dal.database.get().await?;
        let name = name.to_string();
        let blob = uuid_to_blob(&token.0);

        conn.interact(move |conn| {
            diesel::delete(
                operation_locks::table
                    .filter(operation_locks::name.eq(name))
                    .filter(operation_locks::locked_by.eq(blob)),
            )
            .execute(conn)?;
            Ok::<_, EmailerError>(())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }
}
