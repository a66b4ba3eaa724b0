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

//! Data access layer for email records.
//!
//! An email row is written once by the converter (or composition) and
//! thereafter only patched by the send processor: `mark_sent` stamps the
//! delivery time, `record_failure` bumps the retry counter and stores the
//! failure text. Neither touches any other column, so concurrent context
//! edits are never clobbered.

use diesel::prelude::*;

use super::models::{
    current_timestamp_string, uuid_to_blob, NewSqliteEmail, NewSqliteEmailRecipient, SqliteEmail,
    SqliteEmailTemplate,
};
use super::DAL;
use crate::database::schema::{email_recipients, email_templates, emails};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::EmailerError;
use crate::models::email::{DueEmail, Email, NewEmail};

/// Data access layer for email records.
pub struct EmailDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> EmailDAL<'a> {
    /// Creates a new email record together with its candidate recipient set.
    ///
    /// `scheduled: None` means "deliver as soon as possible": the schedule
    /// defaults to the creation timestamp. Duplicate entries in
    /// `recipient_ids` are collapsed.
    pub async fn create(
        &self,
        new_email: NewEmail,
        recipient_ids: Vec<UniversalUuid>,
    ) -> Result<Email, EmailerError> {
        let conn = self.dal.database.get().await?;

        conn.interact(move |conn| {
            conn.immediate_transaction(|conn| {
                let id = UniversalUuid::new_v4();
                let view_uid = UniversalUuid::new_v4();
                let now = current_timestamp_string();
                let scheduled = new_email
                    .scheduled
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| now.clone());

                let row = NewSqliteEmail {
                    id: uuid_to_blob(&id.0),
                    view_uid: uuid_to_blob(&view_uid.0),
                    source: new_email.source,
                    event_uid: new_email.event_uid,
                    template_id: uuid_to_blob(&new_email.template_id.0),
                    context: new_email.context.to_string(),
                    subject: new_email.subject,
                    from_address: new_email.from_address,
                    recipients_kind: new_email.recipients_kind,
                    scheduled,
                    num_tries: 0,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };

                diesel::insert_into(emails::table)
                    .values(&row)
                    .execute(conn)?;

                let mut seen = std::collections::HashSet::new();
                let recipient_rows: Vec<NewSqliteEmailRecipient> = recipient_ids
                    .iter()
                    .filter(|rid| seen.insert(**rid))
                    .map(|rid| NewSqliteEmailRecipient {
                        email_id: uuid_to_blob(&id.0),
                        entity_id: uuid_to_blob(&rid.0),
                        created_at: now.clone(),
                    })
                    .collect();

                if !recipient_rows.is_empty() {
                    diesel::insert_into(email_recipients::table)
                        .values(&recipient_rows)
                        .execute(conn)?;
                }

                let stored: SqliteEmail = emails::table
                    .filter(emails::id.eq(uuid_to_blob(&id.0)))
                    .first(conn)?;

                Ok::<_, EmailerError>(stored.into())
            })
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Creates many email records in a single transaction, each with its
    /// own candidate recipient set.
    ///
    /// Used by bulk conversion: one email per event, addressed to that
    /// event's targets. Duplicate entries within a record's recipient list
    /// are collapsed. Returns the created records in input order.
    pub async fn create_bulk(
        &self,
        new_emails: Vec<(NewEmail, Vec<UniversalUuid>)>,
    ) -> Result<Vec<Email>, EmailerError> {
        let conn = self.dal.database.get().await?;

        conn.interact(move |conn| {
            conn.immediate_transaction(|conn| {
                let now = current_timestamp_string();

                let mut created = Vec::with_capacity(new_emails.len());
                for (new_email, recipient_ids) in new_emails {
                    let id = UniversalUuid::new_v4();
                    let view_uid = UniversalUuid::new_v4();
                    let scheduled = new_email
                        .scheduled
                        .map(|ts| ts.to_rfc3339())
                        .unwrap_or_else(|| now.clone());

                    let row = NewSqliteEmail {
                        id: uuid_to_blob(&id.0),
                        view_uid: uuid_to_blob(&view_uid.0),
                        source: new_email.source,
                        event_uid: new_email.event_uid,
                        template_id: uuid_to_blob(&new_email.template_id.0),
                        context: new_email.context.to_string(),
                        subject: new_email.subject,
                        from_address: new_email.from_address,
                        recipients_kind: new_email.recipients_kind,
                        scheduled,
                        num_tries: 0,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };

                    diesel::insert_into(emails::table)
                        .values(&row)
                        .execute(conn)?;

                    let mut seen = std::collections::HashSet::new();
                    let recipient_rows: Vec<NewSqliteEmailRecipient> = recipient_ids
                        .iter()
                        .filter(|rid| seen.insert(**rid))
                        .map(|rid| NewSqliteEmailRecipient {
                            email_id: uuid_to_blob(&id.0),
                            entity_id: uuid_to_blob(&rid.0),
                            created_at: now.clone(),
                        })
                        .collect();

                    if !recipient_rows.is_empty() {
                        diesel::insert_into(email_recipients::table)
                            .values(&recipient_rows)
                            .execute(conn)?;
                    }

                    let stored: SqliteEmail = emails::table
                        .filter(emails::id.eq(uuid_to_blob(&id.0)))
                        .first(conn)?;
                    created.push(stored.into());
                }

                Ok::<_, EmailerError>(created)
            })
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Retrieves an email by its primary id.
    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<Email, EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&id.0);

        conn.interact(move |conn| {
            let row: SqliteEmail = emails::table.filter(emails::id.eq(blob)).first(conn)?;
            Ok::<_, EmailerError>(row.into())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Retrieves an email by its external view token.
    pub async fn get_by_view_uid(&self, view_uid: UniversalUuid) -> Result<Email, EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&view_uid.0);

        conn.interact(move |conn| {
            let row: SqliteEmail = emails::table
                .filter(emails::view_uid.eq(blob))
                .first(conn)?;
            Ok::<_, EmailerError>(row.into())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Returns the candidate recipient entity ids for an email.
    pub async fn recipient_ids(
        &self,
        email_id: UniversalUuid,
    ) -> Result<Vec<UniversalUuid>, EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&email_id.0);

        conn.interact(move |conn| {
            let blobs: Vec<Vec<u8>> = email_recipients::table
                .filter(email_recipients::email_id.eq(blob))
                .select(email_recipients::entity_id)
                .order(email_recipients::entity_id.asc())
                .load(conn)?;

            let ids = blobs
                .iter()
                .map(|b| {
                    UniversalUuid::from_bytes(b)
                        .map_err(|_| EmailerError::Validation("invalid recipient id".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, EmailerError>(ids)
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Selects the due set: unsent emails scheduled at or before `now` with
    /// fewer than `max_tries` failed attempts.
    ///
    /// Recipient ids and the template definition are loaded eagerly so
    /// per-record processing never goes back to the database for reads.
    /// Ordered by schedule time, oldest first, with the id as tiebreaker
    /// so the ordering is stable.
    pub async fn due(
        &self,
        now: UniversalTimestamp,
        max_tries: u32,
    ) -> Result<Vec<DueEmail>, EmailerError> {
        let conn = self.dal.database.get().await?;
        let cutoff = now.to_rfc3339();

        conn.interact(move |conn| {
            let rows: Vec<SqliteEmail> = emails::table
                .filter(emails::sent.is_null())
                .filter(emails::scheduled.le(cutoff))
                .filter(emails::num_tries.lt(max_tries as i32))
                .order((emails::scheduled.asc(), emails::id.asc()))
                .load(conn)?;

            if rows.is_empty() {
                return Ok::<_, EmailerError>(Vec::new());
            }

            let email_ids: Vec<Vec<u8>> = rows.iter().map(|r| r.id.clone()).collect();
            let template_ids: Vec<Vec<u8>> = rows.iter().map(|r| r.template_id.clone()).collect();

            let recipient_rows: Vec<(Vec<u8>, Vec<u8>)> = email_recipients::table
                .filter(email_recipients::email_id.eq_any(&email_ids))
                .select((email_recipients::email_id, email_recipients::entity_id))
                .order(email_recipients::entity_id.asc())
                .load(conn)?;

            let mut recipients_by_email: std::collections::HashMap<Vec<u8>, Vec<UniversalUuid>> =
                std::collections::HashMap::new();
            for (email_id, entity_id) in recipient_rows {
                let id = UniversalUuid::from_bytes(&entity_id)
                    .map_err(|_| EmailerError::Validation("invalid recipient id".to_string()))?;
                recipients_by_email.entry(email_id).or_default().push(id);
            }

            let template_rows: Vec<SqliteEmailTemplate> = email_templates::table
                .filter(email_templates::id.eq_any(&template_ids))
                .load(conn)?;
            let templates_by_id: std::collections::HashMap<Vec<u8>, SqliteEmailTemplate> =
                template_rows.into_iter().map(|t| (t.id.clone(), t)).collect();

            let mut due = Vec::with_capacity(rows.len());
            for row in rows {
                let template = templates_by_id.get(&row.template_id).ok_or_else(|| {
                    EmailerError::Validation(format!(
                        "email references missing template: {:?}",
                        row.template_id
                    ))
                })?;
                let recipient_ids = recipients_by_email.remove(&row.id).unwrap_or_default();
                due.push(DueEmail {
                    template: template.clone().into(),
                    recipient_ids,
                    email: row.into(),
                });
            }

            Ok::<_, EmailerError>(due)
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Marks an email as delivered at `sent_at`.
    ///
    /// Partial update touching only `sent` and `updated_at`.
    pub async fn mark_sent(
        &self,
        id: UniversalUuid,
        sent_at: UniversalTimestamp,
    ) -> Result<(), EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&id.0);

        conn.interact(move |conn| {
            diesel::update(emails::table.filter(emails::id.eq(blob)))
                .set((
                    emails::sent.eq(Some(sent_at.to_rfc3339())),
                    emails::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)?;
            Ok::<_, EmailerError>(())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Records a failed delivery attempt: increments the retry counter and
    /// stores the failure text.
    ///
    /// Partial update touching only `num_tries`, `last_exception` and
    /// `updated_at`. The increment happens in SQL so concurrent processors
    /// cannot lose an attempt.
    pub async fn record_failure(
        &self,
        id: UniversalUuid,
        exception: String,
    ) -> Result<(), EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&id.0);

        conn.interact(move |conn| {
            diesel::update(emails::table.filter(emails::id.eq(blob)))
                .set((
                    emails::num_tries.eq(emails::num_tries + 1),
                    emails::last_exception.eq(Some(exception)),
                    emails::updated_at.eq(current_timestamp_string()),
                ))
                .execute(conn)?;
            Ok::<_, EmailerError>(())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Returns whether an email for the given event has already been created.
    pub async fn exists_for_event(&self, event_uid: &str) -> Result<bool, EmailerError> {
        let conn = self.dal.database.get().await?;
        let event_uid = event_uid.to_string();

        conn.interact(move |conn| {
            let count: i64 = emails::table
                .filter(emails::event_uid.eq(event_uid))
                .count()
                .get_result(conn)?;
            Ok::<_, EmailerError>(count > 0)
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }
}
