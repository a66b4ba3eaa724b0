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

//! SQLite row models.
//!
//! Diesel model definitions using SQLite-compatible types: UUIDs as BLOB
//! (`Vec<u8>`), timestamps as TEXT (RFC3339 strings). Conversions to/from
//! the domain models happen at the DAL boundary.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::*;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::models::email::Email;
use crate::models::template::EmailTemplate;

// ============================================================================
// Conversion helpers
// ============================================================================

/// Convert UUID to SQLite BLOB
pub fn uuid_to_blob(uuid: &Uuid) -> Vec<u8> {
    uuid.as_bytes().to_vec()
}

/// Convert SQLite BLOB to UUID
pub fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, uuid::Error> {
    Uuid::from_slice(blob)
}

/// Convert DateTime<Utc> to RFC3339 string for SQLite storage
pub fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse RFC3339 string from SQLite to DateTime<Utc>
pub fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Current timestamp as RFC3339 string
pub fn current_timestamp_string() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Email Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = emails)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteEmail {
    pub id: Vec<u8>,
    pub view_uid: Vec<u8>,
    pub source: String,
    pub event_uid: Option<String>,
    pub template_id: Vec<u8>,
    pub context: String,
    pub subject: String,
    pub from_address: Option<String>,
    pub recipients_kind: Option<String>,
    pub scheduled: String,
    pub sent: Option<String>,
    pub num_tries: i32,
    pub last_exception: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = emails)]
pub struct NewSqliteEmail {
    pub id: Vec<u8>,
    pub view_uid: Vec<u8>,
    pub source: String,
    pub event_uid: Option<String>,
    pub template_id: Vec<u8>,
    pub context: String,
    pub subject: String,
    pub from_address: Option<String>,
    pub recipients_kind: Option<String>,
    pub scheduled: String,
    pub num_tries: i32,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Email Recipient Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = email_recipients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteEmailRecipient {
    pub email_id: Vec<u8>,
    pub entity_id: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = email_recipients)]
pub struct NewSqliteEmailRecipient {
    pub email_id: Vec<u8>,
    pub entity_id: Vec<u8>,
    pub created_at: String,
}

// ============================================================================
// Email Template Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = email_templates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteEmailTemplate {
    pub id: Vec<u8>,
    pub name: String,
    pub text_path: Option<String>,
    pub text_inline: Option<String>,
    pub html_path: Option<String>,
    pub html_inline: Option<String>,
    pub context_loader: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = email_templates)]
pub struct NewSqliteEmailTemplate {
    pub id: Vec<u8>,
    pub name: String,
    pub text_path: Option<String>,
    pub text_inline: Option<String>,
    pub html_path: Option<String>,
    pub html_inline: Option<String>,
    pub context_loader: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Operation Lock Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = operation_locks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteOperationLock {
    pub name: String,
    pub locked_by: Vec<u8>,
    pub locked_at: String,
    pub expires_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = operation_locks)]
pub struct NewSqliteOperationLock {
    pub name: String,
    pub locked_by: Vec<u8>,
    pub locked_at: String,
    pub expires_at: String,
}

// ============================================================================
// Conversion Implementations: SQLite models <-> Domain models
// ============================================================================

impl From<SqliteEmail> for Email {
    fn from(s: SqliteEmail) -> Self {
        Email {
            id: UniversalUuid(blob_to_uuid(&s.id).expect("Invalid UUID in database")),
            view_uid: UniversalUuid(blob_to_uuid(&s.view_uid).expect("Invalid UUID in database")),
            source: s.source,
            event_uid: s.event_uid,
            template_id: UniversalUuid(
                blob_to_uuid(&s.template_id).expect("Invalid UUID in database"),
            ),
            context: serde_json::from_str(&s.context).expect("Invalid JSON context in database"),
            subject: s.subject,
            from_address: s.from_address,
            recipients_kind: s.recipients_kind,
            scheduled: UniversalTimestamp(
                string_to_datetime(&s.scheduled).expect("Invalid timestamp in database"),
            ),
            sent: s.sent.map(|ts| {
                UniversalTimestamp(string_to_datetime(&ts).expect("Invalid timestamp in database"))
            }),
            num_tries: s.num_tries,
            last_exception: s.last_exception,
            created_at: UniversalTimestamp(
                string_to_datetime(&s.created_at).expect("Invalid timestamp in database"),
            ),
            updated_at: UniversalTimestamp(
                string_to_datetime(&s.updated_at).expect("Invalid timestamp in database"),
            ),
        }
    }
}

impl From<SqliteEmailTemplate> for EmailTemplate {
    fn from(s: SqliteEmailTemplate) -> Self {
        EmailTemplate {
            id: UniversalUuid(blob_to_uuid(&s.id).expect("Invalid UUID in database")),
            name: s.name,
            text_path: s.text_path,
            text_inline: s.text_inline,
            html_path: s.html_path,
            html_inline: s.html_inline,
            context_loader: s.context_loader,
            created_at: UniversalTimestamp(
                string_to_datetime(&s.created_at).expect("Invalid timestamp in database"),
            ),
            updated_at: UniversalTimestamp(
                string_to_datetime(&s.updated_at).expect("Invalid timestamp in database"),
            ),
        }
    }
}
