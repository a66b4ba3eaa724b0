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

//! Email Model
//!
//! A scheduled unit of outbound correspondence. Created by the event
//! converter (or administrative composition), mutated only by the send
//! processor, never deleted by the core.

use serde::{Deserialize, Serialize};

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};

/// An email record as stored in the `emails` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Durable unique identifier
    pub id: UniversalUuid,
    /// Externally-facing opaque token for browser preview / unsubscribe
    /// links; never the primary id
    pub view_uid: UniversalUuid,
    /// Source identity of the originating event (signal sender tag,
    /// subscription scoping)
    pub source: String,
    /// External identity of the originating event, when known
    pub event_uid: Option<String>,
    /// Template definition this email renders with
    pub template_id: UniversalUuid,
    /// Snapshot of the event context the email renders against
    pub context: serde_json::Value,
    /// Subject line; empty means "derive from rendered HTML at send time"
    pub subject: String,
    /// Per-email from-address override; falls back to the configured default
    pub from_address: Option<String>,
    /// Group fan-out kind marker. `None` sends to the exact direct
    /// recipients; `Some(kind)` expands each recipient to its sub-entities
    /// of that kind.
    pub recipients_kind: Option<String>,
    /// When the email becomes eligible for delivery
    pub scheduled: UniversalTimestamp,
    /// Set exactly once, when a delivery attempt completed without raising
    pub sent: Option<UniversalTimestamp>,
    /// Failed delivery attempts so far; only ever increases
    pub num_tries: i32,
    /// Formatted text of the most recent delivery failure
    pub last_exception: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl Email {
    /// Whether this record is still eligible for (re)delivery at `now`.
    pub fn is_due(&self, now: UniversalTimestamp, max_tries: u32) -> bool {
        self.sent.is_none() && self.scheduled <= now && (self.num_tries as u32) < max_tries
    }
}

/// Fields for creating a new email record.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub source: String,
    pub event_uid: Option<String>,
    pub template_id: UniversalUuid,
    pub context: serde_json::Value,
    pub subject: String,
    pub from_address: Option<String>,
    pub recipients_kind: Option<String>,
    /// `None` schedules the email for immediate delivery (creation time)
    pub scheduled: Option<UniversalTimestamp>,
}

/// An email together with its eagerly-loaded candidate recipients and
/// template definition, as selected by the due-set query.
#[derive(Debug, Clone)]
pub struct DueEmail {
    pub email: Email,
    /// Candidate recipient entity ids (pre-filter audience)
    pub recipient_ids: Vec<UniversalUuid>,
    pub template: super::template::EmailTemplate,
}
