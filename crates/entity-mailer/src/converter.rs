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

//! # Event Conversion
//!
//! Drains unseen events from the medium and materializes one email record
//! per event. The fetch marks events seen atomically, and the whole
//! operation runs under a named advisory lock, so each event is converted
//! exactly once even with overlapping invocations.
//!
//! A malformed event (no template name, unknown template) is logged and
//! skipped; it was already marked seen, so it will not be retried. That
//! matches the failure posture of the send side: one bad record never
//! stalls the batch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EmailerConfig;
use crate::dal::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::EmailerError;
use crate::medium::{Entity, Event, Medium};
use crate::models::email::{Email, NewEmail};

/// Advisory lock name serializing event conversion.
pub const CONVERT_LOCK_NAME: &str = "convert-events-to-emails";

/// Event context key naming the template to render with.
pub const CONTEXT_KEY_TEMPLATE: &str = "template";
/// Event context key carrying an explicit subject.
pub const CONTEXT_KEY_SUBJECT: &str = "subject";
/// Event context key overriding the from-address.
pub const CONTEXT_KEY_FROM_ADDRESS: &str = "from_address";
/// Event context key scheduling delivery for a later time (RFC3339).
pub const CONTEXT_KEY_SCHEDULED: &str = "scheduled";
/// Event context key requesting group fan-out by sub-entity kind.
pub const CONTEXT_KEY_RECIPIENTS_KIND: &str = "recipients_kind";

/// Converts pending medium events into email records.
pub struct EventConverter {
    dal: DAL,
    medium: Arc<dyn Medium>,
    config: EmailerConfig,
}

impl EventConverter {
    pub fn new(dal: DAL, medium: Arc<dyn Medium>, config: EmailerConfig) -> Self {
        Self {
            dal,
            medium,
            config,
        }
    }

    /// Converts all unseen events, one email record per event.
    ///
    /// Returns the created records. Returns an empty set without touching
    /// the medium when another invocation holds the conversion lock.
    pub async fn convert_pending(&self) -> Result<Vec<Email>, EmailerError> {
        let Some(token) = self
            .dal
            .lock()
            .try_acquire(CONVERT_LOCK_NAME, self.config.lock_ttl_seconds)
            .await?
        else {
            debug!("Conversion lock held elsewhere, skipping");
            return Ok(Vec::new());
        };

        let result = self.convert_locked().await;
        // The lock must come off even when conversion failed part-way.
        self.dal.lock().release(CONVERT_LOCK_NAME, token).await?;
        result
    }

    async fn convert_locked(&self) -> Result<Vec<Email>, EmailerError> {
        let batches = self
            .medium
            .events_targets(&self.config.medium_name, false, true)
            .await?;
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for (event, targets) in batches {
            if self.dal.email().exists_for_event(&event.uid).await? {
                debug!(event_uid = %event.uid, "Event already converted, skipping");
                continue;
            }

            let Some(new_email) = self.prepare(&event).await? else {
                continue;
            };

            let recipient_ids: Vec<UniversalUuid> =
                targets.iter().map(|entity| entity.id).collect();
            let email = self
                .dal
                .email()
                .create(new_email, recipient_ids)
                .await?;
            debug!(event_uid = %event.uid, email_id = %email.id, "Converted event to email");
            created.push(email);
        }

        info!(count = created.len(), "Event conversion complete");
        Ok(created)
    }

    /// Converts all unseen events in a single database transaction.
    ///
    /// Throughput variant of [`convert_pending`](Self::convert_pending)
    /// for high event volume: one email per event with that event's own
    /// targets, written as one batch instead of one transaction each.
    pub async fn convert_pending_bulk(&self) -> Result<Vec<Email>, EmailerError> {
        let Some(token) = self
            .dal
            .lock()
            .try_acquire(CONVERT_LOCK_NAME, self.config.lock_ttl_seconds)
            .await?
        else {
            debug!("Conversion lock held elsewhere, skipping");
            return Ok(Vec::new());
        };

        let result = self.convert_bulk_locked().await;
        self.dal.lock().release(CONVERT_LOCK_NAME, token).await?;
        result
    }

    async fn convert_bulk_locked(&self) -> Result<Vec<Email>, EmailerError> {
        let batches = self
            .medium
            .events_targets(&self.config.medium_name, false, true)
            .await?;
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let mut new_emails: Vec<(NewEmail, Vec<UniversalUuid>)> = Vec::new();
        for (event, targets) in &batches {
            if self.dal.email().exists_for_event(&event.uid).await? {
                debug!(event_uid = %event.uid, "Event already converted, skipping");
                continue;
            }
            let Some(new_email) = self.prepare(event).await? else {
                continue;
            };
            let recipient_ids = targets.iter().map(|entity: &Entity| entity.id).collect();
            new_emails.push((new_email, recipient_ids));
        }

        if new_emails.is_empty() {
            return Ok(Vec::new());
        }

        let created = self.dal.email().create_bulk(new_emails).await?;
        info!(count = created.len(), "Bulk event conversion complete");
        Ok(created)
    }

    /// Maps an event's context onto a new email record. Returns `Ok(None)`
    /// for events that cannot produce a well-formed record.
    async fn prepare(&self, event: &Event) -> Result<Option<NewEmail>, EmailerError> {
        let template_name = match event
            .context
            .get(CONTEXT_KEY_TEMPLATE)
            .and_then(|v| v.as_str())
        {
            Some(name) => name,
            None => {
                warn!(event_uid = %event.uid, "Event names no template, skipping");
                return Ok(None);
            }
        };

        let Some(template) = self.dal.template().get_by_name(template_name).await? else {
            warn!(
                event_uid = %event.uid,
                template = template_name,
                "Event names an unknown template, skipping"
            );
            return Ok(None);
        };

        Ok(Some(NewEmail {
            source: event.source.clone(),
            event_uid: Some(event.uid.clone()),
            template_id: template.id,
            context: event.context.clone(),
            subject: event
                .context
                .get(CONTEXT_KEY_SUBJECT)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            from_address: event
                .context
                .get(CONTEXT_KEY_FROM_ADDRESS)
                .and_then(|v| v.as_str())
                .map(str::to_string),
            recipients_kind: event
                .context
                .get(CONTEXT_KEY_RECIPIENTS_KIND)
                .and_then(|v| v.as_str())
                .map(str::to_string),
            scheduled: self.parse_scheduled(event),
        }))
    }

    fn parse_scheduled(&self, event: &Event) -> Option<UniversalTimestamp> {
        let raw = event
            .context
            .get(CONTEXT_KEY_SCHEDULED)
            .and_then(|v| v.as_str())?;
        match UniversalTimestamp::from_rfc3339(raw) {
            Ok(ts) => Some(ts),
            Err(_) => {
                warn!(
                    event_uid = %event.uid,
                    scheduled = raw,
                    "Unparseable schedule, delivering immediately"
                );
                None
            }
        }
    }
}
