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

//! # Scheduled Send Processing
//!
//! Drains the due set: unsent emails whose schedule has passed and whose
//! retry budget is not exhausted. Each record is processed in isolation; a
//! failure is persisted to that record and the batch moves on. Outcomes
//! commit record by record, which is why the operation refuses to run
//! inside an enclosing transaction.
//!
//! Invocations are idempotent: a record is only ever delivered once
//! (`sent` is checked by the due query and stamped immediately after the
//! transport accepts), and repeated invocations of an empty due set do
//! nothing.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::EmailerConfig;
use crate::dal::{ensure_durable, DAL};
use crate::database::universal_types::UniversalTimestamp;
use crate::error::EmailerError;
use crate::models::email::DueEmail;
use crate::observer::ObserverSet;
use crate::render::{extract_subject, TemplateRenderer};
use crate::resolver::RecipientResolver;
use crate::transport::{MailTransport, OutboundMessage};

/// Advisory lock name serializing scheduled sending.
pub const SEND_LOCK_NAME: &str = "send-scheduled-emails";

/// Outcome counts for one send invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Records delivered and stamped sent
    pub sent: usize,
    /// Records whose audience resolved to nobody; untouched
    pub skipped: usize,
    /// Records whose attempt failed and was persisted
    pub failed: usize,
}

/// Processes due email records into outbound deliveries.
pub struct SendProcessor {
    dal: DAL,
    resolver: RecipientResolver,
    renderer: TemplateRenderer,
    transport: Arc<dyn MailTransport>,
    observers: ObserverSet,
    config: EmailerConfig,
}

impl SendProcessor {
    pub fn new(
        dal: DAL,
        resolver: RecipientResolver,
        renderer: TemplateRenderer,
        transport: Arc<dyn MailTransport>,
        observers: ObserverSet,
        config: EmailerConfig,
    ) -> Self {
        Self {
            dal,
            resolver,
            renderer,
            transport,
            observers,
            config,
        }
    }

    /// Sends every due record once.
    ///
    /// Fails fast, before reading the due set, if invoked inside an open
    /// transaction. Returns an empty report when another invocation holds
    /// the send lock.
    pub async fn send_due(&self) -> Result<SendReport, EmailerError> {
        {
            let conn = self.dal.database.get().await?;
            conn.interact(ensure_durable)
                .await
                .map_err(|e| EmailerError::ConnectionPool(e.to_string()))??;
        }

        let Some(token) = self
            .dal
            .lock()
            .try_acquire(SEND_LOCK_NAME, self.config.lock_ttl_seconds)
            .await?
        else {
            debug!("Send lock held elsewhere, skipping");
            return Ok(SendReport::default());
        };

        let result = self.send_locked().await;
        self.dal.lock().release(SEND_LOCK_NAME, token).await?;
        result
    }

    async fn send_locked(&self) -> Result<SendReport, EmailerError> {
        // One processing timestamp for the whole batch: it bounds the due
        // query and is the value stamped into `sent`.
        let now = UniversalTimestamp::now();
        let due = self.dal.email().due(now, self.config.max_tries).await?;
        if due.is_empty() {
            debug!("No due emails");
            return Ok(SendReport::default());
        }

        let mut report = SendReport::default();
        for record in due {
            let email_id = record.email.id;
            match self.process_one(&record, now).await {
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    self.save_email_exception(&record, &err).await;
                }
            }
            debug!(email_id = %email_id, "Processed due email");
        }

        info!(
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "Send batch complete"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        record: &DueEmail,
        now: UniversalTimestamp,
    ) -> Result<Delivery, EmailerError> {
        let email = &record.email;

        let addresses = self.resolver.resolve(email, &record.recipient_ids).await?;
        if addresses.is_empty() {
            // A fully unsubscribed or addressless audience is not a
            // failure; the record stays untouched and out of the retry
            // accounting.
            debug!(email_id = %email.id, "No resolvable recipients, skipping");
            return Ok(Delivery::Skipped);
        }

        let body = self
            .renderer
            .render(&record.template, &email.context, email.view_uid)?;

        let subject = if email.subject.is_empty() {
            extract_subject(body.subject_source())
        } else {
            email.subject.clone()
        };
        let from = email
            .from_address
            .clone()
            .unwrap_or_else(|| self.config.default_from_email.clone());

        let message = OutboundMessage {
            from,
            to: addresses,
            subject,
            text: body.text,
            html: body.html,
        };

        self.observers.notify_pre_send(email, &message).await;
        self.transport.send(message).await?;
        // Stamp immediately so a crash after this point cannot trigger a
        // duplicate delivery on the next invocation.
        self.dal.email().mark_sent(email.id, now).await?;
        self.observers.notify_sent(email).await;

        Ok(Delivery::Sent)
    }

    /// Persists a failed attempt to the record and notifies observers.
    /// Never raises; a failure to persist the failure is only logged.
    async fn save_email_exception(&self, record: &DueEmail, err: &EmailerError) {
        let mut exception = err.to_string();
        if let Some(detail) = err.detail() {
            exception.push('\n');
            exception.push_str(&detail.to_string());
        }

        warn!(
            email_id = %record.email.id,
            num_tries = record.email.num_tries + 1,
            error = %err,
            "Email delivery attempt failed"
        );

        if let Err(persist_err) = self
            .dal
            .email()
            .record_failure(record.email.id, exception.clone())
            .await
        {
            error!(
                email_id = %record.email.id,
                error = %persist_err,
                "Failed to persist delivery failure"
            );
        }

        self.observers.notify_failed(&record.email, &exception).await;
    }
}

enum Delivery {
    Sent,
    Skipped,
}
