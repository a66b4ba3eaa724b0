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

//! Send lifecycle observers.
//!
//! Observers see each email as it moves through the send processor: before
//! delivery, after a successful delivery, and after a failed attempt. An
//! observer returning an error is logged and otherwise ignored; side
//! channels never affect delivery outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::models::email::Email;
use crate::transport::OutboundMessage;

/// Hook into the send lifecycle.
///
/// All methods default to no-ops so implementations only override the
/// stages they care about.
#[async_trait]
pub trait EmailObserver: Send + Sync {
    /// Called after a message has been assembled, before the transport
    /// sees it.
    async fn pre_send(&self, _email: &Email, _message: &OutboundMessage) -> Result<(), String> {
        Ok(())
    }

    /// Called after a delivery attempt completed without raising.
    async fn email_sent(&self, _email: &Email) -> Result<(), String> {
        Ok(())
    }

    /// Called after a delivery attempt failed; `exception` is the text
    /// persisted to the email record.
    async fn email_failed(&self, _email: &Email, _exception: &str) -> Result<(), String> {
        Ok(())
    }
}

/// The registered observers, notified in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn EmailObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn EmailObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub async fn notify_pre_send(&self, email: &Email, message: &OutboundMessage) {
        for observer in &self.observers {
            if let Err(message_text) = observer.pre_send(email, message).await {
                warn!(email_id = %email.id, error = %message_text, "pre_send observer failed");
            }
        }
    }

    pub async fn notify_sent(&self, email: &Email) {
        for observer in &self.observers {
            if let Err(message_text) = observer.email_sent(email).await {
                warn!(email_id = %email.id, error = %message_text, "email_sent observer failed");
            }
        }
    }

    pub async fn notify_failed(&self, email: &Email, exception: &str) {
        for observer in &self.observers {
            if let Err(message_text) = observer.email_failed(email, exception).await {
                warn!(email_id = %email.id, error = %message_text, "email_failed observer failed");
            }
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObserverSet({} observers)", self.observers.len())
    }
}
