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

//! # Outbound Mail Transport
//!
//! The send processor hands a provider-neutral [`OutboundMessage`] to a
//! [`MailTransport`]. Message shape follows the content channels: text only
//! gives a plain message, HTML only gives an HTML message, both give a
//! multipart/alternative message with the plain part first.

pub mod smtp;

pub use smtp::{SmtpConfig, SmtpMailer};

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::Message;

use crate::error::TransportError;

/// A fully-assembled outbound email, independent of any provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

impl OutboundMessage {
    /// Builds the provider message.
    ///
    /// Fails on unparseable addresses or an empty body (a template that
    /// passed shape validation always yields at least one channel).
    pub fn into_lettre(self) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .subject(self.subject);
        for recipient in &self.to {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let message = match (self.text, self.html) {
            (Some(text), Some(html)) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))?
            }
            (Some(text), None) => builder.singlepart(SinglePart::plain(text))?,
            (None, Some(html)) => builder.singlepart(SinglePart::html(html))?,
            (None, None) => {
                return Err(TransportError::Rejected {
                    message: "message has no body in either channel".to_string(),
                    detail: None,
                })
            }
        };

        Ok(message)
    }
}

/// Delivery seam between the send processor and the mail provider.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Delivers one message. An `Err` counts as a failed attempt for the
    /// email record being processed.
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}
