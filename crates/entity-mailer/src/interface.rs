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

//! # Public Facade
//!
//! [`EntityMailer`] wires the pipeline together behind a small surface:
//! convert pending events, send due emails, render an email for browser
//! viewing, and compose one-off administrative emails. Construction takes
//! the three external seams (database, medium, transport) plus the
//! resolved configuration; observers and context loaders are registered
//! before the first operation runs.

use std::sync::Arc;

use tracing::info;

use crate::config::EmailerConfig;
use crate::converter::EventConverter;
use crate::dal::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::database::Database;
use crate::error::EmailerError;
use crate::medium::Medium;
use crate::models::email::{Email, NewEmail};
use crate::models::template::{EmailTemplate, NewEmailTemplate};
use crate::observer::{EmailObserver, ObserverSet};
use crate::processor::{SendProcessor, SendReport};
use crate::render::{extract_subject, ContextLoaderRegistry, TemplateRenderer};
use crate::resolver::RecipientResolver;
use crate::transport::MailTransport;

/// A rendered email as shown by the browser-view endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

/// An administratively composed email: raw HTML body, explicit subject
/// and audience, no triggering event.
#[derive(Debug, Clone)]
pub struct ComposedEmail {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<UniversalUuid>,
    /// `None` delivers on the next send run
    pub scheduled: Option<UniversalTimestamp>,
    pub from_address: Option<String>,
    /// Set to fan composed email out over groups
    pub recipients_kind: Option<String>,
}

/// Entry point tying the conversion, rendering, resolution and delivery
/// components together.
pub struct EntityMailer {
    dal: DAL,
    medium: Arc<dyn Medium>,
    transport: Arc<dyn MailTransport>,
    config: EmailerConfig,
    observers: ObserverSet,
    loaders: ContextLoaderRegistry,
}

impl EntityMailer {
    pub fn new(
        database: Database,
        medium: Arc<dyn Medium>,
        transport: Arc<dyn MailTransport>,
        config: EmailerConfig,
    ) -> Self {
        Self {
            dal: DAL::new(database),
            medium,
            transport,
            config,
            observers: ObserverSet::new(),
            loaders: ContextLoaderRegistry::new(),
        }
    }

    /// Runs migrations and makes sure the administrative template exists.
    pub async fn initialize(&self) -> Result<(), EmailerError> {
        self.dal.database.run_migrations().await?;
        self.ensure_admin_template().await?;
        info!("Entity mailer initialized");
        Ok(())
    }

    /// Registers a send lifecycle observer. Must happen before operations
    /// start.
    pub fn register_observer(&mut self, observer: Arc<dyn EmailObserver>) {
        self.observers.register(observer);
    }

    /// Registers a context loader under `name`. Must happen before
    /// operations start.
    pub fn register_context_loader<F>(&mut self, name: &str, loader: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.loaders.register(name, loader);
    }

    /// Converts all unseen medium events into email records.
    pub async fn convert_events_to_emails(&self) -> Result<Vec<Email>, EmailerError> {
        self.converter().convert_pending().await
    }

    /// Converts all unseen medium events into email records in a single
    /// transaction, each record keeping its own event's targets.
    pub async fn convert_events_to_emails_bulk(&self) -> Result<Vec<Email>, EmailerError> {
        self.converter().convert_pending_bulk().await
    }

    /// Delivers every due email record once.
    pub async fn send_unsent_scheduled_emails(&self) -> Result<SendReport, EmailerError> {
        self.processor().send_due().await
    }

    /// Renders the email behind a view token, for browser display.
    ///
    /// Applies the same subject derivation as the send path, so what the
    /// browser shows matches what was (or will be) delivered.
    pub async fn render_for_view(
        &self,
        view_uid: UniversalUuid,
    ) -> Result<RenderedEmail, EmailerError> {
        let email = self.dal.email().get_by_view_uid(view_uid).await?;
        let template = self.dal.template().get_by_id(email.template_id).await?;

        let body = self
            .renderer()
            .render(&template, &email.context, email.view_uid)?;
        let subject = if email.subject.is_empty() {
            extract_subject(body.subject_source())
        } else {
            email.subject.clone()
        };

        Ok(RenderedEmail {
            subject,
            text: body.text,
            html: body.html,
        })
    }

    /// Creates an email record from an administrative composition.
    ///
    /// The record goes through the normal send pipeline: subscription
    /// filtering, scheduling and retry accounting all apply.
    pub async fn compose(&self, composed: ComposedEmail) -> Result<Email, EmailerError> {
        let template = self.ensure_admin_template().await?;

        let new_email = NewEmail {
            source: self.config.admin_source_name.clone(),
            event_uid: None,
            template_id: template.id,
            context: serde_json::json!({ "html": composed.html_body }),
            subject: composed.subject,
            from_address: composed.from_address,
            recipients_kind: composed.recipients_kind,
            scheduled: composed.scheduled,
        };

        self.dal.email().create(new_email, composed.recipients).await
    }

    /// Returns the administrative passthrough template, creating it on
    /// first use.
    ///
    /// The template body is `{{{html}}}`: triple braces, so the composed
    /// HTML is emitted unescaped.
    pub async fn ensure_admin_template(&self) -> Result<EmailTemplate, EmailerError> {
        if let Some(existing) = self
            .dal
            .template()
            .get_by_name(&self.config.admin_template_name)
            .await?
        {
            return Ok(existing);
        }

        self.dal
            .template()
            .create(NewEmailTemplate {
                name: self.config.admin_template_name.clone(),
                html_inline: Some("{{{html}}}".to_string()),
                ..Default::default()
            })
            .await
    }

    /// Direct access to the data access layer, mainly for tests and
    /// operational tooling.
    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    fn converter(&self) -> EventConverter {
        EventConverter::new(self.dal.clone(), self.medium.clone(), self.config.clone())
    }

    fn renderer(&self) -> TemplateRenderer {
        TemplateRenderer::new(self.config.template_dir.clone(), self.loaders.clone())
    }

    fn processor(&self) -> SendProcessor {
        SendProcessor::new(
            self.dal.clone(),
            RecipientResolver::new(self.medium.clone(), &self.config),
            self.renderer(),
            self.transport.clone(),
            self.observers.clone(),
            self.config.clone(),
        )
    }
}
