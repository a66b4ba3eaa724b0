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

//! # Entity Mailer
//!
//! A library for converting application events into durable, scheduled
//! email delivery.
//!
//! Events from an external medium become email records in a local database;
//! a separate send pass renders, resolves recipients and delivers every
//! record whose schedule has passed. The two passes are each serialized by
//! a named advisory lock and are safe to re-run: events convert exactly
//! once, emails deliver exactly once, and a failed delivery is retried on
//! the next pass until its retry budget runs out.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use entity_mailer::{Database, EmailerConfig, EntityMailer, SmtpConfig, SmtpMailer};
//!
//! # async fn example(medium: Arc<dyn entity_mailer::Medium>) -> Result<(), entity_mailer::EmailerError> {
//! let database = Database::new("emails.db");
//! let transport = Arc::new(SmtpMailer::new(
//!     SmtpConfig::new("smtp.example.com").with_credentials("mailer", "secret"),
//! )?);
//! let config = EmailerConfig::new("noreply@example.com")?;
//!
//! let mailer = EntityMailer::new(database, medium, transport, config);
//! mailer.initialize().await?;
//!
//! // Typically driven by a scheduler:
//! mailer.convert_events_to_emails().await?;
//! mailer.send_unsent_scheduled_emails().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`medium`]: the trait boundary to the external event store, entity
//!   directory and subscription graph
//! - [`converter`]: drains unseen events into email records
//! - [`resolver`]: turns stored candidate recipients into addresses at
//!   send time
//! - [`render`]: template rendering and subject derivation
//! - [`processor`]: the durable, per-record-isolated send pass
//! - [`transport`]: the outbound mail seam plus the SMTP implementation
//! - [`dal`]: data access over SQLite
//!
//! The [`EntityMailer`] facade wires these together for the common case;
//! the components are public for callers that need to assemble their own
//! pipeline.

pub mod config;
pub mod converter;
pub mod dal;
pub mod database;
pub mod error;
pub mod interface;
pub mod medium;
pub mod models;
pub mod observer;
pub mod processor;
pub mod render;
pub mod resolver;
pub mod testing;
pub mod transport;

pub use config::EmailerConfig;
pub use converter::EventConverter;
pub use database::universal_types::{UniversalTimestamp, UniversalUuid};
pub use database::Database;
pub use error::{EmailerError, RenderError, TransportError};
pub use interface::{ComposedEmail, EntityMailer, RenderedEmail};
pub use medium::{Entity, Event, Medium};
pub use models::email::{Email, NewEmail};
pub use models::template::{EmailTemplate, NewEmailTemplate};
pub use observer::{EmailObserver, ObserverSet};
pub use processor::{SendProcessor, SendReport};
pub use render::{ContextLoaderRegistry, TemplateRenderer};
pub use resolver::RecipientResolver;
pub use transport::{MailTransport, OutboundMessage, SmtpConfig, SmtpMailer};

/// Installs a global `tracing` subscriber suitable for the pipeline's
/// scheduler binaries: env-filtered (`RUST_LOG`), falling back to
/// `default_filter`.
///
/// Call at most once per process; subsequent calls are no-ops.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
