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

//! Error types for the entity-mailer pipeline.
//!
//! The taxonomy mirrors how failures are handled: rendering and transport
//! errors are caught per email record and persisted to `last_exception`,
//! configuration errors are surfaced with a distinguishing message since they
//! will not self-resolve, and a nested-transaction violation of the durable
//! send operation fails loudly before any work is performed.

use serde_json::json;
use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum EmailerError {
    /// Database query or statement failure
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Connection pool acquisition or interaction failure
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// Template rendering failure (retried up to `max_tries`)
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Outbound transport failure (retried up to `max_tries`)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid or missing configuration; not a transient condition
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The durable send operation was invoked inside an enclosing
    /// transaction that could roll back already-delivered messages.
    #[error("durable operation invoked inside an enclosing transaction")]
    NestedTransaction,

    /// Domain validation failure (e.g. an invalid template definition)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure reported by the external event/subscription medium
    #[error("Event medium error: {0}")]
    Medium(String),
}

impl EmailerError {
    /// Whether this error is a configuration problem that will not resolve
    /// on retry. Configuration failures are persisted with a distinguishing
    /// prefix so operators can tell them apart from transient faults.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EmailerError::Configuration(_)
                | EmailerError::Render(RenderError::UnknownContextLoader(_))
        )
    }

    /// Provider-specific structured detail, if the underlying error
    /// exposes one. Appended in serialized form to `last_exception`.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            EmailerError::Transport(t) => t.detail(),
            _ => None,
        }
    }
}

/// Errors raised while rendering an email's text/html bodies.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template path pointed at a missing asset
    #[error("Template asset not found: {path}")]
    MissingAsset { path: String },

    /// Reading a template asset failed
    #[error("Failed to read template asset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The template itself failed to render against the context
    #[error("Template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    /// The template names a context loader that was never registered
    #[error("configuration error: unknown context loader `{0}`")]
    UnknownContextLoader(String),

    /// A registered context loader rejected the stored context
    #[error("Context loader `{loader}` failed: {message}")]
    ContextLoader { loader: String, message: String },
}

/// Errors raised by the outbound mail transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A recipient or sender address failed to parse
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Building the provider message failed
    #[error("Failed to build mail message: {0}")]
    Message(#[from] lettre::error::Error),

    /// The SMTP provider rejected the message or connection
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Rejection from a non-SMTP transport (e.g. a test double),
    /// optionally carrying structured provider detail
    #[error("Delivery rejected: {message}")]
    Rejected {
        message: String,
        detail: Option<serde_json::Value>,
    },
}

impl TransportError {
    /// Structured provider detail for persistence alongside the
    /// formatted message, when the provider exposes any.
    pub fn detail(&self) -> Option<serde_json::Value> {
        match self {
            TransportError::Smtp(e) => Some(json!({
                "permanent": e.is_permanent(),
                "transient": e.is_transient(),
            })),
            TransportError::Rejected { detail, .. } => detail.clone(),
            _ => None,
        }
    }
}
