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

//! Pipeline configuration.
//!
//! All settings are resolved once into an explicit [`EmailerConfig`] that is
//! passed into each component at construction. Defaults match the upstream
//! conventions: the medium is named `email`, contact addresses live under the
//! `email` metadata key, and a record is retried at most 3 times.

use std::path::PathBuf;

use crate::error::EmailerError;

/// Default name of the medium this channel registers against.
pub const DEFAULT_MEDIUM_NAME: &str = "email";

/// Default entity metadata key holding the contact address.
pub const DEFAULT_EMAIL_KEY: &str = "email";

/// Default source identity for manually composed emails.
pub const DEFAULT_ADMIN_SOURCE_NAME: &str = "admin";

/// Default template name for manually composed emails.
pub const DEFAULT_ADMIN_TEMPLATE_NAME: &str = "entity-mailer-admin";

/// Default maximum delivery attempts per email record.
pub const DEFAULT_MAX_TRIES: u32 = 3;

/// Default advisory lock time-to-live in seconds. A lock older than this is
/// considered abandoned and may be reclaimed by the next invocation.
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 300;

/// Validated configuration for the email pipeline.
#[derive(Debug, Clone)]
pub struct EmailerConfig {
    /// Fallback from-address used when an email record carries no override
    pub default_from_email: String,
    /// Name identifying this delivery channel to the event medium
    pub medium_name: String,
    /// Entity metadata key the contact address is read from
    pub email_key: String,
    /// Optional entity metadata key gating sends on an opt-in marker;
    /// entities whose flag is absent or false are dropped
    pub exclude_key: Option<String>,
    /// Maximum delivery attempts before a record fails terminally
    pub max_tries: u32,
    /// Directory file-based template assets are loaded from
    pub template_dir: PathBuf,
    /// Source identity stamped on administratively composed emails
    pub admin_source_name: String,
    /// Template name used for administratively composed emails
    pub admin_template_name: String,
    /// Advisory lock time-to-live in seconds
    pub lock_ttl_seconds: u64,
}

impl EmailerConfig {
    /// Creates a configuration with the given default from-address and all
    /// other fields at their defaults.
    pub fn new(default_from_email: impl Into<String>) -> Result<Self, EmailerError> {
        let config = EmailerConfig {
            default_from_email: default_from_email.into(),
            medium_name: DEFAULT_MEDIUM_NAME.to_string(),
            email_key: DEFAULT_EMAIL_KEY.to_string(),
            exclude_key: None,
            max_tries: DEFAULT_MAX_TRIES,
            template_dir: PathBuf::from("templates"),
            admin_source_name: DEFAULT_ADMIN_SOURCE_NAME.to_string(),
            admin_template_name: DEFAULT_ADMIN_TEMPLATE_NAME.to_string(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `EMAILER_*` environment variables,
    /// loading a `.env` file first if one is present.
    ///
    /// `EMAILER_FROM_EMAIL` is required; everything else falls back to the
    /// documented defaults.
    pub fn from_env() -> Result<Self, EmailerError> {
        dotenvy::dotenv().ok();

        let default_from_email = std::env::var("EMAILER_FROM_EMAIL").map_err(|_| {
            EmailerError::Configuration("EMAILER_FROM_EMAIL is not set".to_string())
        })?;

        let mut config = EmailerConfig::new(default_from_email)?;

        if let Ok(name) = std::env::var("EMAILER_MEDIUM_NAME") {
            config.medium_name = name;
        }
        if let Ok(key) = std::env::var("EMAILER_EMAIL_KEY") {
            config.email_key = key;
        }
        if let Ok(key) = std::env::var("EMAILER_EXCLUDE_KEY") {
            config.exclude_key = Some(key);
        }
        if let Ok(tries) = std::env::var("EMAILER_MAX_TRIES") {
            config.max_tries = tries.parse().map_err(|_| {
                EmailerError::Configuration(format!("EMAILER_MAX_TRIES is not a number: {}", tries))
            })?;
        }
        if let Ok(dir) = std::env::var("EMAILER_TEMPLATE_DIR") {
            config.template_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("EMAILER_ADMIN_SOURCE_NAME") {
            config.admin_source_name = name;
        }
        if let Ok(name) = std::env::var("EMAILER_ADMIN_TEMPLATE_NAME") {
            config.admin_template_name = name;
        }
        if let Ok(ttl) = std::env::var("EMAILER_LOCK_TTL_SECONDS") {
            config.lock_ttl_seconds = ttl.parse().map_err(|_| {
                EmailerError::Configuration(format!(
                    "EMAILER_LOCK_TTL_SECONDS is not a number: {}",
                    ttl
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the opt-in gate metadata key.
    pub fn with_exclude_key(mut self, key: impl Into<String>) -> Result<Self, EmailerError> {
        self.exclude_key = Some(key.into());
        self.validate()?;
        Ok(self)
    }

    /// Sets the maximum delivery attempts.
    pub fn with_max_tries(mut self, max_tries: u32) -> Result<Self, EmailerError> {
        self.max_tries = max_tries;
        self.validate()?;
        Ok(self)
    }

    /// Sets the template asset directory.
    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Result<Self, EmailerError> {
        self.template_dir = dir.into();
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), EmailerError> {
        if self.default_from_email.trim().is_empty() {
            return Err(EmailerError::Configuration(
                "default from-address must not be empty".to_string(),
            ));
        }
        if self.max_tries == 0 {
            return Err(EmailerError::Configuration(
                "max_tries must be at least 1".to_string(),
            ));
        }
        if self.medium_name.trim().is_empty() {
            return Err(EmailerError::Configuration(
                "medium name must not be empty".to_string(),
            ));
        }
        if matches!(&self.exclude_key, Some(key) if key.trim().is_empty()) {
            return Err(EmailerError::Configuration(
                "exclude key must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}
