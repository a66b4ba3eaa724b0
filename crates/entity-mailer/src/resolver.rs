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

//! # Recipient Resolution
//!
//! Turns an email record's stored candidate recipients into the concrete
//! address list a message goes out to. Resolution happens at send time, not
//! at creation time, so group membership and subscription changes between
//! scheduling and delivery are honored.
//!
//! The pipeline is: hydrate stored ids, expand groups when the record asks
//! for fan-out, drop unsubscribed entities, apply the optional opt-in gate,
//! then read addresses. The output order follows the input order with
//! duplicates removed.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::EmailerConfig;
use crate::database::universal_types::UniversalUuid;
use crate::error::EmailerError;
use crate::medium::{Entity, Medium};
use crate::models::email::Email;

/// Resolves an email's audience to concrete addresses at send time.
pub struct RecipientResolver {
    medium: Arc<dyn Medium>,
    medium_name: String,
    email_key: String,
    exclude_key: Option<String>,
}

impl RecipientResolver {
    pub fn new(medium: Arc<dyn Medium>, config: &EmailerConfig) -> Self {
        Self {
            medium,
            medium_name: config.medium_name.clone(),
            email_key: config.email_key.clone(),
            exclude_key: config.exclude_key.clone(),
        }
    }

    /// Resolves the address list for `email` given its stored candidate
    /// recipient ids.
    ///
    /// An empty result is a legitimate outcome (everyone unsubscribed or
    /// addressless), not an error.
    pub async fn resolve(
        &self,
        email: &Email,
        recipient_ids: &[UniversalUuid],
    ) -> Result<Vec<String>, EmailerError> {
        let entities = self.medium.entities_by_id(recipient_ids).await?;

        let audience = match &email.recipients_kind {
            Some(kind) => self.expand_groups(&entities, kind).await?,
            None => entities,
        };

        let subscribed = self
            .medium
            .filter_not_subscribed(&email.source, &self.medium_name, audience)
            .await?;

        let addresses = self.extract_addresses(&subscribed);
        debug!(
            email_id = %email.id,
            candidates = recipient_ids.len(),
            resolved = addresses.len(),
            "Resolved recipient addresses"
        );
        Ok(addresses)
    }

    /// Expands each entity to its sub-entities of `kind`, deduplicated by
    /// id in first-seen order.
    async fn expand_groups(
        &self,
        entities: &[Entity],
        kind: &str,
    ) -> Result<Vec<Entity>, EmailerError> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();
        for entity in entities {
            for member in self.medium.sub_entities(entity, Some(kind)).await? {
                if seen.insert(member.id) {
                    expanded.push(member);
                }
            }
        }
        Ok(expanded)
    }

    /// Reads contact addresses, applying the opt-in gate when configured
    /// and dropping addressless entities. Duplicate addresses collapse to
    /// their first occurrence.
    fn extract_addresses(&self, entities: &[Entity]) -> Vec<String> {
        let mut seen = HashSet::new();
        entities
            .iter()
            .filter(|entity| match &self.exclude_key {
                Some(key) => entity.meta_flag(key),
                None => true,
            })
            .filter_map(|entity| entity.contact_address(&self.email_key))
            .filter(|address| seen.insert(address.to_string()))
            .map(str::to_string)
            .collect()
    }
}
