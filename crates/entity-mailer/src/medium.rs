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

//! The external event/subscription medium boundary.
//!
//! The pipeline consumes an event store, an entity directory, and a
//! subscription graph, all owned elsewhere. This module defines that
//! boundary as the [`Medium`] trait plus the [`Event`] and [`Entity`] value
//! types that cross it. The subscription predicate (only-following vs
//! blanket resolution) is entirely the medium's concern; the pipeline only
//! calls [`Medium::filter_not_subscribed`].

use async_trait::async_trait;

use crate::database::universal_types::UniversalUuid;
use crate::error::EmailerError;

/// An external record of something that happened; the trigger for email
/// creation.
#[derive(Debug, Clone)]
pub struct Event {
    /// External identity of the event
    pub uid: String,
    /// Logical origin/category (e.g. "admin", "billing"); used for
    /// subscription scoping and signal tagging
    pub source: String,
    /// Key-value payload the email renders against. Recognized keys:
    /// `template`, `subject`, `from_address`, `scheduled` (RFC3339),
    /// `recipients_kind`.
    pub context: serde_json::Value,
}

/// An addressable recipient with metadata, possibly belonging to groups.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: UniversalUuid,
    /// Entity kind/type, used by group fan-out matching
    pub kind: Option<String>,
    /// Key-value metadata, including the contact address
    pub entity_meta: serde_json::Value,
}

impl Entity {
    /// Reads the contact address under `key`, treating missing and empty
    /// values as absent.
    pub fn contact_address(&self, key: &str) -> Option<&str> {
        self.entity_meta
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Whether the metadata flag under `key` is present and truthy.
    /// Used for the optional opt-in gate.
    pub fn meta_flag(&self, key: &str) -> bool {
        match self.entity_meta.get(key) {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => false,
            Some(_) => true,
        }
    }
}

/// Read-side contract of the external event/subscription system.
#[async_trait]
pub trait Medium: Send + Sync {
    /// Returns `(event, target_entities)` pairs for the named delivery
    /// channel matching the `seen` filter.
    ///
    /// When `mark_seen` is true the returned events must be flagged seen
    /// atomically with the fetch — a single fetch-and-mark operation, never
    /// "peek then mark" as two steps, so concurrent invocations cannot
    /// double-process an event.
    async fn events_targets(
        &self,
        medium: &str,
        seen: bool,
        mark_seen: bool,
    ) -> Result<Vec<(Event, Vec<Entity>)>, EmailerError>;

    /// Drops entities that are not subscribed to the `(source, medium)`
    /// pair. Whether resolution is only-following or blanket is the
    /// medium's black-box rule set.
    async fn filter_not_subscribed(
        &self,
        source: &str,
        medium: &str,
        entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, EmailerError>;

    /// Returns the sub-entities of `entity`, optionally restricted to a
    /// kind. Used for group fan-out.
    async fn sub_entities(
        &self,
        entity: &Entity,
        kind: Option<&str>,
    ) -> Result<Vec<Entity>, EmailerError>;

    /// Hydrates entity records for the given ids. Unknown ids are omitted
    /// from the result.
    async fn entities_by_id(&self, ids: &[UniversalUuid]) -> Result<Vec<Entity>, EmailerError>;
}
