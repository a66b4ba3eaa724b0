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

//! In-memory test doubles for the external seams.
//!
//! [`MemoryMedium`] is a full [`Medium`] implementation over in-process
//! maps, with a switchable subscription mode. [`RecordingTransport`] is a
//! [`MailTransport`] that captures messages and can be told to reject
//! specific recipients. Both are used by the crate's own tests and are
//! exported for downstream integration testing.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::database::universal_types::UniversalUuid;
use crate::error::{EmailerError, TransportError};
use crate::medium::{Entity, Event, Medium};
use crate::transport::{MailTransport, OutboundMessage};

/// How [`MemoryMedium`] interprets subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Everyone is subscribed unless explicitly unsubscribed.
    Blanket,
    /// Nobody is subscribed unless explicitly following the source.
    OnlyFollowing,
}

#[derive(Default)]
struct MediumState {
    entities: HashMap<UniversalUuid, Entity>,
    group_members: HashMap<UniversalUuid, Vec<UniversalUuid>>,
    events: Vec<(Event, Vec<UniversalUuid>, bool)>,
    unsubscribed: HashSet<(UniversalUuid, String, String)>,
    following: HashSet<(UniversalUuid, String, String)>,
}

/// In-memory event store, entity directory and subscription graph.
pub struct MemoryMedium {
    state: Mutex<MediumState>,
    mode: SubscriptionMode,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::with_mode(SubscriptionMode::Blanket)
    }

    pub fn with_mode(mode: SubscriptionMode) -> Self {
        Self {
            state: Mutex::new(MediumState::default()),
            mode,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MediumState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds an entity and returns its id.
    pub fn add_entity(&self, kind: Option<&str>, entity_meta: serde_json::Value) -> UniversalUuid {
        let id = UniversalUuid::new_v4();
        let mut state = self.lock();
        state.entities.insert(
            id,
            Entity {
                id,
                kind: kind.map(str::to_string),
                entity_meta,
            },
        );
        id
    }

    /// Adds a group entity of `kind` with the given members and returns its
    /// id.
    pub fn add_group(&self, kind: &str, members: Vec<UniversalUuid>) -> UniversalUuid {
        let id = self.add_entity(Some(kind), serde_json::json!({}));
        self.lock().group_members.insert(id, members);
        id
    }

    /// Records an event targeting the given entities. Events start unseen.
    pub fn add_event(
        &self,
        uid: &str,
        source: &str,
        context: serde_json::Value,
        targets: Vec<UniversalUuid>,
    ) {
        self.lock().events.push((
            Event {
                uid: uid.to_string(),
                source: source.to_string(),
                context,
            },
            targets,
            false,
        ));
    }

    /// Records an unsubscription for the `(source, medium)` pair.
    pub fn unsubscribe(&self, entity: UniversalUuid, source: &str, medium: &str) {
        self.lock()
            .unsubscribed
            .insert((entity, source.to_string(), medium.to_string()));
    }

    /// Records a follow for the `(source, medium)` pair.
    pub fn follow(&self, entity: UniversalUuid, source: &str, medium: &str) {
        self.lock()
            .following
            .insert((entity, source.to_string(), medium.to_string()));
    }

    /// Number of events currently flagged seen.
    pub fn seen_count(&self) -> usize {
        self.lock().events.iter().filter(|(_, _, seen)| *seen).count()
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Medium for MemoryMedium {
    // Events are not scoped per channel in this double; the medium name
    // only keys the subscription graph.
    async fn events_targets(
        &self,
        _medium: &str,
        seen: bool,
        mark_seen: bool,
    ) -> Result<Vec<(Event, Vec<Entity>)>, EmailerError> {
        let mut state = self.lock();
        let mut matched = Vec::new();
        // Single critical section: the fetch and the seen-flag flip happen
        // under one lock so concurrent callers cannot both claim an event.
        let targets_snapshot: Vec<(Event, Vec<UniversalUuid>)> = state
            .events
            .iter_mut()
            .filter(|(_, _, event_seen)| *event_seen == seen)
            .map(|(event, targets, event_seen)| {
                if mark_seen {
                    *event_seen = true;
                }
                (event.clone(), targets.clone())
            })
            .collect();

        for (event, target_ids) in targets_snapshot {
            let entities = target_ids
                .iter()
                .filter_map(|id| state.entities.get(id).cloned())
                .collect();
            matched.push((event, entities));
        }
        Ok(matched)
    }

    async fn filter_not_subscribed(
        &self,
        source: &str,
        medium: &str,
        entities: Vec<Entity>,
    ) -> Result<Vec<Entity>, EmailerError> {
        let state = self.lock();
        Ok(entities
            .into_iter()
            .filter(|entity| {
                let key = (entity.id, source.to_string(), medium.to_string());
                match self.mode {
                    SubscriptionMode::Blanket => !state.unsubscribed.contains(&key),
                    SubscriptionMode::OnlyFollowing => {
                        state.following.contains(&key) && !state.unsubscribed.contains(&key)
                    }
                }
            })
            .collect())
    }

    async fn sub_entities(
        &self,
        entity: &Entity,
        kind: Option<&str>,
    ) -> Result<Vec<Entity>, EmailerError> {
        let state = self.lock();
        let members = match state.group_members.get(&entity.id) {
            Some(members) => members.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(members
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .filter(|member| match kind {
                Some(kind) => member.kind.as_deref() == Some(kind),
                None => true,
            })
            .collect())
    }

    async fn entities_by_id(&self, ids: &[UniversalUuid]) -> Result<Vec<Entity>, EmailerError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect())
    }
}

/// [`MailTransport`] double that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    reject_recipients: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes any message addressed to `address` fail.
    pub fn reject_recipient(&self, address: &str) {
        self.reject_recipients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(address.to_string());
    }

    /// Makes every delivery fail until called with `false`.
    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    /// Messages accepted so far, in delivery order.
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if *self.fail_all.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(TransportError::Rejected {
                message: "transport unavailable".to_string(),
                detail: Some(serde_json::json!({"code": 451})),
            });
        }
        let rejects = self
            .reject_recipients
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(address) = message.to.iter().find(|to| rejects.contains(*to)) {
            return Err(TransportError::Rejected {
                message: format!("recipient refused: {}", address),
                detail: Some(serde_json::json!({"code": 550})),
            });
        }
        drop(rejects);

        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message);
        Ok(())
    }
}
