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

//! Integration tests for event conversion.

use chrono::Duration;
use serde_json::json;

use entity_mailer::UniversalTimestamp;

use crate::fixtures::{create_inline_template, test_context};

#[tokio::test]
async fn test_events_become_email_records() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium.add_event(
        "evt-1",
        "billing",
        json!({"template": "welcome", "name": "Ada"}),
        vec![alice],
    );

    let created = ctx.mailer.convert_events_to_emails().await.unwrap();
    assert_eq!(created.len(), 1);

    let email = &created[0];
    assert_eq!(email.source, "billing");
    assert_eq!(email.event_uid.as_deref(), Some("evt-1"));
    assert_eq!(email.template_id, template.id);
    assert_eq!(email.context["name"], "Ada");
    assert!(email.sent.is_none());

    let recipients = ctx.dal().email().recipient_ids(email.id).await.unwrap();
    assert_eq!(recipients, vec![alice]);
}

#[tokio::test]
async fn test_conversion_is_idempotent() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium
        .add_event("evt-1", "billing", json!({"template": "welcome"}), vec![alice]);

    let first = ctx.mailer.convert_events_to_emails().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(ctx.medium.seen_count(), 1);

    // The event was marked seen by the first pass; nothing to do.
    let second = ctx.mailer.convert_events_to_emails().await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_context_keys_drive_record_fields() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    let later = UniversalTimestamp(UniversalTimestamp::now().0 + Duration::hours(2));
    ctx.medium.add_event(
        "evt-1",
        "billing",
        json!({
            "template": "welcome",
            "subject": "Your invoice",
            "from_address": "billing@example.com",
            "scheduled": later.to_rfc3339(),
            "recipients_kind": "person",
        }),
        vec![alice],
    );

    let created = ctx.mailer.convert_events_to_emails().await.unwrap();
    let email = &created[0];
    assert_eq!(email.subject, "Your invoice");
    assert_eq!(email.from_address.as_deref(), Some("billing@example.com"));
    assert_eq!(email.recipients_kind.as_deref(), Some("person"));
    assert_eq!(email.scheduled.to_rfc3339(), later.to_rfc3339());
}

#[tokio::test]
async fn test_event_without_template_is_skipped() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium
        .add_event("evt-no-template", "billing", json!({"name": "Ada"}), vec![alice]);
    ctx.medium.add_event(
        "evt-unknown",
        "billing",
        json!({"template": "never-created"}),
        vec![alice],
    );
    ctx.medium
        .add_event("evt-good", "billing", json!({"template": "welcome"}), vec![alice]);

    let created = ctx.mailer.convert_events_to_emails().await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].event_uid.as_deref(), Some("evt-good"));
    // Malformed events are consumed, not retried.
    assert_eq!(ctx.medium.seen_count(), 3);
}

#[tokio::test]
async fn test_bulk_conversion_keeps_per_event_targets() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    let bob = ctx.medium.add_entity(None, json!({"email": "b@example.com"}));
    ctx.medium
        .add_event("evt-1", "billing", json!({"template": "welcome"}), vec![alice]);
    ctx.medium
        .add_event("evt-2", "billing", json!({"template": "welcome"}), vec![bob]);

    let created = ctx.mailer.convert_events_to_emails_bulk().await.unwrap();
    assert_eq!(created.len(), 2);

    // Each record carries only its own event's targets, never another
    // event's audience.
    for email in &created {
        let recipients = ctx.dal().email().recipient_ids(email.id).await.unwrap();
        let expected = match email.event_uid.as_deref() {
            Some("evt-1") => alice,
            Some("evt-2") => bob,
            other => panic!("unexpected event uid: {:?}", other),
        };
        assert_eq!(recipients, vec![expected]);
    }
}
