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

//! Integration tests for the scheduled send processor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use entity_mailer::models::email::Email;
use entity_mailer::testing::SubscriptionMode;
use entity_mailer::transport::OutboundMessage;
use entity_mailer::{EmailObserver, EmailerConfig, UniversalTimestamp};

use crate::fixtures::{create_inline_template, create_text_template, test_context, test_context_with};

#[tokio::test]
async fn test_due_email_is_delivered_and_stamped() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium.add_event(
        "evt-1",
        "billing",
        json!({"template": "welcome", "name": "Ada"}),
        vec![alice],
    );
    let created = ctx.mailer.convert_events_to_emails().await.unwrap();

    let before = UniversalTimestamp::now();
    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    let after = UniversalTimestamp::now();
    assert_eq!(report.sent, 1);

    let messages = ctx.transport.sent_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to, vec!["a@example.com"]);
    assert_eq!(messages[0].from, "noreply@example.com");
    // Subject derived from the rendered HTML title.
    assert_eq!(messages[0].subject, "Greetings");
    assert_eq!(messages[0].text.as_deref(), Some("Hello Ada!"));

    let stored = ctx.dal().email().get_by_id(created[0].id).await.unwrap();
    let sent = stored.sent.expect("sent must be stamped");
    assert!(sent >= before && sent <= after);
    assert_eq!(stored.num_tries, 0);
}

#[tokio::test]
async fn test_delivery_is_idempotent_across_invocations() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium
        .add_event("evt-1", "billing", json!({"template": "welcome"}), vec![alice]);
    ctx.mailer.convert_events_to_emails().await.unwrap();

    ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    let second = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();

    assert_eq!(second.sent, 0);
    assert_eq!(ctx.transport.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_failure_is_isolated_and_persisted() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let bad = ctx.medium.add_entity(None, json!({"email": "bad@example.com"}));
    let good = ctx.medium.add_entity(None, json!({"email": "good@example.com"}));
    ctx.medium
        .add_event("evt-bad", "billing", json!({"template": "welcome"}), vec![bad]);
    ctx.medium
        .add_event("evt-good", "billing", json!({"template": "welcome"}), vec![good]);
    let created = ctx.mailer.convert_events_to_emails().await.unwrap();
    ctx.transport.reject_recipient("bad@example.com");

    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);

    let failed = created
        .iter()
        .find(|e| e.event_uid.as_deref() == Some("evt-bad"))
        .unwrap();
    let reloaded = ctx.dal().email().get_by_id(failed.id).await.unwrap();
    assert_eq!(reloaded.num_tries, 1);
    assert!(reloaded.sent.is_none());
    let exception = reloaded.last_exception.unwrap();
    assert!(exception.contains("recipient refused"));
    // Structured provider detail is appended after the formatted message.
    assert!(exception.contains("550"));
}

#[tokio::test]
async fn test_retry_stops_at_max_tries() {
    let config = EmailerConfig::new("noreply@example.com")
        .unwrap()
        .with_max_tries(2)
        .unwrap();
    let ctx = test_context_with(config, SubscriptionMode::Blanket).await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium
        .add_event("evt-1", "billing", json!({"template": "welcome"}), vec![alice]);
    let created = ctx.mailer.convert_events_to_emails().await.unwrap();
    ctx.transport.set_fail_all(true);

    assert_eq!(ctx.mailer.send_unsent_scheduled_emails().await.unwrap().failed, 1);
    assert_eq!(ctx.mailer.send_unsent_scheduled_emails().await.unwrap().failed, 1);
    // Retry budget exhausted; the record drops out of the due set.
    let third = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    assert_eq!(third.failed, 0);
    assert_eq!(third.sent, 0);

    let reloaded = ctx.dal().email().get_by_id(created[0].id).await.unwrap();
    assert_eq!(reloaded.num_tries, 2);
    assert!(reloaded.sent.is_none());
}

#[tokio::test]
async fn test_empty_audience_skips_without_mutation() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium.unsubscribe(alice, "billing", "email");
    ctx.medium
        .add_event("evt-1", "billing", json!({"template": "welcome"}), vec![alice]);
    let created = ctx.mailer.convert_events_to_emails().await.unwrap();

    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 0);
    assert!(ctx.transport.sent_messages().is_empty());

    // Zero mutation: the record is neither stamped nor charged a try.
    let reloaded = ctx.dal().email().get_by_id(created[0].id).await.unwrap();
    assert!(reloaded.sent.is_none());
    assert_eq!(reloaded.num_tries, 0);
    assert!(reloaded.last_exception.is_none());
}

#[tokio::test]
async fn test_future_scheduled_email_is_left_alone() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    let later = UniversalTimestamp(UniversalTimestamp::now().0 + chrono::Duration::hours(1));
    ctx.medium.add_event(
        "evt-1",
        "billing",
        json!({"template": "welcome", "scheduled": later.to_rfc3339()}),
        vec![alice],
    );
    ctx.mailer.convert_events_to_emails().await.unwrap();

    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(ctx.transport.sent_messages().is_empty());
}

#[tokio::test]
async fn test_group_fanout_end_to_end() {
    let ctx = test_context().await;
    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx
        .medium
        .add_entity(Some("person"), json!({"email": "a@example.com"}));
    let bob = ctx
        .medium
        .add_entity(Some("person"), json!({"email": "b@example.com"}));
    let team = ctx.medium.add_group("team", vec![alice, bob]);
    ctx.medium.add_event(
        "evt-1",
        "announcements",
        json!({"template": "welcome", "recipients_kind": "person"}),
        vec![team],
    );
    ctx.mailer.convert_events_to_emails().await.unwrap();

    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    assert_eq!(report.sent, 1);
    let messages = ctx.transport.sent_messages();
    assert_eq!(messages[0].to, vec!["a@example.com", "b@example.com"]);
}

#[tokio::test]
async fn test_only_following_mode_filters_at_send_time() {
    let config = EmailerConfig::new("noreply@example.com").unwrap();
    let ctx = test_context_with(config, SubscriptionMode::OnlyFollowing).await;
    create_inline_template(ctx.dal(), "welcome").await;
    let follower = ctx
        .medium
        .add_entity(None, json!({"email": "follower@example.com"}));
    let stranger = ctx
        .medium
        .add_entity(None, json!({"email": "stranger@example.com"}));
    ctx.medium.follow(follower, "news", "email");
    ctx.medium.add_event(
        "evt-1",
        "news",
        json!({"template": "welcome"}),
        vec![follower, stranger],
    );
    ctx.mailer.convert_events_to_emails().await.unwrap();

    ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    let messages = ctx.transport.sent_messages();
    assert_eq!(messages[0].to, vec!["follower@example.com"]);
}

#[tokio::test]
async fn test_subject_falls_back_to_first_line() {
    let ctx = test_context().await;
    create_text_template(ctx.dal(), "plain").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    ctx.medium.add_event(
        "evt-1",
        "billing",
        json!({"template": "plain", "name": "Ada"}),
        vec![alice],
    );
    ctx.mailer.convert_events_to_emails().await.unwrap();

    ctx.mailer.send_unsent_scheduled_emails().await.unwrap();
    let messages = ctx.transport.sent_messages();
    assert_eq!(messages[0].subject, "First line for Ada");
    assert!(messages[0].html.is_none());
}

struct FlakyObserver {
    pre_send_calls: AtomicUsize,
    sent_calls: AtomicUsize,
    failed_calls: AtomicUsize,
}

#[async_trait]
impl EmailObserver for FlakyObserver {
    async fn pre_send(&self, _email: &Email, _message: &OutboundMessage) -> Result<(), String> {
        self.pre_send_calls.fetch_add(1, Ordering::SeqCst);
        Err("pre_send hook broke".to_string())
    }

    async fn email_sent(&self, _email: &Email) -> Result<(), String> {
        self.sent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn email_failed(&self, _email: &Email, _exception: &str) -> Result<(), String> {
        self.failed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_observer_failure_never_blocks_delivery() {
    let mut ctx = test_context().await;
    let observer = Arc::new(FlakyObserver {
        pre_send_calls: AtomicUsize::new(0),
        sent_calls: AtomicUsize::new(0),
        failed_calls: AtomicUsize::new(0),
    });
    ctx.mailer.register_observer(observer.clone());

    create_inline_template(ctx.dal(), "welcome").await;
    let alice = ctx.medium.add_entity(None, json!({"email": "a@example.com"}));
    let bob = ctx.medium.add_entity(None, json!({"email": "b@example.com"}));
    ctx.medium
        .add_event("evt-ok", "billing", json!({"template": "welcome"}), vec![alice]);
    ctx.medium
        .add_event("evt-fail", "billing", json!({"template": "welcome"}), vec![bob]);
    ctx.mailer.convert_events_to_emails().await.unwrap();
    ctx.transport.reject_recipient("b@example.com");

    let report = ctx.mailer.send_unsent_scheduled_emails().await.unwrap();

    // The pre_send hook failed every time, yet one delivery succeeded and
    // the other failed for its own reasons.
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(observer.pre_send_calls.load(Ordering::SeqCst), 2);
    assert_eq!(observer.sent_calls.load(Ordering::SeqCst), 1);
    assert_eq!(observer.failed_calls.load(Ordering::SeqCst), 1);
}
