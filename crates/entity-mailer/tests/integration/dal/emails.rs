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

//! Integration tests for the email record DAL.

use chrono::Duration;
use serde_json::json;

use entity_mailer::models::email::NewEmail;
use entity_mailer::{UniversalTimestamp, UniversalUuid};

use crate::fixtures::{create_inline_template, test_context};

fn new_email(template_id: UniversalUuid) -> NewEmail {
    NewEmail {
        source: "billing".to_string(),
        event_uid: Some("evt-1".to_string()),
        template_id,
        context: json!({"name": "Ada"}),
        subject: String::new(),
        from_address: None,
        recipients_kind: None,
        scheduled: None,
    }
}

#[tokio::test]
async fn test_create_defaults_schedule_to_creation_time() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;

    let before = UniversalTimestamp::now();
    let email = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![UniversalUuid::new_v4()])
        .await
        .unwrap();
    let after = UniversalTimestamp::now();

    assert!(email.scheduled >= before && email.scheduled <= after);
    assert!(email.sent.is_none());
    assert_eq!(email.num_tries, 0);
    assert_eq!(email.subject, "");
}

#[tokio::test]
async fn test_create_deduplicates_recipients() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let repeat = UniversalUuid::new_v4();
    let other = UniversalUuid::new_v4();

    let email = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![repeat, other, repeat])
        .await
        .unwrap();

    let mut recipient_ids = ctx.dal().email().recipient_ids(email.id).await.unwrap();
    recipient_ids.sort();
    let mut expected = vec![repeat, other];
    expected.sort();
    assert_eq!(recipient_ids, expected);
}

#[tokio::test]
async fn test_due_selection_and_ordering() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let now = UniversalTimestamp::now();

    let mut early = new_email(template.id);
    early.event_uid = Some("evt-early".to_string());
    early.scheduled = Some(UniversalTimestamp(now.0 - Duration::minutes(10)));
    let mut late = new_email(template.id);
    late.event_uid = Some("evt-late".to_string());
    late.scheduled = Some(UniversalTimestamp(now.0 - Duration::minutes(1)));
    let mut future = new_email(template.id);
    future.event_uid = Some("evt-future".to_string());
    future.scheduled = Some(UniversalTimestamp(now.0 + Duration::hours(1)));

    // Insert out of order to prove ordering comes from the query.
    let late = ctx.dal().email().create(late, vec![]).await.unwrap();
    let early = ctx.dal().email().create(early, vec![]).await.unwrap();
    ctx.dal().email().create(future, vec![]).await.unwrap();

    let due = ctx.dal().email().due(UniversalTimestamp::now(), 3).await.unwrap();
    let ids: Vec<_> = due.iter().map(|d| d.email.id).collect();
    assert_eq!(ids, vec![early.id, late.id]);
    assert_eq!(due[0].template.name, "welcome");
}

#[tokio::test]
async fn test_due_excludes_sent_and_exhausted() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;

    let delivered = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![])
        .await
        .unwrap();
    ctx.dal()
        .email()
        .mark_sent(delivered.id, UniversalTimestamp::now())
        .await
        .unwrap();

    let mut exhausted_new = new_email(template.id);
    exhausted_new.event_uid = Some("evt-2".to_string());
    let exhausted = ctx
        .dal()
        .email()
        .create(exhausted_new, vec![])
        .await
        .unwrap();
    for _ in 0..3 {
        ctx.dal()
            .email()
            .record_failure(exhausted.id, "boom".to_string())
            .await
            .unwrap();
    }

    let due = ctx.dal().email().due(UniversalTimestamp::now(), 3).await.unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn test_record_failure_is_a_partial_update() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let email = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![])
        .await
        .unwrap();

    ctx.dal()
        .email()
        .record_failure(email.id, "SMTP transport error: timeout".to_string())
        .await
        .unwrap();
    ctx.dal()
        .email()
        .record_failure(email.id, "SMTP transport error: refused".to_string())
        .await
        .unwrap();

    let reloaded = ctx.dal().email().get_by_id(email.id).await.unwrap();
    assert_eq!(reloaded.num_tries, 2);
    assert_eq!(
        reloaded.last_exception.as_deref(),
        Some("SMTP transport error: refused")
    );
    // Everything outside the failure columns is untouched.
    assert!(reloaded.sent.is_none());
    assert_eq!(reloaded.context, email.context);
    assert_eq!(reloaded.scheduled, email.scheduled);
}

#[tokio::test]
async fn test_mark_sent_stamps_given_timestamp() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let email = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![])
        .await
        .unwrap();

    let stamp = UniversalTimestamp::now();
    ctx.dal().email().mark_sent(email.id, stamp).await.unwrap();

    let reloaded = ctx.dal().email().get_by_id(email.id).await.unwrap();
    assert_eq!(reloaded.sent, Some(stamp));
}

#[tokio::test]
async fn test_get_by_view_uid() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let email = ctx
        .dal()
        .email()
        .create(new_email(template.id), vec![])
        .await
        .unwrap();

    let found = ctx
        .dal()
        .email()
        .get_by_view_uid(email.view_uid)
        .await
        .unwrap();
    assert_eq!(found.id, email.id);
}

#[tokio::test]
async fn test_create_bulk_keeps_per_email_recipients() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;
    let first_recipient = UniversalUuid::new_v4();
    let second_recipient = UniversalUuid::new_v4();

    let mut first_email = new_email(template.id);
    first_email.event_uid = Some("evt-a".to_string());
    let mut second_email = new_email(template.id);
    second_email.event_uid = Some("evt-b".to_string());

    let created = ctx
        .dal()
        .email()
        .create_bulk(vec![
            // Duplicates within one record's list collapse.
            (first_email, vec![first_recipient, first_recipient]),
            (second_email, vec![second_recipient]),
        ])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    let first_ids = ctx.dal().email().recipient_ids(created[0].id).await.unwrap();
    assert_eq!(first_ids, vec![first_recipient]);
    let second_ids = ctx.dal().email().recipient_ids(created[1].id).await.unwrap();
    assert_eq!(second_ids, vec![second_recipient]);
}

#[tokio::test]
async fn test_exists_for_event() {
    let ctx = test_context().await;
    let template = create_inline_template(ctx.dal(), "welcome").await;

    assert!(!ctx.dal().email().exists_for_event("evt-1").await.unwrap());
    ctx.dal()
        .email()
        .create(new_email(template.id), vec![])
        .await
        .unwrap();
    assert!(ctx.dal().email().exists_for_event("evt-1").await.unwrap());
}
