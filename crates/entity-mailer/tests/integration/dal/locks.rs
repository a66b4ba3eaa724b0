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

//! Integration tests for the advisory lock DAL.

use crate::fixtures::test_context;

#[tokio::test]
async fn test_second_acquire_loses_while_held() {
    let ctx = test_context().await;

    let token = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap();
    assert!(token.is_some());

    let contender = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap();
    assert!(contender.is_none());
}

#[tokio::test]
async fn test_release_makes_lock_available() {
    let ctx = test_context().await;

    let token = ctx
        .dal()
        .lock()
        .try_acquire("convert-events-to-emails", 300)
        .await
        .unwrap()
        .unwrap();
    ctx.dal()
        .lock()
        .release("convert-events-to-emails", token)
        .await
        .unwrap();

    let reacquired = ctx
        .dal()
        .lock()
        .try_acquire("convert-events-to-emails", 300)
        .await
        .unwrap();
    assert!(reacquired.is_some());
}

#[tokio::test]
async fn test_expired_lock_is_reclaimed() {
    let ctx = test_context().await;

    // TTL of zero expires immediately; the holder is treated as abandoned.
    let stale = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 0)
        .await
        .unwrap();
    assert!(stale.is_some());

    let taken_over = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap();
    assert!(taken_over.is_some());
}

#[tokio::test]
async fn test_release_with_wrong_token_is_a_noop() {
    let ctx = test_context().await;

    let token = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 0)
        .await
        .unwrap()
        .unwrap();
    // Someone else reclaims the expired lock.
    let new_token = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap()
        .unwrap();

    // The stale holder's release must not free the new holder's lock.
    ctx.dal()
        .lock()
        .release("send-scheduled-emails", token)
        .await
        .unwrap();
    let contender = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap();
    assert!(contender.is_none());

    ctx.dal()
        .lock()
        .release("send-scheduled-emails", new_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_distinct_names_do_not_contend() {
    let ctx = test_context().await;

    let send = ctx
        .dal()
        .lock()
        .try_acquire("send-scheduled-emails", 300)
        .await
        .unwrap();
    let convert = ctx
        .dal()
        .lock()
        .try_acquire("convert-events-to-emails", 300)
        .await
        .unwrap();
    assert!(send.is_some());
    assert!(convert.is_some());
}
