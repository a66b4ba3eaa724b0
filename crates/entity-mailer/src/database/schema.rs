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

//! SQLite table definitions.
//!
//! UUIDs are stored as BLOB, timestamps as RFC3339 TEXT. The only mutable
//! shared state in the system is the `emails` table: the converter inserts
//! rows, the send processor updates `sent` / `num_tries` / `last_exception`.

diesel::table! {
    emails (id) {
        id -> Binary,
        view_uid -> Binary,
        source -> Text,
        event_uid -> Nullable<Text>,
        template_id -> Binary,
        context -> Text,
        subject -> Text,
        from_address -> Nullable<Text>,
        recipients_kind -> Nullable<Text>,
        scheduled -> Text,
        sent -> Nullable<Text>,
        num_tries -> Integer,
        last_exception -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    email_recipients (email_id, entity_id) {
        email_id -> Binary,
        entity_id -> Binary,
        created_at -> Text,
    }
}

diesel::table! {
    email_templates (id) {
        id -> Binary,
        name -> Text,
        text_path -> Nullable<Text>,
        text_inline -> Nullable<Text>,
        html_path -> Nullable<Text>,
        html_inline -> Nullable<Text>,
        context_loader -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    operation_locks (name) {
        name -> Text,
        locked_by -> Binary,
        locked_at -> Text,
        expires_at -> Text,
    }
}

diesel::joinable!(emails -> email_templates (template_id));
diesel::joinable!(email_recipients -> emails (email_id));

diesel::allow_tables_to_appear_in_same_query!(
    emails,
    email_recipients,
    email_templates,
    operation_locks,
);
