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

//! Data access layer for email templates.
//!
//! Template shape validation happens here, at save time, so a render can
//! trust any template it loads.

use diesel::prelude::*;

use super::models::{current_timestamp_string, uuid_to_blob, NewSqliteEmailTemplate, SqliteEmailTemplate};
use super::DAL;
use crate::database::schema::email_templates;
use crate::database::universal_types::UniversalUuid;
use crate::error::EmailerError;
use crate::models::template::{EmailTemplate, NewEmailTemplate};

/// Data access layer for template definitions.
pub struct TemplateDAL<'a> {
    pub(crate) dal: &'a DAL,
}

impl<'a> TemplateDAL<'a> {
    /// Creates a new template definition.
    ///
    /// Validates the shape invariant before writing. Template names are
    /// unique; inserting a duplicate name is a database error.
    pub async fn create(&self, new_template: NewEmailTemplate) -> Result<EmailTemplate, EmailerError> {
        new_template.validate()?;

        let conn = self.dal.database.get().await?;

        conn.interact(move |conn| {
            let id = UniversalUuid::new_v4();
            let now = current_timestamp_string();

            let row = NewSqliteEmailTemplate {
                id: uuid_to_blob(&id.0),
                name: new_template.name,
                text_path: new_template.text_path,
                text_inline: new_template.text_inline,
                html_path: new_template.html_path,
                html_inline: new_template.html_inline,
                context_loader: new_template.context_loader,
                created_at: now.clone(),
                updated_at: now,
            };

            diesel::insert_into(email_templates::table)
                .values(&row)
                .execute(conn)?;

            let stored: SqliteEmailTemplate = email_templates::table
                .filter(email_templates::id.eq(uuid_to_blob(&id.0)))
                .first(conn)?;
            Ok::<_, EmailerError>(stored.into())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Retrieves a template by id.
    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<EmailTemplate, EmailerError> {
        let conn = self.dal.database.get().await?;
        let blob = uuid_to_blob(&id.0);

        conn.interact(move |conn| {
            let row: SqliteEmailTemplate = email_templates::table
                .filter(email_templates::id.eq(blob))
                .first(conn)?;
            Ok::<_, EmailerError>(row.into())
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }

    /// Retrieves a template by its unique name, if one exists.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<EmailTemplate>, EmailerError> {
        let conn = self.dal.database.get().await?;
        let name = name.to_string();

        conn.interact(move |conn| {
            let row: Option<SqliteEmailTemplate> = email_templates::table
                .filter(email_templates::name.eq(name))
                .first(conn)
                .optional()?;
            Ok::<_, EmailerError>(row.map(Into::into))
        })
        .await
        .map_err(|e| EmailerError::ConnectionPool(e.to_string()))?
    }
}
