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

//! Email Template Model
//!
//! A template definition names, per channel (text and HTML), either a
//! filesystem asset path or an inline template string. The shape is
//! validated at save time, not at render time.

use serde::{Deserialize, Serialize};

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::EmailerError;

/// A rendering contract stored in the `email_templates` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: UniversalUuid,
    /// Unique lookup name; event contexts reference templates by this name
    pub name: String,
    pub text_path: Option<String>,
    pub text_inline: Option<String>,
    pub html_path: Option<String>,
    pub html_inline: Option<String>,
    /// Registry key of the context transform applied before rendering
    pub context_loader: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// Fields for creating a new template definition.
#[derive(Debug, Clone, Default)]
pub struct NewEmailTemplate {
    pub name: String,
    pub text_path: Option<String>,
    pub text_inline: Option<String>,
    pub html_path: Option<String>,
    pub html_inline: Option<String>,
    pub context_loader: Option<String>,
}

impl NewEmailTemplate {
    /// Validates the template shape invariant: per channel at most one of
    /// {path, inline} may be set, and at least one of the four fields must
    /// be set overall.
    pub fn validate(&self) -> Result<(), EmailerError> {
        if self.text_path.is_some() && self.text_inline.is_some() {
            return Err(EmailerError::Validation(format!(
                "template `{}` sets both text_path and text_inline",
                self.name
            )));
        }
        if self.html_path.is_some() && self.html_inline.is_some() {
            return Err(EmailerError::Validation(format!(
                "template `{}` sets both html_path and html_inline",
                self.name
            )));
        }
        if self.text_path.is_none()
            && self.text_inline.is_none()
            && self.html_path.is_none()
            && self.html_inline.is_none()
        {
            return Err(EmailerError::Validation(format!(
                "template `{}` defines no content for either channel",
                self.name
            )));
        }
        Ok(())
    }
}
