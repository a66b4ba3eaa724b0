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

//! # Template Rendering
//!
//! Renders an email's text and HTML bodies from its template definition and
//! stored context. Each channel comes from either a filesystem asset under
//! the configured template directory or an inline template string; a channel
//! with neither renders to nothing.
//!
//! Before rendering, the stored context is passed through the template's
//! context loader (if it names one) and the email's view token is injected
//! under `email_view_id` so templates can build browser-view links.

pub mod context_loader;
pub mod subject;

pub use context_loader::{ContextLoaderFn, ContextLoaderRegistry};
pub use subject::extract_subject;

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use tracing::debug;

use crate::database::universal_types::UniversalUuid;
use crate::error::RenderError;
use crate::models::template::EmailTemplate;

/// Context key under which the email's view token is exposed to templates.
pub const VIEW_ID_CONTEXT_KEY: &str = "email_view_id";

/// Rendered bodies for both channels. At least one is `Some` for any
/// template that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl RenderedBody {
    /// The content subject derivation should read: HTML when present,
    /// otherwise text.
    pub fn subject_source(&self) -> &str {
        self.html
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

/// Stateless template renderer.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    template_dir: PathBuf,
    registry: ContextLoaderRegistry,
}

impl TemplateRenderer {
    pub fn new(template_dir: impl Into<PathBuf>, registry: ContextLoaderRegistry) -> Self {
        let mut handlebars = Handlebars::new();
        // Email templates routinely omit optional context keys.
        handlebars.set_strict_mode(false);
        Self {
            handlebars,
            template_dir: template_dir.into(),
            registry,
        }
    }

    /// Renders both channels of `template` against the email's stored
    /// context.
    pub fn render(
        &self,
        template: &EmailTemplate,
        context: &serde_json::Value,
        view_uid: UniversalUuid,
    ) -> Result<RenderedBody, RenderError> {
        let context = self.assemble_context(template, context, view_uid)?;

        let text = self.render_channel(
            template.text_path.as_deref(),
            template.text_inline.as_deref(),
            &context,
        )?;
        let html = self.render_channel(
            template.html_path.as_deref(),
            template.html_inline.as_deref(),
            &context,
        )?;

        debug!(
            template = %template.name,
            has_text = text.is_some(),
            has_html = html.is_some(),
            "Rendered email bodies"
        );

        Ok(RenderedBody { text, html })
    }

    /// Builds the effective render context: the stored context passed
    /// through the template's context loader, with the view token injected.
    fn assemble_context(
        &self,
        template: &EmailTemplate,
        context: &serde_json::Value,
        view_uid: UniversalUuid,
    ) -> Result<serde_json::Value, RenderError> {
        let mut context = match &template.context_loader {
            Some(loader) => self.registry.apply(loader, context.clone())?,
            None => context.clone(),
        };

        if let serde_json::Value::Object(map) = &mut context {
            map.insert(
                VIEW_ID_CONTEXT_KEY.to_string(),
                serde_json::Value::String(view_uid.to_string()),
            );
        }

        Ok(context)
    }

    /// Renders one channel: a filesystem asset if `path` is set, the inline
    /// string if `inline` is set, nothing if neither.
    fn render_channel(
        &self,
        path: Option<&str>,
        inline: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<Option<String>, RenderError> {
        let source = match (path, inline) {
            (Some(path), _) => self.read_asset(path)?,
            (None, Some(inline)) => inline.to_string(),
            (None, None) => return Ok(None),
        };

        let rendered = self.handlebars.render_template(&source, context)?;
        Ok(Some(rendered))
    }

    fn read_asset(&self, path: &str) -> Result<String, RenderError> {
        let full_path = self.template_dir.join(path);
        if !Path::new(&full_path).exists() {
            return Err(RenderError::MissingAsset {
                path: full_path.display().to_string(),
            });
        }
        std::fs::read_to_string(&full_path).map_err(|source| RenderError::Io {
            path: full_path.display().to_string(),
            source,
        })
    }
}
