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

//! Context loader registry.
//!
//! A template may name a context loader: a transform applied to the stored
//! event context before rendering, typically to hydrate stored identifiers
//! into full objects. Loaders are registered explicitly by name at startup;
//! a template referencing an unregistered name fails the render for that
//! record rather than crashing the batch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RenderError;

/// A registered context transform.
///
/// Receives the stored context and returns the context the template renders
/// against. Must be pure with respect to its input; failures surface as
/// [`RenderError::ContextLoader`].
pub type ContextLoaderFn =
    Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync>;

/// Explicit name-to-transform registry for context loaders.
#[derive(Clone, Default)]
pub struct ContextLoaderRegistry {
    loaders: HashMap<String, ContextLoaderFn>,
}

impl ContextLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loader under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: &str, loader: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.loaders.insert(name.to_string(), Arc::new(loader));
    }

    /// Applies the loader registered under `name` to `context`.
    pub fn apply(
        &self,
        name: &str,
        context: serde_json::Value,
    ) -> Result<serde_json::Value, RenderError> {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| RenderError::UnknownContextLoader(name.to_string()))?;

        loader(context).map_err(|message| RenderError::ContextLoader {
            loader: name.to_string(),
            message,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }
}

impl std::fmt::Debug for ContextLoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLoaderRegistry")
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}
