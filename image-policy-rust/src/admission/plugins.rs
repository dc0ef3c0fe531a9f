// Copyright 2024 The Kubernetes Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Plugin registry for admission controllers.

use super::errors::{AdmissionError, AdmissionResult};
use super::interfaces::ValidationInterface;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Factory builds a plugin from an optional configuration document.
pub type Factory =
    fn(config: Option<&mut dyn Read>) -> AdmissionResult<Arc<dyn ValidationInterface>>;

/// Plugins is a registry of admission plugin factories, keyed by plugin name.
#[derive(Default)]
pub struct Plugins {
    registry: RwLock<BTreeMap<String, Factory>>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. A later registration under the same
    /// name replaces the earlier one.
    pub fn register(&self, name: &str, factory: Factory) {
        let mut registry = self.registry.write().expect("plugin registry lock poisoned");
        if registry.insert(name.to_string(), factory).is_some() {
            warn!(plugin = name, "admission plugin registered twice, keeping the latest factory");
        } else {
            debug!(plugin = name, "registered admission plugin");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry
            .read()
            .expect("plugin registry lock poisoned")
            .contains_key(name)
    }

    /// Registered plugin names in sorted order.
    pub fn registered_names(&self) -> Vec<String> {
        self.registry
            .read()
            .expect("plugin registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Create a new instance of the named plugin, handing it `config`.
    pub fn new_from_plugins(
        &self,
        name: &str,
        config: Option<&mut dyn Read>,
    ) -> AdmissionResult<Arc<dyn ValidationInterface>> {
        let factory = self
            .registry
            .read()
            .expect("plugin registry lock poisoned")
            .get(name)
            .copied()
            .ok_or_else(|| AdmissionError::internal_error(format!("unknown admission plugin: {}", name)))?;
        factory(config)
    }
}
