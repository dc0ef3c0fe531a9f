// Copyright 2024 The Kubernetes Authors.
// Licensed under the Apache License, Version 2.0

//! ImagePolicy admission controller.
//!
//! Evaluates every container image of a pod against the configured execution
//! rules and forbids the request if any image is rejected. Rules are loaded
//! from an `ImagePolicyConfig`; a new configuration replaces the active rule
//! set as a whole and only once it compiled successfully.

pub mod rules;

use crate::admission::errors::{field_forbidden, field_invalid};
use crate::admission::{
    AdmissionError, AdmissionResult, Attributes, Handler, Interface, Operation, Plugins,
    ValidationInterface,
};
use crate::api::core::{Namespace, Pod};
use crate::api::image::{DockerImageReference, Image};
use crate::api::imagepolicy::{load_from_reader, ImagePolicyConfig, IGNORE_RULES_ANNOTATION};
use rules::{new_execution_rules_accepter, Accepter, ImagePolicyAttributes, NameSet};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub const PLUGIN_NAME: &str = "ImagePolicy";

const PROHIBITED: &str = "this image is prohibited by policy";

/// Register the ImagePolicy plugin. The optional configuration is an
/// `ImagePolicyConfig` document; without one no resource is covered.
pub fn register(plugins: &Plugins) {
    plugins.register(PLUGIN_NAME, |config: Option<&mut dyn Read>| {
        let config = match config {
            Some(reader) => load_from_reader(reader)?,
            None => ImagePolicyConfig::default(),
        };
        let plugin = ImagePolicy::new(&config, Arc::new(InMemoryImageResolver::new()), None)?;
        Ok(Arc::new(plugin) as Arc<dyn ValidationInterface>)
    });
}

/// ImageResolver looks up image metadata for a reference.
pub trait ImageResolver: Send + Sync {
    /// Returns `None` when the image cannot be resolved.
    fn resolve(&self, reference: &DockerImageReference, namespace: &str) -> Option<Image>;

    /// Whether the reference points into the integrated registry.
    fn is_integrated(&self, _reference: &DockerImageReference) -> bool {
        false
    }
}

/// In-memory resolver keyed by the canonical reference string.
#[derive(Debug, Default)]
pub struct InMemoryImageResolver {
    images: RwLock<HashMap<String, Image>>,
}

impl InMemoryImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, reference: &str, image: Image) {
        self.images
            .write()
            .expect("image store lock poisoned")
            .insert(reference.to_string(), image);
    }
}

impl ImageResolver for InMemoryImageResolver {
    fn resolve(&self, reference: &DockerImageReference, _namespace: &str) -> Option<Image> {
        self.images
            .read()
            .expect("image store lock poisoned")
            .get(&reference.to_string())
            .cloned()
    }
}

/// NamespaceLister provides the namespace objects whose annotations carry
/// rule exclusions.
pub trait NamespaceLister: Send + Sync {
    fn get(&self, name: &str) -> Option<Namespace>;
}

#[derive(Debug, Default)]
pub struct InMemoryNamespaceLister {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryNamespaceLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, namespace: Namespace) {
        self.namespaces
            .write()
            .expect("namespace store lock poisoned")
            .insert(namespace.name.clone(), namespace);
    }
}

impl NamespaceLister for InMemoryNamespaceLister {
    fn get(&self, name: &str) -> Option<Namespace> {
        self.namespaces
            .read()
            .expect("namespace store lock poisoned")
            .get(name)
            .cloned()
    }
}

/// Rule names listed in the namespace's ignore-rules annotation.
pub fn excluded_rules(namespace: &Namespace) -> HashSet<String> {
    namespace
        .annotations
        .get(IGNORE_RULES_ANNOTATION)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn build_accepter(config: &ImagePolicyConfig) -> AdmissionResult<Arc<dyn Accepter>> {
    let integrated = Arc::new(NameSet::new(config.integrated_registry_hostnames.iter().cloned()));
    let accepter = new_execution_rules_accepter(&config.execution_rules, integrated)?;
    info!(
        rules = config.execution_rules.len(),
        resources = accepter.len(),
        "image policy execution rules loaded"
    );
    Ok(Arc::new(accepter))
}

/// ImagePolicy is a validating admission plugin backed by execution rules.
pub struct ImagePolicy {
    handler: Handler,
    accepter: RwLock<Arc<dyn Accepter>>,
    resolver: Arc<dyn ImageResolver>,
    namespaces: Option<Arc<dyn NamespaceLister>>,
}

impl ImagePolicy {
    pub fn new(
        config: &ImagePolicyConfig,
        resolver: Arc<dyn ImageResolver>,
        namespaces: Option<Arc<dyn NamespaceLister>>,
    ) -> AdmissionResult<Self> {
        Ok(Self {
            handler: Handler::new_create_update(),
            accepter: RwLock::new(build_accepter(config)?),
            resolver,
            namespaces,
        })
    }

    /// Replace the active rules. On error the previous rules stay in effect.
    pub fn reconfigure(&self, config: &ImagePolicyConfig) -> AdmissionResult<()> {
        let accepter = build_accepter(config).map_err(|e| {
            warn!(error = %e, "image policy reconfiguration failed, keeping previous rules");
            e
        })?;
        *self.accepter.write().expect("accepter lock poisoned") = accepter;
        Ok(())
    }

    /// The active accepter. Callers keep evaluating against the snapshot they
    /// took even if a reconfiguration happens meanwhile.
    pub fn accepter(&self) -> Arc<dyn Accepter> {
        Arc::clone(&*self.accepter.read().expect("accepter lock poisoned"))
    }

    fn excluded_rules_for(&self, namespace: &str) -> HashSet<String> {
        self.namespaces
            .as_ref()
            .and_then(|lister| lister.get(namespace))
            .map(|ns| excluded_rules(&ns))
            .unwrap_or_default()
    }
}

impl Interface for ImagePolicy {
    fn handles(&self, operation: Operation) -> bool {
        self.handler.handles(operation)
    }
}

impl ValidationInterface for ImagePolicy {
    fn validate(&self, attributes: &dyn Attributes) -> AdmissionResult<()> {
        if !attributes.get_subresource().is_empty() {
            return Ok(());
        }

        let gr = attributes.get_resource().group_resource();
        let accepter = self.accepter();
        if !accepter.covers(&gr) {
            return Ok(());
        }

        let pod = attributes
            .get_object()
            .and_then(|obj| obj.as_any().downcast_ref::<Pod>())
            .ok_or_else(|| {
                AdmissionError::bad_request(
                    "Resource was marked with kind Pod but was unable to be converted",
                )
            })?;

        let namespace = attributes.get_namespace();
        let excluded = self.excluded_rules_for(namespace);
        let mut errors = Vec::new();

        pod.spec.visit_containers_with_path("spec", |container, path| {
            let field = format!("{}.image", path);
            let reference = match DockerImageReference::parse(&container.image) {
                Ok(reference) => reference,
                Err(e) => {
                    errors.push(AdmissionError::forbidden(
                        attributes.get_name(),
                        namespace,
                        &gr.resource,
                        field_invalid(&field, &container.image, &e.to_string()),
                    ));
                    return true;
                }
            };

            let image = self.resolver.resolve(&reference, namespace);
            let policy_attrs = ImagePolicyAttributes {
                resource: gr.clone(),
                integrated_registry: self.resolver.is_integrated(&reference),
                name: reference,
                image,
                excluded_rules: excluded.clone(),
            };

            if !accepter.accepts(&policy_attrs) {
                debug!(
                    pod = attributes.get_name(),
                    namespace,
                    image = %policy_attrs.name,
                    "image rejected by policy"
                );
                errors.push(AdmissionError::forbidden(
                    attributes.get_name(),
                    namespace,
                    &gr.resource,
                    field_forbidden(&field, PROHIBITED),
                ));
            }
            true
        });

        AdmissionError::from_errors(errors)
    }
}
