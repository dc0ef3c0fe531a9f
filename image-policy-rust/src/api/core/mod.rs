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

//! Core Kubernetes API types the image policy plugin inspects (Pod, Container, Namespace).

use crate::admission::attributes::GroupResource;
use std::any::Any;
use std::collections::HashMap;

/// ApiObject is a trait for Kubernetes API objects that can be used in admission.
pub trait ApiObject: Send + Sync {
    /// Returns the object as Any for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the kind of this object.
    fn kind(&self) -> &str;
}

/// Container represents a single container in a pod.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    pub name: String,
    /// Container image reference as written in the pod spec.
    pub image: String,
}

impl Container {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
        }
    }
}

/// PodSpec describes the containers of a pod.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PodSpec {
    pub init_containers: Vec<Container>,
    pub containers: Vec<Container>,
    pub ephemeral_containers: Vec<Container>,
}

impl PodSpec {
    /// Visit every container together with its field path, init containers
    /// first. Returning false from the visitor stops the walk.
    pub fn visit_containers_with_path<F>(&self, base_path: &str, mut visitor: F) -> bool
    where
        F: FnMut(&Container, String) -> bool,
    {
        let groups = [
            ("initContainers", &self.init_containers),
            ("containers", &self.containers),
            ("ephemeralContainers", &self.ephemeral_containers),
        ];
        for (field, containers) in groups {
            for (i, c) in containers.iter().enumerate() {
                if !visitor(c, format!("{}.{}[{}]", base_path, field, i)) {
                    return false;
                }
            }
        }
        true
    }
}

/// Pod represents a Kubernetes Pod.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub spec: PodSpec,
}

impl Pod {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Convenience constructor for a pod with one regular container per image.
    pub fn with_images(name: &str, namespace: &str, images: &[&str]) -> Self {
        let mut pod = Self::new(name, namespace);
        pod.spec.containers = images
            .iter()
            .enumerate()
            .map(|(i, image)| Container::new(&format!("c{}", i), image))
            .collect();
        pod
    }
}

impl ApiObject for Pod {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &str {
        "Pod"
    }
}

/// Namespace represents a Kubernetes Namespace; only its annotations matter here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Namespace {
    pub name: String,
    pub annotations: HashMap<String, String>,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            annotations: HashMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }
}

impl ApiObject for Namespace {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> &str {
        "Namespace"
    }
}

/// Helper to create a core API resource GroupResource.
pub fn resource(name: &str) -> GroupResource {
    GroupResource::new("", name)
}
