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

//! Image API types: resolved image metadata and parsed image references.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Image is the resolved descriptor of a container image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Image {
    /// Image name, usually the content digest.
    pub name: String,
    /// Labels on the image object.
    pub labels: HashMap<String, String>,
    /// Annotations on the image object.
    pub annotations: HashMap<String, String>,
    /// Pull spec the image was resolved to.
    pub docker_image_reference: String,
    /// Labels baked into the image config (`LABEL` instructions).
    pub docker_image_labels: HashMap<String, String>,
}

impl Image {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_docker_label(mut self, key: &str, value: &str) -> Self {
        self.docker_image_labels
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Errors returned when an image reference cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("image reference is empty")]
    Empty,
    #[error("invalid reference format: {0:?}")]
    InvalidFormat(String),
    #[error("invalid tag: {0:?}")]
    InvalidTag(String),
    #[error("invalid digest: {0:?}")]
    InvalidDigest(String),
}

/// DockerImageReference points to a container image:
/// `[registry/][namespace/]name[:tag][@id]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DockerImageReference {
    pub registry: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub id: String,
}

impl DockerImageReference {
    /// Parse a pull spec.
    pub fn parse(spec: &str) -> Result<Self, ReferenceError> {
        if spec.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (rest, id) = match spec.split_once('@') {
            Some((rest, id)) => {
                validate_digest(id)?;
                (rest, id.to_string())
            }
            None => (spec, String::new()),
        };

        let (path, tag) = split_tag(rest)?;

        let mut components: Vec<&str> = path.split('/').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(ReferenceError::InvalidFormat(spec.to_string()));
        }

        let mut reference = DockerImageReference {
            tag,
            id,
            ..Default::default()
        };

        if components.len() > 1 && looks_like_registry(components[0]) {
            let registry = components.remove(0);
            if !registry
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
            {
                return Err(ReferenceError::InvalidFormat(spec.to_string()));
            }
            reference.registry = registry.to_string();
        }

        if !components.iter().all(|c| is_valid_path_component(c)) {
            return Err(ReferenceError::InvalidFormat(spec.to_string()));
        }

        match components.as_slice() {
            [name] => reference.name = name.to_string(),
            [namespace, rest @ ..] => {
                reference.namespace = namespace.to_string();
                reference.name = rest.join("/");
            }
            [] => return Err(ReferenceError::InvalidFormat(spec.to_string())),
        }

        Ok(reference)
    }
}

impl FromStr for DockerImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DockerImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.registry.is_empty() {
            write!(f, "{}/", self.registry)?;
        }
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        f.write_str(&self.name)?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        if !self.id.is_empty() {
            write!(f, "@{}", self.id)?;
        }
        Ok(())
    }
}

fn looks_like_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn is_valid_path_component(component: &str) -> bool {
    let mut chars = component.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Split a trailing `:tag` off the last path component. A colon before the
/// last slash belongs to a registry port.
fn split_tag(rest: &str) -> Result<(&str, String), ReferenceError> {
    let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
    match rest[last_slash..].rfind(':') {
        Some(i) => {
            let split = last_slash + i;
            let tag = &rest[split + 1..];
            let valid = !tag.is_empty()
                && tag.len() <= 128
                && !tag.starts_with(['.', '-'])
                && tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
            if !valid {
                return Err(ReferenceError::InvalidTag(tag.to_string()));
            }
            Ok((&rest[..split], tag.to_string()))
        }
        None => Ok((rest, String::new())),
    }
}

fn validate_digest(id: &str) -> Result<(), ReferenceError> {
    match id.split_once(':') {
        Some((algorithm, hex))
            if !algorithm.is_empty()
                && !hex.is_empty()
                && algorithm
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '+')
                && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            Ok(())
        }
        _ => Err(ReferenceError::InvalidDigest(id.to_string())),
    }
}
