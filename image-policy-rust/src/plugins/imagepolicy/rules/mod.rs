// Copyright 2024 The Kubernetes Authors.
// Licensed under the Apache License, Version 2.0

//! Image execution rules: classification, matching and per-resource accepters.

pub mod accept;
pub mod matching;
pub mod registry;
pub mod selector;

use crate::admission::attributes::GroupResource;
use crate::api::image::{DockerImageReference, Image};
use std::collections::HashSet;

pub use accept::{new_execution_rules_accepter, Accepter, ExecutionAccepter, MappedAccepter};
pub use registry::{NameSet, RegistryMatcher};

/// ImagePolicyAttributes describes one image of an admission request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImagePolicyAttributes {
    /// Resource the image was found on.
    pub resource: GroupResource,
    /// Image reference as requested.
    pub name: DockerImageReference,
    /// Resolved image; `None` when resolution failed.
    pub image: Option<Image>,
    /// Rules the namespace asked to be ignored.
    pub excluded_rules: HashSet<String>,
    /// Set when the image is known to come from the integrated registry.
    pub integrated_registry: bool,
}
