// Copyright 2024 The Kubernetes Authors.
// Licensed under the Apache License, Version 2.0

//! Image condition classification and matching.

use super::registry::RegistryMatcher;
use super::selector::Selector;
use super::ImagePolicyAttributes;
use crate::admission::attributes::GroupResource;
use crate::admission::{AdmissionError, AdmissionResult};
use crate::api::imagepolicy::{ImageCondition, ValueCondition};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// MatchCondition is an `ImageCondition` with its label selectors compiled.
#[derive(Debug, Clone)]
pub struct MatchCondition {
    condition: ImageCondition,
    selectors: Vec<Selector>,
}

impl MatchCondition {
    pub fn condition(&self) -> &ImageCondition {
        &self.condition
    }

    pub fn name(&self) -> &str {
        &self.condition.name
    }
}

/// Classify a condition: the resources it covers and its compiled form.
/// Fails if any of its label selectors is malformed.
pub fn classify_condition(
    condition: &ImageCondition,
) -> AdmissionResult<(HashSet<GroupResource>, MatchCondition)> {
    let covers: HashSet<GroupResource> = condition.on_resources.iter().cloned().collect();

    let selectors = condition
        .match_image_labels
        .iter()
        .enumerate()
        .map(|(i, selector)| {
            Selector::compile(selector).map_err(|e| {
                AdmissionError::invalid_config(format!(
                    "rule {:?}: matchImageLabels[{}]: {}",
                    condition.name, i, e
                ))
            })
        })
        .collect::<AdmissionResult<Vec<_>>>()?;

    Ok((
        covers,
        MatchCondition {
            condition: condition.clone(),
            selectors,
        },
    ))
}

/// Determine whether the image described by `attrs` satisfies the condition,
/// honoring `invert_match`.
pub fn matches(
    condition: &MatchCondition,
    integrated: &dyn RegistryMatcher,
    attrs: &ImagePolicyAttributes,
) -> bool {
    let result = match_values(condition, integrated, attrs);
    let invert = condition.condition.invert_match;
    trace!(
        condition = condition.name(),
        result,
        invert,
        "image matches conditions"
    );
    result != invert
}

fn match_values(
    condition: &MatchCondition,
    integrated: &dyn RegistryMatcher,
    attrs: &ImagePolicyAttributes,
) -> bool {
    let rule = &condition.condition;
    let registry = attrs.name.registry.as_str();

    if rule.match_integrated_registry && !(attrs.integrated_registry || integrated.matches(registry))
    {
        return false;
    }
    if !rule.match_registries.is_empty() && !rule.match_registries.iter().any(|r| r == registry) {
        return false;
    }

    // everything below inspects the resolved image
    let image = match &attrs.image {
        Some(image) => image,
        None => {
            if rule.skip_on_resolution_failure {
                return false;
            }
            return !rule.requires_image();
        }
    };

    if !match_key_value(&image.docker_image_labels, &rule.match_docker_image_labels) {
        return false;
    }
    if !match_key_value(&image.annotations, &rule.match_image_annotations) {
        return false;
    }
    condition.selectors.iter().all(|s| s.matches(&image.labels))
}

fn match_key_value(all: &HashMap<String, String>, conditions: &[ValueCondition]) -> bool {
    conditions.iter().all(|c| {
        if c.set {
            all.contains_key(&c.key)
        } else {
            all.get(&c.key).map(String::as_str).unwrap_or_default() == c.value
        }
    })
}
