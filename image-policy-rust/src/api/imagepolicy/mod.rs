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

//! Image policy configuration API.
//!
//! An `ImagePolicyConfig` is a list of execution rules. Each rule carries an
//! image condition (which resources it applies to, and which images it
//! matches) and whether a match rejects or accepts the image. Documents are
//! read as YAML; JSON documents load unchanged.
//!
//! ```yaml
//! kind: ImagePolicyConfig
//! executionRules:
//! - name: only-signed
//!   onResources:
//!   - resource: pods
//!   matchImageAnnotations:
//!   - key: images.example.com/signed
//!     value: "true"
//! - name: no-untrusted-registry
//!   reject: true
//!   matchRegistries: ["untrusted.example.com"]
//! ```

use crate::admission::attributes::GroupResource;
use crate::admission::{AdmissionError, AdmissionResult};
use crate::api::core::resource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Kind accepted in the `kind` field of a policy document.
pub const IMAGE_POLICY_CONFIG_KIND: &str = "ImagePolicyConfig";

/// Namespace annotation listing rule names (comma separated) that should not
/// be applied to requests in that namespace.
pub const IGNORE_RULES_ANNOTATION: &str = "alpha.image.policy.openshift.io/ignore-rules";

/// ImagePolicyConfig is the configuration document of the image policy plugin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImagePolicyConfig {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,

    /// Rules evaluated, in order, for every image of a covered resource.
    #[serde(default)]
    pub execution_rules: Vec<ImageExecutionPolicyRule>,

    /// Hostnames of the integrated registry, used by
    /// `matchIntegratedRegistry` conditions.
    #[serde(default)]
    pub integrated_registry_hostnames: Vec<String>,
}

impl ImagePolicyConfig {
    /// Fill in omitted values: a rule without `onResources` applies to pods.
    pub fn set_defaults(&mut self) {
        for rule in &mut self.execution_rules {
            if rule.condition.on_resources.is_empty() {
                rule.condition.on_resources.push(resource("pods"));
            }
        }
    }

    pub fn validate(&self) -> AdmissionResult<()> {
        if !self.kind.is_empty() && self.kind != IMAGE_POLICY_CONFIG_KIND {
            return Err(AdmissionError::invalid_config(format!(
                "kind: Unsupported value: {:?}: supported values: {:?}",
                self.kind, IMAGE_POLICY_CONFIG_KIND
            )));
        }
        for (i, rule) in self.execution_rules.iter().enumerate() {
            if rule.condition.name.trim().is_empty() {
                return Err(AdmissionError::invalid_config(format!(
                    "executionRules[{}].name: Required value",
                    i
                )));
            }
            for (j, gr) in rule.condition.on_resources.iter().enumerate() {
                if gr.resource.is_empty() {
                    return Err(AdmissionError::invalid_config(format!(
                        "executionRules[{}].onResources[{}].resource: Required value",
                        i, j
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parse, default and validate a policy document.
pub fn load_from_str(s: &str) -> AdmissionResult<ImagePolicyConfig> {
    let mut config: ImagePolicyConfig = if s.trim().is_empty() {
        ImagePolicyConfig::default()
    } else {
        serde_yaml::from_str(s)
            .map_err(|e| AdmissionError::invalid_config(format!("invalid yaml: {e}")))?
    };
    config.set_defaults();
    config.validate()?;
    Ok(config)
}

pub fn load_from_reader(reader: &mut dyn Read) -> AdmissionResult<ImagePolicyConfig> {
    let mut s = String::new();
    reader
        .read_to_string(&mut s)
        .map_err(|e| AdmissionError::invalid_config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

/// ImageExecutionPolicyRule determines whether a matching image may run.
///
/// In documents the condition fields sit inline next to `reject`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RuleDocument", into = "RuleDocument")]
pub struct ImageExecutionPolicyRule {
    pub condition: ImageCondition,

    /// When true a match forbids the image, otherwise a match permits it.
    pub reject: bool,
}

/// Wire form of a rule. Unknown keys are errors, so a misspelled `reject`
/// cannot turn a reject rule into an accept rule.
#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
struct RuleDocument {
    name: String,
    ignore_namespace_override: bool,
    on_resources: Vec<GroupResource>,
    invert_match: bool,
    match_integrated_registry: bool,
    match_registries: Vec<String>,
    skip_on_resolution_failure: bool,
    match_docker_image_labels: Vec<ValueCondition>,
    match_image_labels: Vec<LabelSelector>,
    match_image_annotations: Vec<ValueCondition>,
    reject: bool,
}

impl From<RuleDocument> for ImageExecutionPolicyRule {
    fn from(doc: RuleDocument) -> Self {
        Self {
            condition: ImageCondition {
                name: doc.name,
                ignore_namespace_override: doc.ignore_namespace_override,
                on_resources: doc.on_resources,
                invert_match: doc.invert_match,
                match_integrated_registry: doc.match_integrated_registry,
                match_registries: doc.match_registries,
                skip_on_resolution_failure: doc.skip_on_resolution_failure,
                match_docker_image_labels: doc.match_docker_image_labels,
                match_image_labels: doc.match_image_labels,
                match_image_annotations: doc.match_image_annotations,
            },
            reject: doc.reject,
        }
    }
}

impl From<ImageExecutionPolicyRule> for RuleDocument {
    fn from(rule: ImageExecutionPolicyRule) -> Self {
        let c = rule.condition;
        Self {
            name: c.name,
            ignore_namespace_override: c.ignore_namespace_override,
            on_resources: c.on_resources,
            invert_match: c.invert_match,
            match_integrated_registry: c.match_integrated_registry,
            match_registries: c.match_registries,
            skip_on_resolution_failure: c.skip_on_resolution_failure,
            match_docker_image_labels: c.match_docker_image_labels,
            match_image_labels: c.match_image_labels,
            match_image_annotations: c.match_image_annotations,
            reject: rule.reject,
        }
    }
}

impl ImageExecutionPolicyRule {
    pub fn accept(condition: ImageCondition) -> Self {
        Self {
            condition,
            reject: false,
        }
    }

    pub fn reject(condition: ImageCondition) -> Self {
        Self {
            condition,
            reject: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.condition.name
    }
}

/// ImageCondition describes the images and resources a rule applies to.
/// All populated criteria must hold for the condition to match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ImageCondition {
    pub name: String,

    /// Apply this rule even when the namespace lists it in the ignore-rules annotation.
    pub ignore_namespace_override: bool,

    /// Resources this rule is evaluated for.
    pub on_resources: Vec<GroupResource>,

    /// Invert the final result of the match.
    pub invert_match: bool,

    /// Match only images pulled from the integrated registry.
    pub match_integrated_registry: bool,

    /// Match only images pulled from one of these registry hosts.
    pub match_registries: Vec<String>,

    /// Skip this rule entirely when the image could not be resolved.
    pub skip_on_resolution_failure: bool,

    /// Conditions over the labels baked into the image config.
    pub match_docker_image_labels: Vec<ValueCondition>,

    /// Label selectors over the image object's labels; all must match.
    pub match_image_labels: Vec<LabelSelector>,

    /// Conditions over the image object's annotations.
    pub match_image_annotations: Vec<ValueCondition>,
}

impl ImageCondition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn on(mut self, gr: GroupResource) -> Self {
        self.on_resources.push(gr);
        self
    }

    /// True when the condition inspects image metadata and so cannot be
    /// evaluated without a resolved image.
    pub fn requires_image(&self) -> bool {
        !self.match_image_labels.is_empty()
            || !self.match_image_annotations.is_empty()
            || !self.match_docker_image_labels.is_empty()
    }
}

/// ValueCondition tests a key in a string map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueCondition {
    pub key: String,
    /// Only require the key to be present.
    #[serde(default)]
    pub set: bool,
    /// Required value when `set` is false.
    #[serde(default)]
    pub value: String,
}

impl ValueCondition {
    pub fn present(key: &str) -> Self {
        Self {
            key: key.to_string(),
            set: true,
            value: String::new(),
        }
    }

    pub fn equals(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            set: false,
            value: value.to_string(),
        }
    }
}

/// LabelSelectorOperator represents an operator for label selector requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// LabelSelectorRequirement is a selector that contains values, a key, and an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: LabelSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

/// LabelSelector is a label query; the result of match_labels and
/// match_expressions are ANDed. An empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<LabelSelectorRequirement>,
}
