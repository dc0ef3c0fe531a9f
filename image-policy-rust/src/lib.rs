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

//! Image policy admission.
//!
//! Decides whether the container images of an admission request may run,
//! based on ordered accept/reject execution rules grouped by resource. The
//! decision core lives in [`plugins::imagepolicy::rules`]; the
//! [`plugins::imagepolicy::ImagePolicy`] plugin wires it into the admission
//! interfaces.

pub mod admission;
pub mod api;
pub mod plugins;

// Re-export commonly used types
pub use admission::{
    AdmissionError, AdmissionResult, Attributes, AttributesRecord, GroupResource, Interface,
    Operation, ValidationInterface,
};
pub use api::imagepolicy::{ImageCondition, ImageExecutionPolicyRule, ImagePolicyConfig};
pub use plugins::imagepolicy::rules::{
    new_execution_rules_accepter, Accepter, ImagePolicyAttributes, RegistryMatcher,
};
pub use plugins::imagepolicy::ImagePolicy;
