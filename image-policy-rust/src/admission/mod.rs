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

//! Admission controller interfaces and types.
//!
//! The request attributes, plugin traits, registry and error types the image
//! policy plugin is built on.

pub mod attributes;
pub mod errors;
mod interfaces;
mod plugins;

pub use attributes::{Attributes, AttributesRecord, GroupResource};
pub use errors::{AdmissionError, AdmissionResult};
pub use interfaces::{Handler, Interface, Operation, ValidationInterface};
pub use plugins::{Factory, Plugins};
