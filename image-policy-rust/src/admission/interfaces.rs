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

//! Core admission controller interfaces.

use super::attributes::Attributes;
use super::errors::AdmissionResult;
use std::fmt;

/// Operation is the type of resource operation being checked for admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface is an abstract, pluggable interface for Admission Control decisions.
pub trait Interface: Send + Sync {
    /// Returns true if this admission controller can handle the given operation.
    fn handles(&self, operation: Operation) -> bool;
}

/// ValidationInterface is implemented by admission plugins that accept or deny
/// a request without modifying it.
pub trait ValidationInterface: Interface {
    /// Validate makes an admission decision based on the request attributes.
    fn validate(&self, attributes: &dyn Attributes) -> AdmissionResult<()>;
}

/// Handler answers `handles` for a fixed list of operations; plugins embed it
/// and forward their `Interface` implementation to it.
#[derive(Debug, Clone)]
pub struct Handler {
    operations: Vec<Operation>,
}

impl Handler {
    pub fn new(operations: &[Operation]) -> Self {
        let mut ops = Vec::with_capacity(operations.len());
        for op in operations {
            if !ops.contains(op) {
                ops.push(*op);
            }
        }
        Self { operations: ops }
    }

    /// Handler for Create and Update, the operations that introduce new images.
    pub fn new_create_update() -> Self {
        Self::new(&[Operation::Create, Operation::Update])
    }
}

impl Interface for Handler {
    fn handles(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}
