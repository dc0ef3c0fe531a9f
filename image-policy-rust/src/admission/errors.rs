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

//! Admission error types.

use std::fmt;
use thiserror::Error;

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// AdmissionError represents errors that can occur while configuring or running
/// an admission plugin.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// BadRequest indicates a malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Forbidden indicates the request is not allowed.
    #[error("{0}")]
    Forbidden(ForbiddenError),

    /// Aggregate represents multiple errors.
    #[error("{0}")]
    Aggregate(AggregateError),

    /// InvalidConfig is returned when a policy document cannot be loaded or
    /// one of its rules cannot be compiled.
    #[error("invalid image policy configuration: {0}")]
    InvalidConfig(String),

    /// Internal represents an internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Create a new BadRequest error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AdmissionError::BadRequest(msg.into())
    }

    /// Create a new Forbidden error.
    pub fn forbidden(
        name: impl Into<String>,
        namespace: impl Into<String>,
        resource: impl Into<String>,
        field_error: FieldError,
    ) -> Self {
        AdmissionError::Forbidden(ForbiddenError {
            name: name.into(),
            namespace: namespace.into(),
            resource: resource.into(),
            field_error,
        })
    }

    /// Collapse a list of errors: none is `Ok`, one is returned as is and
    /// several are wrapped in an `Aggregate`.
    pub fn from_errors(mut errors: Vec<AdmissionError>) -> AdmissionResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(AdmissionError::Aggregate(AggregateError { errors })),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        AdmissionError::InvalidConfig(msg.into())
    }

    /// Create an Internal error.
    pub fn internal_error(msg: impl Into<String>) -> Self {
        AdmissionError::Internal(msg.into())
    }

    /// Returns true if the error denies the request, as opposed to signalling
    /// a malformed request or a broken plugin.
    pub fn is_forbidden(&self) -> bool {
        match self {
            AdmissionError::Forbidden(_) => true,
            AdmissionError::Aggregate(agg) => agg.errors.iter().all(|e| e.is_forbidden()),
            _ => false,
        }
    }
}

/// ForbiddenError represents a forbidden admission error with field details.
#[derive(Debug)]
pub struct ForbiddenError {
    pub name: String,
    pub namespace: String,
    pub resource: String,
    pub field_error: FieldError,
}

impl fmt::Display for ForbiddenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" is forbidden: {}",
            self.resource, self.name, self.field_error
        )
    }
}

/// FieldError represents a field-level error.
#[derive(Debug)]
pub struct FieldError {
    pub field: String,
    pub error_type: FieldErrorType,
    pub value: String,
    pub detail: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            FieldErrorType::Forbidden => {
                write!(f, "{}: Forbidden: {}", self.field, self.detail)
            }
            FieldErrorType::Invalid => {
                write!(f, "{}: Invalid value: \"{}\"", self.field, self.value)?;
                if !self.detail.is_empty() {
                    write!(f, ": {}", self.detail)?;
                }
                Ok(())
            }
        }
    }
}

/// FieldErrorType represents the type of field error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorType {
    /// Forbidden indicates the value is not permitted by policy.
    Forbidden,
    /// Invalid indicates an invalid value.
    Invalid,
}

/// AggregateError represents multiple errors.
#[derive(Debug)]
pub struct AggregateError {
    pub errors: Vec<AdmissionError>,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error_strings: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "[{}]", error_strings.join(", "))
    }
}

/// Field error for a value rejected by policy.
pub fn field_forbidden(field: &str, detail: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        error_type: FieldErrorType::Forbidden,
        value: String::new(),
        detail: detail.to_string(),
    }
}

/// Field error for a value that could not be interpreted.
pub fn field_invalid(field: &str, value: &str, detail: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        error_type: FieldErrorType::Invalid,
        value: value.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_error_display() {
        let err = AdmissionError::forbidden(
            "test-pod",
            "default",
            "pods",
            field_forbidden("spec.containers[0].image", "this image is prohibited by policy"),
        );
        assert_eq!(
            err.to_string(),
            "pods \"test-pod\" is forbidden: spec.containers[0].image: Forbidden: this image is prohibited by policy"
        );
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_invalid_field_display() {
        let err = field_invalid("spec.containers[0].image", "Bad//Ref", "invalid reference format");
        assert_eq!(
            err.to_string(),
            "spec.containers[0].image: Invalid value: \"Bad//Ref\": invalid reference format"
        );
    }

    #[test]
    fn test_from_errors() {
        assert!(AdmissionError::from_errors(vec![]).is_ok());

        let single = AdmissionError::from_errors(vec![AdmissionError::bad_request("one")]);
        assert!(matches!(single, Err(AdmissionError::BadRequest(_))));

        let many = AdmissionError::from_errors(vec![
            AdmissionError::bad_request("error 1"),
            AdmissionError::bad_request("error 2"),
        ])
        .unwrap_err();
        let msg = many.to_string();
        assert!(msg.starts_with('['));
        assert!(msg.ends_with(']'));
        assert!(msg.contains("error 1"));
        assert!(msg.contains("error 2"));
        assert!(!many.is_forbidden());
    }

    #[test]
    fn test_invalid_config_display() {
        let err = AdmissionError::invalid_config("rule \"a\": bad selector");
        assert_eq!(
            err.to_string(),
            "invalid image policy configuration: rule \"a\": bad selector"
        );
    }
}
