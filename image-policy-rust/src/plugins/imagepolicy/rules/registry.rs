// Copyright 2024 The Kubernetes Authors.
// Licensed under the Apache License, Version 2.0

//! Integrated registry membership.

/// RegistryMatcher decides whether a registry host is the integrated registry.
pub trait RegistryMatcher: Send + Sync {
    fn matches(&self, registry: &str) -> bool;
}

/// NameSet matches registry hosts by exact name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet(Vec<String>);

impl NameSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl RegistryMatcher for NameSet {
    fn matches(&self, registry: &str) -> bool {
        self.0.iter().any(|name| name == registry)
    }
}
