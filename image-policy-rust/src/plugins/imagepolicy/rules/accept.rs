// Copyright 2024 The Kubernetes Authors.
// Licensed under the Apache License, Version 2.0

//! Execution rule accepters.
//!
//! Rules are grouped by the resources they cover. Each resource gets an
//! `ExecutionAccepter` that scans its rules in declaration order: a matching
//! reject rule denies immediately, a matching accept rule marks the image as
//! permitted but the scan continues so later reject rules still apply. When
//! nothing matched, the outcome is the accepter's default, which is reject
//! only if the resource has at least one accept rule.

use super::matching::{self, MatchCondition};
use super::registry::RegistryMatcher;
use super::ImagePolicyAttributes;
use crate::admission::attributes::GroupResource;
use crate::admission::AdmissionResult;
use crate::api::imagepolicy::ImageExecutionPolicyRule;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Accepter decides whether images are permitted for the resources it covers.
pub trait Accepter: Send + Sync {
    fn covers(&self, gr: &GroupResource) -> bool;

    fn accepts(&self, attrs: &ImagePolicyAttributes) -> bool;
}

/// ExecutionRule is a classified rule, shared by every accepter whose
/// resource it covers.
#[derive(Debug)]
pub struct ExecutionRule {
    pub reject: bool,
    pub condition: MatchCondition,
}

impl ExecutionRule {
    pub fn name(&self) -> &str {
        self.condition.name()
    }

    fn ignore_namespace_override(&self) -> bool {
        self.condition.condition().ignore_namespace_override
    }

    fn skip_on_resolution_failure(&self) -> bool {
        self.condition.condition().skip_on_resolution_failure
    }
}

/// ExecutionAccepter evaluates the ordered rules of a single resource.
pub struct ExecutionAccepter {
    covers: GroupResource,
    rules: Vec<Arc<ExecutionRule>>,
    default_reject: bool,
    integrated_registry_matcher: Arc<dyn RegistryMatcher>,
}

impl ExecutionAccepter {
    fn new(covers: GroupResource, integrated_registry_matcher: Arc<dyn RegistryMatcher>) -> Self {
        Self {
            covers,
            rules: Vec::new(),
            default_reject: false,
            integrated_registry_matcher,
        }
    }

    /// True when an image no rule matched is rejected.
    pub fn default_reject(&self) -> bool {
        self.default_reject
    }

    pub fn rules(&self) -> &[Arc<ExecutionRule>] {
        &self.rules
    }

    /// If every rule rejects, unmatched images are allowed; any accept rule
    /// turns the rule list into an allowlist.
    fn compute_default_reject(&mut self) {
        self.default_reject = !self.rules.is_empty() && !self.rules.iter().all(|r| r.reject);
    }
}

impl fmt::Debug for ExecutionAccepter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionAccepter")
            .field("covers", &self.covers)
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("default_reject", &self.default_reject)
            .finish()
    }
}

impl Accepter for ExecutionAccepter {
    fn covers(&self, gr: &GroupResource) -> bool {
        self.covers == *gr
    }

    fn accepts(&self, attrs: &ImagePolicyAttributes) -> bool {
        if attrs.resource != self.covers {
            return true;
        }

        let mut any_matched = false;
        for rule in &self.rules {
            trace!(rule = rule.name(), "image policy checking rule");
            if attrs.excluded_rules.contains(rule.name()) && !rule.ignore_namespace_override() {
                trace!(rule = rule.name(), "skipping because rule is excluded by namespace annotations");
                continue;
            }

            // without a resolved image a reject rule would fire unconditionally
            if attrs.image.is_none() && rule.skip_on_resolution_failure() {
                trace!(rule = rule.name(), "skipping because image is not resolved and skip on failure is true");
                continue;
            }

            let matches = matching::matches(
                &rule.condition,
                self.integrated_registry_matcher.as_ref(),
                attrs,
            );
            debug!(
                rule = rule.name(),
                reject = rule.reject,
                image = %attrs.name,
                matches,
                "image policy rule evaluated"
            );
            if matches {
                if rule.reject {
                    return false;
                }
                any_matched = true;
            }
        }
        any_matched || !self.default_reject
    }
}

/// MappedAccepter dispatches to the accepter registered for a resource.
/// Resources without an accepter are allowed.
#[derive(Debug, Default)]
pub struct MappedAccepter {
    accepters: HashMap<GroupResource, ExecutionAccepter>,
}

impl MappedAccepter {
    pub fn get(&self, gr: &GroupResource) -> Option<&ExecutionAccepter> {
        self.accepters.get(gr)
    }

    pub fn len(&self) -> usize {
        self.accepters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepters.is_empty()
    }
}

impl Accepter for MappedAccepter {
    fn covers(&self, gr: &GroupResource) -> bool {
        self.accepters.contains_key(gr)
    }

    fn accepts(&self, attrs: &ImagePolicyAttributes) -> bool {
        match self.accepters.get(&attrs.resource) {
            Some(accepter) => accepter.accepts(attrs),
            None => true,
        }
    }
}

/// Build an accepter from the provided rules. Fails without producing an
/// accepter if any rule cannot be classified.
pub fn new_execution_rules_accepter(
    rules: &[ImageExecutionPolicyRule],
    integrated_registry_matcher: Arc<dyn RegistryMatcher>,
) -> AdmissionResult<MappedAccepter> {
    let mut accepters: HashMap<GroupResource, ExecutionAccepter> = HashMap::new();

    for rule in rules {
        let (over, condition) = matching::classify_condition(&rule.condition)?;
        let rule = Arc::new(ExecutionRule {
            reject: rule.reject,
            condition,
        });
        for gr in over {
            accepters
                .entry(gr.clone())
                .or_insert_with(|| ExecutionAccepter::new(gr, Arc::clone(&integrated_registry_matcher)))
                .rules
                .push(Arc::clone(&rule));
        }
    }

    for accepter in accepters.values_mut() {
        accepter.compute_default_reject();
    }

    Ok(MappedAccepter { accepters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionError;
    use crate::api::image::{DockerImageReference, Image};
    use crate::api::imagepolicy::{
        ImageCondition, LabelSelector, LabelSelectorOperator, LabelSelectorRequirement,
    };
    use crate::plugins::imagepolicy::rules::registry::NameSet;
    use proptest::prelude::*;

    fn images() -> GroupResource {
        GroupResource::new("image.openshift.io", "images")
    }

    fn pods() -> GroupResource {
        GroupResource::new("", "pods")
    }

    /// A condition on `images` that matches every image.
    fn always(name: &str) -> ImageCondition {
        ImageCondition::new(name).on(images())
    }

    /// A condition on `images` that matches no image.
    fn never(name: &str) -> ImageCondition {
        let mut c = always(name);
        c.invert_match = true;
        c
    }

    /// A condition on `images` that matches images labelled `name=<value>`.
    fn named(name: &str, value: &str) -> ImageCondition {
        let mut c = always(name);
        let mut selector = LabelSelector::default();
        selector.match_labels.insert("name".to_string(), value.to_string());
        c.match_image_labels.push(selector);
        c
    }

    fn build(rules: Vec<ImageExecutionPolicyRule>) -> MappedAccepter {
        new_execution_rules_accepter(&rules, Arc::new(NameSet::default())).unwrap()
    }

    fn attrs_for(gr: GroupResource, image_name: Option<&str>) -> ImagePolicyAttributes {
        ImagePolicyAttributes {
            resource: gr,
            name: DockerImageReference::parse("quay.io/org/app:1").unwrap(),
            image: image_name.map(|n| Image::new(n).with_label("name", n)),
            ..Default::default()
        }
    }

    fn attrs(image_name: &str) -> ImagePolicyAttributes {
        attrs_for(images(), Some(image_name))
    }

    #[test]
    fn test_uncovered_resource_is_accepted() {
        let accepter = build(vec![ImageExecutionPolicyRule::reject(always("deny-all"))]);
        assert!(!accepter.covers(&pods()));
        assert!(accepter.accepts(&attrs_for(pods(), Some("bad"))));
        assert!(accepter.accepts(&attrs_for(pods(), None)));
    }

    #[test]
    fn test_empty_rules() {
        let accepter = build(vec![]);
        assert!(accepter.is_empty());
        assert!(!accepter.covers(&images()));
        assert!(accepter.accepts(&attrs("anything")));
    }

    #[test]
    fn test_zero_rule_evaluator_defaults_to_accept() {
        let mut evaluator = ExecutionAccepter::new(images(), Arc::new(NameSet::default()));
        evaluator.compute_default_reject();
        assert!(!evaluator.default_reject());
        assert!(evaluator.accepts(&attrs("anything")));
        assert!(evaluator.accepts(&attrs_for(images(), None)));
    }

    #[test]
    fn test_all_reject_rules_default_to_accept() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::reject(named("no-bad", "bad")),
            ImageExecutionPolicyRule::reject(named("no-worse", "worse")),
        ]);
        let evaluator = accepter.get(&images()).unwrap();
        assert!(!evaluator.default_reject());
        assert!(accepter.accepts(&attrs("good")));
        assert!(!accepter.accepts(&attrs("worse")));
    }

    #[test]
    fn test_accept_rules_default_to_reject() {
        let accepter = build(vec![ImageExecutionPolicyRule::accept(named("only-good", "good"))]);
        assert!(accepter.get(&images()).unwrap().default_reject());
        assert!(accepter.accepts(&attrs("good")));
        assert!(!accepter.accepts(&attrs("other")));
    }

    #[test]
    fn test_mixed_rules_default_to_reject() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(never("nothing")),
            ImageExecutionPolicyRule::reject(never("nothing-either")),
        ]);
        assert!(accepter.get(&images()).unwrap().default_reject());
        assert!(!accepter.accepts(&attrs("good")));
    }

    #[test]
    fn test_reject_after_accept_wins() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("allow")),
            ImageExecutionPolicyRule::reject(always("deny")),
        ]);
        assert!(!accepter.accepts(&attrs("good")));
    }

    #[test]
    fn test_accept_match_does_not_stop_scan() {
        // a reject rule declared after a matching accept rule is still evaluated
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("allow")),
            ImageExecutionPolicyRule::accept(never("unused")),
            ImageExecutionPolicyRule::reject(named("no-bad", "bad")),
        ]);
        assert!(accepter.accepts(&attrs("good")));
        assert!(!accepter.accepts(&attrs("bad")));
    }

    #[test]
    fn test_reject_short_circuits_later_accept() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::reject(named("no-bad", "bad")),
            ImageExecutionPolicyRule::accept(always("allow")),
        ]);
        assert!(!accepter.accepts(&attrs("bad")));
        assert!(accepter.accepts(&attrs("good")));
    }

    #[test]
    fn test_excluded_rule_is_skipped() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("allow")),
            ImageExecutionPolicyRule::reject(named("no-bad", "bad")),
        ]);
        let mut request = attrs("bad");
        request.excluded_rules.insert("no-bad".to_string());
        assert!(accepter.accepts(&request));

        // an excluded accept rule no longer counts as a match
        let mut request = attrs("good");
        request.excluded_rules.insert("allow".to_string());
        assert!(!accepter.accepts(&request));
    }

    #[test]
    fn test_ignore_namespace_override() {
        let mut deny = named("no-bad", "bad");
        deny.ignore_namespace_override = true;
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("allow")),
            ImageExecutionPolicyRule::reject(deny),
        ]);
        let mut request = attrs("bad");
        request.excluded_rules.insert("no-bad".to_string());
        assert!(!accepter.accepts(&request));
    }

    #[test]
    fn test_skip_on_resolution_failure() {
        let mut deny = always("deny-unresolved");
        deny.skip_on_resolution_failure = true;
        let accepter = build(vec![ImageExecutionPolicyRule::reject(deny)]);

        assert!(accepter.accepts(&attrs_for(images(), None)));
        assert!(!accepter.accepts(&attrs("resolved")));
    }

    #[test]
    fn test_skipped_accept_rule_does_not_count_as_match() {
        let mut allow = always("allow-unless-unresolved");
        allow.skip_on_resolution_failure = true;
        let accepter = build(vec![ImageExecutionPolicyRule::accept(allow)]);

        assert!(accepter.get(&images()).unwrap().default_reject());
        assert!(!accepter.accepts(&attrs_for(images(), None)));
        assert!(accepter.accepts(&attrs("resolved")));
    }

    #[test]
    fn test_unresolved_image_without_skip() {
        let accepter = build(vec![ImageExecutionPolicyRule::reject(always("deny"))]);
        assert!(!accepter.accepts(&attrs_for(images(), None)));
    }

    #[test]
    fn test_rule_covering_multiple_resources() {
        let shared = named("no-bad", "bad").on(pods());
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("allow-images")),
            ImageExecutionPolicyRule::reject(shared),
        ]);
        assert_eq!(accepter.len(), 2);

        let image_rules: Vec<&str> = accepter
            .get(&images())
            .unwrap()
            .rules()
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(image_rules, vec!["allow-images", "no-bad"]);
        assert!(accepter.get(&images()).unwrap().default_reject());

        let pod_accepter = accepter.get(&pods()).unwrap();
        assert_eq!(pod_accepter.rules().len(), 1);
        assert!(!pod_accepter.default_reject());

        assert!(!accepter.accepts(&attrs_for(pods(), Some("bad"))));
        assert!(accepter.accepts(&attrs_for(pods(), Some("good"))));
    }

    #[test]
    fn test_evaluator_ignores_other_resources() {
        let accepter = build(vec![ImageExecutionPolicyRule::reject(always("deny"))]);
        let evaluator = accepter.get(&images()).unwrap();
        assert!(evaluator.covers(&images()));
        assert!(!evaluator.covers(&pods()));
        assert!(evaluator.accepts(&attrs_for(pods(), Some("bad"))));
    }

    #[test]
    fn test_construction_fails_on_bad_rule() {
        let mut broken = always("broken");
        broken.match_image_labels.push(LabelSelector {
            match_labels: Default::default(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "k".to_string(),
                operator: LabelSelectorOperator::DoesNotExist,
                values: vec!["v".to_string()],
            }],
        });
        let result = new_execution_rules_accepter(
            &[
                ImageExecutionPolicyRule::accept(always("fine")),
                ImageExecutionPolicyRule::reject(broken),
            ],
            Arc::new(NameSet::default()),
        );
        assert!(matches!(result, Err(AdmissionError::InvalidConfig(_))));
    }

    #[test]
    fn test_end_to_end_images_scenario() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("R1")),
            ImageExecutionPolicyRule::reject(named("R2", "bad")),
        ]);
        assert!(accepter.covers(&images()));
        assert!(accepter.get(&images()).unwrap().default_reject());
        assert!(!accepter.accepts(&attrs("bad")));
        assert!(accepter.accepts(&attrs("good")));
    }

    #[test]
    fn test_decision_unaffected_by_tracing() {
        let accepter = build(vec![
            ImageExecutionPolicyRule::accept(always("R1")),
            ImageExecutionPolicyRule::reject(named("R2", "bad")),
        ]);
        for name in ["bad", "good"] {
            let request = attrs(name);
            let silent = accepter.accepts(&request);
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_test_writer()
                .finish();
            let traced = tracing::subscriber::with_default(subscriber, || accepter.accepts(&request));
            assert_eq!(silent, traced);
        }
    }

    #[test]
    fn test_shared_across_threads() {
        let accepter: Arc<dyn Accepter> = Arc::new(build(vec![
            ImageExecutionPolicyRule::accept(always("R1")),
            ImageExecutionPolicyRule::reject(named("R2", "bad")),
        ]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let accepter = Arc::clone(&accepter);
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "bad" } else { "good" };
                    (i, accepter.accepts(&attrs(name)))
                })
            })
            .collect();
        for handle in handles {
            let (i, accepted) = handle.join().unwrap();
            assert_eq!(accepted, i % 2 == 1);
        }
    }

    fn rule_from(index: usize, reject: bool, matches: bool) -> ImageExecutionPolicyRule {
        let name = format!("rule-{}", index);
        let condition = if matches { always(&name) } else { never(&name) };
        ImageExecutionPolicyRule {
            condition,
            reject,
        }
    }

    proptest! {
        #[test]
        fn prop_decision_matches_reference(spec in prop::collection::vec((any::<bool>(), any::<bool>()), 0..12)) {
            let rules: Vec<_> = spec
                .iter()
                .enumerate()
                .map(|(i, (reject, matches))| rule_from(i, *reject, *matches))
                .collect();
            let accepter = build(rules);
            let request = attrs("img");

            let expected_default_reject = !spec.is_empty() && !spec.iter().all(|(reject, _)| *reject);
            let any_reject = spec.iter().any(|(reject, matches)| *reject && *matches);
            let any_accept = spec.iter().any(|(reject, matches)| !*reject && *matches);
            let expected = !any_reject && (any_accept || !expected_default_reject);

            match accepter.get(&images()) {
                Some(evaluator) => prop_assert_eq!(evaluator.default_reject(), expected_default_reject),
                None => prop_assert!(spec.is_empty()),
            }
            prop_assert_eq!(accepter.accepts(&request), expected);
            // repeated evaluation is stable
            prop_assert_eq!(accepter.accepts(&request), expected);
        }
    }
}
