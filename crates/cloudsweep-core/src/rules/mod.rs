//! The hygiene rule catalogue and its evaluation engine.
//!
//! Rules are pure functions over pre-fetched descriptors: no I/O, no
//! hidden state, no randomness. A finding's confidence is derivable
//! solely from the descriptor and the resolved config at the moment of
//! evaluation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::warn;

use crate::config::{EffectiveConfig, RuleParams};
use crate::descriptor::{Provider, ResourceDescriptor, ResourceType};
use crate::finding::{Confidence, Evidence, Finding, Risk};

pub mod aws;
pub mod azure;
pub mod ladder;

pub use ladder::ConfidenceLadder;

/// Resolved inputs shared by every descriptor a rule inspects.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    pub params: RuleParams,
    pub now: DateTime<Utc>,
}

/// What a rule decided about one descriptor. The engine assembles the
/// final [`Finding`] so identity fields (rule_id, provider, risk, scope)
/// cannot drift per rule.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub confidence: Confidence,
    pub summary: String,
    pub reason: String,
    pub details: BTreeMap<String, serde_json::Value>,
    pub evidence: Evidence,
}

/// Per-descriptor evaluation function. Returns `None` when the
/// descriptor is not flagged.
pub type RuleEvalFn = fn(&ResourceDescriptor, &RuleContext) -> Option<RuleOutcome>;

/// Static definition of one hygiene rule. `rule_id` values are
/// permanently stable once shipped; thresholds may change, identity
/// must not.
#[derive(Debug, Clone, Copy)]
pub struct RuleDefinition {
    pub rule_id: &'static str,
    /// Name used under `rules.<provider>` in config files.
    pub config_key: &'static str,
    pub provider: Provider,
    /// Resource kinds this rule consumes. One entry for every rule
    /// except the untagged sweeps, which inspect several kinds under a
    /// single stable id.
    pub resource_types: &'static [ResourceType],
    pub risk: Risk,
    pub title: &'static str,
    pub description: &'static str,
    pub eval: RuleEvalFn,
}

impl RuleDefinition {
    pub fn consumes(&self, resource_type: ResourceType) -> bool {
        self.resource_types.contains(&resource_type)
    }
}

/// Serializable view of a rule definition, for `list-rules` output.
#[derive(Debug, Serialize)]
pub struct RuleInfo<'a> {
    pub rule_id: &'a str,
    pub provider: Provider,
    pub resource_types: &'a [ResourceType],
    pub risk: Risk,
    pub title: &'a str,
    pub description: &'a str,
}

impl<'a> From<&'a RuleDefinition> for RuleInfo<'a> {
    fn from(rule: &'a RuleDefinition) -> Self {
        Self {
            rule_id: rule.rule_id,
            provider: rule.provider,
            resource_types: rule.resource_types,
            risk: rule.risk,
            title: rule.title,
            description: rule.description,
        }
    }
}

/// Immutable rule table, built once and injected into the orchestrator
/// explicitly. Tests may assemble their own registries.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<RuleDefinition>,
}

static BUILTIN: Lazy<RuleRegistry> = Lazy::new(|| {
    let mut rules = aws::definitions();
    rules.extend(azure::definitions());
    RuleRegistry::new(rules)
});

impl RuleRegistry {
    /// Panics on duplicate rule ids; registries are assembled from
    /// static data at startup, so a duplicate is a programming error.
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        let mut seen = std::collections::BTreeSet::new();
        for rule in &rules {
            assert!(
                seen.insert(rule.rule_id),
                "duplicate rule id `{}`",
                rule.rule_id
            );
        }
        Self { rules }
    }

    /// The full shipped catalogue.
    pub fn builtin() -> &'static RuleRegistry {
        &BUILTIN
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleDefinition> {
        self.rules.iter().find(|rule| rule.rule_id == rule_id)
    }

    pub fn for_provider(&self, provider: Provider) -> Vec<&RuleDefinition> {
        self.rules
            .iter()
            .filter(|rule| rule.provider == provider)
            .collect()
    }

    /// Distinct resource kinds a provider's rules need, split into
    /// per-scope and globally listed kinds.
    pub fn resource_types_for(
        &self,
        provider: Provider,
    ) -> (Vec<ResourceType>, Vec<ResourceType>) {
        let mut scoped = std::collections::BTreeSet::new();
        let mut global = std::collections::BTreeSet::new();
        for rule in self.for_provider(provider) {
            for &resource_type in rule.resource_types {
                if resource_type.is_global() {
                    global.insert(resource_type);
                } else {
                    scoped.insert(resource_type);
                }
            }
        }
        (scoped.into_iter().collect(), global.into_iter().collect())
    }
}

/// Run one rule over a descriptor list. Malformed descriptors are
/// skipped with a logged warning; one bad record never fails the rule.
pub fn evaluate(
    rule: &RuleDefinition,
    descriptors: &[ResourceDescriptor],
    cfg: &EffectiveConfig,
    now: DateTime<Utc>,
) -> Vec<Finding> {
    let ctx = RuleContext {
        params: cfg.params(rule.rule_id),
        now,
    };
    let mut findings = Vec::new();
    for descriptor in descriptors {
        if !rule.consumes(descriptor.resource_type) {
            continue;
        }
        if !descriptor.is_wellformed() {
            warn!(
                rule_id = rule.rule_id,
                resource_type = descriptor.resource_type.as_str(),
                "skipping malformed descriptor with empty resource id"
            );
            continue;
        }
        if let Some(outcome) = (rule.eval)(descriptor, &ctx) {
            findings.push(Finding {
                provider: rule.provider,
                rule_id: rule.rule_id.to_string(),
                resource_type: descriptor.resource_type,
                resource_id: descriptor.resource_id.clone(),
                scope: descriptor.scope.clone(),
                title: rule.title.to_string(),
                summary: outcome.summary,
                reason: outcome.reason,
                risk: rule.risk,
                confidence: outcome.confidence,
                detected_at: now,
                tags: descriptor.tags.clone(),
                details: outcome.details,
                evidence: outcome.evidence,
            });
        }
    }
    findings
}

pub(crate) fn details_from<I, K>(pairs: I) -> BTreeMap<String, serde_json::Value>
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Attachment;
    use chrono::Duration;

    pub(crate) fn volume(id: &str, age_days: Option<i64>, now: DateTime<Utc>) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_type: ResourceType::Volume,
            resource_id: id.into(),
            scope: Some("us-east-1".into()),
            created_at: age_days.map(|days| now - Duration::days(days)),
            attached: Attachment::Detached,
            tags: BTreeMap::new(),
            size_bytes: Some(8 << 30),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn builtin_registry_has_all_ten_rules() {
        let registry = RuleRegistry::builtin();
        assert_eq!(registry.for_provider(Provider::Aws).len(), 6);
        assert_eq!(registry.for_provider(Provider::Azure).len(), 4);
    }

    #[test]
    fn builtin_registry_resolves_by_id() {
        let registry = RuleRegistry::builtin();
        assert!(registry.get("aws.ebs.volume.unattached").is_some());
        assert!(registry.get("azure.public_ip.unused").is_some());
        assert!(registry.get("gcp.anything").is_none());
    }

    #[test]
    fn bucket_is_the_only_global_type() {
        let registry = RuleRegistry::builtin();
        let (scoped, global) = registry.resource_types_for(Provider::Aws);
        assert!(global == vec![ResourceType::Bucket]);
        assert!(scoped.contains(&ResourceType::Volume));
        assert!(!scoped.contains(&ResourceType::Bucket));
        let (_, azure_global) = registry.resource_types_for(Provider::Azure);
        assert!(azure_global.is_empty());
    }

    #[test]
    fn malformed_descriptor_is_skipped_not_fatal() {
        let now = Utc::now();
        let registry = RuleRegistry::builtin();
        let rule = registry.get("aws.ebs.volume.unattached").unwrap();
        let good = volume("vol-ok", Some(30), now);
        let bad = volume("   ", Some(30), now);
        let findings = evaluate(rule, &[bad, good], &EffectiveConfig::builtin(), now);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource_id, "vol-ok");
    }

    #[test]
    fn wrong_resource_type_is_structurally_ineligible() {
        let now = Utc::now();
        let registry = RuleRegistry::builtin();
        let rule = registry.get("aws.ebs.snapshot.old").unwrap();
        let findings = evaluate(
            rule,
            &[volume("vol-1", Some(1000), now)],
            &EffectiveConfig::builtin(),
            now,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn evaluation_is_deterministic_for_same_inputs() {
        let now = Utc::now();
        let registry = RuleRegistry::builtin();
        let rule = registry.get("aws.ebs.volume.unattached").unwrap();
        let cfg = EffectiveConfig::builtin();
        let descriptors = vec![volume("vol-1", Some(20), now), volume("vol-2", Some(9), now)];
        let first = evaluate(rule, &descriptors, &cfg, now);
        let second = evaluate(rule, &descriptors, &cfg, now);
        assert_eq!(first, second);
    }
}
