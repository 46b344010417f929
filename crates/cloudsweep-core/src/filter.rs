//! Tag-based ignore filter.
//!
//! Runs after rule evaluation, over each finding's source tags, so that
//! ignored counts stay visible in the report. An ignore rule with only a
//! key matches any value; with a value it requires an exact
//! case-sensitive match on both. Matching is OR across rules.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{IgnoreTagRule, TagFilterConfig};
use crate::finding::Finding;

/// Whether the given tag set matches any configured ignore rule.
pub fn should_ignore(tags: &BTreeMap<String, String>, cfg: &TagFilterConfig) -> bool {
    if !cfg.enabled {
        return false;
    }
    cfg.ignore.iter().any(|rule| matches(rule, tags))
}

fn matches(rule: &IgnoreTagRule, tags: &BTreeMap<String, String>) -> bool {
    match tags.get(&rule.key) {
        None => false,
        Some(actual) => match &rule.value {
            None => true,
            Some(expected) => actual == expected,
        },
    }
}

/// Findings that survived the filter, plus how many were suppressed.
#[derive(Debug)]
pub struct FilterOutcome {
    pub kept: Vec<Finding>,
    pub ignored: usize,
}

/// Partition findings by the ignore policy. Pure and order-preserving,
/// so applying it twice yields the same kept set.
pub fn apply(findings: Vec<Finding>, cfg: &TagFilterConfig) -> FilterOutcome {
    if !cfg.is_active() {
        return FilterOutcome {
            kept: findings,
            ignored: 0,
        };
    }
    let mut kept = Vec::with_capacity(findings.len());
    let mut ignored = 0;
    for finding in findings {
        if should_ignore(&finding.tags, cfg) {
            debug!(
                rule_id = %finding.rule_id,
                resource_id = %finding.resource_id,
                "finding suppressed by tag policy"
            );
            ignored += 1;
        } else {
            kept.push(finding);
        }
    }
    FilterOutcome { kept, ignored }
}
