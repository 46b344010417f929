//! Versioned scan report assembly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::Provider;
use crate::fetch::ScopeId;
use crate::finding::{Confidence, Finding};

/// Bumped whenever the serialized report shape changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Roll-up counts over the final finding list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_findings: usize,
    pub by_confidence: BTreeMap<String, usize>,
    pub by_risk: BTreeMap<String, usize>,
    pub by_rule: BTreeMap<String, usize>,
    pub scopes_attempted: usize,
    pub scopes_succeeded: usize,
    pub ignored_by_tag_policy: usize,
    pub highest_confidence: Option<Confidence>,
    pub scanned_at: DateTime<Utc>,
}

/// The complete output of one scan run, stable enough to diff between
/// runs and to feed downstream tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub schema_version: u32,
    pub provider: Provider,
    pub findings: Vec<Finding>,
    pub summary: ScanSummary,
    /// Scope id to failure class and message, for scopes that could not
    /// be scanned. Non-empty here with findings present means a partial
    /// result.
    pub scopes_failed: BTreeMap<ScopeId, String>,
}

impl ScanReport {
    pub fn is_partial(&self) -> bool {
        !self.scopes_failed.is_empty()
    }
}

/// Sort findings into canonical order and compute the summary. The sort
/// key is (provider, rule_id, resource_id), so identical inputs always
/// serialize identically.
pub fn build(
    provider: Provider,
    mut findings: Vec<Finding>,
    scopes_attempted: usize,
    scopes_failed: BTreeMap<ScopeId, String>,
    ignored_by_tag_policy: usize,
    scanned_at: DateTime<Utc>,
) -> ScanReport {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut by_confidence = BTreeMap::new();
    let mut by_risk = BTreeMap::new();
    let mut by_rule = BTreeMap::new();
    let mut highest_confidence: Option<Confidence> = None;
    for finding in &findings {
        *by_confidence
            .entry(finding.confidence.as_str().to_string())
            .or_insert(0) += 1;
        *by_risk
            .entry(finding.risk.as_str().to_string())
            .or_insert(0) += 1;
        *by_rule.entry(finding.rule_id.clone()).or_insert(0) += 1;
        highest_confidence = Some(match highest_confidence {
            Some(current) => current.max(finding.confidence),
            None => finding.confidence,
        });
    }

    let summary = ScanSummary {
        total_findings: findings.len(),
        by_confidence,
        by_risk,
        by_rule,
        scopes_attempted,
        scopes_succeeded: scopes_attempted.saturating_sub(scopes_failed.len()),
        ignored_by_tag_policy,
        highest_confidence,
        scanned_at,
    };

    ScanReport {
        schema_version: SCHEMA_VERSION,
        provider,
        findings,
        summary,
        scopes_failed,
    }
}
