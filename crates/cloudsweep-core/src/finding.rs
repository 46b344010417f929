use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{Provider, ResourceType};

/// How likely a finding reflects a truly orphaned resource.
///
/// Ordered so that `High > Medium > Low`, which the exit policy and
/// summary rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }
}

/// Blast radius of acting on a finding. Rule-static: every rule in the
/// catalogue is review-only and ships as LOW risk today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "LOW",
            Risk::Medium => "MEDIUM",
            Risk::High => "HIGH",
        }
    }
}

/// What a rule actually looked at, and what it could not. Keeping the
/// unchecked signals explicit is how the catalogue stays honest about
/// proxy measurements (e.g. allocation age standing in for unattached
/// duration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Evidence {
    pub signals_used: Vec<String>,
    pub signals_not_checked: Vec<String>,
    #[serde(default)]
    pub time_window: Option<String>,
}

/// One reported hygiene issue for one resource. Value object: created by
/// rule evaluation, optionally dropped by the tag filter, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub provider: Provider,
    pub rule_id: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    /// `None` for globally listed resources (e.g. storage buckets).
    pub scope: Option<String>,
    pub title: String,
    pub summary: String,
    pub reason: String,
    pub risk: Risk,
    pub confidence: Confidence,
    pub detected_at: DateTime<Utc>,
    /// Source descriptor tags, carried so the tag filter can run after
    /// evaluation and so reports keep the evidence visible.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    pub evidence: Evidence,
}

impl Finding {
    /// Stable ordering key guaranteeing deterministic report output.
    pub fn sort_key(&self) -> (Provider, &str, &str) {
        (self.provider, self.rule_id.as_str(), self.resource_id.as_str())
    }
}
