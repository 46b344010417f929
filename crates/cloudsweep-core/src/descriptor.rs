use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cloud providers a scan can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
        }
    }

    /// Scope the orchestrator falls back to when discovery finds nothing.
    pub fn default_scope(&self) -> &'static str {
        match self {
            Provider::Aws => "us-east-1",
            Provider::Azure => "default",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized resource kinds the rule catalogue understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Volume,
    Snapshot,
    Disk,
    LogGroup,
    Bucket,
    PublicIp,
    Eni,
    ElasticIp,
}

impl ResourceType {
    /// Globally listed resources are fetched once per scan, not per scope.
    pub fn is_global(&self) -> bool {
        matches!(self, ResourceType::Bucket)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Volume => "volume",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Disk => "disk",
            ResourceType::LogGroup => "log_group",
            ResourceType::Bucket => "bucket",
            ResourceType::PublicIp => "public_ip",
            ResourceType::Eni => "eni",
            ResourceType::ElasticIp => "elastic_ip",
        }
    }
}

/// Attachment state as reported by the provider. `Unknown` means the
/// provider API did not expose the state, which is never treated as
/// evidence of detachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Attachment {
    Attached,
    Detached,
    #[default]
    Unknown,
}

/// Provider-agnostic snapshot of one cloud resource, as handed to the
/// rule engine. Immutable once constructed; owned by the scan that
/// fetched it and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_type: ResourceType,
    pub resource_id: String,
    /// Region or subscription id; `None` for globally listed resources.
    #[serde(default)]
    pub scope: Option<String>,
    /// Creation/allocation timestamp; absent for e.g. classic addresses.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attached: Attachment,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Provider-specific fields rules may require (e.g. `retention_days`,
    /// `association_id_present`, `interface_type`, `domain`).
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ResourceDescriptor {
    /// Whole days elapsed since creation, or `None` when the provider did
    /// not expose a timestamp. Rules must never derive HIGH confidence
    /// from an unknown age.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.created_at
            .map(|created| (now - created).num_days().max(0))
    }

    /// Minimal structural check. Malformed descriptors are skipped
    /// per-item with a logged warning, never failing the scan.
    pub fn is_wellformed(&self) -> bool {
        !self.resource_id.trim().is_empty()
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(|v| v.as_bool())
    }

    pub fn extra_i64(&self, key: &str) -> Option<i64> {
        self.extra.get(key).and_then(|v| v.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn descriptor(id: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_type: ResourceType::Volume,
            resource_id: id.into(),
            scope: Some("us-east-1".into()),
            created_at: None,
            attached: Attachment::Unknown,
            tags: BTreeMap::new(),
            size_bytes: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn age_is_none_without_timestamp() {
        let desc = descriptor("vol-1");
        assert_eq!(desc.age_days(Utc::now()), None);
    }

    #[test]
    fn age_counts_whole_days() {
        let now = Utc::now();
        let mut desc = descriptor("vol-1");
        desc.created_at = Some(now - Duration::days(20) - Duration::hours(3));
        assert_eq!(desc.age_days(now), Some(20));
    }

    #[test]
    fn clock_skew_never_yields_negative_age() {
        let now = Utc::now();
        let mut desc = descriptor("vol-1");
        desc.created_at = Some(now + Duration::hours(6));
        assert_eq!(desc.age_days(now), Some(0));
    }

    #[test]
    fn blank_resource_id_is_malformed() {
        assert!(!descriptor("  ").is_wellformed());
        assert!(descriptor("vol-1").is_wellformed());
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let mut desc = descriptor("vol-42");
        desc.tags.insert("env".into(), "prod".into());
        desc.extra
            .insert("retention_days".into(), serde_json::Value::Null);
        let json = serde_json::to_string(&desc).unwrap();
        let back: ResourceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
