//! Azure rule catalogue. Scopes are subscription ids; the same
//! conservative, review-only posture as the AWS rules.

use serde_json::json;

use super::{details_from, ConfidenceLadder, RuleContext, RuleDefinition, RuleOutcome};
use crate::descriptor::{Attachment, Provider, ResourceDescriptor, ResourceType};
use crate::finding::{Confidence, Evidence, Risk};

pub fn definitions() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            rule_id: "azure.disk.unattached",
            config_key: "unattached_disks",
            provider: Provider::Azure,
            resource_types: &[ResourceType::Disk],
            risk: Risk::Low,
            title: "Unattached managed disk",
            description: "Managed disk not attached to any virtual machine",
            eval: unattached_disk,
        },
        RuleDefinition {
            rule_id: "azure.snapshot.old",
            config_key: "old_snapshots",
            provider: Provider::Azure,
            resource_types: &[ResourceType::Snapshot],
            risk: Risk::Low,
            title: "Old managed snapshot",
            description: "Managed snapshot older than the configured age threshold",
            eval: old_snapshot,
        },
        RuleDefinition {
            rule_id: "azure.resource.untagged",
            config_key: "untagged_resources",
            provider: Provider::Azure,
            resource_types: &[ResourceType::Disk, ResourceType::Snapshot],
            risk: Risk::Low,
            title: "Untagged Azure resource",
            description: "Resource with no tags past the minimum age gate",
            eval: untagged,
        },
        RuleDefinition {
            rule_id: "azure.public_ip.unused",
            config_key: "unused_public_ips",
            provider: Provider::Azure,
            resource_types: &[ResourceType::PublicIp],
            risk: Risk::Low,
            title: "Unused public IP address",
            description: "Public IP with no IP configuration (not attached to anything)",
            eval: unused_public_ip,
        },
    ]
}

fn unattached_disk(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if desc.attached != Attachment::Detached {
        return None;
    }
    // The compute API always reports timeCreated; a descriptor without
    // it cannot clear the age ladder, so skip rather than guess.
    let age = desc.age_days(ctx.now)?;
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    let confidence = ladder.classify(Some(age))?;

    Some(RuleOutcome {
        confidence,
        summary: "Managed disk is not attached to any virtual machine".into(),
        reason: "Disk has no managedBy owner at the provider level".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("size_bytes", json!(desc.size_bytes)),
            ("sku", json!(desc.extra_str("sku"))),
        ]),
        evidence: Evidence {
            signals_used: vec![
                "Disk managedBy is empty (not attached to any VM)".into(),
                format!("Disk age = {age} days"),
            ],
            signals_not_checked: vec![
                "Planned future VM attachment".into(),
                "IaC-managed intent".into(),
                "Disaster recovery or backup planning".into(),
            ],
            time_window: ctx.params.high_days.map(|days| format!("{days} days")),
        },
    })
}

fn old_snapshot(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    let age = desc.age_days(ctx.now)?;
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    let confidence = ladder.classify(Some(age))?;

    Some(RuleOutcome {
        confidence,
        summary: format!("Snapshot has existed for {age} days"),
        reason: "Snapshot age exceeds configured threshold".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("size_bytes", json!(desc.size_bytes)),
        ]),
        evidence: Evidence {
            signals_used: vec![format!("Snapshot age is {age} days")],
            signals_not_checked: vec![
                "Disk usage by applications".into(),
                "IaC-managed ownership".into(),
                "Disaster recovery or backup intent".into(),
            ],
            time_window: ctx.params.high_days.map(|days| format!("{days} days")),
        },
    })
}

fn untagged(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if !desc.tags.is_empty() {
        return None;
    }
    let age = desc.age_days(ctx.now)?;
    let min_age = ctx.params.min_age_days.unwrap_or(0);
    if age < min_age {
        return None;
    }

    // Same dual-signal contract as the AWS sweep: HIGH needs the
    // independent detachment signal, never bare taglessness.
    let detached = desc.attached == Attachment::Detached;
    let confidence = if detached {
        Confidence::High
    } else {
        Confidence::Medium
    };

    let mut signals = vec![
        "Resource has zero tags".to_string(),
        format!("Resource is {age} days old (past the {min_age}-day grace period)"),
    ];
    if detached {
        signals.push("Resource is also unattached (ownership unclear)".into());
    }

    Some(RuleOutcome {
        confidence,
        summary: "Resource has no tags".into(),
        reason: "No tags found on resource".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("tag_count", json!(0)),
            ("detached", json!(detached)),
        ]),
        evidence: Evidence {
            signals_used: signals,
            signals_not_checked: vec![
                "IaC-managed ownership".into(),
                "Application-level usage".into(),
            ],
            time_window: Some(format!(">={min_age} days")),
        },
    })
}

fn unused_public_ip(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if desc.attached != Attachment::Detached {
        return None;
    }
    let age = desc.age_days(ctx.now);
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    // Shipped threshold is zero days: any unattached address with a
    // known age is HIGH (cost and security). Unknown age stays MEDIUM.
    let confidence = match age {
        Some(_) => ladder.classify(age)?,
        None => Confidence::Medium,
    };

    Some(RuleOutcome {
        confidence,
        summary: "Public IP is not attached to any resource".into(),
        reason: "IP configuration is empty (not attached)".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("ip_address", json!(desc.extra_str("ip_address"))),
        ]),
        evidence: Evidence {
            signals_used: vec![
                "IP configuration is empty (not attached to any resource)".into(),
            ],
            signals_not_checked: vec![
                "Planned future association".into(),
                "IaC-managed intent".into(),
                "Application-level usage".into(),
            ],
            time_window: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::EffectiveConfig;
    use crate::rules::{evaluate, RuleRegistry};
    use chrono::{DateTime, Duration, Utc};

    fn descriptor(
        resource_type: ResourceType,
        id: &str,
        age_days: Option<i64>,
        attached: Attachment,
        now: DateTime<Utc>,
    ) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_type,
            resource_id: id.into(),
            scope: Some("sub-1".into()),
            created_at: age_days.map(|days| now - Duration::days(days)),
            attached,
            tags: BTreeMap::new(),
            size_bytes: None,
            extra: BTreeMap::new(),
        }
    }

    fn run(
        rule_id: &str,
        descriptors: &[ResourceDescriptor],
        now: DateTime<Utc>,
    ) -> Vec<crate::finding::Finding> {
        let registry = RuleRegistry::builtin();
        evaluate(
            registry.get(rule_id).unwrap(),
            descriptors,
            &EffectiveConfig::builtin(),
            now,
        )
    }

    #[test]
    fn disk_ladder_matches_shipped_thresholds() {
        let now = Utc::now();
        let cases = [
            (Some(14), Some(Confidence::High)),
            (Some(7), Some(Confidence::Medium)),
            (Some(6), None),
            (None, None),
        ];
        for (age, expected) in cases {
            let findings = run(
                "azure.disk.unattached",
                &[descriptor(ResourceType::Disk, "disk-1", age, Attachment::Detached, now)],
                now,
            );
            match expected {
                Some(conf) => assert_eq!(findings[0].confidence, conf, "age {age:?}"),
                None => assert!(findings.is_empty(), "age {age:?}"),
            }
        }
    }

    #[test]
    fn attached_disk_is_not_flagged() {
        let now = Utc::now();
        let findings = run(
            "azure.disk.unattached",
            &[descriptor(ResourceType::Disk, "disk-1", Some(100), Attachment::Attached, now)],
            now,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn snapshot_ladder_uses_azure_defaults() {
        let now = Utc::now();
        let findings = run(
            "azure.snapshot.old",
            &[
                descriptor(ResourceType::Snapshot, "snap-1", Some(90), Attachment::Unknown, now),
                descriptor(ResourceType::Snapshot, "snap-2", Some(45), Attachment::Unknown, now),
                descriptor(ResourceType::Snapshot, "snap-3", Some(10), Attachment::Unknown, now),
            ],
            now,
        );
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].confidence, Confidence::High);
        assert_eq!(findings[1].confidence, Confidence::Medium);
    }

    #[test]
    fn untagged_dual_signal_contract() {
        let now = Utc::now();
        let attached = descriptor(ResourceType::Disk, "disk-a", Some(30), Attachment::Attached, now);
        let detached = descriptor(ResourceType::Disk, "disk-d", Some(30), Attachment::Detached, now);
        let findings = run("azure.resource.untagged", &[attached, detached], now);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].confidence, Confidence::Medium);
        assert_eq!(findings[1].confidence, Confidence::High);
    }

    #[test]
    fn unused_public_ip_is_immediately_high_with_known_age() {
        let now = Utc::now();
        let findings = run(
            "azure.public_ip.unused",
            &[descriptor(ResourceType::PublicIp, "pip-1", Some(0), Attachment::Detached, now)],
            now,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::High);
    }

    #[test]
    fn unused_public_ip_without_age_stays_medium() {
        let now = Utc::now();
        let findings = run(
            "azure.public_ip.unused",
            &[descriptor(ResourceType::PublicIp, "pip-1", None, Attachment::Detached, now)],
            now,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, Confidence::Medium);
    }
}
