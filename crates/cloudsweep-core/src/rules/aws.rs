//! AWS rule catalogue.
//!
//! Every rule here is review-only: it reports, it never mutates. Where a
//! provider API does not expose the signal we would actually want (e.g.
//! unattached duration for Elastic IPs and ENIs), the rule measures
//! creation/allocation age instead and says so in its evidence.

use serde_json::json;

use super::{details_from, ConfidenceLadder, RuleContext, RuleDefinition, RuleOutcome};
use crate::descriptor::{Attachment, Provider, ResourceDescriptor, ResourceType};
use crate::finding::{Confidence, Evidence, Risk};

/// ENI kinds owned by AWS infrastructure rather than the account.
const INFRA_INTERFACE_TYPES: &[&str] = &[
    "nat_gateway",
    "load_balancer",
    "gateway_load_balancer",
    "gateway_load_balancer_endpoint",
    "vpc_endpoint",
];

pub fn definitions() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            rule_id: "aws.ebs.volume.unattached",
            config_key: "unattached_volumes",
            provider: Provider::Aws,
            resource_types: &[ResourceType::Volume],
            risk: Risk::Low,
            title: "Unattached EBS volume",
            description: "EBS volume not attached to any EC2 instance",
            eval: unattached_volume,
        },
        RuleDefinition {
            rule_id: "aws.ebs.snapshot.old",
            config_key: "old_ebs_snapshots",
            provider: Provider::Aws,
            resource_types: &[ResourceType::Snapshot],
            risk: Risk::Low,
            title: "Old EBS snapshot",
            description: "EBS snapshot older than the configured age threshold",
            eval: old_snapshot,
        },
        RuleDefinition {
            rule_id: "aws.logs.infinite_retention",
            config_key: "infinite_log_retention",
            provider: Provider::Aws,
            resource_types: &[ResourceType::LogGroup],
            risk: Risk::Low,
            title: "CloudWatch log group with infinite retention",
            description: "Log group with no retention policy (logs never expire)",
            eval: infinite_retention,
        },
        RuleDefinition {
            rule_id: "aws.resource.untagged",
            config_key: "untagged_resources",
            provider: Provider::Aws,
            resource_types: &[
                ResourceType::Volume,
                ResourceType::Bucket,
                ResourceType::LogGroup,
            ],
            risk: Risk::Low,
            title: "Untagged AWS resource",
            description: "Resource with no tags past the minimum age gate",
            eval: untagged,
        },
        RuleDefinition {
            rule_id: "aws.ec2.elastic_ip.unattached",
            config_key: "elastic_ip_unattached",
            provider: Provider::Aws,
            resource_types: &[ResourceType::ElasticIp],
            risk: Risk::Low,
            title: "Unattached Elastic IP",
            description: "Elastic IP not associated with any instance or interface",
            eval: unattached_elastic_ip,
        },
        RuleDefinition {
            rule_id: "aws.ec2.eni.detached",
            config_key: "eni_detached",
            provider: Provider::Aws,
            resource_types: &[ResourceType::Eni],
            risk: Risk::Low,
            title: "Detached network interface",
            description: "ENI in available state past the configured creation age",
            eval: detached_eni,
        },
    ]
}

fn unattached_volume(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if desc.attached != Attachment::Detached {
        return None;
    }
    let age = desc.age_days(ctx.now);
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    // Detached is a hard provider signal; an unknown creation time still
    // warrants review, just never at HIGH.
    let confidence = match age {
        Some(_) => ladder.classify(age)?,
        None => Confidence::Medium,
    };

    let mut signals = vec!["Volume state is not 'in-use' (not attached to any EC2 instance)".into()];
    match age {
        Some(days) => signals.push(format!("Volume was created {days} days ago")),
        None => signals.push("Volume creation time unavailable (age unknown)".into()),
    }

    Some(RuleOutcome {
        confidence,
        summary: "EBS volume is not attached to any EC2 instance".into(),
        reason: "Volume is not currently attached at the provider level".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("size_bytes", json!(desc.size_bytes)),
            (
                "availability_zone",
                json!(desc.extra_str("availability_zone")),
            ),
        ]),
        evidence: Evidence {
            signals_used: signals,
            signals_not_checked: vec![
                "Application-level usage".into(),
                "Disaster recovery intent".into(),
                "Future planned attachments".into(),
            ],
            time_window: ctx.params.high_days.map(|days| format!("{days} days")),
        },
    })
}

fn old_snapshot(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    let age = desc.age_days(ctx.now)?;
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    let confidence = ladder.classify(Some(age))?;
    let threshold = match confidence {
        Confidence::High => ctx.params.high_days,
        _ => ctx.params.medium_days,
    };

    Some(RuleOutcome {
        confidence,
        summary: format!("EBS snapshot is {age} days old"),
        reason: "Snapshot exceeds configured age threshold".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("volume_id", json!(desc.extra_str("volume_id"))),
        ]),
        evidence: Evidence {
            signals_used: vec![format!(
                "Snapshot age is {age} days, exceeding threshold of {} days",
                threshold.unwrap_or(0)
            )],
            signals_not_checked: vec![
                "AMI linkage / usage".into(),
                "Application-level usage".into(),
                "Disaster recovery intent".into(),
            ],
            time_window: threshold.map(|days| format!("{days} days")),
        },
    })
}

fn infinite_retention(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    // The retention field must have been fetched; descriptors without it
    // are structurally ineligible rather than implicitly infinite.
    let retention = desc.extra.get("retention_days")?;
    if !retention.is_null() {
        return None;
    }
    let age = desc.age_days(ctx.now);
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    // HIGH needs the second signal (group old enough that the missing
    // policy is unlikely to be a work in progress).
    let confidence = ladder.classify(age).unwrap_or(Confidence::Medium);

    let mut signals = vec!["Log group has no retention policy configured (never expires)".into()];
    if let Some(days) = age {
        signals.push(format!("Log group was created {days} days ago"));
    }

    Some(RuleOutcome {
        confidence,
        summary: "Log group has no retention policy configured".into(),
        reason: "Retention is not set (logs never expire)".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("stored_bytes", json!(desc.size_bytes)),
            ("retention_days", json!(null)),
        ]),
        evidence: Evidence {
            signals_used: signals,
            signals_not_checked: vec![
                "Recent ingestion activity".into(),
                "Compliance retention requirements".into(),
                "Future expected logs".into(),
            ],
            time_window: None,
        },
    })
}

fn untagged(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if !desc.tags.is_empty() {
        return None;
    }
    // Age gate: brand new resources are often tagged moments later, and
    // without a timestamp we cannot clear the gate at all.
    let age = desc.age_days(ctx.now)?;
    let min_age = ctx.params.min_age_days.unwrap_or(0);
    if age < min_age {
        return None;
    }

    // Dual-signal requirement: untagged alone is MEDIUM at most. HIGH
    // needs the independent detachment signal on top.
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
        signals.push("Resource is also detached (ownership unclear)".into());
    }

    Some(RuleOutcome {
        confidence,
        summary: format!(
            "{} has no tags",
            capitalized_type(desc.resource_type)
        ),
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

fn unattached_elastic_ip(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if desc.attached != Attachment::Detached {
        return None;
    }
    let is_classic = desc.extra_str("domain") == Some("standard");
    let age = desc.age_days(ctx.now);
    let ladder = ConfidenceLadder::from_params(&ctx.params);

    let confidence = match age {
        // Allocation age past threshold plus the deterministic
        // no-association signal.
        Some(_) => ladder.classify(age)?,
        // Classic addresses predate allocation timestamps; flag them,
        // but a missing age can never carry HIGH on its own.
        None if is_classic => Confidence::Medium,
        // VPC address without a timestamp: cannot judge, skip.
        None => return None,
    };

    let mut signals =
        vec!["Elastic IP is not associated with any instance or network interface".into()];
    match age {
        Some(days) => signals.push(format!(
            "Elastic IP was allocated {days} days ago and is currently unattached"
        )),
        None => signals.push(
            "Classic address without an allocation time (age unknown, flagged conservatively)"
                .into(),
        ),
    }

    Some(RuleOutcome {
        confidence,
        summary: match age {
            Some(days) => format!(
                "Elastic IP allocated {days} days ago and currently unattached (incurs hourly charges)"
            ),
            None => "Classic Elastic IP currently unattached (allocation age unknown)".into(),
        },
        reason: "Elastic IP is unattached, incurring charges".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("is_classic", json!(is_classic)),
            ("public_ip", json!(desc.extra_str("public_ip"))),
        ]),
        evidence: Evidence {
            signals_used: signals,
            signals_not_checked: vec![
                "Unattached duration (AWS does not expose a detach timestamp)".into(),
                "Previous attachment history".into(),
                "Future planned attachments".into(),
            ],
            time_window: ctx
                .params
                .high_days
                .map(|days| format!("{days} days since allocation")),
        },
    })
}

fn detached_eni(desc: &ResourceDescriptor, ctx: &RuleContext) -> Option<RuleOutcome> {
    if desc.attached != Attachment::Detached {
        return None;
    }
    if let Some(interface_type) = desc.extra_str("interface_type") {
        if INFRA_INTERFACE_TYPES.contains(&interface_type) {
            return None;
        }
    }
    let age = desc.age_days(ctx.now)?;
    let ladder = ConfidenceLadder::from_params(&ctx.params);
    // Creation age is a proxy for detached duration, so this rule is
    // capped at MEDIUM no matter how old the interface is.
    let confidence = ladder.classify_capped(Some(age), Confidence::Medium)?;

    let mut signals = vec![
        "ENI status is 'available' (currently detached)".into(),
        format!("ENI was created {age} days ago and is currently detached"),
    ];
    if desc.extra_bool("requester_managed") == Some(true) {
        signals.push("ENI is requester-managed (created by an AWS service)".into());
    }
    if desc.tags.is_empty() {
        signals.push("ENI has no tags (ownership unclear)".into());
    }

    Some(RuleOutcome {
        confidence,
        summary: format!("ENI created {age} days ago and currently detached"),
        reason: "ENI is in detached state past the configured creation age".into(),
        details: details_from([
            ("age_days", json!(age)),
            ("interface_type", json!(desc.extra_str("interface_type"))),
            (
                "requester_managed",
                json!(desc.extra_bool("requester_managed")),
            ),
        ]),
        evidence: Evidence {
            signals_used: signals,
            signals_not_checked: vec![
                "Detached duration (AWS does not expose a detach timestamp)".into(),
                "Previous attachment history".into(),
                "Future planned attachments".into(),
            ],
            time_window: ctx
                .params
                .high_days
                .map(|days| format!("{days} days since creation")),
        },
    })
}

fn capitalized_type(resource_type: ResourceType) -> String {
    let raw = resource_type.as_str().replace('_', " ");
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => raw,
    }
}
