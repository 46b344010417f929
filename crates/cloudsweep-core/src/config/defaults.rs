//! Builtin rule parameter defaults.
//!
//! Conservative values that prioritize avoiding false positives over
//! catching everything; every layer a user supplies overrides these.

use super::layer::{
    AwsRulesLayer, AzureRulesLayer, ConfidenceLayer, ConfigDocument, RuleLayer, RulesLayer,
};

fn ladder(high: i64, medium: Option<i64>) -> Option<RuleLayer> {
    Some(RuleLayer {
        confidence: Some(ConfidenceLayer {
            high: Some(high),
            medium,
        }),
        min_age_days: None,
    })
}

fn age_gate(min_age_days: i64) -> Option<RuleLayer> {
    Some(RuleLayer {
        confidence: None,
        min_age_days: Some(min_age_days),
    })
}

/// The lowest-priority configuration layer, fully populated.
pub fn builtin_defaults() -> ConfigDocument {
    ConfigDocument {
        version: Some(super::layer::SUPPORTED_VERSION),
        tag_filtering: None,
        rules: Some(RulesLayer {
            aws: Some(AwsRulesLayer {
                // 2 weeks unattached = HIGH, 1 week = MEDIUM
                unattached_volumes: ladder(14, Some(7)),
                // 1 year = HIGH, 6 months = MEDIUM
                old_ebs_snapshots: ladder(365, Some(180)),
                // log group older than 30 days with no retention = HIGH
                infinite_log_retention: ladder(30, None),
                // ignore resources younger than a week
                untagged_resources: age_gate(7),
                elastic_ip_unattached: ladder(30, None),
                eni_detached: ladder(60, None),
            }),
            azure: Some(AzureRulesLayer {
                unattached_disks: ladder(14, Some(7)),
                old_snapshots: ladder(90, Some(30)),
                untagged_resources: age_gate(7),
                // unused public IPs cost money immediately
                unused_public_ips: ladder(0, None),
            }),
        }),
    }
}
