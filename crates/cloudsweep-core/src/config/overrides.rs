//! CLI `--set` override parsing.
//!
//! Overrides use dotted paths mirroring the YAML layout, e.g.
//! `aws.unattached_volumes.confidence.high=21` or
//! `tag_filtering.enabled=false`. Values are parsed against the target
//! field's type; unknown paths are rejected rather than ignored.

use super::layer::{ConfigDocument, RuleLayer};
use super::ConfigError;

/// Parse `key=value` override strings into a single sparse layer.
pub fn parse_overrides(specs: &[String]) -> Result<ConfigDocument, ConfigError> {
    let mut doc = ConfigDocument::default();
    for spec in specs {
        apply_override(&mut doc, spec)?;
    }
    Ok(doc)
}

fn apply_override(doc: &mut ConfigDocument, spec: &str) -> Result<(), ConfigError> {
    let (path, value) = spec.split_once('=').ok_or_else(|| ConfigError::InvalidOverride {
        spec: spec.to_string(),
        reason: "expected key=value".into(),
    })?;
    let segments: Vec<&str> = path.split('.').collect();

    match segments.as_slice() {
        ["tag_filtering", "enabled"] => {
            let enabled = parse_bool(spec, value)?;
            doc.tag_filtering
                .get_or_insert_with(Default::default)
                .enabled = Some(enabled);
            Ok(())
        }
        [provider, rule, "confidence", tier @ ("high" | "medium")] => {
            let days = parse_days(spec, value)?;
            let layer = rule_layer_mut(doc, provider, rule)
                .ok_or_else(|| unknown_rule(spec, provider, rule))?;
            let conf = layer.confidence.get_or_insert_with(Default::default);
            match *tier {
                "high" => conf.high = Some(days),
                _ => conf.medium = Some(days),
            }
            Ok(())
        }
        [provider, rule, "min_age_days"] => {
            let days = parse_days(spec, value)?;
            let layer = rule_layer_mut(doc, provider, rule)
                .ok_or_else(|| unknown_rule(spec, provider, rule))?;
            layer.min_age_days = Some(days);
            Ok(())
        }
        _ => Err(ConfigError::InvalidOverride {
            spec: spec.to_string(),
            reason: format!("unknown settings path `{path}`"),
        }),
    }
}

fn unknown_rule(spec: &str, provider: &str, rule: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        spec: spec.to_string(),
        reason: format!("unknown rule `{provider}.{rule}`"),
    }
}

fn parse_days(spec: &str, value: &str) -> Result<i64, ConfigError> {
    let days: i64 = value.parse().map_err(|_| ConfigError::InvalidOverride {
        spec: spec.to_string(),
        reason: format!("expected an integer day count, got `{value}`"),
    })?;
    if days < 0 {
        return Err(ConfigError::InvalidOverride {
            spec: spec.to_string(),
            reason: "day thresholds must be non-negative".into(),
        });
    }
    Ok(days)
}

fn parse_bool(spec: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::InvalidOverride {
            spec: spec.to_string(),
            reason: format!("expected true or false, got `{other}`"),
        }),
    }
}

fn rule_layer_mut<'a>(
    doc: &'a mut ConfigDocument,
    provider: &str,
    rule: &str,
) -> Option<&'a mut RuleLayer> {
    let rules = doc.rules.get_or_insert_with(Default::default);
    match provider {
        "aws" => {
            let aws = rules.aws.get_or_insert_with(Default::default);
            let slot = match rule {
                "unattached_volumes" => &mut aws.unattached_volumes,
                "old_ebs_snapshots" => &mut aws.old_ebs_snapshots,
                "infinite_log_retention" => &mut aws.infinite_log_retention,
                "untagged_resources" => &mut aws.untagged_resources,
                "elastic_ip_unattached" => &mut aws.elastic_ip_unattached,
                "eni_detached" => &mut aws.eni_detached,
                _ => return None,
            };
            Some(slot.get_or_insert_with(Default::default))
        }
        "azure" => {
            let azure = rules.azure.get_or_insert_with(Default::default);
            let slot = match rule {
                "unattached_disks" => &mut azure.unattached_disks,
                "old_snapshots" => &mut azure.old_snapshots,
                "untagged_resources" => &mut azure.untagged_resources,
                "unused_public_ips" => &mut azure.unused_public_ips,
                _ => return None,
            };
            Some(slot.get_or_insert_with(Default::default))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_confidence_override() {
        let doc =
            parse_overrides(&["aws.unattached_volumes.confidence.high=21".into()]).unwrap();
        let conf = doc
            .rules
            .unwrap()
            .aws
            .unwrap()
            .unattached_volumes
            .unwrap()
            .confidence
            .unwrap();
        assert_eq!(conf.high, Some(21));
        assert_eq!(conf.medium, None);
    }

    #[test]
    fn parses_min_age_and_bool() {
        let doc = parse_overrides(&[
            "azure.untagged_resources.min_age_days=14".into(),
            "tag_filtering.enabled=false".into(),
        ])
        .unwrap();
        assert_eq!(
            doc.rules
                .unwrap()
                .azure
                .unwrap()
                .untagged_resources
                .unwrap()
                .min_age_days,
            Some(14)
        );
        assert_eq!(doc.tag_filtering.unwrap().enabled, Some(false));
    }

    #[test]
    fn rejects_unknown_rule() {
        let err = parse_overrides(&["aws.unattached_vols.confidence.high=1".into()]).unwrap_err();
        assert!(err.to_string().contains("unknown rule"));
    }

    #[test]
    fn rejects_unknown_tier() {
        let err =
            parse_overrides(&["aws.unattached_volumes.confidence.extreme=1".into()]).unwrap_err();
        assert!(err.to_string().contains("unknown settings path"));
    }

    #[test]
    fn rejects_non_numeric_days() {
        let err =
            parse_overrides(&["aws.unattached_volumes.confidence.high=soon".into()]).unwrap_err();
        assert!(err.to_string().contains("integer day count"));
    }

    #[test]
    fn rejects_negative_days() {
        let err =
            parse_overrides(&["aws.unattached_volumes.confidence.high=-3".into()]).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn rejects_missing_equals() {
        let err = parse_overrides(&["aws.unattached_volumes.confidence.high".into()]).unwrap_err();
        assert!(err.to_string().contains("key=value"));
    }
}
