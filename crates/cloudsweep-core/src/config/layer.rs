//! Sparse, strongly-typed configuration layers.
//!
//! Every source (builtin defaults, home file, cwd file, explicit file,
//! CLI overrides) deserializes into the same `ConfigDocument` shape with
//! all-optional fields. `deny_unknown_fields` at every level turns a
//! typo'd rule name or threshold key into a parse error instead of a
//! silently ignored setting.

use serde::Deserialize;

/// Only config schema version currently understood.
pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub tag_filtering: Option<TagFilteringLayer>,
    #[serde(default)]
    pub rules: Option<RulesLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagFilteringLayer {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub ignore: Option<Vec<IgnoreTagEntry>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreTagEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesLayer {
    #[serde(default)]
    pub aws: Option<AwsRulesLayer>,
    #[serde(default)]
    pub azure: Option<AzureRulesLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsRulesLayer {
    #[serde(default)]
    pub unattached_volumes: Option<RuleLayer>,
    #[serde(default)]
    pub old_ebs_snapshots: Option<RuleLayer>,
    #[serde(default)]
    pub infinite_log_retention: Option<RuleLayer>,
    #[serde(default)]
    pub untagged_resources: Option<RuleLayer>,
    #[serde(default)]
    pub elastic_ip_unattached: Option<RuleLayer>,
    #[serde(default)]
    pub eni_detached: Option<RuleLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureRulesLayer {
    #[serde(default)]
    pub unattached_disks: Option<RuleLayer>,
    #[serde(default)]
    pub old_snapshots: Option<RuleLayer>,
    #[serde(default)]
    pub untagged_resources: Option<RuleLayer>,
    #[serde(default)]
    pub unused_public_ips: Option<RuleLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleLayer {
    #[serde(default)]
    pub confidence: Option<ConfidenceLayer>,
    #[serde(default)]
    pub min_age_days: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceLayer {
    #[serde(default)]
    pub high: Option<i64>,
    #[serde(default)]
    pub medium: Option<i64>,
}

fn overlay_opt<T>(base: &mut Option<T>, over: Option<T>) {
    if over.is_some() {
        *base = over;
    }
}

impl ConfidenceLayer {
    fn apply(&mut self, over: ConfidenceLayer) {
        overlay_opt(&mut self.high, over.high);
        overlay_opt(&mut self.medium, over.medium);
    }
}

impl RuleLayer {
    fn apply(&mut self, over: RuleLayer) {
        if let Some(conf) = over.confidence {
            self.confidence.get_or_insert_with(Default::default).apply(conf);
        }
        overlay_opt(&mut self.min_age_days, over.min_age_days);
    }
}

fn apply_rule(base: &mut Option<RuleLayer>, over: Option<RuleLayer>) {
    if let Some(layer) = over {
        base.get_or_insert_with(Default::default).apply(layer);
    }
}

impl AwsRulesLayer {
    fn apply(&mut self, over: AwsRulesLayer) {
        apply_rule(&mut self.unattached_volumes, over.unattached_volumes);
        apply_rule(&mut self.old_ebs_snapshots, over.old_ebs_snapshots);
        apply_rule(&mut self.infinite_log_retention, over.infinite_log_retention);
        apply_rule(&mut self.untagged_resources, over.untagged_resources);
        apply_rule(&mut self.elastic_ip_unattached, over.elastic_ip_unattached);
        apply_rule(&mut self.eni_detached, over.eni_detached);
    }
}

impl AzureRulesLayer {
    fn apply(&mut self, over: AzureRulesLayer) {
        apply_rule(&mut self.unattached_disks, over.unattached_disks);
        apply_rule(&mut self.old_snapshots, over.old_snapshots);
        apply_rule(&mut self.untagged_resources, over.untagged_resources);
        apply_rule(&mut self.unused_public_ips, over.unused_public_ips);
    }
}

impl ConfigDocument {
    /// Layer `over` on top of `self`. Present leaf values in `over` win
    /// wholesale; absent ones leave the lower layer untouched. The tag
    /// ignore list is replaced as a unit, never merged entry-by-entry.
    pub fn apply(&mut self, over: ConfigDocument) {
        overlay_opt(&mut self.version, over.version);
        if let Some(tf) = over.tag_filtering {
            let base = self.tag_filtering.get_or_insert_with(Default::default);
            overlay_opt(&mut base.enabled, tf.enabled);
            overlay_opt(&mut base.ignore, tf.ignore);
        }
        if let Some(rules) = over.rules {
            let base = self.rules.get_or_insert_with(Default::default);
            if let Some(aws) = rules.aws {
                base.aws.get_or_insert_with(Default::default).apply(aws);
            }
            if let Some(azure) = rules.azure {
                base.azure.get_or_insert_with(Default::default).apply(azure);
            }
        }
    }
}
