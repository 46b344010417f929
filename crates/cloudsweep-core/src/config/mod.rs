//! Configuration resolution.
//!
//! Five sources merge into one read-only [`EffectiveConfig`] per scan
//! invocation, highest priority first:
//!
//! 1. CLI `--set` overrides (and `--ignore-tag`, which replaces the
//!    whole ignore list rather than appending)
//! 2. an explicitly named config file (`--config`)
//! 3. `cloudsweep.yaml` in the working directory
//! 4. `~/.cloudsweep/config.yaml`
//! 5. builtin defaults
//!
//! Any malformed file aborts resolution before a single provider call is
//! made. Unknown rule names and threshold keys are rejected, not
//! silently dropped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub mod defaults;
pub mod layer;
pub mod overrides;

use layer::{ConfigDocument, IgnoreTagEntry, RuleLayer, SUPPORTED_VERSION};

/// Fatal configuration errors. These abort the scan before any API work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },
    #[error("unsupported config version {version} in {path} (expected {SUPPORTED_VERSION})")]
    UnsupportedVersion { path: PathBuf, version: u32 },
    #[error("invalid override `{spec}`: {reason}")]
    InvalidOverride { spec: String, reason: String },
    #[error("invalid ignore tag `{spec}`: {reason}")]
    InvalidIgnoreTag { spec: String, reason: String },
}

/// Resolved thresholds for one rule. Fields a rule does not use stay
/// `None` (e.g. the log retention rule has no medium tier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuleParams {
    pub high_days: Option<i64>,
    pub medium_days: Option<i64>,
    pub min_age_days: Option<i64>,
}

/// One user-declared ignore rule: key-only matches any value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreTagRule {
    pub key: String,
    pub value: Option<String>,
}

/// Resolved tag filtering policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TagFilterConfig {
    pub enabled: bool,
    pub ignore: Vec<IgnoreTagRule>,
}

impl TagFilterConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.ignore.is_empty()
    }
}

/// The flattened parameter set for one scan invocation. Built once,
/// read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    rules: BTreeMap<String, RuleParams>,
    pub tag_filter: TagFilterConfig,
}

impl EffectiveConfig {
    /// Thresholds for a rule, by its stable id. Unknown ids resolve to
    /// empty params; rules treat missing thresholds as "tier disabled".
    pub fn params(&self, rule_id: &str) -> RuleParams {
        self.rules.get(rule_id).copied().unwrap_or_default()
    }

    /// Builtin defaults with no user layers; the registry's shipped
    /// behaviour.
    pub fn builtin() -> Self {
        flatten(defaults::builtin_defaults(), &[])
            .expect("builtin defaults are well-formed")
    }
}

/// Where each layer comes from for one invocation.
#[derive(Debug, Default)]
pub struct ConfigSources<'a> {
    /// `--set key=value` strings, highest priority.
    pub cli_overrides: &'a [String],
    /// `--ignore-tag key[:value]` strings; when non-empty these REPLACE
    /// any file-declared ignore list.
    pub cli_ignore_tags: &'a [String],
    /// `--config` path; must exist.
    pub explicit_path: Option<&'a Path>,
    /// `./cloudsweep.yaml`, skipped when absent.
    pub cwd_path: Option<PathBuf>,
    /// `~/.cloudsweep/config.yaml`, skipped when absent.
    pub home_path: Option<PathBuf>,
}

/// Merge all configured layers into one [`EffectiveConfig`].
pub fn resolve(sources: &ConfigSources<'_>) -> Result<EffectiveConfig, ConfigError> {
    let mut doc = defaults::builtin_defaults();

    if let Some(path) = &sources.home_path {
        if let Some(layer) = load_optional_file(path)? {
            debug!(path = %path.display(), "applying home config layer");
            doc.apply(layer);
        }
    }
    if let Some(path) = &sources.cwd_path {
        if let Some(layer) = load_optional_file(path)? {
            debug!(path = %path.display(), "applying working-directory config layer");
            doc.apply(layer);
        }
    }
    if let Some(path) = sources.explicit_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        debug!(path = %path.display(), "applying explicit config layer");
        doc.apply(load_file(path)?);
    }
    if !sources.cli_overrides.is_empty() {
        doc.apply(overrides::parse_overrides(sources.cli_overrides)?);
    }

    flatten(doc, sources.cli_ignore_tags)
}

fn load_optional_file(path: &Path) -> Result<Option<ConfigDocument>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_file(path).map(Some)
}

fn load_file(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: ConfigDocument =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if let Some(version) = doc.version {
        if version != SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                path: path.to_path_buf(),
                version,
            });
        }
    }
    Ok(doc)
}

fn flatten(
    doc: ConfigDocument,
    cli_ignore_tags: &[String],
) -> Result<EffectiveConfig, ConfigError> {
    let mut rules = BTreeMap::new();
    if let Some(rules_layer) = &doc.rules {
        if let Some(aws) = &rules_layer.aws {
            insert_params(&mut rules, "aws.ebs.volume.unattached", &aws.unattached_volumes);
            insert_params(&mut rules, "aws.ebs.snapshot.old", &aws.old_ebs_snapshots);
            insert_params(
                &mut rules,
                "aws.logs.infinite_retention",
                &aws.infinite_log_retention,
            );
            insert_params(&mut rules, "aws.resource.untagged", &aws.untagged_resources);
            insert_params(
                &mut rules,
                "aws.ec2.elastic_ip.unattached",
                &aws.elastic_ip_unattached,
            );
            insert_params(&mut rules, "aws.ec2.eni.detached", &aws.eni_detached);
        }
        if let Some(azure) = &rules_layer.azure {
            insert_params(&mut rules, "azure.disk.unattached", &azure.unattached_disks);
            insert_params(&mut rules, "azure.snapshot.old", &azure.old_snapshots);
            insert_params(&mut rules, "azure.resource.untagged", &azure.untagged_resources);
            insert_params(&mut rules, "azure.public_ip.unused", &azure.unused_public_ips);
        }
    }

    let tag_filter = if cli_ignore_tags.is_empty() {
        match doc.tag_filtering {
            Some(tf) => TagFilterConfig {
                enabled: tf.enabled.unwrap_or(true),
                ignore: tf
                    .ignore
                    .unwrap_or_default()
                    .into_iter()
                    .map(|IgnoreTagEntry { key, value }| IgnoreTagRule { key, value })
                    .collect(),
            },
            None => TagFilterConfig::default(),
        }
    } else {
        // CLI ignore tags replace, rather than append to, file-declared
        // rules.
        TagFilterConfig {
            enabled: true,
            ignore: parse_ignore_tags(cli_ignore_tags)?,
        }
    };

    Ok(EffectiveConfig { rules, tag_filter })
}

fn insert_params(
    rules: &mut BTreeMap<String, RuleParams>,
    rule_id: &str,
    layer: &Option<RuleLayer>,
) {
    let Some(layer) = layer else { return };
    let confidence = layer.confidence.clone().unwrap_or_default();
    rules.insert(
        rule_id.to_string(),
        RuleParams {
            high_days: confidence.high,
            medium_days: confidence.medium,
            min_age_days: layer.min_age_days,
        },
    );
}

/// Parse `key` or `key:value` ignore-tag specs from the CLI.
pub fn parse_ignore_tags(specs: &[String]) -> Result<Vec<IgnoreTagRule>, ConfigError> {
    specs
        .iter()
        .map(|spec| {
            let (key, value) = match spec.split_once(':') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (spec.as_str(), None),
            };
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidIgnoreTag {
                    spec: spec.clone(),
                    reason: "tag key must not be empty".into(),
                });
            }
            Ok(IgnoreTagRule {
                key: key.to_string(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn builtin_config_has_shipped_volume_thresholds() {
        let cfg = EffectiveConfig::builtin();
        let params = cfg.params("aws.ebs.volume.unattached");
        assert_eq!(params.high_days, Some(14));
        assert_eq!(params.medium_days, Some(7));
        assert_eq!(cfg.params("aws.resource.untagged").min_age_days, Some(7));
        assert!(!cfg.tag_filter.is_active());
    }

    #[test]
    fn unknown_rule_id_resolves_to_empty_params() {
        let cfg = EffectiveConfig::builtin();
        assert_eq!(cfg.params("aws.no.such.rule"), RuleParams::default());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "cloudsweep.yaml",
            "version: 1\nrules:\n  aws:\n    unattached_volumes:\n      confidence:\n        high: 30\n",
        );
        let cfg = resolve(&ConfigSources {
            cwd_path: Some(path),
            ..Default::default()
        })
        .unwrap();
        let params = cfg.params("aws.ebs.volume.unattached");
        assert_eq!(params.high_days, Some(30));
        // untouched sibling keys keep their default
        assert_eq!(params.medium_days, Some(7));
    }

    #[test]
    fn cli_override_beats_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "explicit.yaml",
            "rules:\n  aws:\n    unattached_volumes:\n      confidence:\n        high: 30\n",
        );
        let overrides = vec!["aws.unattached_volumes.confidence.high=60".to_string()];
        let cfg = resolve(&ConfigSources {
            cli_overrides: &overrides,
            explicit_path: Some(&path),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.params("aws.ebs.volume.unattached").high_days, Some(60));
    }

    #[test]
    fn explicit_file_beats_cwd_and_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = write_file(
            &dir,
            "home.yaml",
            "rules:\n  azure:\n    old_snapshots:\n      confidence:\n        high: 10\n",
        );
        let cwd = write_file(
            &dir,
            "cwd.yaml",
            "rules:\n  azure:\n    old_snapshots:\n      confidence:\n        high: 20\n",
        );
        let explicit = write_file(
            &dir,
            "explicit.yaml",
            "rules:\n  azure:\n    old_snapshots:\n      confidence:\n        high: 40\n",
        );
        let cfg = resolve(&ConfigSources {
            explicit_path: Some(&explicit),
            cwd_path: Some(cwd),
            home_path: Some(home),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.params("azure.snapshot.old").high_days, Some(40));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = resolve(&ConfigSources {
            explicit_path: Some(Path::new("/nonexistent/cloudsweep.yaml")),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_file_aborts_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.yaml", "rules: [not, a, mapping]\n");
        let err = resolve(&ConfigSources {
            cwd_path: Some(path),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "v2.yaml", "version: 2\n");
        let err = resolve(&ConfigSources {
            cwd_path: Some(path),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { version: 2, .. }));
    }

    #[test]
    fn cli_ignore_tags_replace_file_rules_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "tags.yaml",
            "tag_filtering:\n  enabled: true\n  ignore:\n    - key: env\n      value: prod\n    - key: team\n",
        );
        let ignore = vec!["keep:true".to_string()];
        let cfg = resolve(&ConfigSources {
            cli_ignore_tags: &ignore,
            cwd_path: Some(path),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.tag_filter.ignore.len(), 1);
        assert_eq!(cfg.tag_filter.ignore[0].key, "keep");
        assert_eq!(cfg.tag_filter.ignore[0].value.as_deref(), Some("true"));
    }

    #[test]
    fn resolving_same_overrides_twice_is_idempotent() {
        let overrides = vec![
            "aws.eni_detached.confidence.high=90".to_string(),
            "aws.eni_detached.confidence.high=90".to_string(),
        ];
        let once = resolve(&ConfigSources {
            cli_overrides: &overrides[..1],
            ..Default::default()
        })
        .unwrap();
        let twice = resolve(&ConfigSources {
            cli_overrides: &overrides,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_ignore_tag_key_is_rejected() {
        let err = parse_ignore_tags(&[":prod".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIgnoreTag { .. }));
    }
}
