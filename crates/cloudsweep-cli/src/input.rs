//! Offline descriptor snapshots.
//!
//! `--input` scans a pre-exported JSON snapshot instead of a live
//! account. The file carries descriptors grouped by scope plus a
//! `global` list for resources that are not scope-partitioned:
//!
//! ```json
//! {
//!   "scopes": { "us-east-1": [ { "resource_type": "volume", ... } ] },
//!   "global": [ { "resource_type": "bucket", ... } ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use cloudsweep_core::descriptor::ResourceDescriptor;
use cloudsweep_core::fetch::{ScopeId, StaticFetcher};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Snapshot {
    #[serde(default)]
    scopes: BTreeMap<ScopeId, Vec<ResourceDescriptor>>,
    #[serde(default)]
    global: Vec<ResourceDescriptor>,
}

/// Load a descriptor snapshot into the in-memory fetcher.
pub fn load_snapshot(path: &Path) -> Result<StaticFetcher> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read input snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse input snapshot {}", path.display()))?;
    Ok(StaticFetcher::new(snapshot.scopes, snapshot.global))
}
