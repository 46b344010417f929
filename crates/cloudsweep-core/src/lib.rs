pub mod config;
pub mod descriptor;
pub mod fetch;
pub mod filter;
pub mod finding;
pub mod orchestrator;
pub mod report;
pub mod rules;

pub use config::{ConfigError, ConfigSources, EffectiveConfig, IgnoreTagRule, TagFilterConfig};
pub use descriptor::{Attachment, Provider, ResourceDescriptor, ResourceType};
pub use fetch::{FetchError, ProviderFetcher, ScopeId, StaticFetcher};
pub use finding::{Confidence, Evidence, Finding, Risk};
pub use orchestrator::{run_scan, ScanError, ScanOptions};
pub use report::{ScanReport, ScanSummary, SCHEMA_VERSION};
pub use rules::{RuleInfo, RuleRegistry};
