//! The boundary between the scan core and provider SDK clients.
//!
//! Live AWS/Azure fetchers live outside this crate; the core only sees
//! the [`ProviderFetcher`] trait and the typed [`FetchError`]
//! classification, which drives the orchestrator's retry and
//! partial-failure policy.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::descriptor::{ResourceDescriptor, ResourceType};

/// AWS region or Azure subscription id.
pub type ScopeId = String;

/// Typed fetch failures. The class, not the message, decides policy:
/// throttles are retried with backoff, everything else fails the scope
/// immediately.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("throttled by provider: {0}")]
    Throttle(String),
    #[error("scope does not exist: {0}")]
    NotFoundRegion(String),
    #[error("scope timed out: {0}")]
    Timeout(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl FetchError {
    /// Stable class name recorded in `scopes_failed`.
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::Auth(_) => "auth",
            FetchError::Permission(_) => "permission",
            FetchError::Throttle(_) => "throttle",
            FetchError::NotFoundRegion(_) => "not_found_region",
            FetchError::Timeout(_) => "timeout",
            FetchError::Other(_) => "other",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Throttle(_))
    }

    /// Credential/permission failures get a distinct exit code when the
    /// whole scan fails with them.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::Permission(_))
    }
}

/// Supplies resource descriptors for one provider. Implementations wrap
/// SDK clients (or, for offline scans and tests, canned snapshots); the
/// orchestrator never talks to a cloud API directly.
#[async_trait]
pub trait ProviderFetcher: Send + Sync {
    /// Enumerate scopes that contain resources worth scanning. Called
    /// only when the caller did not name scopes explicitly; a narrowing
    /// of where to look, never of how resources are judged.
    async fn discover_scopes(&self) -> Result<Vec<ScopeId>, FetchError>;

    /// Fetch descriptors of one kind within one scope.
    async fn fetch(
        &self,
        scope: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceDescriptor>, FetchError>;

    /// Fetch descriptors of a globally listed kind (not partitioned by
    /// scope). Called once per scan regardless of scope count.
    async fn fetch_global(
        &self,
        _resource_type: ResourceType,
    ) -> Result<Vec<ResourceDescriptor>, FetchError> {
        Ok(Vec::new())
    }
}

/// In-memory fetcher serving a frozen descriptor snapshot. Backs the
/// offline scan mode and most tests.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    scopes: BTreeMap<ScopeId, Vec<ResourceDescriptor>>,
    global: Vec<ResourceDescriptor>,
}

impl StaticFetcher {
    pub fn new(
        scopes: BTreeMap<ScopeId, Vec<ResourceDescriptor>>,
        global: Vec<ResourceDescriptor>,
    ) -> Self {
        Self { scopes, global }
    }

    pub fn with_scope(
        mut self,
        scope: impl Into<ScopeId>,
        descriptors: Vec<ResourceDescriptor>,
    ) -> Self {
        self.scopes.insert(scope.into(), descriptors);
        self
    }

    pub fn with_global(mut self, descriptors: Vec<ResourceDescriptor>) -> Self {
        self.global = descriptors;
        self
    }
}

#[async_trait]
impl ProviderFetcher for StaticFetcher {
    async fn discover_scopes(&self) -> Result<Vec<ScopeId>, FetchError> {
        Ok(self
            .scopes
            .iter()
            .filter(|(_, descriptors)| !descriptors.is_empty())
            .map(|(scope, _)| scope.clone())
            .collect())
    }

    async fn fetch(
        &self,
        scope: &str,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceDescriptor>, FetchError> {
        let descriptors = self
            .scopes
            .get(scope)
            .ok_or_else(|| FetchError::NotFoundRegion(scope.to_string()))?;
        Ok(descriptors
            .iter()
            .filter(|d| d.resource_type == resource_type)
            .cloned()
            .collect())
    }

    async fn fetch_global(
        &self,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceDescriptor>, FetchError> {
        Ok(self
            .global
            .iter()
            .filter(|d| d.resource_type == resource_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Attachment;

    fn volume(id: &str, scope: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_type: ResourceType::Volume,
            resource_id: id.into(),
            scope: Some(scope.into()),
            created_at: None,
            attached: Attachment::Detached,
            tags: BTreeMap::new(),
            size_bytes: None,
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn static_fetcher_filters_by_scope_and_type() {
        let fetcher = StaticFetcher::default()
            .with_scope("us-east-1", vec![volume("vol-1", "us-east-1")])
            .with_scope("eu-west-1", vec![volume("vol-2", "eu-west-1")]);

        let east = fetcher.fetch("us-east-1", ResourceType::Volume).await.unwrap();
        assert_eq!(east.len(), 1);
        assert_eq!(east[0].resource_id, "vol-1");

        let snaps = fetcher.fetch("us-east-1", ResourceType::Snapshot).await.unwrap();
        assert!(snaps.is_empty());
    }

    #[tokio::test]
    async fn unknown_scope_is_a_not_found_error() {
        let fetcher = StaticFetcher::default();
        let err = fetcher.fetch("mars-north-1", ResourceType::Volume).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFoundRegion(_)));
    }

    #[tokio::test]
    async fn discovery_skips_empty_scopes() {
        let fetcher = StaticFetcher::default()
            .with_scope("us-east-1", vec![volume("vol-1", "us-east-1")])
            .with_scope("empty-region", vec![]);
        let scopes = fetcher.discover_scopes().await.unwrap();
        assert_eq!(scopes, vec!["us-east-1".to_string()]);
    }

    #[test]
    fn error_classes_are_stable() {
        assert_eq!(FetchError::Auth("x".into()).class(), "auth");
        assert_eq!(FetchError::Throttle("x".into()).class(), "throttle");
        assert!(FetchError::Throttle("x".into()).is_retryable());
        assert!(!FetchError::Permission("x".into()).is_retryable());
        assert!(FetchError::Permission("x".into()).is_access_denied());
        assert!(!FetchError::Other("x".into()).is_access_denied());
    }
}
