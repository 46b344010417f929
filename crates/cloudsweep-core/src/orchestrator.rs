//! Concurrent multi-scope scan driver.
//!
//! Scopes are scanned by independent workers behind a semaphore; each
//! worker fetches every resource kind its provider's rules consume,
//! then hands the descriptors back for evaluation. A failed scope never
//! poisons its siblings: its error class lands in `scopes_failed` and
//! the scan carries on. Only the total loss of every scope is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::EffectiveConfig;
use crate::descriptor::{Provider, ResourceDescriptor, ResourceType};
use crate::fetch::{FetchError, ProviderFetcher, ScopeId};
use crate::filter;
use crate::finding::Finding;
use crate::report::{self, ScanReport};
use crate::rules::{evaluate, RuleRegistry};

/// Tunables for one scan run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub provider: Provider,
    /// Explicit scopes to scan. Empty means discover.
    pub scopes: Vec<ScopeId>,
    pub max_concurrent_scopes: usize,
    pub scope_timeout: Duration,
    pub throttle_retries: u32,
    pub retry_base_delay: Duration,
}

impl ScanOptions {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            scopes: Vec::new(),
            max_concurrent_scopes: 5,
            scope_timeout: Duration::from_secs(300),
            throttle_retries: 3,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scope discovery failed: {0}")]
    Discovery(FetchError),
    /// Every scope failed, so there is no result to report. An empty
    /// success report would be indistinguishable from a clean account.
    #[error("all {attempted} scope(s) failed; nothing was scanned")]
    AllScopesFailed {
        attempted: usize,
        failures: BTreeMap<ScopeId, String>,
        /// True when every failure was a credential or permission error.
        access_denied: bool,
    },
    #[error("scan cancelled before any scope completed")]
    Cancelled,
}

enum ScopeOutcome {
    Fetched(Vec<ResourceDescriptor>),
    Failed(FetchError),
    Cancelled,
}

/// Run the rules of `opts.provider` across the requested scopes and
/// build the final report.
///
/// Flip the `cancel` watch channel to true to abort: in-flight scopes
/// stop at the next fetch boundary and unstarted scopes never run.
/// Cancelled scopes are reported as failed; no partial scope data
/// enters the report.
#[instrument(skip_all, fields(provider = opts.provider.as_str()))]
pub async fn run_scan(
    registry: &RuleRegistry,
    fetcher: Arc<dyn ProviderFetcher>,
    cfg: &EffectiveConfig,
    opts: &ScanOptions,
    cancel: watch::Receiver<bool>,
) -> Result<ScanReport, ScanError> {
    let scopes = resolve_scopes(fetcher.as_ref(), opts).await?;
    let (scoped_types, global_types) = registry.resource_types_for(opts.provider);
    info!(
        scopes = scopes.len(),
        max_concurrent = opts.max_concurrent_scopes,
        "starting scan"
    );

    let semaphore = Arc::new(Semaphore::new(opts.max_concurrent_scopes.max(1)));
    let scoped_types = Arc::new(scoped_types);
    let mut workers: JoinSet<(ScopeId, ScopeOutcome)> = JoinSet::new();
    for scope in &scopes {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        let types = Arc::clone(&scoped_types);
        let scope = scope.clone();
        let cancel = cancel.clone();
        let scope_timeout = opts.scope_timeout;
        let retries = opts.throttle_retries;
        let base_delay = opts.retry_base_delay;
        debug!(scope = %scope, state = "pending", "scope queued");
        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (scope, ScopeOutcome::Cancelled);
            };
            if *cancel.borrow() {
                return (scope, ScopeOutcome::Cancelled);
            }
            debug!(scope = %scope, state = "fetching", "scope started");
            let outcome = scan_scope(
                fetcher.as_ref(),
                &scope,
                &types,
                scope_timeout,
                retries,
                base_delay,
                cancel,
            )
            .await;
            (scope, outcome)
        });
    }

    let mut per_scope: BTreeMap<ScopeId, Vec<ResourceDescriptor>> = BTreeMap::new();
    let mut scopes_failed: BTreeMap<ScopeId, String> = BTreeMap::new();
    while let Some(joined) = workers.join_next().await {
        let (scope, outcome) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                // A panicking worker loses its scope id; the scan still
                // finishes with whatever the other scopes produced.
                warn!(error = %err, "scope worker panicked");
                continue;
            }
        };
        match outcome {
            ScopeOutcome::Fetched(descriptors) => {
                debug!(
                    scope = %scope,
                    state = "evaluating",
                    descriptors = descriptors.len(),
                    "scope fetched"
                );
                per_scope.insert(scope, descriptors);
            }
            ScopeOutcome::Failed(err) => {
                warn!(scope = %scope, state = "failed", error = %err, "scope failed");
                scopes_failed.insert(scope, format!("{}: {}", err.class(), err));
            }
            ScopeOutcome::Cancelled => {
                debug!(scope = %scope, state = "failed", "scope cancelled");
                scopes_failed.insert(scope, "cancelled: scan aborted".to_string());
            }
        }
    }

    if per_scope.is_empty() {
        if *cancel.borrow() {
            return Err(ScanError::Cancelled);
        }
        let access_denied = !scopes_failed.is_empty()
            && scopes_failed
                .values()
                .all(|message| message.starts_with("auth:") || message.starts_with("permission:"));
        return Err(ScanError::AllScopesFailed {
            attempted: scopes.len(),
            failures: scopes_failed,
            access_denied,
        });
    }

    // Globally listed resources are fetched once per scan, outside the
    // per-scope workers, and deduplicated by id in case the provider
    // reports the same resource from several listing calls.
    let mut scopes_attempted = scopes.len();
    let mut global_pool: Vec<ResourceDescriptor> = Vec::new();
    if !global_types.is_empty() && !*cancel.borrow() {
        // The global listing is its own attempted unit whether it
        // succeeds or fails, so the summary arithmetic
        // (succeeded = attempted - failed) keeps one meaning.
        scopes_attempted += 1;
        match fetch_global(
            fetcher.as_ref(),
            &global_types,
            opts.throttle_retries,
            opts.retry_base_delay,
        )
        .await
        {
            Ok(descriptors) => {
                let mut seen: BTreeSet<String> = BTreeSet::new();
                for descriptor in descriptors {
                    if seen.insert(descriptor.resource_id.clone()) {
                        global_pool.push(descriptor);
                    }
                }
            }
            Err(err) => {
                warn!(scope = "global", error = %err, "global fetch failed");
                scopes_failed.insert(
                    "global".to_string(),
                    format!("{}: {}", err.class(), err),
                );
            }
        }
    }

    let now = Utc::now();
    let mut findings: Vec<Finding> = Vec::new();
    for descriptors in per_scope.values() {
        for rule in registry.for_provider(opts.provider) {
            findings.extend(evaluate(rule, descriptors, cfg, now));
        }
    }
    for rule in registry.for_provider(opts.provider) {
        findings.extend(evaluate(rule, &global_pool, cfg, now));
    }

    let filtered = filter::apply(findings, &cfg.tag_filter);
    info!(
        findings = filtered.kept.len(),
        ignored = filtered.ignored,
        scopes_failed = scopes_failed.len(),
        "scan finished"
    );

    Ok(report::build(
        opts.provider,
        filtered.kept,
        scopes_attempted,
        scopes_failed,
        filtered.ignored,
        now,
    ))
}

/// Explicit scopes win; otherwise ask the fetcher. An account where
/// discovery itself errors out still gets a best-effort scan of the
/// provider's default scope.
async fn resolve_scopes(
    fetcher: &dyn ProviderFetcher,
    opts: &ScanOptions,
) -> Result<Vec<ScopeId>, ScanError> {
    if !opts.scopes.is_empty() {
        let mut scopes = opts.scopes.clone();
        scopes.sort();
        scopes.dedup();
        return Ok(scopes);
    }
    match fetcher.discover_scopes().await {
        Ok(mut scopes) => {
            if scopes.is_empty() {
                scopes.push(opts.provider.default_scope().to_string());
            }
            scopes.sort();
            scopes.dedup();
            Ok(scopes)
        }
        Err(err) if matches!(err, FetchError::Auth(_) | FetchError::Permission(_)) => {
            Err(ScanError::Discovery(err))
        }
        Err(err) => {
            warn!(error = %err, "scope discovery failed, falling back to default scope");
            Ok(vec![opts.provider.default_scope().to_string()])
        }
    }
}

async fn scan_scope(
    fetcher: &dyn ProviderFetcher,
    scope: &str,
    types: &[ResourceType],
    scope_timeout: Duration,
    retries: u32,
    base_delay: Duration,
    mut cancel: watch::Receiver<bool>,
) -> ScopeOutcome {
    let cancel_flag = cancel.clone();
    let fetch_all = async {
        let mut descriptors = Vec::new();
        for &resource_type in types {
            if *cancel_flag.borrow() {
                return ScopeOutcome::Cancelled;
            }
            match fetch_with_retry(fetcher, scope, resource_type, retries, base_delay).await {
                Ok(batch) => descriptors.extend(batch),
                Err(err) => return ScopeOutcome::Failed(err),
            }
        }
        ScopeOutcome::Fetched(descriptors)
    };
    tokio::select! {
        outcome = timeout(scope_timeout, fetch_all) => match outcome {
            Ok(outcome) => outcome,
            Err(_) => ScopeOutcome::Failed(FetchError::Timeout(format!(
                "scope did not finish within {}s",
                scope_timeout.as_secs()
            ))),
        },
        _ = wait_cancelled(&mut cancel) => ScopeOutcome::Cancelled,
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: cancellation can never fire.
            std::future::pending::<()>().await;
        }
    }
}

/// Only throttling is retried. Same backoff shape everywhere: doubling
/// from the base delay, capped at five seconds.
async fn fetch_with_retry(
    fetcher: &dyn ProviderFetcher,
    scope: &str,
    resource_type: ResourceType,
    retries: u32,
    base_delay: Duration,
) -> Result<Vec<ResourceDescriptor>, FetchError> {
    let mut attempt = 0u32;
    let mut backoff = base_delay;
    loop {
        match fetcher.fetch(scope, resource_type).await {
            Ok(descriptors) => return Ok(descriptors),
            Err(err) if err.is_retryable() && attempt < retries => {
                warn!(
                    scope,
                    resource_type = resource_type.as_str(),
                    attempt,
                    "throttled, backing off"
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(5));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_global(
    fetcher: &dyn ProviderFetcher,
    types: &[ResourceType],
    retries: u32,
    base_delay: Duration,
) -> Result<Vec<ResourceDescriptor>, FetchError> {
    let mut descriptors = Vec::new();
    for &resource_type in types {
        let mut attempt = 0u32;
        let mut backoff = base_delay;
        loop {
            match fetcher.fetch_global(resource_type).await {
                Ok(batch) => {
                    descriptors.extend(batch);
                    break;
                }
                Err(err) if err.is_retryable() && attempt < retries => {
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(descriptors)
}
