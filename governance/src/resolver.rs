//! Framework resolution with single-flight caching.
//!
//! Frameworks are content-addressed and immutable, so a successful resolution
//! is cached for the lifetime of the resolver. Concurrent requests for the same
//! SAID share one fetch. Failures are handed to every waiter of that fetch but
//! are not cached; the next request fetches again.
//!
//! The in-flight registry only holds a weak handle on each pending fetch. When
//! every waiter has gone away the fetch is dropped with them, and a later
//! request for the same SAID starts a fresh one.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chain::VersionChain;
use crate::config::ResolverConfig;
use crate::framework::GovernanceFramework;
use crate::types::{GovernanceError, Result};

/// Errors reported by a credential fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential source unavailable: {0}")]
    Unavailable(String),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of raw framework credentials, keyed by SAID.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Fetch the raw credential named by `said`.
    async fn fetch(&self, said: &str) -> std::result::Result<Value, FetchError>;
}

/// In-memory credential source for frameworks bundled with an application
/// or loaded ahead of time.
#[derive(Debug, Clone, Default)]
pub struct BundledCredentialStore {
    credentials: Arc<RwLock<HashMap<String, Value>>>,
}

impl BundledCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw credential under its own `d` field. Returns the SAID, or
    /// `None` if the credential carries none.
    pub async fn insert(&self, credential: Value) -> Option<String> {
        let said = credential.get("d").and_then(Value::as_str)?.to_string();
        self.credentials.write().await.insert(said.clone(), credential);
        Some(said)
    }

    /// Store a raw credential under an explicit key.
    pub async fn insert_raw(&self, said: impl Into<String>, credential: Value) {
        self.credentials.write().await.insert(said.into(), credential);
    }

    /// Store a framework rendered as its credential.
    pub async fn insert_framework(&self, framework: &GovernanceFramework) {
        self.insert_raw(framework.said(), framework.to_credential()).await;
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialFetcher for BundledCredentialStore {
    async fn fetch(&self, said: &str) -> std::result::Result<Value, FetchError> {
        self.credentials
            .read()
            .await
            .get(said)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(said.to_string()))
    }
}

type Resolution = Result<Arc<GovernanceFramework>>;
type PendingResolution = Shared<BoxFuture<'static, Resolution>>;

/// Registry slot for a fetch in progress. The generation stops a finished
/// fetch from clearing a newer slot for the same SAID.
struct InFlight {
    generation: u64,
    pending: WeakShared<BoxFuture<'static, Resolution>>,
}

/// Clears a registry slot when its fetch finishes or is dropped, unless a
/// newer fetch has taken the slot.
struct SlotGuard {
    in_flight: Arc<DashMap<String, InFlight>>,
    said: String,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.in_flight
            .remove_if(&self.said, |_, slot| slot.generation == generation);
    }
}

enum Lookup {
    Cached(Arc<GovernanceFramework>),
    Pending(PendingResolution),
}

/// Resolves framework SAIDs to parsed frameworks.
pub struct FrameworkResolver {
    fetcher: Arc<dyn CredentialFetcher>,
    config: ResolverConfig,
    cache: Arc<DashMap<String, Arc<GovernanceFramework>>>,
    /// prior SAID -> SAID of the version that replaced it
    superseded_by: Arc<DashMap<String, String>>,
    in_flight: Arc<DashMap<String, InFlight>>,
    generation: AtomicU64,
}

impl FrameworkResolver {
    pub fn new(fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self::with_config(fetcher, ResolverConfig::default())
    }

    pub fn with_config(fetcher: Arc<dyn CredentialFetcher>, config: ResolverConfig) -> Self {
        Self {
            fetcher,
            config,
            cache: Arc::new(DashMap::new()),
            superseded_by: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `said` to its framework.
    ///
    /// Concurrent calls for the same SAID perform at most one fetch and all
    /// observe the same outcome.
    pub async fn resolve(&self, said: &str) -> Result<Arc<GovernanceFramework>> {
        if let Some(framework) = self.cached(said) {
            debug!(said = %said, "Framework cache hit");
            return Ok(framework);
        }

        match self.join_or_start(said) {
            Lookup::Cached(framework) => Ok(framework),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Resolve, giving up after `timeout`.
    ///
    /// Giving up only withdraws this caller. Other callers waiting on the same
    /// fetch are unaffected.
    pub async fn resolve_with_timeout(
        &self,
        said: &str,
        timeout: Duration,
    ) -> Result<Arc<GovernanceFramework>> {
        match tokio::time::timeout(timeout, self.resolve(said)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(said = %said, timeout_ms = timeout.as_millis() as u64, "Resolution wait timed out");
                Err(GovernanceError::unresolved(
                    said,
                    format!("resolution timed out after {:?}", timeout),
                ))
            }
        }
    }

    /// Seed the cache with a framework that is already in hand.
    pub fn register(&self, framework: GovernanceFramework) -> Arc<GovernanceFramework> {
        let framework = self
            .cache
            .entry(framework.said().to_string())
            .or_insert_with(|| Arc::new(framework))
            .clone();
        self.record_supersession(&framework);
        framework
    }

    pub fn cached(&self, said: &str) -> Option<Arc<GovernanceFramework>> {
        self.cache.get(said).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_cached(&self, said: &str) -> bool {
        self.cache.contains_key(said)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Fetches that still have at least one waiter.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolve the supersession chain through `said`, newest first.
    ///
    /// Predecessors are followed through each version's `supersedes` edge;
    /// successors are those this resolver has already seen. A cycle is a
    /// malformed framework; an unresolvable predecessor fails the chain.
    pub async fn resolve_chain(&self, said: &str) -> Result<VersionChain> {
        let start = self.resolve(said).await?;
        let mut seen = HashSet::from([start.said().to_string()]);

        let mut ancestors = Vec::new();
        let mut current = Arc::clone(&start);
        while let Some(prior_said) = current.supersedes().map(str::to_string) {
            if !seen.insert(prior_said.clone()) {
                return Err(GovernanceError::malformed(&prior_said, "supersession cycle"));
            }
            let prior = self.resolve(&prior_said).await?;
            ancestors.push(Arc::clone(&prior));
            current = prior;
        }

        let mut descendants = Vec::new();
        let mut cursor = start.said().to_string();
        while let Some(next) = self.superseded_by.get(&cursor).map(|e| e.value().clone()) {
            if !seen.insert(next.clone()) {
                return Err(GovernanceError::malformed(&next, "supersession cycle"));
            }
            descendants.push(self.resolve(&next).await?);
            cursor = next;
        }

        let mut versions: Vec<_> = descendants.into_iter().rev().collect();
        versions.push(start);
        versions.extend(ancestors);

        debug!(said = %said, depth = versions.len(), "Resolved version chain");
        Ok(VersionChain::new(versions))
    }

    /// Resolve the newest known version in the chain through `said`.
    pub async fn resolve_active(&self, said: &str) -> Result<Arc<GovernanceFramework>> {
        self.resolve_chain(said)
            .await?
            .into_active()
            .ok_or_else(|| GovernanceError::unresolved(said, "empty version chain"))
    }

    fn record_supersession(&self, framework: &GovernanceFramework) {
        if let Some(prior) = framework.supersedes() {
            self.superseded_by
                .insert(prior.to_string(), framework.said().to_string());
        }
    }

    fn join_or_start(&self, said: &str) -> Lookup {
        let entry = self.in_flight.entry(said.to_string());
        if let Entry::Occupied(slot) = &entry {
            if let Some(pending) = slot.get().pending.upgrade() {
                debug!(said = %said, "Joining in-flight resolution");
                return Lookup::Pending(pending);
            }
        }

        // A fetch may have completed between the cache check and taking the
        // registry entry.
        if let Some(framework) = self.cached(said) {
            return Lookup::Cached(framework);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let pending = self.start(said, generation);
        if let Some(weak) = pending.downgrade() {
            entry.insert(InFlight {
                generation,
                pending: weak,
            });
        }
        Lookup::Pending(pending)
    }

    fn start(&self, said: &str, generation: u64) -> PendingResolution {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = Arc::clone(&self.cache);
        let superseded_by = Arc::clone(&self.superseded_by);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.config.fetch_timeout();
        let said = said.to_string();
        let slot = SlotGuard {
            in_flight,
            said: said.clone(),
            generation,
        };

        async move {
            let _slot = slot;
            let outcome = fetch_framework(fetcher.as_ref(), &said, timeout)
                .await
                .map(Arc::new);

            match &outcome {
                Ok(framework) => {
                    cache.insert(said.clone(), Arc::clone(framework));
                    if let Some(prior) = framework.supersedes() {
                        superseded_by.insert(prior.to_string(), said.clone());
                    }
                    info!(
                        said = %said,
                        name = %framework.name(),
                        version = %framework.version(),
                        rules = framework.rules().len(),
                        "Resolved governance framework"
                    );
                }
                Err(e) => warn!(said = %said, error = %e, "Framework resolution failed"),
            }

            outcome
        }
        .boxed()
        .shared()
    }
}

async fn fetch_framework(
    fetcher: &dyn CredentialFetcher,
    said: &str,
    timeout: Option<Duration>,
) -> Result<GovernanceFramework> {
    debug!(said = %said, "Fetching framework credential");
    let fetched = match timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(said))
            .await
            .unwrap_or(Err(FetchError::Timeout(limit))),
        None => fetcher.fetch(said).await,
    };

    let raw = fetched.map_err(|e| GovernanceError::unresolved(said, e.to_string()))?;
    GovernanceFramework::from_credential(said, &raw)
}
