//! The import manager: reconciles candidate endpoints against live imports.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::backend::{BackendRegistry, ImportBackend, ImportHandle, ImportRecord};
use crate::discovery::{DiscoveryScope, EndpointEvent};
use crate::endpoint::EndpointDescription;
use crate::error::{Error, Result};
use crate::multimap::MultiMap;

use super::interest::InterestTracker;
use super::pool::WorkerPool;

/// Configuration for an [`ImportManager`].
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Number of reconciliation workers.
    pub workers: usize,
    /// How long shutdown waits for in-flight reconciliations before
    /// aborting them.
    pub shutdown_grace: Duration,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Coordinates the import of remote services.
///
/// Tracks local consumer interest in capability filters, pools candidate
/// endpoints reported by discovery, and reconciles the two into live
/// imports through the registered transport backends. All event entry
/// points mutate state synchronously on the calling thread and hand only
/// the reconciliation itself to a bounded worker pool.
///
/// Cloning is cheap and yields a handle to the same importer, so discovery
/// and backend-membership callbacks can each hold their own.
///
/// ```
/// use std::sync::Arc;
/// use remote_importer::{ChannelScope, EndpointDescription, ImportManager};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let (scope, _changes) = ChannelScope::new();
/// let manager = ImportManager::new(Arc::new(scope));
///
/// manager.add_interest("(objectClass=org.example.Echo)");
/// manager.endpoint_added(
///     "(objectClass=org.example.Echo)",
///     EndpointDescription::new("tcp://host:9000"),
/// );
/// manager.quiesce().await;
/// // No backend registered yet: the candidate is pooled, nothing imported.
/// assert!(manager.imports_for("(objectClass=org.example.Echo)").is_empty());
/// # });
/// ```
#[derive(Clone)]
pub struct ImportManager {
    inner: Arc<Inner>,
}

struct Inner {
    /// Endpoints reported by discovery that could be imported, by filter.
    candidates: MultiMap<EndpointDescription>,
    /// Already established imports, by the filter they matched.
    imports: MultiMap<ImportRecord>,
    backends: BackendRegistry,
    interests: InterestTracker,
    pool: WorkerPool,
    /// Filters with a reconciliation queued or running; the flag records a
    /// re-trigger that arrived while one was in flight.
    inflight: Mutex<HashMap<String, bool>>,
    idle: Notify,
    config: ImporterConfig,
}

impl ImportManager {
    /// Create a manager with the default configuration.
    ///
    /// Must be called inside a tokio runtime; the reconciliation workers
    /// start immediately.
    pub fn new(scope: Arc<dyn DiscoveryScope>) -> Self {
        Self::with_config(scope, ImporterConfig::default()).expect("default configuration is valid")
    }

    /// Create a manager with an explicit configuration.
    pub fn with_config(scope: Arc<dyn DiscoveryScope>, config: ImporterConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::invalid_config("worker count must be at least 1"));
        }
        let inner = Inner {
            candidates: MultiMap::new(),
            imports: MultiMap::new(),
            backends: BackendRegistry::new(),
            interests: InterestTracker::new(scope),
            pool: WorkerPool::new(config.workers),
            inflight: Mutex::new(HashMap::new()),
            idle: Notify::new(),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// A local consumer registered interest in `filter`.
    ///
    /// The first registration for a filter extends the discovery scope.
    pub fn add_interest(&self, filter: &str) {
        self.inner.interests.add(filter);
    }

    /// A local consumer deregistered interest in `filter`.
    ///
    /// The last deregistration reduces the discovery scope.
    pub fn remove_interest(&self, filter: &str) {
        self.inner.interests.remove(filter);
    }

    /// Discovery reported an endpoint matching `filter`.
    pub fn endpoint_added(&self, filter: &str, endpoint: EndpointDescription) {
        debug!(filter = %filter, endpoint = %endpoint, "endpoint added");
        self.inner.candidates.put(filter, endpoint);
        self.trigger_reconcile(filter);
    }

    /// Discovery reported that an endpoint no longer matches `filter`.
    ///
    /// Removing an endpoint that was never reported is a no-op, but a
    /// reconciliation is scheduled either way.
    pub fn endpoint_removed(&self, filter: &str, endpoint: &EndpointDescription) {
        debug!(filter = %filter, endpoint = %endpoint, "endpoint removed");
        self.inner.candidates.remove(filter, endpoint);
        self.trigger_reconcile(filter);
    }

    /// Apply a discovery event.
    pub fn apply_event(&self, event: EndpointEvent) {
        match event {
            EndpointEvent::Added { filter, endpoint } => self.endpoint_added(&filter, endpoint),
            EndpointEvent::Removed { filter, endpoint } => {
                self.endpoint_removed(&filter, &endpoint)
            }
        }
    }

    /// Drive this manager from a stream of discovery events.
    ///
    /// Returns when the stream ends.
    pub async fn run_events<S>(&self, events: S)
    where
        S: Stream<Item = EndpointEvent>,
    {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            self.apply_event(event);
        }
    }

    /// Register a transport backend.
    ///
    /// Every filter with pooled candidates is re-reconciled: the new
    /// backend may satisfy endpoints no previous backend could import.
    pub fn backend_added(&self, backend: Arc<dyn ImportBackend>) {
        debug!(backend = backend.name(), "backend added, trying to import with it");
        self.inner.backends.add(backend);
        for filter in self.inner.candidates.keys() {
            self.trigger_reconcile(&filter);
        }
    }

    /// Deregister a transport backend.
    ///
    /// Stops future import attempts through it. Imports it already created
    /// stay live until their endpoint departs or the backend reports their
    /// unregistration.
    pub fn backend_removed(&self, backend: &Arc<dyn ImportBackend>) {
        if self.inner.backends.remove(backend) {
            debug!(backend = backend.name(), "backend removed");
        }
    }

    /// A backend reported that one of its imports has been unregistered.
    ///
    /// Every record carrying `handle`, under whatever filter, is removed
    /// from the ledger and closed. No reconciliation is scheduled; the
    /// endpoint is re-attempted only on the owning filter's next trigger.
    pub async fn report_unregistered(&self, handle: ImportHandle) {
        let mut removed = Vec::new();
        for filter in self.inner.imports.keys() {
            for record in self.inner.imports.get(&filter) {
                if record.handle() == handle && self.inner.imports.remove(&filter, &record) {
                    removed.push(record);
                }
            }
        }
        for record in removed {
            debug!(handle = %handle, endpoint = %record.endpoint(), "closing unregistered import");
            close_logged(&record).await;
        }
    }

    /// Snapshot of the established imports for `filter`.
    pub fn imports_for(&self, filter: &str) -> Vec<ImportRecord> {
        self.inner.imports.get(filter)
    }

    /// Snapshot of the pooled candidate endpoints for `filter`.
    pub fn candidates_for(&self, filter: &str) -> Vec<EndpointDescription> {
        self.inner.candidates.get(filter)
    }

    /// Current interest reference count for `filter`.
    pub fn interest_count(&self, filter: &str) -> usize {
        self.inner.interests.count(filter)
    }

    /// Wait until no reconciliation is queued or running.
    pub async fn quiesce(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self
                .inner
                .inflight
                .lock()
                .expect("inflight lock poisoned")
                .is_empty()
            {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting reconciliation work and drain within the configured
    /// grace period; jobs still running after it are aborted.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.pool.shutdown(self.inner.config.shutdown_grace).await
    }

    /// Schedule a reconciliation for `filter`, coalescing with one already
    /// in flight.
    fn trigger_reconcile(&self, filter: &str) {
        {
            let mut inflight = self
                .inner
                .inflight
                .lock()
                .expect("inflight lock poisoned");
            if let Some(rerun) = inflight.get_mut(filter) {
                *rerun = true;
                return;
            }
            inflight.insert(filter.to_string(), false);
        }
        debug!(filter = %filter, "import of a service for filter was queued");

        let inner = Arc::clone(&self.inner);
        let job_filter = filter.to_string();
        let submitted = self
            .inner
            .pool
            .submit(format!("reconcile {filter}"), async move {
                inner.reconcile_until_clean(&job_filter).await;
            });
        if !submitted {
            self.inner.clear_inflight(filter);
        }
    }
}

impl Inner {
    /// Run reconciliations for `filter` until no re-trigger arrived while
    /// one was running, then release the in-flight slot.
    async fn reconcile_until_clean(&self, filter: &str) {
        // If the job unwinds or is aborted mid-pass the guard still
        // releases the slot, so later triggers for this filter are not
        // wedged.
        let mut guard = InflightGuard {
            inner: self,
            filter,
            armed: true,
        };
        loop {
            self.reconcile(filter).await;

            let drained = {
                let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
                match inflight.get_mut(filter) {
                    Some(rerun) if *rerun => {
                        *rerun = false;
                        None
                    }
                    _ => {
                        inflight.remove(filter);
                        Some(inflight.is_empty())
                    }
                }
            };
            match drained {
                None => continue,
                Some(idle) => {
                    guard.armed = false;
                    if idle {
                        self.idle.notify_waiters();
                    }
                    return;
                }
            }
        }
    }

    /// Release the in-flight slot for `filter` without reconciling.
    fn clear_inflight(&self, filter: &str) {
        let idle = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            inflight.remove(filter);
            inflight.is_empty()
        };
        if idle {
            self.idle.notify_waiters();
        }
    }

    /// One reconciliation pass: close imports whose endpoint left the
    /// candidate pool, then attempt an import for every candidate not yet
    /// in the ledger.
    async fn reconcile(&self, filter: &str) {
        self.prune_stale_imports(filter).await;
        self.import_candidates(filter).await;
    }

    async fn prune_stale_imports(&self, filter: &str) {
        let candidates = self.candidates.get(filter);
        for record in self.imports.get(filter) {
            if candidates.contains(record.endpoint()) {
                continue;
            }
            // Remove before closing; losing the removal race to a
            // concurrent pass means that pass owns the close.
            if !self.imports.remove(filter, &record) {
                continue;
            }
            debug!(
                filter = %filter,
                endpoint = %record.endpoint(),
                "closing import for departed endpoint"
            );
            close_logged(&record).await;
        }
    }

    async fn import_candidates(&self, filter: &str) {
        let backends = self.backends.snapshot();
        if backends.is_empty() {
            return;
        }
        let mut imported: HashSet<EndpointDescription> = self
            .imports
            .get(filter)
            .iter()
            .map(|record| record.endpoint().clone())
            .collect();
        for endpoint in self.candidates.get(filter) {
            if imported.contains(&endpoint) {
                continue;
            }
            if let Some(record) = import_endpoint(&backends, &endpoint).await {
                imported.insert(endpoint);
                self.imports.put(filter, record);
            }
        }
    }
}

struct InflightGuard<'a> {
    inner: &'a Inner,
    filter: &'a str,
    armed: bool,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.clear_inflight(self.filter);
        }
    }
}

/// Try each backend in registration order until one imports the endpoint.
async fn import_endpoint(
    backends: &[Arc<dyn ImportBackend>],
    endpoint: &EndpointDescription,
) -> Option<ImportRecord> {
    for backend in backends {
        match backend.try_import(endpoint).await {
            Ok(handle) => {
                debug!(
                    endpoint = %endpoint,
                    backend = backend.name(),
                    handle = %handle,
                    "service import was successful"
                );
                return Some(ImportRecord::new(
                    endpoint.clone(),
                    Arc::clone(backend),
                    handle,
                ));
            }
            Err(err) => {
                info!(
                    endpoint = %endpoint,
                    backend = backend.name(),
                    error = %err,
                    "error importing service"
                );
            }
        }
    }
    None
}

async fn close_logged(record: &ImportRecord) {
    if let Err(err) = record.close().await {
        debug!(handle = %record.handle(), error = %err, "close reported an error");
    }
}
