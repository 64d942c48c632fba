//! Pluggable transport backends and import records.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::endpoint::EndpointDescription;

/// Opaque token identifying one established import.
///
/// Minted by backends via [`ImportHandle::allocate`], process-unique, and
/// used both to close the import and to correlate backend-initiated
/// unregistration across filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportHandle(u64);

impl ImportHandle {
    /// Mint a fresh process-unique handle.
    pub fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ImportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import-{}", self.0)
    }
}

/// A transport implementation capable of importing remote endpoints.
///
/// Backends register with the importer and are tried in registration order
/// until one succeeds. A failed attempt returns `Err`; the importer logs it
/// and moves on to the next backend. [`close`](ImportBackend::close) must
/// tolerate being called more than once for the same handle.
#[async_trait]
pub trait ImportBackend: Send + Sync + 'static {
    /// Human-readable name for logging (e.g. "tcp", "grpc").
    fn name(&self) -> &'static str;

    /// Attempt to establish a local binding for `endpoint`.
    async fn try_import(&self, endpoint: &EndpointDescription) -> anyhow::Result<ImportHandle>;

    /// Tear down a previously established import.
    async fn close(&self, handle: ImportHandle) -> anyhow::Result<()>;
}

/// One established import: the endpoint it was created from, the backend
/// that created it, and the backend's handle for it.
///
/// Equality is by handle; handles are process-unique.
#[derive(Clone)]
pub struct ImportRecord {
    endpoint: EndpointDescription,
    backend: Arc<dyn ImportBackend>,
    handle: ImportHandle,
}

impl ImportRecord {
    /// Create a record for a successful import.
    pub fn new(
        endpoint: EndpointDescription,
        backend: Arc<dyn ImportBackend>,
        handle: ImportHandle,
    ) -> Self {
        Self {
            endpoint,
            backend,
            handle,
        }
    }

    /// The imported endpoint.
    pub fn endpoint(&self) -> &EndpointDescription {
        &self.endpoint
    }

    /// The handle the backend assigned to this import.
    pub fn handle(&self) -> ImportHandle {
        self.handle
    }

    /// Name of the backend that created this import.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Close this import through its backend.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.backend.close(self.handle).await
    }
}

impl PartialEq for ImportRecord {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for ImportRecord {}

impl fmt::Debug for ImportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRecord")
            .field("endpoint", &self.endpoint.id())
            .field("backend", &self.backend.name())
            .field("handle", &self.handle)
            .finish()
    }
}

/// The live set of registered backends, in registration order.
///
/// Membership is by instance (`Arc` pointer identity): registering the same
/// backend object twice holds two slots, and removal takes out the matching
/// instance only.
#[derive(Default)]
pub(crate) struct BackendRegistry {
    backends: RwLock<Vec<Arc<dyn ImportBackend>>>,
}

impl BackendRegistry {
    pub(crate) fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, backend: Arc<dyn ImportBackend>) {
        let mut backends = self.backends.write().expect("registry lock poisoned");
        backends.push(backend);
    }

    pub(crate) fn remove(&self, backend: &Arc<dyn ImportBackend>) -> bool {
        let mut backends = self.backends.write().expect("registry lock poisoned");
        let Some(pos) = backends.iter().position(|b| Arc::ptr_eq(b, backend)) else {
            return false;
        };
        backends.remove(pos);
        true
    }

    /// Snapshot of the current enumeration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ImportBackend>> {
        let backends = self.backends.read().expect("registry lock poisoned");
        backends.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopBackend;

    #[async_trait]
    impl ImportBackend for NoopBackend {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn try_import(
            &self,
            _endpoint: &EndpointDescription,
        ) -> anyhow::Result<ImportHandle> {
            Ok(ImportHandle::allocate())
        }

        async fn close(&self, _handle: ImportHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handles_are_unique() {
        let a = ImportHandle::allocate();
        let b = ImportHandle::allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn registry_removes_by_instance() {
        let registry = BackendRegistry::new();
        let first: Arc<dyn ImportBackend> = Arc::new(NoopBackend);
        let second: Arc<dyn ImportBackend> = Arc::new(NoopBackend);

        registry.add(Arc::clone(&first));
        registry.add(Arc::clone(&second));
        assert_eq!(registry.snapshot().len(), 2);

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));

        let rest = registry.snapshot();
        assert_eq!(rest.len(), 1);
        assert!(Arc::ptr_eq(&rest[0], &second));
    }

    #[test]
    fn records_compare_by_handle() {
        let backend: Arc<dyn ImportBackend> = Arc::new(NoopBackend);
        let handle = ImportHandle::allocate();
        let a = ImportRecord::new(
            EndpointDescription::new("ep-1"),
            Arc::clone(&backend),
            handle,
        );
        let b = ImportRecord::new(EndpointDescription::new("ep-2"), backend, handle);

        // Same handle, different endpoints: still the same import.
        assert_eq!(a, b);
    }
}
