//! Interest gateway: reference counts filters and keeps discovery scope in
//! step with the 0→1 / 1→0 transitions.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::counter::ReferenceCounter;
use crate::discovery::DiscoveryScope;

pub(crate) struct InterestTracker {
    counter: ReferenceCounter<String>,
    scope: Arc<dyn DiscoveryScope>,
}

impl InterestTracker {
    pub(crate) fn new(scope: Arc<dyn DiscoveryScope>) -> Self {
        Self {
            counter: ReferenceCounter::new(),
            scope,
        }
    }

    pub(crate) fn add(&self, filter: &str) {
        if self.counter.add(filter.to_string()) == 1 {
            self.scope.extend_scope(filter);
        }
    }

    pub(crate) fn remove(&self, filter: &str) {
        match self.counter.remove(&filter.to_string()) {
            Some(0) => {
                debug!(filter = %filter, "last reference to import interest is gone, removing interest filter");
                self.scope.reduce_scope(filter);
            }
            Some(_) => {}
            None => {
                warn!(filter = %filter, "interest removed without a matching add");
            }
        }
    }

    pub(crate) fn count(&self, filter: &str) -> usize {
        self.counter.count(&filter.to_string())
    }
}
