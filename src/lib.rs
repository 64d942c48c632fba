//! Import-side topology reconciler for remote services.
//!
//! Watches local consumer interest in capability filters, pools remotely
//! discovered candidate endpoints, and reconciles the intersection into
//! live imports through pluggable transport backends.

#![deny(missing_docs)]

pub mod backend;
pub mod counter;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod importer;
pub mod multimap;

// Re-export key types
pub use backend::{ImportBackend, ImportHandle, ImportRecord};
pub use counter::ReferenceCounter;
pub use discovery::{ChannelScope, DiscoveryScope, EndpointEvent, ScopeChange};
pub use endpoint::EndpointDescription;
pub use error::{Error, Result};
pub use importer::{ImportManager, ImporterConfig};
pub use multimap::MultiMap;
