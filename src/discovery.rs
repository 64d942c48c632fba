//! Discovery collaborator seams: scope registration and endpoint events.

use tokio::sync::mpsc;

use crate::endpoint::EndpointDescription;

/// The subscription-scope side of an endpoint discovery collaborator.
///
/// The importer keeps the collaborator's subscription aligned with current
/// interest: a filter's first interested consumer extends the scope, the
/// last one leaving reduces it. Calls are best-effort notifications; a
/// collaborator that fails to apply one logs it on its own side.
pub trait DiscoveryScope: Send + Sync + 'static {
    /// Start delivering endpoint events for `filter`.
    fn extend_scope(&self, filter: &str);

    /// Stop delivering endpoint events for `filter`.
    fn reduce_scope(&self, filter: &str);
}

/// An endpoint add/remove event as delivered by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A discovered endpoint matched `filter`.
    Added {
        /// The filter the endpoint matched.
        filter: String,
        /// The matching endpoint.
        endpoint: EndpointDescription,
    },
    /// A previously reported endpoint is gone for `filter`.
    Removed {
        /// The filter the endpoint had matched.
        filter: String,
        /// The departed endpoint.
        endpoint: EndpointDescription,
    },
}

/// A scope transition emitted by [`ChannelScope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeChange {
    /// `filter` gained its first interested consumer.
    Extended(String),
    /// `filter` lost its last interested consumer.
    Reduced(String),
}

/// A [`DiscoveryScope`] that forwards transitions over a channel.
///
/// Lets a discovery agent consume scope changes as a feed instead of
/// implementing the trait itself:
///
/// ```
/// use remote_importer::{ChannelScope, DiscoveryScope, ScopeChange};
///
/// let (scope, mut changes) = ChannelScope::new();
/// scope.extend_scope("(objectClass=org.example.Echo)");
/// assert_eq!(
///     changes.try_recv().unwrap(),
///     ScopeChange::Extended("(objectClass=org.example.Echo)".to_string()),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ChannelScope {
    tx: mpsc::UnboundedSender<ScopeChange>,
}

impl ChannelScope {
    /// Create a scope and the receiving end of its change feed.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScopeChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DiscoveryScope for ChannelScope {
    fn extend_scope(&self, filter: &str) {
        let _ = self.tx.send(ScopeChange::Extended(filter.to_string()));
    }

    fn reduce_scope(&self, filter: &str) {
        let _ = self.tx.send(ScopeChange::Reduced(filter.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_scope_forwards_transitions_in_order() {
        let (scope, mut rx) = ChannelScope::new();

        scope.extend_scope("(a=1)");
        scope.reduce_scope("(a=1)");

        assert_eq!(rx.try_recv().unwrap(), ScopeChange::Extended("(a=1)".into()));
        assert_eq!(rx.try_recv().unwrap(), ScopeChange::Reduced("(a=1)".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropping_the_receiver_keeps_the_scope_usable() {
        let (scope, rx) = ChannelScope::new();
        drop(rx);

        // Sends into a closed channel are best-effort no-ops.
        scope.extend_scope("(a=1)");
    }
}
