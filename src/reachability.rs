//! # Reachability Monitor
//!
//! Tracks whether the network is currently reachable and lets the retry engine
//! wait for the "became reachable" edge instead of burning retry attempts while
//! offline.
//!
//! The platform layer owns the actual connectivity probe and pushes updates
//! through [`NetworkReachability::set_reachable`].

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

/// Callback fired once when connectivity is restored
pub type ReachabilityCallback = Box<dyn FnOnce() + Send + 'static>;

#[async_trait]
pub trait ReachabilityMonitor: Send + Sync {
    /// Whether the network is reachable right now
    fn is_reachable(&self) -> bool;

    /// Resolve as soon as the network is reachable
    async fn wait_until_reachable(&self);

    /// Register a one-shot callback for the next time the network is reachable
    fn on_became_reachable(&self, callback: ReachabilityCallback);
}

/// Reachability state backed by a watch channel
#[derive(Debug)]
pub struct NetworkReachability {
    state: watch::Sender<bool>,
}

impl NetworkReachability {
    pub fn new(initially_reachable: bool) -> Self {
        let (state, _) = watch::channel(initially_reachable);
        Self { state }
    }

    /// Record a connectivity change reported by the platform
    pub fn set_reachable(&self, reachable: bool) {
        let previous = self.state.send_replace(reachable);
        if previous != reachable {
            debug!(reachable, "Network reachability changed");
        }
    }
}

impl Default for NetworkReachability {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ReachabilityMonitor for NetworkReachability {
    fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    async fn wait_until_reachable(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as self, so this only errors on teardown
        let _ = receiver.wait_for(|reachable| *reachable).await;
    }

    fn on_became_reachable(&self, callback: ReachabilityCallback) {
        let mut receiver = self.state.subscribe();
        tokio::spawn(async move {
            if receiver.wait_for(|reachable| *reachable).await.is_ok() {
                callback();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_when_reachable() {
        let monitor = Arc::new(NetworkReachability::new(false));
        assert!(!monitor.is_reachable());

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_until_reachable().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        monitor.set_reachable(true);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_callback_fires_once() {
        let monitor = NetworkReachability::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        monitor.on_became_reachable(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.set_reachable(false);
        monitor.set_reachable(true);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
