//! Cluster-wide provider directory
//!
//! The directory is the only state shared between nodes. It maps each
//! [`ServiceKey`] to the registry entries currently providing it and lets
//! registrars follow changes as a stream of snapshots.
//!
//! [`LocalDirectory`] keeps everything in process. Several systems sharing
//! one `LocalDirectory` behave like several nodes of one cluster.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::actor::{ActorId, ActorRef};
use crate::invocation::{Request, ServiceKey};

/// Providers of one key at one point in time
pub type Listing = Vec<ActorRef<Request>>;

/// Membership service announcing providers per key
pub trait Membership: Send + Sync + 'static {
    /// Add `provider` to the listing of `key`
    fn announce(&self, key: &ServiceKey, provider: ActorRef<Request>);

    /// Remove a provider from the listing of `key` (no-op if absent)
    fn withdraw(&self, key: &ServiceKey, provider: ActorId);

    /// Follow the listing of `key`; the receiver starts at the current snapshot
    fn watch(&self, key: &ServiceKey) -> watch::Receiver<Listing>;

    /// Current live providers of `key`
    fn listing(&self, key: &ServiceKey) -> Listing;
}

/// In-process membership directory
///
/// Providers are withdrawn automatically when they terminate.
#[derive(Clone, Default)]
pub struct LocalDirectory {
    services: Arc<DashMap<ServiceKey, watch::Sender<Listing>>>,
}

impl LocalDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that have ever been announced or watched
    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self.services.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

impl Membership for LocalDirectory {
    fn announce(&self, key: &ServiceKey, provider: ActorRef<Request>) {
        let added = self
            .services
            .entry(key.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .send_if_modified(|providers| {
                if providers.contains(&provider) {
                    return false;
                }
                providers.push(provider.clone());
                true
            });

        if !added {
            return;
        }
        debug!(path = %key, provider = %provider.id(), "Provider announced");

        let directory = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            provider.terminated().await;
            directory.withdraw(&key, provider.id());
        });
    }

    fn withdraw(&self, key: &ServiceKey, provider: ActorId) {
        if let Some(sender) = self.services.get(key) {
            let removed = sender.send_if_modified(|providers| {
                let before = providers.len();
                providers.retain(|p| p.id() != provider);
                providers.len() != before
            });
            if removed {
                debug!(path = %key, %provider, "Provider withdrawn");
            }
        }
    }

    fn watch(&self, key: &ServiceKey) -> watch::Receiver<Listing> {
        self.services
            .entry(key.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe()
    }

    fn listing(&self, key: &ServiceKey) -> Listing {
        self.services
            .get(key)
            .map(|sender| {
                sender
                    .borrow()
                    .iter()
                    .filter(|p| !p.is_terminated())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{spawn, Actor, Context};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Silent;

    #[async_trait]
    impl Actor for Silent {
        type Message = Request;

        async fn handle(&mut self, _ctx: &mut Context<Request>, _req: Request) {}
    }

    #[tokio::test]
    async fn test_announce_is_idempotent() {
        let directory = LocalDirectory::new();
        let key = ServiceKey::from("svc@echo");
        let provider = spawn(Silent);

        directory.announce(&key, provider.clone());
        directory.announce(&key, provider.clone());

        assert_eq!(directory.listing(&key), vec![provider]);
        assert_eq!(directory.keys(), vec![key]);
    }

    #[tokio::test]
    async fn test_watch_sees_announce_and_withdraw() {
        let directory = LocalDirectory::new();
        let key = ServiceKey::from("svc@echo");
        let mut rx = directory.watch(&key);
        assert!(rx.borrow_and_update().is_empty());

        let provider = spawn(Silent);
        directory.announce(&key, provider.clone());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        directory.withdraw(&key, provider.id());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn test_terminated_provider_withdrawn_automatically() {
        let directory = LocalDirectory::new();
        let key = ServiceKey::from("svc@echo");
        let mut rx = directory.watch(&key);

        let provider = spawn(Silent);
        directory.announce(&key, provider.clone());
        rx.changed().await.unwrap();

        provider.stop(Duration::from_secs(1)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("withdrawal not observed")
            .unwrap();
        assert!(directory.listing(&key).is_empty());
    }

    #[test]
    fn test_listing_of_unknown_key_is_empty() {
        let directory = LocalDirectory::new();
        assert!(directory.listing(&ServiceKey::from("nobody@home")).is_empty());
        directory.withdraw(&ServiceKey::from("nobody@home"), ActorId::new());
    }
}
