//! Node-local registrar routing invocations to providers

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace};

use super::entry::RegistryEntry;
use super::key::ServiceKey;
use super::message::{InvocationError, Registration, RegistrarEvent, Request, RoutesQuery};
use super::router::Router;
use crate::actor::{spawn, Actor, ActorId, ActorRef, Context};
use crate::config::RoutingPolicy;
use crate::directory::{Listing, Membership};
use crate::worker::WorkerPool;

/// Hooks notified as providers come and go
///
/// Called from the registrar's own task; implementations must not block.
pub trait RegistryListener: Send + Sync + 'static {
    /// A provider of `key` appeared in the directory
    fn on_announcement(&self, _key: &ServiceKey, _provider: ActorId) {}

    /// A provider of `key` terminated or was withdrawn
    fn on_terminated(&self, _key: &ServiceKey, _provider: ActorId) {}
}

/// Registrar state
///
/// `actors` and `actor_keys` mirror each other: a provider is in
/// `actors[key]` iff `actor_keys[provider] == key`.
pub(crate) struct Registrar {
    pool: WorkerPool,
    directory: Arc<dyn Membership>,
    routing: RoutingPolicy,
    listener: Option<Arc<dyn RegistryListener>>,
    routes: HashMap<ServiceKey, ActorRef<Request>>,
    actors: HashMap<ServiceKey, HashSet<ActorRef<Request>>>,
    actor_keys: HashMap<ActorId, ServiceKey>,
    entries: HashMap<ActorId, ActorRef<Request>>,
}

impl Registrar {
    pub(crate) fn new(
        pool: WorkerPool,
        directory: Arc<dyn Membership>,
        routing: RoutingPolicy,
        listener: Option<Arc<dyn RegistryListener>>,
    ) -> Self {
        Self {
            pool,
            directory,
            routing,
            listener,
            routes: HashMap::new(),
            actors: HashMap::new(),
            actor_keys: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    fn on_registration(&mut self, ctx: &mut Context<RegistrarEvent>, registration: Registration) {
        let Registration {
            key,
            procedure,
            reply_to,
        } = registration;

        self.ensure_route(ctx, &key);
        let entry = spawn(RegistryEntry::new(
            key.clone(),
            procedure,
            self.pool.clone(),
            Arc::clone(&self.directory),
            reply_to,
        ));
        debug!(path = %key, entry = %entry.id(), "Spawned registry entry");
        self.entries.insert(entry.id(), entry);
    }

    fn on_request(&mut self, ctx: &mut Context<RegistrarEvent>, req: Request) {
        if !self.routes.contains_key(&req.key) && !self.directory.listing(&req.key).is_empty() {
            // Provided elsewhere in the cluster; route to it from here too
            self.ensure_route(ctx, &req.key);
        }

        match self.routes.get(&req.key) {
            Some(router) => {
                trace!(path = %req.key, "Forwarding request to router");
                router.tell(req);
            }
            None => {
                debug!(path = %req.key, "Request for unregistered service");
                let path = req.key.to_string();
                req.reject(InvocationError::NotAvailable(path));
            }
        }
    }

    fn on_routes(&mut self, ctx: &mut Context<RegistrarEvent>, query: RoutesQuery) {
        if !self.routes.contains_key(&query.key) {
            let listing = self.directory.listing(&query.key);
            if !listing.is_empty() {
                // Start following the key and index its current providers now,
                // so this answer already reflects the directory
                self.ensure_route(ctx, &query.key);
                self.on_listing(ctx, query.key.clone(), listing);
            }
        }

        let mut providers: Vec<_> = self
            .actors
            .get(&query.key)
            .map(|set| set.iter().filter(|p| !p.is_terminated()).cloned().collect())
            .unwrap_or_default();
        providers.sort_by_key(|p| p.id());
        query.reply_to.send(providers);
    }

    fn on_listing(&mut self, ctx: &mut Context<RegistrarEvent>, key: ServiceKey, listing: Listing) {
        let known = self.actors.entry(key.clone()).or_default();

        let withdrawn: Vec<ActorId> = known
            .iter()
            .filter(|p| !listing.contains(p))
            .map(|p| p.id())
            .collect();

        let mut announced = Vec::new();
        for provider in listing {
            if provider.is_terminated() || known.contains(&provider) {
                continue;
            }
            ctx.watch(&provider, RegistrarEvent::Terminated(provider.id()));
            self.actor_keys.insert(provider.id(), key.clone());
            announced.push(provider.id());
            known.insert(provider);
        }

        for id in announced {
            debug!(path = %key, provider = %id, "Provider joined");
            if let Some(listener) = &self.listener {
                listener.on_announcement(&key, id);
            }
        }
        for id in withdrawn {
            self.remove_provider(id);
        }
    }

    fn remove_provider(&mut self, id: ActorId) {
        self.entries.remove(&id);

        let Some(key) = self.actor_keys.remove(&id) else {
            return;
        };
        if let Some(set) = self.actors.get_mut(&key) {
            set.retain(|p| p.id() != id);
        }
        debug!(path = %key, provider = %id, "Provider left");
        if let Some(listener) = &self.listener {
            listener.on_terminated(&key, id);
        }
    }

    /// Create the router and directory listener for `key` once
    fn ensure_route(&mut self, ctx: &mut Context<RegistrarEvent>, key: &ServiceKey) {
        if self.routes.contains_key(key) {
            return;
        }

        let router = spawn(Router::new(
            key.clone(),
            self.directory.watch(key),
            self.routing,
        ));
        self.routes.insert(key.clone(), router);
        self.listen(ctx, key.clone());
        info!(path = %key, routing = %self.routing, "Created route");
    }

    /// Forward directory snapshots for `key` into this registrar's mailbox
    fn listen(&self, ctx: &mut Context<RegistrarEvent>, key: ServiceKey) {
        let mut listing = self.directory.watch(&key);
        let registrar = ctx.myself().clone();

        tokio::spawn(async move {
            loop {
                let providers = listing.borrow_and_update().clone();
                let event = RegistrarEvent::Listing {
                    key: key.clone(),
                    providers,
                };
                if registrar.try_tell(event).is_err() {
                    break;
                }

                tokio::select! {
                    changed = listing.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = registrar.terminated() => break,
                }
            }
        });
    }
}

#[async_trait]
impl Actor for Registrar {
    type Message = RegistrarEvent;

    async fn handle(&mut self, ctx: &mut Context<RegistrarEvent>, event: RegistrarEvent) {
        match event {
            RegistrarEvent::Registration(registration) => self.on_registration(ctx, registration),
            RegistrarEvent::Request(req) => self.on_request(ctx, req),
            RegistrarEvent::Routes(query) => self.on_routes(ctx, query),
            RegistrarEvent::Listing { key, providers } => self.on_listing(ctx, key, providers),
            RegistrarEvent::Terminated(id) => self.remove_provider(id),
        }
    }

    async fn stopped(&mut self, _ctx: &mut Context<RegistrarEvent>) {
        for router in self.routes.values() {
            router.stop_now();
        }
        for entry in self.entries.values() {
            entry.stop_now();
        }
        info!(
            routes = self.routes.len(),
            entries = self.entries.len(),
            "Registrar stopped"
        );
    }
}
