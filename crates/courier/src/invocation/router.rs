//! Group router spanning every live provider of one key

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::key::ServiceKey;
use super::message::{InvocationError, Request};
use crate::actor::{Actor, ActorRef, Context};
use crate::config::RoutingPolicy;
use crate::directory::Listing;

/// Forwards each request to one live provider of its key
///
/// The provider set follows the directory listing, so providers announced
/// after the router was created are picked up automatically.
pub(crate) struct Router {
    key: ServiceKey,
    providers: watch::Receiver<Listing>,
    policy: RoutingPolicy,
    cursor: usize,
}

impl Router {
    pub(crate) fn new(key: ServiceKey, providers: watch::Receiver<Listing>, policy: RoutingPolicy) -> Self {
        Self {
            key,
            providers,
            policy,
            cursor: 0,
        }
    }

    fn live(&self) -> Vec<ActorRef<Request>> {
        self.providers
            .borrow()
            .iter()
            .filter(|p| !p.is_terminated())
            .cloned()
            .collect()
    }

    fn first_choice(&mut self, candidates: usize) -> usize {
        match self.policy {
            RoutingPolicy::RoundRobin => {
                let index = self.cursor % candidates;
                self.cursor = self.cursor.wrapping_add(1);
                index
            }
            RoutingPolicy::Random => rand::thread_rng().gen_range(0..candidates),
        }
    }
}

#[async_trait]
impl Actor for Router {
    type Message = Request;

    async fn handle(&mut self, _ctx: &mut Context<Request>, req: Request) {
        let live = self.live();
        if live.is_empty() {
            debug!(path = %self.key, "No live provider");
            req.reject(InvocationError::NotAvailable(self.key.to_string()));
            return;
        }

        // A provider may terminate between the listing and the send; fall
        // through to the next one in that case.
        let start = self.first_choice(live.len());
        let mut req = req;
        for offset in 0..live.len() {
            let provider = &live[(start + offset) % live.len()];
            match provider.try_tell(req) {
                Ok(()) => {
                    trace!(path = %self.key, provider = %provider.id(), "Routed request");
                    return;
                }
                Err(returned) => req = returned,
            }
        }

        req.reject(InvocationError::Delivery(format!(
            "every provider of {} terminated",
            self.key
        )));
    }
}
