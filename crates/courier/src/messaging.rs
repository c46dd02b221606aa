//! Topic pub/sub and named point-to-point destinations
//!
//! [`PubSub`] is the cluster-wide mediator shared by every node; each node
//! talks to it through its own [`Messenger`]. Subscribers are wrapped in a
//! small mailbox actor so a slow subscriber never stalls the publisher and
//! notices reach each subscriber in publish order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::actor::{spawn, Actor, ActorId, ActorRef, Context, ReplyTo};
use crate::talk::{Talk, TalkError, DEFAULT_ASK_TIMEOUT};

/// Messaging errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// A destination with this name already exists in the cluster
    #[error("destination already exists: {0}")]
    DestinationExists(String),

    /// No destination with this name is owned here (or anywhere, for sends)
    #[error("no such destination: {0}")]
    NoDestination(String),

    /// The messenger could not be reached
    #[error("messenger unreachable: {0}")]
    Talk(#[from] TalkError),
}

/// Payload delivered to subscribers and destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Topic or destination name
    pub topic: String,
    pub payload: Value,
}

/// Receiver of notices
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn receive(&self, notice: Notice);
}

struct Mailbox {
    subscriber: Arc<dyn Subscriber>,
}

#[async_trait]
impl Actor for Mailbox {
    type Message = Notice;

    async fn handle(&mut self, _ctx: &mut Context<Notice>, notice: Notice) {
        self.subscriber.receive(notice).await;
    }
}

#[derive(Default)]
struct Mediator {
    topics: RwLock<HashMap<String, Vec<ActorRef<Notice>>>>,
    destinations: RwLock<HashMap<String, ActorRef<Notice>>>,
}

/// Cluster-wide topic and destination tables
#[derive(Clone, Default)]
pub struct PubSub {
    inner: Arc<Mediator>,
}

impl PubSub {
    /// Create empty topic and destination tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mailboxes subscribed to `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Check whether a destination named `name` exists
    pub fn has_destination(&self, name: &str) -> bool {
        self.inner.destinations.read().contains_key(name)
    }

    fn subscribe(&self, topic: &str, mailbox: ActorRef<Notice>) {
        self.inner
            .topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(mailbox);
    }

    fn unsubscribe(&self, topic: &str, mailbox: ActorId) {
        let mut topics = self.inner.topics.write();
        if let Some(mailboxes) = topics.get_mut(topic) {
            mailboxes.retain(|m| m.id() != mailbox);
            if mailboxes.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn publish(&self, topic: &str, payload: Value) -> usize {
        let topics = self.inner.topics.read();
        let Some(mailboxes) = topics.get(topic) else {
            return 0;
        };
        for mailbox in mailboxes {
            mailbox.tell(Notice {
                topic: topic.to_string(),
                payload: payload.clone(),
            });
        }
        mailboxes.len()
    }

    fn insert_destination(&self, name: &str, mailbox: ActorRef<Notice>) -> bool {
        let mut destinations = self.inner.destinations.write();
        if destinations.contains_key(name) {
            return false;
        }
        destinations.insert(name.to_string(), mailbox);
        true
    }

    fn remove_destination(&self, name: &str, mailbox: ActorId) {
        let mut destinations = self.inner.destinations.write();
        if destinations.get(name).is_some_and(|m| m.id() == mailbox) {
            destinations.remove(name);
        }
    }

    fn send(&self, name: &str, payload: Value) -> Result<(), MessagingError> {
        let destinations = self.inner.destinations.read();
        let mailbox = destinations
            .get(name)
            .ok_or_else(|| MessagingError::NoDestination(name.to_string()))?;
        mailbox
            .try_tell(Notice {
                topic: name.to_string(),
                payload,
            })
            .map_err(|_| MessagingError::NoDestination(name.to_string()))
    }
}

/// Commands processed by a messenger actor
pub enum MessengerCommand {
    Subscribe {
        topic: String,
        subscriber: Arc<dyn Subscriber>,
        reply_to: ReplyTo<()>,
    },
    Unsubscribe {
        topic: String,
        subscriber: Arc<dyn Subscriber>,
        reply_to: ReplyTo<bool>,
    },
    Publish {
        topic: String,
        payload: Value,
    },
    NewDestination {
        name: String,
        subscriber: Arc<dyn Subscriber>,
        reply_to: ReplyTo<Result<(), MessagingError>>,
    },
    RemoveDestination {
        name: String,
        reply_to: ReplyTo<Result<(), MessagingError>>,
    },
    Send {
        name: String,
        payload: Value,
        reply_to: ReplyTo<Result<(), MessagingError>>,
    },
}

struct Subscription {
    topic: String,
    subscriber: Arc<dyn Subscriber>,
    mailbox: ActorRef<Notice>,
}

/// Node-local owner of subscriptions and destinations
struct MessengerActor {
    pubsub: PubSub,
    subscriptions: Vec<Subscription>,
    destinations: HashMap<String, ActorRef<Notice>>,
}

impl MessengerActor {
    fn unsubscribe(&mut self, topic: &str, subscriber: &Arc<dyn Subscriber>) -> bool {
        let Some(index) = self
            .subscriptions
            .iter()
            .position(|s| s.topic == topic && Arc::ptr_eq(&s.subscriber, subscriber))
        else {
            return false;
        };

        let subscription = self.subscriptions.swap_remove(index);
        self.pubsub.unsubscribe(topic, subscription.mailbox.id());
        subscription.mailbox.stop_now();
        debug!(topic, "Unsubscribed");
        true
    }

    fn new_destination(&mut self, name: String, subscriber: Arc<dyn Subscriber>) -> Result<(), MessagingError> {
        if self.pubsub.has_destination(&name) {
            return Err(MessagingError::DestinationExists(name));
        }

        let mailbox = spawn(Mailbox { subscriber });
        if !self.pubsub.insert_destination(&name, mailbox.clone()) {
            mailbox.stop_now();
            return Err(MessagingError::DestinationExists(name));
        }
        info!(destination = %name, "Destination created");
        self.destinations.insert(name, mailbox);
        Ok(())
    }

    fn remove_destination(&mut self, name: String) -> Result<(), MessagingError> {
        let mailbox = self
            .destinations
            .remove(&name)
            .ok_or_else(|| MessagingError::NoDestination(name.clone()))?;
        self.pubsub.remove_destination(&name, mailbox.id());
        mailbox.stop_now();
        info!(destination = %name, "Destination removed");
        Ok(())
    }
}

#[async_trait]
impl Actor for MessengerActor {
    type Message = MessengerCommand;

    async fn handle(&mut self, _ctx: &mut Context<MessengerCommand>, command: MessengerCommand) {
        match command {
            MessengerCommand::Subscribe {
                topic,
                subscriber,
                reply_to,
            } => {
                let mailbox = spawn(Mailbox {
                    subscriber: Arc::clone(&subscriber),
                });
                self.pubsub.subscribe(&topic, mailbox.clone());
                debug!(topic = %topic, mailbox = %mailbox.id(), "Subscribed");
                self.subscriptions.push(Subscription {
                    topic,
                    subscriber,
                    mailbox,
                });
                reply_to.send(());
            }
            MessengerCommand::Unsubscribe {
                topic,
                subscriber,
                reply_to,
            } => reply_to.send(self.unsubscribe(&topic, &subscriber)),
            MessengerCommand::Publish { topic, payload } => {
                let delivered = self.pubsub.publish(&topic, payload);
                trace!(topic = %topic, delivered, "Published");
            }
            MessengerCommand::NewDestination {
                name,
                subscriber,
                reply_to,
            } => reply_to.send(self.new_destination(name, subscriber)),
            MessengerCommand::RemoveDestination { name, reply_to } => {
                reply_to.send(self.remove_destination(name))
            }
            MessengerCommand::Send {
                name,
                payload,
                reply_to,
            } => reply_to.send(self.pubsub.send(&name, payload)),
        }
    }

    async fn stopped(&mut self, _ctx: &mut Context<MessengerCommand>) {
        for subscription in self.subscriptions.drain(..) {
            self.pubsub
                .unsubscribe(&subscription.topic, subscription.mailbox.id());
            subscription.mailbox.stop_now();
        }
        for (name, mailbox) in self.destinations.drain() {
            self.pubsub.remove_destination(&name, mailbox.id());
            mailbox.stop_now();
        }
        debug!("Messenger stopped");
    }
}

/// Handle to a node's messenger
///
/// # Example
///
/// ```ignore
/// let messenger = Messenger::spawn(pubsub.clone());
/// messenger.subscribe("orders", Arc::new(AuditLog::default())).await?;
/// messenger.publish("orders", json!({"id": 17}));
/// ```
#[derive(Clone)]
pub struct Messenger {
    actor: ActorRef<MessengerCommand>,
    timeout: Duration,
}

impl Messenger {
    /// Spawn a messenger attached to `pubsub`
    pub fn spawn(pubsub: PubSub) -> Self {
        let actor = spawn(MessengerActor {
            pubsub,
            subscriptions: Vec::new(),
            destinations: HashMap::new(),
        });
        Self {
            actor,
            timeout: DEFAULT_ASK_TIMEOUT,
        }
    }

    /// Set the timeout for round-trips to the messenger actor
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the messenger actor
    pub fn actor_ref(&self) -> &ActorRef<MessengerCommand> {
        &self.actor
    }

    fn talk(&self) -> Talk<MessengerCommand> {
        Talk::new(self.actor.clone()).timeout(self.timeout)
    }

    /// Subscribe to `topic`; resolves once the subscription is active
    pub async fn subscribe(&self, topic: impl Into<String>, subscriber: Arc<dyn Subscriber>) -> Result<(), MessagingError> {
        let topic = topic.into();
        self.talk()
            .ask(|reply_to| MessengerCommand::Subscribe {
                topic,
                subscriber,
                reply_to,
            })
            .await?;
        Ok(())
    }

    /// Remove a subscription made through this messenger
    ///
    /// Returns whether `subscriber` was subscribed to `topic`.
    pub async fn unsubscribe(&self, topic: impl Into<String>, subscriber: &Arc<dyn Subscriber>) -> Result<bool, MessagingError> {
        let topic = topic.into();
        let subscriber = Arc::clone(subscriber);
        Ok(self
            .talk()
            .ask(|reply_to| MessengerCommand::Unsubscribe {
                topic,
                subscriber,
                reply_to,
            })
            .await?)
    }

    /// Publish to every subscriber of `topic` in the cluster
    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        self.actor.tell(MessengerCommand::Publish {
            topic: topic.into(),
            payload,
        });
    }

    /// Create a cluster-unique named destination served by `subscriber`
    pub async fn new_destination(&self, name: impl Into<String>, subscriber: Arc<dyn Subscriber>) -> Result<(), MessagingError> {
        let name = name.into();
        self.talk()
            .ask(|reply_to| MessengerCommand::NewDestination {
                name,
                subscriber,
                reply_to,
            })
            .await?
    }

    /// Remove a destination created through this messenger
    pub async fn remove_destination(&self, name: impl Into<String>) -> Result<(), MessagingError> {
        let name = name.into();
        self.talk()
            .ask(|reply_to| MessengerCommand::RemoveDestination { name, reply_to })
            .await?
    }

    /// Send a payload to the named destination, wherever it lives
    pub async fn send(&self, name: impl Into<String>, payload: Value) -> Result<(), MessagingError> {
        let name = name.into();
        self.talk()
            .ask(|reply_to| MessengerCommand::Send {
                name,
                payload,
                reply_to,
            })
            .await?
    }

    /// Stop the messenger, dropping its subscriptions and destinations
    pub async fn shutdown(&self, grace: Duration) -> Result<(), TalkError> {
        self.actor.stop(grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Notice>);

    #[async_trait]
    impl Subscriber for Forward {
        async fn receive(&self, notice: Notice) {
            let _ = self.0.send(notice);
        }
    }

    fn forward() -> (Arc<dyn Subscriber>, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Forward(tx)), rx)
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers_on_every_node() {
        let pubsub = PubSub::new();
        let node_a = Messenger::spawn(pubsub.clone());
        let node_b = Messenger::spawn(pubsub.clone());

        let (sub_a, mut rx_a) = forward();
        let (sub_b, mut rx_b) = forward();
        node_a.subscribe("orders", sub_a).await.unwrap();
        node_b.subscribe("orders", sub_b).await.unwrap();
        assert_eq!(pubsub.subscriber_count("orders"), 2);

        node_a.publish("orders", json!({"id": 1}));
        node_a.publish("orders", json!({"id": 2}));

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await.unwrap().payload, json!({"id": 1}));
            assert_eq!(rx.recv().await.unwrap().payload, json!({"id": 2}));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_uses_subscriber_identity() {
        let pubsub = PubSub::new();
        let messenger = Messenger::spawn(pubsub.clone());
        let (subscriber, _rx) = forward();
        let (stranger, _rx2) = forward();

        messenger.subscribe("orders", Arc::clone(&subscriber)).await.unwrap();
        assert!(!messenger.unsubscribe("orders", &stranger).await.unwrap());
        assert!(messenger.unsubscribe("orders", &subscriber).await.unwrap());
        assert_eq!(pubsub.subscriber_count("orders"), 0);
    }

    #[tokio::test]
    async fn test_destination_names_are_cluster_unique() {
        let pubsub = PubSub::new();
        let node_a = Messenger::spawn(pubsub.clone());
        let node_b = Messenger::spawn(pubsub.clone());
        let (inbox, mut rx) = forward();
        let (other, _rx) = forward();

        node_a.new_destination("billing", inbox).await.unwrap();
        assert_eq!(
            node_b.new_destination("billing", other).await,
            Err(MessagingError::DestinationExists("billing".into()))
        );

        node_b.send("billing", json!("invoice-7")).await.unwrap();
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.topic, "billing");
        assert_eq!(notice.payload, json!("invoice-7"));
    }

    #[tokio::test]
    async fn test_remove_destination_frees_the_name() {
        let pubsub = PubSub::new();
        let node_a = Messenger::spawn(pubsub.clone());
        let node_b = Messenger::spawn(pubsub.clone());
        let (inbox, _rx) = forward();

        node_a.new_destination("billing", Arc::clone(&inbox)).await.unwrap();
        assert_eq!(
            node_b.remove_destination("billing").await,
            Err(MessagingError::NoDestination("billing".into()))
        );

        node_a.remove_destination("billing").await.unwrap();
        assert!(!pubsub.has_destination("billing"));
        assert_eq!(
            node_b.send("billing", json!(null)).await,
            Err(MessagingError::NoDestination("billing".into()))
        );
        node_b.new_destination("billing", inbox).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_releases_registrations() {
        let pubsub = PubSub::new();
        let messenger = Messenger::spawn(pubsub.clone());
        let (subscriber, _rx) = forward();

        messenger.subscribe("orders", Arc::clone(&subscriber)).await.unwrap();
        messenger.new_destination("billing", subscriber).await.unwrap();
        messenger.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(pubsub.subscriber_count("orders"), 0);
        assert!(!pubsub.has_destination("billing"));
        assert!(matches!(
            messenger.send("billing", json!(1)).await,
            Err(MessagingError::Talk(_))
        ));
    }
}
