//! Per-node guardian owning the pool, registry and messenger

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::actor::ActorRef;
use crate::config::CourierConfig;
use crate::directory::{LocalDirectory, Membership};
use crate::invocation::{Registry, RegistryListener};
use crate::messaging::{Messenger, PubSub};
use crate::talk::{Talk, TalkError};
use crate::task::{TaskError, TaskResult};
use crate::worker::{WorkerPool, WorkerPoolError};

/// Builder for a [`System`]
pub struct SystemBuilder {
    config: CourierConfig,
    directory: Option<Arc<dyn Membership>>,
    pubsub: Option<PubSub>,
    listener: Option<Arc<dyn RegistryListener>>,
}

impl SystemBuilder {
    /// Join the cluster represented by `directory`
    pub fn directory(mut self, directory: Arc<dyn Membership>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Share topics and destinations through `pubsub`
    pub fn pubsub(mut self, pubsub: PubSub) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    /// Notify `listener` of provider arrivals and departures
    pub fn listener(mut self, listener: Arc<dyn RegistryListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Start the node's actors on the current runtime
    pub fn start(self) -> Result<System, WorkerPoolError> {
        let config = self.config;
        let directory: Arc<dyn Membership> = self
            .directory
            .unwrap_or_else(|| Arc::new(LocalDirectory::new()));
        let pool = WorkerPool::spawn(config.pool.clone())?;

        let mut registry = Registry::builder(pool.clone(), Arc::clone(&directory))
            .routing(config.routing)
            .ask_timeout(config.ask_timeout);
        if let Some(listener) = self.listener {
            registry = registry.listener(listener);
        }
        let registry = registry.spawn();

        let messenger =
            Messenger::spawn(self.pubsub.unwrap_or_default()).with_timeout(config.ask_timeout);

        info!(
            node = %config.node_name,
            max_workers = config.pool.max_capacity,
            routing = %config.routing,
            "Courier system started"
        );

        Ok(System {
            config,
            directory,
            pool,
            registry,
            messenger,
        })
    }
}

/// One courier node
///
/// # Example
///
/// ```ignore
/// let directory = Arc::new(LocalDirectory::new());
/// let node_a = System::builder(CourierConfig::new()).directory(directory.clone()).start()?;
/// let node_b = System::builder(CourierConfig::new()).directory(directory).start()?;
///
/// node_a.registry().register("svc@compute", compute).await?;
/// let five = node_b.registry().call("svc@compute", vec![json!(2), json!(3)]).await?;
/// ```
pub struct System {
    config: CourierConfig,
    directory: Arc<dyn Membership>,
    pool: WorkerPool,
    registry: Registry,
    messenger: Messenger,
}

impl System {
    /// Start building a node from `config`
    pub fn builder(config: CourierConfig) -> SystemBuilder {
        SystemBuilder {
            config,
            directory: None,
            pubsub: None,
            listener: None,
        }
    }

    /// Start a standalone node with its own directory
    pub fn start(config: CourierConfig) -> Result<Self, WorkerPoolError> {
        Self::builder(config).start()
    }

    /// Get the node configuration
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Get the node name
    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Get the shared worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Get the registry handle
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the messenger handle
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Get the membership directory this node announces into
    pub fn directory(&self) -> &Arc<dyn Membership> {
        &self.directory
    }

    /// Talk to `recipient` with this node's timeouts
    pub fn talk<M: Send + 'static>(&self, recipient: ActorRef<M>) -> Talk<M> {
        Talk::new(recipient)
            .timeout(self.config.ask_timeout)
            .stop_grace(self.config.stop_grace_period)
    }

    /// Run an action on the pool, giving up after `timeout`
    ///
    /// The action keeps running if the timeout fires first.
    pub async fn run_async<F>(&self, action: F, timeout: Duration) -> TaskResult<()>
    where
        F: Future<Output = TaskResult<()>> + Send + 'static,
    {
        tokio::time::timeout(timeout, self.pool.run(action))
            .await
            .unwrap_or(Err(TaskError::Timeout(timeout)))
    }

    /// Run a computation on the pool, giving up after `timeout`
    pub async fn call_async<F>(&self, computation: F, timeout: Duration) -> TaskResult<Value>
    where
        F: Future<Output = TaskResult<Value>> + Send + 'static,
    {
        tokio::time::timeout(timeout, self.pool.call(computation))
            .await
            .unwrap_or(Err(TaskError::Timeout(timeout)))
    }

    /// Stop the registry, the messenger and the pool, in that order
    #[instrument(skip(self), fields(node = %self.config.node_name))]
    pub async fn shutdown(&self) -> Result<(), TalkError> {
        let grace = self.config.stop_grace_period;
        let mut first_error = None;

        if let Err(e) = self.registry.shutdown(grace).await {
            warn!(error = %e, "Registry did not stop in time");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.messenger.shutdown(grace).await {
            warn!(error = %e, "Messenger did not stop in time");
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.pool.shutdown(grace).await {
            warn!(error = %e, "Worker pool did not stop in time");
            if let WorkerPoolError::Talk(e) = e {
                first_error.get_or_insert(e);
            }
        }

        info!("Courier system stopped");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerPoolConfig;
    use serde_json::json;

    fn config() -> CourierConfig {
        CourierConfig::new()
            .with_node_name("test-node")
            .with_pool(WorkerPoolConfig::new().with_max_capacity(2))
            .with_stop_grace_period(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_call_async_returns_value() {
        let system = System::start(config()).unwrap();
        let value = system
            .call_async(async { Ok(json!("ok")) }, Duration::from_secs(1))
            .await;
        assert_eq!(value, Ok(json!("ok")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_async_times_out() {
        let system = System::start(config()).unwrap();
        let result = system
            .run_async(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                },
                Duration::from_millis(200),
            )
            .await;
        assert_eq!(result, Err(TaskError::Timeout(Duration::from_millis(200))));
    }

    #[tokio::test]
    async fn test_invalid_pool_config_rejected() {
        let config = config().with_pool(WorkerPoolConfig::new().with_max_capacity(0));
        assert!(matches!(
            System::start(config),
            Err(WorkerPoolError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let system = System::start(config()).unwrap();
        system.shutdown().await.unwrap();

        assert!(system.pool().actor_ref().is_terminated());
        assert!(system.registry().actor_ref().is_terminated());
        assert!(system.messenger().actor_ref().is_terminated());
    }

    #[tokio::test]
    async fn test_talk_reaches_pool() {
        let system = System::start(config().with_ask_timeout(Duration::from_millis(250))).unwrap();
        let stats = system
            .talk(system.pool().actor_ref().clone())
            .ask(crate::worker::PoolEvent::Stats)
            .await
            .unwrap();
        assert_eq!(stats.total, 0);
    }
}
