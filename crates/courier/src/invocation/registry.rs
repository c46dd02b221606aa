//! Public face of the registrar

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument};

use super::key::ServiceKey;
use super::message::{
    procedure, InvocationError, InvocationResult, Registration, RegistrarEvent, Request,
    RoutesQuery,
};
use super::registrar::{Registrar, RegistryListener};
use crate::actor::{spawn, ActorRef, ReplyTo};
use crate::config::RoutingPolicy;
use crate::directory::Membership;
use crate::talk::{Talk, TalkError, DEFAULT_ASK_TIMEOUT};
use crate::task::{self, TaskResult};
use crate::worker::WorkerPool;

/// Builder for a [`Registry`]
pub struct RegistryBuilder {
    pool: WorkerPool,
    directory: Arc<dyn Membership>,
    routing: RoutingPolicy,
    listener: Option<Arc<dyn RegistryListener>>,
    ask_timeout: Duration,
}

impl RegistryBuilder {
    /// Set the provider selection policy
    pub fn routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Notify `listener` of provider arrivals and departures
    pub fn listener(mut self, listener: Arc<dyn RegistryListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Timeout for registrar round-trips
    pub fn ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout = timeout;
        self
    }

    /// Spawn the registrar on the current runtime
    pub fn spawn(self) -> Registry {
        let registrar = spawn(Registrar::new(
            self.pool,
            self.directory,
            self.routing,
            self.listener,
        ));
        Registry {
            registrar,
            ask_timeout: self.ask_timeout,
        }
    }
}

/// Handle for registering and invoking remote procedures
///
/// # Example
///
/// ```ignore
/// let registry = Registry::builder(pool, Arc::new(directory)).spawn();
///
/// registry
///     .register("svc@compute", |_me, args| async move {
///         let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
///         Ok(json!(sum))
///     })
///     .await?;
///
/// let five = registry
///     .invoke("svc@compute", vec![json!(2), json!(3)], Duration::from_secs(1))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Registry {
    registrar: ActorRef<RegistrarEvent>,
    ask_timeout: Duration,
}

impl Registry {
    /// Start building a registry backed by `pool` and `directory`
    pub fn builder(pool: WorkerPool, directory: Arc<dyn Membership>) -> RegistryBuilder {
        RegistryBuilder {
            pool,
            directory,
            routing: RoutingPolicy::default(),
            listener: None,
            ask_timeout: DEFAULT_ASK_TIMEOUT,
        }
    }

    /// Get the registrar actor
    pub fn actor_ref(&self) -> &ActorRef<RegistrarEvent> {
        &self.registrar
    }

    /// Default timeout for [`Registry::call`]
    pub fn ask_timeout(&self) -> Duration {
        self.ask_timeout
    }

    /// Register an async procedure under `path`
    ///
    /// Resolves with the registry entry once it is listed in the directory.
    #[instrument(skip_all, fields(path = %path.as_ref()))]
    pub async fn register<F, Fut>(
        &self,
        path: impl AsRef<str>,
        handler: F,
    ) -> Result<ActorRef<Request>, InvocationError>
    where
        F: Fn(ActorRef<Request>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<Value>> + Send + 'static,
    {
        let key = ServiceKey::new(path.as_ref());
        let procedure = procedure(handler);
        let entry = Talk::new(self.registrar.clone())
            .timeout(self.ask_timeout)
            .ask(|reply_to| {
                RegistrarEvent::Registration(Registration {
                    key,
                    procedure,
                    reply_to: Some(reply_to),
                })
            })
            .await?;
        Ok(entry)
    }

    /// Register blocking code under `path`
    ///
    /// Each call runs on tokio's blocking thread pool.
    pub async fn register_blocking<F>(
        &self,
        path: impl AsRef<str>,
        handler: F,
    ) -> Result<ActorRef<Request>, InvocationError>
    where
        F: Fn(Vec<Value>) -> TaskResult<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(path, move |_me, arguments| {
            let handler = Arc::clone(&handler);
            task::blocking(move || handler(arguments))
        })
        .await
    }

    /// Invoke the procedure at `path`
    ///
    /// Fails immediately with [`InvocationError::NotAvailable`] when no
    /// provider is known, and with [`InvocationError::Timeout`] when no
    /// result arrives within `timeout`. Giving up does not cancel the
    /// procedure.
    #[instrument(skip_all, fields(path = %path.as_ref(), args = arguments.len()))]
    pub async fn invoke(
        &self,
        path: impl AsRef<str>,
        arguments: Vec<Value>,
        timeout: Duration,
    ) -> InvocationResult {
        let (reply_to, rx) = ReplyTo::channel();
        self.registrar.send(RegistrarEvent::Request(Request {
            key: ServiceKey::new(path.as_ref()),
            arguments,
            timeout,
            reply_to,
        }))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TalkError::NoReply.into()),
            Err(_) => Err(InvocationError::Timeout(timeout)),
        }
    }

    /// Invoke with the registry's default timeout
    pub async fn call(&self, path: impl AsRef<str>, arguments: Vec<Value>) -> InvocationResult {
        self.invoke(path, arguments, self.ask_timeout).await
    }

    /// Live providers of `path` known to this node
    pub async fn routes(&self, path: impl AsRef<str>) -> Result<Vec<ActorRef<Request>>, InvocationError> {
        let key = ServiceKey::new(path.as_ref());
        let providers = Talk::new(self.registrar.clone())
            .timeout(self.ask_timeout)
            .ask(|reply_to| RegistrarEvent::Routes(RoutesQuery { key, reply_to }))
            .await?;
        Ok(providers)
    }

    /// Stop the registrar, its routers and its registry entries
    #[instrument(skip(self))]
    pub async fn shutdown(&self, grace: Duration) -> Result<(), TalkError> {
        info!(registrar = %self.registrar.id(), "Shutting down registry");
        self.registrar.stop(grace).await
    }
}
