//! Elastic worker pool
//!
//! Load-balances tasks over idle workers, grows up to `max_capacity`,
//! queues the excess in FIFO order and recycles long-idle workers.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace};

use super::worker::Worker;
use crate::actor::{spawn, Actor, ActorId, ActorRef, Context, ReplyTo};
use crate::config::{duration_millis, env_or};
use crate::talk::{Talk, TalkError};
use crate::task::{CallableTask, RunnableTask, Task, TaskError, TaskResult};

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Workers spawned when the pool starts
    pub initial_capacity: usize,

    /// Upper bound on live workers
    pub max_capacity: usize,

    /// How long a worker may stay idle before it is recycled (zero disables)
    #[serde(with = "duration_millis")]
    pub idle_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_capacity: 16,
            idle_timeout: Duration::ZERO,
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `COURIER_POOL_INITIAL_CAPACITY`: Workers spawned at start (default: 0)
    /// - `COURIER_POOL_MAX_CAPACITY`: Maximum live workers (default: 16)
    /// - `COURIER_POOL_IDLE_TIMEOUT_MS`: Idle recycling threshold, 0 disables (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            initial_capacity: env_or("COURIER_POOL_INITIAL_CAPACITY", defaults.initial_capacity),
            max_capacity: env_or("COURIER_POOL_MAX_CAPACITY", defaults.max_capacity),
            idle_timeout: Duration::from_millis(env_or(
                "COURIER_POOL_IDLE_TIMEOUT_MS",
                defaults.idle_timeout.as_millis() as u64,
            )),
        }
    }

    /// Set the initial capacity
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the maximum capacity
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), WorkerPoolError> {
        if self.max_capacity == 0 {
            return Err(WorkerPoolError::InvalidConfig(
                "max_capacity must be at least 1".into(),
            ));
        }
        if self.initial_capacity > self.max_capacity {
            return Err(WorkerPoolError::InvalidConfig(
                "initial_capacity cannot exceed max_capacity".into(),
            ));
        }
        Ok(())
    }
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Invalid configuration
    #[error("invalid worker pool configuration: {0}")]
    InvalidConfig(String),

    /// Pool could not be reached
    #[error("worker pool unreachable: {0}")]
    Talk(#[from] TalkError),
}

/// Point-in-time view of the pool's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live workers
    pub total: usize,
    /// Workers holding no task
    pub idle: usize,
    /// Workers executing a task
    pub busy: usize,
    /// Tasks queued for a free worker
    pub waiting: usize,
    /// Whether an idle cleanup pass is pending
    pub cleanup_scheduled: bool,
}

/// Events processed by the pool actor
pub enum PoolEvent {
    /// New work
    Submit(Task),
    /// A worker finished its task
    Idle(ActorRef<Task>),
    /// A watched worker terminated
    Terminated(ActorId),
    /// Idle cleanup timer fired
    Cleanup,
    /// Statistics query
    Stats(ReplyTo<PoolStats>),
}

struct IdleWorker {
    worker: ActorRef<Task>,
    since: Instant,
}

/// Pool state; mutated only from the pool actor's own task
struct PoolActor {
    config: WorkerPoolConfig,
    workers: HashMap<ActorId, ActorRef<Task>>,
    idle: VecDeque<IdleWorker>,
    waiting: VecDeque<Task>,
    cleanup_scheduled: bool,
}

impl PoolActor {
    fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            waiting: VecDeque::new(),
            cleanup_scheduled: false,
        }
    }

    fn submit(&mut self, ctx: &mut Context<PoolEvent>, task: Task) {
        if let Some(idle) = self.idle.pop_front() {
            trace!(worker = %idle.worker.id(), kind = task.kind(), "Dispatching to idle worker");
            idle.worker.tell(task);
        } else if self.workers.len() < self.config.max_capacity {
            // The new worker picks this up as soon as it reports idle
            self.waiting.push_back(task);
            self.new_worker(ctx);
        } else {
            self.waiting.push_back(task);
            debug!(waiting = self.waiting.len(), "Pool at capacity, task queued");
        }
    }

    fn new_worker(&mut self, ctx: &mut Context<PoolEvent>) {
        let worker = spawn(Worker::new(ctx.myself().clone()));
        ctx.watch(&worker, PoolEvent::Terminated(worker.id()));
        self.workers.insert(worker.id(), worker.clone());
        debug!(worker = %worker.id(), total = self.workers.len(), "Spawned worker");
        self.on_worker_idle(ctx, worker);
    }

    fn on_worker_idle(&mut self, ctx: &mut Context<PoolEvent>, worker: ActorRef<Task>) {
        if !self.workers.contains_key(&worker.id()) {
            // Recycled while finishing its last task
            return;
        }

        if let Some(task) = self.waiting.pop_front() {
            trace!(worker = %worker.id(), waiting = self.waiting.len(), "Handing queued task to worker");
            worker.tell(task);
        } else {
            self.idle.push_back(IdleWorker {
                worker,
                since: Instant::now(),
            });
            self.schedule_cleanup(ctx, self.config.idle_timeout);
        }
    }

    fn on_worker_terminated(&mut self, id: ActorId) {
        if self.workers.remove(&id).is_some() {
            debug!(worker = %id, total = self.workers.len(), "Worker terminated");
        }
        self.idle.retain(|idle| idle.worker.id() != id);
    }

    fn schedule_cleanup(&mut self, ctx: &mut Context<PoolEvent>, delay: Duration) {
        if self.cleanup_scheduled || self.config.idle_timeout.is_zero() {
            return;
        }
        ctx.schedule_once(delay, PoolEvent::Cleanup);
        self.cleanup_scheduled = true;
    }

    fn cleanup(&mut self, ctx: &mut Context<PoolEvent>) {
        self.cleanup_scheduled = false;
        let timeout = self.config.idle_timeout;
        let now = Instant::now();

        let mut recycled = 0;
        let mut kept = VecDeque::with_capacity(self.idle.len());
        for idle in self.idle.drain(..) {
            if now.duration_since(idle.since) >= timeout {
                self.workers.remove(&idle.worker.id());
                idle.worker.stop_now();
                recycled += 1;
            } else {
                kept.push_back(idle);
            }
        }
        self.idle = kept;

        if recycled > 0 {
            info!(recycled, total = self.workers.len(), "Recycled idle workers");
        }

        // Re-arm for whoever goes stale next
        if let Some(oldest) = self.idle.iter().map(|idle| idle.since).min() {
            let remaining = (oldest + timeout).saturating_duration_since(now);
            self.schedule_cleanup(ctx, remaining);
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.workers.len(),
            idle: self.idle.len(),
            busy: self.workers.len() - self.idle.len(),
            waiting: self.waiting.len(),
            cleanup_scheduled: self.cleanup_scheduled,
        }
    }
}

#[async_trait]
impl Actor for PoolActor {
    type Message = PoolEvent;

    async fn started(&mut self, ctx: &mut Context<PoolEvent>) {
        for _ in 0..self.config.initial_capacity {
            self.new_worker(ctx);
        }
        info!(
            initial_capacity = self.config.initial_capacity,
            max_capacity = self.config.max_capacity,
            idle_timeout = ?self.config.idle_timeout,
            "Worker pool started"
        );
    }

    async fn handle(&mut self, ctx: &mut Context<PoolEvent>, event: PoolEvent) {
        match event {
            PoolEvent::Submit(task) => self.submit(ctx, task),
            PoolEvent::Idle(worker) => self.on_worker_idle(ctx, worker),
            PoolEvent::Terminated(id) => self.on_worker_terminated(id),
            PoolEvent::Cleanup => self.cleanup(ctx),
            PoolEvent::Stats(reply_to) => reply_to.send(self.stats()),
        }
    }

    async fn stopped(&mut self, _ctx: &mut Context<PoolEvent>) {
        for worker in self.workers.values() {
            worker.stop_now();
        }
        let dropped = self.waiting.len();
        self.waiting.clear();
        self.idle.clear();
        self.workers.clear();
        info!(dropped_tasks = dropped, "Worker pool stopped");
    }
}

/// Handle to an elastic worker pool
///
/// # Example
///
/// ```ignore
/// use courier::worker::{WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::spawn(
///     WorkerPoolConfig::new()
///         .with_max_capacity(4)
///         .with_idle_timeout(Duration::from_secs(30)),
/// )?;
///
/// let value = pool.call(async { Ok(json!(42)) }).await?;
/// pool.shutdown(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    pool: ActorRef<PoolEvent>,
}

impl WorkerPool {
    /// Spawn a pool on the current runtime
    pub fn spawn(config: WorkerPoolConfig) -> Result<Self, WorkerPoolError> {
        config.validate()?;
        Ok(Self {
            pool: spawn(PoolActor::new(config)),
        })
    }

    /// Get the pool actor
    pub fn actor_ref(&self) -> &ActorRef<PoolEvent> {
        &self.pool
    }

    /// Submit a task; its reply address (if any) receives the outcome
    pub fn submit(&self, task: impl Into<Task>) {
        self.pool.tell(PoolEvent::Submit(task.into()));
    }

    /// Run an action on a worker, ignoring the outcome
    pub fn execute<F>(&self, action: F)
    where
        F: Future<Output = TaskResult<()>> + Send + 'static,
    {
        self.submit(RunnableTask::new(action));
    }

    /// Run an action on a worker and await its completion
    pub async fn run<F>(&self, action: F) -> TaskResult<()>
    where
        F: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let (reply_to, rx) = ReplyTo::channel();
        self.submit(RunnableTask::new(action).with_reply(reply_to));
        rx.await.unwrap_or(Err(TaskError::Dropped))
    }

    /// Run a computation on a worker and await its value
    pub async fn call<F>(&self, computation: F) -> TaskResult<Value>
    where
        F: Future<Output = TaskResult<Value>> + Send + 'static,
    {
        let (reply_to, rx) = ReplyTo::channel();
        self.submit(CallableTask::new(computation).with_reply(reply_to));
        rx.await.unwrap_or(Err(TaskError::Dropped))
    }

    /// Query the pool's bookkeeping
    pub async fn stats(&self) -> Result<PoolStats, WorkerPoolError> {
        Ok(Talk::new(self.pool.clone()).ask(PoolEvent::Stats).await?)
    }

    /// Stop every worker and the pool itself
    ///
    /// Queued tasks are dropped; their askers observe [`TaskError::Dropped`].
    #[instrument(skip(self), fields(pool = %self.pool.id()))]
    pub async fn shutdown(&self, grace: Duration) -> Result<(), WorkerPoolError> {
        info!("Shutting down worker pool");
        Ok(self.pool.stop(grace).await?)
    }
}
