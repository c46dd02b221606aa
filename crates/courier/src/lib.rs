//! # Courier
//!
//! Actor-based task dispatch and remote-procedure layer.
//!
//! ## Features
//!
//! - **Elastic worker pools**: grow on demand up to a capacity bound, queue the excess in FIFO order, recycle long-idle workers
//! - **Failure isolation**: task errors and panics become failure replies; pool bookkeeping never leaks a busy worker
//! - **Named remote invocation**: register a procedure under `context@method`, invoke it from any node sharing the directory
//! - **Ask bridge**: request/response over one-way mailboxes with explicit timeouts
//! - **Pub/sub messaging**: cluster-wide topics and uniquely named destinations
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          System                              │
//! │  (one per node: config, shared directory, pubsub)           │
//! └─────────────────────────────────────────────────────────────┘
//!          │                     │                      │
//!          ▼                     ▼                      ▼
//! ┌─────────────────┐  ┌───────────────────┐  ┌──────────────────┐
//! │    Registry     │  │     Messenger     │  │    WorkerPool    │
//! │ Registrar,      │  │ topics and named  │  │ Workers, waiting │
//! │ Routers, Entries│  │ destinations      │  │ queue, recycling │
//! └────────┬────────┘  └───────────────────┘  └──────────────────┘
//!          │ RegistryEntry executes procedures on ──────▲
//!          └────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! let system = System::start(CourierConfig::from_env())?;
//!
//! system
//!     .registry()
//!     .register("math@add", |_me, args| async move {
//!         let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
//!         Ok(json!(sum))
//!     })
//!     .await?;
//!
//! let five = system.registry().call("math@add", vec![json!(2), json!(3)]).await?;
//! system.shutdown().await?;
//! ```

pub mod actor;
pub mod config;
pub mod directory;
pub mod invocation;
pub mod messaging;
pub mod system;
pub mod talk;
pub mod task;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::actor::{spawn, Actor, ActorId, ActorRef, Context, ReplyTo};
    pub use crate::config::{CourierConfig, RoutingPolicy};
    pub use crate::directory::{LocalDirectory, Membership};
    pub use crate::invocation::{InvocationError, Registry, RegistryListener, Request, ServiceKey};
    pub use crate::messaging::{Messenger, MessagingError, Notice, PubSub, Subscriber};
    pub use crate::system::System;
    pub use crate::talk::{Talk, TalkError};
    pub use crate::task::{CallableTask, RunnableTask, Task, TaskError, TaskResult};
    pub use crate::worker::{PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use config::{CourierConfig, RoutingPolicy};
pub use directory::{LocalDirectory, Membership};
pub use invocation::{InvocationError, Registry, ServiceKey};
pub use messaging::{Messenger, MessagingError, PubSub};
pub use system::System;
pub use talk::{Talk, TalkError};
pub use task::{Task, TaskError, TaskResult};
pub use worker::{PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolError};
