//! Elastic worker pool
//!
//! This module provides:
//! - [`WorkerPool`] - Handle to a pool actor that dispatches tasks to workers
//! - [`WorkerPoolConfig`] - Capacity and idle recycling settings
//! - [`PoolStats`] - Snapshot of the pool's bookkeeping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Pool actor                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  workers    │  │ idle (FIFO) │  │  waiting (FIFO)     │  │
//! │  │ (≤ max)     │  │ + idle-since│  │  queued tasks       │  │
//! │  └──────┬──────┘  └──────▲──────┘  └─────────────────────┘  │
//! │         │ Task           │ Idle                              │
//! │         ▼                │                                   │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   [Worker 1] [Worker 2] ... [Worker N]              │    │
//! │  │   one task at a time, always report idle            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                              │
//! │  Cleanup timer (idle_timeout): recycles stale idle workers  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariants after every processed event:
//! - live workers never exceed `max_capacity`
//! - idle workers are a subset of live workers
//! - tasks only wait while no idle worker exists
//!
//! # Example
//!
//! ```ignore
//! use courier::worker::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::spawn(WorkerPoolConfig::new().with_max_capacity(4))?;
//!
//! pool.execute(async { send_email().await.map_err(TaskError::failed) });
//! let total = pool.call(async { Ok(json!(sum_invoices().await)) }).await?;
//! ```

mod pool;
#[allow(clippy::module_inception)]
mod worker;

pub use pool::{PoolEvent, PoolStats, WorkerPool, WorkerPoolConfig, WorkerPoolError};
