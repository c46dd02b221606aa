//! Named remote invocation
//!
//! This module provides:
//! - [`Registry`] - Register procedures under a path and invoke them by path
//! - [`ServiceKey`] - Identifier of a registered procedure (`context@method`)
//! - [`RegistryListener`] - Hooks for provider arrivals and departures
//!
//! # Architecture
//!
//! ```text
//!  invoke("svc@compute")                      register("svc@compute", f)
//!          │                                           │
//!          ▼                                           ▼
//! ┌──────────────────┐   lazily, once per key  ┌──────────────────┐
//! │    Registrar     │ ──────────────────────► │  RegistryEntry   │
//! │ routes / actors  │                         │  (bound to f)    │
//! │ actor_keys       │ ◄── Listing snapshots ─ └────────┬─────────┘
//! └────────┬─────────┘          ▲                       │ announce
//!          │ Request            │                       ▼
//!          ▼                    │              ┌──────────────────┐
//! ┌──────────────────┐          └───────────── │    Directory     │
//! │  Router (per key)│ ◄──── watch(key) ────── │ (cluster-wide)   │
//! └────────┬─────────┘                         └──────────────────┘
//!          │ one live provider, any node
//!          ▼
//!   RegistryEntry ──► WorkerPool ──► reply to invoker
//! ```
//!
//! Requests for a key with no route and no listed provider fail at once
//! with [`InvocationError::NotAvailable`]; nothing is buffered or retried.

mod entry;
mod key;
mod message;
mod registrar;
mod registry;
mod router;

pub use key::ServiceKey;
pub use message::{
    procedure, InvocationError, InvocationResult, Procedure, Registration, RegistrarEvent,
    Request, RoutesQuery,
};
pub use registrar::RegistryListener;
pub use registry::{Registry, RegistryBuilder};
