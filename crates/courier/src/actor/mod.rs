//! Actor primitives
//!
//! This module provides:
//! - [`Actor`] - Behaviour trait: one message at a time, never re-entered
//! - [`ActorRef`] - Cloneable mailbox handle with termination watch
//! - [`Context`] - Per-actor services (self reference, watches, timers)
//! - [`ReplyTo`] - One-shot reply address embedded in request messages
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  tell(M)   ┌──────────────────────────────────┐
//! │   ActorRef   │ ─────────► │ unbounded mailbox (per-pair FIFO)│
//! └──────────────┘            └────────────────┬─────────────────┘
//!        │ stop()                              │ recv
//!        ▼                                     ▼
//! ┌──────────────┐            ┌──────────────────────────────────┐
//! │  stop token  │ ─────────► │  tokio task: Actor::handle(msg)  │
//! └──────────────┘            └────────────────┬─────────────────┘
//!                                              │ exit (stop/panic)
//!                                              ▼
//!                             ┌──────────────────────────────────┐
//!                             │ terminated token -> watchers     │
//!                             └──────────────────────────────────┘
//! ```
//!
//! All state owned by an actor is mutated only from its own task, so no
//! locks are needed for actor state.

mod actor_ref;
mod context;
mod reply;

pub use actor_ref::{ActorId, ActorRef};
pub use context::{spawn, Actor, Context};
pub use reply::ReplyTo;
