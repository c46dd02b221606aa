//! Actor behaviour trait, per-actor context and spawning

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::actor_ref::ActorRef;

/// Actor behaviour
///
/// An actor owns its state and processes its mailbox one message at a
/// time on a dedicated tokio task. `handle` is never re-entered.
///
/// # Example
///
/// ```ignore
/// struct Counter(u64);
///
/// #[async_trait]
/// impl Actor for Counter {
///     type Message = u64;
///
///     async fn handle(&mut self, _ctx: &mut Context<u64>, n: u64) {
///         self.0 += n;
///     }
/// }
///
/// let counter = spawn(Counter(0));
/// counter.tell(5);
/// ```
#[async_trait]
pub trait Actor: Send + 'static {
    /// Message type accepted by this actor
    type Message: Send + 'static;

    /// Called once before the first message is processed
    async fn started(&mut self, _ctx: &mut Context<Self::Message>) {}

    /// Process one message
    async fn handle(&mut self, ctx: &mut Context<Self::Message>, msg: Self::Message);

    /// Called once after the actor received its termination directive
    async fn stopped(&mut self, _ctx: &mut Context<Self::Message>) {}
}

/// Services available to an actor while it runs
pub struct Context<M> {
    myself: ActorRef<M>,
}

impl<M: Send + 'static> Context<M> {
    /// Handle to the running actor itself
    pub fn myself(&self) -> &ActorRef<M> {
        &self.myself
    }

    /// Watch another actor
    ///
    /// When `other` terminates, `on_terminated` is delivered into this
    /// actor's own mailbox, so termination is processed like any other
    /// event. The watch is dropped if this actor terminates first.
    pub fn watch<N>(&self, other: &ActorRef<N>, on_terminated: M) {
        let other_terminated = other.terminated_token();
        let me_terminated = self.myself.terminated_token();
        let me = self.myself.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = other_terminated.cancelled() => me.tell(on_terminated),
                _ = me_terminated.cancelled() => {}
            }
        });
    }

    /// Deliver `msg` to this actor after `delay`
    pub fn schedule_once(&self, delay: Duration, msg: M) {
        let me_terminated = self.myself.terminated_token();
        let me = self.myself.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => me.tell(msg),
                _ = me_terminated.cancelled() => {}
            }
        });
    }

    /// Stop this actor after the current message
    pub fn stop(&self) {
        self.myself.stop_now();
    }
}

/// Spawn an actor on the current tokio runtime
///
/// The returned handle reports termination once the actor's task exits,
/// whether it was stopped or its behaviour panicked.
pub fn spawn<A: Actor>(mut actor: A) -> ActorRef<A::Message> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let stop = CancellationToken::new();
    let terminated = CancellationToken::new();
    let myself = ActorRef::new(tx, stop.clone(), terminated.clone());
    let mut ctx = Context {
        myself: myself.clone(),
    };

    tokio::spawn(async move {
        // Fires on every exit path, including unwinding
        let _terminated = terminated.drop_guard();
        let id = ctx.myself.id();

        actor.started(&mut ctx).await;
        trace!(actor = %id, "Actor started");

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => actor.handle(&mut ctx, msg).await,
                    None => break,
                },
            }
        }

        rx.close();
        actor.stopped(&mut ctx).await;
        trace!(actor = %id, "Actor stopped");
    });

    myself
}
