//! Actor identity and mailbox handles

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;

use crate::talk::TalkError;

/// Unique actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Create a new time-ordered actor ID
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0.simple())
    }
}

/// Handle to a running actor
///
/// Cloning is cheap. Equality and hashing use the actor identity only, so
/// handles can be stored in sets and maps regardless of the message type.
pub struct ActorRef<M> {
    id: ActorId,
    mailbox: mpsc::UnboundedSender<M>,
    stop: CancellationToken,
    terminated: CancellationToken,
}

impl<M> ActorRef<M> {
    pub(crate) fn new(
        mailbox: mpsc::UnboundedSender<M>,
        stop: CancellationToken,
        terminated: CancellationToken,
    ) -> Self {
        Self {
            id: ActorId::new(),
            mailbox,
            stop,
            terminated,
        }
    }

    /// Get the actor ID
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Fire-and-forget send
    ///
    /// Messages sent to a terminated actor are dropped.
    pub fn tell(&self, msg: M) {
        if self.mailbox.send(msg).is_err() {
            trace!(actor = %self.id, "message dropped: actor terminated");
        }
    }

    /// Send, handing the message back if the actor can no longer receive it
    pub fn try_tell(&self, msg: M) -> Result<(), M> {
        self.mailbox.send(msg).map_err(|e| e.0)
    }

    /// Send, reporting a terminated recipient as an error
    pub fn send(&self, msg: M) -> Result<(), TalkError> {
        self.mailbox
            .send(msg)
            .map_err(|_| TalkError::Terminated(self.id))
    }

    /// Check whether the actor has terminated
    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Wait until the actor has terminated
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// Issue the termination directive without waiting
    ///
    /// Messages still queued in the mailbox are discarded.
    pub fn stop_now(&self) {
        self.stop.cancel();
    }

    /// Issue the termination directive and wait for acknowledgment
    pub async fn stop(&self, grace: Duration) -> Result<(), TalkError> {
        self.stop.cancel();
        tokio::time::timeout(grace, self.terminated.cancelled())
            .await
            .map_err(|_| TalkError::StopTimeout(grace))
    }

    pub(crate) fn terminated_token(&self) -> CancellationToken {
        self.terminated.clone()
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            mailbox: self.mailbox.clone(),
            stop: self.stop.clone(),
            terminated: self.terminated.clone(),
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl<M> fmt::Display for ActorRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}
