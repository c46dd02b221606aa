//! Messages exchanged by the registrar, routers and registry entries

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::key::ServiceKey;
use crate::actor::{ActorId, ActorRef, ReplyTo};
use crate::directory::Listing;
use crate::talk::TalkError;
use crate::task::{TaskError, TaskFuture, TaskResult};

/// Errors surfaced to invokers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// No provider is registered for the path
    #[error("service not available: {0}")]
    NotAvailable(String),

    /// The procedure failed
    #[error("procedure failed: {0}")]
    Execution(String),

    /// No result within the request's timeout
    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    /// The request or its reply was lost on the way
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl From<TaskError> for InvocationError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Timeout(after) => InvocationError::Timeout(after),
            TaskError::Dropped => InvocationError::Delivery(err.to_string()),
            TaskError::Failed(_) | TaskError::Panicked(_) => {
                InvocationError::Execution(err.to_string())
            }
        }
    }
}

impl From<TalkError> for InvocationError {
    fn from(err: TalkError) -> Self {
        match err {
            TalkError::Timeout(after) => InvocationError::Timeout(after),
            other => InvocationError::Delivery(other.to_string()),
        }
    }
}

/// Outcome delivered to an invoker
pub type InvocationResult = Result<Value, InvocationError>;

/// Procedure bound to a registry entry
///
/// Called with the entry's own handle and the request arguments.
pub type Procedure = Arc<dyn Fn(ActorRef<Request>, Vec<Value>) -> TaskFuture<Value> + Send + Sync>;

/// Box an async function into a [`Procedure`]
pub fn procedure<F, Fut>(f: F) -> Procedure
where
    F: Fn(ActorRef<Request>, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult<Value>> + Send + 'static,
{
    Arc::new(move |me: ActorRef<Request>, arguments: Vec<Value>| -> TaskFuture<Value> {
        Box::pin(f(me, arguments))
    })
}

/// Invocation of a registered procedure
pub struct Request {
    pub key: ServiceKey,
    pub arguments: Vec<Value>,
    pub timeout: Duration,
    pub reply_to: ReplyTo<InvocationResult>,
}

impl Request {
    /// Fail the request without running it
    pub fn reject(self, err: InvocationError) {
        self.reply_to.send(Err(err));
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("key", &self.key)
            .field("arguments", &self.arguments)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Binding of a procedure to a path
pub struct Registration {
    pub key: ServiceKey,
    pub procedure: Procedure,
    /// Receives the spawned registry entry once it has announced itself
    pub reply_to: Option<ReplyTo<ActorRef<Request>>>,
}

/// Snapshot query for the live providers of a path
pub struct RoutesQuery {
    pub key: ServiceKey,
    pub reply_to: ReplyTo<Vec<ActorRef<Request>>>,
}

/// Events processed by the registrar
pub enum RegistrarEvent {
    Registration(Registration),
    Request(Request),
    Routes(RoutesQuery),
    /// Directory snapshot for a key the registrar listens to
    Listing { key: ServiceKey, providers: Listing },
    /// A watched provider terminated
    Terminated(ActorId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_errors_map_to_invocation_errors() {
        assert_eq!(
            InvocationError::from(TaskError::Timeout(Duration::from_millis(5))),
            InvocationError::Timeout(Duration::from_millis(5))
        );
        assert!(matches!(
            InvocationError::from(TaskError::failed("bad")),
            InvocationError::Execution(msg) if msg.contains("bad")
        ));
        assert!(matches!(
            InvocationError::from(TaskError::Dropped),
            InvocationError::Delivery(_)
        ));
    }

    #[test]
    fn test_talk_errors_map_to_invocation_errors() {
        assert_eq!(
            InvocationError::from(TalkError::Timeout(Duration::from_secs(1))),
            InvocationError::Timeout(Duration::from_secs(1))
        );
        assert!(matches!(
            InvocationError::from(TalkError::NoReply),
            InvocationError::Delivery(_)
        ));
    }
}
