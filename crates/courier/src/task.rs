//! Units of work submitted to a worker pool
//!
//! A [`Task`] is either a side-effecting [`RunnableTask`] or a
//! value-producing [`CallableTask`]. Either may carry a reply address; the
//! worker that executes it reports success or failure there.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::actor::ReplyTo;

/// Errors produced while executing a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task returned an error
    #[error("task failed: {0}")]
    Failed(String),

    /// The task panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task did not finish within the allowed time
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The task was discarded before it produced a result
    #[error("task dropped before completion")]
    Dropped,
}

impl TaskError {
    /// Create a failure from any displayable error
    pub fn failed(err: impl fmt::Display) -> Self {
        TaskError::Failed(err.to_string())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

/// Result of executing a task
pub type TaskResult<T> = Result<T, TaskError>;

/// Boxed task body
pub type TaskFuture<T> = BoxFuture<'static, TaskResult<T>>;

/// Run a task body, converting panics into [`TaskError::Panicked`]
pub(crate) async fn catch<T>(body: impl Future<Output = TaskResult<T>>) -> TaskResult<T> {
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}

pub(crate) fn blocking<T, F>(f: F) -> TaskFuture<T>
where
    T: Send + 'static,
    F: FnOnce() -> TaskResult<T> + Send + 'static,
{
    Box::pin(async move {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
            Err(_) => Err(TaskError::Dropped),
        }
    })
}

/// Side-effecting unit of work
pub struct RunnableTask {
    pub(crate) action: TaskFuture<()>,
    pub(crate) reply_to: Option<ReplyTo<TaskResult<()>>>,
}

impl RunnableTask {
    /// Create a runnable task from an async action
    pub fn new<F>(action: F) -> Self
    where
        F: Future<Output = TaskResult<()>> + Send + 'static,
    {
        Self {
            action: Box::pin(action),
            reply_to: None,
        }
    }

    /// Create a runnable task from blocking code
    ///
    /// The closure runs on tokio's blocking thread pool; the worker stays
    /// busy until it returns.
    pub fn blocking<F>(action: F) -> Self
    where
        F: FnOnce() -> TaskResult<()> + Send + 'static,
    {
        Self {
            action: blocking(action),
            reply_to: None,
        }
    }

    /// Report the outcome to `reply_to`
    pub fn with_reply(mut self, reply_to: ReplyTo<TaskResult<()>>) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Value-producing unit of work
pub struct CallableTask {
    pub(crate) computation: TaskFuture<Value>,
    pub(crate) reply_to: Option<ReplyTo<TaskResult<Value>>>,
}

impl CallableTask {
    /// Create a callable task from an async computation
    pub fn new<F>(computation: F) -> Self
    where
        F: Future<Output = TaskResult<Value>> + Send + 'static,
    {
        Self {
            computation: Box::pin(computation),
            reply_to: None,
        }
    }

    /// Create a callable task from blocking code
    pub fn blocking<F>(computation: F) -> Self
    where
        F: FnOnce() -> TaskResult<Value> + Send + 'static,
    {
        Self {
            computation: blocking(computation),
            reply_to: None,
        }
    }

    /// Report the computed value (or failure) to `reply_to`
    pub fn with_reply(mut self, reply_to: ReplyTo<TaskResult<Value>>) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// A unit of work addressed to any worker of a pool
pub enum Task {
    /// Side-effecting action
    Runnable(RunnableTask),
    /// Value-producing computation
    Callable(CallableTask),
}

impl Task {
    /// Check whether the task carries a reply address
    pub fn has_reply(&self) -> bool {
        match self {
            Task::Runnable(t) => t.reply_to.is_some(),
            Task::Callable(t) => t.reply_to.is_some(),
        }
    }

    /// Kind label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Runnable(_) => "runnable",
            Task::Callable(_) => "callable",
        }
    }
}

impl From<RunnableTask> for Task {
    fn from(task: RunnableTask) -> Self {
        Task::Runnable(task)
    }
}

impl From<CallableTask> for Task {
    fn from(task: CallableTask) -> Self {
        Task::Callable(task)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind())
            .field("has_reply", &self.has_reply())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn explode() -> TaskResult<()> {
        panic!("exploded")
    }

    #[tokio::test]
    async fn test_catch_converts_panic() {
        let result = catch(explode()).await;
        assert_eq!(result, Err(TaskError::Panicked("exploded".into())));
    }

    #[tokio::test]
    async fn test_catch_passes_errors_through() {
        let result: TaskResult<()> = catch(async { Err(TaskError::failed("bad input")) }).await;
        assert_eq!(result, Err(TaskError::Failed("bad input".into())));
    }

    #[tokio::test]
    async fn test_blocking_callable() {
        let task = CallableTask::blocking(|| Ok(json!(6 * 7)));
        assert_eq!(task.computation.await, Ok(json!(42)));
    }

    #[tokio::test]
    async fn test_blocking_panic_is_reported() {
        let task = RunnableTask::blocking(|| panic!("blocking boom"));
        assert_eq!(
            task.action.await,
            Err(TaskError::Panicked("blocking boom".into()))
        );
    }

    #[test]
    fn test_task_kind_and_reply() {
        let (reply_to, _rx) = ReplyTo::channel();
        let task: Task = CallableTask::new(async { Ok(Value::Null) })
            .with_reply(reply_to)
            .into();
        assert_eq!(task.kind(), "callable");
        assert!(task.has_reply());

        let task: Task = RunnableTask::new(async { Ok(()) }).into();
        assert_eq!(task.kind(), "runnable");
        assert!(!task.has_reply());
    }

    #[test]
    fn test_panic_message_with_format_args() {
        let payload: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(
            TaskError::from_panic(payload),
            TaskError::Panicked("code 7".into())
        );
    }
}
