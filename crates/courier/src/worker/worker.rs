//! Single-task execution agent

use async_trait::async_trait;
use tracing::{debug, warn};

use super::pool::PoolEvent;
use crate::actor::{Actor, ActorRef, Context};
use crate::task::{catch, Task};

/// Executes one task at a time on behalf of its pool
///
/// Every outcome is reported to the task's reply address when present;
/// failures without one are logged and swallowed. The pool is told the
/// worker is idle again on every path, so a failing task can never leave
/// the worker accounted as busy. Workers never stop themselves.
pub(crate) struct Worker {
    pool: ActorRef<PoolEvent>,
}

impl Worker {
    pub(crate) fn new(pool: ActorRef<PoolEvent>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Actor for Worker {
    type Message = Task;

    async fn handle(&mut self, ctx: &mut Context<Task>, task: Task) {
        let worker = ctx.myself().id();
        debug!(%worker, kind = task.kind(), "Executing task");

        match task {
            Task::Runnable(task) => {
                let result = catch(task.action).await;
                if let Err(e) = &result {
                    warn!(%worker, error = %e, "Runnable task failed");
                }
                if let Some(reply_to) = task.reply_to {
                    reply_to.send(result);
                }
            }
            Task::Callable(task) => {
                let result = catch(task.computation).await;
                if let Err(e) = &result {
                    warn!(%worker, error = %e, "Callable task failed");
                }
                if let Some(reply_to) = task.reply_to {
                    reply_to.send(result);
                }
            }
        }

        self.pool.tell(PoolEvent::Idle(ctx.myself().clone()));
    }
}
