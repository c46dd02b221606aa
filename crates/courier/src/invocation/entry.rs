//! Server-side binding of a service key to a procedure

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::key::ServiceKey;
use super::message::{InvocationError, Procedure, Request};
use crate::actor::{Actor, ActorRef, Context, ReplyTo};
use crate::directory::Membership;
use crate::task::{catch, TaskError};
use crate::worker::WorkerPool;

/// Provider of one registered procedure
///
/// Announces itself into the directory when started and withdraws when
/// stopped. Requests are offloaded to the worker pool, so the entry's own
/// mailbox keeps draining while procedures run.
pub(crate) struct RegistryEntry {
    key: ServiceKey,
    procedure: Procedure,
    pool: WorkerPool,
    directory: Arc<dyn Membership>,
    announced_to: Option<ReplyTo<ActorRef<Request>>>,
}

impl RegistryEntry {
    pub(crate) fn new(
        key: ServiceKey,
        procedure: Procedure,
        pool: WorkerPool,
        directory: Arc<dyn Membership>,
        announced_to: Option<ReplyTo<ActorRef<Request>>>,
    ) -> Self {
        Self {
            key,
            procedure,
            pool,
            directory,
            announced_to,
        }
    }
}

#[async_trait]
impl Actor for RegistryEntry {
    type Message = Request;

    async fn started(&mut self, ctx: &mut Context<Request>) {
        let me = ctx.myself().clone();
        self.directory.announce(&self.key, me.clone());
        info!(path = %self.key, entry = %me.id(), "Registered procedure");

        if let Some(reply_to) = self.announced_to.take() {
            reply_to.send(me);
        }
    }

    async fn handle(&mut self, ctx: &mut Context<Request>, req: Request) {
        let Request {
            key,
            arguments,
            timeout,
            reply_to,
        } = req;
        debug!(path = %key, entry = %ctx.myself().id(), ?timeout, "Invoking procedure");

        let procedure = Arc::clone(&self.procedure);
        let me = ctx.myself().clone();
        self.pool.execute(async move {
            let call = catch(async move { procedure(me, arguments).await });
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(TaskError::Timeout(timeout)),
            };
            let failure = outcome.as_ref().err().cloned();
            reply_to.send(outcome.map_err(InvocationError::from));

            // Surfaces in the worker's log
            match failure {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });
    }

    async fn stopped(&mut self, ctx: &mut Context<Request>) {
        self.directory.withdraw(&self.key, ctx.myself().id());
        info!(path = %self.key, entry = %ctx.myself().id(), "Unregistered procedure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn;
    use crate::invocation::procedure;
    use crate::directory::LocalDirectory;
    use crate::worker::WorkerPoolConfig;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn sync_procedure<F>(f: F) -> Procedure
    where
        F: Fn(Vec<Value>) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        procedure(move |_me, args| {
            let f = Arc::clone(&f);
            async move { f(args) }
        })
    }

    async fn start_entry(procedure: Procedure) -> (LocalDirectory, ActorRef<Request>) {
        let directory = LocalDirectory::new();
        let pool = WorkerPool::spawn(WorkerPoolConfig::new().with_max_capacity(2)).unwrap();
        let (reply_to, rx) = ReplyTo::channel();
        spawn(RegistryEntry::new(
            ServiceKey::from("svc@test"),
            procedure,
            pool,
            Arc::new(directory.clone()),
            Some(reply_to),
        ));
        (directory, rx.await.unwrap())
    }

    async fn invoke(entry: &ActorRef<Request>, arguments: Vec<Value>, timeout: Duration) -> Result<Value, InvocationError> {
        let (reply_to, rx) = ReplyTo::channel();
        entry.tell(Request {
            key: ServiceKey::from("svc@test"),
            arguments,
            timeout,
            reply_to,
        });
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_entry_announces_itself() {
        let (directory, entry) = start_entry(sync_procedure(|_| Ok(Value::Null))).await;
        assert_eq!(directory.listing(&ServiceKey::from("svc@test")), vec![entry]);
    }

    #[tokio::test]
    async fn test_entry_replies_with_result() {
        let (_directory, entry) = start_entry(sync_procedure(|args| {
            Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        }))
        .await;

        let reply = invoke(&entry, vec![json!(2), json!(3)], Duration::from_secs(1)).await;
        assert_eq!(reply, Ok(json!(5)));
    }

    #[tokio::test]
    async fn test_entry_converts_failure() {
        let (_directory, entry) =
            start_entry(sync_procedure(|_| Err(TaskError::failed("division by zero")))).await;

        let reply = invoke(&entry, vec![], Duration::from_secs(1)).await;
        assert!(matches!(reply, Err(InvocationError::Execution(msg)) if msg.contains("division by zero")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_times_out_slow_procedure() {
        let slow = procedure(|_me, _args| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        });
        let (_directory, entry) = start_entry(slow).await;

        let reply = invoke(&entry, vec![], Duration::from_millis(100)).await;
        assert_eq!(reply, Err(InvocationError::Timeout(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn test_entry_withdraws_when_stopped() {
        let (directory, entry) = start_entry(sync_procedure(|_| Ok(Value::Null))).await;
        entry.stop(Duration::from_secs(1)).await.unwrap();
        assert!(directory.listing(&ServiceKey::from("svc@test")).is_empty());
    }
}
