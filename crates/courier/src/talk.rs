//! Request/response bridge over one-way mailboxes
//!
//! [`Talk`] wraps an [`ActorRef`] with a timeout. `ask` embeds a fresh
//! [`ReplyTo`] in the outgoing message and resolves with the reply, or
//! fails with [`TalkError::Timeout`]. Giving up never cancels work
//! already running at the recipient; late replies are discarded.

use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;

use crate::actor::{ActorId, ActorRef, ReplyTo};

/// Default ask timeout
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for `stop`
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Errors from request/response exchanges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TalkError {
    /// No reply within the configured window
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The recipient dropped the reply address without answering
    #[error("recipient dropped the request without replying")]
    NoReply,

    /// The recipient had already terminated
    #[error("recipient {0} has terminated")]
    Terminated(ActorId),

    /// Stop was not acknowledged in time
    #[error("stop not acknowledged within {0:?}")]
    StopTimeout(Duration),

    /// Blocking ask used without a runtime to drive it
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

/// Conversation with one recipient
///
/// # Example
///
/// ```ignore
/// let talk = Talk::new(pool_ref).timeout(Duration::from_millis(500));
/// let stats = talk.ask(PoolEvent::Stats).await?;
/// ```
pub struct Talk<M> {
    recipient: ActorRef<M>,
    timeout: Duration,
    stop_grace: Duration,
    runtime: Option<Handle>,
}

impl<M: Send + 'static> Talk<M> {
    /// Start talking to `recipient` with the default timeout
    pub fn new(recipient: ActorRef<M>) -> Self {
        Self {
            recipient,
            timeout: DEFAULT_ASK_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Set the ask timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the grace period used by `stop`
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Get the recipient
    pub fn recipient(&self) -> &ActorRef<M> {
        &self.recipient
    }

    /// Send a request and await its reply
    pub async fn ask<R>(&self, build: impl FnOnce(ReplyTo<R>) -> M) -> Result<R, TalkError> {
        let (reply_to, rx) = ReplyTo::channel();
        self.recipient.send(build(reply_to))?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TalkError::NoReply),
            Err(_) => Err(TalkError::Timeout(self.timeout)),
        }
    }

    /// Send a request and block the calling thread until the reply arrives
    ///
    /// Intended for threads outside the runtime's async workers, such as
    /// `spawn_blocking` closures or plain OS threads. The exchange itself
    /// runs on the runtime captured when this `Talk` was created.
    pub fn ask_and_wait<R, F>(&self, build: F) -> Result<R, TalkError>
    where
        R: Send + 'static,
        F: FnOnce(ReplyTo<R>) -> M + Send + 'static,
    {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| TalkError::Runtime("talk created outside a tokio runtime".into()))?;

        let talk = self.clone();
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        runtime.spawn(async move {
            let _ = tx.send(talk.ask(build).await);
        });

        rx.recv().map_err(|_| TalkError::NoReply)?
    }

    /// Fire-and-forget send
    pub fn tell(&self, msg: M) -> &Self {
        self.recipient.tell(msg);
        self
    }

    /// Send the termination directive and await acknowledgment
    pub async fn stop(&self) -> Result<(), TalkError> {
        self.recipient.stop(self.stop_grace).await
    }
}

impl<M> Clone for Talk<M> {
    fn clone(&self) -> Self {
        Self {
            recipient: self.recipient.clone(),
            timeout: self.timeout,
            stop_grace: self.stop_grace,
            runtime: self.runtime.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{spawn, Actor, Context};
    use async_trait::async_trait;

    enum EchoMsg {
        Echo(String, ReplyTo<String>),
        Ignore(ReplyTo<String>),
        #[allow(dead_code)]
        Drop(ReplyTo<String>),
    }

    struct Echo {
        ignored: Vec<ReplyTo<String>>,
    }

    #[async_trait]
    impl Actor for Echo {
        type Message = EchoMsg;

        async fn handle(&mut self, _ctx: &mut Context<EchoMsg>, msg: EchoMsg) {
            match msg {
                EchoMsg::Echo(text, reply_to) => reply_to.send(text),
                EchoMsg::Ignore(reply_to) => self.ignored.push(reply_to),
                EchoMsg::Drop(_) => {}
            }
        }
    }

    fn echo() -> ActorRef<EchoMsg> {
        spawn(Echo { ignored: vec![] })
    }

    #[tokio::test]
    async fn test_ask_reply() {
        let talk = Talk::new(echo());
        let reply = talk.ask(|r| EchoMsg::Echo("hello".into(), r)).await;
        assert_eq!(reply, Ok("hello".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_timeout() {
        let talk = Talk::new(echo()).timeout(Duration::from_millis(50));
        let reply = talk.ask(EchoMsg::Ignore).await;
        assert_eq!(reply, Err(TalkError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_ask_no_reply() {
        let talk = Talk::new(echo());
        let reply = talk.ask(EchoMsg::Drop).await;
        assert_eq!(reply, Err(TalkError::NoReply));
    }

    #[tokio::test]
    async fn test_ask_terminated_recipient() {
        let target = echo();
        let talk = Talk::new(target.clone());
        talk.stop().await.unwrap();

        let reply = talk.ask(|r| EchoMsg::Echo("late".into(), r)).await;
        assert_eq!(reply, Err(TalkError::Terminated(target.id())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ask_and_wait_from_blocking_thread() {
        let talk = Talk::new(echo());
        let reply = tokio::task::spawn_blocking(move || {
            talk.ask_and_wait(|r| EchoMsg::Echo("blocking".into(), r))
        })
        .await
        .unwrap();

        assert_eq!(reply, Ok("blocking".to_string()));
    }

    #[tokio::test]
    async fn test_tell_is_chainable() {
        let talk = Talk::new(echo());
        let (r1, rx1) = ReplyTo::channel();
        let (r2, rx2) = ReplyTo::channel();
        talk.tell(EchoMsg::Echo("a".into(), r1))
            .tell(EchoMsg::Echo("b".into(), r2));

        assert_eq!(rx1.await.unwrap(), "a");
        assert_eq!(rx2.await.unwrap(), "b");
    }
}
