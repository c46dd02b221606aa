//! One-shot reply addresses

use std::fmt;

use tokio::sync::oneshot;
use tracing::trace;

/// Anonymous reply address embedded in a request message
///
/// Replying to an address whose asker has given up is not an error; the
/// reply is discarded.
pub struct ReplyTo<T> {
    tx: oneshot::Sender<T>,
}

impl<T> ReplyTo<T> {
    /// Create a reply address and the receiver the asker awaits
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the reply
    pub fn send(self, value: T) {
        if self.tx.send(value).is_err() {
            trace!("reply discarded: asker no longer waiting");
        }
    }

    /// Check whether the asker has stopped waiting
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> fmt::Debug for ReplyTo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTo")
            .field("closed", &self.is_closed())
            .finish()
    }
}
