//! Shutdown signalling for background tasks.

use tokio::sync::watch;

/// Requests shutdown of the tasks holding the matching [`ShutdownSignal`].
pub struct ShutdownToken {
    sender: watch::Sender<bool>,
}

/// The receiving side observed by a background task.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Create a token and its signal.
    pub fn new() -> (Self, ShutdownSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownSignal { receiver })
    }

    /// Request shutdown. Idempotent; wakes every waiting signal holder.
    pub fn shutdown(&self) {
        // Receivers may already be gone; nothing to do then.
        let _ = self.sender.send(true);
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&mut self) {
        // An error means the token was dropped, which also ends the task.
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}
