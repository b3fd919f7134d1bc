//! The network diffusion seam.
//!
//! The kernel never talks to peers directly; it hands transaction bodies to
//! a [`Diffusion`] implementation and treats every failure as "try again
//! later". The enclosing node supplies the real implementation.

use crate::error::SendError;
use async_trait::async_trait;
use galleon_core::Tx;
use tokio::sync::mpsc;

/// Fire-and-forget transaction broadcast.
#[async_trait]
pub trait Diffusion: Send + Sync {
    /// Hand a transaction body to the network layer.
    async fn send_tx(&self, tx: &Tx) -> Result<(), SendError>;
}

/// A diffusion backed by an in-process channel.
///
/// Used by tests and demos to observe exactly what the ticker transmits and
/// in what order.
pub struct BufferedDiffusion {
    sender: mpsc::UnboundedSender<Tx>,
}

impl BufferedDiffusion {
    /// Create a diffusion plus the receiving end of its buffer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Tx>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Diffusion for BufferedDiffusion {
    async fn send_tx(&self, tx: &Tx) -> Result<(), SendError> {
        self.sender
            .send(tx.clone())
            .map_err(|_| SendError("diffusion buffer closed".to_string()))
    }
}
