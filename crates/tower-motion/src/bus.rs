use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::MotionError;

/// Broadcast topic with bounded capacity.
/// `T` must be `Send + Sync` because we hop across threads.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, msg: T) {
        let _ = self.tx.send(Arc::new(msg));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

/// Waits for the next message, skipping over anything the receiver lagged past.
pub async fn recv_latest<T>(
    rx: &mut broadcast::Receiver<Arc<T>>,
) -> Result<Arc<T>, MotionError> {
    loop {
        match rx.recv().await {
            Ok(msg) => return Ok(msg),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Pose receiver lagged by {} messages.", n);
            }
            Err(broadcast::error::RecvError::Closed) => return Err(MotionError::PoseChannelClosed),
        }
    }
}
