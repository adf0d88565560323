use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use crate::metrics::Metrics;

/// Sending half of the registry-change notification queue.
///
/// The queue is bounded and never blocks the sender: when it is full the new
/// notification is dropped (drop-newest) and counted. Registry updates never depend
/// on a notification being delivered.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<String>,
    metrics: Metrics,
}

impl Notifier {
    pub fn channel(capacity: usize, metrics: Metrics) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    /// Queue a notification. Returns false if it was dropped.
    pub fn notify(&self, description: String) -> bool {
        match self.tx.try_send(description) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::debug!("Notification queue full, dropping: {}", dropped);
                self.metrics.notification_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Log every notification until the queue closes
pub async fn log_notifications(mut rx: mpsc::Receiver<String>) {
    while let Some(description) = rx.recv().await {
        tracing::info!("Registry updated after event: {}", description);
    }
}
