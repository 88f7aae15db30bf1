//! The bounded trigger queue the refresher task blocks on.

use tokio::sync::{mpsc, oneshot};

/// A request to run one refresh cycle, with an optional completion signal.
///
/// Periodic ticks carry no completion channel; `sync_tags_with_admin`
/// callers attach one and await it, so the call returns only after that
/// cycle (and every trigger queued ahead of it, FIFO) has run.
pub struct Trigger {
    completion: Option<oneshot::Sender<()>>,
}

impl Trigger {
    fn periodic() -> Self {
        Self { completion: None }
    }

    fn with_completion() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                completion: Some(tx),
            },
            rx,
        )
    }

    pub(crate) fn signal_completion(self) {
        if let Some(tx) = self.completion {
            let _ = tx.send(());
        }
    }
}

/// Sending half of the trigger queue, cloned into both the periodic timer
/// task and every `sync_tags_with_admin` caller.
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Trigger>) -> Self {
        Self { tx }
    }

    pub(crate) async fn send_periodic(&self) {
        let _ = self.tx.send(Trigger::periodic()).await;
    }

    /// Enqueues a trigger and waits for the refresher to signal it complete.
    /// Returns `false` if the refresher has already shut down and the
    /// trigger could not be delivered or completed (e.g. shutdown
    /// abandoned it).
    pub async fn sync_tags_with_admin(&self) -> bool {
        let (trigger, completion) = Trigger::with_completion();
        if self.tx.send(trigger).await.is_err() {
            return false;
        }
        completion.await.is_ok()
    }
}
