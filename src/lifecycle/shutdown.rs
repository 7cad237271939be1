//! Shutdown coordination for the background tasks.

use tokio::sync::broadcast;

/// Coordinator for stopping the manager task, the dispatcher task and the
/// config watcher together.
///
/// Tasks spawned without a shutdown receiver stop once every handle to
/// them has been dropped instead.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when the signal fires (or its sender is dropped).
/// Never resolves when there is no receiver.
pub async fn wait_for_shutdown(shutdown: &mut Option<broadcast::Receiver<()>>) {
    match shutdown {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
