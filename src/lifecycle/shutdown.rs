//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::lifecycle::signals::wait_for_shutdown_signal;

/// Broadcasts a single stop signal to the server, the janitor and any other
/// long-running task that subscribed before it fired.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Only the first call broadcasts; returns how many
    /// subscribers were notified.
    pub fn trigger(&self) -> usize {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::info!(subscribers = notified, "Shutdown triggered");
        notified
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait for SIGINT/SIGTERM, then trigger.
    pub async fn trigger_on_signal(&self) {
        wait_for_shutdown_signal().await;
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_notified_once() {
        let shutdown = Shutdown::new();
        let mut server = shutdown.subscribe();
        let mut janitor = shutdown.subscribe();

        assert_eq!(shutdown.trigger(), 2);
        assert_eq!(shutdown.trigger(), 0);
        assert!(shutdown.is_triggered());

        server.recv().await.unwrap();
        janitor.recv().await.unwrap();
        assert!(server.try_recv().is_err());
    }

    #[test]
    fn test_trigger_without_subscribers() {
        let shutdown = Shutdown::default();
        assert_eq!(shutdown.trigger(), 0);
        assert!(shutdown.is_triggered());
    }
}
