//! Per-job progress channel.
//!
//! The executor pushes events without ever blocking; the consumer (a
//! WebSocket forwarding task, or a test) drains them in order. Once the
//! receiver is gone, sends are silently dropped and the job keeps running.

use reel_models::ExportEvent;
use tokio::sync::mpsc;

/// Create a connected sender/receiver pair.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx: Some(tx) }, ProgressReceiver { rx })
}

/// Sending half, owned by the executor.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ExportEvent>>,
}

impl ProgressSender {
    /// A sender with no consumer, for jobs that are only polled.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Push an event. Never blocks and never fails.
    pub fn send(&self, event: ExportEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Whether a consumer is still listening.
    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Receiving half, owned by the live consumer.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ExportEvent>,
}

impl ProgressReceiver {
    /// Next event; `None` once the job's terminal event has been taken and
    /// the executor has finished.
    pub async fn recv(&mut self) -> Option<ExportEvent> {
        self.rx.recv().await
    }

    /// Drain every remaining event until the executor finishes.
    pub async fn collect(mut self) -> Vec<ExportEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
