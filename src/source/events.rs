//! Cancellable event subscription.
//!
//! A background task owns the bus connection and forwards events for the
//! monitored process into a channel. Dropping or closing the subscription
//! aborts the task, so shutdown unsubscribes deterministically.

use std::sync::Arc;
use std::time::Duration;

use pm2watch_types::ProcessEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::EventSource;

/// A live subscription to the supervisor's lifecycle events.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: mpsc::Receiver<ProcessEvent>,
    task: JoinHandle<()>,
}

impl EventSubscription {
    /// Subscribe to events for `process_name`, reconnecting after
    /// `retry_delay` whenever the stream ends or cannot be opened.
    pub fn spawn(
        source: Arc<dyn EventSource>,
        process_name: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let process_name = process_name.into();

        let task = tokio::spawn(async move {
            loop {
                match source.connect().await {
                    Ok(mut stream) => {
                        info!(process = %process_name, "Subscribed to supervisor events");
                        loop {
                            match stream.next_event().await {
                                Ok(Some(event)) if event.is_for(&process_name) => {
                                    if tx.send(event).await.is_err() {
                                        // Receiver dropped
                                        return;
                                    }
                                }
                                Ok(Some(event)) => {
                                    trace!(process = %event.process, event = %event.event, "Ignoring event for other process");
                                }
                                Ok(None) => {
                                    warn!("Supervisor event stream closed");
                                    break;
                                }
                                Err(e) => {
                                    warn!(error = %e, "Supervisor event stream failed");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Could not subscribe to supervisor events");
                    }
                }

                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(retry_delay).await;
            }
        });

        Self { receiver: rx, task }
    }

    /// Wait for the next event. `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.receiver.recv().await
    }

    /// Stop the background task. Buffered events are discarded.
    pub fn close(&mut self) {
        self.task.abort();
        self.receiver.close();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
