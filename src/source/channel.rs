//! Channel-based event source.
//!
//! Lets an embedding application (or a test) push lifecycle events into the
//! engine without a running supervisor.

use async_trait::async_trait;
use parking_lot::Mutex;
use pm2watch_types::ProcessEvent;
use tokio::sync::mpsc;

use super::{EventSource, EventStream};
use crate::error::SourceError;

/// An event source fed through an mpsc channel.
///
/// The channel can be connected once; later connects fail as if the bus
/// were unreachable.
///
/// # Example
///
/// ```
/// use pm2watch::source::ChannelEventSource;
///
/// let (tx, source) = ChannelEventSource::create(16);
/// ```
#[derive(Debug)]
pub struct ChannelEventSource {
    receiver: Mutex<Option<mpsc::Receiver<ProcessEvent>>>,
}

impl ChannelEventSource {
    pub fn new(receiver: mpsc::Receiver<ProcessEvent>) -> Self {
        Self {
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Create a sender and the source it feeds.
    pub fn create(capacity: usize) -> (mpsc::Sender<ProcessEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn connect(&self) -> Result<Box<dyn EventStream>, SourceError> {
        match self.receiver.lock().take() {
            Some(receiver) => Ok(Box::new(ChannelStream { receiver })),
            None => Err(SourceError::Connection(
                "event channel already consumed".to_string(),
            )),
        }
    }
}

struct ChannelStream {
    receiver: mpsc::Receiver<ProcessEvent>,
}

#[async_trait]
impl EventStream for ChannelStream {
    async fn next_event(&mut self) -> Result<Option<ProcessEvent>, SourceError> {
        Ok(self.receiver.recv().await)
    }
}
