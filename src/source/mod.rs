//! Process snapshot sources.
//!
//! The engine reads the supervisor through two narrow traits:
//!
//! - [`SnapshotSource`] answers "what is the process doing right now?"
//!   Every call re-establishes its own connection to the supervisor.
//! - [`EventSource`] opens a stream of pushed [`ProcessEvent`]s. Streams are
//!   not restartable; [`EventSubscription`] reconnects when one ends.

mod channel;
mod events;
mod pm2;

pub use channel::ChannelEventSource;
pub use events::EventSubscription;
pub use pm2::Pm2EventSource;

use std::fmt::Debug;

use async_trait::async_trait;
use pm2watch_types::{ProcessEvent, ProcessSnapshot};

use crate::error::SourceError;

/// Point-in-time reads of one named process.
#[async_trait]
pub trait SnapshotSource: Send + Sync + Debug {
    /// Describe `process_name`.
    ///
    /// Fails with [`SourceError::NotFound`] when the supervisor has no such
    /// process and [`SourceError::Connection`] when it cannot be reached.
    async fn fetch_snapshot(&self, process_name: &str) -> Result<ProcessSnapshot, SourceError>;
}

/// Opens streams of lifecycle events pushed by the supervisor.
#[async_trait]
pub trait EventSource: Send + Sync + Debug {
    /// Open a new stream. Events for every process are delivered.
    async fn connect(&self) -> Result<Box<dyn EventStream>, SourceError>;
}

/// One connection to the supervisor's event bus.
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `Ok(None)` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<ProcessEvent>, SourceError>;
}
