//! PM2-backed sources.

use std::path::PathBuf;

use async_trait::async_trait;
use pm2watch_adapters::pm2::Pm2Client;
use pm2watch_types::{ProcessEvent, ProcessSnapshot};

use super::{EventSource, EventStream, SnapshotSource};
use crate::error::SourceError;

#[async_trait]
impl SnapshotSource for Pm2Client {
    async fn fetch_snapshot(&self, process_name: &str) -> Result<ProcessSnapshot, SourceError> {
        Ok(self.snapshot(process_name).await?)
    }
}

/// Connects to the PM2 daemon's publish socket.
#[derive(Debug, Clone)]
pub struct Pm2EventSource {
    socket_path: PathBuf,
}

impl Pm2EventSource {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }
}

#[cfg(unix)]
#[async_trait]
impl EventSource for Pm2EventSource {
    async fn connect(&self) -> Result<Box<dyn EventStream>, SourceError> {
        let bus = pm2watch_adapters::bus::Pm2Bus::connect(&self.socket_path).await?;
        Ok(Box::new(bus))
    }
}

#[cfg(not(unix))]
#[async_trait]
impl EventSource for Pm2EventSource {
    async fn connect(&self) -> Result<Box<dyn EventStream>, SourceError> {
        Err(SourceError::Connection(format!(
            "{}: the PM2 event bus needs Unix sockets",
            self.socket_path.display()
        )))
    }
}

#[async_trait]
impl<R> EventStream for pm2watch_adapters::bus::Pm2Bus<R>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<ProcessEvent>, SourceError> {
        Ok(pm2watch_adapters::bus::Pm2Bus::next_event(self).await?)
    }
}
