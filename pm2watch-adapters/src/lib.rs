//! # pm2watch-adapters
//!
//! Adapters for the external systems pm2watch talks to.
//!
//! ## Supported Systems
//!
//! - **PM2 queries** (`pm2` feature) - describes a process by running
//!   `pm2 jlist` and converting the matching entry to a
//!   [`ProcessSnapshot`](pm2watch_types::ProcessSnapshot)
//! - **PM2 event bus** (`pm2` feature) - subscribes to the daemon's
//!   `pub.sock` and decodes `process:event` / `process:exception` messages
//! - **Discord-compatible webhooks** (`discord` feature) - edits a stored
//!   message in place, or sends a new one
//!
//! ## Quick Start (PM2)
//!
//! ```rust,no_run
//! use pm2watch_adapters::pm2::Pm2Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Pm2Client::builder().binary("pm2").build();
//!
//!     let snapshot = client.snapshot("api").await?;
//!     println!("api is {}", snapshot.status);
//!     Ok(())
//! }
//! ```

pub mod error;

#[cfg(feature = "pm2")]
pub mod pm2;

#[cfg(feature = "pm2")]
pub mod bus;

#[cfg(feature = "discord")]
pub mod discord;

pub use error::AdapterError;

// Re-export types for convenience
pub use pm2watch_types::{NotificationDocument, ProcessEvent, ProcessSnapshot, ProcessStatus};
