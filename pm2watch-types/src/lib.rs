//! # pm2watch-types
//!
//! Core types shared by the pm2watch engine and its adapters. This crate
//! defines what a point-in-time read of a supervised process looks like,
//! what a detected transition looks like, and the shape of the rendered
//! notification document handed to a delivery endpoint.
//!
//! ## Features
//!
//! - `serde`: JSON serialization via serde. The document types serialize to
//!   the Discord embed shape (`title`, `description`, `color`, `fields`,
//!   `timestamp`).
//!
//! ## Example
//!
//! ```rust
//! use pm2watch_types::{ProcessSnapshot, ProcessStatus};
//!
//! let snapshot = ProcessSnapshot::builder("api")
//!     .status(ProcessStatus::Online)
//!     .started_at_ms(1_700_000_000_000)
//!     .observed_at_ms(1_700_000_125_000)
//!     .pid(4242)
//!     .build();
//!
//! assert_eq!(snapshot.uptime().as_secs(), 125);
//! assert!(!snapshot.status.is_critical());
//! ```

mod document;
mod event;
mod snapshot;
mod state;
mod status;

pub use document::*;
pub use event::*;
pub use snapshot::*;
pub use state::*;
pub use status::*;

/// Current configuration and diagnostics schema version.
///
/// Bump this when the shape of the resolved settings or the diagnostics
/// payload changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;
