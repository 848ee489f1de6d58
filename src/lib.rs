//! # pm2watch
//!
//! Watches one PM2-managed process and keeps a Discord status message up to
//! date.
//!
//! Three triggers feed one pipeline. A quick timer catches changes early, a
//! regular timer refreshes the message, and PM2 bus events report lifecycle
//! changes as they happen:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                             Monitor                               │
//! │  ┌──────────┐   ┌─────────┐   ┌────────┐   ┌──────────┐   ┌──────┐ │
//! │  │  source  │──▶│ tracker │──▶│ policy │──▶│  render  │──▶│ sink │ │
//! │  │  (pm2)   │   │ (state) │   │        │   │ (embeds) │   │      │ │
//! │  └──────────┘   └─────────┘   └────────┘   └──────────┘   └──────┘ │
//! │       ▲                                                           │
//! │  quick timer | regular timer | PM2 bus events                     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: where snapshots and lifecycle events come from
//! - **[`engine`]**: state tracking, notification policy, retries, scheduling
//! - **[`render`]**: embed templates and the document renderer
//! - **[`sink`]**: where rendered documents go
//! - **[`diagnostics`]**: read-only view of the engine, optionally over HTTP
//!
//! ## Usage
//!
//! ```no_run
//! use pm2watch::{Monitor, Settings};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(None)?;
//! settings.validate()?;
//!
//! let monitor = Monitor::from_settings(&settings)?;
//! monitor.start().await;
//! // ... until shutdown
//! monitor.stop().await;
//! # Ok::<_, anyhow::Error>(())
//! # });
//! ```
//!
//! Any [`SnapshotSource`] and [`DeliverySink`] can be plugged in through
//! [`Monitor::builder`].

pub mod config;
pub mod diagnostics;
pub mod duration;
pub mod engine;
pub mod error;
pub mod logging;
pub mod render;
pub mod sink;
pub mod source;

pub use config::{ConfigError, Settings};
pub use diagnostics::{Diagnostics, DiagnosticsHandle, DiagnosticsServer};
pub use engine::{CycleReport, Monitor, MonitorBuilder, NotificationPolicy, RetryPolicy, Trigger};
pub use error::{DeliveryError, EngineError, SourceError, TemplateError};
pub use render::{RenderContext, Renderer, TemplateKey, TemplateSet};
pub use sink::DeliverySink;
pub use source::{ChannelEventSource, EventSource, EventStream, EventSubscription, SnapshotSource};

pub use pm2watch_types::{
    LifecycleEvent, MonitorState, NotificationDecision, NotificationDocument, ProcessEvent,
    ProcessSnapshot, ProcessStatus, TransitionDiff, Urgency,
};
