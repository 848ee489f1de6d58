//! The monitoring and notification engine.
//!
//! ```text
//!  quick timer ──┐
//! regular timer ─┼─▶ fetch ─▶ diff ─▶ policy ─▶ render ─▶ deliver
//! pushed events ─┘   (source) (tracker)                   (sink)
//! ```
//!
//! All three triggers funnel into one pipeline that runs under a single
//! lock, so diff and state update form one atomic step.

pub mod policy;
pub mod retry;
pub mod scheduler;
pub mod tracker;

pub use policy::{Category, NotificationPolicy, Trigger};
pub use retry::RetryPolicy;
pub use scheduler::{CycleReport, Monitor, MonitorBuilder};
pub use tracker::{Observation, StateTracker};
