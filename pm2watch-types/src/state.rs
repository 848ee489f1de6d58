//! Tracked monitor state and the values derived from it on every observation.

use std::collections::BTreeSet;

use crate::ProcessStatus;

/// Last-known view of the monitored process.
///
/// One instance per monitored process, created with `last_status = Unknown`.
/// `restart_count` is counted locally from observed start-time changes and
/// only ever increases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorState {
    pub last_status: ProcessStatus,
    pub last_started_at_ms: Option<u64>,
    pub restart_count: u64,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of comparing one observation against the tracked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionDiff {
    pub status_changed: bool,
    pub restart_detected: bool,
    pub previous_status: ProcessStatus,
    pub current_status: ProcessStatus,
    /// Local restart count including this observation.
    pub restart_count: u64,
}

impl TransitionDiff {
    /// True if either the status or the process incarnation changed.
    pub fn has_changes(&self) -> bool {
        self.status_changed || self.restart_detected
    }

    /// True if the process came back online from a critical status.
    pub fn is_recovery(&self) -> bool {
        self.status_changed
            && self.current_status == ProcessStatus::Online
            && self.previous_status.is_critical()
    }
}

/// How urgently a notification should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Urgency {
    /// Event-driven or change-driven.
    Immediate,
    /// Routine scheduled update.
    Regular,
}

/// Why a notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ReasonTag {
    StatusChanged,
    RestartDetected,
    Critical,
    Error,
}

/// Outcome of the notification policy for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NotificationDecision {
    pub should_send: bool,
    pub urgency: Urgency,
    pub reasons: BTreeSet<ReasonTag>,
}

impl NotificationDecision {
    /// A decision not to send anything.
    pub fn suppress(urgency: Urgency) -> Self {
        Self {
            should_send: false,
            urgency,
            reasons: BTreeSet::new(),
        }
    }

    pub fn has_reason(&self, tag: ReasonTag) -> bool {
        self.reasons.contains(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(prev: ProcessStatus, cur: ProcessStatus, changed: bool) -> TransitionDiff {
        TransitionDiff {
            status_changed: changed,
            restart_detected: false,
            previous_status: prev,
            current_status: cur,
            restart_count: 0,
        }
    }

    #[test]
    fn test_new_state_is_unknown() {
        let state = MonitorState::new();
        assert_eq!(state.last_status, ProcessStatus::Unknown);
        assert_eq!(state.last_started_at_ms, None);
        assert_eq!(state.restart_count, 0);
    }

    #[test]
    fn test_recovery_requires_critical_previous_status() {
        assert!(diff(ProcessStatus::Errored, ProcessStatus::Online, true).is_recovery());
        assert!(diff(ProcessStatus::NotFound, ProcessStatus::Online, true).is_recovery());
        assert!(!diff(ProcessStatus::Launching, ProcessStatus::Online, true).is_recovery());
        assert!(!diff(ProcessStatus::Online, ProcessStatus::Online, false).is_recovery());
    }

    #[test]
    fn test_suppress_has_no_reasons() {
        let decision = NotificationDecision::suppress(Urgency::Regular);
        assert!(!decision.should_send);
        assert!(decision.reasons.is_empty());
    }
}
