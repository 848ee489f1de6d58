//! State tracker: compares each observation with the last-known state.

use pm2watch_types::{MonitorState, ProcessSnapshot, ProcessStatus, TransitionDiff};

/// One read of the process from the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// The supervisor described the process.
    Snapshot(ProcessSnapshot),
    /// The supervisor does not know a process by this name.
    NotFound(String),
}

impl Observation {
    pub fn status(&self) -> ProcessStatus {
        match self {
            Observation::Snapshot(snapshot) => snapshot.status,
            Observation::NotFound(_) => ProcessStatus::NotFound,
        }
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        match self {
            Observation::Snapshot(snapshot) => snapshot.started_at_ms,
            Observation::NotFound(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&ProcessSnapshot> {
        match self {
            Observation::Snapshot(snapshot) => Some(snapshot),
            Observation::NotFound(_) => None,
        }
    }
}

impl From<ProcessSnapshot> for Observation {
    fn from(snapshot: ProcessSnapshot) -> Self {
        Observation::Snapshot(snapshot)
    }
}

/// Owns the [`MonitorState`] of one monitored process.
///
/// Diffing is split into [`peek`](Self::peek), which has no side effects,
/// and [`commit`](Self::commit), which records the observation. Callers that
/// hold the tracker exclusively for the whole peek/commit sequence get an
/// atomic diff-and-update. [`diff`](Self::diff) does both at once.
#[derive(Debug, Default)]
pub struct StateTracker {
    state: MonitorState,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Compare `observation` with the tracked state without recording it.
    pub fn peek(&self, observation: &Observation) -> TransitionDiff {
        let previous = self.state.last_status;
        let current = observation.status();

        let status_changed = match current {
            // Absence is always news unless it was already known.
            ProcessStatus::NotFound => previous != ProcessStatus::NotFound,
            _ => previous != ProcessStatus::Unknown && previous != current,
        };

        let restart_detected = match (self.state.last_started_at_ms, observation.started_at_ms()) {
            (Some(last), Some(new)) => last != new,
            _ => false,
        };

        let restart_count = if restart_detected {
            self.state.restart_count + 1
        } else {
            self.state.restart_count
        };

        TransitionDiff {
            status_changed,
            restart_detected,
            previous_status: previous,
            current_status: current,
            restart_count,
        }
    }

    /// Record `observation` as the last-known state.
    ///
    /// `diff` must be the result of [`peek`](Self::peek) for the same
    /// observation against the current state.
    pub fn commit(&mut self, observation: &Observation, diff: &TransitionDiff) {
        if diff.restart_detected {
            self.state.restart_count += 1;
        }
        self.state.last_status = observation.status();
        self.state.last_started_at_ms = observation.started_at_ms();
    }

    /// Diff and record in one step.
    pub fn diff(&mut self, observation: &Observation) -> TransitionDiff {
        let diff = self.peek(observation);
        self.commit(observation, &diff);
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(started: u64) -> Observation {
        ProcessSnapshot::builder("api")
            .status(ProcessStatus::Online)
            .started_at_ms(started)
            .observed_at_ms(started + 1_000)
            .build()
            .into()
    }

    fn with_status(status: ProcessStatus) -> Observation {
        ProcessSnapshot::builder("api")
            .status(status)
            .observed_at_ms(1)
            .build()
            .into()
    }

    #[test]
    fn test_first_observation_is_not_a_change() {
        let mut tracker = StateTracker::new();
        let diff = tracker.diff(&online(1_000));

        assert!(!diff.status_changed);
        assert!(!diff.restart_detected);
        assert_eq!(diff.previous_status, ProcessStatus::Unknown);
        assert_eq!(tracker.state().last_status, ProcessStatus::Online);
        assert_eq!(tracker.state().last_started_at_ms, Some(1_000));
    }

    #[test]
    fn test_repeated_snapshot_has_no_changes() {
        let mut tracker = StateTracker::new();
        tracker.diff(&online(1_000));

        for _ in 0..2 {
            let diff = tracker.diff(&online(1_000));
            assert!(!diff.status_changed);
            assert!(!diff.restart_detected);
        }
        assert_eq!(tracker.state().restart_count, 0);
    }

    #[test]
    fn test_status_change() {
        let mut tracker = StateTracker::new();
        tracker.diff(&online(1_000));

        let diff = tracker.diff(&with_status(ProcessStatus::Errored));
        assert!(diff.status_changed);
        assert_eq!(diff.previous_status, ProcessStatus::Online);
        assert_eq!(diff.current_status, ProcessStatus::Errored);
    }

    #[test]
    fn test_restart_detected_once_per_start_time() {
        let mut tracker = StateTracker::new();
        tracker.diff(&online(1_000));

        let diff = tracker.diff(&online(2_000));
        assert!(diff.restart_detected);
        assert!(!diff.status_changed);
        assert_eq!(diff.restart_count, 1);

        let diff = tracker.diff(&online(2_000));
        assert!(!diff.restart_detected);
        assert_eq!(tracker.state().restart_count, 1);
    }

    #[test]
    fn test_missing_start_time_is_not_a_restart() {
        let mut tracker = StateTracker::new();
        tracker.diff(&online(1_000));
        let diff = tracker.diff(&with_status(ProcessStatus::Stopped));
        assert!(!diff.restart_detected);

        // The previous start time is forgotten, so coming back is not a restart either.
        let diff = tracker.diff(&online(5_000));
        assert!(!diff.restart_detected);
        assert_eq!(tracker.state().restart_count, 0);
    }

    #[test]
    fn test_not_found_from_unknown_is_a_change() {
        let mut tracker = StateTracker::new();
        let diff = tracker.diff(&Observation::NotFound("api".into()));
        assert!(diff.status_changed);
        assert_eq!(diff.current_status, ProcessStatus::NotFound);

        let diff = tracker.diff(&Observation::NotFound("api".into()));
        assert!(!diff.status_changed);
        assert_eq!(tracker.state().last_started_at_ms, None);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut tracker = StateTracker::new();
        tracker.diff(&online(1_000));

        let observation = online(2_000);
        let first = tracker.peek(&observation);
        let second = tracker.peek(&observation);
        assert_eq!(first, second);
        assert_eq!(tracker.state().restart_count, 0);

        tracker.commit(&observation, &first);
        assert_eq!(tracker.state().restart_count, 1);
    }

    #[test]
    fn test_restart_count_is_monotonic() {
        let mut tracker = StateTracker::new();
        let starts = [1_000, 1_000, 2_000, 2_000, 3_000, 4_000, 4_000];
        let mut last = 0;
        for start in starts {
            tracker.diff(&online(start));
            let count = tracker.state().restart_count;
            assert!(count >= last);
            last = count;
        }
        assert_eq!(last, 3);
    }
}
