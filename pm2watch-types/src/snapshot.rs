//! ProcessSnapshot - a point-in-time read of one supervised process.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ProcessStatus;

/// An immutable point-in-time read of a process's status and metadata.
///
/// Snapshots are produced by a snapshot source on every poll or pushed
/// event and never mutated afterwards. Timestamps are Unix milliseconds.
///
/// `restart_count` is the supervisor's own counter. It may reset when the
/// process is deleted and re-added, so the engine keeps its own count in
/// [`MonitorState`](crate::MonitorState).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessSnapshot {
    /// Process name as registered with the supervisor.
    pub name: String,

    /// Current status.
    pub status: ProcessStatus,

    /// When the current incarnation of the process started.
    pub started_at_ms: Option<u64>,

    /// When this snapshot was taken.
    pub observed_at_ms: u64,

    /// OS process id, absent while the process is not running.
    pub pid: Option<u32>,

    /// Resident memory in bytes.
    pub memory_bytes: u64,

    /// CPU usage in percent of one core.
    pub cpu_percent: f64,

    /// Restart counter reported by the supervisor.
    pub restart_count: u64,
}

impl ProcessSnapshot {
    /// Create a builder for constructing snapshots.
    pub fn builder(name: impl Into<String>) -> ProcessSnapshotBuilder {
        ProcessSnapshotBuilder::new(name)
    }

    /// Time since the current incarnation started, zero if unknown.
    pub fn uptime(&self) -> Duration {
        match self.started_at_ms {
            Some(started) => Duration::from_millis(self.observed_at_ms.saturating_sub(started)),
            None => Duration::ZERO,
        }
    }

    /// Uptime in whole milliseconds.
    pub fn uptime_ms(&self) -> u64 {
        self.uptime().as_millis() as u64
    }
}

/// Builder for constructing `ProcessSnapshot` instances.
#[derive(Debug)]
pub struct ProcessSnapshotBuilder {
    name: String,
    status: ProcessStatus,
    started_at_ms: Option<u64>,
    observed_at_ms: Option<u64>,
    pid: Option<u32>,
    memory_bytes: u64,
    cpu_percent: f64,
    restart_count: u64,
}

impl ProcessSnapshotBuilder {
    /// Create a new builder. Status defaults to `Unknown`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProcessStatus::Unknown,
            started_at_ms: None,
            observed_at_ms: None,
            pid: None,
            memory_bytes: 0,
            cpu_percent: 0.0,
            restart_count: 0,
        }
    }

    pub fn status(mut self, status: ProcessStatus) -> Self {
        self.status = status;
        self
    }

    pub fn started_at_ms(mut self, ts: u64) -> Self {
        self.started_at_ms = Some(ts);
        self
    }

    /// Set the observation time. Defaults to now.
    pub fn observed_at_ms(mut self, ts: u64) -> Self {
        self.observed_at_ms = Some(ts);
        self
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn cpu_percent(mut self, cpu: f64) -> Self {
        self.cpu_percent = cpu;
        self
    }

    pub fn restart_count(mut self, count: u64) -> Self {
        self.restart_count = count;
        self
    }

    /// Build the snapshot.
    pub fn build(self) -> ProcessSnapshot {
        ProcessSnapshot {
            name: self.name,
            status: self.status,
            started_at_ms: self.started_at_ms,
            observed_at_ms: self.observed_at_ms.unwrap_or_else(current_timestamp_ms),
            pid: self.pid,
            memory_bytes: self.memory_bytes,
            cpu_percent: self.cpu_percent,
            restart_count: self.restart_count,
        }
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builder() {
        let snapshot = ProcessSnapshot::builder("worker")
            .status(ProcessStatus::Online)
            .started_at_ms(1_000)
            .observed_at_ms(126_000)
            .pid(99)
            .memory_bytes(64 * 1024 * 1024)
            .cpu_percent(2.5)
            .restart_count(4)
            .build();

        assert_eq!(snapshot.name, "worker");
        assert_eq!(snapshot.uptime_ms(), 125_000);
        assert_eq!(snapshot.pid, Some(99));
        assert_eq!(snapshot.restart_count, 4);
    }

    #[test]
    fn test_uptime_without_start_is_zero() {
        let snapshot = ProcessSnapshot::builder("worker")
            .status(ProcessStatus::Stopped)
            .observed_at_ms(5_000)
            .build();
        assert_eq!(snapshot.uptime(), Duration::ZERO);
    }

    #[test]
    fn test_uptime_saturates_on_clock_skew() {
        let snapshot = ProcessSnapshot::builder("worker")
            .started_at_ms(10_000)
            .observed_at_ms(9_000)
            .build();
        assert_eq!(snapshot.uptime(), Duration::ZERO);
    }

    #[test]
    fn test_observed_defaults_to_now() {
        let before = current_timestamp_ms();
        let snapshot = ProcessSnapshot::builder("worker").build();
        let after = current_timestamp_ms();
        assert!(snapshot.observed_at_ms >= before);
        assert!(snapshot.observed_at_ms <= after);
    }
}
