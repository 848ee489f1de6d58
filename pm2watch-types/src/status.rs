//! Process status domain.

use std::fmt;

/// Status of the supervised process as last reported by the supervisor.
///
/// `Unknown` is the initial tracked status before the first observation and
/// the fallback for supervisor states this crate does not recognise.
/// `NotFound` is synthesized when the supervisor has no process with the
/// configured name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ProcessStatus {
    Online,
    Launching,
    Restarting,
    Stopping,
    Stopped,
    Errored,
    Unknown,
    NotFound,
}

impl ProcessStatus {
    /// All statuses, in declaration order.
    pub const ALL: [ProcessStatus; 8] = [
        ProcessStatus::Online,
        ProcessStatus::Launching,
        ProcessStatus::Restarting,
        ProcessStatus::Stopping,
        ProcessStatus::Stopped,
        ProcessStatus::Errored,
        ProcessStatus::Unknown,
        ProcessStatus::NotFound,
    ];

    /// Map a raw PM2 `pm2_env.status` string to a status.
    ///
    /// PM2 reports `waiting restart` and `one-launch-status` while a process
    /// is cycling; both are treated as restarting.
    pub fn from_pm2(raw: &str) -> Self {
        match raw.trim() {
            "online" => ProcessStatus::Online,
            "launching" => ProcessStatus::Launching,
            "restarting" | "waiting restart" | "one-launch-status" => ProcessStatus::Restarting,
            "stopping" => ProcessStatus::Stopping,
            "stopped" => ProcessStatus::Stopped,
            "errored" => ProcessStatus::Errored,
            "not-found" => ProcessStatus::NotFound,
            _ => ProcessStatus::Unknown,
        }
    }

    /// Canonical lowercase name, as used in logs and template keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Online => "online",
            ProcessStatus::Launching => "launching",
            ProcessStatus::Restarting => "restarting",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Errored => "errored",
            ProcessStatus::Unknown => "unknown",
            ProcessStatus::NotFound => "not-found",
        }
    }

    /// Critical statuses always get through the `critical_only` filter.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Errored | ProcessStatus::Stopped | ProcessStatus::NotFound
        )
    }

    /// Numeric gauge value used by the Prometheus exposition.
    pub fn gauge(&self) -> u8 {
        match self {
            ProcessStatus::Online => 1,
            ProcessStatus::Launching => 2,
            ProcessStatus::Restarting => 3,
            ProcessStatus::Stopping => 4,
            ProcessStatus::Stopped => 5,
            ProcessStatus::Errored => 6,
            ProcessStatus::NotFound => 7,
            ProcessStatus::Unknown => 0,
        }
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus::Unknown
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
