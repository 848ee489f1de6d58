//! Lifecycle events pushed by the supervisor's event bus.

use std::fmt;

/// A supervisor-confirmed lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LifecycleEvent {
    Started,
    Stopped,
    Restarted,
    Errored,
    Online,
    Exited,
}

impl LifecycleEvent {
    /// Map a PM2 `process:event` name to a lifecycle event.
    ///
    /// Returns `None` for bus events that carry no status transition
    /// (`delete`, `restart overlimit`, ...).
    pub fn from_pm2(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(LifecycleEvent::Started),
            "stop" => Some(LifecycleEvent::Stopped),
            "restart" => Some(LifecycleEvent::Restarted),
            "exit" => Some(LifecycleEvent::Exited),
            "online" => Some(LifecycleEvent::Online),
            "error" | "errored" | "exception" => Some(LifecycleEvent::Errored),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Started => "started",
            LifecycleEvent::Stopped => "stopped",
            LifecycleEvent::Restarted => "restarted",
            LifecycleEvent::Errored => "errored",
            LifecycleEvent::Online => "online",
            LifecycleEvent::Exited => "exited",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event together with the process it concerns.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessEvent {
    pub event: LifecycleEvent,
    /// Name of the process the event was emitted for.
    pub process: String,
    /// Error message carried by `Errored` events, if the bus supplied one.
    pub detail: Option<String>,
    /// Supervisor timestamp of the event (Unix milliseconds).
    pub at_ms: Option<u64>,
}

impl ProcessEvent {
    pub fn new(event: LifecycleEvent, process: impl Into<String>) -> Self {
        Self {
            event,
            process: process.into(),
            detail: None,
            at_ms: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// True if this event concerns the named process.
    pub fn is_for(&self, process_name: &str) -> bool {
        self.process == process_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pm2_maps_transitions() {
        assert_eq!(LifecycleEvent::from_pm2("start"), Some(LifecycleEvent::Started));
        assert_eq!(LifecycleEvent::from_pm2("stop"), Some(LifecycleEvent::Stopped));
        assert_eq!(
            LifecycleEvent::from_pm2("restart"),
            Some(LifecycleEvent::Restarted)
        );
        assert_eq!(LifecycleEvent::from_pm2("exit"), Some(LifecycleEvent::Exited));
        assert_eq!(LifecycleEvent::from_pm2("online"), Some(LifecycleEvent::Online));
        assert_eq!(
            LifecycleEvent::from_pm2("exception"),
            Some(LifecycleEvent::Errored)
        );
    }

    #[test]
    fn test_from_pm2_ignores_non_transitions() {
        assert_eq!(LifecycleEvent::from_pm2("delete"), None);
        assert_eq!(LifecycleEvent::from_pm2("restart overlimit"), None);
    }

    #[test]
    fn test_is_for() {
        let event = ProcessEvent::new(LifecycleEvent::Stopped, "api");
        assert!(event.is_for("api"));
        assert!(!event.is_for("api-worker"));
    }
}
