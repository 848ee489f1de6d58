//! Notification policy: decides whether an observation is worth a message.

use std::collections::BTreeSet;
use std::fmt;

use pm2watch_types::{
    LifecycleEvent, NotificationDecision, ProcessStatus, ReasonTag, TransitionDiff, Urgency,
};

use crate::config::{NotificationSettings, Settings};

/// What caused the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Short-period change detection.
    ScheduledQuick,
    /// Long-period full update.
    ScheduledRegular,
    /// A lifecycle event pushed by the supervisor.
    PushedEvent(LifecycleEvent),
}

impl Trigger {
    pub fn is_scheduled(&self) -> bool {
        !matches!(self, Trigger::PushedEvent(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::ScheduledQuick => "quick",
            Trigger::ScheduledRegular => "regular",
            Trigger::PushedEvent(_) => "event",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::PushedEvent(event) => write!(f, "event:{}", event),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A transition category with its own enable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Online,
    Offline,
    Error,
    Restart,
    Stop,
    Start,
    Exit,
}

impl Category {
    /// Category of a scheduled observation. `Unknown` has none and is never gated.
    pub fn from_diff(diff: &TransitionDiff) -> Option<Self> {
        if diff.restart_detected {
            return Some(Category::Restart);
        }
        match diff.current_status {
            ProcessStatus::Online => Some(Category::Online),
            ProcessStatus::Stopping | ProcessStatus::Stopped => Some(Category::Offline),
            ProcessStatus::Errored | ProcessStatus::NotFound => Some(Category::Error),
            ProcessStatus::Launching => Some(Category::Start),
            ProcessStatus::Restarting => Some(Category::Restart),
            ProcessStatus::Unknown => None,
        }
    }

    pub fn from_event(event: LifecycleEvent) -> Self {
        match event {
            LifecycleEvent::Started => Category::Start,
            LifecycleEvent::Stopped => Category::Stop,
            LifecycleEvent::Restarted => Category::Restart,
            LifecycleEvent::Errored => Category::Error,
            LifecycleEvent::Online => Category::Online,
            LifecycleEvent::Exited => Category::Exit,
        }
    }
}

/// Applies the configured notification rules to a diff.
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    rules: NotificationSettings,
    immediate_enabled: bool,
}

impl NotificationPolicy {
    pub fn new(rules: NotificationSettings, immediate_enabled: bool) -> Self {
        Self {
            rules,
            immediate_enabled,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.notifications.clone(),
            settings.monitoring.enable_immediate_notifications,
        )
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        let flags = &self.rules.status_changes;
        if !flags.enabled {
            return false;
        }
        match category {
            Category::Online => flags.notify_on_online,
            Category::Offline => flags.notify_on_offline,
            Category::Error => flags.notify_on_error,
            Category::Restart => flags.notify_on_restart,
            Category::Stop => flags.notify_on_stop,
            Category::Start => flags.notify_on_start,
            Category::Exit => flags.notify_on_exit,
        }
    }

    /// Decide whether `diff`, produced by `trigger`, should be delivered.
    pub fn decide(&self, diff: &TransitionDiff, trigger: Trigger) -> NotificationDecision {
        let urgency = match trigger {
            Trigger::PushedEvent(_) => Urgency::Immediate,
            Trigger::ScheduledQuick if diff.has_changes() => Urgency::Immediate,
            _ => Urgency::Regular,
        };

        let category = match trigger {
            Trigger::PushedEvent(event) => Some(Category::from_event(event)),
            _ => Category::from_diff(diff),
        };
        if let Some(category) = category {
            if !self.is_enabled(category) {
                return NotificationDecision::suppress(urgency);
            }
        }

        match trigger {
            Trigger::PushedEvent(_) => {
                if !self.immediate_enabled {
                    return NotificationDecision::suppress(urgency);
                }
            }
            Trigger::ScheduledQuick | Trigger::ScheduledRegular => {
                // The quick cadence only exists to catch changes early.
                if trigger == Trigger::ScheduledQuick && !diff.has_changes() {
                    return NotificationDecision::suppress(urgency);
                }
                if self.rules.regular_updates.only_on_changes && !diff.has_changes() {
                    return NotificationDecision::suppress(urgency);
                }
                if self.rules.critical_only
                    && !diff.status_changed
                    && !diff.current_status.is_critical()
                {
                    return NotificationDecision::suppress(urgency);
                }
            }
        }

        NotificationDecision {
            should_send: true,
            urgency,
            reasons: reasons(diff, trigger),
        }
    }
}

fn reasons(diff: &TransitionDiff, trigger: Trigger) -> BTreeSet<ReasonTag> {
    let mut tags = BTreeSet::new();
    if diff.status_changed {
        tags.insert(ReasonTag::StatusChanged);
    }
    if diff.restart_detected {
        tags.insert(ReasonTag::RestartDetected);
    }
    if diff.current_status.is_critical() {
        tags.insert(ReasonTag::Critical);
    }
    if matches!(
        diff.current_status,
        ProcessStatus::Errored | ProcessStatus::NotFound
    ) || trigger == Trigger::PushedEvent(LifecycleEvent::Errored)
    {
        tags.insert(ReasonTag::Error);
    }
    tags
}
