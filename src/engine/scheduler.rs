//! Scheduler: drives the quick timer, the regular timer and pushed events.
//!
//! Lifecycle is `stopped → running → stopped`. [`Monitor::start`] runs one
//! full update, then arms both timers and the event subscription in
//! background tasks. [`Monitor::stop`] signals every task, waits for the
//! in-flight cycle to finish and returns once no timer can fire again.
//!
//! Every cycle holds the tracker lock from fetch to commit. Regular updates
//! and pushed events commit the observation as soon as it is diffed; quick
//! checks commit only after they delivered a notification, so changes they
//! pass over are still new to the next regular update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pm2watch_adapters::bus::default_socket_path;
use pm2watch_adapters::discord::WebhookClient;
use pm2watch_adapters::pm2::Pm2Client;
use pm2watch_types::{
    current_timestamp_ms, LifecycleEvent, MonitorState, NotificationDecision, ProcessEvent,
    ProcessSnapshot, ProcessStatus, TransitionDiff,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::policy::{NotificationPolicy, Trigger};
use super::retry::RetryPolicy;
use super::tracker::{Observation, StateTracker};
use crate::config::{ConfigError, Settings};
use crate::diagnostics::{Diagnostics, DiagnosticsHandle};
use crate::error::{EngineError, SourceError};
use crate::render::{RenderContext, Renderer, TemplateSet};
use crate::sink::DeliverySink;
use crate::source::{EventSource, EventSubscription, Pm2EventSource, SnapshotSource};

/// What one pipeline run observed and decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub trigger: Trigger,
    pub diff: TransitionDiff,
    pub decision: NotificationDecision,
    pub delivered: bool,
}

/// Monitors one process and keeps its status message up to date.
#[derive(Debug)]
pub struct Monitor {
    pipeline: Arc<Pipeline>,
    events: Option<Arc<dyn EventSource>>,
    quick_interval: Option<Duration>,
    regular_interval: Option<Duration>,
    event_retry_delay: Duration,
    running: AtomicBool,
    control: Mutex<Option<Control>>,
}

#[derive(Debug)]
struct Control {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Create a new builder for configuring the monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    /// Wire the monitor to PM2 and the configured webhook.
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let monitoring = &settings.monitoring;

        let mut pm2 = Pm2Client::builder()
            .binary(&monitoring.pm2_binary)
            .timeout(monitoring.supervisor_timeout);
        if let Some(home) = &monitoring.pm2_home {
            pm2 = pm2.pm2_home(home);
        }

        let mut webhook = WebhookClient::builder()
            .webhook_url(&settings.discord.webhook_url)
            .timeout(settings.advanced.delivery_timeout);
        if let Some(id) = settings.message_id() {
            webhook = webhook.message_id(id);
        }
        if let Some(username) = &settings.discord.username {
            webhook = webhook.username(username);
        }
        if let Some(avatar_url) = &settings.discord.avatar_url {
            webhook = webhook.avatar_url(avatar_url);
        }

        let mut builder = Monitor::builder()
            .settings(settings)
            .source(Arc::new(pm2.build()))
            .sink(Arc::new(webhook.build()?))
            .renderer(Renderer::from_settings(settings)?);

        if monitoring.enable_event_listeners {
            match default_socket_path(monitoring.pm2_home.as_deref()) {
                Some(path) => builder = builder.events(Arc::new(Pm2EventSource::new(path))),
                None => warn!("Cannot locate PM2_HOME, event listener disabled"),
            }
        }

        builder.build()
    }

    pub fn process_name(&self) -> &str {
        &self.pipeline.process_name
    }

    /// Run one full update, then arm the timers and the event subscription.
    ///
    /// Calling `start` on a running monitor does nothing.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(process = %self.process_name(), "Monitor already running");
            return;
        }

        {
            let mut diag = self.pipeline.diagnostics.write();
            diag.is_running = true;
            diag.started_at_ms = Some(current_timestamp_ms());
        }
        info!(
            process = %self.process_name(),
            quick = ?self.quick_interval,
            regular = ?self.regular_interval,
            events = self.events.is_some(),
            "Starting monitor"
        );

        // Installed first so a stop() during the initial update is seen below.
        let (stop_tx, stop_rx) = watch::channel(false);
        *self.control.lock() = Some(Control {
            stop_tx,
            handles: Vec::new(),
        });

        let initial = Trigger::ScheduledRegular;
        if let Err(e) = self.pipeline.run(initial, None).await {
            report_failure(self.process_name(), initial, &e);
        }

        let mut control = self.control.lock();
        let Some(Control { handles, .. }) = control.as_mut() else {
            debug!(process = %self.process_name(), "Stopped during initial update");
            return;
        };

        if let Some(period) = self.quick_interval {
            handles.push(spawn_timer(
                self.pipeline.clone(),
                Trigger::ScheduledQuick,
                period,
                stop_rx.clone(),
            ));
        }
        if let Some(period) = self.regular_interval {
            handles.push(spawn_timer(
                self.pipeline.clone(),
                Trigger::ScheduledRegular,
                period,
                stop_rx.clone(),
            ));
        }
        if let Some(source) = &self.events {
            handles.push(spawn_event_loop(
                self.pipeline.clone(),
                source.clone(),
                self.event_retry_delay,
                stop_rx,
            ));
        }
    }

    /// Cancel the timers and the event subscription.
    ///
    /// Waits for an in-flight cycle to complete. No timer fires after this
    /// returns.
    pub async fn stop(&self) {
        let control = self.control.lock().take();
        if let Some(control) = control {
            let _ = control.stop_tx.send(true);
            for handle in control.handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!(process = %self.process_name(), "Monitor task panicked");
                    }
                }
            }
        }

        if self.running.swap(false, Ordering::SeqCst) {
            self.pipeline.diagnostics.write().is_running = false;
            info!(process = %self.process_name(), "Monitor stopped");
        }
    }

    /// Run the regular-cadence pipeline once.
    pub async fn run_regular_update(&self) -> Result<CycleReport, EngineError> {
        self.pipeline.run(Trigger::ScheduledRegular, None).await
    }

    /// Run the quick-cadence pipeline once.
    pub async fn run_quick_check(&self) -> Result<CycleReport, EngineError> {
        self.pipeline.run(Trigger::ScheduledQuick, None).await
    }

    /// Run the pipeline for a pushed event about the monitored process.
    pub async fn handle_event(&self, event: &ProcessEvent) -> Result<CycleReport, EngineError> {
        self.pipeline
            .run(Trigger::PushedEvent(event.event), Some(event))
            .await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.pipeline.diagnostics.read().clone()
    }

    /// Shared storage updated after every cycle, for the diagnostics server.
    pub fn diagnostics_handle(&self) -> DiagnosticsHandle {
        self.pipeline.diagnostics.clone()
    }

    pub fn state(&self) -> MonitorState {
        self.pipeline.diagnostics.read().state.clone()
    }

    pub fn last_status(&self) -> ProcessStatus {
        self.pipeline.diagnostics.read().state.last_status
    }

    pub fn restart_count(&self) -> u64 {
        self.pipeline.diagnostics.read().state.restart_count
    }
}

/// Builder for Monitor.
#[derive(Debug, Default)]
pub struct MonitorBuilder {
    settings: Option<Settings>,
    source: Option<Arc<dyn SnapshotSource>>,
    events: Option<Arc<dyn EventSource>>,
    sink: Option<Arc<dyn DeliverySink>>,
    renderer: Option<Renderer>,
}

impl MonitorBuilder {
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.settings = Some(settings.clone());
        self
    }

    pub fn source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Subscribe to pushed events from `events` while running.
    pub fn events(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the renderer (default: built-in templates).
    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<Monitor, EngineError> {
        let settings = self.settings.unwrap_or_default();
        let source = self
            .source
            .ok_or_else(|| ConfigError::Invalid("monitor needs a snapshot source".to_string()))?;
        let sink = self
            .sink
            .ok_or_else(|| ConfigError::Invalid("monitor needs a delivery sink".to_string()))?;
        let renderer = self
            .renderer
            .unwrap_or_else(|| Renderer::new(TemplateSet::builtin(), settings.embeds.clone()));

        let monitoring = &settings.monitoring;
        let advanced = &settings.advanced;
        let process_name = monitoring.process_name.clone();

        let pipeline = Pipeline {
            process_name: process_name.clone(),
            source,
            sink,
            policy: NotificationPolicy::from_settings(&settings),
            renderer,
            supervisor_retry: RetryPolicy {
                attempts: advanced.retry_attempts,
                delay: advanced.retry_delay,
                timeout: monitoring.supervisor_timeout,
            },
            delivery_retry: RetryPolicy {
                attempts: advanced.retry_attempts,
                delay: advanced.retry_delay,
                timeout: advanced.delivery_timeout,
            },
            tracker: tokio::sync::Mutex::new(StateTracker::new()),
            diagnostics: Arc::new(parking_lot::RwLock::new(Diagnostics::new(process_name))),
        };

        Ok(Monitor {
            pipeline: Arc::new(pipeline),
            events: self.events.filter(|_| monitoring.enable_event_listeners),
            quick_interval: monitoring
                .enable_quick_checks
                .then_some(monitoring.quick_check_interval),
            regular_interval: settings
                .notifications
                .regular_updates
                .enabled
                .then_some(monitoring.update_interval),
            event_retry_delay: advanced.retry_delay,
            running: AtomicBool::new(false),
            control: Mutex::new(None),
        })
    }
}

/// fetch → diff → policy → render → deliver, serialized by the tracker lock.
#[derive(Debug)]
struct Pipeline {
    process_name: String,
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn DeliverySink>,
    policy: NotificationPolicy,
    renderer: Renderer,
    supervisor_retry: RetryPolicy,
    delivery_retry: RetryPolicy,
    tracker: tokio::sync::Mutex<StateTracker>,
    diagnostics: DiagnosticsHandle,
}

impl Pipeline {
    async fn run(
        &self,
        trigger: Trigger,
        event: Option<&ProcessEvent>,
    ) -> Result<CycleReport, EngineError> {
        let mut tracker = self.tracker.lock().await;

        let observation = match self.fetch().await {
            Ok(snapshot) => Observation::Snapshot(snapshot),
            // Only full updates and events report a missing process.
            Err(SourceError::NotFound(name)) if trigger != Trigger::ScheduledQuick => {
                Observation::NotFound(name)
            }
            // Tracked state stays as it was.
            Err(e) => return Err(e.into()),
        };
        self.diagnostics.write().last_snapshot = observation.snapshot().cloned();

        let diff = tracker.peek(&observation);
        if trigger != Trigger::ScheduledQuick {
            self.commit(&mut tracker, &observation, &diff);
        }
        if let Some(event) = event {
            log_event(&self.process_name, event);
        }

        let decision = self.policy.decide(&diff, trigger);
        if !decision.should_send {
            debug!(
                process = %self.process_name,
                status = %diff.current_status,
                trigger = %trigger,
                "Notification suppressed"
            );
            return Ok(CycleReport {
                trigger,
                diff,
                decision,
                delivered: false,
            });
        }

        let error = match (&observation, event.and_then(|e| e.detail.clone())) {
            (_, Some(detail)) => Some(detail),
            (Observation::NotFound(name), None) => Some(format!("Process {} not found in PM2", name)),
            _ => None,
        };

        let mut ctx = RenderContext::new(&self.process_name, diff.current_status)
            .diff(&diff)
            .decision(&decision);
        if let Some(snapshot) = observation.snapshot() {
            ctx = ctx.snapshot(snapshot);
        }
        if let Some(error) = error.as_deref() {
            ctx = ctx.error(error);
        }
        let document = self.renderer.render(&ctx);

        let delivered = self
            .delivery_retry
            .run("deliver", || self.sink.deliver(&document))
            .await;

        match delivered {
            Ok(()) => {
                if trigger == Trigger::ScheduledQuick {
                    self.commit(&mut tracker, &observation, &diff);
                }
                {
                    let mut diag = self.diagnostics.write();
                    diag.notifications_sent += 1;
                    diag.last_notification_at_ms = Some(current_timestamp_ms());
                }
                info!(
                    process = %self.process_name,
                    status = %diff.current_status,
                    trigger = %trigger,
                    urgency = ?decision.urgency,
                    "Notification delivered"
                );
                Ok(CycleReport {
                    trigger,
                    diff,
                    decision,
                    delivered: true,
                })
            }
            Err(e) => {
                self.diagnostics.write().delivery_failures += 1;
                if trigger == Trigger::ScheduledQuick {
                    debug!(
                        process = %self.process_name,
                        status = %diff.current_status,
                        error = %e,
                        "Quick check could not deliver notification"
                    );
                } else {
                    error!(
                        process = %self.process_name,
                        status = %diff.current_status,
                        trigger = %trigger,
                        error = %e,
                        "Failed to deliver notification"
                    );
                }
                Err(e.into())
            }
        }
    }

    async fn fetch(&self) -> Result<ProcessSnapshot, SourceError> {
        self.supervisor_retry
            .run("fetch_snapshot", || {
                self.source.fetch_snapshot(&self.process_name)
            })
            .await
    }

    fn commit(&self, tracker: &mut StateTracker, observation: &Observation, diff: &TransitionDiff) {
        tracker.commit(observation, diff);
        log_transition(&self.process_name, diff);
        self.diagnostics.write().state = tracker.state().clone();
    }
}

fn spawn_timer(
    pipeline: Arc<Pipeline>,
    trigger: Trigger,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    if let Err(e) = pipeline.run(trigger, None).await {
                        report_failure(&pipeline.process_name, trigger, &e);
                    }
                }
            }
        }
        debug!(trigger = %trigger, "Timer stopped");
    })
}

fn spawn_event_loop(
    pipeline: Arc<Pipeline>,
    source: Arc<dyn EventSource>,
    retry_delay: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription =
            EventSubscription::spawn(source, pipeline.process_name.clone(), retry_delay);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                event = subscription.recv() => {
                    let Some(event) = event else { break };
                    let trigger = Trigger::PushedEvent(event.event);
                    if let Err(e) = pipeline.run(trigger, Some(&event)).await {
                        report_failure(&pipeline.process_name, trigger, &e);
                    }
                }
            }
        }

        subscription.close();
        debug!("Event subscription closed");
    })
}

fn report_failure(process: &str, trigger: Trigger, err: &EngineError) {
    match (trigger, err) {
        // Logged where it happened.
        (_, EngineError::Delivery(_)) => {}
        (Trigger::ScheduledQuick, _) => debug!(process, error = %err, "Quick check failed"),
        (Trigger::ScheduledRegular, _) => error!(process, error = %err, "Regular update failed"),
        (Trigger::PushedEvent(event), _) => {
            warn!(process, event = %event, error = %err, "Could not handle pushed event")
        }
    }
}

fn log_transition(process: &str, diff: &TransitionDiff) {
    if diff.restart_detected {
        warn!(process, restart_count = diff.restart_count, "Restart detected");
    }
    if !diff.status_changed {
        return;
    }

    let from = diff.previous_status;
    let to = diff.current_status;
    if diff.is_recovery() {
        info!(process, from = %from, to = %to, "Process recovered");
    } else if to.is_critical() {
        error!(process, from = %from, to = %to, "Process entered critical status");
    } else {
        warn!(process, from = %from, to = %to, "Status changed");
    }
}

fn log_event(process: &str, event: &ProcessEvent) {
    match event.event {
        LifecycleEvent::Errored => {
            error!(process, event = %event.event, detail = ?event.detail, "Process error reported")
        }
        LifecycleEvent::Stopped | LifecycleEvent::Exited => {
            warn!(process, event = %event.event, "Process lifecycle event")
        }
        _ => info!(process, event = %event.event, "Process lifecycle event"),
    }
}
