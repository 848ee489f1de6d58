//! Document renderer.
//!
//! Picks the template for the current status, substitutes the
//! `$processName`, `$uptime` and `$lastRestart` placeholders, filters
//! template fields and appends the computed sections enabled in
//! [`EmbedSettings`].

pub mod templates;

use std::time::Duration;

use chrono::{Local, SecondsFormat, TimeZone, Utc};
use pm2watch_types::{
    NotificationDecision, NotificationDocument, ProcessSnapshot, ProcessStatus, TransitionDiff,
    Urgency,
};

use crate::config::{EmbedSettings, Settings};
use crate::duration::{format_bytes, format_uptime};
use crate::error::TemplateError;

pub use templates::{Template, TemplateKey, TemplateSet};

const UPTIME: &str = "$uptime";
const LAST_RESTART: &str = "$lastRestart";
const PROCESS_NAME: &str = "$processName";

/// Everything known about the notification being rendered.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub process_name: &'a str,
    pub status: ProcessStatus,
    pub snapshot: Option<&'a ProcessSnapshot>,
    pub diff: Option<&'a TransitionDiff>,
    pub decision: Option<&'a NotificationDecision>,
    /// Error message to surface, e.g. from a pushed exception.
    pub error: Option<&'a str>,
}

impl<'a> RenderContext<'a> {
    pub fn new(process_name: &'a str, status: ProcessStatus) -> Self {
        Self {
            process_name,
            status,
            snapshot: None,
            diff: None,
            decision: None,
            error: None,
        }
    }

    pub fn snapshot(mut self, snapshot: &'a ProcessSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn diff(mut self, diff: &'a TransitionDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn decision(mut self, decision: &'a NotificationDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn error(mut self, error: &'a str) -> Self {
        self.error = Some(error);
        self
    }
}

/// Renders notification documents from templates.
#[derive(Debug, Clone)]
pub struct Renderer {
    templates: TemplateSet,
    options: EmbedSettings,
}

impl Renderer {
    pub fn new(templates: TemplateSet, options: EmbedSettings) -> Self {
        Self { templates, options }
    }

    /// Build a renderer, loading custom templates if they are enabled.
    pub fn from_settings(settings: &Settings) -> Result<Self, TemplateError> {
        let templates = if settings.embeds.use_custom_embeds {
            TemplateSet::load(&settings.embeds.embeds_file)?
        } else {
            TemplateSet::builtin()
        };
        Ok(Self::new(templates, settings.embeds.clone()))
    }

    pub fn render(&self, ctx: &RenderContext<'_>) -> NotificationDocument {
        let template = self.templates.get(TemplateKey::for_status(ctx.status));

        let uptime = format_uptime(ctx.snapshot.map(|s| s.uptime()).unwrap_or(Duration::ZERO));
        let last_restart = format_last_restart(ctx.snapshot.and_then(|s| s.started_at_ms));
        let substitute = |text: &str| {
            text.replace(PROCESS_NAME, ctx.process_name)
                .replace(UPTIME, &uptime)
                .replace(LAST_RESTART, &last_restart)
        };

        let mut doc = NotificationDocument {
            title: substitute(&template.title),
            description: substitute(&template.description),
            color_code: template.color,
            fields: Vec::with_capacity(template.fields.len() + 4),
            timestamp: None,
        };

        for field in &template.fields {
            if !self.options.show_uptime && field.value.contains(UPTIME) {
                continue;
            }
            if !self.options.show_last_restart && field.value.contains(LAST_RESTART) {
                continue;
            }
            doc.push_field(substitute(&field.name), substitute(&field.value), field.inline);
        }

        self.append_sections(&mut doc, ctx);

        if self.options.show_timestamp {
            doc.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        doc
    }

    fn append_sections(&self, doc: &mut NotificationDocument, ctx: &RenderContext<'_>) {
        if let Some(diff) = ctx.diff {
            if self.options.include_status_change_info && diff.status_changed {
                doc.push_field(
                    "Status Change",
                    format!(
                        "🔄 Status changed from **{}** to **{}**",
                        diff.previous_status, diff.current_status
                    ),
                    true,
                );
            }
            if self.options.show_restart_count && diff.restart_detected {
                doc.push_field(
                    "Restart Detected",
                    format!("🔄 Restart #{}", diff.restart_count.max(1)),
                    true,
                );
            }
        }

        let immediate = ctx
            .decision
            .map(|d| d.urgency == Urgency::Immediate)
            .unwrap_or(false);
        if self.options.include_immediate_notification_flag && immediate {
            doc.push_field("Alert Type", "🚨 **IMMEDIATE NOTIFICATION**", true);
        }

        if let Some(error) = ctx.error.filter(|e| !e.is_empty()) {
            if self.options.include_error_details {
                doc.push_field("Error", format!("❌ {}", error), false);
            }
        }

        if let Some(snapshot) = ctx.snapshot {
            if self.options.show_process_info {
                doc.push_field("Process Info", process_info(snapshot), false);
            }
        }
    }
}

fn process_info(snapshot: &ProcessSnapshot) -> String {
    let pid = snapshot
        .pid
        .map(|p| p.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "PID: {} | Memory: {} | CPU: {:.1}% | Restarts: {}",
        pid,
        format_bytes(snapshot.memory_bytes),
        snapshot.cpu_percent,
        snapshot.restart_count
    )
}

/// Local date and time of the last (re)start, or `N/A`.
pub fn format_last_restart(started_at_ms: Option<u64>) -> String {
    started_at_ms
        .and_then(|ms| i64::try_from(ms).ok())
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|at| at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}
