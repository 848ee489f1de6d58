//! Resolved service configuration.
//!
//! Settings are assembled once at startup from, in increasing precedence:
//! built-in defaults, an optional config file, the legacy flat environment
//! variables (`WEBHOOK_URL`, `MESSAGE_ID`, `PROCESS_NAME`, ...) and
//! `PM2WATCH_<SECTION>__<KEY>` environment variables. The result is an
//! immutable [`Settings`] value handed to each component by reference.
//!
//! ```toml
//! [discord]
//! webhook_url = "https://discord.com/api/webhooks/1/token"
//! message_id = "123456789012345678"
//!
//! [monitoring]
//! process_name = "api"
//! update_interval = "60s"
//! quick_check_interval = "5s"
//!
//! [notifications.regular_updates]
//! only_on_changes = true
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use pm2watch_types::SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is missing or out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Custom templates were requested but the file does not exist.
    #[error("Embeds file not found: {}", .0.display())]
    MissingTemplates(PathBuf),
}

/// Legacy environment names and the settings keys they map to.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("WEBHOOK_URL", "DISCORD__WEBHOOK_URL"),
    ("MESSAGE_ID", "DISCORD__MESSAGE_ID"),
    ("DISCORD_USERNAME", "DISCORD__USERNAME"),
    ("DISCORD_AVATAR_URL", "DISCORD__AVATAR_URL"),
    ("PROCESS_NAME", "MONITORING__PROCESS_NAME"),
    ("UPDATE_INTERVAL", "MONITORING__UPDATE_INTERVAL"),
    ("QUICK_CHECK_INTERVAL", "MONITORING__QUICK_CHECK_INTERVAL"),
];

const ENV_PREFIX: &str = "PM2WATCH";

/// The complete resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema version of this configuration.
    pub version: u32,
    pub discord: DiscordSettings,
    pub monitoring: MonitoringSettings,
    pub notifications: NotificationSettings,
    pub embeds: EmbedSettings,
    pub logging: LoggingSettings,
    pub advanced: AdvancedSettings,
    pub features: FeatureSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            discord: DiscordSettings::default(),
            monitoring: MonitoringSettings::default(),
            notifications: NotificationSettings::default(),
            embeds: EmbedSettings::default(),
            logging: LoggingSettings::default(),
            advanced: AdvancedSettings::default(),
            features: FeatureSettings::default(),
        }
    }
}

/// Delivery endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    pub webhook_url: String,
    /// Message to edit in place. Without it a new message is posted.
    pub message_id: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// What to watch and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub process_name: String,
    #[serde(with = "duration_serde")]
    pub update_interval: Duration,
    #[serde(with = "duration_serde")]
    pub quick_check_interval: Duration,
    pub enable_quick_checks: bool,
    pub enable_immediate_notifications: bool,
    pub enable_event_listeners: bool,
    /// Bound on a single supervisor query.
    #[serde(with = "duration_serde")]
    pub supervisor_timeout: Duration,
    pub pm2_binary: String,
    pub pm2_home: Option<PathBuf>,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            process_name: String::new(),
            update_interval: Duration::from_secs(60),
            quick_check_interval: Duration::from_secs(5),
            enable_quick_checks: true,
            enable_immediate_notifications: true,
            enable_event_listeners: true,
            supervisor_timeout: Duration::from_secs(5),
            pm2_binary: "pm2".to_string(),
            pm2_home: None,
        }
    }
}

/// Which transitions produce notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub status_changes: StatusChangeSettings,
    pub regular_updates: RegularUpdateSettings,
    /// Suppress non-critical scheduled updates unless the status changed.
    pub critical_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusChangeSettings {
    /// Master switch for the per-category flags below.
    pub enabled: bool,
    pub notify_on_online: bool,
    pub notify_on_offline: bool,
    pub notify_on_error: bool,
    pub notify_on_restart: bool,
    pub notify_on_stop: bool,
    pub notify_on_start: bool,
    pub notify_on_exit: bool,
}

impl Default for StatusChangeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_on_online: true,
            notify_on_offline: true,
            notify_on_error: true,
            notify_on_restart: true,
            notify_on_stop: true,
            notify_on_start: true,
            notify_on_exit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularUpdateSettings {
    pub enabled: bool,
    /// Suppress scheduled updates when neither status nor restart changed.
    pub only_on_changes: bool,
}

impl Default for RegularUpdateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            only_on_changes: false,
        }
    }
}

/// Document rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    pub use_custom_embeds: bool,
    pub embeds_file: PathBuf,
    pub show_uptime: bool,
    pub show_last_restart: bool,
    pub show_restart_count: bool,
    pub show_process_info: bool,
    pub show_timestamp: bool,
    pub include_status_change_info: bool,
    pub include_immediate_notification_flag: bool,
    pub include_error_details: bool,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            use_custom_embeds: false,
            embeds_file: PathBuf::from("embeds.json"),
            show_uptime: true,
            show_last_restart: true,
            show_restart_count: true,
            show_process_info: true,
            show_timestamp: true,
            include_status_change_info: true,
            include_immediate_notification_flag: true,
            include_error_details: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub show_colors: bool,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Also append logs to this file.
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_colors: true,
            json: false,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Total tries for supervisor queries and deliveries.
    pub retry_attempts: u32,
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,
    /// Bound on a single delivery call.
    #[serde(with = "duration_serde")]
    pub delivery_timeout: Duration,
    /// Stop cleanly on SIGINT/SIGTERM.
    pub graceful_shutdown: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            delivery_timeout: Duration::from_secs(10),
            graceful_shutdown: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// Serve the diagnostics HTTP surface.
    pub enable_metrics: bool,
    pub metrics_host: String,
    pub metrics_port: u16,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 3000,
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, std::env::vars().collect())
    }

    /// Load settings from an optional file and an explicit environment map.
    pub fn load_from(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let legacy: HashMap<String, String> = LEGACY_ENV
            .iter()
            .filter_map(|(old, key)| {
                env.get(*old)
                    .map(|value| (format!("{}_{}", ENV_PREFIX, key), value.clone()))
            })
            .collect();

        let settings: Settings = builder
            .add_source(environment(legacy))
            .add_source(environment(env))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Check everything that must hold before the engine starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SCHEMA_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported configuration version {} (expected {})",
                self.version, SCHEMA_VERSION
            )));
        }

        let url = self.discord.webhook_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(
                "discord.webhook_url (WEBHOOK_URL) is not set".to_string(),
            ));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "discord.webhook_url must be an http(s) URL, got {}",
                url
            )));
        }

        if self.monitoring.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "monitoring.process_name (PROCESS_NAME) is not set".to_string(),
            ));
        }
        if self.monitoring.update_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring.update_interval must be greater than zero".to_string(),
            ));
        }
        if self.monitoring.quick_check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring.quick_check_interval must be greater than zero".to_string(),
            ));
        }
        if self.advanced.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "advanced.retry_attempts must be at least 1".to_string(),
            ));
        }

        self.validate_templates()
    }

    /// Custom templates must exist when requested.
    pub fn validate_templates(&self) -> Result<(), ConfigError> {
        if self.embeds.use_custom_embeds && !self.embeds.embeds_file.exists() {
            return Err(ConfigError::MissingTemplates(self.embeds.embeds_file.clone()));
        }
        Ok(())
    }

    /// Message id, if a non-empty one is configured.
    pub fn message_id(&self) -> Option<&str> {
        self.discord
            .message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

fn environment(source: HashMap<String, String>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(Some(source))
}

/// Durations as integer milliseconds or strings with a unit suffix.
mod duration_serde {
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use super::fmt;
    use crate::duration::parse_duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}ms", d.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        d.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("milliseconds or a duration string like \"5s\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_millis)
                .map_err(|_| E::custom(format!("negative duration: {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
            if v.is_finite() && v >= 0.0 {
                Ok(Duration::from_millis(v as u64))
            } else {
                Err(E::custom(format!("invalid duration: {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(E::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_env() -> HashMap<String, String> {
        env(&[
            ("WEBHOOK_URL", "https://discord.com/api/webhooks/1/token"),
            ("PROCESS_NAME", "api"),
        ])
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load_from(None, HashMap::new()).unwrap();
        assert_eq!(settings.version, SCHEMA_VERSION);
        assert_eq!(settings.monitoring.update_interval, Duration::from_secs(60));
        assert_eq!(settings.monitoring.quick_check_interval, Duration::from_secs(5));
        assert!(settings.notifications.status_changes.notify_on_restart);
        assert!(!settings.notifications.regular_updates.only_on_changes);
        assert!(!settings.notifications.critical_only);
        assert_eq!(settings.advanced.retry_attempts, 3);
    }

    #[test]
    fn test_defaults_fail_validation() {
        let settings = Settings::load_from(None, HashMap::new()).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_legacy_env() {
        let mut vars = valid_env();
        vars.insert("MESSAGE_ID".into(), "123456789012345678".into());
        vars.insert("UPDATE_INTERVAL".into(), "30000".into());
        vars.insert("QUICK_CHECK_INTERVAL".into(), "2s".into());

        let settings = Settings::load_from(None, vars).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.monitoring.process_name, "api");
        assert_eq!(settings.message_id(), Some("123456789012345678"));
        assert_eq!(settings.monitoring.update_interval, Duration::from_secs(30));
        assert_eq!(settings.monitoring.quick_check_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_prefixed_env_overrides_legacy() {
        let mut vars = valid_env();
        vars.insert("PM2WATCH_MONITORING__PROCESS_NAME".into(), "worker".into());
        vars.insert(
            "PM2WATCH_NOTIFICATIONS__REGULAR_UPDATES__ONLY_ON_CHANGES".into(),
            "true".into(),
        );

        let settings = Settings::load_from(None, vars).unwrap();
        assert_eq!(settings.monitoring.process_name, "worker");
        assert!(settings.notifications.regular_updates.only_on_changes);
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[discord]
webhook_url = "https://example.com/hook"
username = "Uptime"

[monitoring]
process_name = "api"
update_interval = "2m"
enable_quick_checks = false

[notifications]
critical_only = true

[embeds]
show_process_info = false
"#
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path()), HashMap::new()).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.discord.username.as_deref(), Some("Uptime"));
        assert_eq!(settings.monitoring.update_interval, Duration::from_secs(120));
        assert!(!settings.monitoring.enable_quick_checks);
        assert!(settings.notifications.critical_only);
        assert!(!settings.embeds.show_process_info);
        assert!(settings.embeds.show_uptime);
        assert_eq!(settings.message_id(), None);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[monitoring]\nprocess_name = \"from-file\"").unwrap();

        let vars = env(&[("PROCESS_NAME", "from-env")]);
        let settings = Settings::load_from(Some(file.path()), vars).unwrap();
        assert_eq!(settings.monitoring.process_name, "from-env");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = Settings::load_from(
            Some(Path::new("/nonexistent/pm2watch.toml")),
            HashMap::new(),
        );
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_rejects_non_http_webhook() {
        let vars = env(&[("WEBHOOK_URL", "discord.com/hook"), ("PROCESS_NAME", "api")]);
        let settings = Settings::load_from(None, vars).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut vars = valid_env();
        vars.insert("QUICK_CHECK_INTERVAL".into(), "0".into());
        let settings = Settings::load_from(None, vars).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_custom_templates_is_fatal() {
        let mut vars = valid_env();
        vars.insert("PM2WATCH_EMBEDS__USE_CUSTOM_EMBEDS".into(), "true".into());
        vars.insert(
            "PM2WATCH_EMBEDS__EMBEDS_FILE".into(),
            "/nonexistent/embeds.json".into(),
        );
        let settings = Settings::load_from(None, vars).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingTemplates(_))
        ));
    }
}
