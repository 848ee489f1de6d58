//! Notification templates, keyed by status.
//!
//! A template collection is a JSON object mapping template keys to
//! `{title, description, color, fields?}`:
//!
//! ```json
//! {
//!   "online": {
//!     "title": "🟢 $processName is Online",
//!     "description": "$processName is up and running.",
//!     "color": 3066993,
//!     "fields": [{ "name": "Uptime", "value": "$uptime", "inline": true }]
//!   }
//! }
//! ```
//!
//! `color` may also be written as a hex string (`"#2ecc71"`). Missing keys
//! fall back to the built-in set.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use pm2watch_types::{DocumentField, ProcessStatus};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::TemplateError;

/// Error red, shared by the error and not-found templates.
pub const COLOR_ERROR: u32 = 0xE74C3C;
pub const COLOR_ONLINE: u32 = 0x2ECC71;
pub const COLOR_OFFLINE: u32 = 0x95A5A6;
pub const COLOR_RESTARTING: u32 = 0xF1C40F;
pub const COLOR_UNKNOWN: u32 = 0x7F8C8D;

/// Names of the six templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    Online,
    Offline,
    Error,
    Restarting,
    Unknown,
    NotFound,
}

impl TemplateKey {
    pub const ALL: [TemplateKey; 6] = [
        TemplateKey::Online,
        TemplateKey::Offline,
        TemplateKey::Error,
        TemplateKey::Restarting,
        TemplateKey::Unknown,
        TemplateKey::NotFound,
    ];

    pub fn for_status(status: ProcessStatus) -> Self {
        match status {
            ProcessStatus::Online => TemplateKey::Online,
            ProcessStatus::Stopping | ProcessStatus::Stopped => TemplateKey::Offline,
            ProcessStatus::Launching | ProcessStatus::Errored => TemplateKey::Error,
            ProcessStatus::Restarting => TemplateKey::Restarting,
            ProcessStatus::NotFound => TemplateKey::NotFound,
            ProcessStatus::Unknown => TemplateKey::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::Online => "online",
            TemplateKey::Offline => "offline",
            TemplateKey::Error => "error",
            TemplateKey::Restarting => "restarting",
            TemplateKey::Unknown => "unknown",
            TemplateKey::NotFound => "not-found",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unrendered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_color")]
    pub color: u32,
    #[serde(default)]
    pub fields: Vec<DocumentField>,
}

impl Template {
    fn new(title: &str, description: &str, color: u32, fields: &[(&str, &str, bool)]) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            color,
            fields: fields
                .iter()
                .map(|(name, value, inline)| DocumentField {
                    name: name.to_string(),
                    value: value.to_string(),
                    inline: *inline,
                })
                .collect(),
        }
    }
}

/// Custom templates layered over the built-in set.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    custom: HashMap<TemplateKey, Template>,
}

impl TemplateSet {
    /// Only the built-in templates.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load a template collection from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, Template> = serde_json::from_str(raw)?;
        let mut custom = HashMap::new();
        for (key, template) in entries {
            match TemplateKey::parse(&key) {
                Some(key) => {
                    custom.insert(key, template);
                }
                None => warn!(key = %key, "Ignoring unknown template key"),
            }
        }
        Ok(Self { custom })
    }

    /// Resolve a template: custom, then custom `error` for `not-found`, then built-in.
    pub fn get(&self, key: TemplateKey) -> Template {
        if let Some(template) = self.custom.get(&key) {
            return template.clone();
        }
        if key == TemplateKey::NotFound {
            if let Some(template) = self.custom.get(&TemplateKey::Error) {
                return template.clone();
            }
        }
        builtin(key)
    }

    pub fn has_custom(&self, key: TemplateKey) -> bool {
        self.custom.contains_key(&key)
    }
}

/// The built-in template for `key`.
pub fn builtin(key: TemplateKey) -> Template {
    match key {
        TemplateKey::Online => Template::new(
            "🟢 $processName is Online",
            "$processName is up and running.",
            COLOR_ONLINE,
            &[("Uptime", "$uptime", true), ("Last Restart", "$lastRestart", true)],
        ),
        TemplateKey::Offline => Template::new(
            "🔴 $processName is Offline",
            "$processName has been stopped.",
            COLOR_OFFLINE,
            &[("Last Restart", "$lastRestart", true)],
        ),
        TemplateKey::Error => Template::new(
            "❌ $processName has Errored",
            "$processName is in an error state.",
            COLOR_ERROR,
            &[("Last Restart", "$lastRestart", true)],
        ),
        TemplateKey::Restarting => Template::new(
            "🔄 $processName is Restarting",
            "$processName is being restarted.",
            COLOR_RESTARTING,
            &[("Last Restart", "$lastRestart", true)],
        ),
        TemplateKey::Unknown => Template::new(
            "❔ $processName Status Unknown",
            "The status of $processName could not be determined.",
            COLOR_UNKNOWN,
            &[],
        ),
        TemplateKey::NotFound => Template::new(
            "❌ $processName Not Found",
            "No process named $processName is registered with PM2.",
            COLOR_ERROR,
            &[],
        ),
    }
}

fn deserialize_color<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Color {
        Int(u32),
        Hex(String),
    }

    match Color::deserialize(d)? {
        Color::Int(value) => Ok(value),
        Color::Hex(raw) => {
            let digits = raw
                .trim()
                .trim_start_matches('#')
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            u32::from_str_radix(digits, 16)
                .map_err(|_| serde::de::Error::custom(format!("invalid color {}", raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(TemplateKey::for_status(ProcessStatus::Online), TemplateKey::Online);
        assert_eq!(TemplateKey::for_status(ProcessStatus::Stopping), TemplateKey::Offline);
        assert_eq!(TemplateKey::for_status(ProcessStatus::Stopped), TemplateKey::Offline);
        assert_eq!(TemplateKey::for_status(ProcessStatus::Errored), TemplateKey::Error);
        assert_eq!(TemplateKey::for_status(ProcessStatus::Launching), TemplateKey::Error);
        assert_eq!(
            TemplateKey::for_status(ProcessStatus::Restarting),
            TemplateKey::Restarting
        );
        assert_eq!(TemplateKey::for_status(ProcessStatus::NotFound), TemplateKey::NotFound);
        assert_eq!(TemplateKey::for_status(ProcessStatus::Unknown), TemplateKey::Unknown);
    }

    #[test]
    fn test_builtin_not_found_uses_error_color() {
        let template = TemplateSet::builtin().get(TemplateKey::NotFound);
        assert_eq!(template.color, COLOR_ERROR);
        assert!(template.title.contains("$processName"));
    }

    #[test]
    fn test_custom_overrides_and_fallback() {
        let set = TemplateSet::from_json(
            r##"{
                "online": {"title": "up: $processName", "description": "", "color": "#00ff00"},
                "error": {"title": "down: $processName", "color": 16711680},
                "bogus": {"title": "ignored"}
            }"##,
        )
        .unwrap();

        assert_eq!(set.get(TemplateKey::Online).title, "up: $processName");
        assert_eq!(set.get(TemplateKey::Online).color, 0x00ff00);
        // not-found borrows the custom error template
        assert_eq!(set.get(TemplateKey::NotFound).title, "down: $processName");
        // missing keys fall back to the built-ins
        assert_eq!(set.get(TemplateKey::Offline), builtin(TemplateKey::Offline));
        assert!(!set.has_custom(TemplateKey::Unknown));
    }

    #[test]
    fn test_invalid_color_is_error() {
        assert!(TemplateSet::from_json(r#"{"online": {"title": "t", "color": "green"}}"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TemplateSet::load(Path::new("/nonexistent/embeds.json")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeds.json");
        std::fs::write(&path, r#"{"unknown": {"title": "?? $processName"}}"#).unwrap();

        let set = TemplateSet::load(&path).unwrap();
        assert_eq!(set.get(TemplateKey::Unknown).title, "?? $processName");
    }
}
