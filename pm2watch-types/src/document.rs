//! NotificationDocument - the rendered, ready-to-send payload.

/// A rendered notification.
///
/// Built fresh for every notification and never mutated after it is handed
/// to a delivery sink. With the `serde` feature it serializes to the embed
/// shape accepted by Discord-compatible webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NotificationDocument {
    pub title: String,
    pub description: String,
    /// RGB color as a 24-bit integer.
    #[cfg_attr(feature = "serde", serde(rename = "color"))]
    pub color_code: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<DocumentField>,
    /// ISO-8601 timestamp, absent when timestamps are disabled.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub timestamp: Option<String>,
}

impl NotificationDocument {
    /// Append a field.
    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(DocumentField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&DocumentField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One `(name, value, inline)` entry of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentField {
    pub name: String,
    pub value: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub inline: bool,
}
