//! Discord-compatible webhook client.
//!
//! The preferred mode edits one stored message in place
//! (`PATCH {webhook}/messages/{id}`), so the channel shows a single status
//! card that is kept up to date. Without a message id the client sends a
//! new message (`POST {webhook}?wait=true`), remembers the id returned by
//! the endpoint and edits that message from then on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pm2watch_adapters::discord::WebhookClient;
//! use pm2watch_types::NotificationDocument;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebhookClient::builder()
//!         .webhook_url("https://discord.com/api/webhooks/1/token")
//!         .message_id("123456789012345678")
//!         .username("Uptime")
//!         .build()?;
//!
//!     let doc = NotificationDocument {
//!         title: "api is online".into(),
//!         ..Default::default()
//!     };
//!     client.deliver(&doc).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use pm2watch_types::NotificationDocument;

use crate::AdapterError;

/// Webhook client that edits or sends a status message.
#[derive(Debug)]
pub struct WebhookClient {
    client: Client,
    webhook_url: String,
    message_id: RwLock<Option<String>>,
    username: Option<String>,
    avatar_url: Option<String>,
}

/// How a document reached the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// An existing message was edited.
    Edited { message_id: String },
    /// A new message was posted.
    Sent { message_id: Option<String> },
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a NotificationDocument; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: Option<String>,
}

impl WebhookClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> WebhookClientBuilder {
        WebhookClientBuilder::default()
    }

    /// The message currently being edited, if any.
    pub fn message_id(&self) -> Option<String> {
        self.message_id.read().clone()
    }

    /// Edit the stored message, or send a new one if there is none.
    pub async fn deliver(&self, doc: &NotificationDocument) -> Result<Delivery, AdapterError> {
        match self.message_id() {
            Some(message_id) => {
                self.edit(&message_id, doc).await?;
                Ok(Delivery::Edited { message_id })
            }
            None => {
                let message_id = self.send(doc).await?;
                if let Some(id) = &message_id {
                    *self.message_id.write() = Some(id.clone());
                }
                Ok(Delivery::Sent { message_id })
            }
        }
    }

    /// Edit an existing message in place.
    pub async fn edit(&self, message_id: &str, doc: &NotificationDocument) -> Result<(), AdapterError> {
        let response = self
            .client
            .patch(self.edit_url(message_id))
            .json(&self.payload(doc))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Post a new message and return its id if the endpoint reported one.
    pub async fn send(&self, doc: &NotificationDocument) -> Result<Option<String>, AdapterError> {
        let response = self
            .client
            .post(self.send_url())
            .json(&self.payload(doc))
            .send()
            .await?;
        let response = check_status(response).await?;

        // 204 No Content when the endpoint ignores `wait`
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let message: MessageResponse =
            serde_json::from_str(&body).map_err(|e| AdapterError::Parse(e.to_string()))?;
        Ok(message.id)
    }

    fn payload<'a>(&'a self, doc: &'a NotificationDocument) -> WebhookPayload<'a> {
        WebhookPayload {
            embeds: [doc],
            username: self.username.as_deref(),
            avatar_url: self.avatar_url.as_deref(),
        }
    }

    /// The query string (e.g. `thread_id`) stays after the message path.
    fn edit_url(&self, message_id: &str) -> String {
        match self.webhook_url.split_once('?') {
            Some((base, query)) => format!("{}/messages/{}?{}", base, message_id, query),
            None => format!("{}/messages/{}", self.webhook_url, message_id),
        }
    }

    fn send_url(&self) -> String {
        if self.webhook_url.contains('?') {
            format!("{}&wait=true", self.webhook_url)
        } else {
            format!("{}?wait=true", self.webhook_url)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Builder for WebhookClient.
#[derive(Debug, Default)]
pub struct WebhookClientBuilder {
    webhook_url: Option<String>,
    message_id: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
    timeout: Option<Duration>,
}

impl WebhookClientBuilder {
    /// Set the webhook URL (`https://discord.com/api/webhooks/{id}/{token}`).
    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    /// Set the id of the message to edit.
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Override the webhook's display name.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Override the webhook's avatar.
    pub fn avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<WebhookClient, AdapterError> {
        let webhook_url = self
            .webhook_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AdapterError::Connection("webhook URL is not set".to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;

        Ok(WebhookClient {
            client,
            webhook_url: webhook_url.trim_end_matches('/').to_string(),
            message_id: RwLock::new(self.message_id.filter(|id| !id.trim().is_empty())),
            username: self.username.filter(|u| !u.is_empty()),
            avatar_url: self.avatar_url.filter(|u| !u.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WebhookClient {
        WebhookClient::builder()
            .webhook_url("https://discord.com/api/webhooks/1/token/")
            .message_id("42")
            .username("Uptime")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_url() {
        assert!(WebhookClient::builder().build().is_err());
        assert!(WebhookClient::builder().webhook_url("  ").build().is_err());
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.edit_url("42"),
            "https://discord.com/api/webhooks/1/token/messages/42"
        );
        assert_eq!(
            client.send_url(),
            "https://discord.com/api/webhooks/1/token?wait=true"
        );
    }

    #[test]
    fn test_urls_with_query() {
        let client = WebhookClient::builder()
            .webhook_url("https://example.com/hook?thread_id=7")
            .build()
            .unwrap();
        assert_eq!(
            client.send_url(),
            "https://example.com/hook?thread_id=7&wait=true"
        );
        assert_eq!(
            client.edit_url("42"),
            "https://example.com/hook/messages/42?thread_id=7"
        );
    }

    #[test]
    fn test_empty_message_id_means_send_mode() {
        let client = WebhookClient::builder()
            .webhook_url("https://example.com/hook")
            .message_id("")
            .build()
            .unwrap();
        assert_eq!(client.message_id(), None);
    }

    #[test]
    fn test_payload_shape() {
        let client = client();
        let doc = NotificationDocument {
            title: "api is online".to_string(),
            description: "All good".to_string(),
            color_code: 0x2ecc71,
            fields: Vec::new(),
            timestamp: None,
        };

        let json = serde_json::to_value(client.payload(&doc)).unwrap();
        assert_eq!(json["embeds"][0]["title"], "api is online");
        assert_eq!(json["embeds"][0]["color"], 0x2ecc71);
        assert_eq!(json["username"], "Uptime");
        assert!(json.get("avatar_url").is_none());
    }
}
