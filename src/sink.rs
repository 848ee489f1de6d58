//! Delivery sinks.

use std::fmt::Debug;

use async_trait::async_trait;
use pm2watch_adapters::discord::{Delivery, WebhookClient};
use pm2watch_types::NotificationDocument;
use tracing::{debug, info};

use crate::error::DeliveryError;

/// Hands a rendered document to the remote endpoint.
///
/// Sinks do not retry; the scheduler wraps every call in its retry policy.
#[async_trait]
pub trait DeliverySink: Send + Sync + Debug {
    async fn deliver(&self, document: &NotificationDocument) -> Result<(), DeliveryError>;
}

#[async_trait]
impl DeliverySink for WebhookClient {
    async fn deliver(&self, document: &NotificationDocument) -> Result<(), DeliveryError> {
        match WebhookClient::deliver(self, document).await? {
            Delivery::Edited { message_id } => {
                debug!(message_id = %message_id, "Edited status message");
            }
            Delivery::Sent {
                message_id: Some(message_id),
            } => {
                info!(message_id = %message_id, "Sent new status message, editing it from now on");
            }
            Delivery::Sent { message_id: None } => {
                debug!("Sent new status message");
            }
        }
        Ok(())
    }
}
