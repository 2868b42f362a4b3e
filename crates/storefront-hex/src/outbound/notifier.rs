use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use storefront_types::ports::notifier::{
    NotificationKind, Notifier, NotifyError, OrderStatusChanged,
};

/// Writes each event to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_status_changed(&self, event: &OrderStatusChanged) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?event.kind,
            order_id = %event.order_id,
            status = %event.status,
            recipient = event.recipient.as_ref().map(|r| r.email.as_str()).unwrap_or("-"),
            "order notification"
        );
        Ok(())
    }
}

/// Mail-like payload posted to the webhook.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookMessage<'a> {
    pub to: &'a str,
    pub subject: &'static str,
    pub html: String,
    pub event: &'a OrderStatusChanged,
}

impl<'a> WebhookMessage<'a> {
    /// `None` when the event has no known recipient.
    pub fn render(event: &'a OrderStatusChanged) -> Option<Self> {
        let recipient = event.recipient.as_ref()?;
        let (subject, html) = match event.kind {
            NotificationKind::StatusUpdated => (
                "Order Status Updated",
                format!(
                    "<p>Hello {},</p><p>Your order {} is now <strong>{}</strong>.</p>",
                    recipient.name, event.order_id, event.status
                ),
            ),
            NotificationKind::CheckoutConfirmed => (
                "Order Confirmation",
                format!(
                    "<p>Hello {},</p><p>Thank you for your order {}.</p>\
                     <p>Total: {}.{:02}</p><p>Shipping to: {}</p>",
                    recipient.name,
                    event.order_id,
                    event.total_cents / 100,
                    event.total_cents % 100,
                    event.shipping_address
                ),
            ),
        };
        Some(Self {
            to: &recipient.email,
            subject,
            html,
            event,
        })
    }
}

/// Posts each event as JSON to an external mail relay.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn order_status_changed(&self, event: &OrderStatusChanged) -> Result<(), NotifyError> {
        let Some(message) = WebhookMessage::render(event) else {
            tracing::debug!(order_id = %event.order_id, "no recipient; notification skipped");
            return Ok(());
        };
        let resp = self
            .http
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "webhook answered {}",
                resp.status()
            )));
        }
        tracing::debug!(order_id = %event.order_id, subject = message.subject, "notification delivered");
        Ok(())
    }
}
