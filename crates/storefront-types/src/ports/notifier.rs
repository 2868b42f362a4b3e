use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::caller::UserSummary;
use crate::domain::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StatusUpdated,
    CheckoutConfirmed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderStatusChanged {
    pub kind: NotificationKind,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub shipping_address: String,
    /// `None` if the order owner is unknown to the user directory.
    pub recipient: Option<UserSummary>,
}

impl OrderStatusChanged {
    pub fn new(kind: NotificationKind, order: &Order, recipient: Option<UserSummary>) -> Self {
        Self {
            kind,
            order_id: order.id,
            status: order.status,
            total_cents: order.total_cents,
            shipping_address: order.shipping_address.clone(),
            recipient,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound sink for user-facing order notifications.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn order_status_changed(&self, event: &OrderStatusChanged) -> Result<(), NotifyError>;
}
