use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
    Cancelled,
    Success,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Success => "success",
        }
    }

    /// Orders may only be removed (and restocked) before they leave the warehouse.
    pub fn allows_delete(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    pub fn allows_quantity_change(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    pub fn allows_review(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Success
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "success" => Ok(OrderStatus::Success),
            other => anyhow::bail!("unknown order status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "cash_on_delivery" => Ok(PaymentMethod::CashOnDelivery),
            other => anyhow::bail!("unknown payment method {other:?}"),
        }
    }
}

/// A requested (product, quantity) pair, before prices are known.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: Uuid, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }

    /// Rejects empty requests, zero quantities and repeated products.
    pub fn validate_all(lines: &[LineRequest]) -> anyhow::Result<()> {
        if lines.is_empty() {
            anyhow::bail!("order must contain at least one product");
        }
        let mut seen = HashSet::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                anyhow::bail!("quantity for product {} must be > 0", line.product_id);
            }
            if !seen.insert(line.product_id) {
                anyhow::bail!("product {} listed more than once", line.product_id);
            }
        }
        Ok(())
    }
}

/// Line item with the unit price captured when the order was placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderLine {
    /// `None` when quantity times price does not fit in an `i64`.
    pub fn subtotal_cents(&self) -> Option<i64> {
        i64::from(self.quantity).checked_mul(self.unit_price_cents)
    }

    pub fn as_request(&self) -> LineRequest {
        LineRequest::new(self.product_id, self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
    pub payment_method: Option<PaymentMethod>,
    pub shipping_address: String,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: Uuid, shipping_address: String, items: Vec<OrderLine>) -> anyhow::Result<Self> {
        if items.is_empty() {
            anyhow::bail!("items empty");
        }
        for it in &items {
            if it.quantity == 0 {
                anyhow::bail!("item quantity must be > 0");
            }
            if it.unit_price_cents < 0 {
                anyhow::bail!("item price must be >= 0");
            }
        }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::new_v4(),
            user_id,
            items,
            total_cents: 0,
            status: OrderStatus::Pending,
            ordered_at: now,
            payment_method: None,
            shipping_address,
            updated_at: now,
        };
        order.recompute_total()?;
        Ok(order)
    }

    pub fn line(&self, product_id: Uuid) -> Option<&OrderLine> {
        self.items.iter().find(|it| it.product_id == product_id)
    }

    pub fn stock_lines(&self) -> Vec<LineRequest> {
        self.items.iter().map(OrderLine::as_request).collect()
    }

    /// Sets the quantity of one line and returns the previous quantity.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: u32) -> anyhow::Result<u32> {
        if quantity == 0 {
            anyhow::bail!("quantity must be > 0");
        }
        let line = self
            .items
            .iter_mut()
            .find(|it| it.product_id == product_id)
            .ok_or_else(|| anyhow::anyhow!("product {product_id} not in order"))?;
        let previous = std::mem::replace(&mut line.quantity, quantity);
        if let Err(e) = self.recompute_total() {
            if let Some(line) = self.items.iter_mut().find(|it| it.product_id == product_id) {
                line.quantity = previous;
            }
            return Err(e);
        }
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Sums the line subtotals. On overflow the stored total is left as it was.
    pub fn recompute_total(&mut self) -> anyhow::Result<()> {
        let total = self
            .items
            .iter()
            .try_fold(0i64, |acc, it| it.subtotal_cents().and_then(|s| acc.checked_add(s)))
            .ok_or_else(|| anyhow::anyhow!("order total exceeds the supported range"))?;
        self.total_cents = total;
        Ok(())
    }

    pub fn update_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn checkout(&mut self, payment_method: PaymentMethod, shipping_address: String) {
        self.payment_method = Some(payment_method);
        self.shipping_address = shipping_address;
        self.update_status(OrderStatus::Shipped);
    }
}
