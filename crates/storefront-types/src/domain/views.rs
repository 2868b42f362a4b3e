//! Read projections that join orders and reviews with user and product summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::caller::UserSummary;
use super::order::{Order, OrderStatus, PaymentMethod};
use super::product::Product;
use super::review::Review;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            price_cents: p.price_cents,
        }
    }
}

/// Catalog listing entry with the derived average rating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub average_rating: f64,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        let average_rating = product.average_rating();
        Self {
            product,
            average_rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLineView {
    pub product_id: Uuid,
    /// `None` when the product has since been removed from the catalog.
    pub product: Option<ProductSummary>,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderView {
    pub id: Uuid,
    pub user: Option<UserSummary>,
    pub user_id: Uuid,
    pub items: Vec<OrderLineView>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
    pub payment_method: Option<PaymentMethod>,
    pub shipping_address: String,
}

impl OrderView {
    pub fn new(
        order: Order,
        user: Option<UserSummary>,
        lookup: impl Fn(Uuid) -> Option<ProductSummary>,
    ) -> Self {
        let items = order
            .items
            .iter()
            .map(|line| OrderLineView {
                product_id: line.product_id,
                product: lookup(line.product_id),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
            })
            .collect();
        Self {
            id: order.id,
            user,
            user_id: order.user_id,
            items,
            total_cents: order.total_cents,
            status: order.status,
            ordered_at: order.ordered_at,
            payment_method: order.payment_method,
            shipping_address: order.shipping_address,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderSummary {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total_cents: i64,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            status: o.status,
            total_cents: o.total_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub user: Option<UserSummary>,
    pub product: Option<ProductSummary>,
    pub order: Option<OrderSummary>,
}
