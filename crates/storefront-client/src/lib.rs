use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storefront_types::domain::brand::Brand;
use storefront_types::domain::order::{LineRequest, Order, OrderStatus, PaymentMethod};
use storefront_types::domain::review::Review;
use storefront_types::domain::sales::MonthlySales;
use storefront_types::domain::views::{OrderView, ProductView, ReviewView};
use uuid::Uuid;

#[derive(Clone)]
pub struct StoreClientBuilder {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

/// Typed client for the storefront HTTP API.
#[derive(Clone)]
pub struct StoreClient {
    base: Url,
    client: reqwest::Client,
}

/// Pulls `key` out of a `{ "message": ..., key: ... }` response.
fn payload<T: DeserializeOwned>(mut body: Value, key: &str) -> anyhow::Result<T> {
    let value = body
        .get_mut(key)
        .map(Value::take)
        .with_context(|| format!("response has no {key:?} field"))?;
    serde_json::from_value(value).with_context(|| format!("malformed {key:?} field"))
}

impl StoreClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::builder(base_url)?.build()
    }

    pub fn builder(base_url: &str) -> anyhow::Result<StoreClientBuilder> {
        let base = Url::parse(base_url).context("invalid base url")?;
        Ok(StoreClientBuilder {
            base,
            headers: HeaderMap::new(),
            timeout: None,
            client: None,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base.join(path).context("failed to join url")
    }

    async fn unwrap_payload<T: DeserializeOwned>(
        res: reqwest::Response,
        key: &str,
    ) -> anyhow::Result<T> {
        let body: Value = res.error_for_status()?.json().await?;
        tracing::debug!(key, "storefront response");
        payload(body, key)
    }

    pub async fn create_order(&self, items: Vec<LineRequest>) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url("api/orders")?)
            .json(&CreateOrderRequest { products: items })
            .send()
            .await?;
        Self::unwrap_payload(res, "order").await
    }

    pub async fn my_orders(&self) -> anyhow::Result<Vec<OrderView>> {
        let res = self.client.get(self.url("api/orders/user")?).send().await?;
        Self::unwrap_payload(res, "orders").await
    }

    pub async fn all_orders(&self) -> anyhow::Result<Vec<OrderView>> {
        let res = self.client.get(self.url("api/orders")?).send().await?;
        Self::unwrap_payload(res, "orders").await
    }

    pub async fn update_quantity(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> anyhow::Result<Order> {
        let res = self
            .client
            .put(self.url(&format!("api/orders/{order_id}/updateQuantity"))?)
            .json(&UpdateQuantityRequest {
                product_id,
                new_quantity: quantity,
            })
            .send()
            .await?;
        Self::unwrap_payload(res, "order").await
    }

    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url("api/orders/update-status")?)
            .json(&UpdateStatusRequest { order_id, status })
            .send()
            .await?;
        Self::unwrap_payload(res, "order").await
    }

    pub async fn checkout(
        &self,
        order_id: Uuid,
        payment_method: PaymentMethod,
    ) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url("api/orders/checkout")?)
            .json(&CheckoutRequest {
                order_id,
                payment_method,
            })
            .send()
            .await?;
        Self::unwrap_payload(res, "order").await
    }

    pub async fn delete_order(&self, order_id: Uuid) -> anyhow::Result<()> {
        self.client
            .delete(self.url(&format!("api/orders/{order_id}"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn submit_review(&self, req: ReviewRequest) -> anyhow::Result<Review> {
        let res = self
            .client
            .post(self.url("api/reviews")?)
            .json(&req)
            .send()
            .await?;
        Self::unwrap_payload(res, "review").await
    }

    pub async fn update_review(
        &self,
        review_id: Uuid,
        rating: u8,
        comment: impl Into<String>,
    ) -> anyhow::Result<Review> {
        let res = self
            .client
            .put(self.url(&format!("api/reviews/{review_id}"))?)
            .json(&UpdateReviewRequest {
                rating,
                comment: comment.into(),
            })
            .send()
            .await?;
        Self::unwrap_payload(res, "review").await
    }

    pub async fn delete_review(&self, review_id: Uuid) -> anyhow::Result<()> {
        self.client
            .delete(self.url(&format!("api/reviews/{review_id}"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn all_reviews(&self) -> anyhow::Result<Vec<ReviewView>> {
        let res = self.client.get(self.url("api/reviews")?).send().await?;
        Self::unwrap_payload(res, "reviews").await
    }

    pub async fn my_reviews(&self) -> anyhow::Result<Vec<ReviewView>> {
        let res = self.client.get(self.url("api/reviews/user")?).send().await?;
        Self::unwrap_payload(res, "reviews").await
    }

    pub async fn sales(&self) -> anyhow::Result<Vec<MonthlySales>> {
        let res = self.client.get(self.url("api/sales")?).send().await?;
        Self::unwrap_payload(res, "sales").await
    }

    pub async fn products(&self) -> anyhow::Result<Vec<ProductView>> {
        let res = self.client.get(self.url("api/products")?).send().await?;
        Self::unwrap_payload(res, "products").await
    }

    pub async fn product(&self, id: Uuid) -> anyhow::Result<ProductView> {
        let res = self
            .client
            .get(self.url(&format!("api/products/{id}"))?)
            .send()
            .await?;
        Self::unwrap_payload(res, "product").await
    }

    pub async fn brands(&self) -> anyhow::Result<Vec<Brand>> {
        let res = self.client.get(self.url("api/brands")?).send().await?;
        Self::unwrap_payload(res, "brands").await
    }
}

impl StoreClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Sends `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: impl AsRef<str>) -> anyhow::Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_ref()))
            .context("invalid token")?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> anyhow::Result<StoreClient> {
        if let Some(client) = self.client {
            return Ok(StoreClient {
                base: self.base,
                client,
            });
        }

        let mut builder = reqwest::Client::builder();
        if !self.headers.is_empty() {
            builder = builder.default_headers(self.headers);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(StoreClient {
            base: self.base,
            client,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct CreateOrderRequest {
    products: Vec<LineRequest>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct UpdateQuantityRequest {
    product_id: Uuid,
    new_quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct UpdateStatusRequest {
    order_id: Uuid,
    status: OrderStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    order_id: Uuid,
    payment_method: PaymentMethod,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub rating: u8,
    pub comment: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct UpdateReviewRequest {
    rating: u8,
    comment: String,
}
