use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stocks: u32,
    pub brand_id: Option<Uuid>,
    pub image_url: Option<String>,
    /// Sum of every rating currently counted for this product.
    pub total_ratings: u32,
    pub rating_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Violations of the stock and rating counter invariants.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u32, requested: u32 },
    #[error("stock overflow")]
    StockOverflow,
    #[error("rating aggregate would become inconsistent (total {total}, count {count})")]
    InconsistentRating { total: i64, count: i64 },
}

impl Product {
    pub fn new(
        name: String,
        description: String,
        price_cents: i64,
        stocks: u32,
        brand_id: Option<Uuid>,
        image_url: Option<String>,
    ) -> anyhow::Result<Self> {
        if name.trim().is_empty() {
            anyhow::bail!("product name empty");
        }
        if price_cents < 0 {
            anyhow::bail!("product price must be >= 0");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            price_cents,
            stocks,
            brand_id,
            image_url,
            total_ratings: 0,
            rating_count: 0,
            created_at: Utc::now(),
        })
    }

    pub fn average_rating(&self) -> f64 {
        if self.rating_count == 0 {
            0.0
        } else {
            self.total_ratings as f64 / self.rating_count as f64
        }
    }

    /// Applies `delta` to `stocks`, refusing to go below zero. On error the
    /// product is left untouched.
    pub fn apply_stock_delta(&mut self, delta: i64) -> Result<(), CounterError> {
        let next = self.stocks as i64 + delta;
        if next < 0 {
            return Err(CounterError::InsufficientStock {
                available: self.stocks,
                requested: delta.unsigned_abs().min(u32::MAX as u64) as u32,
            });
        }
        self.stocks = u32::try_from(next).map_err(|_| CounterError::StockOverflow)?;
        Ok(())
    }

    /// Applies a change to the rating aggregate. The pair must stay
    /// non-negative and a zero count must carry a zero total.
    pub fn apply_rating_delta(&mut self, rating_delta: i64, count_delta: i64) -> Result<(), CounterError> {
        let total = self.total_ratings as i64 + rating_delta;
        let count = self.rating_count as i64 + count_delta;
        if total < 0 || count < 0 || (count == 0) != (total == 0) {
            return Err(CounterError::InconsistentRating { total, count });
        }
        let inconsistent = || CounterError::InconsistentRating { total, count };
        self.total_ratings = u32::try_from(total).map_err(|_| inconsistent())?;
        self.rating_count = u32::try_from(count).map_err(|_| inconsistent())?;
        Ok(())
    }
}
