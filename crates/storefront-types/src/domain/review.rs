use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A star rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value))
        } else {
            anyhow::bail!("rating must be between {} and {}", Self::MIN, Self::MAX)
        }
    }
}

impl TryFrom<i64> for Rating {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let small = u8::try_from(value).map_err(|_| {
            anyhow::anyhow!("rating must be between {} and {}", Self::MIN, Self::MAX)
        })?;
        Rating::try_from(small)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> Self {
        r.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// First submission for its (user, product, order).
    Pending,
    /// Resubmitted at least once.
    Reviewed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Reviewed => "reviewed",
        }
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "reviewed" => Ok(ReviewStatus::Reviewed),
            other => anyhow::bail!("unknown review status {other:?}"),
        }
    }
}

/// Uniqueness key: one review per user, product and order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReviewKey {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub rating: Rating,
    pub comment: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(key: ReviewKey, rating: Rating, comment: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            product_id: key.product_id,
            order_id: key.order_id,
            rating,
            comment,
            status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ReviewKey {
        ReviewKey {
            user_id: self.user_id,
            product_id: self.product_id,
            order_id: self.order_id,
        }
    }

    /// Overwrites rating and comment and marks the review as reviewed.
    /// Returns the change to apply to the product's rating total, computed
    /// from the rating held before the overwrite.
    pub fn revise(&mut self, rating: Rating, comment: String) -> i64 {
        let previous = self.rating;
        self.rating = rating;
        self.comment = comment;
        self.status = ReviewStatus::Reviewed;
        self.updated_at = Utc::now();
        i64::from(rating.value()) - i64::from(previous.value())
    }
}
