use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;
use crate::domain::review::{Review, ReviewKey};

#[async_trait]
pub trait ReviewRepository: Send + Sync + 'static {
    /// Fails with `RepoError::Conflict` if a review with the same key exists.
    async fn create_review(&self, review: Review) -> Result<Review, RepoError>;
    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, RepoError>;
    async fn find_review(&self, key: &ReviewKey) -> Result<Option<Review>, RepoError>;
    async fn update_review(&self, review: Review) -> Result<Option<Review>, RepoError>;
    async fn delete_review(&self, id: Uuid) -> Result<bool, RepoError>;
    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError>;
    async fn list_reviews_for_user(&self, user_id: Uuid) -> Result<Vec<Review>, RepoError>;
}
