use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;
use crate::domain::caller::UserProfile;

/// Profile lookup backed by the external account system.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, RepoError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError>;
}
