pub mod catalog_repository;
pub mod notifier;
pub mod order_repository;
pub mod review_repository;
pub mod user_directory;

use uuid::Uuid;

use crate::domain::product::CounterError;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("db error: {0}")]
    DbError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: Uuid,
        available: u32,
        requested: u32,
    },

    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepoError {
    /// Attributes a counter violation to the product it happened on.
    pub fn from_counter(product_id: Uuid, err: CounterError) -> Self {
        match err {
            CounterError::InsufficientStock {
                available,
                requested,
            } => RepoError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            other => RepoError::Conflict(format!("product {product_id}: {other}")),
        }
    }
}

/// Everything the application services need from storage.
pub trait StoreRepository:
    catalog_repository::CatalogRepository
    + order_repository::OrderRepository
    + review_repository::ReviewRepository
    + user_directory::UserDirectory
{
}

impl<T> StoreRepository for T where
    T: catalog_repository::CatalogRepository
        + order_repository::OrderRepository
        + review_repository::ReviewRepository
        + user_directory::UserDirectory
{
}
