use async_trait::async_trait;
use uuid::Uuid;

use super::RepoError;
use crate::domain::brand::Brand;
use crate::domain::order::LineRequest;
use crate::domain::product::Product;

/// Product and brand storage. Every counter operation is atomic per call:
/// implementations must never let a concurrent caller observe or produce a
/// negative stock or an inconsistent rating aggregate.
#[async_trait]
pub trait CatalogRepository: Send + Sync + 'static {
    async fn create_brand(&self, brand: Brand) -> Result<Brand, RepoError>;
    async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>, RepoError>;
    async fn list_brands(&self) -> Result<Vec<Brand>, RepoError>;

    async fn create_product(&self, product: Product) -> Result<Product, RepoError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError>;
    async fn list_products(&self) -> Result<Vec<Product>, RepoError>;

    /// Adds `delta` to the product's stock. A negative delta larger than the
    /// current stock fails with `RepoError::InsufficientStock`.
    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError>;

    /// Decrements stock for every line, all or nothing. Returns the products
    /// as they were after the decrement, in line order.
    async fn reserve_stock(&self, lines: &[LineRequest]) -> Result<Vec<Product>, RepoError>;

    /// Returns stock for every line. Products that no longer exist are skipped.
    async fn release_stock(&self, lines: &[LineRequest]) -> Result<(), RepoError>;

    async fn adjust_rating(
        &self,
        id: Uuid,
        rating_delta: i64,
        count_delta: i64,
    ) -> Result<Product, RepoError>;
}
