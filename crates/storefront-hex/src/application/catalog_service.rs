use std::sync::Arc;

use storefront_types::domain::brand::Brand;
use storefront_types::domain::views::ProductView;
use storefront_types::ports::StoreRepository;
use uuid::Uuid;

use crate::errors::AppError;

/// Read-only catalog queries.
pub struct CatalogService<R: StoreRepository> {
    repo: Arc<R>,
}

impl<R: StoreRepository> CatalogService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn list_products(&self) -> Result<Vec<ProductView>, AppError> {
        let products = self.repo.list_products().await?;
        Ok(products.into_iter().map(ProductView::from).collect())
    }

    pub async fn get_product(&self, id: Uuid) -> Result<ProductView, AppError> {
        match self.repo.get_product(id).await? {
            Some(p) => Ok(p.into()),
            None => Err(AppError::NotFound(format!("product {}", id))),
        }
    }

    pub async fn list_brands(&self) -> Result<Vec<Brand>, AppError> {
        Ok(self.repo.list_brands().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_repo::memory::InMemoryRepo;
    use storefront_types::domain::product::Product;
    use storefront_types::ports::catalog_repository::CatalogRepository;

    #[tokio::test]
    async fn products_carry_average_rating() {
        let repo = InMemoryRepo::new();
        let svc = CatalogService::new(Arc::new(repo.clone()));
        let p = repo
            .create_product(Product::new("Lamp".into(), "".into(), 1500, 3, None, None).unwrap())
            .await
            .unwrap();
        repo.adjust_rating(p.id, 9, 2).await.unwrap();

        let view = svc.get_product(p.id).await.unwrap();
        assert_eq!(view.average_rating, 4.5);
        assert_eq!(svc.list_products().await.unwrap().len(), 1);
        assert!(svc.list_brands().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let svc = CatalogService::new(Arc::new(InMemoryRepo::new()));
        let res = svc.get_product(Uuid::new_v4()).await;
        assert!(matches!(res, Err(AppError::NotFound(_))));
    }
}
