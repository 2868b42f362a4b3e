use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use storefront_types::domain::brand::Brand;
use storefront_types::domain::caller::UserProfile;
use storefront_types::domain::order::{LineRequest, Order};
use storefront_types::domain::product::Product;
use storefront_types::domain::review::{Review, ReviewKey};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::OrderRepository;
use storefront_types::ports::review_repository::ReviewRepository;
use storefront_types::ports::user_directory::UserDirectory;
use storefront_types::ports::RepoError;
use uuid::Uuid;

/// Process-local store. Counter updates run under the dashmap shard lock of
/// the product entry, so each check-and-mutate is atomic.
#[derive(Clone)]
pub struct InMemoryRepo {
    pub products: Arc<DashMap<Uuid, Product>>,
    pub brands: Arc<DashMap<Uuid, Brand>>,
    pub orders: Arc<DashMap<Uuid, Order>>,
    pub reviews: Arc<DashMap<Uuid, Review>>,
    review_keys: Arc<DashMap<ReviewKey, Uuid>>,
    pub users: Arc<DashMap<Uuid, UserProfile>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            products: Arc::new(DashMap::new()),
            brands: Arc::new(DashMap::new()),
            orders: Arc::new(DashMap::new()),
            reviews: Arc::new(DashMap::new()),
            review_keys: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
        }
    }

    fn apply_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError> {
        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("product {id}")))?;
        entry
            .value_mut()
            .apply_stock_delta(delta)
            .map_err(|e| RepoError::from_counter(id, e))?;
        Ok(entry.value().clone())
    }

    fn restock(&self, lines: &[LineRequest]) {
        for line in lines {
            if let Some(mut entry) = self.products.get_mut(&line.product_id) {
                // Adding back what was just taken cannot overflow.
                let _ = entry.value_mut().apply_stock_delta(line.quantity as i64);
            }
        }
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepo {
    async fn create_brand(&self, brand: Brand) -> Result<Brand, RepoError> {
        self.brands.insert(brand.id, brand.clone());
        Ok(brand)
    }

    async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>, RepoError> {
        Ok(self.brands.get(&id).map(|r| r.clone()))
    }

    async fn list_brands(&self) -> Result<Vec<Brand>, RepoError> {
        let mut brands: Vec<Brand> = self.brands.iter().map(|kv| kv.value().clone()).collect();
        brands.sort_by_key(|b| b.created_at);
        Ok(brands)
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        Ok(self.products.get(&id).map(|r| r.clone()))
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepoError> {
        let mut products: Vec<Product> =
            self.products.iter().map(|kv| kv.value().clone()).collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError> {
        self.apply_stock(id, delta)
    }

    async fn reserve_stock(&self, lines: &[LineRequest]) -> Result<Vec<Product>, RepoError> {
        let mut reserved: Vec<LineRequest> = Vec::with_capacity(lines.len());
        let mut snapshots = Vec::with_capacity(lines.len());
        for line in lines {
            match self.apply_stock(line.product_id, -(line.quantity as i64)) {
                Ok(product) => {
                    reserved.push(*line);
                    snapshots.push(product);
                }
                Err(err) => {
                    self.restock(&reserved);
                    return Err(err);
                }
            }
        }
        Ok(snapshots)
    }

    async fn release_stock(&self, lines: &[LineRequest]) -> Result<(), RepoError> {
        self.restock(lines);
        Ok(())
    }

    async fn adjust_rating(
        &self,
        id: Uuid,
        rating_delta: i64,
        count_delta: i64,
    ) -> Result<Product, RepoError> {
        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("product {id}")))?;
        entry
            .value_mut()
            .apply_rating_delta(rating_delta, count_delta)
            .map_err(|e| RepoError::from_counter(id, e))?;
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepo {
    async fn create_order(&self, order: Order) -> Result<Order, RepoError> {
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.get(&id).map(|r| r.clone()))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
        let mut orders: Vec<Order> = self.orders.iter().map(|kv| kv.value().clone()).collect();
        orders.sort_by_key(|o| o.ordered_at);
        Ok(orders)
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, RepoError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|kv| kv.value().user_id == user_id)
            .map(|kv| kv.value().clone())
            .collect();
        orders.sort_by_key(|o| o.ordered_at);
        Ok(orders)
    }

    async fn update_order(&self, order: Order) -> Result<Option<Order>, RepoError> {
        if let Some(mut v) = self.orders.get_mut(&order.id) {
            *v = order.clone();
            return Ok(Some(order));
        }
        Ok(None)
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.orders.remove(&id).is_some())
    }
}

#[async_trait]
impl ReviewRepository for InMemoryRepo {
    async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
        match self.review_keys.entry(review.key()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepoError::Conflict(format!(
                "review for product {} on order {} already exists",
                review.product_id, review.order_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.reviews.insert(review.id, review.clone());
                slot.insert(review.id);
                Ok(review)
            }
        }
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, RepoError> {
        Ok(self.reviews.get(&id).map(|r| r.clone()))
    }

    async fn find_review(&self, key: &ReviewKey) -> Result<Option<Review>, RepoError> {
        let id = match self.review_keys.get(key) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.reviews.get(&id).map(|r| r.clone()))
    }

    async fn update_review(&self, review: Review) -> Result<Option<Review>, RepoError> {
        if let Some(mut v) = self.reviews.get_mut(&review.id) {
            if v.value().key() != review.key() {
                return Err(RepoError::Conflict(format!(
                    "review {} cannot change its product or order",
                    review.id
                )));
            }
            *v = review.clone();
            return Ok(Some(review));
        }
        Ok(None)
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool, RepoError> {
        match self.reviews.remove(&id) {
            Some((_, review)) => {
                self.review_keys.remove(&review.key());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
        let mut reviews: Vec<Review> = self.reviews.iter().map(|kv| kv.value().clone()).collect();
        reviews.sort_by_key(|r| r.created_at);
        Ok(reviews)
    }

    async fn list_reviews_for_user(&self, user_id: Uuid) -> Result<Vec<Review>, RepoError> {
        let mut reviews: Vec<Review> = self
            .reviews
            .iter()
            .filter(|kv| kv.value().user_id == user_id)
            .map(|kv| kv.value().clone())
            .collect();
        reviews.sort_by_key(|r| r.created_at);
        Ok(reviews)
    }
}

#[async_trait]
impl UserDirectory for InMemoryRepo {
    async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, RepoError> {
        self.users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
        Ok(self.users.get(&id).map(|r| r.clone()))
    }
}
