#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

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

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub const DEFAULT_SQLITE_URL: &str = "sqlite://storefront.db";

/// Storage backend selected at startup.
pub enum Repo {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteRepo),
}

/// Builds the backend for `url`:
/// `sqlite:...` opens (and migrates) a SQLite database, `memory://` uses the
/// in-process store, and no url picks memory when compiled in, else the
/// default SQLite file.
pub async fn build_repo(url: Option<&str>) -> anyhow::Result<Repo> {
    Repo::build_repo(url).await
}

impl Repo {
    pub async fn build_repo(url: Option<&str>) -> anyhow::Result<Self> {
        match url {
            Some(u) if u.starts_with("sqlite:") => Self::sqlite(u).await,
            Some("memory://") => Self::memory(),
            Some(u) => anyhow::bail!("unsupported DATABASE_URL {u:?}"),
            None => Self::fallback().await,
        }
    }

    #[cfg(feature = "sqlite")]
    async fn sqlite(url: &str) -> anyhow::Result<Self> {
        tracing::info!(url, "using sqlite repository");
        Ok(Repo::Sqlite(sqlite::SqliteRepo::new(url).await?))
    }

    #[cfg(not(feature = "sqlite"))]
    async fn sqlite(url: &str) -> anyhow::Result<Self> {
        anyhow::bail!("{url:?} requires the `sqlite` feature")
    }

    #[cfg(feature = "memory")]
    fn memory() -> anyhow::Result<Self> {
        tracing::info!("using in-memory repository");
        Ok(Repo::Memory(memory::InMemoryRepo::new()))
    }

    #[cfg(not(feature = "memory"))]
    fn memory() -> anyhow::Result<Self> {
        anyhow::bail!("memory:// requires the `memory` feature")
    }

    #[cfg(feature = "memory")]
    async fn fallback() -> anyhow::Result<Self> {
        Self::memory()
    }

    #[cfg(not(feature = "memory"))]
    async fn fallback() -> anyhow::Result<Self> {
        Self::sqlite(DEFAULT_SQLITE_URL).await
    }
}

macro_rules! dispatch {
    ($self:ident . $method:ident ( $($arg:expr),* )) => {
        match $self {
            #[cfg(feature = "memory")]
            Repo::Memory(r) => r.$method($($arg),*).await,
            #[cfg(feature = "sqlite")]
            Repo::Sqlite(r) => r.$method($($arg),*).await,
        }
    };
}

#[async_trait::async_trait]
impl CatalogRepository for Repo {
    async fn create_brand(&self, brand: Brand) -> Result<Brand, RepoError> {
        dispatch!(self.create_brand(brand))
    }

    async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>, RepoError> {
        dispatch!(self.get_brand(id))
    }

    async fn list_brands(&self) -> Result<Vec<Brand>, RepoError> {
        dispatch!(self.list_brands())
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        dispatch!(self.create_product(product))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        dispatch!(self.get_product(id))
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepoError> {
        dispatch!(self.list_products())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError> {
        dispatch!(self.adjust_stock(id, delta))
    }

    async fn reserve_stock(&self, lines: &[LineRequest]) -> Result<Vec<Product>, RepoError> {
        dispatch!(self.reserve_stock(lines))
    }

    async fn release_stock(&self, lines: &[LineRequest]) -> Result<(), RepoError> {
        dispatch!(self.release_stock(lines))
    }

    async fn adjust_rating(
        &self,
        id: Uuid,
        rating_delta: i64,
        count_delta: i64,
    ) -> Result<Product, RepoError> {
        dispatch!(self.adjust_rating(id, rating_delta, count_delta))
    }
}

#[async_trait::async_trait]
impl OrderRepository for Repo {
    async fn create_order(&self, order: Order) -> Result<Order, RepoError> {
        dispatch!(self.create_order(order))
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        dispatch!(self.get_order(id))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
        dispatch!(self.list_orders())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, RepoError> {
        dispatch!(self.list_orders_for_user(user_id))
    }

    async fn update_order(&self, order: Order) -> Result<Option<Order>, RepoError> {
        dispatch!(self.update_order(order))
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, RepoError> {
        dispatch!(self.delete_order(id))
    }
}

#[async_trait::async_trait]
impl ReviewRepository for Repo {
    async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
        dispatch!(self.create_review(review))
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, RepoError> {
        dispatch!(self.get_review(id))
    }

    async fn find_review(&self, key: &ReviewKey) -> Result<Option<Review>, RepoError> {
        dispatch!(self.find_review(key))
    }

    async fn update_review(&self, review: Review) -> Result<Option<Review>, RepoError> {
        dispatch!(self.update_review(review))
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool, RepoError> {
        dispatch!(self.delete_review(id))
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
        dispatch!(self.list_reviews())
    }

    async fn list_reviews_for_user(&self, user_id: Uuid) -> Result<Vec<Review>, RepoError> {
        dispatch!(self.list_reviews_for_user(user_id))
    }
}

#[async_trait::async_trait]
impl UserDirectory for Repo {
    async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, RepoError> {
        dispatch!(self.upsert_user(profile))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
        dispatch!(self.get_user(id))
    }
}
