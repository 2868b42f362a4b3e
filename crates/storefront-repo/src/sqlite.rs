use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use storefront_types::domain::brand::Brand;
use storefront_types::domain::caller::UserProfile;
use storefront_types::domain::order::{LineRequest, Order, OrderLine, PaymentMethod};
use storefront_types::domain::product::Product;
use storefront_types::domain::review::{Rating, Review, ReviewKey};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::OrderRepository;
use storefront_types::ports::review_repository::ReviewRepository;
use storefront_types::ports::user_directory::UserDirectory;
use storefront_types::ports::RepoError;
use uuid::Uuid;

const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/0001_create_users.sql"),
    include_str!("../migrations/0002_create_brands.sql"),
    include_str!("../migrations/0003_create_products.sql"),
    include_str!("../migrations/0004_create_orders.sql"),
    include_str!("../migrations/0005_create_orders_user_index.sql"),
    include_str!("../migrations/0006_create_reviews.sql"),
];

const PRODUCT_COLUMNS: &str = "id, name, description, price_cents, stocks, brand_id, image_url, total_ratings, rating_count, created_at";
const ORDER_COLUMNS: &str = "id, user_id, items_json, total_cents, status, ordered_at, payment_method, shipping_address, updated_at";
const REVIEW_COLUMNS: &str =
    "id, user_id, product_id, order_id, rating, comment, status, created_at, updated_at";

pub struct SqliteRepo {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::DbError(e.to_string())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(db_err)?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(raw).map_err(db_err)
}

fn to_u32(v: i64) -> Result<u32, RepoError> {
    u32::try_from(v).map_err(db_err)
}

#[derive(FromRow)]
struct DbUser {
    id: String,
    name: String,
    email: String,
    address: String,
    role: String,
}

impl DbUser {
    fn into_profile(self) -> Result<UserProfile, RepoError> {
        Ok(UserProfile {
            id: parse_id(&self.id)?,
            name: self.name,
            email: self.email,
            address: self.address,
            role: self.role.parse().map_err(db_err)?,
        })
    }
}

#[derive(FromRow)]
struct DbBrand {
    id: String,
    name: String,
    description: String,
    image_url: Option<String>,
    created_at: String,
}

impl DbBrand {
    fn into_brand(self) -> Result<Brand, RepoError> {
        Ok(Brand {
            id: parse_id(&self.id)?,
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbProduct {
    id: String,
    name: String,
    description: String,
    price_cents: i64,
    stocks: i64,
    brand_id: Option<String>,
    image_url: Option<String>,
    total_ratings: i64,
    rating_count: i64,
    created_at: String,
}

impl DbProduct {
    fn into_product(self) -> Result<Product, RepoError> {
        Ok(Product {
            id: parse_id(&self.id)?,
            name: self.name,
            description: self.description,
            price_cents: self.price_cents,
            stocks: to_u32(self.stocks)?,
            brand_id: self.brand_id.as_deref().map(parse_id).transpose()?,
            image_url: self.image_url,
            total_ratings: to_u32(self.total_ratings)?,
            rating_count: to_u32(self.rating_count)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbOrder {
    id: String,
    user_id: String,
    items_json: String,
    total_cents: i64,
    status: String,
    ordered_at: String,
    payment_method: Option<String>,
    shipping_address: String,
    updated_at: String,
}

impl DbOrder {
    fn into_order(self) -> Result<Order, RepoError> {
        let items: Vec<OrderLine> = serde_json::from_str(&self.items_json).map_err(db_err)?;
        Ok(Order {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            items,
            total_cents: self.total_cents,
            status: self.status.parse().map_err(db_err)?,
            ordered_at: parse_ts(&self.ordered_at)?,
            payment_method: self
                .payment_method
                .as_deref()
                .map(str::parse::<PaymentMethod>)
                .transpose()
                .map_err(db_err)?,
            shipping_address: self.shipping_address,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct DbReview {
    id: String,
    user_id: String,
    product_id: String,
    order_id: String,
    rating: i64,
    comment: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl DbReview {
    fn into_review(self) -> Result<Review, RepoError> {
        Ok(Review {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            product_id: parse_id(&self.product_id)?,
            order_id: parse_id(&self.order_id)?,
            rating: Rating::try_from(self.rating).map_err(db_err)?,
            comment: self.comment,
            status: self.status.parse().map_err(db_err)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        for ddl in MIGRATIONS {
            sqlx::query(ddl).execute(&pool).await?;
        }
        tracing::debug!(url = database_url, "sqlite schema ready");

        Ok(Self { pool })
    }

    async fn stock_failure(&self, id: Uuid, requested: u32) -> RepoError {
        let available: Result<Option<i64>, _> =
            sqlx::query_scalar("SELECT stocks FROM products WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await;
        match available {
            Ok(Some(available)) => RepoError::InsufficientStock {
                product_id: id,
                available: available.clamp(0, u32::MAX as i64) as u32,
                requested,
            },
            Ok(None) => RepoError::NotFound(format!("product {id}")),
            Err(e) => db_err(e),
        }
    }
}

#[async_trait]
impl CatalogRepository for SqliteRepo {
    async fn create_brand(&self, brand: Brand) -> Result<Brand, RepoError> {
        sqlx::query(
            "INSERT INTO brands (id, name, description, image_url, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(brand.id.to_string())
        .bind(&brand.name)
        .bind(&brand.description)
        .bind(&brand.image_url)
        .bind(ts(&brand.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(brand)
    }

    async fn get_brand(&self, id: Uuid) -> Result<Option<Brand>, RepoError> {
        let row: Option<DbBrand> = sqlx::query_as(
            "SELECT id, name, description, image_url, created_at FROM brands WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(DbBrand::into_brand).transpose()
    }

    async fn list_brands(&self) -> Result<Vec<Brand>, RepoError> {
        let rows: Vec<DbBrand> = sqlx::query_as(
            "SELECT id, name, description, image_url, created_at FROM brands ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbBrand::into_brand).collect()
    }

    async fn create_product(&self, product: Product) -> Result<Product, RepoError> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(product.id.to_string())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.stocks as i64)
        .bind(product.brand_id.map(|b| b.to_string()))
        .bind(&product.image_url)
        .bind(product.total_ratings as i64)
        .bind(product.rating_count as i64)
        .bind(ts(&product.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepoError> {
        let row: Option<DbProduct> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DbProduct::into_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepoError> {
        let rows: Vec<DbProduct> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbProduct::into_product).collect()
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<Product, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(&format!(
            "UPDATE products SET stocks = stocks + ? WHERE id = ? AND stocks + ? >= 0 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(delta)
        .bind(id.to_string())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => row.into_product(),
            None => {
                let requested = delta.unsigned_abs().min(u32::MAX as u64) as u32;
                Err(self.stock_failure(id, requested).await)
            }
        }
    }

    async fn reserve_stock(&self, lines: &[LineRequest]) -> Result<Vec<Product>, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut snapshots = Vec::with_capacity(lines.len());
        for line in lines {
            let row: Option<DbProduct> = sqlx::query_as(&format!(
                "UPDATE products SET stocks = stocks - ? WHERE id = ? AND stocks >= ? RETURNING {PRODUCT_COLUMNS}"
            ))
            .bind(line.quantity as i64)
            .bind(line.product_id.to_string())
            .bind(line.quantity as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
            match row {
                Some(row) => snapshots.push(row.into_product()?),
                None => {
                    tx.rollback().await.map_err(db_err)?;
                    return Err(self.stock_failure(line.product_id, line.quantity).await);
                }
            }
        }
        tx.commit().await.map_err(db_err)?;
        Ok(snapshots)
    }

    async fn release_stock(&self, lines: &[LineRequest]) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for line in lines {
            sqlx::query("UPDATE products SET stocks = stocks + ? WHERE id = ?")
                .bind(line.quantity as i64)
                .bind(line.product_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn adjust_rating(
        &self,
        id: Uuid,
        rating_delta: i64,
        count_delta: i64,
    ) -> Result<Product, RepoError> {
        let row: Option<DbProduct> = sqlx::query_as(&format!(
            "UPDATE products
             SET total_ratings = total_ratings + ?, rating_count = rating_count + ?
             WHERE id = ?
               AND total_ratings + ? >= 0
               AND rating_count + ? >= 0
               AND ((rating_count + ?) = 0) = ((total_ratings + ?) = 0)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(rating_delta)
        .bind(count_delta)
        .bind(id.to_string())
        .bind(rating_delta)
        .bind(count_delta)
        .bind(count_delta)
        .bind(rating_delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => row.into_product(),
            None => match self.get_product(id).await? {
                None => Err(RepoError::NotFound(format!("product {id}"))),
                Some(p) => Err(RepoError::Conflict(format!(
                    "product {id}: rating aggregate ({}, {}) cannot take ({rating_delta}, {count_delta})",
                    p.total_ratings, p.rating_count
                ))),
            },
        }
    }
}

#[async_trait]
impl OrderRepository for SqliteRepo {
    async fn create_order(&self, order: Order) -> Result<Order, RepoError> {
        let items_json = serde_json::to_string(&order.items).map_err(db_err)?;
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(order.id.to_string())
        .bind(order.user_id.to_string())
        .bind(items_json)
        .bind(order.total_cents)
        .bind(order.status.as_str())
        .bind(ts(&order.ordered_at))
        .bind(order.payment_method.map(|m| m.as_str()))
        .bind(&order.shipping_address)
        .bind(ts(&order.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DbOrder::into_order).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY ordered_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbOrder::into_order).collect()
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY ordered_at"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbOrder::into_order).collect()
    }

    async fn update_order(&self, order: Order) -> Result<Option<Order>, RepoError> {
        let items_json = serde_json::to_string(&order.items).map_err(db_err)?;
        let updated = sqlx::query(
            "UPDATE orders
             SET items_json = ?, total_cents = ?, status = ?, payment_method = ?,
                 shipping_address = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(items_json)
        .bind(order.total_cents)
        .bind(order.status.as_str())
        .bind(order.payment_method.map(|m| m.as_str()))
        .bind(&order.shipping_address)
        .bind(ts(&order.updated_at))
        .bind(order.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(order))
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl ReviewRepository for SqliteRepo {
    async fn create_review(&self, review: Review) -> Result<Review, RepoError> {
        let res = sqlx::query(&format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(review.id.to_string())
        .bind(review.user_id.to_string())
        .bind(review.product_id.to_string())
        .bind(review.order_id.to_string())
        .bind(review.rating.value() as i64)
        .bind(&review.comment)
        .bind(review.status.as_str())
        .bind(ts(&review.created_at))
        .bind(ts(&review.updated_at))
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(review),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepoError::Conflict(format!(
                    "review for product {} on order {} already exists",
                    review.product_id, review.order_id
                )))
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, RepoError> {
        let row: Option<DbReview> =
            sqlx::query_as(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DbReview::into_review).transpose()
    }

    async fn find_review(&self, key: &ReviewKey) -> Result<Option<Review>, RepoError> {
        let row: Option<DbReview> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ? AND product_id = ? AND order_id = ?"
        ))
        .bind(key.user_id.to_string())
        .bind(key.product_id.to_string())
        .bind(key.order_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(DbReview::into_review).transpose()
    }

    async fn update_review(&self, review: Review) -> Result<Option<Review>, RepoError> {
        let updated = sqlx::query(
            "UPDATE reviews SET rating = ?, comment = ?, status = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND product_id = ? AND order_id = ?",
        )
        .bind(review.rating.value() as i64)
        .bind(&review.comment)
        .bind(review.status.as_str())
        .bind(ts(&review.updated_at))
        .bind(review.id.to_string())
        .bind(review.user_id.to_string())
        .bind(review.product_id.to_string())
        .bind(review.order_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(review))
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_reviews(&self) -> Result<Vec<Review>, RepoError> {
        let rows: Vec<DbReview> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbReview::into_review).collect()
    }

    async fn list_reviews_for_user(&self, user_id: Uuid) -> Result<Vec<Review>, RepoError> {
        let rows: Vec<DbReview> = sqlx::query_as(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ? ORDER BY created_at"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DbReview::into_review).collect()
    }
}

#[async_trait]
impl UserDirectory for SqliteRepo {
    async fn upsert_user(&self, profile: UserProfile) -> Result<UserProfile, RepoError> {
        sqlx::query(
            "INSERT INTO users (id, name, email, address, role) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name, email = excluded.email,
                address = excluded.address, role = excluded.role",
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.address)
        .bind(profile.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(profile)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserProfile>, RepoError> {
        let row: Option<DbUser> =
            sqlx::query_as("SELECT id, name, email, address, role FROM users WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(DbUser::into_profile).transpose()
    }
}
