//! Startup seeding of users, brands and products from a JSON document.

use std::collections::HashMap;

use serde::Deserialize;
use storefront_types::domain::brand::Brand;
use storefront_types::domain::caller::UserProfile;
use storefront_types::domain::product::Product;
use storefront_types::ports::StoreRepository;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub brands: Vec<SeedBrand>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedBrand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    /// Fixed id so demo clients can refer to it; generated when absent.
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub stocks: u32,
    /// Name of a brand from the same document.
    pub brand: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub brands: usize,
    pub products: usize,
}

impl SeedData {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub async fn load_seed<R: StoreRepository>(repo: &R, data: SeedData) -> Result<SeedSummary, AppError> {
    let mut summary = SeedSummary::default();

    for user in data.users {
        repo.upsert_user(user).await?;
        summary.users += 1;
    }

    let mut brand_ids: HashMap<String, Uuid> = HashMap::new();
    for b in data.brands {
        let brand = Brand::new(b.name, b.description, b.image_url)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let brand = repo.create_brand(brand).await?;
        brand_ids.insert(brand.name.clone(), brand.id);
        summary.brands += 1;
    }

    for p in data.products {
        let brand_id = match &p.brand {
            Some(name) => Some(
                *brand_ids
                    .get(name)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown brand {name:?}")))?,
            ),
            None => None,
        };
        let mut product = Product::new(
            p.name,
            p.description,
            p.price_cents,
            p.stocks,
            brand_id,
            p.image_url,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if let Some(id) = p.id {
            product.id = id;
        }
        repo.create_product(product).await?;
        summary.products += 1;
    }

    tracing::info!(
        users = summary.users,
        brands = summary.brands,
        products = summary.products,
        "seed data loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_repo::memory::InMemoryRepo;
    use storefront_types::domain::caller::Role;
    use storefront_types::ports::catalog_repository::CatalogRepository;
    use storefront_types::ports::user_directory::UserDirectory;

    const SEED: &str = r#"{
        "users": [
            {"id": "6f1c1f3e-4a57-4a8e-9a53-4d1d3c2f0b11", "name": "Admin", "email": "admin@example.com", "role": "admin"}
        ],
        "brands": [{"name": "Acme"}],
        "products": [
            {"id": "0b0c9f1e-2f4d-4f59-8d55-6a4f0f3a9c01", "name": "Anvil", "price_cents": 4999, "stocks": 3, "brand": "Acme"},
            {"name": "Rope", "price_cents": 799, "stocks": 10}
        ]
    }"#;

    #[tokio::test]
    async fn seeds_link_products_to_brands() {
        let repo = InMemoryRepo::new();
        let summary = load_seed(&repo, SeedData::from_json(SEED).unwrap())
            .await
            .unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                users: 1,
                brands: 1,
                products: 2
            }
        );

        let anvil_id = Uuid::parse_str("0b0c9f1e-2f4d-4f59-8d55-6a4f0f3a9c01").unwrap();
        let anvil = repo.get_product(anvil_id).await.unwrap().unwrap();
        let acme = repo.list_brands().await.unwrap().remove(0);
        assert_eq!(anvil.brand_id, Some(acme.id));

        let admin_id = Uuid::parse_str("6f1c1f3e-4a57-4a8e-9a53-4d1d3c2f0b11").unwrap();
        let admin = repo.get_user(admin_id).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.address, "");
    }

    #[tokio::test]
    async fn unknown_brand_is_rejected() {
        let repo = InMemoryRepo::new();
        let data = SeedData::from_json(
            r#"{"products": [{"name": "X", "price_cents": 1, "stocks": 1, "brand": "Nope"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_seed(&repo, data).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
