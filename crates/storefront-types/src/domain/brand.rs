use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Brand {
    pub fn new(name: String, description: String, image_url: Option<String>) -> anyhow::Result<Self> {
        if name.trim().is_empty() {
            anyhow::bail!("brand name empty");
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            image_url,
            created_at: Utc::now(),
        })
    }
}
