use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Profile record owned by the external user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for UserSummary {
    fn from(p: &UserProfile) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            email: p.email.clone(),
        }
    }
}

/// The authenticated identity an operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub address: String,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// A caller may act on a resource it owns; admins may act on any.
    pub fn may_act_on(&self, owner_id: Uuid) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

impl From<UserProfile> for Caller {
    fn from(p: UserProfile) -> Self {
        Self {
            id: p.id,
            role: p.role,
            name: p.name,
            email: p.email,
            address: p.address,
        }
    }
}
