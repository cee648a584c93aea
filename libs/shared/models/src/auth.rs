use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Tenant (clinic) the token was issued for, from `app_metadata.tenant_id`.
    pub tenant_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    pub fn is_dentist(&self) -> bool {
        self.role.as_deref() == Some("dentist")
    }

    pub fn is_receptionist(&self) -> bool {
        self.role.as_deref() == Some("receptionist")
    }

    pub fn is_patient(&self) -> bool {
        self.role.as_deref() == Some("patient")
    }

    /// Front-desk roles that manage scheduling and payments.
    pub fn can_manage_front_desk(&self) -> bool {
        self.is_admin() || self.is_receptionist()
    }

    /// Roles allowed to drive clinical transitions (diagnosis, execution).
    pub fn can_practice(&self) -> bool {
        self.is_admin() || self.is_dentist()
    }
}
