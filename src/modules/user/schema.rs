use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, PartialEq, Clone, Type, Serialize, Deserialize)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    User,
}

/// Account row, including the billing state mirrored from Stripe.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub hash_password: String,
    pub role: UserRole,
    pub given_name: String,
    pub family_name: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserEntity {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name).trim().to_string()
    }

    /// Free-plan account used by service tests.
    #[cfg(test)]
    pub(crate) fn reader() -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::now_v7(),
            email: "reader@example.com".into(),
            hash_password: String::new(),
            role: UserRole::User,
            given_name: "Avid".into(),
            family_name: "Reader".into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_price_id: None,
            stripe_current_period_end: None,
            created_at: now,
            updated_at: now,
        }
    }
}
