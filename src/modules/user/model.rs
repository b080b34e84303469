use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::user::schema::UserEntity;

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpModel {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
    #[validate(length(min = 1, max = 64, message = "First name must be 1 to 64 characters"))]
    pub first_name: String,
    #[validate(length(max = 64, message = "Last name must be at most 64 characters"))]
    #[serde(default)]
    pub last_name: String,
}

#[derive(Deserialize, Validate)]
pub struct SignInModel {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,
}

#[derive(Deserialize)]
pub struct AuthCallbackQuery {
    pub origin: Option<String>,
}

pub struct InsertUser {
    pub email: String,
    pub hash_password: String,
    pub given_name: String,
    pub family_name: String,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// Cached profile; stays free of billing fields so the cache never serves stale plans.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserEntity> for UserResponse {
    fn from(entity: UserEntity) -> Self {
        let name = entity.full_name();
        UserResponse { id: entity.id, email: entity.email, name, created_at: entity.created_at }
    }
}
