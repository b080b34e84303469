use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error;
use crate::configs::RedisCache;
use crate::constants::USER_CACHE_TTL;
use crate::modules::user::model::{InsertUser, SignInModel, SignUpModel, UserResponse};
use crate::modules::user::{repository::UserRepository, schema::UserEntity};
use crate::utils::{hash_password, verify_password, Claims};
use crate::ENV;

pub const DEFAULT_LANDING: &str = "/dashboard";
pub const SIGN_IN_PATH: &str = "/sign-in";

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository + Send + Sync>,
    cache: Arc<RedisCache>,
}

impl UserService {
    pub fn with_dependencies(
        repo: Arc<dyn UserRepository + Send + Sync>,
        cache: Arc<RedisCache>,
    ) -> Self {
        info!("UserService initialized with dependencies");
        UserService { repo, cache }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<UserResponse, error::SystemError> {
        let key = format!("user:{}", id);
        if let Some(cached_user) = self.cache.get::<UserResponse>(&key).await? {
            info!("User {} found in cache", id);
            return Ok(cached_user);
        }
        let entity = self
            .repo
            .find_by_id(&id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("User not found"))?;

        let response = UserResponse::from(entity);
        self.cache.set(&key, &response, USER_CACHE_TTL).await?;
        info!("User {} cached", id);
        Ok(response)
    }

    pub async fn find_entity(&self, id: Uuid) -> Result<Option<UserEntity>, error::SystemError> {
        self.repo.find_by_id(&id).await
    }

    pub async fn sign_up(&self, user: SignUpModel) -> Result<Uuid, error::SystemError> {
        let hash_password = hash_password(&user.password)?;

        let created = self
            .repo
            .create(&InsertUser {
                email: normalize_email(&user.email),
                hash_password,
                given_name: user.first_name.trim().to_string(),
                family_name: user.last_name.trim().to_string(),
            })
            .await?;

        info!("User {} signed up", created.id);
        Ok(created.id)
    }

    /// The account matching the credentials; unknown email and wrong password look the same.
    pub async fn authenticate(&self, user: &SignInModel) -> Result<UserEntity, error::SystemError> {
        let invalid = || error::SystemError::unauthorized("Invalid email or password");

        let entity =
            self.repo.find_by_email(&normalize_email(&user.email)).await?.ok_or_else(invalid)?;

        if !verify_password(&entity.hash_password, &user.password)? {
            return Err(invalid());
        }
        Ok(entity)
    }

    pub async fn sign_in(&self, user: SignInModel) -> Result<String, error::SystemError> {
        let entity = self.authenticate(&user).await?;
        info!("User {} signed in", entity.id);

        Claims::new(&entity.id, &entity.role, ENV.access_token_expiration)
            .encode(ENV.jwt_secret.as_ref())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Where a signed-in user lands after the auth callback.
///
/// `origin` is a path relative to the site root. Anything that could leave the
/// site falls back to the dashboard.
pub fn origin_redirect(origin: Option<&str>) -> String {
    let Some(origin) = origin.map(str::trim) else {
        return DEFAULT_LANDING.to_string();
    };

    if origin.chars().any(char::is_control) {
        return DEFAULT_LANDING.to_string();
    }
    let path = origin.trim_start_matches('/');
    if path.is_empty() || path.contains('\\') || path.contains("://") {
        return DEFAULT_LANDING.to_string();
    }

    format!("/{path}")
}
