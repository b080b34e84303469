use uuid::Uuid;

use crate::{api::error, modules::user::model::InsertUser, modules::user::schema::UserEntity};

#[async_trait::async_trait]
pub trait UserRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserEntity>, error::SystemError>;

    /// Lookup by an already normalized address.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>, error::SystemError>;

    async fn create(&self, user: &InsertUser) -> Result<UserEntity, error::SystemError>;
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct InMemoryUsers(pub std::sync::Mutex<Vec<UserEntity>>);

#[cfg(test)]
#[async_trait::async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserEntity>, error::SystemError> {
        Ok(self.0.lock().unwrap().iter().find(|u| u.id == *id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>, error::SystemError> {
        Ok(self.0.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: &InsertUser) -> Result<UserEntity, error::SystemError> {
        let mut rows = self.0.lock().unwrap();
        if rows.iter().any(|u| u.email == user.email) {
            return Err(error::SystemError::Conflict(None));
        }
        let entity = UserEntity {
            email: user.email.clone(),
            hash_password: user.hash_password.clone(),
            given_name: user.given_name.clone(),
            family_name: user.family_name.clone(),
            ..UserEntity::reader()
        };
        rows.push(entity.clone());
        Ok(entity)
    }
}
