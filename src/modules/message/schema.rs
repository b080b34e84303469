use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct MessageEntity {
    pub id: Uuid,
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub is_user_message: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
