use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::constants::{INFINITE_QUERY_LIMIT, MAX_QUERY_LIMIT};
use crate::modules::message::schema::MessageEntity;

#[derive(Debug, Clone)]
pub struct InsertMessage {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub is_user_message: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageModel {
    pub file_id: Uuid,
    #[validate(length(min = 1, max = 4000, message = "Message must be 1 to 4000 characters"))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MessageQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<usize>,
    pub cursor: Option<Uuid>,
}

impl MessageQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(INFINITE_QUERY_LIMIT).clamp(1, MAX_QUERY_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub text: String,
    pub is_user_message: bool,
}

impl From<MessageEntity> for MessageResponse {
    fn from(entity: MessageEntity) -> Self {
        Self {
            id: entity.id,
            created_at: entity.created_at,
            text: entity.text,
            is_user_message: entity.is_user_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageResponse>,
    pub next_cursor: Option<Uuid>,
}
