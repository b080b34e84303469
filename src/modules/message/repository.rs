use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{model::InsertMessage, schema::MessageEntity},
};

#[async_trait::async_trait]
pub trait MessageRepository {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError>;

    /// Up to `limit` messages of the file, newest first, starting at `cursor` inclusive.
    async fn find_page(
        &self,
        file_id: &Uuid,
        cursor: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// The `limit` most recent messages, newest first.
    async fn find_recent(
        &self,
        file_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;
}
